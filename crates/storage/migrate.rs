//! Online relocation of the state-trie namespace between two databases.
//!
//! While a migration runs, two state-trie databases coexist: writes fan out
//! to both through a composite batch, reads consult the new database first
//! and fall back to the old one. `finish_state_migration` flips the slots
//! atomically under the migration write lock and tears the losing
//! database's directory down asynchronously.

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use tracing::{error, info, warn};

use crate::api::{Batch, KeyValueWriter};
use crate::error::StorageError;
use crate::manager::{
    clear_database_dir, crit, read_database_dir, write_database_dir, Namespace, StorageManager,
};

impl StorageManager {
    pub fn in_migration(&self) -> bool {
        self.read_state_slots().in_migration
    }

    pub fn migration_block_number(&self) -> u64 {
        self.read_state_slots().migration_block_number
    }

    /// Opens the migration destination database and flips the node into the
    /// Migrating state. Fails without side effects when a migration is
    /// already running or the deployment shares a single database.
    pub fn create_migration_db_and_set_status(
        &self,
        block_number: u64,
    ) -> Result<(), StorageError> {
        if self.is_single_db() {
            return Err(StorageError::SingleBackendNotMigratable);
        }
        let mut slots = self.write_state_slots();
        if slots.in_migration {
            return Err(StorageError::AlreadyInMigration);
        }

        let dir_name = Self::migration_dir_name(block_number);
        let config = self.config();
        let migration_db = if config.state_trie_sharded() {
            Self::open_sharded_entry(
                config,
                self.remote_clients.as_ref(),
                Namespace::StateTrieMigration,
                &dir_name,
                Namespace::StateTrieMigration.ratio(),
            )?
        } else {
            Self::open_entry(
                config,
                self.remote_clients.as_ref(),
                Namespace::StateTrieMigration,
                &dir_name,
                Namespace::StateTrieMigration.ratio(),
            )?
        };

        let misc = self.database(Namespace::Misc);
        write_database_dir(misc.as_ref(), Namespace::StateTrieMigration, &dir_name)?;
        self.write_migration_status(block_number)?;

        slots.migration_db = Some(migration_db);
        slots.in_migration = true;
        slots.migration_block_number = block_number;
        info!(block_number, dir = %dir_name, "started state trie migration");
        Ok(())
    }

    /// Leaves the Migrating state, keeping the new database on success and
    /// the old one on failure. The discarded database is closed and its
    /// directory removed asynchronously; the removed path arrives on the
    /// returned channel when teardown completes.
    pub fn finish_state_migration(&self, succeed: bool) -> mpsc::Receiver<PathBuf> {
        let (sender, receiver) = mpsc::channel();
        let mut slots = self.write_state_slots();
        if !slots.in_migration {
            warn!("finish_state_migration called outside a migration");
            return receiver;
        }
        let Some(migration_db) = slots.migration_db.take() else {
            warn!("migration database slot is empty; nothing to finish");
            return receiver;
        };

        let misc = self.database(Namespace::Misc);
        let old_dir = read_database_dir(misc.as_ref(), Namespace::StateTrie)
            .unwrap_or_else(|| Namespace::StateTrie.dir_name().to_string());
        let new_dir = read_database_dir(misc.as_ref(), Namespace::StateTrieMigration)
            .unwrap_or_else(|| Self::migration_dir_name(slots.migration_block_number));

        let (kept_dir, discarded_db, discarded_dir) = if succeed {
            let old_db = std::mem::replace(&mut slots.state_trie, migration_db);
            (new_dir, old_db, old_dir)
        } else {
            (old_dir, migration_db, new_dir)
        };

        if let Err(err) = write_database_dir(misc.as_ref(), Namespace::StateTrie, &kept_dir) {
            crit("failed to persist the migrated state trie directory", &err);
        }
        if let Err(err) = clear_database_dir(misc.as_ref(), Namespace::StateTrieMigration) {
            crit("failed to clear the migration directory override", &err);
        }
        if let Err(err) = self.write_migration_status(0) {
            crit("failed to clear the migration status", &err);
        }
        slots.in_migration = false;
        slots.migration_block_number = 0;
        drop(slots);

        info!(succeed, kept = %kept_dir, discarded = %discarded_dir, "finished state trie migration");
        discarded_db.close();

        let path = self.namespace_path(&discarded_dir);
        thread::spawn(move || {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => info!(dir = %path.display(), "removed stale state trie directory"),
                Err(err) => {
                    warn!(dir = %path.display(), %err, "failed to remove stale state trie directory")
                }
            }
            let _ = sender.send(path);
        });
        receiver
    }

    // -----------------------------------------------------------------
    // State trie access
    // -----------------------------------------------------------------

    /// Reads a state-trie node; during a migration the new database is
    /// consulted first, falling back to the old one.
    pub fn read_state_trie_node(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let slots = self.read_state_slots();
        if slots.in_migration {
            if let Some(migration_db) = &slots.migration_db {
                if let Some(value) = migration_db.get(key)? {
                    return Ok(Some(value));
                }
            }
        }
        slots.state_trie.get(key)
    }

    /// Presence in either state-trie database.
    pub fn has_state_trie_node(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.read_state_trie_node(key)?.is_some())
    }

    /// Writes one state-trie node; during a migration the write lands in
    /// both databases.
    pub fn write_state_trie_node(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let slots = self.read_state_slots();
        if slots.in_migration {
            if let Some(migration_db) = &slots.migration_db {
                migration_db.put(key, value)?;
            }
        }
        slots.state_trie.put(key, value)
    }

    /// A batch over the state-trie namespace. During a migration it is a
    /// composite fanning every operation to both databases; its commit is
    /// durable only once both sides commit.
    pub fn state_trie_batch(&self) -> Box<dyn Batch> {
        let slots = self.read_state_slots();
        if slots.in_migration {
            if let Some(migration_db) = &slots.migration_db {
                return Box::new(DualBatch {
                    new: migration_db.new_batch(),
                    old: slots.state_trie.new_batch(),
                });
            }
        }
        slots.state_trie.new_batch()
    }
}

/// Composite batch fanning operations to the old and new state-trie
/// databases during a migration.
struct DualBatch {
    new: Box<dyn Batch>,
    old: Box<dyn Batch>,
}

impl KeyValueWriter for DualBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.new.put(key, value)?;
        self.old.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        self.new.delete(key)?;
        self.old.delete(key)
    }
}

impl Batch for DualBatch {
    fn value_size(&self) -> usize {
        self.new.value_size().max(self.old.value_size())
    }

    /// Commits both sides in parallel and surfaces any error; the caller
    /// must retry the whole batch if either side fails.
    fn write(&mut self) -> Result<(), StorageError> {
        let new = &mut self.new;
        let old = &mut self.old;
        let (old_result, new_result) = thread::scope(|scope| {
            let old_handle = scope.spawn(move || old.write());
            let new_result = new.write();
            let old_result = match old_handle.join() {
                Ok(result) => result,
                Err(_) => {
                    error!("state trie batch writer panicked");
                    Err(StorageError::Custom("state trie batch writer panicked".into()))
                }
            };
            (old_result, new_result)
        });
        new_result?;
        old_result
    }

    fn reset(&mut self) {
        self.new.reset();
        self.old.reset();
    }

    fn replay(&self, writer: &mut dyn KeyValueWriter) -> Result<(), StorageError> {
        // Both sides buffer the same operations; replay one of them.
        self.new.replay(writer)
    }
}
