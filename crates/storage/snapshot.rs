//! Flat-state snapshot accessors: account and storage entries plus the
//! control metadata that makes snapshot generation resumable.

use opal_common::H256;

use crate::api::{Batch, KeyValueWriter};
use crate::error::StorageError;
use crate::manager::{crit, DatabasePutter, Namespace, StorageManager};
use crate::schema;

impl StorageManager {
    /// The root of the block whose state the persisted snapshot covers,
    /// or the zero hash.
    pub fn read_snapshot_root(&self) -> H256 {
        let db = self.database(Namespace::Snapshot);
        match db.get(schema::SNAPSHOT_ROOT_KEY).ok().flatten() {
            Some(data) if data.len() == 32 => H256::from_slice(&data),
            _ => H256::zero(),
        }
    }

    pub fn write_snapshot_root(&self, root: H256) {
        let db = self.database(Namespace::Snapshot);
        write_snapshot_root(&mut DatabasePutter { db: db.as_ref() }, root);
    }

    /// Deleting the root marks the whole snapshot invalid, so updates can
    /// crash without leaving a partially applied snapshot behind.
    pub fn delete_snapshot_root(&self) {
        let db = self.database(Namespace::Snapshot);
        delete_snapshot_root(&mut DatabasePutter { db: db.as_ref() });
    }

    pub fn read_account_snapshot(&self, account_hash: H256) -> Option<Vec<u8>> {
        let db = self.database(Namespace::Snapshot);
        db.get(&schema::account_snapshot_key(account_hash)).ok().flatten()
    }

    pub fn write_account_snapshot(&self, account_hash: H256, entry: &[u8]) {
        let db = self.database(Namespace::Snapshot);
        write_account_snapshot(&mut DatabasePutter { db: db.as_ref() }, account_hash, entry);
    }

    pub fn delete_account_snapshot(&self, account_hash: H256) {
        let db = self.database(Namespace::Snapshot);
        delete_account_snapshot(&mut DatabasePutter { db: db.as_ref() }, account_hash);
    }

    pub fn read_storage_snapshot(&self, account_hash: H256, storage_hash: H256) -> Option<Vec<u8>> {
        let db = self.database(Namespace::Snapshot);
        db.get(&schema::storage_snapshot_key(account_hash, storage_hash))
            .ok()
            .flatten()
    }

    pub fn write_storage_snapshot(&self, account_hash: H256, storage_hash: H256, entry: &[u8]) {
        let db = self.database(Namespace::Snapshot);
        write_storage_snapshot(
            &mut DatabasePutter { db: db.as_ref() },
            account_hash,
            storage_hash,
            entry,
        );
    }

    pub fn delete_storage_snapshot(&self, account_hash: H256, storage_hash: H256) {
        let db = self.database(Namespace::Snapshot);
        delete_storage_snapshot(
            &mut DatabasePutter { db: db.as_ref() },
            account_hash,
            storage_hash,
        );
    }

    /// Walks every storage snapshot entry of one account in key order.
    pub fn iterate_storage_snapshots(
        &self,
        account_hash: H256,
    ) -> Result<impl Iterator<Item = (Vec<u8>, Vec<u8>)>, StorageError> {
        let db = self.database(Namespace::Snapshot);
        let prefix = schema::storage_snapshots_key(account_hash);
        let entries = db
            .new_iterator(&prefix, &[])?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries.into_iter())
    }

    /// The serialized in-memory diff layers saved at the last shutdown.
    pub fn read_snapshot_journal(&self) -> Option<Vec<u8>> {
        let db = self.database(Namespace::Snapshot);
        db.get(schema::SNAPSHOT_JOURNAL_KEY).ok().flatten()
    }

    pub fn write_snapshot_journal(&self, journal: &[u8]) {
        let db = self.database(Namespace::Snapshot);
        if let Err(err) = db.put(schema::SNAPSHOT_JOURNAL_KEY, journal) {
            crit("failed to store snapshot journal", &err);
        }
    }

    pub fn delete_snapshot_journal(&self) {
        let db = self.database(Namespace::Snapshot);
        if let Err(err) = db.delete(schema::SNAPSHOT_JOURNAL_KEY) {
            crit("failed to remove snapshot journal", &err);
        }
    }

    /// The serialized generator tracking incremental snapshot construction.
    pub fn read_snapshot_generator(&self) -> Option<Vec<u8>> {
        let db = self.database(Namespace::Snapshot);
        db.get(schema::SNAPSHOT_GENERATOR_KEY).ok().flatten()
    }

    pub fn write_snapshot_generator(&self, generator: &[u8]) {
        let db = self.database(Namespace::Snapshot);
        if let Err(err) = db.put(schema::SNAPSHOT_GENERATOR_KEY, generator) {
            crit("failed to store snapshot generator", &err);
        }
    }

    pub fn delete_snapshot_generator(&self) {
        let db = self.database(Namespace::Snapshot);
        if let Err(err) = db.delete(schema::SNAPSHOT_GENERATOR_KEY) {
            crit("failed to remove snapshot generator", &err);
        }
    }

    pub fn read_snapshot_disabled(&self) -> bool {
        let db = self.database(Namespace::Snapshot);
        db.has(schema::SNAPSHOT_DISABLED_KEY).unwrap_or(false)
    }

    pub fn write_snapshot_disabled(&self) {
        let db = self.database(Namespace::Snapshot);
        if let Err(err) = db.put(schema::SNAPSHOT_DISABLED_KEY, b"42") {
            crit("failed to store snapshot disabled flag", &err);
        }
    }

    pub fn delete_snapshot_disabled(&self) {
        let db = self.database(Namespace::Snapshot);
        if let Err(err) = db.delete(schema::SNAPSHOT_DISABLED_KEY) {
            crit("failed to remove snapshot disabled flag", &err);
        }
    }

    /// The block number of the last persisted snapshot layer.
    pub fn read_snapshot_recovery_number(&self) -> Option<u64> {
        let db = self.database(Namespace::Snapshot);
        let data = db.get(schema::SNAPSHOT_RECOVERY_KEY).ok().flatten()?;
        if data.len() != 8 {
            return None;
        }
        Some(u64::from_be_bytes(data.try_into().ok()?))
    }

    pub fn write_snapshot_recovery_number(&self, number: u64) {
        let db = self.database(Namespace::Snapshot);
        if let Err(err) = db.put(
            schema::SNAPSHOT_RECOVERY_KEY,
            &schema::encode_block_number(number),
        ) {
            crit("failed to store snapshot recovery number", &err);
        }
    }

    pub fn delete_snapshot_recovery_number(&self) {
        let db = self.database(Namespace::Snapshot);
        if let Err(err) = db.delete(schema::SNAPSHOT_RECOVERY_KEY) {
            crit("failed to remove snapshot recovery number", &err);
        }
    }

    /// A batch bundling snapshot writes for atomic application.
    pub fn new_snapshot_batch(&self) -> SnapshotBatch {
        SnapshotBatch {
            batch: self.new_batch(Namespace::Snapshot),
        }
    }
}

/// A batch over the snapshot namespace with typed helpers for each entry
/// family.
pub struct SnapshotBatch {
    batch: Box<dyn Batch>,
}

impl SnapshotBatch {
    pub fn write_snapshot_root(&mut self, root: H256) {
        write_snapshot_root(&mut *self.batch, root);
    }

    pub fn delete_snapshot_root(&mut self) {
        delete_snapshot_root(&mut *self.batch);
    }

    pub fn write_account_snapshot(&mut self, account_hash: H256, entry: &[u8]) {
        write_account_snapshot(&mut *self.batch, account_hash, entry);
    }

    pub fn delete_account_snapshot(&mut self, account_hash: H256) {
        delete_account_snapshot(&mut *self.batch, account_hash);
    }

    pub fn write_storage_snapshot(&mut self, account_hash: H256, storage_hash: H256, entry: &[u8]) {
        write_storage_snapshot(&mut *self.batch, account_hash, storage_hash, entry);
    }

    pub fn delete_storage_snapshot(&mut self, account_hash: H256, storage_hash: H256) {
        delete_storage_snapshot(&mut *self.batch, account_hash, storage_hash);
    }

    pub fn value_size(&self) -> usize {
        self.batch.value_size()
    }

    pub fn write(&mut self) -> Result<(), StorageError> {
        self.batch.write()
    }

    pub fn reset(&mut self) {
        self.batch.reset();
    }
}

fn write_snapshot_root(writer: &mut dyn KeyValueWriter, root: H256) {
    if let Err(err) = writer.put(schema::SNAPSHOT_ROOT_KEY, root.as_bytes()) {
        crit("failed to store snapshot root", &err);
    }
}

fn delete_snapshot_root(writer: &mut dyn KeyValueWriter) {
    if let Err(err) = writer.delete(schema::SNAPSHOT_ROOT_KEY) {
        crit("failed to remove snapshot root", &err);
    }
}

fn write_account_snapshot(writer: &mut dyn KeyValueWriter, account_hash: H256, entry: &[u8]) {
    if let Err(err) = writer.put(&schema::account_snapshot_key(account_hash), entry) {
        crit("failed to store account snapshot", &err);
    }
}

fn delete_account_snapshot(writer: &mut dyn KeyValueWriter, account_hash: H256) {
    if let Err(err) = writer.delete(&schema::account_snapshot_key(account_hash)) {
        crit("failed to delete account snapshot", &err);
    }
}

fn write_storage_snapshot(
    writer: &mut dyn KeyValueWriter,
    account_hash: H256,
    storage_hash: H256,
    entry: &[u8],
) {
    if let Err(err) = writer.put(
        &schema::storage_snapshot_key(account_hash, storage_hash),
        entry,
    ) {
        crit("failed to store storage snapshot", &err);
    }
}

fn delete_storage_snapshot(
    writer: &mut dyn KeyValueWriter,
    account_hash: H256,
    storage_hash: H256,
) {
    if let Err(err) = writer.delete(&schema::storage_snapshot_key(account_hash, storage_hash)) {
        crit("failed to delete storage snapshot", &err);
    }
}
