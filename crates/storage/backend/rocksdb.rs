use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{BlockBasedOptions, Cache, Options, WriteBatch, DB};
use tracing::debug;

use crate::api::{Batch, Database, KeyValueWriter, KvEntry};
use crate::backend::{replay_ops, BatchOp};
use crate::config::DatabaseKind;
use crate::error::StorageError;
use crate::metrics::DatabaseMetrics;

const MIN_CACHE_SIZE_MB: usize = 16;
const MIN_OPEN_FILES: i32 = 16;

/// Embedded LSM engine, one instance per namespace directory.
#[derive(Debug)]
pub struct RocksDbDatabase {
    db: Arc<DB>,
    path: PathBuf,
    metrics: DatabaseMetrics,
}

impl RocksDbDatabase {
    /// Opens or creates the store at `dir`.
    ///
    /// `cache_size_mb` and `open_files_limit` are this namespace's share of
    /// the global budget; half the cache budget goes to the block cache and
    /// half to write buffers, the way the original node splits it.
    pub fn open(
        dir: &Path,
        cache_size_mb: usize,
        open_files_limit: i32,
        compress: bool,
    ) -> Result<Self, StorageError> {
        let cache_size_mb = cache_size_mb.max(MIN_CACHE_SIZE_MB);
        let open_files_limit = open_files_limit.max(MIN_OPEN_FILES);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(open_files_limit);
        opts.set_write_buffer_size(cache_size_mb / 2 * 1024 * 1024);
        opts.set_max_write_buffer_number(3);
        opts.set_compression_type(if compress {
            rocksdb::DBCompressionType::Snappy
        } else {
            rocksdb::DBCompressionType::None
        });

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(cache_size_mb / 2 * 1024 * 1024);
        block_opts.set_block_cache(&cache);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        let db = Arc::new(DB::open(&opts, dir)?);
        debug!(dir = %dir.display(), cache_size_mb, open_files_limit, "opened rocksdb database");
        Ok(Self {
            db,
            path: dir.to_path_buf(),
            metrics: DatabaseMetrics::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Database for RocksDbDatabase {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.metrics.record_write();
        self.db.put(key, value)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.metrics.record_read();
        Ok(self.db.get(key)?)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.metrics.record_delete();
        self.db.delete(key)?;
        Ok(())
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(RocksDbBatch {
            db: self.db.clone(),
            ops: Vec::new(),
            seen: HashSet::new(),
            size: 0,
        })
    }

    fn new_iterator(
        &self,
        prefix: &[u8],
        start: &[u8],
    ) -> Result<Box<dyn Iterator<Item = KvEntry> + '_>, StorageError> {
        let mut from = prefix.to_vec();
        from.extend_from_slice(start);
        let prefix = prefix.to_vec();
        let iter = self
            .db
            .iterator(rocksdb::IteratorMode::From(
                &from,
                rocksdb::Direction::Forward,
            ))
            .map(|entry| {
                entry
                    .map(|(key, value)| (key.to_vec(), value.to_vec()))
                    .map_err(StorageError::from)
            })
            .take_while(move |entry| match entry {
                Ok((key, _)) => key.starts_with(&prefix),
                Err(_) => true,
            });
        Ok(Box::new(iter))
    }

    fn meter(&self, prefix: &str) {
        self.metrics.install(prefix);
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::RocksDb
    }

    fn close(&self) {
        // Dropping the handle closes the store; nothing to do eagerly.
        debug!(dir = %self.path.display(), "closing rocksdb database");
    }
}

struct RocksDbBatch {
    db: Arc<DB>,
    ops: Vec<BatchOp>,
    seen: HashSet<Vec<u8>>,
    size: usize,
}

impl KeyValueWriter for RocksDbBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if !self.seen.insert(key.to_vec()) {
            return Ok(());
        }
        self.size += value.len();
        self.ops.push(BatchOp::Put(key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        if !self.seen.insert(key.to_vec()) {
            return Ok(());
        }
        self.ops.push(BatchOp::Delete(key.to_vec()));
        Ok(())
    }
}

impl Batch for RocksDbBatch {
    fn value_size(&self) -> usize {
        self.size
    }

    fn write(&mut self) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for op in &self.ops {
            match op {
                BatchOp::Put(key, value) => batch.put(key, value),
                BatchOp::Delete(key) => batch.delete(key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.ops.clear();
        self.seen.clear();
        self.size = 0;
    }

    fn replay(&self, writer: &mut dyn KeyValueWriter) -> Result<(), StorageError> {
        replay_ops(&self.ops, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn point_batch_and_iterator() {
        let dir = TempDir::new().expect("tempdir");
        let db = RocksDbDatabase::open(dir.path(), 16, 64, false).expect("open rocksdb");

        db.put(b"a1", b"v1").unwrap();
        db.put(b"a2", b"v2").unwrap();
        db.put(b"b1", b"other").unwrap();
        assert_eq!(db.get(b"a1").unwrap(), Some(b"v1".to_vec()));

        let mut batch = db.new_batch();
        batch.put(b"a3", b"v3").unwrap();
        batch.delete(b"a1").unwrap();
        batch.write().unwrap();

        let keys: Vec<Vec<u8>> = db
            .new_iterator(b"a", b"")
            .unwrap()
            .map(|entry| entry.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"a2".to_vec(), b"a3".to_vec()]);
        db.close();
    }
}
