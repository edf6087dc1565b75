use std::collections::HashSet;
use std::path::Path;

use tracing::{error, warn};

use crate::api::{Batch, Database, KeyValueWriter, KvEntry};
use crate::backend::{replay_ops, BatchOp};
use crate::config::DatabaseKind;
use crate::error::StorageError;
use crate::metrics::DatabaseMetrics;

/// Embedded log-structured engine.
#[derive(Debug)]
pub struct SledDatabase {
    db: sled::Db,
    metrics: DatabaseMetrics,
}

impl SledDatabase {
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        let db = sled::Config::new().path(dir).open()?;
        Ok(Self {
            db,
            metrics: DatabaseMetrics::default(),
        })
    }
}

impl Database for SledDatabase {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.metrics.record_write();
        self.db.insert(key, value)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.metrics.record_read();
        Ok(self.db.get(key)?.map(|value| value.to_vec()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.metrics.record_delete();
        self.db.remove(key)?;
        Ok(())
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(SledBatch {
            db: self.db.clone(),
            ops: Vec::new(),
            seen: HashSet::new(),
            size: 0,
        })
    }

    fn new_iterator(
        &self,
        _prefix: &[u8],
        _start: &[u8],
    ) -> Result<Box<dyn Iterator<Item = KvEntry> + '_>, StorageError> {
        // The log-structured engine does not serve the ordered-iteration
        // contract; reaching this is a wiring bug in the caller.
        error!("sled database does not support iterators");
        panic!("sled database does not support iterators");
    }

    fn meter(&self, prefix: &str) {
        self.metrics.install(prefix);
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sled
    }

    fn close(&self) {
        if let Err(err) = self.db.flush() {
            warn!(%err, "failed to flush sled database on close");
        }
    }
}

struct SledBatch {
    db: sled::Db,
    ops: Vec<BatchOp>,
    seen: HashSet<Vec<u8>>,
    size: usize,
}

impl KeyValueWriter for SledBatch {
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

impl Batch for SledBatch {
    fn value_size(&self) -> usize {
        self.size
    }

    fn write(&mut self) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        for op in &self.ops {
            match op {
                BatchOp::Put(key, value) => batch.insert(key.as_slice(), value.as_slice()),
                BatchOp::Delete(key) => batch.remove(key.as_slice()),
            }
        }
        self.db.apply_batch(batch)?;
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
    fn point_and_batch_operations() {
        let dir = TempDir::new().expect("tempdir");
        let db = SledDatabase::open(dir.path()).expect("open sled");
        db.put(b"key", b"value").unwrap();
        assert_eq!(db.get(b"key").unwrap(), Some(b"value".to_vec()));

        let mut batch = db.new_batch();
        batch.put(b"a", b"1").unwrap();
        batch.delete(b"key").unwrap();
        batch.write().unwrap();
        assert_eq!(db.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(db.get(b"key").unwrap(), None);
        db.close();
    }

    #[test]
    #[should_panic(expected = "does not support iterators")]
    fn iterator_is_unsupported() {
        let dir = TempDir::new().expect("tempdir");
        let db = SledDatabase::open(dir.path()).expect("open sled");
        let _ = db.new_iterator(b"", b"");
    }
}
