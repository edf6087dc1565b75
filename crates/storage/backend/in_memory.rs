use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::api::{Batch, Database, KeyValueWriter, KvEntry};
use crate::backend::{replay_ops, BatchOp};
use crate::config::DatabaseKind;
use crate::error::StorageError;
use crate::metrics::DatabaseMetrics;

type Store = Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>;

fn lock_poisoned() -> StorageError {
    StorageError::Custom("in-memory store lock poisoned".to_string())
}

/// In-memory engine over an ordered map; used by tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    inner: Store,
    metrics: DatabaseMetrics,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Database for MemoryDatabase {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.metrics.record_write();
        let mut map = self.inner.write().map_err(|_| lock_poisoned())?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.metrics.record_read();
        let map = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.metrics.record_delete();
        let mut map = self.inner.write().map_err(|_| lock_poisoned())?;
        map.remove(key);
        Ok(())
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(MemoryBatch {
            inner: self.inner.clone(),
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
        let map = self.inner.read().map_err(|_| lock_poisoned())?;
        let mut from = prefix.to_vec();
        from.extend_from_slice(start);
        // Snapshot the matching range; iteration stays valid after writes.
        let entries: Vec<KvEntry> = map
            .range(from..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| Ok((key.clone(), value.clone())))
            .collect();
        Ok(Box::new(entries.into_iter()))
    }

    fn meter(&self, prefix: &str) {
        self.metrics.install(prefix);
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::InMemory
    }

    fn close(&self) {}
}

struct MemoryBatch {
    inner: Store,
    ops: Vec<BatchOp>,
    seen: HashSet<Vec<u8>>,
    size: usize,
}

impl KeyValueWriter for MemoryBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        // The first operation on a key wins within a batch.
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

impl Batch for MemoryBatch {
    fn value_size(&self) -> usize {
        self.size
    }

    fn write(&mut self) -> Result<(), StorageError> {
        let mut map = self.inner.write().map_err(|_| lock_poisoned())?;
        for op in &self.ops {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key.clone(), value.clone());
                }
                BatchOp::Delete(key) => {
                    map.remove(key);
                }
            }
        }
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

    #[test]
    fn point_operations() {
        let db = MemoryDatabase::new();
        assert_eq!(db.get(b"missing").unwrap(), None);
        db.put(b"key", b"value").unwrap();
        assert_eq!(db.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert!(db.has(b"key").unwrap());
        db.delete(b"key").unwrap();
        assert_eq!(db.get(b"key").unwrap(), None);
    }

    #[test]
    fn empty_value_reads_back_as_present() {
        let db = MemoryDatabase::new();
        db.put(b"key", b"").unwrap();
        assert_eq!(db.get(b"key").unwrap(), Some(vec![]));
        assert!(db.has(b"key").unwrap());
    }

    #[test]
    fn batch_applies_on_write_only() {
        let db = MemoryDatabase::new();
        let mut batch = db.new_batch();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"22").unwrap();
        batch.delete(b"c").unwrap();
        assert_eq!(batch.value_size(), 3);
        assert_eq!(db.get(b"a").unwrap(), None);
        batch.write().unwrap();
        assert_eq!(db.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(db.get(b"b").unwrap(), Some(b"22".to_vec()));
    }

    #[test]
    fn batch_first_insertion_wins() {
        let db = MemoryDatabase::new();
        let mut batch = db.new_batch();
        batch.put(b"key", b"first").unwrap();
        batch.put(b"key", b"second").unwrap();
        batch.write().unwrap();
        assert_eq!(db.get(b"key").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn iterator_respects_prefix_and_start() {
        let db = MemoryDatabase::new();
        db.put(b"a1", b"v1").unwrap();
        db.put(b"a2", b"v2").unwrap();
        db.put(b"a3", b"v3").unwrap();
        db.put(b"b1", b"other").unwrap();
        let keys: Vec<Vec<u8>> = db
            .new_iterator(b"a", b"2")
            .unwrap()
            .map(|entry| entry.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"a2".to_vec(), b"a3".to_vec()]);
    }

    #[test]
    fn batch_replay() {
        #[derive(Default)]
        struct Recorder(Vec<(Vec<u8>, Option<Vec<u8>>)>);

        impl KeyValueWriter for Recorder {
            fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
                self.0.push((key.to_vec(), Some(value.to_vec())));
                Ok(())
            }

            fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
                self.0.push((key.to_vec(), None));
                Ok(())
            }
        }

        let db = MemoryDatabase::new();
        let mut batch = db.new_batch();
        batch.put(b"a", b"1").unwrap();
        batch.delete(b"b").unwrap();

        let mut recorder = Recorder::default();
        batch.replay(&mut recorder).unwrap();
        assert_eq!(
            recorder.0,
            vec![
                (b"a".to_vec(), Some(b"1".to_vec())),
                (b"b".to_vec(), None),
            ]
        );
    }
}
