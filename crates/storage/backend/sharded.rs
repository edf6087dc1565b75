//! A namespace fanned out over N shards, keyed by the first byte of the key.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use tracing::{error, info};

use crate::api::{Batch, Database, KeyValueWriter, KvEntry};
use crate::config::{DatabaseKind, MAX_STATE_TRIE_SHARDS};
use crate::error::StorageError;

struct ShardBatchTask {
    batch: Box<dyn Batch>,
    index: usize,
    result_sender: Sender<ShardBatchResult>,
}

struct ShardBatchResult {
    batch: Box<dyn Batch>,
    index: usize,
    result: Result<(), StorageError>,
}

/// Fans one namespace across `num_shards` databases; batch commits go
/// through a worker pool with one worker per shard.
pub struct ShardedDatabase {
    shards: Vec<Arc<dyn Database>>,
    num_shards: u32,
    task_sender: Mutex<Option<Sender<ShardBatchTask>>>,
}

impl std::fmt::Debug for ShardedDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedDatabase")
            .field("num_shards", &self.num_shards)
            .finish()
    }
}

fn shard_index(key: &[u8], num_shards: u32) -> Result<usize, StorageError> {
    if key.is_empty() {
        return Err(StorageError::EmptyKey);
    }
    Ok(key[0] as usize & (num_shards as usize - 1))
}

fn batch_write_worker(tasks: Receiver<ShardBatchTask>) {
    for task in tasks.iter() {
        let mut batch = task.batch;
        let result = batch.write();
        // The batch travels back so the composite can reuse it.
        let _ = task.result_sender.send(ShardBatchResult {
            batch,
            index: task.index,
            result,
        });
    }
}

impl ShardedDatabase {
    /// Opens `num_shards` shards through `open_shard(index)` and starts the
    /// batch-commit workers.
    pub fn open<F>(num_shards: u32, open_shard: F) -> Result<Self, StorageError>
    where
        F: Fn(usize) -> Result<Arc<dyn Database>, StorageError>,
    {
        if num_shards == 0 {
            return Err(StorageError::InvalidConfig(
                "shard count must be greater than zero".into(),
            ));
        }
        if !num_shards.is_power_of_two() {
            return Err(StorageError::InvalidConfig(format!(
                "shard count must be a power of two, got {num_shards}"
            )));
        }
        if num_shards > MAX_STATE_TRIE_SHARDS {
            return Err(StorageError::InvalidConfig(format!(
                "shard count must be at most {MAX_STATE_TRIE_SHARDS}, got {num_shards}"
            )));
        }

        let (task_sender, task_receiver) = bounded::<ShardBatchTask>(num_shards as usize * 2);
        let mut shards = Vec::with_capacity(num_shards as usize);
        for index in 0..num_shards as usize {
            shards.push(open_shard(index)?);
            let receiver = task_receiver.clone();
            thread::spawn(move || batch_write_worker(receiver));
        }

        info!(num_shards, "created a sharded database");
        Ok(Self {
            shards,
            num_shards,
            task_sender: Mutex::new(Some(task_sender)),
        })
    }

    fn shard_for(&self, key: &[u8]) -> Result<&Arc<dyn Database>, StorageError> {
        Ok(&self.shards[shard_index(key, self.num_shards)?])
    }

    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }
}

impl Database for ShardedDatabase {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.shard_for(key)?.put(key, value)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.shard_for(key)?.get(key)
    }

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.shard_for(key)?.has(key)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.shard_for(key)?.delete(key)
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        let batches = self
            .shards
            .iter()
            .map(|shard| Some(shard.new_batch()))
            .collect();
        let task_sender = self
            .task_sender
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().cloned());
        let (result_sender, result_receiver) = unbounded();
        Box::new(ShardedBatch {
            batches,
            task_sender,
            result_sender,
            result_receiver,
        })
    }

    fn new_iterator(
        &self,
        prefix: &[u8],
        start: &[u8],
    ) -> Result<Box<dyn Iterator<Item = KvEntry> + '_>, StorageError> {
        let mut iterators = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            iterators.push(shard.new_iterator(prefix, start)?);
        }
        Ok(Box::new(MergedIterator::new(iterators)))
    }

    fn meter(&self, prefix: &str) {
        for (index, shard) in self.shards.iter().enumerate() {
            shard.meter(&format!("{prefix}{index}"));
        }
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sharded
    }

    fn close(&self) {
        // Dropping the sender disconnects the channel and stops the workers.
        if let Ok(mut sender) = self.task_sender.lock() {
            sender.take();
        }
        for shard in &self.shards {
            shard.close();
        }
    }
}

struct ShardedBatch {
    batches: Vec<Option<Box<dyn Batch>>>,
    task_sender: Option<Sender<ShardBatchTask>>,
    result_sender: Sender<ShardBatchResult>,
    result_receiver: Receiver<ShardBatchResult>,
}

impl ShardedBatch {
    fn batch_for(&mut self, key: &[u8]) -> Result<&mut Box<dyn Batch>, StorageError> {
        let index = shard_index(key, self.batches.len() as u32)?;
        self.batches[index]
            .as_mut()
            .ok_or_else(|| StorageError::Custom("shard batch is in flight".into()))
    }
}

impl KeyValueWriter for ShardedBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.batch_for(key)?.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        self.batch_for(key)?.delete(key)
    }
}

impl Batch for ShardedBatch {
    /// The largest of the shard batches, so a size-based flush fires as
    /// soon as any one shard crosses the threshold.
    fn value_size(&self) -> usize {
        self.batches
            .iter()
            .flatten()
            .map(|batch| batch.value_size())
            .max()
            .unwrap_or(0)
    }

    fn write(&mut self) -> Result<(), StorageError> {
        let task_sender = self
            .task_sender
            .as_ref()
            .ok_or_else(|| StorageError::Custom("sharded database is closed".into()))?;

        let mut in_flight = 0usize;
        for (index, slot) in self.batches.iter_mut().enumerate() {
            let Some(batch) = slot.take() else { continue };
            let task = ShardBatchTask {
                batch,
                index,
                result_sender: self.result_sender.clone(),
            };
            task_sender
                .send(task)
                .map_err(|_| StorageError::Custom("sharded database is closed".into()))?;
            in_flight += 1;
        }

        // Every shard reports; each error is logged but only the last one
        // is returned, which still signals that some shard failed.
        let mut last_error = None;
        for _ in 0..in_flight {
            let outcome = self
                .result_receiver
                .recv()
                .map_err(|_| StorageError::Custom("sharded batch worker is gone".into()))?;
            self.batches[outcome.index] = Some(outcome.batch);
            if let Err(err) = outcome.result {
                error!(shard = outcome.index, %err, "error while writing sharded batch");
                last_error = Some(err);
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn reset(&mut self) {
        for batch in self.batches.iter_mut().flatten() {
            batch.reset();
        }
    }

    fn replay(&self, writer: &mut dyn KeyValueWriter) -> Result<(), StorageError> {
        for batch in self.batches.iter().flatten() {
            batch.replay(writer)?;
        }
        Ok(())
    }
}

/// K-way merge of per-shard iterators in lexicographic key order.
struct MergedIterator<'a> {
    iterators: Vec<Box<dyn Iterator<Item = KvEntry> + 'a>>,
    heap: BinaryHeap<Reverse<(Vec<u8>, Vec<u8>, usize)>>,
    failed: Option<StorageError>,
}

impl<'a> MergedIterator<'a> {
    fn new(mut iterators: Vec<Box<dyn Iterator<Item = KvEntry> + 'a>>) -> Self {
        let mut heap = BinaryHeap::new();
        let mut failed = None;
        for (index, iterator) in iterators.iter_mut().enumerate() {
            match iterator.next() {
                Some(Ok((key, value))) => heap.push(Reverse((key, value, index))),
                Some(Err(err)) => failed = Some(err),
                None => {}
            }
        }
        Self {
            iterators,
            heap,
            failed,
        }
    }
}

impl Iterator for MergedIterator<'_> {
    type Item = KvEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.failed.take() {
            return Some(Err(err));
        }
        let Reverse((key, value, index)) = self.heap.pop()?;
        match self.iterators[index].next() {
            Some(Ok((next_key, next_value))) => {
                self.heap.push(Reverse((next_key, next_value, index)))
            }
            Some(Err(err)) => self.failed = Some(err),
            None => {}
        }
        Some(Ok((key, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::in_memory::MemoryDatabase;

    fn open_memory_sharded(num_shards: u32) -> ShardedDatabase {
        ShardedDatabase::open(num_shards, |_| {
            Ok(Arc::new(MemoryDatabase::new()) as Arc<dyn Database>)
        })
        .expect("open sharded database")
    }

    #[test]
    fn shard_dispatch_uses_first_byte() {
        assert_eq!(shard_index(&[0x07], 4).unwrap(), 3);
        assert_eq!(shard_index(&[0x00], 4).unwrap(), 0);
        assert_eq!(shard_index(&[0xff], 4).unwrap(), 3);
        assert_eq!(shard_index(&[0x10, 0xff], 16).unwrap(), 0);
    }

    #[test]
    fn empty_key_is_rejected() {
        let db = open_memory_sharded(4);
        assert!(matches!(db.put(b"", b"v"), Err(StorageError::EmptyKey)));
        assert!(matches!(db.get(b""), Err(StorageError::EmptyKey)));
        db.close();
    }

    #[test]
    fn shard_counts_are_validated() {
        assert!(ShardedDatabase::open(3, |_| Ok(
            Arc::new(MemoryDatabase::new()) as Arc<dyn Database>
        ))
        .is_err());
        assert!(ShardedDatabase::open(32, |_| Ok(
            Arc::new(MemoryDatabase::new()) as Arc<dyn Database>
        ))
        .is_err());
    }

    #[test]
    fn values_land_in_the_dispatched_shard_only() {
        let shards: Vec<Arc<MemoryDatabase>> =
            (0..4).map(|_| Arc::new(MemoryDatabase::new())).collect();
        let handles = shards.clone();
        let db = ShardedDatabase::open(4, move |index| {
            Ok(handles[index].clone() as Arc<dyn Database>)
        })
        .expect("open sharded database");

        db.put(&[0x07, 0x01], b"value").unwrap();
        assert_eq!(shards[3].len(), 1);
        for other in [0usize, 1, 2] {
            assert!(shards[other].is_empty());
        }
        assert_eq!(db.get(&[0x07, 0x01]).unwrap(), Some(b"value".to_vec()));
        db.close();
    }

    #[test]
    fn batch_value_size_is_the_maximum_across_shards() {
        let db = open_memory_sharded(4);
        let mut batch = db.new_batch();
        batch.put(&[0x00], &vec![0u8; 10]).unwrap();
        batch.put(&[0x01], &vec![0u8; 30]).unwrap();
        batch.put(&[0x02], &vec![0u8; 20]).unwrap();
        assert_eq!(batch.value_size(), 30);
        db.close();
    }

    #[test]
    fn batch_write_commits_every_shard() {
        let db = open_memory_sharded(4);
        let mut batch = db.new_batch();
        for byte in 0u8..32 {
            batch.put(&[byte, 0xee], &[byte]).unwrap();
        }
        batch.write().unwrap();
        for byte in 0u8..32 {
            assert_eq!(db.get(&[byte, 0xee]).unwrap(), Some(vec![byte]));
        }
        // The batch is reusable after a write.
        batch.reset();
        batch.put(&[0x05], b"again").unwrap();
        batch.write().unwrap();
        assert_eq!(db.get(&[0x05]).unwrap(), Some(b"again".to_vec()));
        db.close();
    }

    #[test]
    fn iterator_merges_shards_in_order() {
        let db = open_memory_sharded(4);
        for byte in [0x03u8, 0x01, 0x02, 0x00, 0x07] {
            db.put(&[byte, b'k'], &[byte]).unwrap();
        }
        let keys: Vec<Vec<u8>> = db
            .new_iterator(b"", b"")
            .unwrap()
            .map(|entry| entry.unwrap().0)
            .collect();
        assert_eq!(
            keys,
            vec![
                vec![0x00, b'k'],
                vec![0x01, b'k'],
                vec![0x02, b'k'],
                vec![0x03, b'k'],
                vec![0x07, b'k'],
            ]
        );
        db.close();
    }
}
