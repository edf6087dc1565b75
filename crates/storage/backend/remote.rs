//! Remote wide-column engine with a blob side-store.
//!
//! The concrete row and blob clients are external collaborators reached
//! through [`RemoteTableClient`] and [`BlobStore`]. This module owns the
//! semantics the rest of the node depends on: oversize indirection, batch
//! chunking with explicit de-duplication, the process-wide batch-write
//! worker pool, and refcounted teardown of the shared resources.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Sender};
use crossbeam::sync::WaitGroup;
use tracing::{debug, error, info, warn};

use crate::api::{Batch, Database, KeyValueWriter, KvEntry};
use crate::config::DatabaseKind;
use crate::error::StorageError;
use crate::metrics::DatabaseMetrics;

/// Values above this size move to the blob store; the row keeps a sentinel.
/// The remote row limit is 400KB including attribute names.
pub const REMOTE_VALUE_SIZE_LIMIT: usize = 399 * 1024;

/// Items per BatchWrite request.
const REMOTE_BATCH_SIZE: usize = 25;

/// Consecutive failures tolerated before sleeping between retries.
const REMOTE_MAX_RETRY: usize = 5;

/// Process-wide batch-write workers shared by every open table.
const WORKER_COUNT: usize = 10;
const TASK_CHANNEL_SIZE: usize = WORKER_COUNT * 2;

const OVERSIZED_ITEM_SENTINEL: &[u8] = b"oversizeditem";

/// One item of a BatchWrite request; `value: None` is a delete.
#[derive(Debug, Clone)]
pub struct RemoteWriteRequest {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// Row-store capability of the remote engine.
pub trait RemoteTableClient: Send + Sync {
    fn put_item(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn get_item(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn delete_item(&self, table: &str, key: &[u8]) -> Result<(), StorageError>;

    /// Writes up to 25 items and returns the unprocessed remainder.
    /// Duplicate keys or overlength input fail with
    /// [`StorageError::RemoteValidation`], which retry cannot recover.
    fn batch_write_items(
        &self,
        table: &str,
        items: Vec<RemoteWriteRequest>,
    ) -> Result<Vec<RemoteWriteRequest>, StorageError>;
}

/// Blob side-store capability for oversized values.
pub trait BlobStore: Send + Sync {
    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn read(&self, key: &[u8]) -> Result<Vec<u8>, StorageError>;

    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;
}

struct BatchTask {
    table: String,
    items: Vec<RemoteWriteRequest>,
    wg: WaitGroup,
}

struct RemotePool {
    sender: Sender<BatchTask>,
    open_tables: usize,
}

static POOL: Mutex<Option<RemotePool>> = Mutex::new(None);

/// Registers one open table, creating the shared worker pool on first use.
fn acquire_pool(client: Arc<dyn RemoteTableClient>) -> Sender<BatchTask> {
    let mut pool = POOL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(pool) = pool.as_mut() {
        pool.open_tables += 1;
        return pool.sender.clone();
    }

    let (sender, receiver) = bounded::<BatchTask>(TASK_CHANNEL_SIZE);
    for _ in 0..WORKER_COUNT {
        let receiver = receiver.clone();
        let client = client.clone();
        thread::spawn(move || {
            debug!("remote batch-write worker started");
            for task in receiver.iter() {
                run_batch_write(client.as_ref(), &task.table, task.items);
                drop(task.wg);
            }
            debug!("remote batch-write worker stopped");
        });
    }
    info!(workers = WORKER_COUNT, "created remote batch-write workers");
    *pool = Some(RemotePool {
        sender: sender.clone(),
        open_tables: 1,
    });
    sender
}

/// Unregisters one open table; the last one tears the pool down.
fn release_pool() {
    let mut pool = POOL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(inner) = pool.as_mut() {
        inner.open_tables -= 1;
        if inner.open_tables == 0 {
            // Dropping the sender disconnects the channel and stops workers.
            *pool = None;
        }
    }
}

/// Writes one chunk, retrying unprocessed items until none remain.
/// Validation failures are fatal since no retry can fix the request.
fn run_batch_write(client: &dyn RemoteTableClient, table: &str, mut items: Vec<RemoteWriteRequest>) {
    let mut fail_count = 0usize;
    while !items.is_empty() {
        match client.batch_write_items(table, items.clone()) {
            Ok(unprocessed) => {
                if !unprocessed.is_empty() {
                    debug!(
                        table,
                        remaining = unprocessed.len(),
                        "remote batch write left unprocessed items"
                    );
                }
                items = unprocessed;
                fail_count = 0;
            }
            Err(StorageError::RemoteValidation(message)) => {
                error!(table, %message, "remote batch write rejected; cannot retry");
                panic!("remote batch write rejected: {message}");
            }
            Err(err) => {
                fail_count += 1;
                warn!(table, %err, fail_count, "remote batch write failed");
                if fail_count > REMOTE_MAX_RETRY {
                    error!(table, fail_count, "remote batch write failing repeatedly; backing off");
                    thread::sleep(Duration::from_secs(1));
                }
            }
        }
    }
}

/// A remote table holding one namespace.
pub struct RemoteDatabase {
    table_name: String,
    client: Arc<dyn RemoteTableClient>,
    blob: Arc<dyn BlobStore>,
    sender: Sender<BatchTask>,
    closed: AtomicBool,
    metrics: DatabaseMetrics,
}

impl std::fmt::Debug for RemoteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDatabase")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl RemoteDatabase {
    pub fn open(
        table_name: impl Into<String>,
        client: Arc<dyn RemoteTableClient>,
        blob: Arc<dyn BlobStore>,
    ) -> Self {
        let sender = acquire_pool(client.clone());
        Self {
            table_name: table_name.into(),
            client,
            blob,
            sender,
            closed: AtomicBool::new(false),
            metrics: DatabaseMetrics::default(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl Database for RemoteDatabase {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if key.is_empty() {
            return Ok(());
        }
        self.metrics.record_write();
        if value.len() > REMOTE_VALUE_SIZE_LIMIT {
            self.blob.write(key, value)?;
            return self
                .client
                .put_item(&self.table_name, key, OVERSIZED_ITEM_SENTINEL);
        }
        self.client.put_item(&self.table_name, key, value)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.metrics.record_read();
        match self.client.get_item(&self.table_name, key)? {
            None => Ok(None),
            Some(value) if value == OVERSIZED_ITEM_SENTINEL => {
                Ok(Some(self.blob.read(key)?))
            }
            Some(value) => Ok(Some(value)),
        }
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.metrics.record_delete();
        self.client.delete_item(&self.table_name, key)
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(RemoteBatch {
            table_name: self.table_name.clone(),
            blob: self.blob.clone(),
            sender: self.sender.clone(),
            items: Vec::new(),
            seen: HashSet::new(),
            size: 0,
            wg: Some(WaitGroup::new()),
        })
    }

    fn new_iterator(
        &self,
        _prefix: &[u8],
        _start: &[u8],
    ) -> Result<Box<dyn Iterator<Item = KvEntry> + '_>, StorageError> {
        error!("remote database does not support iterators");
        panic!("remote database does not support iterators");
    }

    fn meter(&self, prefix: &str) {
        self.metrics.install(prefix);
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Remote
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            release_pool();
        }
    }
}

struct RemoteBatch {
    table_name: String,
    blob: Arc<dyn BlobStore>,
    sender: Sender<BatchTask>,
    items: Vec<RemoteWriteRequest>,
    seen: HashSet<Vec<u8>>,
    size: usize,
    wg: Option<WaitGroup>,
}

impl RemoteBatch {
    fn enqueue(&mut self, items: Vec<RemoteWriteRequest>) {
        let wg = self.wg.get_or_insert_with(WaitGroup::new);
        let task = BatchTask {
            table: self.table_name.clone(),
            items,
            wg: wg.clone(),
        };
        if self.sender.send(task).is_err() {
            error!(table = %self.table_name, "remote worker pool is gone; dropping batch chunk");
        }
    }
}

impl KeyValueWriter for RemoteBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if value.is_empty() {
            return Ok(());
        }
        // The remote BatchWrite call rejects duplicate keys, so the batch
        // de-duplicates explicitly; the first insertion wins.
        if !self.seen.insert(key.to_vec()) {
            return Ok(());
        }

        let stored = if value.len() > REMOTE_VALUE_SIZE_LIMIT {
            let mut attempt = 0usize;
            while let Err(err) = self.blob.write(key, value) {
                attempt += 1;
                warn!(%err, attempt, "cannot write an oversized item into the blob store");
                thread::sleep(Duration::from_secs(1));
            }
            OVERSIZED_ITEM_SENTINEL.to_vec()
        } else {
            value.to_vec()
        };
        self.size += stored.len();
        self.items.push(RemoteWriteRequest {
            key: key.to_vec(),
            value: Some(stored),
        });

        if self.items.len() == REMOTE_BATCH_SIZE {
            let chunk = std::mem::take(&mut self.items);
            self.enqueue(chunk);
            self.size = 0;
            self.seen.clear();
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        if !self.seen.insert(key.to_vec()) {
            return Ok(());
        }
        self.items.push(RemoteWriteRequest {
            key: key.to_vec(),
            value: None,
        });
        if self.items.len() == REMOTE_BATCH_SIZE {
            let chunk = std::mem::take(&mut self.items);
            self.enqueue(chunk);
            self.size = 0;
            self.seen.clear();
        }
        Ok(())
    }
}

impl Batch for RemoteBatch {
    fn value_size(&self) -> usize {
        self.size
    }

    fn write(&mut self) -> Result<(), StorageError> {
        while !self.items.is_empty() {
            let take = self.items.len().min(REMOTE_BATCH_SIZE);
            let chunk: Vec<RemoteWriteRequest> = self.items.drain(..take).collect();
            self.enqueue(chunk);
        }
        if let Some(wg) = self.wg.take() {
            wg.wait();
        }
        self.wg = Some(WaitGroup::new());
        Ok(())
    }

    fn reset(&mut self) {
        self.items.clear();
        self.seen.clear();
        self.size = 0;
    }

    fn replay(&self, writer: &mut dyn KeyValueWriter) -> Result<(), StorageError> {
        for item in &self.items {
            match &item.value {
                Some(value) => writer.put(&item.key, value)?,
                None => writer.delete(&item.key)?,
            }
        }
        Ok(())
    }
}

/// Remote table variant for replica nodes: accepts every write as a no-op
/// and hands out an empty batch.
#[derive(Debug)]
pub struct ReadOnlyRemoteDatabase {
    inner: RemoteDatabase,
}

impl ReadOnlyRemoteDatabase {
    pub fn open(
        table_name: impl Into<String>,
        client: Arc<dyn RemoteTableClient>,
        blob: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            inner: RemoteDatabase::open(table_name, client, blob),
        }
    }
}

impl Database for ReadOnlyRemoteDatabase {
    fn put(&self, _key: &[u8], _value: &[u8]) -> Result<(), StorageError> {
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key)
    }

    fn delete(&self, _key: &[u8]) -> Result<(), StorageError> {
        Ok(())
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(NoopBatch)
    }

    fn new_iterator(
        &self,
        prefix: &[u8],
        start: &[u8],
    ) -> Result<Box<dyn Iterator<Item = KvEntry> + '_>, StorageError> {
        self.inner.new_iterator(prefix, start)
    }

    fn meter(&self, prefix: &str) {
        self.inner.meter(prefix);
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Remote
    }

    fn close(&self) {
        self.inner.close();
    }
}

struct NoopBatch;

impl KeyValueWriter for NoopBatch {
    fn put(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), StorageError> {
        Ok(())
    }

    fn delete(&mut self, _key: &[u8]) -> Result<(), StorageError> {
        Ok(())
    }
}

impl Batch for NoopBatch {
    fn value_size(&self) -> usize {
        0
    }

    fn write(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn reset(&mut self) {}

    fn replay(&self, _writer: &mut dyn KeyValueWriter) -> Result<(), StorageError> {
        Ok(())
    }
}

/// In-memory row-store client, used by tests and local development.
#[derive(Debug, Default)]
pub struct MemoryTableClient {
    tables: Mutex<HashMap<String, HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemoteTableClient for MemoryTableClient {
    fn put_item(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StorageError::Custom("table client lock poisoned".into()))?;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get_item(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| StorageError::Custom("table client lock poisoned".into()))?;
        Ok(tables.get(table).and_then(|rows| rows.get(key)).cloned())
    }

    fn delete_item(&self, table: &str, key: &[u8]) -> Result<(), StorageError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StorageError::Custom("table client lock poisoned".into()))?;
        if let Some(rows) = tables.get_mut(table) {
            rows.remove(key);
        }
        Ok(())
    }

    fn batch_write_items(
        &self,
        table: &str,
        items: Vec<RemoteWriteRequest>,
    ) -> Result<Vec<RemoteWriteRequest>, StorageError> {
        if items.len() > REMOTE_BATCH_SIZE {
            return Err(StorageError::RemoteValidation(format!(
                "batch holds {} items, limit is {REMOTE_BATCH_SIZE}",
                items.len()
            )));
        }
        let mut keys = HashSet::new();
        for item in &items {
            if !keys.insert(item.key.clone()) {
                return Err(StorageError::RemoteValidation(
                    "duplicate key in batch".into(),
                ));
            }
        }
        for item in items {
            match item.value {
                Some(value) => self.put_item(table, &item.key, &value)?,
                None => self.delete_item(table, &item.key)?,
            }
        }
        Ok(Vec::new())
    }
}

/// In-memory blob store, used by tests and local development.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.blobs
            .lock()
            .map(|blobs| blobs.contains_key(key))
            .unwrap_or(false)
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| StorageError::Custom("blob store lock poisoned".into()))?;
        blobs.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn read(&self, key: &[u8]) -> Result<Vec<u8>, StorageError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| StorageError::Custom("blob store lock poisoned".into()))?;
        blobs.get(key).cloned().ok_or(StorageError::NotFound)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| StorageError::Custom("blob store lock poisoned".into()))?;
        blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The worker pool and its client are process-wide, so tests that open
    // remote tables run one at a time.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn open_test_db(table: &str) -> (RemoteDatabase, Arc<MemoryBlobStore>) {
        let client = Arc::new(MemoryTableClient::new());
        let blob = Arc::new(MemoryBlobStore::new());
        let db = RemoteDatabase::open(table, client, blob.clone());
        (db, blob)
    }

    #[test]
    fn inline_value_roundtrip() {
        let _guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (db, blob) = open_test_db("inline");
        let value = vec![0x11u8; REMOTE_VALUE_SIZE_LIMIT];
        db.put(b"key", &value).unwrap();
        assert_eq!(db.get(b"key").unwrap(), Some(value));
        assert!(!blob.contains(b"key"));
        db.close();
    }

    #[test]
    fn oversized_value_moves_to_blob_store() {
        let _guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (db, blob) = open_test_db("oversize");
        let value = vec![0xaau8; 500 * 1024];
        db.put(b"big", &value).unwrap();
        assert!(blob.contains(b"big"));
        // The read resolves the indirection transparently.
        assert_eq!(db.get(b"big").unwrap(), Some(value));
        db.close();
    }

    #[test]
    fn one_byte_above_threshold_is_oversized() {
        let _guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (db, blob) = open_test_db("threshold");
        db.put(b"edge", &vec![1u8; REMOTE_VALUE_SIZE_LIMIT + 1]).unwrap();
        assert!(blob.contains(b"edge"));
        db.close();
    }

    #[test]
    fn batch_write_lands_all_items() {
        let _guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (db, _blob) = open_test_db("batch");
        let mut batch = db.new_batch();
        // More than one chunk worth of items.
        for i in 0..60u8 {
            batch.put(&[b'k', i], &[i]).unwrap();
        }
        batch.write().unwrap();
        for i in 0..60u8 {
            assert_eq!(db.get(&[b'k', i]).unwrap(), Some(vec![i]));
        }
        db.close();
    }

    #[test]
    fn batch_deduplicates_keys() {
        let _guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (db, _blob) = open_test_db("dedup");
        let mut batch = db.new_batch();
        batch.put(b"key", b"first").unwrap();
        batch.put(b"key", b"second").unwrap();
        batch.write().unwrap();
        assert_eq!(db.get(b"key").unwrap(), Some(b"first".to_vec()));
        db.close();
    }

    #[test]
    fn read_only_variant_ignores_writes() {
        let _guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let client = Arc::new(MemoryTableClient::new());
        let blob = Arc::new(MemoryBlobStore::new());
        client.put_item("ro", b"present", b"value").unwrap();

        let db = ReadOnlyRemoteDatabase::open("ro", client, blob);
        db.put(b"ignored", b"value").unwrap();
        let mut batch = db.new_batch();
        batch.put(b"ignored-too", b"value").unwrap();
        batch.write().unwrap();

        assert_eq!(db.get(b"present").unwrap(), Some(b"value".to_vec()));
        assert_eq!(db.get(b"ignored").unwrap(), None);
        assert_eq!(db.get(b"ignored-too").unwrap(), None);
        db.close();
    }
}
