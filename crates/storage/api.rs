//! Capability traits every key-value engine provides.
//!
//! The rest of the crate only speaks these traits; concrete engines live in
//! [`crate::backend`]. Absence is `Ok(None)`, never an error, and a stored
//! empty value reads back as `Some(vec![])`.

use std::fmt::Debug;

use crate::config::DatabaseKind;
use crate::error::StorageError;

/// One key-value pair yielded by a prefix iterator.
pub type KvEntry = Result<(Vec<u8>, Vec<u8>), StorageError>;

/// Write sink shared by engines and batches, used to replay a batch into
/// another destination.
pub trait KeyValueWriter {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError>;
}

/// A buffered, write-only sequence of puts and deletes committed atomically
/// by [`write`](Batch::write). Batches are single-threaded.
pub trait Batch: KeyValueWriter + Send {
    /// Amount of buffered value bytes, used as a flush threshold.
    fn value_size(&self) -> usize;

    /// Commits the buffered operations to the engine.
    fn write(&mut self) -> Result<(), StorageError>;

    /// Discards the buffered operations, keeping the batch reusable.
    fn reset(&mut self);

    /// Replays the buffered operations into `writer`.
    fn replay(&self, writer: &mut dyn KeyValueWriter) -> Result<(), StorageError>;
}

/// A concrete key-value engine.
pub trait Database: Send + Sync + Debug {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Existence is defined as "get succeeded", so a stored empty value
    /// counts as present on every engine.
    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    fn new_batch(&self) -> Box<dyn Batch>;

    /// Iterates key-value pairs in lexicographic order, restricted to keys
    /// carrying `prefix` and starting at the first key >= `prefix + start`.
    ///
    /// Engines without ordered iteration (the embedded log-structured store)
    /// panic here with a descriptive message.
    fn new_iterator(
        &self,
        prefix: &[u8],
        start: &[u8],
    ) -> Result<Box<dyn Iterator<Item = KvEntry> + '_>, StorageError>;

    /// Installs the metric counter family under the given name prefix.
    fn meter(&self, prefix: &str);

    /// Engine kind, for logging only.
    fn kind(&self) -> DatabaseKind;

    /// Releases the engine. Idempotent.
    fn close(&self);
}
