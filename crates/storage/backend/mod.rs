pub mod in_memory;
pub mod remote;
pub mod sharded;
pub mod sled_db;

#[cfg(feature = "rocksdb")]
pub mod rocksdb;

use std::path::Path;
use std::sync::Arc;

use crate::api::{Batch, Database, KeyValueWriter};
use crate::config::{DatabaseKind, StorageConfig};
use crate::error::StorageError;

/// One buffered batch operation.
#[derive(Debug, Clone)]
pub(crate) enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl BatchOp {
    pub(crate) fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put(key, _) => key,
            BatchOp::Delete(key) => key,
        }
    }
}

/// Replays buffered operations into a writer; shared by the buffering
/// batch implementations.
pub(crate) fn replay_ops(
    ops: &[BatchOp],
    writer: &mut dyn KeyValueWriter,
) -> Result<(), StorageError> {
    for op in ops {
        match op {
            BatchOp::Put(key, value) => writer.put(key, value)?,
            BatchOp::Delete(key) => writer.delete(key)?,
        }
    }
    Ok(())
}

/// Opens the engine configured for one namespace directory.
///
/// `cache_size_mb` and `open_files_limit` already carry this namespace's
/// share of the global budget. The remote engine is opened by the manager
/// directly since it needs externally supplied clients.
pub fn open_namespace_database(
    config: &StorageConfig,
    dir: &Path,
    cache_size_mb: usize,
    open_files_limit: i32,
    compress: bool,
) -> Result<Arc<dyn Database>, StorageError> {
    match config.db_kind.base() {
        #[cfg(feature = "rocksdb")]
        DatabaseKind::RocksDb => Ok(Arc::new(rocksdb::RocksDbDatabase::open(
            dir,
            cache_size_mb,
            open_files_limit,
            compress,
        )?)),
        #[cfg(not(feature = "rocksdb"))]
        DatabaseKind::RocksDb => Err(StorageError::InvalidConfig(
            "this build does not include the rocksdb engine".into(),
        )),
        DatabaseKind::Sled => Ok(Arc::new(sled_db::SledDatabase::open(dir)?)),
        DatabaseKind::InMemory => Ok(Arc::new(in_memory::MemoryDatabase::new())),
        DatabaseKind::Remote => Err(StorageError::InvalidConfig(
            "remote databases must be opened with their clients".into(),
        )),
        DatabaseKind::Sharded => unreachable!("base() never returns Sharded"),
    }
}

/// Batch flushing helper: writes and resets once the buffered size crosses
/// the threshold.
pub(crate) fn flush_if_full(batch: &mut dyn Batch, threshold: usize) -> Result<(), StorageError> {
    if batch.value_size() > threshold {
        batch.write()?;
        batch.reset();
    }
    Ok(())
}
