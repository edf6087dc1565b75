mod api;
mod backend;
mod cache;
mod cache_manager;
mod config;
mod manager;
mod metrics;
mod migrate;
mod schema;
mod snapshot;

pub mod error;

pub use api::{Batch, Database, KeyValueWriter, KvEntry};
pub use backend::in_memory::MemoryDatabase;
pub use backend::remote::{
    BlobStore, MemoryBlobStore, MemoryTableClient, ReadOnlyRemoteDatabase, RemoteDatabase,
    RemoteTableClient, REMOTE_VALUE_SIZE_LIMIT,
};
pub use backend::sharded::ShardedDatabase;
pub use backend::sled_db::SledDatabase;
pub use config::{CompressionKind, DatabaseKind, RemoteConfig, StorageConfig};
pub use manager::{GovernanceSet, Namespace, StorageManager, IDEAL_BATCH_SIZE};
pub use schema::TxLookupEntry;
pub use snapshot::SnapshotBatch;

#[cfg(feature = "rocksdb")]
pub use backend::rocksdb::RocksDbDatabase;
