use opal_rlp::error::RLPDecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found")]
    NotFound,
    #[error("database key must have a non-zero length")]
    EmptyKey,
    #[error("decode error: {0}")]
    Decode(#[from] RLPDecodeError),
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "rocksdb")]
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("a state trie migration is already in progress")]
    AlreadyInMigration,
    #[error("a single shared database cannot be migrated")]
    SingleBackendNotMigratable,
    #[error("governance index {0} is not greater than the last stored index {1}")]
    GovernanceIndexAlreadyExists(u64, u64),
    #[error("remote store rejected the request: {0}")]
    RemoteValidation(String),
    #[error("{0}")]
    Custom(String),
}
