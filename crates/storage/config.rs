use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Largest allowed state-trie shard count.
pub const MAX_STATE_TRIE_SHARDS: u32 = 16;

/// The concrete key-value engine behind a namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseKind {
    /// Embedded LSM store.
    RocksDb,
    /// Embedded log-structured store. No ordered iteration.
    Sled,
    /// In-memory map, for tests and ephemeral nodes.
    InMemory,
    /// Remote wide-column store with a blob side-store.
    Remote,
    /// A namespace fanned out over several shards of another kind.
    Sharded,
}

impl DatabaseKind {
    /// The engine each shard of a sharded namespace uses.
    pub fn base(self) -> DatabaseKind {
        match self {
            DatabaseKind::Sharded => DatabaseKind::RocksDb,
            other => other,
        }
    }
}

impl FromStr for DatabaseKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rocksdb" | "embeddedlsm" => Ok(DatabaseKind::RocksDb),
            "sled" | "embeddedlog" => Ok(DatabaseKind::Sled),
            "memory" | "inmemory" => Ok(DatabaseKind::InMemory),
            "remote" | "remotekv" => Ok(DatabaseKind::Remote),
            "sharded" => Ok(DatabaseKind::Sharded),
            other => Err(StorageError::InvalidConfig(format!(
                "unknown database kind: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DatabaseKind::RocksDb => "rocksdb",
            DatabaseKind::Sled => "sled",
            DatabaseKind::InMemory => "inmemory",
            DatabaseKind::Remote => "remote",
            DatabaseKind::Sharded => "sharded",
        };
        f.write_str(name)
    }
}

/// Compression policy across namespaces. Only receipts and the state trie
/// may deviate from the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionKind {
    #[default]
    AllNoCompression,
    ReceiptsOnlySnappy,
    StateTrieOnlyNoCompression,
    AllSnappy,
}

/// Remote wide-column store tunables.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub table_name: String,
    pub region: String,
    pub endpoint: String,
    /// Provisioned billing when true, on-demand otherwise.
    pub is_provisioned: bool,
    pub read_capacity_units: i64,
    pub write_capacity_units: i64,
    pub blob_endpoint: String,
    pub read_only: bool,
    pub perf_check: bool,
}

/// Database-related configuration of a node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory; each namespace becomes a subdirectory unless
    /// `single_db`.
    pub dir: PathBuf,
    pub db_kind: DatabaseKind,
    /// One physical database holds every namespace. Migration is
    /// disallowed in this layout.
    pub single_db: bool,
    pub num_state_trie_shards: u32,
    pub parallel_db_write: bool,
    pub open_files_limit: i32,
    /// Block cache plus write buffer budget, divided across namespaces.
    pub lsm_cache_size_mb: usize,
    pub compression: CompressionKind,
    pub buffer_pool: bool,
    pub remote: Option<RemoteConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("chaindata"),
            db_kind: DatabaseKind::RocksDb,
            single_db: false,
            num_state_trie_shards: 1,
            parallel_db_write: true,
            open_files_limit: 1024,
            lsm_cache_size_mb: 768,
            compression: CompressionKind::AllNoCompression,
            buffer_pool: true,
            remote: None,
        }
    }
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self {
            db_kind: DatabaseKind::InMemory,
            ..Default::default()
        }
    }

    /// Validates the shard count and engine combination. Called once at
    /// node start; failures abort startup.
    pub fn validate(&self) -> Result<(), StorageError> {
        let shards = self.num_state_trie_shards;
        if shards == 0 {
            return Err(StorageError::InvalidConfig(
                "numStateTrieShards must be greater than zero".into(),
            ));
        }
        if !shards.is_power_of_two() {
            return Err(StorageError::InvalidConfig(format!(
                "numStateTrieShards must be a power of two, got {shards}"
            )));
        }
        if shards > MAX_STATE_TRIE_SHARDS {
            return Err(StorageError::InvalidConfig(format!(
                "numStateTrieShards must be at most {MAX_STATE_TRIE_SHARDS}, got {shards}"
            )));
        }
        if self.db_kind == DatabaseKind::Remote && self.remote.is_none() {
            return Err(StorageError::InvalidConfig(
                "remote database kind requires remote settings".into(),
            ));
        }
        Ok(())
    }

    pub fn state_trie_sharded(&self) -> bool {
        self.db_kind == DatabaseKind::Sharded || self.num_state_trie_shards > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parsing_is_case_insensitive() {
        assert_eq!("RocksDB".parse::<DatabaseKind>().unwrap(), DatabaseKind::RocksDb);
        assert_eq!("embeddedLSM".parse::<DatabaseKind>().unwrap(), DatabaseKind::RocksDb);
        assert_eq!("InMemory".parse::<DatabaseKind>().unwrap(), DatabaseKind::InMemory);
        assert_eq!("remoteKV".parse::<DatabaseKind>().unwrap(), DatabaseKind::Remote);
        assert_eq!("SHARDED".parse::<DatabaseKind>().unwrap(), DatabaseKind::Sharded);
        assert!("paper".parse::<DatabaseKind>().is_err());
    }

    #[test]
    fn shard_count_must_be_power_of_two() {
        let mut config = StorageConfig::in_memory();
        config.num_state_trie_shards = 4;
        assert!(config.validate().is_ok());
        config.num_state_trie_shards = 6;
        assert!(config.validate().is_err());
        config.num_state_trie_shards = 32;
        assert!(config.validate().is_err());
        config.num_state_trie_shards = 0;
        assert!(config.validate().is_err());
    }
}
