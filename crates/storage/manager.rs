//! The storage manager: one typed API over the per-namespace databases.
//!
//! Reads follow cache -> database -> decode -> cache; absent or undecodable
//! values surface as `None` / zero values, never as errors. Failed writes on
//! the chain's critical path are unrecoverable and abort the process, since
//! a node with a corrupted chain database must not keep running.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use opal_common::types::{Block, BlockBody, BlockHeader, ChainConfig, Receipt, StorageReceipt};
use opal_common::{H256, U256};
use opal_rlp::decode::RLPDecode;
use opal_rlp::encode::RLPEncode;
use tracing::{error, info};

use crate::api::{Batch, Database};
use crate::backend::in_memory::MemoryDatabase;
use crate::backend::open_namespace_database;
use crate::backend::remote::{
    BlobStore, ReadOnlyRemoteDatabase, RemoteDatabase, RemoteTableClient,
};
use crate::backend::sharded::ShardedDatabase;
use crate::cache_manager::{CacheManager, TransactionLookup};
use crate::config::{CompressionKind, DatabaseKind, StorageConfig};
use crate::error::StorageError;
use crate::schema::{self, TxLookupEntry};

/// Batches flush once their buffered values cross this size.
pub const IDEAL_BATCH_SIZE: usize = 100 * 1024;

const DB_METRIC_PREFIX: &str = "opal/db/chaindata/";

/// Governance parameters as stored: a JSON object.
pub type GovernanceSet = serde_json::Map<String, serde_json::Value>;

/// Logical partitions of the key space, in declared order. `Misc` holds
/// pointers to the other namespaces' directories and the migration status,
/// and is always initialized first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Namespace {
    Misc = 0,
    Header,
    Body,
    Receipts,
    StateTrie,
    StateTrieMigration,
    TxLookup,
    BridgeService,
    Snapshot,
}

pub const NAMESPACE_COUNT: usize = 9;

const NAMESPACES: [Namespace; NAMESPACE_COUNT] = [
    Namespace::Misc,
    Namespace::Header,
    Namespace::Body,
    Namespace::Receipts,
    Namespace::StateTrie,
    Namespace::StateTrieMigration,
    Namespace::TxLookup,
    Namespace::BridgeService,
    Namespace::Snapshot,
];

const NAMESPACE_DIRS: [&str; NAMESPACE_COUNT] = [
    "misc",
    "header",
    "body",
    "receipts",
    "statetrie",
    "statetrie_migrated",
    "txlookup",
    "bridgeservice",
    "snapshot",
];

/// Share of the global cache and file-handle budget per namespace.
/// The sum must be exactly 100; checked at startup.
const NAMESPACE_RATIOS: [usize; NAMESPACE_COUNT] = [
    2,  // Misc
    5,  // Header
    5,  // Body
    5,  // Receipts
    62, // StateTrie
    3,  // StateTrieMigration
    10, // TxLookup
    1,  // BridgeService
    7,  // Snapshot
];

impl Namespace {
    pub fn all() -> [Namespace; NAMESPACE_COUNT] {
        NAMESPACES
    }

    pub fn dir_name(self) -> &'static str {
        NAMESPACE_DIRS[self as usize]
    }

    pub(crate) fn ratio(self) -> usize {
        NAMESPACE_RATIOS[self as usize]
    }
}

fn check_namespace_ratios() -> Result<(), StorageError> {
    let sum: usize = NAMESPACE_RATIOS.iter().sum();
    if sum != 100 {
        return Err(StorageError::InvalidConfig(format!(
            "namespace ratios must sum to 100, got {sum}"
        )));
    }
    Ok(())
}

fn compression_enabled(kind: CompressionKind, namespace: Namespace) -> bool {
    match kind {
        CompressionKind::AllNoCompression => false,
        CompressionKind::AllSnappy => true,
        CompressionKind::ReceiptsOnlySnappy => namespace == Namespace::Receipts,
        CompressionKind::StateTrieOnlyNoCompression => namespace != Namespace::StateTrie,
    }
}

/// Aborts the process on an unrecoverable chain database failure.
pub(crate) fn crit(message: &str, err: &StorageError) -> ! {
    error!(%err, "{message}");
    panic!("{message}: {err}");
}

/// State guarded by the migration lock: the migration flags and the
/// state-trie database slots. Everything else is immutable after open.
pub(crate) struct StateTrieSlots {
    pub(crate) in_migration: bool,
    pub(crate) migration_block_number: u64,
    pub(crate) state_trie: Arc<dyn Database>,
    pub(crate) migration_db: Option<Arc<dyn Database>>,
}

/// Clients of the remote wide-column engine, kept for opening additional
/// tables (the migration destination) later.
pub(crate) struct RemoteClients {
    pub(crate) table: Arc<dyn RemoteTableClient>,
    pub(crate) blob: Arc<dyn BlobStore>,
}

pub struct StorageManager {
    config: StorageConfig,
    /// One database per fixed namespace. The two state-trie slots live in
    /// `state` instead and their entries here stay empty.
    databases: Vec<Option<Arc<dyn Database>>>,
    pub(crate) state: RwLock<StateTrieSlots>,
    pub(crate) cache: CacheManager,
    pub(crate) remote_clients: Option<RemoteClients>,
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("config", &self.config)
            .finish()
    }
}

impl StorageManager {
    /// Opens every namespace database per the configuration. With
    /// `single_db` one physical database serves all namespaces; otherwise
    /// each namespace gets its own subdirectory and budget share.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        Self::build(config, None)
    }

    /// Opens a manager backed by the remote wide-column engine, one table
    /// per namespace.
    pub fn with_remote_clients(
        config: StorageConfig,
        table: Arc<dyn RemoteTableClient>,
        blob: Arc<dyn BlobStore>,
    ) -> Result<Self, StorageError> {
        Self::build(config, Some(RemoteClients { table, blob }))
    }

    /// An in-memory manager for tests and ephemeral nodes.
    pub fn in_memory() -> Self {
        match Self::new(StorageConfig {
            single_db: true,
            ..StorageConfig::in_memory()
        }) {
            Ok(manager) => manager,
            Err(err) => crit("failed to create the in-memory storage manager", &err),
        }
    }

    fn build(
        config: StorageConfig,
        remote_clients: Option<RemoteClients>,
    ) -> Result<Self, StorageError> {
        check_namespace_ratios()?;
        config.validate()?;

        if config.single_db {
            info!(kind = %config.db_kind, "single database used for persistent storage");
            return Self::build_single(config, remote_clients);
        }
        info!(kind = %config.db_kind, "partitioned database used for persistent storage");
        Self::build_partitioned(config, remote_clients)
    }

    fn build_single(
        config: StorageConfig,
        remote_clients: Option<RemoteClients>,
    ) -> Result<Self, StorageError> {
        let shared = Self::open_entry(
            &config,
            remote_clients.as_ref(),
            Namespace::Misc,
            NAMESPACE_DIRS[Namespace::Misc as usize],
            100,
        )?;
        shared.meter(DB_METRIC_PREFIX);
        let mut databases: Vec<Option<Arc<dyn Database>>> = vec![None; NAMESPACE_COUNT];
        for namespace in Namespace::all() {
            if !matches!(
                namespace,
                Namespace::StateTrie | Namespace::StateTrieMigration
            ) {
                databases[namespace as usize] = Some(shared.clone());
            }
        }
        Ok(Self {
            config,
            databases,
            state: RwLock::new(StateTrieSlots {
                in_migration: false,
                migration_block_number: 0,
                state_trie: shared,
                migration_db: None,
            }),
            cache: CacheManager::new(),
            remote_clients,
        })
    }

    fn build_partitioned(
        config: StorageConfig,
        remote_clients: Option<RemoteClients>,
    ) -> Result<Self, StorageError> {
        // Misc comes first; it tells us where everything else lives.
        let misc = Self::open_entry(
            &config,
            remote_clients.as_ref(),
            Namespace::Misc,
            NAMESPACE_DIRS[Namespace::Misc as usize],
            Namespace::Misc.ratio(),
        )?;
        misc.meter(&format!("{DB_METRIC_PREFIX}misc/"));

        let mut databases: Vec<Option<Arc<dyn Database>>> = vec![None; NAMESPACE_COUNT];
        let mut state_trie: Option<Arc<dyn Database>> = None;
        databases[Namespace::Misc as usize] = Some(misc.clone());

        for namespace in Namespace::all() {
            if matches!(
                namespace,
                Namespace::Misc | Namespace::StateTrieMigration
            ) {
                continue;
            }
            let dir_name = read_database_dir(misc.as_ref(), namespace)
                .unwrap_or_else(|| namespace.dir_name().to_string());
            let db = if namespace == Namespace::StateTrie && config.state_trie_sharded() {
                Self::open_sharded_entry(
                    &config,
                    remote_clients.as_ref(),
                    namespace,
                    &dir_name,
                    namespace.ratio(),
                )?
            } else {
                Self::open_entry(
                    &config,
                    remote_clients.as_ref(),
                    namespace,
                    &dir_name,
                    namespace.ratio(),
                )?
            };
            db.meter(&format!("{DB_METRIC_PREFIX}{}/", namespace.dir_name()));
            if namespace == Namespace::StateTrie {
                state_trie = Some(db);
            } else {
                databases[namespace as usize] = Some(db);
            }
        }

        let state_trie = state_trie.ok_or_else(|| {
            StorageError::InvalidConfig("state trie database was not opened".into())
        })?;

        let mut manager = Self {
            config,
            databases,
            state: RwLock::new(StateTrieSlots {
                in_migration: false,
                migration_block_number: 0,
                state_trie,
                migration_db: None,
            }),
            cache: CacheManager::new(),
            remote_clients,
        };
        manager.resume_migration_if_needed()?;
        Ok(manager)
    }

    /// Opens one namespace entry with its share of the global budget.
    pub(crate) fn open_entry(
        config: &StorageConfig,
        remote_clients: Option<&RemoteClients>,
        namespace: Namespace,
        dir_name: &str,
        ratio: usize,
    ) -> Result<Arc<dyn Database>, StorageError> {
        if config.db_kind == DatabaseKind::Remote {
            let clients = remote_clients.ok_or_else(|| {
                StorageError::InvalidConfig(
                    "remote database kind requires remote clients".into(),
                )
            })?;
            let remote = config.remote.as_ref().ok_or_else(|| {
                StorageError::InvalidConfig(
                    "remote database kind requires remote settings".into(),
                )
            })?;
            let table_name = format!("{}-{}", remote.table_name, dir_name);
            let db: Arc<dyn Database> = if remote.read_only {
                Arc::new(ReadOnlyRemoteDatabase::open(
                    table_name,
                    clients.table.clone(),
                    clients.blob.clone(),
                ))
            } else {
                Arc::new(RemoteDatabase::open(
                    table_name,
                    clients.table.clone(),
                    clients.blob.clone(),
                ))
            };
            return Ok(db);
        }

        if config.db_kind == DatabaseKind::InMemory {
            return Ok(Arc::new(MemoryDatabase::new()));
        }

        let cache_size_mb = config.lsm_cache_size_mb * ratio / 100;
        let open_files = config.open_files_limit * ratio as i32 / 100;
        let dir = config.dir.join(dir_name);
        let namespace_compressed = compression_enabled(config.compression, namespace);
        open_namespace_database(config, &dir, cache_size_mb, open_files, namespace_compressed)
    }

    /// Opens the state-trie namespace fanned across shards.
    pub(crate) fn open_sharded_entry(
        config: &StorageConfig,
        remote_clients: Option<&RemoteClients>,
        namespace: Namespace,
        dir_name: &str,
        ratio: usize,
    ) -> Result<Arc<dyn Database>, StorageError> {
        let num_shards = config.num_state_trie_shards.max(1);
        let shard_ratio = (ratio / num_shards as usize).max(1);
        let config = config.clone();
        let dir_name = dir_name.to_string();
        let sharded = ShardedDatabase::open(num_shards, move |index| {
            Self::open_entry(
                &config,
                remote_clients,
                namespace,
                &format!("{dir_name}/{index}"),
                shard_ratio,
            )
        })?;
        Ok(Arc::new(sharded))
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn is_parallel_db_write(&self) -> bool {
        self.config.parallel_db_write
    }

    pub fn is_single_db(&self) -> bool {
        self.config.single_db
    }

    /// The database serving a namespace. The state-trie slots go through
    /// the migration lock; every other namespace is a plain lookup.
    pub fn database(&self, namespace: Namespace) -> Arc<dyn Database> {
        match namespace {
            Namespace::StateTrie => self.read_state_slots().state_trie.clone(),
            Namespace::StateTrieMigration => {
                match self.read_state_slots().migration_db.clone() {
                    Some(db) => db,
                    None => crit(
                        "state trie migration database requested outside a migration",
                        &StorageError::NotFound,
                    ),
                }
            }
            other => match &self.databases[other as usize] {
                Some(db) => db.clone(),
                // Unreachable after a successful open.
                None => crit(
                    "namespace database is not open",
                    &StorageError::InvalidConfig(other.dir_name().into()),
                ),
            },
        }
    }

    pub(crate) fn read_state_slots(&self) -> std::sync::RwLockReadGuard<'_, StateTrieSlots> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write_state_slots(&self) -> std::sync::RwLockWriteGuard<'_, StateTrieSlots> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn new_batch(&self, namespace: Namespace) -> Box<dyn Batch> {
        self.database(namespace).new_batch()
    }

    /// Closes every database. With `single_db` only the shared one.
    pub fn close(&self) {
        if self.config.single_db {
            self.database(Namespace::Misc).close();
            return;
        }
        for namespace in Namespace::all() {
            if let Some(db) = &self.databases[namespace as usize] {
                db.close();
            }
        }
        let slots = self.read_state_slots();
        slots.state_trie.close();
        if let Some(migration_db) = &slots.migration_db {
            migration_db.close();
        }
    }

    pub fn clear_header_chain_cache(&self) {
        self.cache.purge_header_chain_caches();
    }

    pub fn clear_block_chain_cache(&self) {
        self.cache.purge_block_chain_caches();
    }

    // ---------------------------------------------------------------------
    // Canonical hash
    // ---------------------------------------------------------------------

    /// The hash assigned to a canonical block number, or the zero hash.
    pub fn read_canonical_hash(&self, number: u64) -> H256 {
        let cached = self.cache.read_canonical_hash(number);
        if !cached.is_zero() {
            return cached;
        }
        let db = self.database(Namespace::Header);
        let data = db.get(&schema::canonical_hash_key(number)).ok().flatten();
        let Some(data) = data.filter(|data| !data.is_empty()) else {
            return H256::zero();
        };
        let hash = H256::from_slice(&data);
        self.cache.write_canonical_hash(number, hash);
        hash
    }

    pub fn write_canonical_hash(&self, hash: H256, number: u64) {
        let db = self.database(Namespace::Header);
        if let Err(err) = db.put(&schema::canonical_hash_key(number), hash.as_bytes()) {
            crit("failed to store number to hash mapping", &err);
        }
        self.cache.write_canonical_hash(number, hash);
    }

    pub fn delete_canonical_hash(&self, number: u64) {
        let db = self.database(Namespace::Header);
        if let Err(err) = db.delete(&schema::canonical_hash_key(number)) {
            crit("failed to delete number to hash mapping", &err);
        }
        self.cache.write_canonical_hash(number, H256::zero());
    }

    /// Every block hash stored at a height, canonical and forks alike.
    /// Scans the header namespace, so it requires an iterating engine.
    pub fn read_all_hashes(&self, number: u64) -> Vec<H256> {
        let db = self.database(Namespace::Header);
        let prefix = schema::header_number_prefix(number);
        let mut hashes = Vec::new();
        let Ok(iter) = db.new_iterator(&prefix, &[]) else {
            return hashes;
        };
        for entry in iter {
            let Ok((key, _)) = entry else { break };
            if key.len() == prefix.len() + 32 {
                hashes.push(H256::from_slice(&key[prefix.len()..]));
            }
        }
        hashes
    }

    // ---------------------------------------------------------------------
    // Head pointers
    // ---------------------------------------------------------------------

    pub fn read_head_header_hash(&self) -> H256 {
        self.read_hash_value(Namespace::Header, schema::HEAD_HEADER_KEY)
    }

    pub fn write_head_header_hash(&self, hash: H256) {
        self.write_hash_value(Namespace::Header, schema::HEAD_HEADER_KEY, hash, "last header's hash");
    }

    pub fn read_head_block_hash(&self) -> H256 {
        self.read_hash_value(Namespace::Header, schema::HEAD_BLOCK_KEY)
    }

    pub fn write_head_block_hash(&self, hash: H256) {
        self.write_hash_value(Namespace::Header, schema::HEAD_BLOCK_KEY, hash, "last block's hash");
    }

    pub fn read_head_fast_block_hash(&self) -> H256 {
        self.read_hash_value(Namespace::Header, schema::HEAD_FAST_BLOCK_KEY)
    }

    pub fn write_head_fast_block_hash(&self, hash: H256) {
        self.write_hash_value(
            Namespace::Header,
            schema::HEAD_FAST_BLOCK_KEY,
            hash,
            "last fast block's hash",
        );
    }

    fn read_hash_value(&self, namespace: Namespace, key: &[u8]) -> H256 {
        let db = self.database(namespace);
        match db.get(key).ok().flatten() {
            Some(data) if data.len() == 32 => H256::from_slice(&data),
            _ => H256::zero(),
        }
    }

    fn write_hash_value(&self, namespace: Namespace, key: &[u8], hash: H256, what: &str) {
        let db = self.database(namespace);
        if let Err(err) = db.put(key, hash.as_bytes()) {
            crit(&format!("failed to store {what}"), &err);
        }
    }

    pub fn read_fast_trie_progress(&self) -> u64 {
        let db = self.database(Namespace::Misc);
        match db.get(schema::FAST_TRIE_PROGRESS_KEY).ok().flatten() {
            Some(data) => u64::decode(&data).unwrap_or(0),
            None => 0,
        }
    }

    pub fn write_fast_trie_progress(&self, count: u64) {
        let db = self.database(Namespace::Misc);
        if let Err(err) = db.put(schema::FAST_TRIE_PROGRESS_KEY, &count.encode_to_vec()) {
            crit("failed to store fast sync trie progress", &err);
        }
    }

    // ---------------------------------------------------------------------
    // Headers
    // ---------------------------------------------------------------------

    pub fn has_header(&self, hash: H256, number: u64) -> bool {
        if self.cache.has_header(hash) {
            return true;
        }
        let db = self.database(Namespace::Header);
        db.has(&schema::header_key(number, hash)).unwrap_or(false)
    }

    pub fn read_header(&self, hash: H256, number: u64) -> Option<Arc<BlockHeader>> {
        if let Some(header) = self.cache.read_header(hash) {
            return Some(header);
        }
        let data = self.read_header_rlp(hash, number)?;
        let header = match BlockHeader::decode(&data) {
            Ok(header) => Arc::new(header),
            Err(err) => {
                error!(%hash, %err, "invalid block header RLP");
                return None;
            }
        };
        self.cache.write_header(hash, header.clone());
        Some(header)
    }

    /// The header in its raw database encoding.
    pub fn read_header_rlp(&self, hash: H256, number: u64) -> Option<Vec<u8>> {
        let db = self.database(Namespace::Header);
        db.get(&schema::header_key(number, hash)).ok().flatten()
    }

    /// Stores a header along with its hash-to-number index entry.
    pub fn write_header(&self, header: &BlockHeader) {
        let db = self.database(Namespace::Header);
        let hash = header.hash();
        let number = header.number;

        if let Err(err) = db.put(
            &schema::header_number_key(hash),
            &schema::encode_block_number(number),
        ) {
            crit("failed to store hash to number mapping", &err);
        }
        if let Err(err) = db.put(&schema::header_key(number, hash), &header.encode_to_vec()) {
            crit("failed to store header", &err);
        }

        self.cache.write_header(hash, Arc::new(header.clone()));
        self.cache.write_block_number(hash, number);
    }

    pub fn delete_header(&self, hash: H256, number: u64) {
        let db = self.database(Namespace::Header);
        if let Err(err) = db.delete(&schema::header_key(number, hash)) {
            crit("failed to delete header", &err);
        }
        if let Err(err) = db.delete(&schema::header_number_key(hash)) {
            crit("failed to delete hash to number mapping", &err);
        }
        self.cache.delete_header(hash);
        // The block-number cache keeps the mapping; a lookup may keep
        // resolving a deleted header's number until eviction.
    }

    /// The block number assigned to a hash. The cache may keep serving a
    /// deleted mapping until eviction; that staleness is accepted.
    pub fn read_header_number(&self, hash: H256) -> Option<u64> {
        if let Some(number) = self.cache.read_block_number(hash) {
            return Some(number);
        }
        let db = self.database(Namespace::Header);
        let data = db.get(&schema::header_number_key(hash)).ok().flatten()?;
        if data.len() != 8 {
            return None;
        }
        let number = u64::from_be_bytes(data.try_into().ok()?);
        self.cache.write_block_number(hash, number);
        Some(number)
    }

    // ---------------------------------------------------------------------
    // Bodies
    // ---------------------------------------------------------------------

    pub fn has_body(&self, hash: H256, number: u64) -> bool {
        let db = self.database(Namespace::Body);
        db.has(&schema::body_key(number, hash)).unwrap_or(false)
    }

    pub fn read_body(&self, hash: H256, number: u64) -> Option<Arc<BlockBody>> {
        if let Some(body) = self.cache.read_body(hash) {
            return Some(body);
        }
        let data = self.read_body_rlp(hash, number)?;
        let body = match BlockBody::decode(&data) {
            Ok(body) => Arc::new(body),
            Err(err) => {
                error!(%hash, %err, "invalid block body RLP");
                return None;
            }
        };
        self.cache.write_body(hash, body.clone());
        Some(body)
    }

    /// Cache-only body lookup.
    pub fn read_body_in_cache(&self, hash: H256) -> Option<Arc<BlockBody>> {
        self.cache.read_body(hash)
    }

    pub fn read_body_rlp(&self, hash: H256, number: u64) -> Option<Vec<u8>> {
        if let Some(rlp) = self.cache.read_body_rlp(hash) {
            return Some(rlp.to_vec());
        }
        if let Some(body) = self.read_body_in_cache(hash) {
            let rlp = body.encode_to_vec();
            self.cache.write_body_rlp(hash, Bytes::from(rlp.clone()));
            return Some(rlp);
        }
        let db = self.database(Namespace::Body);
        let data = db.get(&schema::body_key(number, hash)).ok().flatten()?;
        self.cache.write_body_rlp(hash, Bytes::from(data.clone()));
        Some(data)
    }

    /// Body RLP found through the hash-to-number index.
    pub fn read_body_rlp_by_hash(&self, hash: H256) -> Option<Vec<u8>> {
        if let Some(rlp) = self.cache.read_body_rlp(hash) {
            return Some(rlp.to_vec());
        }
        let number = self.read_header_number(hash)?;
        self.read_body_rlp(hash, number)
    }

    pub fn write_body(&self, hash: H256, number: u64, body: &BlockBody) {
        self.write_body_rlp(hash, number, &body.encode_to_vec());
        self.cache.write_body(hash, Arc::new(body.clone()));
    }

    pub fn put_body_to_batch(
        &self,
        batch: &mut dyn Batch,
        hash: H256,
        number: u64,
        body: &BlockBody,
    ) -> Result<(), StorageError> {
        batch.put(&schema::body_key(number, hash), &body.encode_to_vec())
    }

    pub fn write_body_rlp(&self, hash: H256, number: u64, rlp: &[u8]) {
        let db = self.database(Namespace::Body);
        if let Err(err) = db.put(&schema::body_key(number, hash), rlp) {
            crit("failed to store block body", &err);
        }
        self.cache.write_body_rlp(hash, Bytes::copy_from_slice(rlp));
    }

    pub fn delete_body(&self, hash: H256, number: u64) {
        let db = self.database(Namespace::Body);
        if let Err(err) = db.delete(&schema::body_key(number, hash)) {
            crit("failed to delete block body", &err);
        }
        self.cache.delete_body(hash);
    }

    // ---------------------------------------------------------------------
    // Total blockscore
    // ---------------------------------------------------------------------

    pub fn read_td(&self, hash: H256, number: u64) -> Option<U256> {
        if let Some(td) = self.cache.read_td(hash) {
            return Some(td);
        }
        let db = self.database(Namespace::Misc);
        let data = db.get(&schema::header_td_key(number, hash)).ok().flatten()?;
        let td = match U256::decode(&data) {
            Ok(td) => td,
            Err(err) => {
                error!(%hash, %err, "invalid total blockscore RLP");
                return None;
            }
        };
        self.cache.write_td(hash, td);
        Some(td)
    }

    pub fn write_td(&self, hash: H256, number: u64, td: U256) {
        let db = self.database(Namespace::Misc);
        if let Err(err) = db.put(&schema::header_td_key(number, hash), &td.encode_to_vec()) {
            crit("failed to store total blockscore", &err);
        }
        self.cache.write_td(hash, td);
    }

    pub fn delete_td(&self, hash: H256, number: u64) {
        let db = self.database(Namespace::Misc);
        if let Err(err) = db.delete(&schema::header_td_key(number, hash)) {
            crit("failed to delete total blockscore", &err);
        }
        self.cache.delete_td(hash);
    }

    // ---------------------------------------------------------------------
    // Receipts
    // ---------------------------------------------------------------------

    /// A single receipt with its block hash, block number and index, found
    /// through the transaction lookup index.
    pub fn read_receipt(&self, tx_hash: H256) -> Option<(Receipt, H256, u64, u64)> {
        let (block_hash, block_number, index) = self.read_tx_lookup_entry(tx_hash);
        if block_hash.is_zero() {
            return None;
        }
        let receipts = self.read_receipts(block_hash, block_number);
        if receipts.len() <= index as usize {
            error!(
                number = block_number,
                %block_hash,
                index,
                "receipt referenced missing"
            );
            return None;
        }
        Some((
            receipts[index as usize].clone(),
            block_hash,
            block_number,
            index,
        ))
    }

    /// Every receipt of a block, in order. Empty when absent.
    pub fn read_receipts(&self, block_hash: H256, number: u64) -> Vec<Receipt> {
        let db = self.database(Namespace::Receipts);
        let Some(data) = db.get(&schema::receipts_key(number, block_hash)).ok().flatten() else {
            return Vec::new();
        };
        match Vec::<StorageReceipt>::decode(&data) {
            Ok(stored) => stored.into_iter().map(Receipt::from).collect(),
            Err(err) => {
                error!(%block_hash, %err, "invalid receipt array RLP");
                Vec::new()
            }
        }
    }

    pub fn read_receipts_by_block_hash(&self, hash: H256) -> Vec<Receipt> {
        if let Some(receipts) = self.cache.read_block_receipts(hash) {
            return receipts.as_ref().clone();
        }
        let Some(number) = self.read_header_number(hash) else {
            return Vec::new();
        };
        self.read_receipts(hash, number)
    }

    pub fn write_receipts(&self, hash: H256, number: u64, receipts: &[Receipt]) {
        let db = self.database(Namespace::Receipts);
        for receipt in receipts {
            self.cache
                .write_tx_receipt(receipt.tx_hash, Arc::new(receipt.clone()));
        }
        let stored: Vec<StorageReceipt> = receipts
            .iter()
            .map(|receipt| StorageReceipt(receipt.clone()))
            .collect();
        if let Err(err) = db.put(&schema::receipts_key(number, hash), &stored.encode_to_vec()) {
            crit("failed to store block receipts", &err);
        }
        self.cache
            .write_block_receipts(hash, Arc::new(receipts.to_vec()));
    }

    pub fn put_receipts_to_batch(
        &self,
        batch: &mut dyn Batch,
        hash: H256,
        number: u64,
        receipts: &[Receipt],
    ) -> Result<(), StorageError> {
        let stored: Vec<StorageReceipt> = receipts
            .iter()
            .map(|receipt| StorageReceipt(receipt.clone()))
            .collect();
        batch.put(&schema::receipts_key(number, hash), &stored.encode_to_vec())
    }

    pub fn delete_receipts(&self, hash: H256, number: u64) {
        let receipts = self.read_receipts(hash, number);
        let db = self.database(Namespace::Receipts);
        if let Err(err) = db.delete(&schema::receipts_key(number, hash)) {
            crit("failed to delete block receipts", &err);
        }
        self.cache.delete_block_receipts(hash);
        for receipt in receipts {
            self.cache.delete_tx_receipt(receipt.tx_hash);
        }
    }

    pub fn read_block_receipts_in_cache(&self, block_hash: H256) -> Option<Arc<Vec<Receipt>>> {
        self.cache.read_block_receipts(block_hash)
    }

    pub fn read_tx_receipt_in_cache(&self, tx_hash: H256) -> Option<Arc<Receipt>> {
        self.cache.read_tx_receipt(tx_hash)
    }

    // ---------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------

    /// Assembles a block from its stored header and body. Due to concurrent
    /// download the header can be present while the body is not yet.
    pub fn read_block(&self, hash: H256, number: u64) -> Option<Arc<Block>> {
        if let Some(block) = self.cache.read_block(hash) {
            return Some(block);
        }
        let header = self.read_header(hash, number)?;
        let body = self.read_body(hash, number)?;
        let block = Arc::new(Block::new(
            header.as_ref().clone(),
            body.as_ref().clone(),
        ));
        self.cache.write_block(hash, block.clone());
        Some(block)
    }

    pub fn read_block_by_hash(&self, hash: H256) -> Option<Arc<Block>> {
        let number = self.read_header_number(hash)?;
        self.read_block(hash, number)
    }

    pub fn read_block_by_number(&self, number: u64) -> Option<Arc<Block>> {
        let hash = self.read_canonical_hash(number);
        if hash.is_zero() {
            return None;
        }
        self.read_block(hash, number)
    }

    pub fn has_block(&self, hash: H256, number: u64) -> bool {
        if self.cache.has_block(hash) {
            return true;
        }
        self.has_body(hash, number)
    }

    /// Stores the body and header. Receipts, total blockscore and the
    /// canonical hash are written by the importing caller so that the
    /// canonical commitment comes last.
    pub fn write_block(&self, block: &Block) {
        self.write_body(block.hash(), block.number(), &block.body);
        self.write_header(&block.header);
        self.cache
            .write_block(block.hash(), Arc::new(block.clone()));
    }

    pub fn delete_block(&self, hash: H256, number: u64) {
        self.delete_receipts(hash, number);
        self.delete_header(hash, number);
        self.delete_body(hash, number);
        self.delete_td(hash, number);
        self.cache.delete_block(hash);
    }

    /// The closest common ancestor of two headers, walking parent pointers
    /// down the deeper side first. `None` when any parent is missing.
    pub fn find_common_ancestor(
        &self,
        a: &BlockHeader,
        b: &BlockHeader,
    ) -> Option<Arc<BlockHeader>> {
        let mut a = Arc::new(a.clone());
        let mut b = Arc::new(b.clone());
        while a.number > b.number {
            a = self.read_header(a.parent_hash, a.number.checked_sub(1)?)?;
        }
        while b.number > a.number {
            b = self.read_header(b.parent_hash, b.number.checked_sub(1)?)?;
        }
        while a.hash() != b.hash() {
            a = self.read_header(a.parent_hash, a.number.checked_sub(1)?)?;
            b = self.read_header(b.parent_hash, b.number.checked_sub(1)?)?;
        }
        Some(a)
    }
}

// ---------------------------------------------------------------------
// Free helpers shared with the migration controller.
// ---------------------------------------------------------------------

/// Reads a namespace's directory override from the misc database.
pub(crate) fn read_database_dir(misc: &dyn Database, namespace: Namespace) -> Option<String> {
    let data = misc
        .get(&schema::database_dir_key(namespace as u64))
        .ok()
        .flatten()?;
    if data.is_empty() {
        return None;
    }
    String::from_utf8(data).ok()
}

/// Persists a namespace's directory override into the misc database.
pub(crate) fn write_database_dir(
    misc: &dyn Database,
    namespace: Namespace,
    dir_name: &str,
) -> Result<(), StorageError> {
    misc.put(
        &schema::database_dir_key(namespace as u64),
        dir_name.as_bytes(),
    )
}

pub(crate) fn clear_database_dir(
    misc: &dyn Database,
    namespace: Namespace,
) -> Result<(), StorageError> {
    misc.delete(&schema::database_dir_key(namespace as u64))
}

impl StorageManager {
    /// Migration status: zero when idle, the migration block number while a
    /// migration is running.
    pub fn read_migration_status(&self) -> u64 {
        let db = self.database(Namespace::Misc);
        match db.get(schema::MIGRATION_STATUS_KEY).ok().flatten() {
            Some(data) if data.len() == 8 => {
                u64::from_be_bytes(data.try_into().unwrap_or([0; 8]))
            }
            _ => 0,
        }
    }

    pub(crate) fn write_migration_status(&self, block_number: u64) -> Result<(), StorageError> {
        let db = self.database(Namespace::Misc);
        db.put(
            schema::MIGRATION_STATUS_KEY,
            &schema::encode_block_number(block_number),
        )
    }

    /// The directory a resumed migration destination lives in.
    pub(crate) fn migration_dir_name(block_number: u64) -> String {
        format!("statetrie_migrated_{block_number}")
    }

    /// Reinstalls the migration destination after a restart when the misc
    /// database says a migration was running.
    fn resume_migration_if_needed(&mut self) -> Result<(), StorageError> {
        let status = self.read_migration_status();
        if status == 0 {
            return Ok(());
        }
        let misc = self.database(Namespace::Misc);
        let dir_name = read_database_dir(misc.as_ref(), Namespace::StateTrieMigration)
            .unwrap_or_else(|| Self::migration_dir_name(status));
        let migration_db = if self.config.state_trie_sharded() {
            Self::open_sharded_entry(
                &self.config,
                self.remote_clients.as_ref(),
                Namespace::StateTrieMigration,
                &dir_name,
                Namespace::StateTrieMigration.ratio(),
            )?
        } else {
            Self::open_entry(
                &self.config,
                self.remote_clients.as_ref(),
                Namespace::StateTrieMigration,
                &dir_name,
                Namespace::StateTrieMigration.ratio(),
            )?
        };
        migration_db.meter(&format!(
            "{DB_METRIC_PREFIX}{}/",
            Namespace::StateTrieMigration.dir_name()
        ));
        info!(block_number = status, dir = %dir_name, "resuming state trie migration");
        let mut slots = self.write_state_slots();
        slots.in_migration = true;
        slots.migration_block_number = status;
        slots.migration_db = Some(migration_db);
        Ok(())
    }

    /// Absolute path of a namespace directory under the configured root.
    pub(crate) fn namespace_path(&self, dir_name: &str) -> PathBuf {
        self.config.dir.join(dir_name)
    }
}

// ---------------------------------------------------------------------
// Transaction lookup index
// ---------------------------------------------------------------------

impl StorageManager {
    /// Positional metadata of a transaction; zero values when absent.
    pub fn read_tx_lookup_entry(&self, tx_hash: H256) -> (H256, u64, u64) {
        let db = self.database(Namespace::TxLookup);
        let Some(data) = db.get(&schema::tx_lookup_key(tx_hash)).ok().flatten() else {
            return (H256::zero(), 0, 0);
        };
        match TxLookupEntry::decode(&data) {
            Ok(entry) => (entry.block_hash, entry.block_number, entry.index),
            Err(err) => {
                error!(%tx_hash, %err, "invalid transaction lookup entry RLP");
                (H256::zero(), 0, 0)
            }
        }
    }

    pub fn write_tx_lookup_entries(&self, block: &Block) {
        let db = self.database(Namespace::TxLookup);
        let mut sink = DatabasePutter { db: db.as_ref() };
        if let Err(err) = put_tx_lookup_entries(&mut sink, block) {
            crit("failed to store transaction lookup entry", &err);
        }
    }

    /// Batched variant that also populates the lookup cache.
    pub fn write_and_cache_tx_lookup_entries(&self, block: &Block) -> Result<(), StorageError> {
        let mut batch = self.new_batch(Namespace::TxLookup);
        for (index, tx) in block.body.transactions.iter().enumerate() {
            let entry = TxLookupEntry {
                block_hash: block.hash(),
                block_number: block.number(),
                index: index as u64,
            };
            batch.put(&schema::tx_lookup_key(tx.hash()), &entry.encode_to_vec())?;
            self.cache.write_tx_lookup(
                tx.hash(),
                Arc::new(TransactionLookup {
                    tx: tx.clone(),
                    entry,
                }),
            );
        }
        if let Err(err) = batch.write() {
            error!(%err, number = block.number(), "failed to write tx lookup entries in batch");
            return Err(err);
        }
        Ok(())
    }

    pub fn put_tx_lookup_entries_to_batch(
        &self,
        batch: &mut dyn Batch,
        block: &Block,
    ) -> Result<(), StorageError> {
        let mut sink = BatchPutter { batch };
        put_tx_lookup_entries(&mut sink, block)
    }

    pub fn delete_tx_lookup_entry(&self, tx_hash: H256) {
        let db = self.database(Namespace::TxLookup);
        if let Err(err) = db.delete(&schema::tx_lookup_key(tx_hash)) {
            error!(%tx_hash, %err, "failed to delete transaction lookup entry");
        }
        self.cache.delete_tx_lookup(tx_hash);
    }

    /// A transaction along with its positional metadata.
    pub fn read_tx_and_lookup_info(
        &self,
        tx_hash: H256,
    ) -> Option<(opal_common::types::Transaction, H256, u64, u64)> {
        let (block_hash, block_number, index) = self.read_tx_lookup_entry(tx_hash);
        if block_hash.is_zero() {
            return None;
        }
        let body = self.read_body(block_hash, block_number)?;
        let Some(tx) = body.transactions.get(index as usize) else {
            error!(number = block_number, %block_hash, index, "transaction referenced missing");
            return None;
        };
        Some((tx.clone(), block_hash, block_number, index))
    }

    pub fn read_tx_and_lookup_info_in_cache(
        &self,
        tx_hash: H256,
    ) -> Option<(opal_common::types::Transaction, H256, u64, u64)> {
        let lookup = self.cache.read_tx_lookup(tx_hash)?;
        Some((
            lookup.tx.clone(),
            lookup.entry.block_hash,
            lookup.entry.block_number,
            lookup.entry.index,
        ))
    }

    // -----------------------------------------------------------------
    // Sender transaction hash index
    // -----------------------------------------------------------------

    pub fn new_sender_tx_hash_batch(&self) -> Box<dyn Batch> {
        self.new_batch(Namespace::Misc)
    }

    /// Puts one mapping into the batch and the cache; flushes the batch
    /// once it crosses the ideal size.
    pub fn put_sender_tx_hash_to_batch(
        &self,
        batch: &mut dyn Batch,
        sender_tx_hash: H256,
        tx_hash: H256,
    ) -> Result<(), StorageError> {
        batch.put(
            &schema::sender_tx_hash_key(sender_tx_hash),
            tx_hash.as_bytes(),
        )?;
        self.cache.write_sender_tx_hash(sender_tx_hash, tx_hash);
        crate::backend::flush_if_full(batch, IDEAL_BATCH_SIZE)
    }

    /// The transaction hash a sender-scoped hash maps to; zero when absent.
    pub fn read_tx_hash_from_sender_tx_hash(&self, sender_tx_hash: H256) -> H256 {
        let cached = self.cache.read_sender_tx_hash(sender_tx_hash);
        if !cached.is_zero() {
            return cached;
        }
        let db = self.database(Namespace::Misc);
        match db
            .get(&schema::sender_tx_hash_key(sender_tx_hash))
            .ok()
            .flatten()
        {
            Some(data) if data.len() == 32 => {
                let tx_hash = H256::from_slice(&data);
                self.cache.write_sender_tx_hash(sender_tx_hash, tx_hash);
                tx_hash
            }
            _ => H256::zero(),
        }
    }
}

/// Adapts a database's point operations to the batch replay sink.
pub(crate) struct DatabasePutter<'a> {
    pub(crate) db: &'a dyn Database,
}

impl crate::api::KeyValueWriter for DatabasePutter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        self.db.delete(key)
    }
}

struct BatchPutter<'a> {
    batch: &'a mut dyn Batch,
}

impl crate::api::KeyValueWriter for BatchPutter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.batch.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        self.batch.delete(key)
    }
}

fn put_tx_lookup_entries(
    putter: &mut dyn crate::api::KeyValueWriter,
    block: &Block,
) -> Result<(), StorageError> {
    for (index, tx) in block.body.transactions.iter().enumerate() {
        let entry = TxLookupEntry {
            block_hash: block.hash(),
            block_number: block.number(),
            index: index as u64,
        };
        putter.put(&schema::tx_lookup_key(tx.hash()), &entry.encode_to_vec())?;
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Metadata, bloom bits and chain index sections
// ---------------------------------------------------------------------

impl StorageManager {
    pub fn read_database_version(&self) -> Option<u64> {
        let db = self.database(Namespace::Misc);
        let data = db.get(schema::DATABASE_VERSION_KEY).ok().flatten()?;
        match u64::decode(&data) {
            Ok(version) => Some(version),
            Err(err) => {
                error!(%err, "failed to decode database version");
                None
            }
        }
    }

    pub fn write_database_version(&self, version: u64) {
        let db = self.database(Namespace::Misc);
        if let Err(err) = db.put(schema::DATABASE_VERSION_KEY, &version.encode_to_vec()) {
            crit("failed to store the database version", &err);
        }
    }

    pub fn read_chain_config(&self, genesis_hash: H256) -> Option<ChainConfig> {
        let db = self.database(Namespace::Misc);
        let data = db.get(&schema::config_key(genesis_hash)).ok().flatten()?;
        match serde_json::from_slice(&data) {
            Ok(config) => Some(config),
            Err(err) => {
                error!(%genesis_hash, %err, "invalid chain config JSON");
                None
            }
        }
    }

    pub fn write_chain_config(&self, genesis_hash: H256, config: &ChainConfig) {
        let db = self.database(Namespace::Misc);
        let data = match serde_json::to_vec(config) {
            Ok(data) => data,
            Err(err) => crit("failed to JSON encode chain config", &err.into()),
        };
        if let Err(err) = db.put(&schema::config_key(genesis_hash), &data) {
            crit("failed to store chain config", &err);
        }
    }

    pub fn read_bloom_bits(&self, bloom_bits_key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.database(Namespace::Misc).get(bloom_bits_key)
    }

    pub fn write_bloom_bits(&self, bloom_bits_key: &[u8], bits: &[u8]) -> Result<(), StorageError> {
        self.database(Namespace::Misc).put(bloom_bits_key, bits)
    }

    pub fn read_valid_sections(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.database(Namespace::Misc).get(schema::VALID_SECTIONS_KEY)
    }

    pub fn write_valid_sections(&self, encoded_sections: &[u8]) {
        let db = self.database(Namespace::Misc);
        if let Err(err) = db.put(schema::VALID_SECTIONS_KEY, encoded_sections) {
            error!(%err, "failed to store valid sections");
        }
    }

    pub fn read_section_head(&self, encoded_section: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.database(Namespace::Misc)
            .get(&schema::section_head_key(encoded_section))
    }

    pub fn write_section_head(&self, encoded_section: &[u8], hash: H256) {
        let db = self.database(Namespace::Misc);
        if let Err(err) = db.put(&schema::section_head_key(encoded_section), hash.as_bytes()) {
            error!(%err, "failed to store section head");
        }
    }

    pub fn delete_section_head(&self, encoded_section: &[u8]) {
        let db = self.database(Namespace::Misc);
        if let Err(err) = db.delete(&schema::section_head_key(encoded_section)) {
            error!(%err, "failed to delete section head");
        }
    }

    // -----------------------------------------------------------------
    // Trie preimages
    // -----------------------------------------------------------------

    pub fn read_preimage(&self, hash: H256) -> Option<Vec<u8>> {
        let db = self.database(Namespace::StateTrie);
        db.get(&schema::preimage_key(hash)).ok().flatten()
    }

    /// Writes a set of preimages; `number` is used in failure logs only.
    pub fn write_preimages(&self, number: u64, preimages: &HashMap<H256, Vec<u8>>) {
        let mut batch = self.state_trie_batch();
        for (hash, preimage) in preimages {
            if let Err(err) = batch.put(&schema::preimage_key(*hash), preimage) {
                crit("failed to store trie preimage", &err);
            }
        }
        if let Err(err) = batch.write() {
            error!(%err, block_number = number, "failed to batch write trie preimages");
            crit("failed to batch write trie preimages", &err);
        }
    }
}

// ---------------------------------------------------------------------
// Governance and staking
// ---------------------------------------------------------------------

impl StorageManager {
    /// Stores a governance parameter set effective from block `number`.
    /// The index must be strictly greater than the last stored one; on
    /// rejection nothing is written.
    pub fn write_governance(
        &self,
        data: &GovernanceSet,
        number: u64,
    ) -> Result<(), StorageError> {
        let db = self.database(Namespace::Misc);
        self.write_governance_idx(number)?;
        let encoded = serde_json::to_vec(data)?;
        db.put(&schema::governance_key(number), &encoded)
    }

    pub fn write_governance_idx(&self, number: u64) -> Result<(), StorageError> {
        let db = self.database(Namespace::Misc);
        let mut history: Vec<u64> = match db.get(schema::GOVERNANCE_HISTORY_KEY)? {
            Some(data) => serde_json::from_slice(&data)?,
            None => Vec::new(),
        };
        if let Some(&last) = history.last() {
            if last >= number {
                return Err(StorageError::GovernanceIndexAlreadyExists(number, last));
            }
        }
        history.push(number);
        db.put(
            schema::GOVERNANCE_HISTORY_KEY,
            &serde_json::to_vec(&history)?,
        )
    }

    pub fn read_governance(&self, number: u64) -> Result<GovernanceSet, StorageError> {
        let db = self.database(Namespace::Misc);
        let data = db
            .get(&schema::governance_key(number))?
            .ok_or(StorageError::NotFound)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// The latest `count` governance indices, oldest first. Zero means all.
    pub fn read_recent_governance_idx(&self, count: usize) -> Result<Vec<u64>, StorageError> {
        let db = self.database(Namespace::Misc);
        let data = db
            .get(schema::GOVERNANCE_HISTORY_KEY)?
            .ok_or(StorageError::NotFound)?;
        let history: Vec<u64> = serde_json::from_slice(&data)?;
        if count == 0 || history.len() <= count {
            return Ok(history);
        }
        Ok(history[history.len() - count..].to_vec())
    }

    /// The governance set effective for block `number` under the given
    /// epoch: the greatest index at or below the last epoch boundary
    /// before `number`.
    pub fn read_governance_at_number(
        &self,
        number: u64,
        epoch: u64,
    ) -> Result<(u64, GovernanceSet), StorageError> {
        let boundary = number.saturating_sub(1) / epoch * epoch;
        let history = self.read_recent_governance_idx(0).unwrap_or_default();
        for &index in history.iter().rev() {
            if index <= boundary {
                return Ok((index, self.read_governance(index)?));
            }
        }
        Err(StorageError::NotFound)
    }

    pub fn write_governance_state(&self, state: &[u8]) -> Result<(), StorageError> {
        self.database(Namespace::Misc)
            .put(schema::GOVERNANCE_STATE_KEY, state)
    }

    pub fn read_governance_state(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.database(Namespace::Misc).get(schema::GOVERNANCE_STATE_KEY)
    }

    pub fn write_staking_info(
        &self,
        number: u64,
        info: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let db = self.database(Namespace::Misc);
        db.put(&schema::staking_info_key(number), &serde_json::to_vec(info)?)
    }

    pub fn read_staking_info(&self, number: u64) -> Result<serde_json::Value, StorageError> {
        let db = self.database(Namespace::Misc);
        let data = db
            .get(&schema::staking_info_key(number))?
            .ok_or(StorageError::NotFound)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

// ---------------------------------------------------------------------
// Cross-chain bridge records
// ---------------------------------------------------------------------

impl StorageManager {
    /// Maps a child chain block hash to the anchoring transaction's hash.
    pub fn write_child_chain_tx_hash(&self, child_block_hash: H256, tx_hash: H256) {
        let db = self.database(Namespace::BridgeService);
        if let Err(err) = db.put(
            &schema::child_chain_tx_hash_key(child_block_hash),
            tx_hash.as_bytes(),
        ) {
            crit("failed to store child chain tx hash", &err);
        }
    }

    pub fn convert_child_chain_block_hash_to_parent_chain_tx_hash(
        &self,
        child_block_hash: H256,
    ) -> H256 {
        self.read_hash_value(
            Namespace::BridgeService,
            &schema::child_chain_tx_hash_key(child_block_hash),
        )
    }

    pub fn write_last_indexed_block_number(&self, block_number: u64) {
        let db = self.database(Namespace::BridgeService);
        if let Err(err) = db.put(
            schema::LAST_INDEXED_BLOCK_KEY,
            &schema::encode_block_number(block_number),
        ) {
            crit("failed to store last indexed block number", &err);
        }
    }

    pub fn last_indexed_block_number(&self) -> u64 {
        self.read_block_number_value(schema::LAST_INDEXED_BLOCK_KEY)
    }

    pub fn write_anchored_block_number(&self, block_number: u64) {
        let db = self.database(Namespace::BridgeService);
        if let Err(err) = db.put(
            schema::LAST_SERVICE_CHAIN_TX_RECEIPT_KEY,
            &schema::encode_block_number(block_number),
        ) {
            crit("failed to store anchored block number", &err);
        }
    }

    pub fn read_anchored_block_number(&self) -> u64 {
        self.read_block_number_value(schema::LAST_SERVICE_CHAIN_TX_RECEIPT_KEY)
    }

    fn read_block_number_value(&self, key: &[u8]) -> u64 {
        let db = self.database(Namespace::BridgeService);
        match db.get(key).ok().flatten() {
            Some(data) if data.len() == 8 => {
                u64::from_be_bytes(data.try_into().unwrap_or([0; 8]))
            }
            _ => 0,
        }
    }

    pub fn write_receipt_from_parent_chain(&self, block_hash: H256, receipt: &Receipt) {
        let db = self.database(Namespace::BridgeService);
        let stored = StorageReceipt(receipt.clone());
        if let Err(err) = db.put(
            &schema::receipt_from_parent_chain_key(block_hash),
            &stored.encode_to_vec(),
        ) {
            crit("failed to store receipt from parent chain", &err);
        }
    }

    pub fn read_receipt_from_parent_chain(&self, block_hash: H256) -> Option<Receipt> {
        let db = self.database(Namespace::BridgeService);
        let data = db
            .get(&schema::receipt_from_parent_chain_key(block_hash))
            .ok()
            .flatten()?;
        match StorageReceipt::decode(&data) {
            Ok(stored) => Some(stored.into()),
            Err(err) => {
                error!(%block_hash, %err, "invalid receipt RLP from parent chain");
                None
            }
        }
    }

    pub fn write_handle_tx_hash_from_request_tx_hash(&self, request: H256, handle: H256) {
        let db = self.database(Namespace::BridgeService);
        if let Err(err) = db.put(
            &schema::value_transfer_tx_hash_key(request),
            handle.as_bytes(),
        ) {
            crit("failed to store handle value transfer tx hash", &err);
        }
    }

    pub fn read_handle_tx_hash_from_request_tx_hash(&self, request: H256) -> H256 {
        self.read_hash_value(
            Namespace::BridgeService,
            &schema::value_transfer_tx_hash_key(request),
        )
    }
}
