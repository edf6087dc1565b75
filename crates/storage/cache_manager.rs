//! Per-namespace caches over the chain data stored in the databases.

use std::sync::Arc;

use bytes::Bytes;
use opal_common::types::{Block, BlockBody, BlockHeader, Receipt, Transaction};
use opal_common::{H256, U256};

use crate::cache::{new_cache, Cache, CachePolicy};
use crate::metrics::CacheMetrics;
use crate::schema::TxLookupEntry;

const MAX_HEADER_CACHE: usize = 512;
const MAX_TD_CACHE: usize = 1024;
const MAX_BLOCK_NUMBER_CACHE: usize = 2048;
const MAX_CANONICAL_HASH_CACHE: usize = 2048;

const MAX_BODY_CACHE: usize = 256;
const MAX_BLOCK_CACHE: usize = 256;
const MAX_RECENT_TRANSACTIONS: usize = 30_000;
const MAX_RECENT_BLOCK_RECEIPTS: usize = 30;
const MAX_RECENT_TX_RECEIPTS: usize = 30_000;
const MAX_SENDER_TX_HASH: usize = 30_000;

/// Cache families, in table order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum CacheIndex {
    Header = 0,
    Td,
    BlockNumber,
    CanonicalHash,
    Body,
    BodyRlp,
    Block,
    TxLookup,
    BlockReceipts,
    TxReceipt,
    SenderTxHash,
}

pub const CACHE_INDEX_COUNT: usize = CacheIndex::SenderTxHash as usize + 1;

/// (policy, capacity) per cache family. Heavily hit index caches use the
/// sharded policy; object caches stay plain LRU.
const CACHE_CONFIG: [(CachePolicy, usize); CACHE_INDEX_COUNT] = [
    (CachePolicy::Lru, MAX_HEADER_CACHE),
    (CachePolicy::Lru, MAX_TD_CACHE),
    (CachePolicy::ShardedLru, MAX_BLOCK_NUMBER_CACHE),
    (CachePolicy::ShardedLru, MAX_CANONICAL_HASH_CACHE),
    (CachePolicy::Lru, MAX_BODY_CACHE),
    (CachePolicy::Fifo, MAX_BODY_CACHE),
    (CachePolicy::Lru, MAX_BLOCK_CACHE),
    (CachePolicy::ShardedLru, MAX_RECENT_TRANSACTIONS),
    (CachePolicy::Lru, MAX_RECENT_BLOCK_RECEIPTS),
    (CachePolicy::ShardedLru, MAX_RECENT_TX_RECEIPTS),
    (CachePolicy::ShardedLru, MAX_SENDER_TX_HASH),
];

fn build<K, V>(index: CacheIndex) -> Box<dyn Cache<K, V>>
where
    K: std::hash::Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    let (policy, capacity) = CACHE_CONFIG[index as usize];
    new_cache(policy, capacity)
}

/// A transaction along with its positional metadata, cached together.
#[derive(Clone, Debug)]
pub struct TransactionLookup {
    pub tx: Transaction,
    pub entry: TxLookupEntry,
}

/// Caches of data structures stored in the databases. Entries holding
/// `None` are tombstones left by deletes; readers treat them as misses.
pub struct CacheManager {
    header_cache: Box<dyn Cache<H256, Option<Arc<BlockHeader>>>>,
    td_cache: Box<dyn Cache<H256, Option<U256>>>,
    block_number_cache: Box<dyn Cache<H256, Option<u64>>>,
    canonical_hash_cache: Box<dyn Cache<u64, H256>>,

    body_cache: Box<dyn Cache<H256, Option<Arc<BlockBody>>>>,
    body_rlp_cache: Box<dyn Cache<H256, Option<Bytes>>>,
    block_cache: Box<dyn Cache<H256, Option<Arc<Block>>>>,
    tx_lookup_cache: Box<dyn Cache<H256, Option<Arc<TransactionLookup>>>>,
    block_receipts_cache: Box<dyn Cache<H256, Option<Arc<Vec<Receipt>>>>>,
    tx_receipt_cache: Box<dyn Cache<H256, Option<Arc<Receipt>>>>,

    sender_tx_hash_cache: Box<dyn Cache<H256, H256>>,

    metrics: [CacheMetrics; CACHE_INDEX_COUNT],
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager {
    pub fn new() -> Self {
        Self {
            header_cache: build(CacheIndex::Header),
            td_cache: build(CacheIndex::Td),
            block_number_cache: build(CacheIndex::BlockNumber),
            canonical_hash_cache: build(CacheIndex::CanonicalHash),
            body_cache: build(CacheIndex::Body),
            body_rlp_cache: build(CacheIndex::BodyRlp),
            block_cache: build(CacheIndex::Block),
            tx_lookup_cache: build(CacheIndex::TxLookup),
            block_receipts_cache: build(CacheIndex::BlockReceipts),
            tx_receipt_cache: build(CacheIndex::TxReceipt),
            sender_tx_hash_cache: build(CacheIndex::SenderTxHash),
            metrics: Default::default(),
        }
    }

    pub fn metrics(&self, index: CacheIndex) -> &CacheMetrics {
        &self.metrics[index as usize]
    }

    fn hit<T>(&self, index: CacheIndex, value: T) -> Option<T> {
        self.metrics[index as usize].record_hit();
        Some(value)
    }

    fn miss<T>(&self, index: CacheIndex) -> Option<T> {
        self.metrics[index as usize].record_miss();
        None
    }

    /// Flushes the header-chain caches, used on chain reorganizations.
    pub fn purge_header_chain_caches(&self) {
        self.header_cache.purge();
        self.td_cache.purge();
        self.block_number_cache.purge();
        self.canonical_hash_cache.purge();
    }

    /// Flushes the block-chain caches, used on chain reorganizations.
    pub fn purge_block_chain_caches(&self) {
        self.body_cache.purge();
        self.body_rlp_cache.purge();
        self.block_cache.purge();
        self.tx_lookup_cache.purge();
        self.block_receipts_cache.purge();
        self.tx_receipt_cache.purge();
        self.sender_tx_hash_cache.purge();
    }

    pub fn read_header(&self, hash: H256) -> Option<Arc<BlockHeader>> {
        match self.header_cache.get(&hash) {
            Some(Some(header)) => self.hit(CacheIndex::Header, header),
            _ => self.miss(CacheIndex::Header),
        }
    }

    pub fn write_header(&self, hash: H256, header: Arc<BlockHeader>) {
        self.header_cache.add(hash, Some(header));
    }

    pub fn delete_header(&self, hash: H256) {
        self.header_cache.add(hash, None);
    }

    pub fn has_header(&self, hash: H256) -> bool {
        matches!(self.header_cache.get(&hash), Some(Some(_)))
    }

    pub fn read_td(&self, hash: H256) -> Option<U256> {
        match self.td_cache.get(&hash) {
            Some(Some(td)) => self.hit(CacheIndex::Td, td),
            _ => self.miss(CacheIndex::Td),
        }
    }

    pub fn write_td(&self, hash: H256, td: U256) {
        self.td_cache.add(hash, Some(td));
    }

    pub fn delete_td(&self, hash: H256) {
        self.td_cache.add(hash, None);
    }

    pub fn read_block_number(&self, hash: H256) -> Option<u64> {
        match self.block_number_cache.get(&hash) {
            Some(Some(number)) => self.hit(CacheIndex::BlockNumber, number),
            _ => self.miss(CacheIndex::BlockNumber),
        }
    }

    pub fn write_block_number(&self, hash: H256, number: u64) {
        self.block_number_cache.add(hash, Some(number));
    }

    /// Returns the zero hash when the mapping is not cached.
    pub fn read_canonical_hash(&self, number: u64) -> H256 {
        match self.canonical_hash_cache.get(&number) {
            Some(hash) => {
                self.metrics[CacheIndex::CanonicalHash as usize].record_hit();
                hash
            }
            None => {
                self.metrics[CacheIndex::CanonicalHash as usize].record_miss();
                H256::zero()
            }
        }
    }

    pub fn write_canonical_hash(&self, number: u64, hash: H256) {
        self.canonical_hash_cache.add(number, hash);
    }

    pub fn read_body(&self, hash: H256) -> Option<Arc<BlockBody>> {
        match self.body_cache.get(&hash) {
            Some(Some(body)) => self.hit(CacheIndex::Body, body),
            _ => self.miss(CacheIndex::Body),
        }
    }

    pub fn write_body(&self, hash: H256, body: Arc<BlockBody>) {
        self.body_cache.add(hash, Some(body));
    }

    pub fn delete_body(&self, hash: H256) {
        self.body_cache.add(hash, None);
        self.body_rlp_cache.add(hash, None);
    }

    pub fn read_body_rlp(&self, hash: H256) -> Option<Bytes> {
        match self.body_rlp_cache.get(&hash) {
            Some(Some(rlp)) => self.hit(CacheIndex::BodyRlp, rlp),
            _ => self.miss(CacheIndex::BodyRlp),
        }
    }

    pub fn write_body_rlp(&self, hash: H256, rlp: Bytes) {
        self.body_rlp_cache.add(hash, Some(rlp));
    }

    pub fn read_block(&self, hash: H256) -> Option<Arc<Block>> {
        match self.block_cache.get(&hash) {
            Some(Some(block)) => self.hit(CacheIndex::Block, block),
            _ => self.miss(CacheIndex::Block),
        }
    }

    pub fn has_block(&self, hash: H256) -> bool {
        matches!(self.block_cache.get(&hash), Some(Some(_)))
    }

    pub fn write_block(&self, hash: H256, block: Arc<Block>) {
        self.block_cache.add(hash, Some(block));
    }

    pub fn delete_block(&self, hash: H256) {
        self.block_cache.add(hash, None);
    }

    pub fn read_tx_lookup(&self, tx_hash: H256) -> Option<Arc<TransactionLookup>> {
        match self.tx_lookup_cache.get(&tx_hash) {
            Some(Some(lookup)) => self.hit(CacheIndex::TxLookup, lookup),
            _ => self.miss(CacheIndex::TxLookup),
        }
    }

    pub fn write_tx_lookup(&self, tx_hash: H256, lookup: Arc<TransactionLookup>) {
        self.tx_lookup_cache.add(tx_hash, Some(lookup));
    }

    pub fn delete_tx_lookup(&self, tx_hash: H256) {
        self.tx_lookup_cache.add(tx_hash, None);
    }

    pub fn read_block_receipts(&self, block_hash: H256) -> Option<Arc<Vec<Receipt>>> {
        match self.block_receipts_cache.get(&block_hash) {
            Some(Some(receipts)) => self.hit(CacheIndex::BlockReceipts, receipts),
            _ => self.miss(CacheIndex::BlockReceipts),
        }
    }

    pub fn write_block_receipts(&self, block_hash: H256, receipts: Arc<Vec<Receipt>>) {
        self.block_receipts_cache.add(block_hash, Some(receipts));
    }

    pub fn delete_block_receipts(&self, block_hash: H256) {
        self.block_receipts_cache.add(block_hash, None);
    }

    pub fn read_tx_receipt(&self, tx_hash: H256) -> Option<Arc<Receipt>> {
        match self.tx_receipt_cache.get(&tx_hash) {
            Some(Some(receipt)) => self.hit(CacheIndex::TxReceipt, receipt),
            _ => self.miss(CacheIndex::TxReceipt),
        }
    }

    pub fn write_tx_receipt(&self, tx_hash: H256, receipt: Arc<Receipt>) {
        self.tx_receipt_cache.add(tx_hash, Some(receipt));
    }

    pub fn delete_tx_receipt(&self, tx_hash: H256) {
        self.tx_receipt_cache.add(tx_hash, None);
    }

    /// Returns the zero hash when no mapping is cached.
    pub fn read_sender_tx_hash(&self, sender_tx_hash: H256) -> H256 {
        match self.sender_tx_hash_cache.get(&sender_tx_hash) {
            Some(tx_hash) => {
                self.metrics[CacheIndex::SenderTxHash as usize].record_hit();
                tx_hash
            }
            None => {
                self.metrics[CacheIndex::SenderTxHash as usize].record_miss();
                H256::zero()
            }
        }
    }

    pub fn write_sender_tx_hash(&self, sender_tx_hash: H256, tx_hash: H256) {
        self.sender_tx_hash_cache.add(sender_tx_hash, tx_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_reads_as_miss() {
        let cm = CacheManager::new();
        let hash = H256::repeat_byte(1);
        cm.write_header(hash, Arc::new(BlockHeader::default()));
        assert!(cm.read_header(hash).is_some());
        cm.delete_header(hash);
        assert!(cm.read_header(hash).is_none());
        assert!(!cm.has_header(hash));
    }

    #[test]
    fn hit_and_miss_counters() {
        let cm = CacheManager::new();
        let hash = H256::repeat_byte(2);
        assert!(cm.read_td(hash).is_none());
        cm.write_td(hash, U256::from(7u64));
        assert_eq!(cm.read_td(hash), Some(U256::from(7u64)));
        let metrics = cm.metrics(CacheIndex::Td);
        assert_eq!(metrics.misses(), 1);
        assert_eq!(metrics.hits(), 1);
    }

    #[test]
    fn purge_groups_are_disjoint() {
        let cm = CacheManager::new();
        let hash = H256::repeat_byte(3);
        cm.write_header(hash, Arc::new(BlockHeader::default()));
        cm.write_body(hash, Arc::new(BlockBody::default()));

        cm.purge_header_chain_caches();
        assert!(cm.read_header(hash).is_none());
        assert!(cm.read_body(hash).is_some());

        cm.purge_block_chain_caches();
        assert!(cm.read_body(hash).is_none());
    }

    #[test]
    fn sender_tx_hash_uses_zero_sentinel() {
        let cm = CacheManager::new();
        let sender = H256::repeat_byte(4);
        assert_eq!(cm.read_sender_tx_hash(sender), H256::zero());
        cm.write_sender_tx_hash(sender, H256::repeat_byte(5));
        assert_eq!(cm.read_sender_tx_hash(sender), H256::repeat_byte(5));
    }
}
