//! Low-level database schema: key builders and fixed sentinel keys.
//!
//! Keys are bit-exact and shared by every backend. Numeric key components
//! are big-endian, with two historical exceptions: governance and staking
//! keys embed the block number little-endian and must stay that way.

use opal_common::H256;
use opal_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

// Sentinel keys.
pub const DATABASE_VERSION_KEY: &[u8] = b"DatabaseVersion";
pub const HEAD_HEADER_KEY: &[u8] = b"LastHeader";
pub const HEAD_BLOCK_KEY: &[u8] = b"LastBlock";
pub const HEAD_FAST_BLOCK_KEY: &[u8] = b"LastFast";
pub const FAST_TRIE_PROGRESS_KEY: &[u8] = b"TrieSync";
pub const VALID_SECTIONS_KEY: &[u8] = b"count";
pub const GOVERNANCE_HISTORY_KEY: &[u8] = b"governanceIdxHistory";
pub const GOVERNANCE_STATE_KEY: &[u8] = b"governanceState";
pub const MIGRATION_STATUS_KEY: &[u8] = b"migrationStatus";
pub const LAST_INDEXED_BLOCK_KEY: &[u8] = b"LastIndexedBlockKey";
pub const LAST_SERVICE_CHAIN_TX_RECEIPT_KEY: &[u8] = b"LastServiceChainTxReceipt";

// Snapshot sentinel keys.
pub const SNAPSHOT_ROOT_KEY: &[u8] = b"SnapshotRoot";
pub const SNAPSHOT_JOURNAL_KEY: &[u8] = b"SnapshotJournal";
pub const SNAPSHOT_GENERATOR_KEY: &[u8] = b"SnapshotGenerator";
pub const SNAPSHOT_DISABLED_KEY: &[u8] = b"SnapshotDisabled";
pub const SNAPSHOT_RECOVERY_KEY: &[u8] = b"SnapshotRecovery";

// Data item prefixes (single byte to avoid mixing data types).
const HEADER_PREFIX: &[u8] = b"h"; // header_prefix + num (BE) + hash -> header
const HEADER_TD_SUFFIX: &[u8] = b"t"; // header key + suffix -> total blockscore
const HEADER_HASH_SUFFIX: &[u8] = b"n"; // header_prefix + num (BE) + suffix -> hash
const HEADER_NUMBER_PREFIX: &[u8] = b"H"; // prefix + hash -> num (BE)
const BODY_PREFIX: &[u8] = b"b"; // prefix + num (BE) + hash -> block body
const RECEIPTS_PREFIX: &[u8] = b"r"; // prefix + num (BE) + hash -> block receipts
const TX_LOOKUP_PREFIX: &[u8] = b"l"; // prefix + tx hash -> lookup metadata
const BLOOM_BITS_PREFIX: &[u8] = b"B"; // prefix + bit (2 BE) + section (8 BE) + hash -> bits
const SNAPSHOT_ACCOUNT_PREFIX: &[u8] = b"a"; // prefix + account hash -> flat account entry
const SNAPSHOT_STORAGE_PREFIX: &[u8] = b"o"; // prefix + account hash + slot hash -> flat slot entry

const PREIMAGE_PREFIX: &[u8] = b"secure-key-";
const CONFIG_PREFIX: &[u8] = b"klay-config-";
const SECTION_HEAD_PREFIX: &[u8] = b"shead";
const SENDER_TX_HASH_PREFIX: &[u8] = b"SenderTxHash";
const GOVERNANCE_PREFIX: &[u8] = b"governance";
const STAKING_INFO_PREFIX: &[u8] = b"stakingInfo";
const DATABASE_DIR_PREFIX: &[u8] = b"databaseDirectory";
const CHILD_CHAIN_TX_HASH_PREFIX: &[u8] = b"ccTxHash";
const RECEIPT_FROM_PARENT_CHAIN_PREFIX: &[u8] = b"receiptFromParentChain";
const VALUE_TRANSFER_TX_HASH_PREFIX: &[u8] = b"vt-tx-hash-key-";

/// Positional metadata to look up the data content of a transaction or
/// receipt given only its hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxLookupEntry {
    pub block_hash: H256,
    pub block_number: u64,
    pub index: u64,
}

impl RLPEncode for TxLookupEntry {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.block_hash)
            .encode_field(&self.block_number)
            .encode_field(&self.index)
            .finish();
    }
}

impl RLPDecode for TxLookupEntry {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (block_hash, decoder) = decoder.decode_field("block_hash")?;
        let (block_number, decoder) = decoder.decode_field("block_number")?;
        let (index, decoder) = decoder.decode_field("index")?;
        let entry = TxLookupEntry {
            block_hash,
            block_number,
            index,
        };
        Ok((entry, decoder.finish()?))
    }
}

/// Encodes a block number as a big-endian uint64.
pub fn encode_block_number(number: u64) -> [u8; 8] {
    number.to_be_bytes()
}

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let len = parts.iter().map(|p| p.len()).sum();
    let mut key = Vec::with_capacity(len);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// header_key = 'h' + num (BE) + hash
pub fn header_key(number: u64, hash: H256) -> Vec<u8> {
    concat(&[HEADER_PREFIX, &number.to_be_bytes(), hash.as_bytes()])
}

/// header_td_key = 'h' + num (BE) + hash + 't'
pub fn header_td_key(number: u64, hash: H256) -> Vec<u8> {
    concat(&[
        HEADER_PREFIX,
        &number.to_be_bytes(),
        hash.as_bytes(),
        HEADER_TD_SUFFIX,
    ])
}

/// canonical_hash_key = 'h' + num (BE) + 'n'
pub fn canonical_hash_key(number: u64) -> Vec<u8> {
    concat(&[HEADER_PREFIX, &number.to_be_bytes(), HEADER_HASH_SUFFIX])
}

/// Prefix covering every header-family key at a height, used to enumerate
/// forks. Hash-suffixed entries are the ones whose suffix is 32 bytes long.
pub fn header_number_prefix(number: u64) -> Vec<u8> {
    concat(&[HEADER_PREFIX, &number.to_be_bytes()])
}

/// header_number_key = 'H' + hash
pub fn header_number_key(hash: H256) -> Vec<u8> {
    concat(&[HEADER_NUMBER_PREFIX, hash.as_bytes()])
}

/// body_key = 'b' + num (BE) + hash
pub fn body_key(number: u64, hash: H256) -> Vec<u8> {
    concat(&[BODY_PREFIX, &number.to_be_bytes(), hash.as_bytes()])
}

/// receipts_key = 'r' + num (BE) + hash
pub fn receipts_key(number: u64, hash: H256) -> Vec<u8> {
    concat(&[RECEIPTS_PREFIX, &number.to_be_bytes(), hash.as_bytes()])
}

/// tx_lookup_key = 'l' + hash
pub fn tx_lookup_key(hash: H256) -> Vec<u8> {
    concat(&[TX_LOOKUP_PREFIX, hash.as_bytes()])
}

/// sender_tx_hash_key = "SenderTxHash" + hash
pub fn sender_tx_hash_key(sender_tx_hash: H256) -> Vec<u8> {
    concat(&[SENDER_TX_HASH_PREFIX, sender_tx_hash.as_bytes()])
}

/// preimage_key = "secure-key-" + hash
pub fn preimage_key(hash: H256) -> Vec<u8> {
    concat(&[PREIMAGE_PREFIX, hash.as_bytes()])
}

/// config_key = "klay-config-" + hash
pub fn config_key(hash: H256) -> Vec<u8> {
    concat(&[CONFIG_PREFIX, hash.as_bytes()])
}

/// section_head_key = "shead" + encoded section
pub fn section_head_key(encoded_section: &[u8]) -> Vec<u8> {
    concat(&[SECTION_HEAD_PREFIX, encoded_section])
}

/// bloom_bits_key = 'B' + bit (2 BE) + section (8 BE) + hash
pub fn bloom_bits_key(bit: u16, section: u64, hash: H256) -> Vec<u8> {
    concat(&[
        BLOOM_BITS_PREFIX,
        &bit.to_be_bytes(),
        &section.to_be_bytes(),
        hash.as_bytes(),
    ])
}

/// governance_key = "governance" + num (LE)
pub fn governance_key(number: u64) -> Vec<u8> {
    concat(&[GOVERNANCE_PREFIX, &number.to_le_bytes()])
}

/// staking_info_key = "stakingInfo" + num (LE)
pub fn staking_info_key(number: u64) -> Vec<u8> {
    concat(&[STAKING_INFO_PREFIX, &number.to_le_bytes()])
}

/// database_dir_key = "databaseDirectory" + namespace index (BE)
pub fn database_dir_key(namespace_index: u64) -> Vec<u8> {
    concat(&[DATABASE_DIR_PREFIX, &namespace_index.to_be_bytes()])
}

/// child_chain_tx_hash_key = "ccTxHash" + child chain block hash
pub fn child_chain_tx_hash_key(child_block_hash: H256) -> Vec<u8> {
    concat(&[CHILD_CHAIN_TX_HASH_PREFIX, child_block_hash.as_bytes()])
}

/// receipt_from_parent_chain_key = "receiptFromParentChain" + block hash
pub fn receipt_from_parent_chain_key(block_hash: H256) -> Vec<u8> {
    concat(&[RECEIPT_FROM_PARENT_CHAIN_PREFIX, block_hash.as_bytes()])
}

/// value_transfer_tx_hash_key = "vt-tx-hash-key-" + request tx hash
pub fn value_transfer_tx_hash_key(request_tx_hash: H256) -> Vec<u8> {
    concat(&[VALUE_TRANSFER_TX_HASH_PREFIX, request_tx_hash.as_bytes()])
}

/// account_snapshot_key = 'a' + account hash
pub fn account_snapshot_key(hash: H256) -> Vec<u8> {
    concat(&[SNAPSHOT_ACCOUNT_PREFIX, hash.as_bytes()])
}

/// storage_snapshot_key = 'o' + account hash + slot hash
pub fn storage_snapshot_key(account_hash: H256, storage_hash: H256) -> Vec<u8> {
    concat(&[
        SNAPSHOT_STORAGE_PREFIX,
        account_hash.as_bytes(),
        storage_hash.as_bytes(),
    ])
}

/// storage_snapshots_key = 'o' + account hash, the prefix covering every
/// storage slot of one account.
pub fn storage_snapshots_key(account_hash: H256) -> Vec<u8> {
    concat(&[SNAPSHOT_STORAGE_PREFIX, account_hash.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn header_key_layout() {
        let hash = H256::repeat_byte(0xab);
        let key = header_key(0x0102030405060708, hash);
        assert_eq!(key.len(), 1 + 8 + 32);
        assert_eq!(key[0], b'h');
        assert_eq!(&key[1..9], &hex!("0102030405060708"));
        assert_eq!(&key[9..], hash.as_bytes());
    }

    #[test]
    fn canonical_hash_key_layout() {
        let key = canonical_hash_key(20_190_815);
        assert_eq!(key.len(), 1 + 8 + 1);
        assert_eq!(key[0], b'h');
        assert_eq!(&key[1..9], &20_190_815u64.to_be_bytes());
        assert_eq!(key[9], b'n');
    }

    #[test]
    fn header_td_key_extends_header_key() {
        let hash = H256::repeat_byte(0x01);
        let mut expected = header_key(7, hash);
        expected.push(b't');
        assert_eq!(header_td_key(7, hash), expected);
    }

    #[test]
    fn bloom_bits_key_layout() {
        let hash = H256::repeat_byte(0xcd);
        let key = bloom_bits_key(0x0102, 0x0304050607080910, hash);
        assert_eq!(key.len(), 1 + 2 + 8 + 32);
        assert_eq!(key[0], b'B');
        assert_eq!(&key[1..3], &hex!("0102"));
        assert_eq!(&key[3..11], &hex!("0304050607080910"));
        assert_eq!(&key[11..], hash.as_bytes());
    }

    #[test]
    fn governance_key_is_little_endian() {
        let key = governance_key(0x0102030405060708);
        assert_eq!(&key[..10], b"governance");
        assert_eq!(&key[10..], &hex!("0807060504030201"));
    }

    #[test]
    fn staking_info_key_is_little_endian() {
        let key = staking_info_key(1);
        assert_eq!(&key[..11], b"stakingInfo");
        assert_eq!(&key[11..], &hex!("0100000000000000"));
    }

    #[test]
    fn storage_snapshot_key_layout() {
        let account = H256::repeat_byte(0x0a);
        let slot = H256::repeat_byte(0x0b);
        let key = storage_snapshot_key(account, slot);
        assert_eq!(key.len(), 1 + 32 + 32);
        assert_eq!(key[0], b'o');
        assert!(key.starts_with(&storage_snapshots_key(account)));
    }

    #[test]
    fn tx_lookup_entry_roundtrip() {
        let entry = TxLookupEntry {
            block_hash: H256::repeat_byte(0x13),
            block_number: 20_190_815,
            index: 3,
        };
        let encoded = entry.encode_to_vec();
        assert_eq!(TxLookupEntry::decode(&encoded).unwrap(), entry);
    }
}
