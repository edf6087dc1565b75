use bytes::Bytes;
use ethereum_types::{Address, Bloom, H256, U256};
use opal_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use super::{BlockHash, BlockNumber, Transaction};
use crate::keccak;

/// Header of a block in the chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockHeader {
    pub parent_hash: H256,
    /// Address receiving the block reward.
    pub rewardbase: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    /// Consensus weight of the block, accumulated into the total blockscore.
    pub block_score: U256,
    pub number: BlockNumber,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub governance_data: Bytes,
    pub vote_data: Bytes,
}

impl BlockHeader {
    /// Keccak-256 of the RLP encoding, the block's identity.
    pub fn hash(&self) -> BlockHash {
        keccak(self.encode_to_vec())
    }
}

impl RLPEncode for BlockHeader {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.parent_hash)
            .encode_field(&self.rewardbase)
            .encode_field(&self.state_root)
            .encode_field(&self.transactions_root)
            .encode_field(&self.receipts_root)
            .encode_field(&self.logs_bloom)
            .encode_field(&self.block_score)
            .encode_field(&self.number)
            .encode_field(&self.gas_used)
            .encode_field(&self.timestamp)
            .encode_field(&self.extra_data)
            .encode_field(&self.governance_data)
            .encode_field(&self.vote_data)
            .finish();
    }
}

impl RLPDecode for BlockHeader {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (parent_hash, decoder) = decoder.decode_field("parent_hash")?;
        let (rewardbase, decoder) = decoder.decode_field("rewardbase")?;
        let (state_root, decoder) = decoder.decode_field("state_root")?;
        let (transactions_root, decoder) = decoder.decode_field("transactions_root")?;
        let (receipts_root, decoder) = decoder.decode_field("receipts_root")?;
        let (logs_bloom, decoder) = decoder.decode_field("logs_bloom")?;
        let (block_score, decoder) = decoder.decode_field("block_score")?;
        let (number, decoder) = decoder.decode_field("number")?;
        let (gas_used, decoder) = decoder.decode_field("gas_used")?;
        let (timestamp, decoder) = decoder.decode_field("timestamp")?;
        let (extra_data, decoder) = decoder.decode_field("extra_data")?;
        let (governance_data, decoder) = decoder.decode_field("governance_data")?;
        let (vote_data, decoder) = decoder.decode_field("vote_data")?;
        let header = BlockHeader {
            parent_hash,
            rewardbase,
            state_root,
            transactions_root,
            receipts_root,
            logs_bloom,
            block_score,
            number,
            gas_used,
            timestamp,
            extra_data,
            governance_data,
            vote_data,
        };
        Ok((header, decoder.finish()?))
    }
}

/// The non-header part of a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockBody {
    pub transactions: Vec<Transaction>,
}

impl RLPEncode for BlockBody {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.transactions)
            .finish();
    }
}

impl RLPDecode for BlockBody {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (transactions, decoder) = decoder.decode_field("transactions")?;
        Ok((BlockBody { transactions }, decoder.finish()?))
    }
}

/// A complete block, assembled from its stored header and body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn new(header: BlockHeader, body: BlockBody) -> Self {
        Self { header, body }
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn number(&self) -> BlockNumber {
        self.header.number
    }
}

impl RLPEncode for Block {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.header)
            .encode_field(&self.body.transactions)
            .finish();
    }
}

impl RLPDecode for Block {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (header, decoder) = decoder.decode_field("header")?;
        let (transactions, decoder) = decoder.decode_field("transactions")?;
        let block = Block {
            header,
            body: BlockBody { transactions },
        };
        Ok((block, decoder.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            parent_hash: H256::repeat_byte(0x11),
            rewardbase: Address::repeat_byte(0x22),
            state_root: H256::repeat_byte(0x33),
            transactions_root: H256::repeat_byte(0x44),
            receipts_root: H256::repeat_byte(0x55),
            logs_bloom: Bloom::zero(),
            block_score: U256::from(1u64),
            number: 20_190_815,
            gas_used: 21_000,
            timestamp: 1_565_824_800,
            extra_data: Bytes::from_static(b"extra"),
            governance_data: Bytes::new(),
            vote_data: Bytes::new(),
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = sample_header();
        let encoded = header.encode_to_vec();
        assert_eq!(BlockHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn header_hash_is_stable() {
        let header = sample_header();
        assert_eq!(header.hash(), header.clone().hash());
        let mut other = header.clone();
        other.number += 1;
        assert_ne!(header.hash(), other.hash());
    }

    #[test]
    fn body_roundtrip() {
        let body = BlockBody {
            transactions: vec![Transaction::default()],
        };
        let encoded = body.encode_to_vec();
        assert_eq!(BlockBody::decode(&encoded).unwrap(), body);
    }
}
