use bytes::Bytes;
use ethereum_types::{Address, Bloom, H256};
use opal_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

/// Result of executing a transaction.
///
/// The consensus encoding covers status, bloom and logs only; the database
/// keeps the wider [`StorageReceipt`] form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    pub status: u64,
    pub bloom: Bloom,
    pub logs: Vec<Log>,
    pub tx_hash: H256,
    pub contract_address: Address,
    pub gas_used: u64,
}

impl RLPEncode for Receipt {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.status)
            .encode_field(&self.bloom)
            .encode_field(&self.logs)
            .finish();
    }
}

/// Database form of a receipt: the consensus fields plus the positional
/// metadata needed to serve lookups without re-execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageReceipt(pub Receipt);

impl From<Receipt> for StorageReceipt {
    fn from(receipt: Receipt) -> Self {
        Self(receipt)
    }
}

impl From<StorageReceipt> for Receipt {
    fn from(receipt: StorageReceipt) -> Self {
        receipt.0
    }
}

impl RLPEncode for StorageReceipt {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.0.status)
            .encode_field(&self.0.bloom)
            .encode_field(&self.0.logs)
            .encode_field(&self.0.tx_hash)
            .encode_field(&self.0.contract_address)
            .encode_field(&self.0.gas_used)
            .finish();
    }
}

impl RLPDecode for StorageReceipt {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (status, decoder) = decoder.decode_field("status")?;
        let (bloom, decoder) = decoder.decode_field("bloom")?;
        let (logs, decoder) = decoder.decode_field("logs")?;
        let (tx_hash, decoder) = decoder.decode_field("tx_hash")?;
        let (contract_address, decoder) = decoder.decode_field("contract_address")?;
        let (gas_used, decoder) = decoder.decode_field("gas_used")?;
        let receipt = Receipt {
            status,
            bloom,
            logs,
            tx_hash,
            contract_address,
            gas_used,
        };
        Ok((StorageReceipt(receipt), decoder.finish()?))
    }
}

/// A log record emitted during execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

impl RLPEncode for Log {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.address)
            .encode_field(&self.topics)
            .encode_field(&self.data)
            .finish();
    }
}

impl RLPDecode for Log {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (address, decoder) = decoder.decode_field("address")?;
        let (topics, decoder) = decoder.decode_field("topics")?;
        let (data, decoder) = decoder.decode_field("data")?;
        Ok((
            Log {
                address,
                topics,
                data,
            },
            decoder.finish()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_receipt() -> Receipt {
        Receipt {
            status: 1,
            bloom: Bloom::zero(),
            logs: vec![Log {
                address: Address::repeat_byte(0x01),
                topics: vec![H256::repeat_byte(0x02)],
                data: Bytes::from_static(b"log"),
            }],
            tx_hash: H256::repeat_byte(0x03),
            contract_address: Address::zero(),
            gas_used: 21_000,
        }
    }

    #[test]
    fn storage_receipt_roundtrip() {
        let receipt = sample_receipt();
        let stored = StorageReceipt(receipt.clone());
        let encoded = stored.encode_to_vec();
        let decoded = StorageReceipt::decode(&encoded).unwrap();
        assert_eq!(Receipt::from(decoded), receipt);
    }

    #[test]
    fn storage_form_is_wider_than_consensus_form() {
        let receipt = sample_receipt();
        let consensus = receipt.encode_to_vec();
        let stored = StorageReceipt(receipt).encode_to_vec();
        assert!(stored.len() > consensus.len());
    }
}
