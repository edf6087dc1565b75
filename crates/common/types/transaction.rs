use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use opal_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::keccak;

/// A signed transaction as carried inside a block body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas: u64,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub payload: Bytes,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

impl Transaction {
    pub fn hash(&self) -> H256 {
        keccak(self.encode_to_vec())
    }
}

impl RLPEncode for Transaction {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        // A missing recipient is encoded as the empty byte string.
        let to = match self.to {
            Some(address) => Bytes::copy_from_slice(address.as_bytes()),
            None => Bytes::new(),
        };
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas)
            .encode_field(&to)
            .encode_field(&self.value)
            .encode_field(&self.payload)
            .encode_field(&self.v)
            .encode_field(&self.r)
            .encode_field(&self.s)
            .finish();
    }
}

impl RLPDecode for Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (gas_price, decoder) = decoder.decode_field("gas_price")?;
        let (gas, decoder) = decoder.decode_field("gas")?;
        let (to, decoder): (Bytes, _) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (payload, decoder) = decoder.decode_field("payload")?;
        let (v, decoder) = decoder.decode_field("v")?;
        let (r, decoder) = decoder.decode_field("r")?;
        let (s, decoder) = decoder.decode_field("s")?;
        let to = match to.len() {
            0 => None,
            20 => Some(Address::from_slice(&to)),
            _ => return Err(RLPDecodeError::InvalidLength.with_context("to")),
        };
        let tx = Transaction {
            nonce,
            gas_price,
            gas,
            to,
            value,
            payload,
            v,
            r,
            s,
        };
        Ok((tx, decoder.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_roundtrip() {
        let tx = Transaction {
            nonce: 7,
            gas_price: U256::from(25_000_000_000u64),
            gas: 21_000,
            to: Some(Address::repeat_byte(0xaa)),
            value: U256::from(10u64).pow(18.into()),
            payload: Bytes::from_static(b"hello"),
            v: U256::from(0x25u64),
            r: U256::from(0x1234u64),
            s: U256::from(0x5678u64),
        };
        let encoded = tx.encode_to_vec();
        assert_eq!(Transaction::decode(&encoded).unwrap(), tx);
    }

    #[test]
    fn contract_creation_roundtrip() {
        let tx = Transaction {
            to: None,
            payload: Bytes::from_static(&[0x60, 0x60]),
            ..Default::default()
        };
        let encoded = tx.encode_to_vec();
        assert_eq!(Transaction::decode(&encoded).unwrap(), tx);
    }

    #[test]
    fn hash_distinguishes_transactions() {
        let a = Transaction::default();
        let b = Transaction {
            nonce: 1,
            ..Default::default()
        };
        assert_ne!(a.hash(), b.hash());
    }
}
