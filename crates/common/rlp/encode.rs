use bytes::{BufMut, Bytes};
use ethereum_types::{Address, Bloom, H256, U256};

use super::constants::RLP_NULL;

/// Encodes a value to a freshly allocated RLP buffer.
pub fn encode<T: RLPEncode>(value: T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

impl RLPEncode for bool {
    fn encode(&self, buf: &mut dyn BufMut) {
        if *self {
            buf.put_u8(0x01);
        } else {
            buf.put_u8(RLP_NULL);
        }
    }
}

/// Writes the prefix for a byte-string or list payload of the given length.
///
/// `offset` is [`RLP_NULL`] for strings and [`RLP_EMPTY_LIST`] for lists.
pub fn encode_length(offset: u8, payload_len: usize, buf: &mut dyn BufMut) {
    if payload_len < 56 {
        buf.put_u8(offset + payload_len as u8);
    } else {
        let be = payload_len.to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count();
        let be = &be[skip..];
        buf.put_u8(offset + 55 + be.len() as u8);
        buf.put_slice(be);
    }
}

/// Encodes a slice of bytes as an RLP string.
pub fn encode_bytes(bytes: &[u8], buf: &mut dyn BufMut) {
    if bytes.len() == 1 && bytes[0] < RLP_NULL {
        buf.put_u8(bytes[0]);
    } else {
        encode_length(RLP_NULL, bytes.len(), buf);
        buf.put_slice(bytes);
    }
}

fn encode_unsigned_be(be: &[u8], buf: &mut dyn BufMut) {
    let skip = be.iter().take_while(|b| **b == 0).count();
    encode_bytes(&be[skip..], buf);
}

macro_rules! impl_encode_uint {
    ($($t:ty),+) => {
        $(impl RLPEncode for $t {
            fn encode(&self, buf: &mut dyn BufMut) {
                encode_unsigned_be(&self.to_be_bytes(), buf);
            }
        })+
    };
}

impl_encode_uint!(u8, u16, u32, u64, usize);

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_unsigned_be(&self.to_big_endian(), buf);
    }
}

impl RLPEncode for H256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_bytes(self.as_bytes(), buf);
    }
}

impl RLPEncode for Address {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_bytes(self.as_bytes(), buf);
    }
}

impl RLPEncode for Bloom {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_bytes(self.as_bytes(), buf);
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_bytes(self, buf);
    }
}

impl RLPEncode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_bytes(self.as_bytes(), buf);
    }
}

impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_slice().encode(buf)
    }
}

impl<T: RLPEncode> RLPEncode for &[T] {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut payload = Vec::new();
        for item in *self {
            item.encode(&mut payload);
        }
        encode_length(super::constants::RLP_EMPTY_LIST, payload.len(), buf);
        buf.put_slice(&payload);
    }
}

impl<T: RLPEncode> RLPEncode for &T {
    fn encode(&self, buf: &mut dyn BufMut) {
        (*self).encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_small_integers() {
        assert_eq!(encode(0u64), vec![RLP_NULL]);
        assert_eq!(encode(0x0fu64), vec![0x0f]);
        assert_eq!(encode(1024u64), vec![0x82, 0x04, 0x00]);
    }

    #[test]
    fn encode_byte_strings() {
        assert_eq!(encode(Bytes::from_static(b"dog")), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(encode(Bytes::new()), vec![RLP_NULL]);
        assert_eq!(encode(Bytes::from_static(&[0x7f])), vec![0x7f]);
        assert_eq!(encode(Bytes::from_static(&[0x80])), vec![0x81, 0x80]);
    }

    #[test]
    fn encode_long_string_prefix() {
        let payload = vec![0xaau8; 60];
        let encoded = encode(Bytes::from(payload.clone()));
        assert_eq!(encoded[0], RLP_NULL + 56);
        assert_eq!(encoded[1], 60);
        assert_eq!(&encoded[2..], payload.as_slice());
    }

    #[test]
    fn encode_list_of_integers() {
        // [1, 2, 3] -> 0xc3 0x01 0x02 0x03
        assert_eq!(encode(vec![1u8, 2, 3]), vec![0xc3, 0x01, 0x02, 0x03]);
    }
}
