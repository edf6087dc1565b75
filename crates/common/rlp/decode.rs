use bytes::Bytes;
use ethereum_types::{Address, Bloom, H256, U256};

use super::{constants::RLP_NULL, error::RLPDecodeError};

/// Trait for decoding RLP encoded slices of data.
///
/// Implementors provide [`decode_unfinished`](RLPDecode::decode_unfinished),
/// which returns the decoded value along with the remaining bytes; consumers
/// normally call [`decode`](RLPDecode::decode).
pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(decoded)
    }
}

impl RLPDecode for bool {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first = rlp.first().ok_or(RLPDecodeError::InvalidLength)?;
        let value = match first {
            &RLP_NULL => false,
            0x01 => true,
            b => return Err(RLPDecodeError::MalformedBoolean(*b)),
        };
        Ok((value, &rlp[1..]))
    }
}

macro_rules! impl_decode_uint {
    ($($t:ty),+) => {
        $(impl RLPDecode for $t {
            fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (bytes, rest) = decode_bytes(rlp)?;
                let padded = static_left_pad(bytes)?;
                Ok((<$t>::from_be_bytes(padded), rest))
            }
        })+
    };
}

impl_decode_uint!(u8, u16, u32, u64, usize);

impl RLPDecode for U256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.len() > 32 || bytes.first() == Some(&0) && bytes.len() > 1 {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok((U256::from_big_endian(bytes), rest))
    }
}

impl RLPDecode for H256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.len() != 32 {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((H256::from_slice(bytes), rest))
    }
}

impl RLPDecode for Address {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.len() != 20 {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((Address::from_slice(bytes), rest))
    }
}

impl RLPDecode for Bloom {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.len() != 256 {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((Bloom::from_slice(bytes), rest))
    }
}

impl RLPDecode for Bytes {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((Bytes::copy_from_slice(bytes), rest))
    }
}

impl RLPDecode for String {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = String::from_utf8(bytes.to_vec())
            .map_err(|_| RLPDecodeError::MalformedData)?;
        Ok((value, rest))
    }
}

impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, mut payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items = Vec::new();
        while !payload.is_empty() {
            let (item, remaining) = T::decode_unfinished(payload)?;
            items.push(item);
            payload = remaining;
        }
        Ok((items, rest))
    }
}

/// Splits an RLP item off the front of `data`.
///
/// Returns `(is_list, payload, rest)` where `payload` is the item's content
/// without its prefix and `rest` is everything after the item.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let first = *data.first().ok_or(RLPDecodeError::InvalidLength)?;
    match first {
        0..=0x7f => Ok((false, &data[..1], &data[1..])),
        0x80..=0xb7 => {
            let len = (first - 0x80) as usize;
            split_at(data, 1, len).map(|(p, r)| (false, p, r))
        }
        0xb8..=0xbf => {
            let len_len = (first - 0xb7) as usize;
            let len = read_be_len(data, len_len)?;
            split_at(data, 1 + len_len, len).map(|(p, r)| (false, p, r))
        }
        0xc0..=0xf7 => {
            let len = (first - 0xc0) as usize;
            split_at(data, 1, len).map(|(p, r)| (true, p, r))
        }
        0xf8..=0xff => {
            let len_len = (first - 0xf7) as usize;
            let len = read_be_len(data, len_len)?;
            split_at(data, 1 + len_len, len).map(|(p, r)| (true, p, r))
        }
    }
}

/// Returns the complete encoding (prefix included) of the first item in
/// `data`, along with the remaining bytes.
pub fn get_item_with_prefix(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (_, _, rest) = decode_rlp_item(data)?;
    let item_len = data.len() - rest.len();
    Ok((&data[..item_len], rest))
}

/// Decodes the payload of an RLP string, rejecting lists.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    match decode_rlp_item(data)? {
        (false, payload, rest) => Ok((payload, rest)),
        (true, _, _) => Err(RLPDecodeError::UnexpectedList),
    }
}

fn read_be_len(data: &[u8], len_len: usize) -> Result<usize, RLPDecodeError> {
    let bytes = data
        .get(1..1 + len_len)
        .ok_or(RLPDecodeError::InvalidLength)?;
    if bytes.first() == Some(&0) {
        return Err(RLPDecodeError::MalformedData);
    }
    let mut len = 0usize;
    for b in bytes {
        len = len
            .checked_mul(256)
            .ok_or(RLPDecodeError::InvalidLength)?
            + *b as usize;
    }
    Ok(len)
}

fn split_at(data: &[u8], start: usize, len: usize) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let end = start.checked_add(len).ok_or(RLPDecodeError::InvalidLength)?;
    if data.len() < end {
        return Err(RLPDecodeError::InvalidLength);
    }
    Ok((&data[start..end], &data[end..]))
}

/// Left-pads a big-endian integer payload to the width of the target type.
pub fn static_left_pad<const N: usize>(bytes: &[u8]) -> Result<[u8; N], RLPDecodeError> {
    if bytes.len() > N {
        return Err(RLPDecodeError::InvalidLength);
    }
    if bytes.first() == Some(&0) {
        return Err(RLPDecodeError::MalformedData);
    }
    let mut padded = [0u8; N];
    padded[N - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;

    #[test]
    fn roundtrip_integers() {
        for value in [0u64, 1, 127, 128, 255, 1024, 20_190_815, u64::MAX] {
            let encoded = encode(value);
            assert_eq!(u64::decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn roundtrip_hashes() {
        let hash = H256::repeat_byte(0xab);
        assert_eq!(H256::decode(&encode(hash)).unwrap(), hash);
    }

    #[test]
    fn roundtrip_u256() {
        for value in [U256::zero(), U256::from(1u64), U256::MAX] {
            assert_eq!(U256::decode(&encode(value)).unwrap(), value);
        }
    }

    #[test]
    fn roundtrip_byte_strings() {
        for payload in [vec![], vec![0x7f], vec![0x80], vec![0xaa; 100]] {
            let encoded = encode(Bytes::from(payload.clone()));
            assert_eq!(Bytes::decode(&encoded).unwrap(), Bytes::from(payload));
        }
    }

    #[test]
    fn roundtrip_vec_of_hashes() {
        let hashes = vec![H256::repeat_byte(1), H256::repeat_byte(2)];
        assert_eq!(Vec::<H256>::decode(&encode(hashes.clone())).unwrap(), hashes);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut encoded = encode(5u64);
        encoded.push(0x00);
        assert_eq!(u64::decode(&encoded), Err(RLPDecodeError::InvalidLength));
    }

    #[test]
    fn leading_zeros_are_rejected() {
        // 0x82 0x00 0x01 is a non-canonical encoding of 1
        assert!(u64::decode(&[0x82, 0x00, 0x01]).is_err());
    }
}
