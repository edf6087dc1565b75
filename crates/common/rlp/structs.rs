use bytes::BufMut;

use super::{
    constants::RLP_EMPTY_LIST,
    decode::{decode_rlp_item, get_item_with_prefix, RLPDecode},
    encode::{encode_length, RLPEncode},
    error::RLPDecodeError,
};

/// # Struct decoding helper
///
/// Decodes a struct from an RLP list, field by field, in the order the
/// fields are passed to [`Decoder::decode_field`]. Must be consumed with
/// [`Decoder::finish`] so leftover payload is detected.
#[derive(Debug)]
#[must_use = "`Decoder` must be consumed with `finish` to perform decoding checks"]
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, RLPDecodeError> {
        match decode_rlp_item(buf)? {
            (true, payload, remaining) => Ok(Self { payload, remaining }),
            (false, _, _) => Err(RLPDecodeError::UnexpectedString),
        }
    }

    pub fn decode_field<T: RLPDecode>(self, name: &str) -> Result<(T, Self), RLPDecodeError> {
        let (field, rest) = T::decode_unfinished(self.payload)
            .map_err(|err| err.with_context(name))?;
        Ok((
            field,
            Self {
                payload: rest,
                ..self
            },
        ))
    }

    /// Returns the next field without decoding it, prefix included.
    pub fn get_encoded_item(self) -> Result<(Vec<u8>, Self), RLPDecodeError> {
        let (item, rest) = get_item_with_prefix(self.payload)?;
        Ok((
            item.to_vec(),
            Self {
                payload: rest,
                ..self
            },
        ))
    }

    /// Finishes decoding and returns the bytes after the list.
    /// Fails if any list payload is left over.
    pub const fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if self.payload.is_empty() {
            Ok(self.remaining)
        } else {
            Err(RLPDecodeError::MalformedData)
        }
    }

    pub const fn is_done(&self) -> bool {
        self.payload.is_empty()
    }
}

/// # Struct encoding helper
///
/// Encodes a struct as an RLP list, with its values being the fields in the
/// order they are passed to [`Encoder::encode_field`].
#[must_use = "`Encoder` must be consumed with `finish` to perform the encoding"]
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    temp_buf: Vec<u8>,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Self {
            buf,
            temp_buf: Vec::new(),
        }
    }

    pub fn encode_field<T: RLPEncode>(mut self, value: &T) -> Self {
        value.encode(&mut self.temp_buf);
        self
    }

    /// Appends an already-encoded item verbatim.
    pub fn encode_raw(mut self, encoded: &[u8]) -> Self {
        self.temp_buf.put_slice(encoded);
        self
    }

    pub fn finish(self) {
        encode_length(RLP_EMPTY_LIST, self.temp_buf.len(), self.buf);
        self.buf.put_slice(&self.temp_buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Simple {
        a: u8,
        b: u16,
    }

    impl RLPEncode for Simple {
        fn encode(&self, buf: &mut dyn BufMut) {
            Encoder::new(buf)
                .encode_field(&self.a)
                .encode_field(&self.b)
                .finish();
        }
    }

    impl RLPDecode for Simple {
        fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
            let decoder = Decoder::new(rlp)?;
            let (a, decoder) = decoder.decode_field("a")?;
            let (b, decoder) = decoder.decode_field("b")?;
            Ok((Simple { a, b }, decoder.finish()?))
        }
    }

    #[test]
    fn struct_roundtrip() {
        let value = Simple { a: 61, b: 75 };
        let mut buf = vec![];
        value.encode(&mut buf);
        assert_eq!(buf, vec![0xc2, 61, 75]);
        assert_eq!(Simple::decode(&buf).unwrap(), value);
    }

    #[test]
    fn leftover_payload_is_rejected() {
        // list with three items decoded as two fields
        let buf = vec![0xc3, 1, 2, 3];
        let decoder = Decoder::new(&buf).unwrap();
        let (_, decoder): (u8, _) = decoder.decode_field("a").unwrap();
        let (_, decoder): (u8, _) = decoder.decode_field("b").unwrap();
        assert!(decoder.finish().is_err());
    }
}
