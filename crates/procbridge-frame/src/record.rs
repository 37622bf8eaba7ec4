use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::INT_SIZE;
use crate::error::{FrameError, Result};

/// Default maximum size of one decoded record: 64 MiB.
pub const DEFAULT_MAX_RECORD: usize = 64 * 1024 * 1024;

/// Serializes one record into the current buffer.
pub trait RecordEncoder<T: ?Sized> {
    /// Append the encoded form of `record` to `dst`.
    fn encode(&mut self, record: &T, dst: &mut BytesMut) -> Result<()>;
}

impl<'a, T: ?Sized, E: RecordEncoder<T>> RecordEncoder<&'a T> for E {
    fn encode(&mut self, record: &&'a T, dst: &mut BytesMut) -> Result<()> {
        E::encode(self, *record, dst)
    }
}

/// Turns received bytes back into records.
pub trait RecordDecoder {
    type Item;

    /// Decode one record from the front of `src`.
    ///
    /// Returns `Ok(None)` if `src` doesn't hold a complete record yet. On
    /// success, consumes the record bytes from the buffer.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>>;
}

/// Length-prefixed raw byte records.
///
/// ```text
/// ┌──────────────┬──────────────────┐
/// │ Length (4B)  │ Payload          │
/// │ big-endian   │ (Length bytes)   │
/// └──────────────┴──────────────────┘
/// ```
///
/// Integers are carried as their 4-byte big-endian form, strings as UTF-8.
#[derive(Debug, Clone)]
pub struct RawRecordCodec {
    max_record_size: usize,
}

impl RawRecordCodec {
    pub fn new() -> Self {
        Self::with_max_record_size(DEFAULT_MAX_RECORD)
    }

    pub fn with_max_record_size(max_record_size: usize) -> Self {
        Self { max_record_size }
    }

    fn put_record(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.max_record_size || payload.len() > u32::MAX as usize {
            return Err(FrameError::RecordTooLarge {
                size: payload.len(),
                max: self.max_record_size,
            });
        }
        dst.reserve(INT_SIZE + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(payload);
        Ok(())
    }
}

impl Default for RawRecordCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordEncoder<i32> for RawRecordCodec {
    fn encode(&mut self, record: &i32, dst: &mut BytesMut) -> Result<()> {
        self.put_record(&record.to_be_bytes(), dst)
    }
}

impl RecordEncoder<str> for RawRecordCodec {
    fn encode(&mut self, record: &str, dst: &mut BytesMut) -> Result<()> {
        self.put_record(record.as_bytes(), dst)
    }
}

impl RecordEncoder<String> for RawRecordCodec {
    fn encode(&mut self, record: &String, dst: &mut BytesMut) -> Result<()> {
        self.put_record(record.as_bytes(), dst)
    }
}

impl RecordEncoder<[u8]> for RawRecordCodec {
    fn encode(&mut self, record: &[u8], dst: &mut BytesMut) -> Result<()> {
        self.put_record(record, dst)
    }
}

impl RecordEncoder<Vec<u8>> for RawRecordCodec {
    fn encode(&mut self, record: &Vec<u8>, dst: &mut BytesMut) -> Result<()> {
        self.put_record(record, dst)
    }
}

impl RecordEncoder<Bytes> for RawRecordCodec {
    fn encode(&mut self, record: &Bytes, dst: &mut BytesMut) -> Result<()> {
        self.put_record(record, dst)
    }
}

impl RecordDecoder for RawRecordCodec {
    type Item = Bytes;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.len() < INT_SIZE {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > self.max_record_size {
            return Err(FrameError::RecordTooLarge {
                size: len,
                max: self.max_record_size,
            });
        }

        if src.len() < INT_SIZE + len {
            return Ok(None);
        }

        src.advance(INT_SIZE);
        Ok(Some(src.split_to(len).freeze()))
    }
}

/// Interpret a raw record payload as a big-endian `i32`.
pub fn record_as_i32(payload: &[u8]) -> Result<i32> {
    let raw: [u8; INT_SIZE] = payload.try_into().map_err(|_| {
        FrameError::InvalidRecord(format!("expected 4-byte integer, got {} bytes", payload.len()))
    })?;
    Ok(i32::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_record_layout() {
        let mut codec = RawRecordCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("abc", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn integer_record_decodes_back() {
        let mut codec = RawRecordCodec::new();
        let mut buf = BytesMut::new();
        RecordEncoder::<i32>::encode(&mut codec, &-7, &mut buf).unwrap();

        let record = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(record_as_i32(&record).unwrap(), -7);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_header() {
        let mut codec = RawRecordCodec::new();
        let mut buf = BytesMut::from(&[0, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn decode_incomplete_payload() {
        let mut codec = RawRecordCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(&b"hello".to_vec(), &mut buf).unwrap();
        buf.truncate(INT_SIZE + 2);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), INT_SIZE + 2);
    }

    #[test]
    fn decode_multiple_records_from_one_buffer() {
        let mut codec = RawRecordCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("one", &mut buf).unwrap();
        codec.encode("", &mut buf).unwrap();
        codec.encode("three", &mut buf).unwrap();

        let mut out = Vec::new();
        while let Some(record) = codec.decode(&mut buf).unwrap() {
            out.push(record);
        }
        assert_eq!(out, vec![
            Bytes::from_static(b"one"),
            Bytes::new(),
            Bytes::from_static(b"three"),
        ]);
    }

    #[test]
    fn oversized_record_rejected_both_ways() {
        let mut codec = RawRecordCodec::with_max_record_size(4);
        let mut buf = BytesMut::new();
        let err = codec.encode("too long", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::RecordTooLarge { size: 8, max: 4 }));

        let mut wire = BytesMut::from(&[0, 0, 1, 0][..]);
        let err = codec.decode(&mut wire).unwrap_err();
        assert!(matches!(err, FrameError::RecordTooLarge { size: 256, .. }));
    }

    #[test]
    fn borrowed_records_encode_like_owned_ones() {
        let mut codec = RawRecordCodec::new();
        let owned = vec![1u8, 2, 3];
        let mut by_ref = BytesMut::new();
        let mut by_value = BytesMut::new();

        RecordEncoder::<&Vec<u8>>::encode(&mut codec, &&owned, &mut by_ref).unwrap();
        RecordEncoder::<Vec<u8>>::encode(&mut codec, &owned, &mut by_value).unwrap();
        assert_eq!(by_ref, by_value);
    }

    #[test]
    fn record_as_i32_rejects_wrong_width() {
        assert!(matches!(
            record_as_i32(b"abc"),
            Err(FrameError::InvalidRecord(_))
        ));
    }
}
