//! TL (Type Language) encoding/decoding utilities for ADNL.
//!
//! Only the primitives the lite-server transport needs: little-endian
//! integers, 128/256-bit blobs, length-prefixed bytes and strings, and
//! boxed booleans. Constructors are written as their CRC32 schema ids.

use crate::error::{AdnlError, Result};

// ============================================================================
// TL Schema IDs (CRC32 of schema definitions)
// ============================================================================

/// tcp.ping random_id:long = tcp.Pong
pub const TCP_PING: u32 = 0x9a2b084d;

/// tcp.pong random_id:long = tcp.Pong
pub const TCP_PONG: u32 = 0x4f15c5d8;

/// adnl.message.query query_id:int256 query:bytes = adnl.Message
pub const ADNL_MESSAGE_QUERY: u32 = 0x7af98bb4;

/// adnl.message.answer query_id:int256 answer:bytes = adnl.Message
pub const ADNL_MESSAGE_ANSWER: u32 = 0x1684ac0f;

/// liteServer.query data:bytes = Object
pub const LITESERVER_QUERY: u32 = 0xdf068c79;

/// liteServer.error code:int message:string = liteServer.Error
pub const LITESERVER_ERROR: u32 = 0xbba9e148;

/// liteServer.getMasterchainInfo = liteServer.MasterchainInfo
pub const LITESERVER_GET_MASTERCHAIN_INFO: u32 = 0x89b5e62e;

/// liteServer.getTime = liteServer.CurrentTime
pub const LITESERVER_GET_TIME: u32 = 0x16ad5a34;

/// pub.ed25519 key:int256 = PublicKey
pub const PUB_ED25519: u32 = 0x4813b4c6;

/// boolTrue = Bool
pub const BOOL_TRUE: u32 = 0x997275b5;

/// boolFalse = Bool
pub const BOOL_FALSE: u32 = 0xbc799737;

/// Length byte announcing a 3-byte length.
const LONG_BYTES_MARKER: u8 = 0xFE;

/// Largest payload a `bytes` field can carry (24-bit length).
pub const MAX_TL_BYTES_LEN: usize = 0xFF_FFFF;

fn padding(written: usize) -> usize {
    (4 - written % 4) % 4
}

// ============================================================================
// TL Writer
// ============================================================================

/// A helper for building TL messages.
#[derive(Debug, Default)]
pub struct TlWriter {
    buffer: Vec<u8>,
}

impl TlWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Writes raw bytes without encoding.
    pub fn write_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_int128(&mut self, value: &[u8; 16]) -> &mut Self {
        self.write_raw(value)
    }

    pub fn write_int256(&mut self, value: &[u8; 32]) -> &mut Self {
        self.write_raw(value)
    }

    /// Writes a boxed `Bool`.
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u32(if value { BOOL_TRUE } else { BOOL_FALSE })
    }

    /// Writes bytes with TL encoding.
    ///
    /// Lengths below 254 use a single length byte; longer payloads use
    /// `0xFE` followed by a 3-byte little-endian length. The field is
    /// zero-padded to a multiple of 4. Payloads are expected to fit in
    /// [`MAX_TL_BYTES_LEN`]; higher bits of the length are dropped.
    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        let header = if len < LONG_BYTES_MARKER as usize {
            self.buffer.push(len as u8);
            1
        } else {
            self.buffer.push(LONG_BYTES_MARKER);
            self.buffer.extend_from_slice(&(len as u32).to_le_bytes()[..3]);
            4
        };
        self.buffer.extend_from_slice(data);
        self.buffer
            .extend(std::iter::repeat_n(0, padding(header + len)));
        self
    }

    /// Writes a UTF-8 string as TL `bytes`.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        self.write_bytes(value.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the writer and returns the buffer.
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

// ============================================================================
// TL Reader
// ============================================================================

/// A cursor for reading TL messages.
#[derive(Debug, Clone)]
pub struct TlReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TlReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Returns the remaining unread data.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn ensure(&self, len: usize) -> Result<()> {
        if self.remaining_len() < len {
            return Err(AdnlError::TlError(format!(
                "need {} bytes, have {}",
                len,
                self.remaining_len()
            )));
        }
        Ok(())
    }

    /// Reads raw bytes without decoding.
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let result = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(result)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_raw(N)?);
        Ok(out)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_int128(&mut self) -> Result<[u8; 16]> {
        self.read_array()
    }

    pub fn read_int256(&mut self) -> Result<[u8; 32]> {
        self.read_array()
    }

    /// Reads a boxed `Bool`.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.peek_u32()? {
            BOOL_TRUE => {
                self.offset += 4;
                Ok(true)
            }
            BOOL_FALSE => {
                self.offset += 4;
                Ok(false)
            }
            other => Err(AdnlError::UnexpectedMessageType(other)),
        }
    }

    /// Reads TL-encoded bytes. The cursor only moves on success.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        self.ensure(1)?;
        let first = self.data[self.offset];
        let (header, len) = match first {
            LONG_BYTES_MARKER => {
                self.ensure(4)?;
                let b = &self.data[self.offset + 1..self.offset + 4];
                (4, u32::from_le_bytes([b[0], b[1], b[2], 0]) as usize)
            }
            0xFF => {
                return Err(AdnlError::TlError("invalid bytes length marker 0xff".into()));
            }
            short => (1, short as usize),
        };

        let consumed = header + len + padding(header + len);
        self.ensure(consumed)?;
        let start = self.offset + header;
        let result = self.data[start..start + len].to_vec();
        self.offset += consumed;
        Ok(result)
    }

    /// Reads a TL string. Invalid UTF-8 is an error.
    pub fn read_string(&mut self) -> Result<String> {
        let mut cursor = self.clone();
        let bytes = cursor.read_bytes()?;
        let value = String::from_utf8(bytes)
            .map_err(|e| AdnlError::TlError(format!("invalid utf-8 in string: {}", e)))?;
        *self = cursor;
        Ok(value)
    }

    /// Peeks at the next u32 without consuming it.
    pub fn peek_u32(&self) -> Result<u32> {
        self.ensure(4)?;
        let b = &self.data[self.offset..self.offset + 4];
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.offset += len;
        Ok(())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Encodes bytes using TL byte encoding.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let mut writer = TlWriter::with_capacity(data.len() + 8);
    writer.write_bytes(data);
    writer.finish()
}

/// Decodes TL-encoded bytes.
///
/// Returns the decoded bytes and the number of bytes consumed.
pub fn decode_bytes(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut reader = TlReader::new(data);
    let bytes = reader.read_bytes()?;
    Ok((bytes, reader.offset()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_u32() {
        let mut writer = TlWriter::new();
        writer.write_u32(0x12345678);
        assert_eq!(writer.finish(), vec![0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_writer_i64() {
        let mut writer = TlWriter::new();
        writer.write_i64(-2);
        assert_eq!(writer.finish(), vec![0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_writer_bytes_short() {
        let mut writer = TlWriter::new();
        writer.write_bytes(b"Hi");
        assert_eq!(writer.finish(), vec![2, b'H', b'i', 0]);
    }

    #[test]
    fn test_writer_bytes_boundary() {
        // 253 bytes still fit the short form: 1 + 253 = 254, padded to 256.
        let short = encode_bytes(&[7u8; 253]);
        assert_eq!(short[0], 253);
        assert_eq!(short.len(), 256);

        // 254 bytes switch to the long form: 4 + 254 = 258, padded to 260.
        let long = encode_bytes(&[7u8; 254]);
        assert_eq!(&long[..4], &[0xFE, 254, 0, 0]);
        assert_eq!(long.len(), 260);
    }

    #[test]
    fn test_writer_bytes_long() {
        let data: Vec<u8> = (0..300).map(|i| i as u8).collect();
        let result = encode_bytes(&data);

        assert_eq!(&result[..4], &[0xFE, 0x2C, 0x01, 0x00]);
        assert_eq!(&result[4..304], &data[..]);
        assert_eq!(result.len(), 304);
    }

    #[test]
    fn test_reader_bytes_truncated_keeps_offset() {
        let data = [5u8, 1, 2];
        let mut reader = TlReader::new(&data);
        assert!(matches!(reader.read_bytes(), Err(AdnlError::TlError(_))));
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn test_reader_rejects_ff_marker() {
        let data = [0xFFu8, 0, 0, 0];
        assert!(TlReader::new(&data).read_bytes().is_err());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for len in [0usize, 1, 3, 4, 253, 254, 255, 1000, 70000] {
            let original: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let encoded = encode_bytes(&original);
            assert_eq!(encoded.len() % 4, 0);
            let (decoded, consumed) = decode_bytes(&encoded).unwrap();
            assert_eq!(decoded, original, "length {}", len);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn test_string_and_bool() {
        let mut writer = TlWriter::new();
        writer.write_string("not ready").write_bool(true).write_bool(false);
        let data = writer.finish();
        assert_eq!(&data[12..16], &BOOL_TRUE.to_le_bytes());

        let mut reader = TlReader::new(&data);
        assert_eq!(reader.read_string().unwrap(), "not ready");
        assert!(reader.read_bool().unwrap());
        assert!(!reader.read_bool().unwrap());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_bool_rejects_other_constructor() {
        let data = TCP_PING.to_le_bytes();
        let mut reader = TlReader::new(&data);
        assert!(matches!(
            reader.read_bool(),
            Err(AdnlError::UnexpectedMessageType(TCP_PING))
        ));
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn test_ping_message_layout() {
        let mut writer = TlWriter::new();
        writer.write_u32(TCP_PING).write_u64(12345);
        let data = writer.finish();

        let mut reader = TlReader::new(&data);
        assert_eq!(reader.peek_u32().unwrap(), TCP_PING);
        assert_eq!(reader.read_u32().unwrap(), TCP_PING);
        assert_eq!(reader.read_u64().unwrap(), 12345);
        assert!(reader.is_empty());
        assert!(reader.peek_u32().is_err());
    }

    #[test]
    fn test_int128_int256() {
        let mut writer = TlWriter::new();
        writer.write_int128(&[1u8; 16]).write_int256(&[42u8; 32]);
        let data = writer.finish();

        let mut reader = TlReader::new(&data);
        assert_eq!(reader.read_int128().unwrap(), [1u8; 16]);
        assert_eq!(reader.read_int256().unwrap(), [42u8; 32]);
        assert!(reader.skip(1).is_err());
    }
}
