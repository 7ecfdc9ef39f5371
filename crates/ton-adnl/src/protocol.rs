//! Lite-server message wrapping.
//!
//! A lite-server request travels as
//! `adnl.message.query(query_id, liteServer.query(data))` and comes back as
//! `adnl.message.answer(query_id, answer)`. Keepalive uses `tcp.ping` and
//! `tcp.pong` outside of that envelope.

use crate::error::{AdnlError, Result};
use crate::tl::{
    TlReader, TlWriter, ADNL_MESSAGE_ANSWER, ADNL_MESSAGE_QUERY, LITESERVER_ERROR,
    LITESERVER_QUERY, TCP_PING, TCP_PONG,
};

/// Id correlating a query with its answer.
pub type QueryId = [u8; 32];

/// Generates a random query ID.
pub fn generate_query_id() -> QueryId {
    ton_crypto::random_bytes()
}

/// Wraps raw lite-server request bytes for sending.
pub fn wrap_lite_query(data: &[u8], query_id: &QueryId) -> Vec<u8> {
    let mut lite_query = TlWriter::with_capacity(data.len() + 8);
    lite_query.write_u32(LITESERVER_QUERY).write_bytes(data);
    let lite_query = lite_query.finish();

    let mut adnl_query = TlWriter::with_capacity(lite_query.len() + 40);
    adnl_query
        .write_u32(ADNL_MESSAGE_QUERY)
        .write_int256(query_id)
        .write_bytes(&lite_query);
    adnl_query.finish()
}

/// The standard query encoder: a fresh id and the wrapped packet.
pub fn encode_lite_query(data: &[u8]) -> (QueryId, Vec<u8>) {
    let query_id = generate_query_id();
    let packet = wrap_lite_query(data, &query_id);
    (query_id, packet)
}

/// Creates a `tcp.ping` with a random id.
pub fn create_ping() -> Vec<u8> {
    create_ping_with_id(rand::random())
}

pub fn create_ping_with_id(random_id: u64) -> Vec<u8> {
    let mut writer = TlWriter::with_capacity(12);
    writer.write_u32(TCP_PING).write_u64(random_id);
    writer.finish()
}

/// A message received from a lite server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Answer { query_id: QueryId, answer: Vec<u8> },
    Pong { random_id: u64 },
}

/// Decodes a packet payload from a lite server.
///
/// # Errors
///
/// [`AdnlError::UnexpectedMessageType`] for anything other than an answer
/// or a pong; [`AdnlError::TlError`] for a truncated body.
pub fn parse_inbound(payload: &[u8]) -> Result<InboundMessage> {
    let mut reader = TlReader::new(payload);
    match reader.read_u32()? {
        ADNL_MESSAGE_ANSWER => {
            let query_id = reader.read_int256()?;
            let answer = reader.read_bytes()?;
            Ok(InboundMessage::Answer { query_id, answer })
        }
        TCP_PONG => Ok(InboundMessage::Pong {
            random_id: reader.read_u64()?,
        }),
        other => Err(AdnlError::UnexpectedMessageType(other)),
    }
}

/// Unwraps an answer packet. Pongs yield `Ok(None)`.
pub fn unwrap_answer(payload: &[u8]) -> Result<Option<(QueryId, Vec<u8>)>> {
    match parse_inbound(payload)? {
        InboundMessage::Answer { query_id, answer } => Ok(Some((query_id, answer))),
        InboundMessage::Pong { .. } => Ok(None),
    }
}

/// Turns a `liteServer.error` answer into [`AdnlError::LiteServer`].
///
/// Any other answer is returned unchanged, constructor included, so the
/// caller can decode the typed response.
pub fn parse_lite_error(answer: Vec<u8>) -> Result<Vec<u8>> {
    let mut reader = TlReader::new(&answer);
    if reader.peek_u32().ok() != Some(LITESERVER_ERROR) {
        return Ok(answer);
    }
    reader.skip(4)?;
    let code = reader.read_i32()?;
    let message = reader.read_string()?;
    Err(AdnlError::LiteServer { code, message })
}

// Server side of the envelope, used by test servers and tooling.

/// Unwraps `adnl.message.query(liteServer.query(data))` into its id and data.
pub fn unwrap_lite_query(payload: &[u8]) -> Result<(QueryId, Vec<u8>)> {
    let mut reader = TlReader::new(payload);
    let constructor = reader.read_u32()?;
    if constructor != ADNL_MESSAGE_QUERY {
        return Err(AdnlError::UnexpectedMessageType(constructor));
    }
    let query_id = reader.read_int256()?;
    let inner = reader.read_bytes()?;

    let mut inner_reader = TlReader::new(&inner);
    let constructor = inner_reader.read_u32()?;
    if constructor != LITESERVER_QUERY {
        return Err(AdnlError::UnexpectedMessageType(constructor));
    }
    Ok((query_id, inner_reader.read_bytes()?))
}

pub fn wrap_answer(query_id: &QueryId, answer: &[u8]) -> Vec<u8> {
    let mut writer = TlWriter::with_capacity(answer.len() + 40);
    writer
        .write_u32(ADNL_MESSAGE_ANSWER)
        .write_int256(query_id)
        .write_bytes(answer);
    writer.finish()
}

pub fn encode_lite_error(code: i32, message: &str) -> Vec<u8> {
    let mut writer = TlWriter::new();
    writer
        .write_u32(LITESERVER_ERROR)
        .write_i32(code)
        .write_string(message);
    writer.finish()
}

pub fn create_pong(random_id: u64) -> Vec<u8> {
    let mut writer = TlWriter::with_capacity(12);
    writer.write_u32(TCP_PONG).write_u64(random_id);
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tl::LITESERVER_GET_MASTERCHAIN_INFO;

    #[test]
    fn test_wrap_layout() {
        let query_id = [0x11u8; 32];
        let wrapped = wrap_lite_query(&LITESERVER_GET_MASTERCHAIN_INFO.to_le_bytes(), &query_id);

        assert_eq!(&wrapped[0..4], &ADNL_MESSAGE_QUERY.to_le_bytes());
        assert_eq!(&wrapped[4..36], &query_id);
        // bytes(12): liteServer.query ‖ bytes(4) ‖ pad
        assert_eq!(wrapped[36], 12);
        assert_eq!(&wrapped[37..41], &LITESERVER_QUERY.to_le_bytes());
        assert_eq!(wrapped[41], 4);
        assert_eq!(&wrapped[42..46], &[0x2e, 0xe6, 0xb5, 0x89]);
        assert_eq!(wrapped.len() % 4, 0);
    }

    #[test]
    fn test_server_unwraps_client_query() {
        let (query_id, packet) = encode_lite_query(b"request");
        let (id, data) = unwrap_lite_query(&packet).unwrap();
        assert_eq!(id, query_id);
        assert_eq!(data, b"request");
    }

    #[test]
    fn test_answer_and_pong() {
        let query_id = generate_query_id();
        let answer = wrap_answer(&query_id, b"data");
        assert_eq!(
            unwrap_answer(&answer).unwrap(),
            Some((query_id, b"data".to_vec()))
        );

        assert_eq!(unwrap_answer(&create_pong(7)).unwrap(), None);
        assert_eq!(
            parse_inbound(&create_pong(7)).unwrap(),
            InboundMessage::Pong { random_id: 7 }
        );
    }

    #[test]
    fn test_unknown_constructor() {
        let ping = create_ping_with_id(1);
        assert!(matches!(
            parse_inbound(&ping),
            Err(AdnlError::UnexpectedMessageType(TCP_PING))
        ));
    }

    #[test]
    fn test_lite_error() {
        let err = parse_lite_error(encode_lite_error(651, "block not applied")).unwrap_err();
        match err {
            AdnlError::LiteServer { code, message } => {
                assert_eq!(code, 651);
                assert_eq!(message, "block not applied");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let ok = vec![1, 2, 3, 4, 5];
        assert_eq!(parse_lite_error(ok.clone()).unwrap(), ok);
        assert_eq!(parse_lite_error(Vec::new()).unwrap(), Vec::<u8>::new());
    }
}
