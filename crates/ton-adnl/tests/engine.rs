//! Engine tests against an in-process fake liteserver.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::timeout;

use ton_adnl::engine::{ConnectionHandler, ConnectionManager, QueryManager};
use ton_adnl::protocol::{
    create_pong, encode_lite_error, unwrap_answer, unwrap_lite_query, wrap_answer, QueryId,
};
use ton_adnl::schemas::TCP_PING;
use ton_adnl::{
    server_accept, AdnlClientTcp, AdnlError, AdnlPacket, ClientEvent, ClientState, EngineConfig,
    EngineEvent, LiteEngine, LiteSingleEngine, LoggingEngine, RateLimitConfig,
    RateLimitedEngine, RoundRobinEngine, SessionCiphers, HANDSHAKE_PACKET_SIZE,
};
use ton_crypto::aes_ctr::AesCtrCipher;
use ton_crypto::Ed25519Keypair;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config() -> EngineConfig {
    EngineConfig {
        reconnect_delay: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(3),
        query_timeout: Duration::from_secs(3),
    }
}

/// Server end of one accepted ADNL connection.
struct ServerConn {
    read: OwnedReadHalf,
    write: OwnedWriteHalf,
    recv: AesCtrCipher,
    send: AesCtrCipher,
    buffer: Vec<u8>,
}

impl ServerConn {
    /// Accepts a client, checks its handshake and acknowledges it.
    async fn accept(listener: &TcpListener, key: &Ed25519Keypair) -> Self {
        Self::accept_with_ack(listener, key, &[]).await
    }

    /// Like [`accept`](Self::accept), acknowledging with `ack` as payload.
    async fn accept_with_ack(listener: &TcpListener, key: &Ed25519Keypair, ack: &[u8]) -> Self {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut handshake = [0u8; HANDSHAKE_PACKET_SIZE];
        stream.read_exact(&mut handshake).await.unwrap();
        let params = server_accept(key, &handshake).unwrap();
        let ciphers = SessionCiphers::server(&params);

        let (read, write) = stream.into_split();
        let mut conn = Self {
            read,
            write,
            recv: ciphers.recv,
            send: ciphers.send,
            buffer: Vec::new(),
        };
        conn.send_packet(ack).await;
        conn
    }

    async fn send_packet(&mut self, payload: &[u8]) {
        let bytes = AdnlPacket::build(payload.to_vec()).to_bytes();
        self.send_raw(bytes).await;
    }

    /// Encrypts and sends already framed bytes.
    async fn send_raw(&mut self, mut bytes: Vec<u8>) {
        self.send.apply(&mut bytes);
        self.write.write_all(&bytes).await.unwrap();
    }

    /// Next packet payload, or `None` once the client hangs up.
    async fn recv_packet(&mut self) -> Option<Vec<u8>> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(packet) = AdnlPacket::parse(&self.buffer).unwrap() {
                self.buffer.drain(..packet.len());
                return Some(packet.into_payload());
            }
            let n = self.read.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return None;
            }
            self.recv.apply(&mut chunk[..n]);
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Next lite query, skipping pings.
    async fn recv_query(&mut self) -> (QueryId, Vec<u8>) {
        loop {
            let payload = self.recv_packet().await.unwrap();
            if payload[0..4] == TCP_PING.to_le_bytes() {
                continue;
            }
            return unwrap_lite_query(&payload).unwrap();
        }
    }

    async fn answer_echo(&mut self, query_id: &QueryId, data: &[u8]) {
        let mut answer = b"echo:".to_vec();
        answer.extend_from_slice(data);
        self.send_packet(&wrap_answer(query_id, &answer)).await;
    }

    /// Echoes every query until the client hangs up. Returns how many
    /// queries were answered.
    async fn serve_echo(mut self) -> usize {
        let mut answered = 0;
        while let Some(payload) = self.recv_packet().await {
            if payload[0..4] == TCP_PING.to_le_bytes() {
                continue;
            }
            let (id, data) = unwrap_lite_query(&payload).unwrap();
            self.answer_echo(&id, &data).await;
            answered += 1;
        }
        answered
    }
}

/// Completes queries from answers; keeps them registered across drops.
#[derive(Default)]
struct QueryTable {
    queries: QueryManager,
}

impl ConnectionHandler for QueryTable {
    fn on_data(&self, payload: Vec<u8>) -> ton_adnl::Result<()> {
        if let Some((id, answer)) = unwrap_answer(&payload)? {
            self.queries.complete(&id, Ok(answer));
        }
        Ok(())
    }

    fn on_closed(&self) {}

    fn pending_packets(&self) -> Vec<Vec<u8>> {
        self.queries.pending_packets()
    }
}

async fn bind() -> (TcpListener, SocketAddr, Arc<Ed25519Keypair>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr, Arc::new(Ed25519Keypair::generate()))
}

#[tokio::test]
async fn test_answers_matched_by_id() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener, &server_key).await;
        let first = conn.recv_query().await;
        let second = conn.recv_query().await;

        // Noise the client must ignore.
        conn.send_packet(&create_pong(42)).await;
        conn.send_packet(&wrap_answer(&[0xAB; 32], b"stray")).await;

        conn.answer_echo(&second.0, &second.1).await;
        conn.answer_echo(&first.0, &first.1).await;
        conn
    });

    let engine = LiteSingleEngine::new(addr, key.public_key, test_config());
    let (a, b) = tokio::join!(engine.lite_query(b"alpha"), engine.lite_query(b"beta"));
    assert_eq!(a.unwrap(), b"echo:alpha");
    assert_eq!(b.unwrap(), b"echo:beta");
    assert_eq!(engine.pending_queries(), 0);
    assert!(engine.is_ready());

    let _conn = server.await.unwrap();
    engine.close().await;
}

#[tokio::test]
async fn test_lite_error_is_per_query() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener, &server_key).await;
        let (id, _) = conn.recv_query().await;
        conn.send_packet(&wrap_answer(&id, &encode_lite_error(651, "too big masterchain block seqno")))
            .await;
        let (id, data) = conn.recv_query().await;
        conn.answer_echo(&id, &data).await;
        conn
    });

    let engine = LiteSingleEngine::new(addr, key.public_key, test_config());
    match engine.lite_query(b"bad").await {
        Err(AdnlError::LiteServer { code, message }) => {
            assert_eq!(code, 651);
            assert_eq!(message, "too big masterchain block seqno");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(engine.is_ready());
    assert_eq!(engine.lite_query(b"good").await.unwrap(), b"echo:good");

    let _conn = server.await.unwrap();
    engine.close().await;
}

#[tokio::test]
async fn test_timeout_then_late_answer_dropped() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener, &server_key).await;
        let (late_id, late_data) = conn.recv_query().await;
        let (id, data) = conn.recv_query().await;
        // Answer the timed-out query first; nobody waits for it any more.
        conn.answer_echo(&late_id, &late_data).await;
        conn.answer_echo(&id, &data).await;
        conn
    });

    let engine = LiteSingleEngine::new(addr, key.public_key, test_config());
    let encoder = || ton_adnl::encode_lite_query(b"slow");
    let err = engine
        .query(&encoder, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, AdnlError::QueryTimeout));
    assert_eq!(engine.pending_queries(), 0);

    assert_eq!(engine.lite_query(b"fast").await.unwrap(), b"echo:fast");
    assert!(engine.is_ready());

    let _conn = server.await.unwrap();
    engine.close().await;
}

#[tokio::test]
async fn test_reconnect_after_drop() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener, &server_key).await;
        let _ = conn.recv_query().await;
        drop(conn);

        let mut conn = ServerConn::accept(&listener, &server_key).await;
        let (id, data) = conn.recv_query().await;
        conn.answer_echo(&id, &data).await;
        conn
    });

    let engine = LiteSingleEngine::new(addr, key.public_key, test_config());
    let mut events = engine.subscribe();

    let err = engine.lite_query(b"lost").await.unwrap_err();
    assert!(matches!(err, AdnlError::ConnectionClosed));

    let answer = timeout(Duration::from_secs(5), engine.lite_query(b"again"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answer, b"echo:again");

    let mut ready = 0;
    let mut closed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::Ready => ready += 1,
            EngineEvent::Closed => closed += 1,
            _ => {}
        }
    }
    assert!(closed >= 1);
    assert!(ready >= 1);

    let _conn = server.await.unwrap();
    engine.close().await;
    assert!(engine.is_closed());
}

#[tokio::test]
async fn test_close_fails_waiting_query() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener, &server_key).await;
        let _ = conn.recv_query().await;
        // Never answers; waits for the client to hang up.
        assert!(conn.recv_packet().await.is_none());
    });

    let engine = Arc::new(LiteSingleEngine::new(addr, key.public_key, test_config()));
    let waiting = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.lite_query(b"pending").await })
    };
    while engine.pending_queries() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    engine.close().await;
    let result = waiting.await.unwrap();
    assert!(matches!(result, Err(AdnlError::EngineClosed)));
    assert!(matches!(
        engine.lite_query(b"after").await,
        Err(AdnlError::EngineClosed)
    ));
    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_decorators_over_live_engine() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener, &server_key).await;
        for _ in 0..3 {
            let (id, data) = conn.recv_query().await;
            conn.answer_echo(&id, &data).await;
        }
        conn
    });

    let down = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let live: Arc<dyn LiteEngine> = Arc::new(LiteSingleEngine::new(addr, key.public_key, test_config()));
    let dead: Arc<dyn LiteEngine> = Arc::new(LiteSingleEngine::new(down, [7u8; 32], test_config()));

    // Wait until the live engine is connected so the pool can pick it.
    timeout(Duration::from_secs(5), async {
        while !live.is_ready() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let pool = RoundRobinEngine::new(vec![dead, live]).unwrap();
    let engine = LoggingEngine::new(RateLimitedEngine::new(pool, RateLimitConfig::new(100)).unwrap());
    assert!(engine.is_ready());
    for word in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        let answer = engine.lite_query(word).await.unwrap();
        assert_eq!(&answer[5..], word);
    }

    let _conn = server.await.unwrap();
    engine.close().await;
    assert!(engine.is_closed());
}

#[tokio::test]
async fn test_client_ping_pong() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener, &server_key).await;
        let ping = conn.recv_packet().await.unwrap();
        assert_eq!(&ping[0..4], &TCP_PING.to_le_bytes());
        let random_id = u64::from_le_bytes(ping[4..12].try_into().unwrap());
        conn.send_packet(&create_pong(random_id)).await;
        conn
    });

    let client = AdnlClientTcp::new(addr, key.public_key);
    let mut events = client.subscribe();
    client.connect(Duration::from_secs(3)).await.unwrap();
    assert_eq!(client.state(), ClientState::Open);
    client.ping().await.unwrap();

    let pong = loop {
        match timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap() {
            ClientEvent::Data(payload) => break payload,
            ClientEvent::Connected | ClientEvent::Ready => {}
            other => panic!("unexpected event: {other:?}"),
        }
    };
    assert_eq!(pong.len(), 12);

    let _conn = server.await.unwrap();
    client.end().await;
    assert_eq!(client.state(), ClientState::Closed);
}

#[tokio::test]
async fn test_handshake_for_wrong_key_fails() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut handshake = [0u8; HANDSHAKE_PACKET_SIZE];
        stream.read_exact(&mut handshake).await.unwrap();
        let err = server_accept(&key, &handshake).unwrap_err();
        assert!(matches!(err, AdnlError::HandshakeFailed(_)));
    });

    let other_key = Ed25519Keypair::generate().public_key;
    let client = AdnlClientTcp::new(addr, other_key);
    assert!(client.connect(Duration::from_secs(3)).await.is_err());
    assert_eq!(client.state(), ClientState::Closed);
    server.await.unwrap();
}

#[tokio::test]
async fn test_non_empty_ack_rejected() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept_with_ack(&listener, &server_key, &[1, 2, 3]).await;
        assert!(conn.recv_packet().await.is_none());
    });

    let client = AdnlClientTcp::new(addr, key.public_key);
    let err = client.connect(Duration::from_secs(3)).await.unwrap_err();
    assert!(matches!(err, AdnlError::HandshakeFailed(_)), "{err:?}");
    assert_eq!(client.state(), ClientState::Closed);
    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_checksum_mismatch_closes_session() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener, &server_key).await;
        // Wait for the session to be open on the client side.
        let ping = conn.recv_packet().await.unwrap();
        assert_eq!(&ping[0..4], &TCP_PING.to_le_bytes());

        let mut bytes = AdnlPacket::build(b"tampered".to_vec()).to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        conn.send_raw(bytes).await;
        assert!(conn.recv_packet().await.is_none());
    });

    let client = AdnlClientTcp::new(addr, key.public_key);
    let mut events = client.subscribe();
    client.connect(Duration::from_secs(3)).await.unwrap();
    client.ping().await.unwrap();

    let mut saw_error = false;
    loop {
        match timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap() {
            ClientEvent::Connected | ClientEvent::Ready => {}
            ClientEvent::Error(err) => {
                assert!(matches!(err, AdnlError::ChecksumMismatch), "{err:?}");
                saw_error = true;
            }
            ClientEvent::Closed => break,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(saw_error);
    assert_eq!(client.state(), ClientState::Closed);
    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unsent_query_goes_out_after_connect() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        ServerConn::accept(&listener, &server_key).await.serve_echo().await
    });

    let table = Arc::new(QueryTable::default());
    let manager = ConnectionManager::new(addr, key.public_key, test_config(), table.clone());
    let (query_id, packet) = ton_adnl::encode_lite_query(b"queued");
    let rx = table.queries.register(query_id, packet.clone());

    // No session yet: the write fails and the query stays registered.
    assert!(matches!(
        manager.write(&packet).await,
        Err(AdnlError::ConnectionClosed)
    ));
    assert_eq!(table.pending_packets(), vec![packet]);

    manager.connect().await.unwrap();
    let answer = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap().unwrap();
    assert_eq!(answer, b"echo:queued");
    assert!(table.queries.is_empty());

    manager.close().await;
    // Sent exactly once.
    assert_eq!(timeout(Duration::from_secs(5), server).await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn test_reconnects_when_dropped_right_after_ack() {
    init_tracing();
    let (listener, addr, key) = bind().await;
    let server_key = key.clone();
    let server = tokio::spawn(async move {
        drop(ServerConn::accept(&listener, &server_key).await);
        ServerConn::accept(&listener, &server_key).await.serve_echo().await
    });

    let engine = LiteSingleEngine::new(addr, key.public_key, test_config());
    let answer = timeout(Duration::from_secs(10), async {
        loop {
            match engine.lite_query(b"after").await {
                Ok(answer) => break answer,
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(answer, b"echo:after");
    assert!(engine.is_ready());

    engine.close().await;
    assert!(timeout(Duration::from_secs(5), server).await.unwrap().unwrap() >= 1);
}
