//! ADNL TCP client session.
//!
//! One [`AdnlClientTcp`] drives one connection through
//! `Closed → Connecting → Open → Closing → Closed`. A background task reads
//! the socket, decrypts the stream and cuts it into packets. The first
//! packet must be the server's empty acknowledgement. Later payloads go to
//! the packet handler when one is installed, otherwise to
//! [`ClientEvent::Data`] subscribers.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use ton_crypto::aes_ctr::AesCtrCipher;

use crate::error::{AdnlError, Result};
use crate::handshake::{build_handshake, AdnlAesParams, AdnlKeys, SessionCiphers};
use crate::packet::AdnlPacket;
use crate::protocol::create_ping;

/// Size of each socket read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Capacity of the event broadcast.
const EVENT_CAPACITY: usize = 256;

/// Connection state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Lifecycle and data notifications of a client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// TCP connected, handshake sent.
    Connected,
    /// Handshake acknowledged, the session is open.
    Ready,
    /// A packet payload, when no [`PacketHandler`] is installed.
    Data(Vec<u8>),
    Closed,
    Error(AdnlError),
}

/// Receives every payload of an open session, in arrival order, on the
/// read task. Returning an error closes the connection.
pub type PacketHandler = Arc<dyn Fn(Vec<u8>) -> Result<()> + Send + Sync>;

struct Writer {
    stream: OwnedWriteHalf,
    cipher: AesCtrCipher,
}

struct Shared {
    state: watch::Sender<ClientState>,
    events: broadcast::Sender<ClientEvent>,
    writer: Mutex<Option<Writer>>,
    handler: Option<PacketHandler>,
    last_error: StdMutex<Option<AdnlError>>,
}

impl Shared {
    fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn record_error(&self, err: AdnlError) {
        warn!(error = %err, "ADNL session error");
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
        self.emit(ClientEvent::Error(err));
    }

    fn take_error(&self) -> Option<AdnlError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Drops the write half and moves to `Closed`. Emits `Closed` once per
    /// session.
    async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.stream.shutdown().await;
        }
        let changed = self.state.send_if_modified(|state| {
            if *state == ClientState::Closed {
                false
            } else {
                *state = ClientState::Closed;
                true
            }
        });
        if changed {
            debug!("ADNL session closed");
            self.emit(ClientEvent::Closed);
        }
    }

    fn drain_packets(&self, buffer: &mut Vec<u8>) -> Result<()> {
        while let Some(packet) = AdnlPacket::parse(buffer)? {
            buffer.drain(..packet.len());

            match self.state() {
                ClientState::Connecting => {
                    if !packet.is_empty() {
                        return Err(AdnlError::HandshakeFailed(
                            "non-empty handshake acknowledgement".into(),
                        ));
                    }
                    self.state.send_replace(ClientState::Open);
                    debug!("ADNL handshake acknowledged");
                    self.emit(ClientEvent::Ready);
                }
                ClientState::Open => {
                    let payload = packet.into_payload();
                    trace!(size = payload.len(), "received packet");
                    match &self.handler {
                        Some(handler) => handler(payload)?,
                        None => self.emit(ClientEvent::Data(payload)),
                    }
                }
                ClientState::Closing | ClientState::Closed => {}
            }
        }
        Ok(())
    }
}

async fn read_loop(shared: Arc<Shared>, mut stream: OwnedReadHalf, mut cipher: AesCtrCipher) {
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let mut buffer = Vec::new();

    let result = loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(AdnlError::from(e)),
        };
        cipher.apply(&mut chunk[..n]);
        buffer.extend_from_slice(&chunk[..n]);
        trace!(bytes = n, buffered = buffer.len(), "socket read");

        if let Err(e) = shared.drain_packets(&mut buffer) {
            break Err(e);
        }
    };

    match result {
        Ok(()) => debug!("ADNL peer closed the connection"),
        Err(e) => shared.record_error(e),
    }
    shared.close().await;
}

/// ADNL TCP client for one liteserver.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use ton_adnl::AdnlClientTcp;
///
/// async fn example() -> ton_adnl::Result<()> {
///     let addr = "1.2.3.4:12345".parse().unwrap();
///     let server_pubkey = [0u8; 32];
///
///     let client = AdnlClientTcp::new(addr, server_pubkey);
///     let mut events = client.subscribe();
///     client.connect(Duration::from_secs(10)).await?;
///     client.ping().await?;
///     let _event = events.recv().await;
///     client.end().await;
///     Ok(())
/// }
/// ```
pub struct AdnlClientTcp {
    addr: SocketAddr,
    peer_public_key: [u8; 32],
    shared: Arc<Shared>,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl AdnlClientTcp {
    pub fn new(addr: SocketAddr, peer_public_key: [u8; 32]) -> Self {
        Self::build(addr, peer_public_key, None)
    }

    /// Creates a client whose payloads are passed to `handler`.
    pub fn with_handler(addr: SocketAddr, peer_public_key: [u8; 32], handler: PacketHandler) -> Self {
        Self::build(addr, peer_public_key, Some(handler))
    }

    fn build(addr: SocketAddr, peer_public_key: [u8; 32], handler: Option<PacketHandler>) -> Self {
        let (state, _) = watch::channel(ClientState::Closed);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            addr,
            peer_public_key,
            shared: Arc::new(Shared {
                state,
                events,
                writer: Mutex::new(None),
                handler,
                last_error: StdMutex::new(None),
            }),
            reader: StdMutex::new(None),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// Watches state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Connects, performs the handshake and waits for the acknowledgement.
    ///
    /// Every attempt uses fresh ephemeral keys and session params. Only a
    /// `Closed` client can connect.
    ///
    /// # Errors
    ///
    /// [`AdnlError::HandshakeFailed`] when the client is busy, the server
    /// rejects the handshake or `connect_timeout` elapses; I/O errors as
    /// [`AdnlError::Io`].
    pub async fn connect(&self, connect_timeout: Duration) -> Result<()> {
        let started = self.shared.state.send_if_modified(|state| {
            if *state == ClientState::Closed {
                *state = ClientState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(AdnlError::HandshakeFailed(format!(
                "client is {:?}",
                self.state()
            )));
        }
        self.shared.take_error();
        debug!(addr = %self.addr, "connecting to liteserver");

        let err = match timeout(connect_timeout, self.establish()).await {
            Ok(Ok(())) => {
                debug!(addr = %self.addr, "ADNL session open");
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => AdnlError::HandshakeFailed("connect timed out".into()),
        };

        if self.state() != ClientState::Closed {
            self.shared.record_error(err.clone());
        }
        self.abort_reader();
        self.shared.close().await;
        Err(err)
    }

    async fn establish(&self) -> Result<()> {
        let keys = AdnlKeys::new(self.peer_public_key)?;
        let params = AdnlAesParams::random();
        let ciphers = SessionCiphers::client(&params);

        let stream = TcpStream::connect(self.addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let mut state = self.watch_state();
        let reader = tokio::spawn(read_loop(self.shared.clone(), read_half, ciphers.recv));
        if let Some(old) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(reader)
        {
            old.abort();
        }
        self.shared.emit(ClientEvent::Connected);

        {
            let mut slot = self.shared.writer.lock().await;
            let mut writer = Writer {
                stream: write_half,
                cipher: ciphers.send,
            };
            writer.stream.write_all(&build_handshake(&keys, &params)).await?;
            trace!("handshake packet sent");
            *slot = Some(writer);
        }

        loop {
            match *state.borrow_and_update() {
                ClientState::Open => return Ok(()),
                ClientState::Closing | ClientState::Closed => {
                    return Err(self.shared.take_error().unwrap_or(AdnlError::ConnectionClosed));
                }
                ClientState::Connecting => {}
            }
            state
                .changed()
                .await
                .map_err(|_| AdnlError::ConnectionClosed)?;
        }
    }

    /// Sends one payload as an encrypted packet.
    ///
    /// A write failure closes the session.
    pub async fn write(&self, payload: &[u8]) -> Result<()> {
        let mut slot = self.shared.writer.lock().await;
        if self.state() != ClientState::Open {
            return Err(AdnlError::ConnectionClosed);
        }
        // Out of its slot while bytes are in flight: a cancelled write
        // leaves the session without a writer instead of desynchronised.
        let Some(mut writer) = slot.take() else {
            drop(slot);
            debug!(addr = %self.addr, "writer lost to a cancelled write, closing");
            self.abort_reader();
            self.shared.close().await;
            return Err(AdnlError::ConnectionClosed);
        };

        let mut bytes = AdnlPacket::build(payload.to_vec()).to_bytes();
        writer.cipher.apply(&mut bytes);
        trace!(size = payload.len(), "sending packet");

        match writer.stream.write_all(&bytes).await {
            Ok(()) => {
                *slot = Some(writer);
                Ok(())
            }
            Err(e) => {
                drop(slot);
                let err = AdnlError::from(e);
                self.shared.record_error(err.clone());
                self.abort_reader();
                self.shared.close().await;
                Err(err)
            }
        }
    }

    /// Sends a `tcp.ping`. The pong arrives as ordinary data.
    pub async fn ping(&self) -> Result<()> {
        self.write(&create_ping()).await
    }

    /// Closes the session. Does nothing unless connecting or open.
    pub async fn end(&self) {
        let closing = self.shared.state.send_if_modified(|state| {
            if matches!(*state, ClientState::Connecting | ClientState::Open) {
                *state = ClientState::Closing;
                true
            } else {
                false
            }
        });
        if !closing {
            return;
        }
        debug!(addr = %self.addr, "ending ADNL session");
        self.abort_reader();
        self.shared.close().await;
    }

    fn abort_reader(&self) {
        if let Some(reader) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            reader.abort();
        }
    }
}

impl Drop for AdnlClientTcp {
    fn drop(&mut self) {
        self.abort_reader();
    }
}

impl std::fmt::Debug for AdnlClientTcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdnlClientTcp")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .finish()
    }
}
