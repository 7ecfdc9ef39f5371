//! Self-healing connection to one liteserver.
//!
//! [`ConnectionManager`] owns at most one [`AdnlClientTcp`] at a time.
//! Connect attempts are serialized. When the current client closes, the
//! manager reports it to its [`ConnectionHandler`] and schedules a single
//! reconnect after `reconnect_delay`. After every successful connect the
//! handler's pending packets are written again.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::client::{AdnlClientTcp, ClientEvent, ClientState};
use crate::config::EngineConfig;
use crate::error::{AdnlError, Result};

use super::{EngineEvent, ENGINE_EVENT_CAPACITY};

/// Receives the traffic and lifecycle of a managed connection.
pub trait ConnectionHandler: Send + Sync {
    /// Called on the read task for every payload, in arrival order.
    /// Returning an error closes the connection.
    fn on_data(&self, payload: Vec<u8>) -> Result<()>;

    /// Called once each time a connection is lost or an attempt fails.
    fn on_closed(&self);

    /// Packets to write again after a (re)connect.
    fn pending_packets(&self) -> Vec<Vec<u8>>;
}

pub struct ConnectionManager {
    addr: SocketAddr,
    peer_public_key: [u8; 32],
    config: EngineConfig,
    handler: Arc<dyn ConnectionHandler>,
    client: StdMutex<Option<Arc<AdnlClientTcp>>>,
    connect_lock: Mutex<()>,
    ready: watch::Sender<bool>,
    closed: AtomicBool,
    reconnect_scheduled: AtomicBool,
    events: broadcast::Sender<EngineEvent>,
}

impl ConnectionManager {
    /// Creates an idle manager. Nothing connects until
    /// [`connect`](Self::connect) or [`ensure_connected`](Self::ensure_connected).
    pub fn new(
        addr: SocketAddr,
        peer_public_key: [u8; 32],
        config: EngineConfig,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Arc<Self> {
        let (ready, _) = watch::channel(false);
        let (events, _) = broadcast::channel(ENGINE_EVENT_CAPACITY);
        Arc::new(Self {
            addr,
            peer_public_key,
            config,
            handler,
            client: StdMutex::new(None),
            connect_lock: Mutex::new(()),
            ready,
            closed: AtomicBool::new(false),
            reconnect_scheduled: AtomicBool::new(false),
            events,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow() && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Watches readiness changes.
    pub fn watch_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn client_slot(&self) -> MutexGuard<'_, Option<Arc<AdnlClientTcp>>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while the current client holds an open session.
    fn has_open_client(&self) -> bool {
        self.client_slot()
            .as_ref()
            .is_some_and(|client| client.state() == ClientState::Open)
    }

    /// Opens a new session unless one is already ready.
    ///
    /// # Errors
    ///
    /// [`AdnlError::EngineClosed`] after [`close`](Self::close); otherwise
    /// the error of the failed attempt, which also schedules a retry.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.is_closed() {
            return Err(AdnlError::EngineClosed);
        }
        let _guard = self.connect_lock.lock().await;
        if self.is_closed() {
            return Err(AdnlError::EngineClosed);
        }
        if self.is_ready() && self.has_open_client() {
            return Ok(());
        }

        let stale = self.client_slot().take();
        if let Some(stale) = stale {
            stale.end().await;
        }

        let handler = self.handler.clone();
        let client = Arc::new(AdnlClientTcp::with_handler(
            self.addr,
            self.peer_public_key,
            Arc::new(move |payload: Vec<u8>| handler.on_data(payload)),
        ));
        tokio::spawn(watch_client(
            Arc::downgrade(self),
            Arc::downgrade(&client),
            client.subscribe(),
        ));

        client.connect(self.config.connect_timeout).await?;

        if self.is_closed() {
            client.end().await;
            return Err(AdnlError::EngineClosed);
        }

        // The session may already have dropped; its close was then reported
        // against an empty slot and a reconnect is scheduled.
        let pending = {
            let mut slot = self.client_slot();
            if client.state() != ClientState::Open {
                debug!(addr = %self.addr, "session closed before it was published");
                return Err(AdnlError::ConnectionClosed);
            }
            *slot = Some(client.clone());
            let pending = self.handler.pending_packets();
            self.ready.send_replace(true);
            pending
        };
        info!(addr = %self.addr, "liteserver connection ready");
        self.emit(EngineEvent::Connected);
        self.emit(EngineEvent::Ready);

        if !pending.is_empty() {
            debug!(addr = %self.addr, count = pending.len(), "resending pending queries");
        }
        for packet in pending {
            if let Err(e) = client.write(&packet).await {
                warn!(addr = %self.addr, error = %e, "resend failed");
                break;
            }
        }
        Ok(())
    }

    /// Waits until the connection is ready, connecting if needed, for at
    /// most `connect_timeout`.
    ///
    /// An attempt still running at the deadline keeps going in the
    /// background.
    pub async fn ensure_connected(self: &Arc<Self>) -> Result<()> {
        if self.is_closed() {
            return Err(AdnlError::EngineClosed);
        }
        if self.is_ready() {
            return Ok(());
        }

        let manager = self.clone();
        let attempt = tokio::spawn(async move { manager.connect().await });
        match timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdnlError::ConnectionClosed),
            Err(_) => Err(AdnlError::HandshakeFailed(
                "timed out waiting for connection".into(),
            )),
        }
    }

    /// Writes one payload on the ready session.
    pub async fn write(&self, payload: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(AdnlError::EngineClosed);
        }
        let client = self
            .client_slot()
            .clone()
            .filter(|_| self.is_ready())
            .ok_or(AdnlError::ConnectionClosed)?;
        client.write(payload).await
    }

    /// Shuts down for good. No reconnect follows.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(addr = %self.addr, "closing liteserver connection");
        self.ready.send_replace(false);
        let client = self.client_slot().take();
        match client {
            Some(client) => client.end().await,
            None => self.emit(EngineEvent::Closed),
        }
    }

    /// Marks the manager closed and drops its client without waiting.
    pub(crate) fn abandon(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.ready.send_replace(false);
        self.client_slot().take();
    }

    fn on_client_closed(self: &Arc<Self>, client: &Weak<AdnlClientTcp>) {
        {
            let mut slot = self.client_slot();
            let current = slot.as_ref().map(Arc::as_ptr);
            match current {
                Some(ptr) if ptr == client.as_ptr() => {
                    slot.take();
                }
                // A replacement is already in place.
                Some(_) => return,
                None => {}
            }
            self.ready.send_replace(false);
        }

        self.handler.on_closed();
        self.emit(EngineEvent::Closed);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if self.is_closed() || self.reconnect_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let delay = self.config.reconnect_delay;
        debug!(addr = %self.addr, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            manager.reconnect_scheduled.store(false, Ordering::SeqCst);
            if manager.is_closed() || manager.has_open_client() {
                return;
            }
            if let Err(e) = manager.connect().await {
                warn!(addr = %manager.addr, error = %e, "reconnect failed");
            }
        });
    }
}

async fn watch_client(
    manager: Weak<ConnectionManager>,
    client: Weak<AdnlClientTcp>,
    mut events: broadcast::Receiver<ClientEvent>,
) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::Closed) | Err(RecvError::Closed) => break,
            Ok(ClientEvent::Error(err)) => {
                if let Some(manager) = manager.upgrade() {
                    manager.emit(EngineEvent::Error(err));
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => trace!(skipped, "client events lagged"),
        }
    }
    if let Some(manager) = manager.upgrade() {
        manager.on_client_closed(&client);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("addr", &self.addr)
            .field("ready", &self.is_ready())
            .field("closed", &self.is_closed())
            .finish()
    }
}
