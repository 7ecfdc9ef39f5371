//! Engine over one liteserver connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, trace, warn};

use crate::config::{EngineConfig, LiteServerConfig};
use crate::error::{AdnlError, Result};
use crate::protocol::{parse_lite_error, unwrap_answer};

use super::connection::{ConnectionHandler, ConnectionManager};
use super::query_manager::{PendingGuard, QueryManager};
use super::{EngineEvent, LiteEngine, QueryEncoder};

/// Routes answers to their pending queries.
#[derive(Debug, Default)]
struct EngineCore {
    queries: QueryManager,
}

impl ConnectionHandler for EngineCore {
    fn on_data(&self, payload: Vec<u8>) -> Result<()> {
        match unwrap_answer(&payload)? {
            Some((query_id, answer)) => {
                let result = parse_lite_error(answer);
                if !self.queries.complete(&query_id, result) {
                    warn!(
                        query_id = %hex::encode(query_id),
                        pending = self.queries.len(),
                        "answer for unknown query"
                    );
                }
            }
            None => trace!("pong received"),
        }
        Ok(())
    }

    fn on_closed(&self) {
        let failed = self.queries.fail_all(AdnlError::ConnectionClosed);
        if failed > 0 {
            debug!(failed, "pending queries failed on close");
        }
    }

    fn pending_packets(&self) -> Vec<Vec<u8>> {
        self.queries.pending_packets()
    }
}

/// A [`LiteEngine`] bound to a single liteserver.
///
/// Connects in the background as soon as it is created and reconnects
/// after `reconnect_delay` whenever the connection drops. Queries issued
/// while disconnected wait for the connection, up to `connect_timeout`.
///
/// ```rust,no_run
/// use ton_adnl::{EngineConfig, LiteEngine, LiteSingleEngine};
///
/// async fn example() -> ton_adnl::Result<()> {
///     let engine = LiteSingleEngine::new("1.2.3.4:12345".parse().unwrap(), [0u8; 32], EngineConfig::default());
///     // liteServer.getTime
///     let answer = engine.lite_query(&0x16ad5a34u32.to_le_bytes()).await?;
///     println!("{} bytes", answer.len());
///     engine.close().await;
///     Ok(())
/// }
/// ```
pub struct LiteSingleEngine {
    connection: Arc<ConnectionManager>,
    core: Arc<EngineCore>,
}

impl LiteSingleEngine {
    /// Creates the engine and starts connecting. Must be called inside a
    /// Tokio runtime.
    pub fn new(addr: SocketAddr, peer_public_key: [u8; 32], config: EngineConfig) -> Self {
        let core = Arc::new(EngineCore::default());
        let connection = ConnectionManager::new(addr, peer_public_key, config, core.clone());
        debug!(
            %addr,
            reconnect_delay_ms = config.reconnect_delay.as_millis() as u64,
            "lite engine created"
        );

        let initial = Arc::downgrade(&connection);
        tokio::spawn(async move {
            if let Some(connection) = initial.upgrade()
                && let Err(e) = connection.connect().await
            {
                warn!(%addr, error = %e, "initial connect failed");
            }
        });

        Self { connection, core }
    }

    /// Creates an engine for one entry of a global config.
    pub fn from_config(liteserver: &LiteServerConfig, config: EngineConfig) -> Result<Self> {
        Ok(Self::new(
            liteserver.socket_addr(),
            liteserver.public_key()?,
            config,
        ))
    }

    pub fn addr(&self) -> SocketAddr {
        self.connection.addr()
    }

    /// Number of queries awaiting an answer.
    pub fn pending_queries(&self) -> usize {
        self.core.queries.len()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }
}

#[async_trait]
impl LiteEngine for LiteSingleEngine {
    async fn query(&self, encoder: QueryEncoder<'_>, timeout: Duration) -> Result<Vec<u8>> {
        if self.connection.is_closed() {
            return Err(AdnlError::EngineClosed);
        }
        self.connection.ensure_connected().await?;

        let (query_id, packet) = encoder();
        let queries = &self.core.queries;
        let mut rx = queries.register(query_id, packet.clone());
        let mut guard = PendingGuard::new(queries, query_id);

        if let Err(e) = self.connection.write(&packet).await {
            // Still registered: the packet goes out again once reconnected.
            debug!(query_id = %hex::encode(query_id), error = %e, "query write failed");
        }

        let outcome = tokio::time::timeout(timeout, &mut rx).await;
        guard.disarm();
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdnlError::ConnectionClosed),
            Err(_) => {
                queries.remove(&query_id);
                // The answer may have raced the deadline.
                match rx.try_recv() {
                    Ok(result) => result,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => {
                        debug!(query_id = %hex::encode(query_id), "query timed out");
                        Err(AdnlError::QueryTimeout)
                    }
                }
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.connection.subscribe()
    }

    async fn close(&self) {
        self.core.queries.fail_all(AdnlError::EngineClosed);
        self.connection.close().await;
    }

    fn query_timeout(&self) -> Duration {
        self.connection.config().query_timeout
    }
}

impl Drop for LiteSingleEngine {
    fn drop(&mut self) {
        self.connection.abandon();
        self.core.queries.fail_all(AdnlError::EngineClosed);
    }
}

impl std::fmt::Debug for LiteSingleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteSingleEngine")
            .field("addr", &self.addr())
            .field("ready", &self.is_ready())
            .field("pending", &self.pending_queries())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{create_pong, encode_lite_error, wrap_answer};

    #[tokio::test]
    async fn test_core_routes_answers() {
        let core = EngineCore::default();
        let rx1 = core.queries.register([1u8; 32], b"q1".to_vec());
        let rx2 = core.queries.register([2u8; 32], b"q2".to_vec());

        core.on_data(create_pong(5)).unwrap();
        assert_eq!(core.queries.len(), 2);

        core.on_data(wrap_answer(&[9u8; 32], b"stray")).unwrap();
        assert_eq!(core.queries.len(), 2);

        core.on_data(wrap_answer(&[2u8; 32], &encode_lite_error(-400, "bad request")))
            .unwrap();
        core.on_data(wrap_answer(&[1u8; 32], b"answer")).unwrap();

        assert_eq!(rx1.await.unwrap().unwrap(), b"answer");
        assert!(matches!(
            rx2.await.unwrap(),
            Err(AdnlError::LiteServer { code: -400, .. })
        ));
    }

    #[test]
    fn test_core_rejects_unexpected_message() {
        let core = EngineCore::default();
        let err = core.on_data(vec![1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, AdnlError::UnexpectedMessageType(0x04030201)));
    }

    #[tokio::test]
    async fn test_core_fails_pending_on_close() {
        let core = EngineCore::default();
        let rx = core.queries.register([1u8; 32], Vec::new());
        core.on_closed();
        assert!(matches!(rx.await.unwrap(), Err(AdnlError::ConnectionClosed)));
        assert!(core.pending_packets().is_empty());
    }

    #[tokio::test]
    async fn test_closed_engine_rejects_queries() {
        let engine = LiteSingleEngine::new("127.0.0.1:1".parse().unwrap(), [3u8; 32], EngineConfig::default());
        engine.close().await;
        assert!(engine.is_closed());
        assert!(!engine.is_ready());
        assert!(matches!(
            engine.lite_query(b"data").await,
            Err(AdnlError::EngineClosed)
        ));
    }
}
