//! Query tracing decorator.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::Result;

use super::{EngineEvent, LiteEngine, QueryEncoder};

/// Logs every query with its id, duration and answer size.
///
/// The encoder runs once here; the inner engine reuses that id and packet.
#[derive(Debug)]
pub struct LoggingEngine<E> {
    inner: E,
}

impl<E: LiteEngine> LoggingEngine<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

#[async_trait]
impl<E: LiteEngine> LiteEngine for LoggingEngine<E> {
    async fn query(&self, encoder: QueryEncoder<'_>, timeout: Duration) -> Result<Vec<u8>> {
        let (query_id, packet) = encoder();
        let id = hex::encode(query_id);
        debug!(
            query_id = %id,
            timeout_ms = timeout.as_millis() as u64,
            size = packet.len(),
            "query started"
        );

        let started = Instant::now();
        let fixed = move || (query_id, packet.clone());
        let result = self.inner.query(&fixed, timeout).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(answer) => info!(query_id = %id, elapsed_ms, size = answer.len(), "query completed"),
            Err(e) => warn!(query_id = %id, elapsed_ms, error = %e, "query failed"),
        }
        result
    }

    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.subscribe()
    }

    async fn close(&self) {
        self.inner.close().await
    }

    fn query_timeout(&self) -> Duration {
        self.inner.query_timeout()
    }
}
