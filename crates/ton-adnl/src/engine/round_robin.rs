//! Load balancing and failover across several engines.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace};

use crate::config::{EngineConfig, GlobalConfig};
use crate::error::{AdnlError, Result};

use super::single::LiteSingleEngine;
use super::{EngineEvent, LiteEngine, QueryEncoder, ENGINE_EVENT_CAPACITY};

/// Spreads queries over its engines in turn.
///
/// Each query starts at the next engine in rotation. Engines that are not
/// ready are skipped, and a failed query moves on to the following engine
/// until every engine has been tried once. Events of all engines are
/// forwarded.
pub struct RoundRobinEngine {
    engines: Vec<Arc<dyn LiteEngine>>,
    next: AtomicUsize,
    events: broadcast::Sender<EngineEvent>,
}

impl RoundRobinEngine {
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`AdnlError::NoEnginesAvailable`] for an empty list.
    pub fn new(engines: Vec<Arc<dyn LiteEngine>>) -> Result<Self> {
        if engines.is_empty() {
            return Err(AdnlError::NoEnginesAvailable);
        }
        let (events, _) = broadcast::channel(ENGINE_EVENT_CAPACITY);
        for engine in &engines {
            tokio::spawn(forward_events(engine.subscribe(), events.clone()));
        }
        Ok(Self {
            engines,
            next: AtomicUsize::new(0),
            events,
        })
    }

    /// One [`LiteSingleEngine`] per liteserver of a global config.
    pub fn from_global_config(global: &GlobalConfig, config: EngineConfig) -> Result<Self> {
        let engines = global
            .liteservers
            .iter()
            .map(|ls| {
                LiteSingleEngine::from_config(ls, config)
                    .map(|engine| Arc::new(engine) as Arc<dyn LiteEngine>)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(engines)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn engines(&self) -> &[Arc<dyn LiteEngine>] {
        &self.engines
    }
}

async fn forward_events(
    mut from: broadcast::Receiver<EngineEvent>,
    to: broadcast::Sender<EngineEvent>,
) {
    loop {
        match from.recv().await {
            Ok(event) => {
                let _ = to.send(event);
            }
            Err(RecvError::Lagged(skipped)) => trace!(skipped, "engine events lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl LiteEngine for RoundRobinEngine {
    async fn query(&self, encoder: QueryEncoder<'_>, timeout: Duration) -> Result<Vec<u8>> {
        let mut last_error = None;
        for _ in 0..self.engines.len() {
            let index = self.next.fetch_add(1, Ordering::Relaxed) % self.engines.len();
            let engine = &self.engines[index];
            if !engine.is_ready() || engine.is_closed() {
                continue;
            }
            match engine.query(encoder, timeout).await {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    debug!(engine = index, error = %e, "query failed, trying next engine");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(AdnlError::NoEnginesAvailable))
    }

    fn is_ready(&self) -> bool {
        self.engines.iter().any(|engine| engine.is_ready())
    }

    fn is_closed(&self) -> bool {
        self.engines.iter().all(|engine| engine.is_closed())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn close(&self) {
        for engine in &self.engines {
            engine.close().await;
        }
    }
}

impl std::fmt::Debug for RoundRobinEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundRobinEngine")
            .field("engines", &self.engines.len())
            .field("ready", &self.is_ready())
            .finish()
    }
}
