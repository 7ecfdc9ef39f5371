//! Lite-server query engines.
//!
//! [`LiteEngine`] is the query seam: a caller hands over an encoder that
//! produces `(query_id, packet)` and gets the answer bytes back.
//! [`LiteSingleEngine`] serves one liteserver and reconnects on its own;
//! the decorators add rate limiting, load balancing and logging on top of
//! any engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::config::DEFAULT_QUERY_TIMEOUT;
use crate::error::{AdnlError, Result};
use crate::protocol::{encode_lite_query, QueryId};

pub mod connection;
pub mod logging;
pub mod query_manager;
pub mod rate_limited;
pub mod round_robin;
pub mod single;

pub use connection::{ConnectionHandler, ConnectionManager};
pub use logging::LoggingEngine;
pub use query_manager::QueryManager;
pub use rate_limited::RateLimitedEngine;
pub use round_robin::RoundRobinEngine;
pub use single::LiteSingleEngine;

/// Capacity of engine event broadcasts.
pub(crate) const ENGINE_EVENT_CAPACITY: usize = 64;

/// Produces the id and the full wrapped packet of one query.
///
/// May be called more than once, e.g. when a pool retries on another
/// engine.
pub type QueryEncoder<'a> = &'a (dyn Fn() -> (QueryId, Vec<u8>) + Send + Sync);

/// Lifecycle notifications of an engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Connected,
    Ready,
    Closed,
    Error(AdnlError),
}

#[async_trait]
pub trait LiteEngine: Send + Sync {
    /// Sends the encoded query and waits up to `timeout` for its answer.
    ///
    /// A `liteServer.error` answer is returned as [`AdnlError::LiteServer`].
    async fn query(&self, encoder: QueryEncoder<'_>, timeout: Duration) -> Result<Vec<u8>>;

    fn is_ready(&self) -> bool;

    fn is_closed(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;

    /// Stops the engine for good and fails its pending queries.
    async fn close(&self);

    /// Timeout used by [`lite_query`](Self::lite_query).
    fn query_timeout(&self) -> Duration {
        DEFAULT_QUERY_TIMEOUT
    }

    /// Wraps raw lite-server request bytes and queries with the default
    /// timeout.
    async fn lite_query(&self, data: &[u8]) -> Result<Vec<u8>> {
        let encoder = || encode_lite_query(data);
        self.query(&encoder, self.query_timeout()).await
    }
}

#[async_trait]
impl<E: LiteEngine + ?Sized> LiteEngine for Arc<E> {
    async fn query(&self, encoder: QueryEncoder<'_>, timeout: Duration) -> Result<Vec<u8>> {
        (**self).query(encoder, timeout).await
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        (**self).subscribe()
    }

    async fn close(&self) {
        (**self).close().await
    }

    fn query_timeout(&self) -> Duration {
        (**self).query_timeout()
    }
}
