//! Query rate limiting.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::broadcast;
use tracing::trace;

use crate::config::RateLimitConfig;
use crate::error::{AdnlError, Result};

use super::{EngineEvent, LiteEngine, QueryEncoder};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Holds queries back so that at most `requests_per_second` reach the
/// inner engine per second. Waiting callers are released in turn.
pub struct RateLimitedEngine<E> {
    inner: E,
    limiter: DirectRateLimiter,
    config: RateLimitConfig,
}

impl<E: LiteEngine> RateLimitedEngine<E> {
    /// # Errors
    ///
    /// [`AdnlError::InvalidConfig`] for a zero rate.
    pub fn new(inner: E, config: RateLimitConfig) -> Result<Self> {
        let rate = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            AdnlError::InvalidConfig("requests_per_second must be positive".into())
        })?;
        Ok(Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            config,
        })
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

#[async_trait]
impl<E: LiteEngine> LiteEngine for RateLimitedEngine<E> {
    async fn query(&self, encoder: QueryEncoder<'_>, timeout: Duration) -> Result<Vec<u8>> {
        if self.limiter.check().is_err() {
            trace!(rps = self.config.requests_per_second, "query held by rate limit");
            self.limiter.until_ready().await;
        }
        self.inner.query(encoder, timeout).await
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

impl<E> std::fmt::Debug for RateLimitedEngine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedEngine")
            .field("requests_per_second", &self.config.requests_per_second)
            .finish_non_exhaustive()
    }
}
