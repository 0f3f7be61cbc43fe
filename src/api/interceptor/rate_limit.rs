//! Per-client admission control.
//!
//! Each client IP owns a token bucket that holds at most `burst` tokens and
//! refills at `requests_per_second`. Buckets are created on first sight, refilled
//! lazily when checked, and swept once they have been idle for [`IDLE_TIMEOUT`].

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Interceptor, Next};
use crate::api::error::ApiError;

pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 5.0;
pub const DEFAULT_BURST: u32 = 10;
/// How often idle buckets are looked for.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Buckets not seen for longer than this are dropped.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    pub burst: u32,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            burst: DEFAULT_BURST,
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        }
    }

    fn refill(&mut self, now: Instant, rate: f64, burst: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed.mul_add(rate, self.tokens).min(burst);
        self.last_refill = now;
    }
}

/// Shared bucket map. Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: DashMap<IpAddr, Bucket>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or refuse one request from `client`.
    pub fn allow(&self, client: IpAddr) -> bool {
        self.allow_at(client, Instant::now())
    }

    /// [`allow`](Self::allow) with an explicit clock reading.
    pub fn allow_at(&self, client: IpAddr, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let burst = f64::from(self.config.burst);
        // the entry guard holds this key's shard lock until the decision is made
        let mut bucket = self
            .clients
            .entry(client)
            .or_insert_with(|| Bucket::full(burst, now));
        bucket.refill(now, self.config.requests_per_second, burst);
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for longer than [`IDLE_TIMEOUT`]. Returns how many went.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= IDLE_TIMEOUT);
        before.saturating_sub(self.clients.len())
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Sweep every [`SWEEP_INTERVAL`] until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("rate limiter sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = limiter.len(), "swept idle rate limit buckets");
                        }
                    }
                }
            }
        })
    }
}

/// Client address used as the bucket key.
///
/// The connected peer wins; forwarding headers are only consulted when the
/// request carries no peer address.
#[must_use]
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }
    forwarded_ip(request.headers())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = value.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return Some(ip);
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Refuses requests from clients that ran out of tokens with a `429`.
#[derive(Clone, Debug)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Interceptor for RateLimit {
    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        if !self.limiter.config().enabled {
            return next.run(request).await;
        }

        let ip = client_ip(&request).unwrap_or_else(|| {
            warn!("no client address on request, using the shared unspecified bucket");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });

        if !self.limiter.allow(ip) {
            debug!(%ip, "rate limit exceeded");
            return ApiError::RateLimitExceeded.into_response();
        }

        next.run(request).await
    }
}
