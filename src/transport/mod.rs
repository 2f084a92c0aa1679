//! Reactive transport layer (component G): a shared non-blocking HTTP client
//! with a bounded per-host connection pool, trace-id propagation, and one
//! thin client per outbound collaborator named in spec.md §6 (market data,
//! agent dispatch, strategist, notification sink). The SSE publisher lives in
//! `store::snapshots` (the producer side); `api::sse` is the subscriber side.

pub mod agents;
pub mod cache;
pub mod market_data;
pub mod notifier;
pub mod strategist;

use std::time::Duration;

use crate::config::Config;

/// Header carrying the trace id across every outbound HTTP call, so the
/// receiving service (and its own logs) can correlate back to one trigger.
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Builds the one `reqwest::Client` shared by every outbound collaborator.
/// The pool bound (§5 "HTTP client connection pool") is the primary
/// back-pressure mechanism: invocations that would exceed it wait for a free
/// connection rather than opening unbounded new ones.
pub fn build_http_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host)
        .pool_idle_timeout(config.http_pool_idle_timeout)
        .build()
}

pub use agents::{AgentDispatchContext, AgentDispatcher, HttpAgentDispatcher};
pub use cache::MarketDataCache;
pub use market_data::{HttpMarketDataProvider, MarketDataProvider, MarketQuote};
pub use notifier::{HttpNotifier, Notifier};
pub use strategist::{HttpStrategistClient, ModelChoice, Strategist, StrategistPrompt};

/// Shared retry shape for the one collaborator that gets retries (market
/// data, §5 "4s with retry-with-backoff up to 3 attempts on 5xx"). No jitter:
/// the teacher's `binance_session` backoff adds jitter for thundering-herd
/// avoidance across many reconnecting sockets, which doesn't apply here (one
/// scheduler loop per symbol, not a herd of reconnecting clients).
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(200 * 2u64.pow(attempt.min(4)))
}
