//! Market-data cache (§5 "Shared resource policy"): a process-wide key-value
//! mapping from `symbol` to `{quote, fetchedAt, regime}`, fine-grained
//! per-key concurrent reads and writes. Grounded on `jmacodehub-gridzbotz`'s
//! use of `dashmap` for "lock-free HashMap — CRITICAL for real-time
//! pricing" — the same shared per-key-mutable-state shape this cache needs.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::Config;
use crate::domain::MarketRegime;

use super::market_data::MarketQuote;

#[derive(Debug, Clone)]
struct CacheEntry {
    quote: MarketQuote,
    fetched_at: DateTime<Utc>,
    regime: MarketRegime,
}

/// TTL by regime (§5): `VOLATILE -> 2min, TRENDING -> 5min, RANGING -> 7min,
/// CALM -> 10min`. `UNKNOWN` has no named bucket in spec.md; this crate
/// resolves that gap by using the shortest (`VOLATILE`) TTL for it, so an
/// unclassified symbol never overstays a stale quote (recorded in DESIGN.md).
fn ttl_for_regime(regime: MarketRegime, config: &Config) -> std::time::Duration {
    match regime {
        MarketRegime::Volatile | MarketRegime::Unknown => config.cache_ttl_volatile,
        MarketRegime::Trending => config.cache_ttl_trending,
        MarketRegime::Ranging => config.cache_ttl_ranging,
        MarketRegime::Calm => config.cache_ttl_calm,
    }
}

#[derive(Clone, Default)]
pub struct MarketDataCache {
    entries: std::sync::Arc<DashMap<String, CacheEntry>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self { entries: std::sync::Arc::new(DashMap::new()) }
    }

    /// Returns the cached quote if it is still fresh under the TTL bucket for
    /// the regime it was last classified into. A symbol with no entry yet is
    /// always a miss.
    pub fn get_fresh(&self, symbol: &str, now: DateTime<Utc>, config: &Config) -> Option<MarketQuote> {
        let entry = self.entries.get(symbol)?;
        let ttl = ttl_for_regime(entry.regime, config);
        let age = now.signed_duration_since(entry.fetched_at).to_std().ok()?;
        if age <= ttl {
            Some(entry.quote.clone())
        } else {
            None
        }
    }

    /// Stores a freshly fetched quote. The regime bucket carries over from
    /// any existing entry for this symbol (set to `UNKNOWN` for a brand new
    /// symbol) until `update_regime` records the freshly classified regime.
    pub fn insert(&self, symbol: &str, quote: MarketQuote, fetched_at: DateTime<Utc>) {
        let regime = self.entries.get(symbol).map(|e| e.regime).unwrap_or(MarketRegime::Unknown);
        self.entries.insert(symbol.to_string(), CacheEntry { quote, fetched_at, regime });
    }

    /// Called right after `ClassifyRegime` (§4.2 step 2) so the next cycle's
    /// TTL lookup uses the regime just observed.
    pub fn update_regime(&self, symbol: &str, regime: MarketRegime) {
        if let Some(mut entry) = self.entries.get_mut(symbol) {
            entry.regime = regime;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(symbol: &str) -> MarketQuote {
        MarketQuote {
            symbol: symbol.to_string(),
            latest_close: 100.0,
            open: 99.0,
            high: 101.0,
            low: 98.0,
            volume: 1000.0,
            recent_closing_prices: vec![100.0, 99.5, 99.0],
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn miss_for_unknown_symbol() {
        let cache = MarketDataCache::new();
        let cfg = Config::minimal();
        assert!(cache.get_fresh("NIFTY50", Utc::now(), &cfg).is_none());
    }

    #[test]
    fn hit_within_ttl_then_miss_once_expired() {
        let cache = MarketDataCache::new();
        let cfg = Config::minimal();
        let t0 = Utc::now();
        cache.insert("NIFTY50", quote("NIFTY50"), t0);
        cache.update_regime("NIFTY50", MarketRegime::Calm);

        assert!(cache.get_fresh("NIFTY50", t0 + chrono::Duration::seconds(5), &cfg).is_some());

        let expired = t0 + chrono::Duration::seconds(cfg.cache_ttl_calm.as_secs() as i64 + 1);
        assert!(cache.get_fresh("NIFTY50", expired, &cfg).is_none());
    }
}
