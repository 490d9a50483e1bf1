//! Time-expiring result cache keyed by normalized ticker.

use chrono::{DateTime, Duration, Utc};
use moka::sync::Cache;
use pulse_core::MarketPulseResult;
use std::sync::Arc;

pub const DEFAULT_CACHE_TTL_SECS: i64 = 600; // 10 minutes
pub const DEFAULT_CACHE_CAPACITY: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub ticker: String,
    pub result: Arc<MarketPulseResult>,
    pub created_at: DateTime<Utc>,
}

/// Staleness is judged from `created_at` when an entry is read. Stale entries
/// stay in place until the next successful write for the ticker replaces them;
/// the size bound is the only thing that removes entries.
pub struct PulseCache {
    entries: Cache<String, CacheEntry>,
    ttl: Duration,
}

impl PulseCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, ticker: &str) -> Option<CacheEntry> {
        self.get_at(ticker, Utc::now())
    }

    /// Fresh entry for `ticker` as of `now`, if any.
    pub fn get_at(&self, ticker: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = self.entries.get(ticker)?;
        let age = now - entry.created_at;
        if age < self.ttl {
            Some(entry)
        } else {
            tracing::debug!("Cached pulse for {} is stale ({}s old)", ticker, age.num_seconds());
            None
        }
    }

    pub fn put(&self, ticker: &str, result: Arc<MarketPulseResult>) -> CacheEntry {
        self.put_at(ticker, result, Utc::now())
    }

    pub fn put_at(
        &self,
        ticker: &str,
        result: Arc<MarketPulseResult>,
        created_at: DateTime<Utc>,
    ) -> CacheEntry {
        let entry = CacheEntry {
            ticker: ticker.to_string(),
            result,
            created_at,
        };
        self.entries.insert(ticker.to_string(), entry.clone());
        entry
    }

    /// Number of stored entries, fresh or stale.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PulseCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_CACHE_TTL_SECS), DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pulse_core::{
        Confidence, HistoricalDataPoint, MarketPulseResult, Pulse, SentimentAnalysis,
    };

    fn result(ticker: &str, close: f64, at: DateTime<Utc>) -> Arc<MarketPulseResult> {
        let history = vec![HistoricalDataPoint {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            close,
            volume: None,
            open: None,
            high: None,
            low: None,
        }];
        let sentiment = SentimentAnalysis {
            pulse: Pulse::Neutral,
            reason: "Flat.".to_string(),
            confidence: Confidence::Low,
        };
        Arc::new(MarketPulseResult::assemble(ticker, &history, vec![], sentiment, at).unwrap())
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = PulseCache::default();
        let now = Utc::now();
        cache.put_at("AAPL", result("AAPL", 1.0, now), now);

        let entry = cache.get_at("AAPL", now + Duration::seconds(599)).unwrap();
        assert_eq!(entry.ticker, "AAPL");
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.result.analysis.last_price, "1.00");
    }

    #[test]
    fn test_stale_at_ttl_but_not_removed() {
        let cache = PulseCache::default();
        let now = Utc::now();
        cache.put_at("AAPL", result("AAPL", 1.0, now), now);

        assert!(cache.get_at("AAPL", now + Duration::minutes(10)).is_none());
        assert!(cache.get_at("AAPL", now + Duration::hours(3)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_newer_write_supersedes_stale_entry() {
        let cache = PulseCache::default();
        let then = Utc::now() - Duration::minutes(30);
        cache.put_at("MSFT", result("MSFT", 1.0, then), then);
        assert!(cache.get("MSFT").is_none());

        cache.put("MSFT", result("MSFT", 2.0, Utc::now()));
        let entry = cache.get("MSFT").unwrap();
        assert_eq!(entry.result.analysis.last_price, "2.00");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keys_are_exact() {
        let cache = PulseCache::default();
        cache.put("BRK.B", result("BRK.B", 1.0, Utc::now()));
        assert!(cache.get("BRK.B").is_some());
        assert!(cache.get("BRK-B").is_none());
        assert!(cache.get("brk.b").is_none());
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = PulseCache::new(Duration::minutes(10), 8);
        for i in 0..64 {
            let ticker = format!("T{}", i);
            cache.put(&ticker, result(&ticker, 1.0, Utc::now()));
        }
        assert!(cache.len() <= 8);
    }
}
