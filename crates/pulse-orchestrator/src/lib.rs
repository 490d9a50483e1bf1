use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fmp_client::FmpClient;
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use gemini_client::GeminiClient;
use pulse_core::{
    HistoryProvider, MarketPulseResult, NewsProvider, PulseError, PulseResult, SentimentAnalyzer,
    Ticker, MAX_NEWS_ITEMS,
};
use std::sync::Arc;

pub mod cache;
pub use cache::{CacheEntry, PulseCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS};

/// One upstream fetch for a ticker, shared by every caller that misses the cache while it runs.
type PulseFlight = Shared<BoxFuture<'static, PulseResult<Arc<MarketPulseResult>>>>;

/// Upstream collaborators a fetch needs.
#[derive(Clone)]
struct Sources {
    history: Arc<dyn HistoryProvider>,
    news: Arc<dyn NewsProvider>,
    sentiment: Arc<dyn SentimentAnalyzer>,
}

impl Sources {
    async fn fetch_and_assemble(&self, ticker: &Ticker) -> PulseResult<MarketPulseResult> {
        let (history_result, news_result) = tokio::join!(
            self.history.daily_history(ticker),
            self.news.recent_news(ticker, MAX_NEWS_ITEMS),
        );

        // News is dropped with the request when history fails
        let history = history_result?;
        if history.is_empty() {
            return Err(no_data(ticker));
        }
        tracing::info!("History for {}: {} points", ticker, history.len());

        let news = news_result.unwrap_or_else(|e| {
            tracing::warn!("Continuing without news for {}: {}", ticker, e);
            Vec::new()
        });

        let sentiment = self.sentiment.analyze(ticker, &history).await?;
        tracing::info!(
            "Sentiment for {}: {} ({} confidence)",
            ticker,
            sentiment.pulse,
            sentiment.confidence
        );

        MarketPulseResult::assemble(ticker.as_str(), &history, news, sentiment, Utc::now())
            .ok_or_else(|| no_data(ticker))
    }
}

fn no_data(ticker: &Ticker) -> PulseError {
    PulseError::Provider(format!("No time series data found for {}", ticker))
}

pub struct PulseOrchestrator {
    sources: Sources,
    cache: Arc<PulseCache>,
    /// Fetches currently running, keyed by normalized ticker
    in_flight: Arc<DashMap<String, PulseFlight>>,
}

impl PulseOrchestrator {
    pub fn new(
        history: Arc<dyn HistoryProvider>,
        news: Arc<dyn NewsProvider>,
        sentiment: Arc<dyn SentimentAnalyzer>,
        cache: Arc<PulseCache>,
    ) -> Self {
        Self {
            sources: Sources {
                history,
                news,
                sentiment,
            },
            cache,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Wire the FMP client as both history and news source.
    pub fn with_clients(fmp: FmpClient, gemini: GeminiClient, cache: Arc<PulseCache>) -> Self {
        let fmp = Arc::new(fmp);
        Self::new(fmp.clone(), fmp, Arc::new(gemini), cache)
    }

    pub fn cache(&self) -> &PulseCache {
        &self.cache
    }

    /// Validate `raw_ticker` and return its pulse, from cache when fresh.
    pub async fn get_market_pulse(&self, raw_ticker: &str) -> PulseResult<MarketPulseResult> {
        let ticker = Ticker::parse(raw_ticker)?;

        if let Some(entry) = self.cache.get(ticker.as_str()) {
            tracing::debug!("Cache hit for {}", ticker);
            return Ok(entry.result.as_ref().clone());
        }

        let result = self.join_or_start(&ticker).await?;
        Ok(result.as_ref().clone())
    }

    fn join_or_start(&self, ticker: &Ticker) -> PulseFlight {
        match self.in_flight.entry(ticker.as_str().to_string()) {
            Entry::Occupied(running) => {
                tracing::debug!("Joining in-flight fetch for {}", ticker);
                running.get().clone()
            }
            Entry::Vacant(slot) => {
                // A fetch may have finished between the cache check and taking the slot
                if let Some(entry) = self.cache.get(ticker.as_str()) {
                    return future::ready(Ok(entry.result)).boxed().shared();
                }

                tracing::debug!("Cache miss for {}, fetching upstream", ticker);
                let flight = self.start_fetch(ticker.clone());
                slot.insert(flight.clone());
                flight
            }
        }
    }

    fn start_fetch(&self, ticker: Ticker) -> PulseFlight {
        let sources = self.sources.clone();
        let cache = self.cache.clone();
        let slot = FlightSlot {
            in_flight: self.in_flight.clone(),
            key: ticker.as_str().to_string(),
        };

        // Runs to completion even when every caller is dropped. The caller still holds the
        // vacant slot here, so the task's removal cannot land before the insert.
        let task = tokio::spawn(async move {
            let _slot = slot;
            let outcome = sources.fetch_and_assemble(&ticker).await.map(Arc::new);
            if let Ok(result) = &outcome {
                cache.put_at(ticker.as_str(), result.clone(), result.timestamp);
            }
            outcome
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| {
                tracing::error!("Market pulse fetch task failed: {}", e);
                Err(PulseError::Provider(format!("Upstream fetch aborted: {}", e)))
            })
        })
        .boxed()
        .shared()
    }
}

/// Owns a ticker's `in_flight` entry; dropping it (task end or unwind) frees the slot.
struct FlightSlot {
    in_flight: Arc<DashMap<String, PulseFlight>>,
    key: String,
}

impl Drop for FlightSlot {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}
