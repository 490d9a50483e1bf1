use async_trait::async_trait;

use crate::{HistoricalDataPoint, NewsItem, PulseResult, SentimentAnalysis, Ticker};

/// Source of daily price history, newest point first.
///
/// Failures abort the pulse request.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn daily_history(&self, ticker: &Ticker) -> PulseResult<Vec<HistoricalDataPoint>>;
}

/// Source of recent headlines. Errors are absorbed by the caller.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn recent_news(&self, ticker: &Ticker, limit: usize) -> PulseResult<Vec<NewsItem>>;
}

/// Produces a sentiment judgment from recent price history
#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        ticker: &Ticker,
        history: &[HistoricalDataPoint],
    ) -> PulseResult<SentimentAnalysis>;
}
