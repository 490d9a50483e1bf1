use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of most recent daily points kept in a result and sent to the analyzer.
pub const HISTORY_WINDOW: usize = 20;

/// Maximum number of headlines attached to a result.
pub const MAX_NEWS_ITEMS: usize = 5;

/// One trading day of price data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDataPoint {
    pub date: NaiveDate,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
}

/// Headline attached to a pulse result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub text: String,
    pub url: String,
}

/// Categorical sentiment verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pulse {
    Bullish,
    Bearish,
    Neutral,
}

/// How sure the analyzer claims to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Error for labels outside the closed vocabularies above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel(pub String);

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized label {:?}", self.0)
    }
}

impl std::error::Error for UnknownLabel {}

impl FromStr for Pulse {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Ok(Pulse::Bullish),
            "bearish" => Ok(Pulse::Bearish),
            "neutral" => Ok(Pulse::Neutral),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

impl FromStr for Confidence {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

impl fmt::Display for Pulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Pulse::Bullish => "Bullish",
            Pulse::Bearish => "Bearish",
            Pulse::Neutral => "Neutral",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::Low => "Low",
            Confidence::Medium => "Medium",
            Confidence::High => "High",
        };
        f.write_str(s)
    }
}

/// Validated judgment returned by a [`crate::SentimentAnalyzer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub pulse: Pulse,
    pub reason: String,
    pub confidence: Confidence,
}

/// Price figures derived from the history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAnalysis {
    /// Most recent close, formatted with two decimals
    pub last_price: String,
}

/// Composite snapshot served by `GET /market-pulse/{ticker}` and kept in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPulseResult {
    pub ticker: String,
    pub pulse: Pulse,
    pub reason: String,
    pub confidence: Confidence,
    pub analysis: PriceAnalysis,
    pub history: Vec<HistoricalDataPoint>,
    pub news: Vec<NewsItem>,
    pub timestamp: DateTime<Utc>,
}

impl MarketPulseResult {
    /// Build a result from a newest-first history. Returns `None` for an empty history.
    pub fn assemble(
        ticker: &str,
        history: &[HistoricalDataPoint],
        mut news: Vec<NewsItem>,
        sentiment: SentimentAnalysis,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        let latest = history.first()?;
        news.truncate(MAX_NEWS_ITEMS);

        Some(Self {
            ticker: ticker.to_string(),
            pulse: sentiment.pulse,
            reason: sentiment.reason,
            confidence: sentiment.confidence,
            analysis: PriceAnalysis {
                last_price: format!("{:.2}", latest.close),
            },
            history: recent_window(history).to_vec(),
            news,
            timestamp,
        })
    }
}

/// The most recent `HISTORY_WINDOW` points of a newest-first series.
pub fn recent_window(history: &[HistoricalDataPoint]) -> &[HistoricalDataPoint] {
    &history[..history.len().min(HISTORY_WINDOW)]
}
