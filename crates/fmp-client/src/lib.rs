//! Financial Modeling Prep client: daily price history and stock news.

use async_trait::async_trait;
use chrono::NaiveDate;
use pulse_core::{
    HistoricalDataPoint, HistoryProvider, NewsItem, NewsProvider, PulseError, PulseResult, Ticker,
};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct FmpClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl FmpClient {
    pub fn new(api_key: String) -> PulseResult<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string(), DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(
        api_key: String,
        base_url: String,
        timeout: Duration,
    ) -> PulseResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            PulseError::Provider(format!("Failed to build FMP HTTP client: {}", e))
        })?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build from `FMP_API_KEY` and optional `FMP_BASE_URL`.
    pub fn from_env() -> PulseResult<Self> {
        let api_key = std::env::var("FMP_API_KEY")
            .map_err(|_| PulseError::Provider("FMP_API_KEY is not set".to_string()))?;
        let base_url =
            std::env::var("FMP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(api_key, base_url, DEFAULT_TIMEOUT)
    }

    /// Full daily price history, newest first.
    pub async fn get_historical_prices(
        &self,
        symbol: &str,
    ) -> PulseResult<Vec<HistoricalDataPoint>> {
        let url = format!("{}/api/v3/historical-price-full/{}", self.base_url, symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                PulseError::Provider(format!(
                    "History request for {} failed: {}",
                    symbol,
                    e.without_url()
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::Provider(format!(
                "History provider returned HTTP {} for {}",
                status, symbol
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PulseError::Provider(e.without_url().to_string()))?;

        let history = parse_history(symbol, &body)?;
        tracing::debug!("Fetched {} daily points for {}", history.len(), symbol);
        Ok(history)
    }

    /// Most recent headlines for a symbol, at most `limit` of them.
    pub async fn get_stock_news(&self, symbol: &str, limit: usize) -> PulseResult<Vec<NewsItem>> {
        let url = format!("{}/api/v3/stock_news", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("tickers", symbol),
                ("limit", &limit.to_string()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PulseError::NewsUnavailable(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::NewsUnavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PulseError::NewsUnavailable(e.without_url().to_string()))?;

        parse_news(&body, limit)
    }
}

#[async_trait]
impl HistoryProvider for FmpClient {
    async fn daily_history(&self, ticker: &Ticker) -> PulseResult<Vec<HistoricalDataPoint>> {
        self.get_historical_prices(ticker.as_str()).await
    }
}

#[async_trait]
impl NewsProvider for FmpClient {
    async fn recent_news(&self, ticker: &Ticker, limit: usize) -> PulseResult<Vec<NewsItem>> {
        self.get_stock_news(ticker.as_str(), limit).await
    }
}

/// Decode a `historical-price-full` body. A payload without a usable
/// `historical` array means the symbol has no data.
fn parse_history(symbol: &str, body: &str) -> PulseResult<Vec<HistoricalDataPoint>> {
    let parsed: HistoricalPriceResponse = serde_json::from_str(body).map_err(|e| {
        PulseError::Provider(format!("Malformed history payload for {}: {}", symbol, e))
    })?;

    if let Some(message) = parsed.error_message {
        return Err(PulseError::Provider(message));
    }

    let rows = parsed.historical.unwrap_or_default();
    if rows.is_empty() {
        return Err(PulseError::Provider(format!(
            "No time series data found for {}",
            symbol
        )));
    }

    let mut history: Vec<HistoricalDataPoint> = rows
        .into_iter()
        .map(|r| HistoricalDataPoint {
            date: r.date,
            close: r.close,
            volume: r.volume.map(|v| v.round() as i64),
            open: r.open,
            high: r.high,
            low: r.low,
        })
        .collect();

    // Stable, so an already newest-first payload keeps its order
    history.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(history)
}

fn parse_news(body: &str, limit: usize) -> PulseResult<Vec<NewsItem>> {
    let rows: Vec<StockNewsRow> = serde_json::from_str(body)
        .map_err(|e| PulseError::NewsUnavailable(format!("Malformed news payload: {}", e)))?;

    Ok(rows
        .into_iter()
        .take(limit)
        .map(|r| NewsItem {
            title: r.title,
            text: r.text.unwrap_or_default(),
            url: r.url,
        })
        .collect())
}

// Response types

#[derive(Debug, Deserialize)]
struct HistoricalPriceResponse {
    #[serde(default)]
    historical: Option<Vec<HistoricalRow>>,
    #[serde(rename = "Error Message", default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoricalRow {
    date: NaiveDate,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StockNewsRow {
    title: String,
    #[serde(default)]
    text: Option<String>,
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history_newest_first() {
        let body = r#"{
            "symbol": "AAPL",
            "historical": [
                {"date": "2024-06-28", "open": 215.7, "high": 216.0, "low": 210.1, "close": 210.62, "volume": 82542718, "changePercent": -1.6},
                {"date": "2024-06-27", "close": 214.1, "volume": 49772707.0},
                {"date": "2024-06-26", "close": 213.25}
            ]
        }"#;

        let history = parse_history("AAPL", body).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].date, NaiveDate::from_ymd_opt(2024, 6, 28).unwrap());
        assert_eq!(history[0].close, 210.62);
        assert_eq!(history[0].open, Some(215.7));
        assert_eq!(history[1].volume, Some(49_772_707));
        assert_eq!(history[2].volume, None);
    }

    #[test]
    fn test_parse_history_reorders_oldest_first_payload() {
        let body = r#"{"historical": [
            {"date": "2024-06-26", "close": 1.0},
            {"date": "2024-06-28", "close": 3.0},
            {"date": "2024-06-27", "close": 2.0}
        ]}"#;

        let closes: Vec<f64> = parse_history("X", body).unwrap().iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_parse_history_without_series_is_no_data() {
        for body in [r#"{}"#, r#"{"symbol": "ZZ99", "historical": []}"#] {
            let err = parse_history("ZZ99", body).unwrap_err();
            assert_eq!(
                err,
                PulseError::Provider("No time series data found for ZZ99".to_string())
            );
        }
    }

    #[test]
    fn test_parse_history_surfaces_provider_message() {
        let body = r#"{"Error Message": "Invalid API KEY."}"#;
        let err = parse_history("AAPL", body).unwrap_err();
        assert_eq!(err, PulseError::Provider("Invalid API KEY.".to_string()));
    }

    #[test]
    fn test_parse_news_truncates_and_defaults_text() {
        let body = r#"[
            {"symbol": "AAPL", "title": "A", "text": "alpha", "url": "https://n/a", "site": "x"},
            {"symbol": "AAPL", "title": "B", "url": "https://n/b"},
            {"symbol": "AAPL", "title": "C", "text": "gamma", "url": "https://n/c"}
        ]"#;

        let news = parse_news(body, 2).unwrap();
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].text, "alpha");
        assert_eq!(news[1].title, "B");
        assert_eq!(news[1].text, "");
    }

    #[test]
    fn test_parse_news_error_payload_is_news_unavailable() {
        let err = parse_news(r#"{"Error Message": "Limit reached"}"#, 5).unwrap_err();
        assert!(matches!(err, PulseError::NewsUnavailable(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = FmpClient::with_base_url(
            "k".to_string(),
            "http://localhost:9000/".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:9000");
    }
}
