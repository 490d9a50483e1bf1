use pulse_core::{recent_window, HistoricalDataPoint};
use serde::Serialize;

/// Compact row sent to the model; other price fields are left out.
#[derive(Debug, Serialize)]
struct PromptPoint {
    date: String,
    close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<i64>,
}

pub fn build_prompt(ticker: &str, history: &[HistoricalDataPoint]) -> String {
    let points: Vec<PromptPoint> = recent_window(history)
        .iter()
        .map(|p| PromptPoint {
            date: p.date.format("%Y-%m-%d").to_string(),
            close: p.close,
            volume: p.volume,
        })
        .collect();
    let data = serde_json::to_string(&points).unwrap_or_else(|_| "[]".to_string());

    format!(
        "You are a financial market analyst. Below are the most recent daily prices \
         (newest first) for the stock {ticker}.\n\n\
         {data}\n\n\
         Based only on this data, give a one-word market sentiment: Bullish, Bearish or Neutral. \
         Justify it in exactly one sentence, and rate your confidence as Low, Medium or High.\n\
         Respond with exactly one JSON object and nothing else, using the keys \
         \"pulse\", \"reason\" and \"confidence\". Example: \
         {{\"pulse\": \"Neutral\", \"reason\": \"Price moved sideways in a tight range.\", \"confidence\": \"Medium\"}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    #[test]
    fn test_prompt_uses_latest_twenty_points() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let history: Vec<HistoricalDataPoint> = (0..30)
            .map(|i| HistoricalDataPoint {
                date: start - Duration::days(i),
                close: 100.0 + i as f64,
                volume: Some(500),
                open: Some(1.0),
                high: None,
                low: None,
            })
            .collect();

        let prompt = build_prompt("MSFT", &history);

        assert!(prompt.contains("MSFT"));
        assert!(prompt.contains(r#"{"date":"2024-03-31","close":100.0,"volume":500}"#));
        // 20th most recent is 2024-03-12; 21st must be left out
        assert!(prompt.contains("2024-03-12"));
        assert!(!prompt.contains("2024-03-11"));
        assert!(!prompt.contains("\"open\""));
        assert!(prompt.contains("\"pulse\", \"reason\" and \"confidence\""));
    }

    #[test]
    fn test_prompt_with_short_history() {
        let history = vec![HistoricalDataPoint {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            close: 9.5,
            volume: None,
            open: None,
            high: None,
            low: None,
        }];

        let prompt = build_prompt("NEWCO", &history);
        assert!(prompt.contains(r#"[{"date":"2024-01-02","close":9.5}]"#));
    }
}
