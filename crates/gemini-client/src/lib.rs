//! Gemini `generateContent` client producing a market sentiment judgment.

pub mod error;
pub mod prompt;

pub use error::{GeminiError, GeminiResult};

use async_trait::async_trait;
use pulse_core::{
    Confidence, HistoricalDataPoint, Pulse, PulseError, PulseResult, SentimentAnalysis,
    SentimentAnalyzer, Ticker,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Configuration for the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    /// Read `GEMINI_API_KEY`, `GEMINI_BASE_URL` and `GEMINI_MODEL`.
    pub fn from_env() -> GeminiResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            GeminiError::ServiceUnavailable("GEMINI_API_KEY is not set".to_string())
        })?;

        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        Ok(config)
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> GeminiResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Ask the model for a sentiment verdict on the recent price history.
    pub async fn analyze_history(
        &self,
        ticker: &str,
        history: &[HistoricalDataPoint],
    ) -> GeminiResult<SentimentAnalysis> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt::build_prompt(ticker, history),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.2,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::ServiceUnavailable(format!(
                "HTTP {}: {}",
                status,
                error_message(&body)
            )));
        }

        let body: GenerateContentResponse = response.json().await?;
        let text = first_candidate_text(body)?;
        tracing::debug!("Gemini verdict for {}: {}", ticker, text);
        parse_judgment(&text)
    }
}

#[async_trait]
impl SentimentAnalyzer for GeminiClient {
    async fn analyze(
        &self,
        ticker: &Ticker,
        history: &[HistoricalDataPoint],
    ) -> PulseResult<SentimentAnalysis> {
        self.analyze_history(ticker.as_str(), history)
            .await
            .map_err(PulseError::from)
    }
}

fn first_candidate_text(response: GenerateContentResponse) -> GeminiResult<String> {
    response
        .candidates
        .into_iter()
        .flatten()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text.filter(|t| !t.trim().is_empty()))
        .ok_or(GeminiError::EmptyResponse)
}

/// Parse the model's text into a judgment restricted to the known labels.
pub fn parse_judgment(text: &str) -> GeminiResult<SentimentAnalysis> {
    let raw: RawJudgment = serde_json::from_str(strip_code_fence(text))?;

    let pulse: Pulse = raw
        .pulse
        .parse()
        .map_err(|e| GeminiError::InvalidResponse(format!("pulse: {}", e)))?;
    let confidence: Confidence = raw
        .confidence
        .parse()
        .map_err(|e| GeminiError::InvalidResponse(format!("confidence: {}", e)))?;

    let reason = raw.reason.trim();
    if reason.is_empty() {
        return Err(GeminiError::InvalidResponse("empty reason".to_string()));
    }

    Ok(SentimentAnalysis {
        pulse,
        reason: reason.to_string(),
        confidence,
    })
}

/// Models sometimes wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawJudgment {
    pulse: String,
    reason: String,
    confidence: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use chrono::NaiveDate;
    use httpmock::prelude::*;
    use serde_json::json;

    const ENDPOINT: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

    fn client_for(base_url: String, timeout_secs: u64) -> GeminiClient {
        let mut config = GeminiConfig::new("test-key");
        config.base_url = base_url;
        config.timeout = Duration::from_secs(timeout_secs);
        GeminiClient::new(config).unwrap()
    }

    fn history() -> Vec<HistoricalDataPoint> {
        vec![HistoricalDataPoint {
            date: NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
            close: 210.62,
            volume: Some(82_542_718),
            open: None,
            high: None,
            low: None,
        }]
    }

    fn ticker() -> Ticker {
        Ticker::parse("AAPL").unwrap()
    }

    #[tokio::test]
    async fn test_generate_content_round_trip() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(ENDPOINT)
                    .header("x-goog-api-key", "test-key")
                    .body_includes("AAPL")
                    .body_includes("application/json");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": {
                            "role": "model",
                            "parts": [{"text": "{\"pulse\": \"Bearish\", \"reason\": \"Three lower closes.\", \"confidence\": \"Medium\"}"}]
                        },
                        "finishReason": "STOP"
                    }]
                }));
            })
            .await;

        let judgment = client_for(server.base_url(), 5)
            .analyze(&ticker(), &history())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(judgment.pulse, Pulse::Bearish);
        assert_eq!(judgment.confidence, Confidence::Medium);
        assert_eq!(judgment.reason, "Three lower closes.");
    }

    #[tokio::test]
    async fn test_non_success_is_analysis_error_with_api_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ENDPOINT);
                then.status(403).json_body(json!({
                    "error": {"code": 403, "message": "API key not valid.", "status": "PERMISSION_DENIED"}
                }));
            })
            .await;

        let err = client_for(server.base_url(), 5)
            .analyze(&ticker(), &history())
            .await
            .unwrap_err();

        match err {
            PulseError::Analysis(message) => {
                assert!(message.contains("403"));
                assert!(message.contains("API key not valid."));
            }
            other => panic!("expected analysis error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_off_vocabulary_reply_is_analysis_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ENDPOINT);
                then.status(200).json_body(json!({
                    "candidates": [{"content": {"parts": [
                        {"text": "{\"pulse\": \"Moon\", \"reason\": \"Vibes.\", \"confidence\": \"High\"}"}
                    ]}}]
                }));
            })
            .await;

        let err = client_for(server.base_url(), 5)
            .analyze(&ticker(), &history())
            .await
            .unwrap_err();

        assert!(matches!(err, PulseError::Analysis(ref m) if m.contains("Moon")));
    }

    #[tokio::test]
    async fn test_timeout_is_analysis_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let err = client_for(format!("http://{}", addr), 1)
            .analyze(&ticker(), &history())
            .await
            .unwrap_err();

        assert!(matches!(err, PulseError::Analysis(ref m) if !m.contains("test-key")));
    }
}
