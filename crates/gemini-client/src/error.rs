use pulse_core::PulseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("No usable candidate in response")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type GeminiResult<T> = Result<T, GeminiError>;

impl From<GeminiError> for PulseError {
    fn from(err: GeminiError) -> Self {
        PulseError::Analysis(err.to_string())
    }
}
