use thiserror::Error;

/// Failures a market pulse request can end with.
///
/// `Clone` so one in-flight outcome can be handed to every caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PulseError {
    #[error("Invalid ticker format: {input:?}")]
    Validation { input: String },

    #[error("{0}")]
    Provider(String),

    #[error("Sentiment analysis failed: {0}")]
    Analysis(String),

    /// Never surfaced to callers; the orchestrator swaps it for an empty news list.
    #[error("News unavailable: {0}")]
    NewsUnavailable(String),
}

impl PulseError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, PulseError::Validation { .. })
    }
}

pub type PulseResult<T> = Result<T, PulseError>;
