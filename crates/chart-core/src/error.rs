use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainerError {
    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Nothing to submit: {0}")]
    EmptySubmission(String),

    #[error("Invalid tool state: {0}")]
    InvalidToolState(String),

    #[error("Invalid series: {0}")]
    InvalidSeries(String),

    #[error("Request timed out after {0}s")]
    RequestTimeout(u64),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TrainerError {
    /// Whether the learner can simply try the same request again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrainerError::DataUnavailable(_) | TrainerError::RequestTimeout(_) | TrainerError::Api(_)
        )
    }
}
