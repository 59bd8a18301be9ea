use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// The completion endpoint did not answer within the configured deadline.
    #[error("completion request timed out")]
    Timeout,

    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
