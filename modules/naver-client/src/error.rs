use thiserror::Error;

pub type Result<T> = std::result::Result<T, NaverError>;

#[derive(Debug, Error)]
pub enum NaverError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for NaverError {
    fn from(err: reqwest::Error) -> Self {
        NaverError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for NaverError {
    fn from(err: serde_json::Error) -> Self {
        NaverError::Parse(err.to_string())
    }
}
