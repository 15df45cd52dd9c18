use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoppangError {
    /// Network or upstream failure talking to an oracle or the feed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Oracle output that could not be interpreted.
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
