use thiserror::Error;

/// Errors surfaced to the command layer. Every variant terminates the
/// invocation with a non-zero exit, except where the aggregation loop
/// catches cycle errors at its own boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("failed to parse feed: {0}")]
    Parse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("no feeds registered")]
    NoFeeds,

    #[error("command '{0}' not found")]
    UnknownCommand(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
