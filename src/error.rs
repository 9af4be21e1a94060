use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Page-level parser failure. Individual malformed listings never produce one
/// of these; they are dropped inside the parser.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{source_tag}: page has no recognizable listing markup")]
    UnrecognizedPage { source_tag: &'static str },

    #[error("{source_tag}: invalid selector {selector}")]
    Selector {
        source_tag: &'static str,
        selector: String,
    },
}
