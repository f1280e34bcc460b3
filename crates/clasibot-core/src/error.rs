//! Error types for Clasibot

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A classification or enrichment source failed; the cascade falls through
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Synthetic login failed for a company
    #[error("Session failure: {0}")]
    SessionFailure(String),

    /// The accounting ledger rejected a read or write
    #[error("Ledger fault: {message}")]
    LedgerFault { message: String, detail: String },

    /// A required secret or endpoint is missing
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Build a ledger fault from a message and diagnostic detail
    pub fn ledger(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::LedgerFault {
            message: message.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
