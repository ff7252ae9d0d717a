//! Error types shared across the engine crates.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("No CAPTCHA solving service is configured or usable")]
    CaptchaUnavailable,

    #[error("CAPTCHA solving failed: {0}")]
    Captcha(String),

    #[error("Mailbox error: {0}")]
    Email(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
