//! Error types for Bearcat

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger store error: {0}")]
    Store(String),

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("Invalid amount: {0}")]
    Validation(#[from] ValidationError),
}

/// Reasons an amount entered by the user is rejected before any append
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount is empty")]
    EmptyAmount,

    #[error("'{0}' is not a number")]
    InvalidAmount(String),

    #[error("amount cannot be negative")]
    NegativeAmount,
}

pub type Result<T> = std::result::Result<T, Error>;
