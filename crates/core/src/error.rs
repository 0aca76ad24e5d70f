//! Error types shared across crates

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Oracle timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid value for field {field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
