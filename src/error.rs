//! Error types for the playbook sync pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt record store at {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Unsupported record store version: {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Invalid entity key: {0}")]
    InvalidKey(String),

    #[error("Failed to serialize record store: {0}")]
    Serialization(String),
}

/// Pipeline, provider, and configuration errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ApiError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Transport-level failures (timeouts, connection resets, 5xx, rate limits) are
    /// transient. Everything that would fail identically on the next attempt is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::ProviderError(_) => true,
            ApiError::ProviderRequestFailed(_) => true,
            ApiError::ProviderRateLimit(_) => true,
            ApiError::ProviderNotConfigured(_) => false,
            ApiError::ProviderAuthFailed(_) => false,
            ApiError::ProviderModelNotFound(_) => false,
            ApiError::MalformedResponse(_) => false,
            ApiError::InvalidInput(_) => false,
            ApiError::RenderFailed(_) => false,
            ApiError::StorageError(_) => false,
            ApiError::ConfigError(_) => false,
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
