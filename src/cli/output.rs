//! CLI output: error mapping from domain errors to the stable CLI surface.

use crate::error::ApiError;

/// One-line error message for stderr.
pub fn map_error(e: &ApiError) -> String {
    format!("error: {}", e)
}

/// Process exit code per error family: 2 configuration, 3 storage, 1 anything else.
pub fn exit_code(e: &ApiError) -> i32 {
    match e {
        ApiError::ConfigError(_) | ApiError::ProviderNotConfigured(_) => 2,
        ApiError::StorageError(_) => 3,
        _ => 1,
    }
}
