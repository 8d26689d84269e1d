//! Registry and configuration error types.

use pixcache_loader::OriginError;
use thiserror::Error;

/// Errors raised by [`CacheRegistry`](crate::CacheRegistry).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No cache instance is registered under the name.
    #[error("Cache with key \"{0}\" not found")]
    NotFound(String),

    /// No cache instance is active.
    #[error("No cache instance attached")]
    NotAttached,

    /// Another render pass holds the active slot.
    #[error("Cache instance \"{0}\" is already attached")]
    ActiveSlotBusy(String),

    /// The origin context is bound to a different origin.
    #[error("Origin context already bound to {0}")]
    ContextAlreadyBound(String),

    /// The context location is not an absolute URL.
    #[error("Invalid origin URL: {0}")]
    InvalidOrigin(String),
}

impl From<OriginError> for RegistryError {
    fn from(error: OriginError) -> Self {
        match error {
            OriginError::AlreadyBound(origin) => Self::ContextAlreadyBound(origin),
            OriginError::Invalid(parse) => Self::InvalidOrigin(parse.to_string()),
        }
    }
}

/// Errors loading a [`RenderConfig`](crate::RenderConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The text is not JSON.
    #[error("Invalid JSON: {0}")]
    Json(String),

    /// The document does not match the config schema.
    #[error("Config validation failed: {0}")]
    Validation(String),

    /// The embedded schema failed to compile.
    #[error("Invalid config schema: {0}")]
    Schema(String),
}
