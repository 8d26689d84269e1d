//! Error types for resource loading.

use thiserror::Error;

/// Failure of a single resource request.
///
/// Scoped to one source: a failed image never aborts sibling loads or the render.
/// `Clone` because one result is shared by every caller waiting on the same source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The proxy path was selected but no usable proxy URL is configured.
    #[error("No proxy defined")]
    NoProxyConfigured,

    /// The image failed to decode.
    #[error("Failed to load image {key}: {reason}")]
    Load { key: String, reason: String },

    /// The load did not settle within the configured timeout.
    #[error("Timed out ({timeout_ms}ms) loading image {key}")]
    Timeout { timeout_ms: u64, key: String },

    /// The proxy answered with a status other than 200.
    #[error("Failed to proxy resource {key} with status code {status}")]
    Proxy { status: u16, key: String },

    /// The proxy request failed at the transport level.
    #[error("Network error proxying {key}: {reason}")]
    Network { key: String, reason: String },

    /// The load task ended without producing a result.
    #[error("Load of {key} was aborted")]
    Aborted { key: String },
}

/// Error binding or resolving the origin context.
#[derive(Debug, Error)]
pub enum OriginError {
    /// The location could not be parsed as an absolute URL.
    #[error("Invalid origin URL: {0}")]
    Invalid(#[from] url::ParseError),

    /// The context is already bound to a different origin.
    #[error("Origin context already bound to {0}")]
    AlreadyBound(String),
}
