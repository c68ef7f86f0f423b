//! Error types for the matching engine.

use thiserror::Error;

/// Failure produced by a codec (decoder or encoder) function.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    /// Create a codec error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by the expectation engine.
///
/// These abort the dispatch of a single request with a diagnostic; they never
/// take the server process down.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A response body requires an encoder that was never registered.
    ///
    /// Surfaced at response-build time, not at registration time, since
    /// encoders may legally be registered after expectations.
    #[error("no encoder registered for content type '{content_type}'")]
    MissingEncoder { content_type: String },

    /// An encoder was found but failed to produce bytes.
    #[error("encoding response body as '{content_type}' failed: {source}")]
    Encode {
        content_type: String,
        #[source]
        source: CodecError,
    },

    /// A caller-supplied response function returned an error.
    #[error("user response function failed: {source}")]
    UserResponse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A call constraint was built with `min > max`.
    #[error("invalid call constraint: min {min} greater than max {max}")]
    InvalidConstraint { min: u32, max: u32 },

    /// Proxy mode was enabled but the forwarder failed.
    #[error("proxy forward failed: {0}")]
    Proxy(String),
}
