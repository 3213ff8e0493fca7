//! Typed errors the pipeline branches on.
//!
//! Everything else travels as `anyhow::Error`; these enums exist so retry
//! and loop-control code can tell transient upstream failures apart from
//! permanent ones, and so a row can report why it stopped.

use thiserror::Error;

/// Failure reported by an upstream service (vector index, embedding API,
/// language model).
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} rate limited: {message}")]
    RateLimited { service: String, message: String },

    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error("{service} rejected request ({status}): {message}")]
    Rejected {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{service} returned a malformed response: {message}")]
    Malformed { service: String, message: String },
}

impl UpstreamError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::RateLimited { .. } | UpstreamError::Unavailable { .. }
        )
    }
}

/// Returns true when `err` wraps a transient [`UpstreamError`].
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<UpstreamError>())
        .map(UpstreamError::is_transient)
        .unwrap_or(false)
}

/// Failure of the answer state machine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("step limit of {limit} reached before an answer was generated")]
    StepLimitExceeded { limit: u32 },
}
