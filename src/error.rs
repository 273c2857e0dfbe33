//! Error types for the Tenant Operator

use std::time::Duration;

use kube::error::ErrorResponse;
use thiserror::Error;

/// Result type for the operator
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the operator
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Tenant spec failed local validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Concurrent write to the same object
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// An external call did not complete in time
    #[error("{operation} timed out after {after:?}")]
    TimeoutError { operation: String, after: Duration },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The leader Lease could not be held
    #[error("Leader election error: {0}")]
    LeaderElectionError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Transient errors are retried with backoff; everything else needs a
    /// change to the Tenant spec (or the operator's environment) first.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => is_transient_response(resp),
            // Transport failures; the request may not even have reached the server
            Error::KubeError(kube::Error::HyperError(_))
            | Error::KubeError(kube::Error::Service(_))
            | Error::KubeError(kube::Error::ReadEvents(_)) => true,
            // Request building, decoding and client setup fail the same way every time
            Error::KubeError(_) => false,
            Error::ConflictError(_) | Error::TimeoutError { .. } => true,
            Error::ValidationError(_)
            | Error::ConfigError(_)
            | Error::LeaderElectionError(_)
            | Error::SerializationError(_) => false,
        }
    }

    /// Short label used for metrics
    pub fn class(&self) -> &'static str {
        match self {
            Error::ValidationError(_) => "validation",
            Error::ConfigError(_) => "config",
            Error::LeaderElectionError(_) => "leader_election",
            Error::TimeoutError { .. } => "timeout",
            Error::ConflictError(_) => "conflict",
            e if e.is_transient() => "transient",
            _ => "permanent",
        }
    }
}

fn is_transient_response(resp: &ErrorResponse) -> bool {
    match resp.code {
        409 | 429 => true,
        code if code >= 500 => true,
        // Creating into a namespace that is still being deleted clears up on its own
        403 => is_namespace_terminating(resp),
        _ => false,
    }
}

/// The API server refuses new objects in a namespace that is terminating,
/// e.g. right after a Tenant was deleted and recreated under the same name.
fn is_namespace_terminating(resp: &ErrorResponse) -> bool {
    resp.reason == "NamespaceTerminating" || resp.message.contains("because it is being terminated")
}
