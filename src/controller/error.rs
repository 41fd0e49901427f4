//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior. Every
//! error ends the current reconcile pass; the cluster worker logs it and
//! tries again on the next resync.

use std::time::Duration;
use thiserror::Error;

use crate::client::EnsembleError;
use crate::membership::MembershipError;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Ensemble unreachable or returned a malformed response
    #[error("Ensemble error: {0}")]
    Ensemble(#[from] EnsembleError),

    /// Too few known members are running to mutate membership safely
    #[error("Lost quorum: {live} of {known} members running, {required} required")]
    LostQuorum {
        live: usize,
        known: usize,
        required: usize,
    },

    /// A member pod could not be created or failed to start
    #[error("Failed to create member {member}: {source}")]
    PodCreate {
        member: String,
        #[source]
        source: Box<Error>,
    },

    /// A member pod did not reach Running in time
    #[error("Member {member} still pending after {timeout:?}")]
    PodWaitTimeout { member: String, timeout: Duration },

    /// Membership invariant violation
    #[error("Membership error: {0}")]
    Membership(#[from] MembershipError),

    /// Validation error in resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Permanent error that should not be retried
    #[error("Permanent error: {0}")]
    Permanent(String),

    /// Status could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if the API reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error is expected to clear up on a later pass
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Ensemble(_) | Error::LostQuorum { .. } | Error::PodWaitTimeout { .. } => true,
            Error::PodCreate { source, .. } => source.is_retryable(),
            Error::Transient(_) => true,
            Error::Validation(_) | Error::Permanent(_) => false,
            Error::Membership(_) | Error::Serialization(_) => false,
        }
    }

    /// Wrap a pod creation failure with the member name.
    ///
    /// Wait timeouts already carry the member and pass through unchanged.
    pub fn pod_create(member: &str, source: Error) -> Self {
        match source {
            Error::PodWaitTimeout { .. } => source,
            other => Error::PodCreate {
                member: member.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
