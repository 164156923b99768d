//! Error taxonomy shared by every cluster backend.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Identifies which provider produced a value or an error.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BackendKind {
    /// OpenStack Magnum on a private cloud.
    Magnum,
    /// Carina make-swarm on the public cloud.
    MakeSwarm,
}

impl BackendKind {
    /// Returns the short tag used in log lines and error prefixes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Magnum => "magnum",
            Self::MakeSwarm => "make-swarm",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by accounts, sessions, backends, and the polling engine.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClusterError {
    /// Raised when credentials are rejected or no valid token could be obtained.
    #[error("[{backend}] Authentication failed: {message}")]
    Authentication {
        /// Backend that rejected the credentials.
        backend: BackendKind,
        /// Reason reported by the identity service.
        message: String,
    },
    /// Raised when the operation has no meaning for the active backend.
    #[error("[{backend}] {operation} is not supported. {alternative}")]
    Unsupported {
        /// Backend that lacks the operation.
        backend: BackendKind,
        /// Operation the caller attempted.
        operation: String,
        /// Guidance naming what to do instead.
        alternative: String,
    },
    /// Raised when the named cluster does not exist for the account.
    #[error("[{backend}] Cluster ({name}) not found")]
    NotFound {
        /// Backend that was queried.
        backend: BackendKind,
        /// Cluster name that was requested.
        name: String,
    },
    /// Raised when the request never produced an HTTP response.
    #[error("[{backend}] Unable to {operation}: {message}")]
    Transport {
        /// Backend that was being contacted.
        backend: BackendKind,
        /// Operation that failed.
        operation: String,
        /// Transport error text.
        message: String,
    },
    /// Raised when the provider answers with a non-success status.
    #[error("[{backend}] Unable to {operation} (HTTP {status}): {message}")]
    Provider {
        /// Backend that answered.
        backend: BackendKind,
        /// Operation that failed.
        operation: String,
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body returned by the provider.
        message: String,
    },
    /// Raised when a provider response cannot be understood.
    #[error("[{backend}] Unable to {operation}: unexpected response: {message}")]
    Decode {
        /// Backend that answered.
        backend: BackendKind,
        /// Operation whose response was malformed.
        operation: String,
        /// Parser error text.
        message: String,
    },
    /// Raised when a wait loop exceeds its configured upper bound.
    #[error("[{backend}] Timed out after {waited:?} waiting for cluster ({name})")]
    Timeout {
        /// Backend that was polled.
        backend: BackendKind,
        /// Cluster being waited on.
        name: String,
        /// Configured upper bound that was exceeded.
        waited: Duration,
    },
    /// Raised when a request is missing a required field.
    #[error("[{backend}] Missing or invalid field: {field}")]
    Validation {
        /// Backend that rejected the request.
        backend: BackendKind,
        /// Field that failed validation.
        field: String,
    },
}

/// Raised by [`crate::ClusterRequestBuilder::build`] before any backend is
/// involved.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("missing or invalid field: {0}")]
pub struct InvalidRequest(pub String);

impl ClusterError {
    /// Builds a transport error from any displayable source.
    pub(crate) fn transport(
        backend: BackendKind,
        operation: impl Into<String>,
        source: impl fmt::Display,
    ) -> Self {
        Self::Transport {
            backend,
            operation: operation.into(),
            message: source.to_string(),
        }
    }

    /// Builds a decode error from any displayable source.
    pub(crate) fn decode(
        backend: BackendKind,
        operation: impl Into<String>,
        source: impl fmt::Display,
    ) -> Self {
        Self::Decode {
            backend,
            operation: operation.into(),
            message: source.to_string(),
        }
    }

    /// Builds a validation error for `field`.
    pub(crate) fn validation(backend: BackendKind, field: impl Into<String>) -> Self {
        Self::Validation {
            backend,
            field: field.into(),
        }
    }

    /// Builds an unsupported-operation error.
    pub(crate) fn unsupported(
        backend: BackendKind,
        operation: impl Into<String>,
        alternative: impl Into<String>,
    ) -> Self {
        Self::Unsupported {
            backend,
            operation: operation.into(),
            alternative: alternative.into(),
        }
    }

    /// Returns true when the error reports a missing cluster.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_backend_prefix() {
        let err = ClusterError::transport(BackendKind::MakeSwarm, "list clusters", "reset");
        assert_eq!(err.to_string(), "[make-swarm] Unable to list clusters: reset");

        let err = ClusterError::NotFound {
            backend: BackendKind::Magnum,
            name: String::from("demo"),
        };
        assert_eq!(err.to_string(), "[magnum] Cluster (demo) not found");
        assert!(err.is_not_found());

        let err = ClusterError::validation(BackendKind::Magnum, "template");
        assert_eq!(err.to_string(), "[magnum] Missing or invalid field: template");
    }
}
