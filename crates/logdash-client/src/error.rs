//! Normalized error types for dashboard operations.
//!
//! Transport-agnostic errors that hide HTTP details and give callers the
//! two outcomes they care about: no response at all, or a response that
//! carried an error payload.

use thiserror::Error;

/// Error from one call to the dashboard backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// No response was obtained (connect failure, timeout, reset).
    #[error("backend unavailable: {message}")]
    Transport { message: String },

    /// The backend answered with an error payload.
    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    /// The tail cursor points past the end of the source (rotated or truncated).
    #[error("cursor {cursor} is beyond the end of {source_id}")]
    CursorOutOfRange { source_id: String, cursor: u64 },

    /// The backend answered, but not with the documented shape.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Request validation failed before anything was sent.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl BackendError {
    /// Whether the failure happened before a response arrived.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether repeating the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Backend { status, .. } => *status >= 500 || *status == 429,
            Self::CursorOutOfRange { .. }
            | Self::InvalidResponse { .. }
            | Self::InvalidArgument { .. } => false,
        }
    }
}

/// Error from the third-party geolocation service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoError {
    #[error("geolocation unavailable: {message}")]
    Transport { message: String },

    #[error("geolocation returned HTTP {status}")]
    Http { status: u16 },

    #[error("geolocation lookup failed: {reason}")]
    Lookup { reason: String },

    #[error("no country known for {identifier}")]
    NotFound { identifier: String },
}

/// Error from a dashboard operation that goes through the display state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("display state owner has shut down")]
    StateClosed,

    #[error("no analysis snapshot is loaded")]
    NoSnapshot,

    #[error("no log source selected")]
    NoSource,

    #[error("slot {slot} is not part of the current ranking")]
    UnknownSlot { slot: usize },

    #[error("the snapshot was replaced while the request was in flight")]
    StaleSnapshot,

    #[error("client {identifier:?} is already being resolved")]
    AlreadyInFlight { identifier: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(BackendError::Transport {
            message: "refused".into()
        }
        .is_retryable());
        assert!(BackendError::Backend {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!BackendError::Backend {
            status: 404,
            message: "File not found".into()
        }
        .is_retryable());
        assert!(!BackendError::CursorOutOfRange {
            source_id: "a.log".into(),
            cursor: 10
        }
        .is_retryable());
    }

    #[test]
    fn backend_error_converts_into_client_error() {
        let err: ClientError = BackendError::InvalidArgument {
            message: "ip is required".into(),
        }
        .into();
        assert_eq!(err.to_string(), "invalid argument: ip is required");
    }

    #[test]
    fn display_messages_are_stable() {
        let err = BackendError::Backend {
            status: 404,
            message: "File not found".into(),
        };
        assert_eq!(err.to_string(), "backend returned 404: File not found");
        let err = GeoError::Http { status: 429 };
        assert_eq!(err.to_string(), "geolocation returned HTTP 429");
    }
}
