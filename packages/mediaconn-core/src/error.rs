//! Centralized error handling for the connection core.
//!
//! Each component defines its own `thiserror` enum next to the code that
//! raises it; this module gathers them, provides the [`ErrorCode`] trait for
//! stable machine-readable codes, and re-exports the `Result` aliases.
//!
//! Nothing crosses a component boundary without one of these typed kinds:
//! I/O, HTTP and socket failures are wrapped at the point they occur.

/// Trait for error types that provide machine-readable error codes.
///
/// Codes are stable across releases so callers can match on them without
/// parsing display strings.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::credentials::{StoreError, StoreResult};
pub use crate::model::ServerRecordError;
pub use crate::probe::{ProbeError, ProbeResult};
pub use crate::resolver::{ResolveError, ResolveResult};
pub use crate::session::{SessionError, SessionResult};
pub use crate::transport::{TransportError, TransportResult};
pub use crate::wake::{WakeError, WakeResult};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConnectionMode;
    use crate::session::SessionState;
    use std::time::Duration;

    #[test]
    fn codes_are_distinct_per_failure_kind() {
        let codes = [
            ServerRecordError::InvalidMode(ConnectionMode::Local).code(),
            ProbeError::Timeout(Duration::from_secs(1)).code(),
            ResolveError::NoAddressConfigured.code(),
            ResolveError::Unreachable(vec![]).code(),
            TransportError::NotOpen.code(),
            StoreError::Unavailable("x".into()).code(),
            StoreError::Write("x".into()).code(),
            SessionError::NotConnected(SessionState::Idle).code(),
            SessionError::Disposed.code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn configuration_errors_are_not_retryable() {
        let err = SessionError::from(ResolveError::NoAddressConfigured);
        assert_eq!(err.code(), "no_address_configured");
        assert!(!err.is_retryable());

        let err = SessionError::from(ResolveError::Unreachable(vec![]));
        assert!(err.is_retryable());
    }
}
