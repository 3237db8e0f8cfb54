//! Error taxonomy for Flingr.

use thiserror::Error;

/// Failures surfaced across the connectivity subsystem.
///
/// Collaborators only ever see these as a state plus a reason string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlingrError {
    /// Bad address or port input, rejected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An external tool produced unexpected or unparseable output.
    #[error("{tool} failed: {reason}")]
    ToolInvocation {
        /// Tool that was invoked.
        tool: String,
        /// What went wrong.
        reason: String,
    },

    /// No network connectivity.
    #[error("network is not available")]
    NetworkUnavailable,

    /// The remote store answered without the expected fields.
    #[error("remote store rejected request: {0}")]
    RemoteRejection(String),
}
