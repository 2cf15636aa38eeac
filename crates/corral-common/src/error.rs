//! Unified error type for the Corral workspace.
//!
//! The kinds are deliberately coarse: callers match on the category
//! (missing record, bad argument, kernel refusal) rather than on the
//! individual syscall that failed.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CorralError {
    /// A state file, log file, or cgroup file operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A container, mount, or other resource does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// An operation's precondition on the container status was violated.
    #[error("container {id} is {status}: cannot {op}")]
    InvalidState {
        /// Container the operation targeted.
        id: String,
        /// Status the container was actually in.
        status: String,
        /// Operation that was refused.
        op: &'static str,
    },

    /// A user spec, mount spec, port spec, or capability name is malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the malformed input.
        message: String,
    },

    /// The kernel rejected a privileged operation, or a non-root caller
    /// attempted a forbidden identity switch.
    #[error("insufficient privilege: {message}")]
    InsufficientPrivilege {
        /// Description of the denied operation.
        message: String,
    },

    /// A syscall failed for a reason not covered by the other kinds.
    #[error("{op} failed: {source}")]
    Kernel {
        /// Syscall or kernel-facing operation that failed.
        op: &'static str,
        /// Underlying errno.
        source: nix::Error,
    },

    /// A bounded wait elapsed.
    #[error("{op} timed out after {secs}s")]
    Timeout {
        /// Operation that timed out.
        op: &'static str,
        /// Deadline that elapsed.
        secs: u64,
    },

    /// Serialization or deserialization of a record failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CorralError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_kind_and_id() {
        let err = CorralError::NotFound {
            kind: "container",
            id: "c1".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("container"));
        assert!(msg.contains("c1"));
    }

    #[test]
    fn invalid_state_display_names_operation() {
        let err = CorralError::InvalidState {
            id: "c1".into(),
            status: "stopped".into(),
            op: "stop",
        };
        let msg = format!("{err}");
        assert!(msg.contains("stopped"));
        assert!(msg.contains("cannot stop"));
    }

    #[test]
    fn timeout_display_includes_deadline() {
        let err = CorralError::Timeout {
            op: "stop",
            secs: 10,
        };
        assert!(format!("{err}").contains("10s"));
    }

    #[test]
    fn serialization_error_from_serde_json() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: CorralError = serde_err.into();
        assert!(matches!(err, CorralError::Serialization { .. }));
    }
}
