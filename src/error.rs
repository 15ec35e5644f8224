//! Error types for the divban core.
//!
//! One `thiserror`-derived enum covers every failure mode named in the
//! error taxonomy: compiler/solver validation, external-command
//! execution, host-inventory exhaustion, linger activation, and
//! service lifecycle failures. Each variant records enough context to
//! build the user-visible message without the caller having to
//! reconstruct it from scratch.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for all divban operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A descriptor, stack, or compiled value failed validation.
    #[error("invalid config at {field}: {message}")]
    InvalidConfig {
        /// Dotted field path of the offending value.
        field: String,
        /// Human-readable explanation.
        message: String,
    },

    /// An operation received structurally invalid arguments (e.g. an
    /// empty argv, or a memory-size literal that does not parse).
    #[error("invalid arguments: {message}")]
    InvalidArgs {
        /// Human-readable explanation.
        message: String,
    },

    /// A referenced user, service, or secret does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing entity.
        what: String,
    },

    /// An external command exited non-zero.
    #[error("command failed: {command} (exit {exit_code}): {stderr}")]
    Exec {
        /// The joined argv that was run.
        command: String,
        /// Exit code returned by the process.
        exit_code: i32,
        /// Trimmed stderr.
        stderr: String,
    },

    /// The UID allocator found no free UID in the configured range.
    #[error("no free uid in range {start}..={end}")]
    UidExhausted {
        /// Start of the scanned range.
        start: u32,
        /// End of the scanned range.
        end: u32,
    },

    /// The subordinate-range allocator found no room for a range of
    /// the requested size.
    #[error("no free subordinate range of size {size} starting from {range_start}")]
    SubRangeExhausted {
        /// Size of the range that could not be placed.
        size: u32,
        /// Floor the scan started from.
        range_start: u32,
    },

    /// Linger activation did not converge within its polling budget.
    #[error("linger activation failed for {username}: {reason}")]
    LingerFailed {
        /// The service user's username.
        username: String,
        /// What specifically did not converge.
        reason: String,
    },

    /// `systemctl --user start` (or equivalent) failed after retries.
    #[error("failed to start unit {unit}: {source}")]
    ServiceStartFailed {
        /// The unit name.
        unit: String,
        /// Underlying exec error.
        #[source]
        source: Box<Error>,
    },

    /// `systemctl --user stop` (or equivalent) failed after retries.
    #[error("failed to stop unit {unit}: {source}")]
    ServiceStopFailed {
        /// The unit name.
        unit: String,
        /// Underlying exec error.
        #[source]
        source: Box<Error>,
    },

    /// `systemctl --user daemon-reload` (or equivalent) failed.
    #[error("failed to reload unit {unit}: {source}")]
    ServiceReloadFailed {
        /// The unit name, or "daemon" for a bare reload.
        unit: String,
        /// Underlying exec error.
        #[source]
        source: Box<Error>,
    },

    /// A podman/secret operation failed.
    #[error("container runtime error: {message}")]
    Container {
        /// Human-readable explanation.
        message: String,
    },

    /// A host mutation was attempted without sufficient privilege.
    #[error("root privileges required: {operation}")]
    RootRequired {
        /// The operation that needed elevated privilege.
        operation: String,
    },

    /// Rollback of a transaction itself failed. Carries both the
    /// original failure (primary) and the rollback failure.
    #[error("rollback failed after {original}: {rollback}")]
    RollbackFailed {
        /// The failure that triggered rollback.
        original: Box<Error>,
        /// The failure encountered while rolling back.
        rollback: Box<Error>,
    },

    /// I/O error occurred during a host mutation.
    #[error("io error: {message}")]
    Io {
        /// Error message describing the IO failure.
        message: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Build an [`Error::InvalidConfig`].
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build an [`Error::InvalidArgs`].
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs {
            message: message.into(),
        }
    }

    /// Build an [`Error::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Build an [`Error::Exec`].
    pub fn exec(command: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::Exec {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// The lowercased text this error's message/stderr reduces to for
    /// retry classification purposes (see [`crate::retry::classify`]).
    #[must_use]
    pub fn classification_text(&self) -> String {
        match self {
            Self::Exec { stderr, .. } => stderr.to_lowercase(),
            other => other.to_string().to_lowercase(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_classification_text_is_stderr_lowercased() {
        let err = Error::exec("podman stop x", 1, "Permission Denied");
        assert_eq!(err.classification_text(), "permission denied");
    }

    #[test]
    fn invalid_config_formats_field_path() {
        let err = Error::invalid_config("container.healthCheck.interval", "not a duration");
        assert_eq!(
            err.to_string(),
            "invalid config at container.healthCheck.interval: not a duration"
        );
    }

    #[test]
    fn io_error_roundtrip() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io { .. }));
    }
}
