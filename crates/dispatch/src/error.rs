//! crates/dispatch/src/error.rs
//!
//! Error taxonomy for dispatch operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while dispatching a payload.
///
/// Configuration errors are never retried; transfer errors keep the numeric
/// exit code of the subprocess for programmatic branching.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The destination configuration or the request is unusable.
    ///
    /// Raised before any subprocess is spawned.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A local I/O operation failed.
    #[error("{operation} failed for '{}': {source}", path.display())]
    Execution {
        /// Short description of what was being attempted.
        operation: &'static str,
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The secure-copy subprocess ran and exited unsuccessfully.
    #[error("transfer failed with exit code {exit_code}: {message}")]
    Transfer {
        /// Exit status reported by the subprocess.
        exit_code: i32,
        /// Description naming the remote host, path and port.
        message: String,
    },
}

impl DispatchError {
    /// Constructs a [`DispatchError::Configuration`] from any displayable message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Constructs a [`DispatchError::Execution`] for `operation` on `path`.
    pub fn execution(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Execution {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Reports whether the error is a configuration error.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns the subprocess exit code for [`DispatchError::Transfer`] errors.
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Transfer { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Reports whether the error was caused by cancelling the invocation.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Execution { source, .. } if source.kind() == io::ErrorKind::Interrupted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io::ErrorKind;

    #[test]
    fn configuration_error_display() {
        let err = DispatchError::configuration("private key file not found");

        assert!(err.is_configuration());
        assert_eq!(err.exit_code(), None);
        assert_eq!(
            err.to_string(),
            "configuration error: private key file not found"
        );
    }

    #[test]
    fn execution_error_names_operation_and_path() {
        let err = DispatchError::execution(
            "stage payload",
            "/tmp/staged",
            io::Error::new(ErrorKind::StorageFull, "disk full"),
        );

        let rendered = err.to_string();
        assert!(rendered.contains("stage payload"));
        assert!(rendered.contains("/tmp/staged"));
        assert!(rendered.contains("disk full"));
        assert!(err.source().is_some());
        assert!(!err.is_configuration());
    }

    #[test]
    fn transfer_error_preserves_exit_code() {
        let err = DispatchError::Transfer {
            exit_code: 255,
            message: "Failed to send input stream to example.com:/srv and port 22".to_owned(),
        };

        assert_eq!(err.exit_code(), Some(255));
        assert!(err.to_string().contains("exit code 255"));
        assert!(err.to_string().contains("example.com:/srv"));
    }

    #[test]
    fn interrupted_execution_is_cancelled() {
        let err = DispatchError::execution(
            "wait for scp",
            "/usr/bin/scp",
            io::Error::new(ErrorKind::Interrupted, "cancelled"),
        );
        assert!(err.is_cancelled());

        let other = DispatchError::execution(
            "read stdout",
            "/usr/bin/scp",
            io::Error::other("broken"),
        );
        assert!(!other.is_cancelled());
    }

    #[test]
    fn debug_format() {
        let err = DispatchError::configuration("test");
        let debug = format!("{err:?}");

        assert!(debug.contains("Configuration"));
    }
}
