//! Process exit codes reported by the command-line front-end.
//!
//! The local codes reuse the numbers rsync assigns to the same failure
//! classes. A failed transfer reports the secure-copy tool's own exit code.

use std::fmt;

use dispatch::DispatchError;

/// Exit codes produced without consulting the secure-copy tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Payload delivered.
    Ok = 0,

    /// Bad command line or unusable destination configuration.
    ///
    /// Nothing was spawned.
    Usage = 1,

    /// Local file I/O failed.
    ///
    /// Covers reading the payload, writing temp files and reading the
    /// subprocess's output streams.
    FileIo = 11,

    /// The transfer was cancelled before the secure-copy tool finished.
    Signal = 20,
}

impl ExitCode {
    /// Returns the numeric exit code.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Returns a short description of the code.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::Usage => "usage or configuration error",
            Self::FileIo => "error in file I/O",
            Self::Signal => "transfer cancelled",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Maps a dispatch failure onto the process exit code.
///
/// Transfer failures keep the subprocess's exit code, clamped into `1..=255`
/// so a failure is never reported as success.
pub fn exit_code_for(error: &DispatchError) -> i32 {
    match error {
        DispatchError::Configuration(_) => ExitCode::Usage.as_i32(),
        DispatchError::Execution { .. } if error.is_cancelled() => ExitCode::Signal.as_i32(),
        DispatchError::Execution { .. } => ExitCode::FileIo.as_i32(),
        DispatchError::Transfer { exit_code, .. } => (*exit_code).clamp(1, 255),
    }
}
