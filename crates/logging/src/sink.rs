//! crates/logging/src/sink.rs
//! Destinations for subprocess output lines.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;

use crate::SUBPROCESS_TARGET;

/// Receives output lines one at a time.
///
/// Implementations are shared between the stdout and stderr reader threads of
/// a running subprocess, so they must tolerate concurrent calls.
pub trait LineSink: Send + Sync {
    /// Records a single line without its terminator.
    fn write_line(&self, line: &str) -> io::Result<()>;
}

impl<S: LineSink + ?Sized> LineSink for &S {
    fn write_line(&self, line: &str) -> io::Result<()> {
        (**self).write_line(line)
    }
}

impl<S: LineSink + ?Sized> LineSink for Arc<S> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        (**self).write_line(line)
    }
}

/// Emits each line as a tracing event under [`SUBPROCESS_TARGET`].
///
/// The event carries a `stream` field naming the originating stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TracingSink {
    stream: &'static str,
    level: Level,
}

impl TracingSink {
    /// Creates a sink that logs lines from `stream` at `level`.
    #[must_use]
    pub const fn new(stream: &'static str, level: Level) -> Self {
        Self { stream, level }
    }

    /// Subprocess stdout, logged at debug level.
    #[must_use]
    pub const fn stdout() -> Self {
        Self::new("stdout", Level::DEBUG)
    }

    /// Subprocess stderr, logged at error level.
    #[must_use]
    pub const fn stderr() -> Self {
        Self::new("stderr", Level::ERROR)
    }

    /// Level at which lines are emitted.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }
}

impl LineSink for TracingSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let stream = self.stream;
        match self.level {
            Level::ERROR => tracing::error!(target: SUBPROCESS_TARGET, stream, "{line}"),
            Level::WARN => tracing::warn!(target: SUBPROCESS_TARGET, stream, "{line}"),
            Level::INFO => tracing::info!(target: SUBPROCESS_TARGET, stream, "{line}"),
            Level::DEBUG => tracing::debug!(target: SUBPROCESS_TARGET, stream, "{line}"),
            _ => tracing::trace!(target: SUBPROCESS_TARGET, stream, "{line}"),
        }
        Ok(())
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the lines received so far, in arrival order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reports whether any received line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line.contains(needle))
    }
}

impl LineSink for CollectingSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
        Ok(())
    }
}
