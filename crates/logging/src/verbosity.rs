//! crates/logging/src/verbosity.rs
//! Mapping from the `-v` count to a tracing level.

use tracing::level_filters::LevelFilter;

/// How much diagnostic output the subscriber lets through.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub enum Verbosity {
    /// Warnings and errors only.
    #[default]
    Quiet,
    /// Adds informational events such as temp-file creation (`-v`).
    Verbose,
    /// Adds subprocess stdout and per-stage events (`-vv`).
    Debug,
    /// Everything (`-vvv` and above).
    Trace,
}

impl Verbosity {
    /// Maps a repeated `-v` flag count onto a verbosity.
    ///
    /// ```
    /// use logging::Verbosity;
    ///
    /// assert_eq!(Verbosity::from_verbose_level(0), Verbosity::Quiet);
    /// assert_eq!(Verbosity::from_verbose_level(2), Verbosity::Debug);
    /// assert_eq!(Verbosity::from_verbose_level(9), Verbosity::Trace);
    /// ```
    #[must_use]
    pub const fn from_verbose_level(level: u8) -> Self {
        match level {
            0 => Self::Quiet,
            1 => Self::Verbose,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Most detailed level enabled at this verbosity.
    #[must_use]
    pub const fn level_filter(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::WARN,
            Self::Verbose => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}
