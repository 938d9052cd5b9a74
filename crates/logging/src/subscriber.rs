//! crates/logging/src/subscriber.rs
//! Global tracing subscriber installation.
//!
//! ```rust,ignore
//! use logging::{Verbosity, init_tracing};
//!
//! init_tracing(Verbosity::from_verbose_level(2))?;
//! tracing::debug!(target: "scp_dispatch::dispatch", "staging payload");
//! ```

use std::env;
use std::io;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::Verbosity;

/// Environment variable holding `EnvFilter` directives that override the `-v` count.
pub const LOG_ENV: &str = "SCP_DISPATCH_LOG";

/// Target of the events produced by [`TracingSink`](crate::TracingSink).
pub const SUBPROCESS_TARGET: &str = "scp_dispatch::invoke";

/// Installs the global subscriber, writing formatted events to stderr.
///
/// Directives in [`LOG_ENV`] take precedence; when the variable is unset,
/// empty or unparsable, `verbosity` selects the maximum level. Fails when a
/// global subscriber is already installed.
pub fn init_tracing(verbosity: Verbosity) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(build_filter(verbosity, env::var(LOG_ENV).ok().as_deref()))
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .try_init()
}

fn build_filter(verbosity: Verbosity, directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(verbosity.level_filter().into()))
}
