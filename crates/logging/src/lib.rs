#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` owns the diagnostic plumbing shared by the dispatch core and the
//! command-line front-end:
//!
//! - [`init_tracing`] installs a `tracing-subscriber` registry that writes
//!   formatted events to stderr, filtered by a [`Verbosity`] derived from the
//!   `-v` count or by the `SCP_DISPATCH_LOG` environment variable.
//! - [`LineSink`] receives the output of the secure-copy subprocess one line at
//!   a time. [`TracingSink`] turns lines into tracing events and
//!   [`CollectingSink`] keeps them in memory.
//!
//! # Invariants
//!
//! - Sinks are `Send + Sync`; the invoker writes stdout and stderr lines from
//!   two reader threads at once.
//! - Lines handed to a sink never carry their trailing `\n` / `\r\n`.
//!
//! # Examples
//!
//! ```
//! use logging::{CollectingSink, LineSink};
//!
//! let sink = CollectingSink::new();
//! sink.write_line("Warning: Permanently added 'localhost'")?;
//! assert_eq!(sink.lines(), vec!["Warning: Permanently added 'localhost'"]);
//! # Ok::<(), std::io::Error>(())
//! ```

mod sink;
mod subscriber;
mod verbosity;

pub use sink::{CollectingSink, LineSink, TracingSink};
pub use subscriber::{LOG_ENV, SUBPROCESS_TARGET, init_tracing};
pub use verbosity::Verbosity;
