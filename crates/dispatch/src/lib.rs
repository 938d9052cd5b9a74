#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dispatch` copies inbound byte streams to a remote host by running the
//! system secure-copy client (`scp`). No SSH or SCP protocol is implemented
//! here; the crate prepares everything the external tool needs and interprets
//! what it reports.
//!
//! # Design
//!
//! - [`config`] holds the immutable [`TransferConfig`] for one destination,
//!   built programmatically, from TOML or from an `scp://` URI.
//! - [`credentials`] turns the configured key and known-hosts sources into
//!   concrete paths, writing owner-read-only temp files where needed.
//! - [`args`] assembles the ordered argument vector and quotes the remote path
//!   for the remote shell.
//! - [`invoke`] runs the executable, draining stdout and stderr concurrently
//!   into [`logging::LineSink`]s.
//! - [`dispatcher`] drives one transfer through staging, resolving, invoking,
//!   interpreting and cleanup.
//!
//! # Errors
//!
//! Every fallible operation returns [`DispatchResult`]. [`DispatchError`]
//! separates configuration problems (nothing was spawned), local I/O failures
//! and non-zero exits of the secure-copy tool.
//!
//! # Examples
//!
//! ```no_run
//! use dispatch::{Dispatcher, KeySource, TransferConfig};
//!
//! let config = TransferConfig::builder("backup.example.com", "ingest", "/srv/inbox")
//!     .key(KeySource::file("/etc/scp-dispatch/id_ed25519"))
//!     .build()?;
//! let dispatcher = Dispatcher::new(config);
//!
//! let result = dispatcher.dispatch(&b"report body"[..], "report 2024.txt")?;
//! assert_eq!(result.remote_path(), "/srv/inbox/report 2024.txt");
//!
//! dispatcher.shutdown();
//! # Ok::<(), dispatch::DispatchError>(())
//! ```

pub mod args;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod invoke;
pub mod resources;

pub use config::{KeySource, KnownHostsSource, TransferConfig, TransferConfigBuilder};
pub use credentials::{CredentialCache, ResolvedCredentials};
pub use dispatcher::{Dispatcher, TransferResult};
pub use error::{DispatchError, DispatchResult};
pub use invoke::{CancelToken, Invoker, ProcessInvoker};
pub use resources::ResourceSet;
