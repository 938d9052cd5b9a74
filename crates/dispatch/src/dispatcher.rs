//! crates/dispatch/src/dispatcher.rs
//!
//! Orchestrates one transfer per [`Dispatcher::dispatch`] call:
//!
//! 1. **Staging**: validate the destination name, copy the payload into a
//!    uniquely named temp file.
//! 2. **Resolving**: fetch credentials from the per-dispatcher cache.
//! 3. **Invoking**: build the argument vector and run the secure-copy tool.
//! 4. **Interpreting**: exit code `0` is success, anything else a
//!    [`DispatchError::Transfer`].
//! 5. **Cleanup**: the staged file is removed on every path out of the call,
//!    including errors and unwinding. Failures to remove it are logged and
//!    never replace the result.
//!
//! Credentials stay cached until [`Dispatcher::shutdown`] or drop, so their
//! temp files outlive individual transfers.

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logging::{LineSink, TracingSink};
use tempfile::{NamedTempFile, TempPath};

use crate::args;
use crate::config::TransferConfig;
use crate::credentials::{CredentialCache, ResolvedCredentials};
use crate::error::{DispatchError, DispatchResult};
use crate::invoke::{CancelToken, Invoker, ProcessInvoker};

const TARGET: &str = "scp_dispatch::dispatch";

const STAGING_PREFIX: &str = "scp-dispatch-payload-";

/// Outcome of a successful transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferResult {
    remote_path: String,
    bytes: u64,
}

impl TransferResult {
    /// Remote path the payload was written to.
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Number of payload bytes handed to the secure-copy tool.
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Consumes the result and returns the remote path.
    pub fn into_remote_path(self) -> String {
        self.remote_path
    }
}

/// Sends payloads to the destination described by one [`TransferConfig`].
///
/// A dispatcher is `Sync`; concurrent calls to [`dispatch`](Self::dispatch)
/// share its cached credentials and each run their own subprocess.
pub struct Dispatcher<I = ProcessInvoker> {
    config: TransferConfig,
    credentials: CredentialCache,
    invoker: I,
    stdout: Arc<dyn LineSink>,
    stderr: Arc<dyn LineSink>,
}

impl Dispatcher<ProcessInvoker> {
    /// Creates a dispatcher that spawns the secure-copy executable.
    pub fn new(config: TransferConfig) -> Self {
        Self::with_invoker(config, ProcessInvoker::new())
    }
}

impl<I: Invoker> Dispatcher<I> {
    /// Creates a dispatcher that runs transfers through `invoker`.
    ///
    /// Subprocess output goes to [`TracingSink`]s until replaced with
    /// [`with_sinks`](Self::with_sinks).
    pub fn with_invoker(config: TransferConfig, invoker: I) -> Self {
        Self {
            config,
            credentials: CredentialCache::new(),
            invoker,
            stdout: Arc::new(TracingSink::stdout()),
            stderr: Arc::new(TracingSink::stderr()),
        }
    }

    /// Routes subprocess stdout and stderr lines to the given sinks.
    pub fn with_sinks(mut self, stdout: Arc<dyn LineSink>, stderr: Arc<dyn LineSink>) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// Destination configuration.
    pub const fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Invoker used for transfers.
    pub const fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Cached credentials, if a transfer has resolved them.
    pub fn credentials(&self) -> Option<Arc<ResolvedCredentials>> {
        self.credentials.get()
    }

    /// Copies `payload` to `file_name` under the configured remote path.
    pub fn dispatch(&self, payload: impl Read, file_name: &str) -> DispatchResult<TransferResult> {
        self.dispatch_cancellable(payload, file_name, &CancelToken::new())
    }

    /// Like [`dispatch`](Self::dispatch), aborting the subprocess once `cancel` fires.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            skip(self, payload, cancel),
            name = "dispatch",
            fields(host = self.config.remote_host())
        )
    )]
    pub fn dispatch_cancellable(
        &self,
        payload: impl Read,
        file_name: &str,
        cancel: &CancelToken,
    ) -> DispatchResult<TransferResult> {
        validate_file_name(file_name)?;
        let staged = StagedSource::create(payload)?;
        let result = self.transfer(&staged, file_name, cancel);
        staged.close();
        result
    }

    fn transfer(
        &self,
        staged: &StagedSource,
        file_name: &str,
        cancel: &CancelToken,
    ) -> DispatchResult<TransferResult> {
        let credentials = self.credentials.get_or_resolve(&self.config)?;
        let arguments = args::build(&self.config, &credentials, staged.path(), file_name);
        let exit_code = self.invoker.execute(
            self.config.executables(),
            &arguments,
            &*self.stdout,
            &*self.stderr,
            cancel,
        )?;

        if exit_code == 0 {
            let remote_path = self.config.remote_file_path(file_name);
            tracing::info!(
                target: TARGET,
                host = self.config.remote_host(),
                remote_path = %remote_path,
                bytes = staged.len(),
                "transfer complete"
            );
            Ok(TransferResult {
                remote_path,
                bytes: staged.len(),
            })
        } else {
            let message = format!(
                "Failed to send input stream to {}",
                self.config.describe_destination()
            );
            tracing::warn!(target: TARGET, exit_code, "{message}");
            Err(DispatchError::Transfer { exit_code, message })
        }
    }

    /// Removes cached credential temp files.
    ///
    /// Transfers still running keep their credentials alive until they
    /// finish. The next transfer resolves credentials again.
    pub fn shutdown(&self) {
        tracing::debug!(target: TARGET, host = self.config.remote_host(), "shutting down");
        self.credentials.clear();
    }
}

impl<I> Drop for Dispatcher<I> {
    fn drop(&mut self) {
        self.credentials.clear();
    }
}

impl<I: fmt::Debug> fmt::Debug for Dispatcher<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .field("invoker", &self.invoker)
            .finish_non_exhaustive()
    }
}

fn validate_file_name(file_name: &str) -> DispatchResult<()> {
    if file_name.trim().is_empty() {
        return Err(DispatchError::configuration(
            "destination file name must not be empty or blank",
        ));
    }
    if file_name.contains('\0') {
        return Err(DispatchError::configuration(
            "destination file name must not contain NUL bytes",
        ));
    }
    Ok(())
}

/// Temp copy of a payload, removed when closed or dropped.
struct StagedSource {
    path: Option<TempPath>,
    len: u64,
}

impl StagedSource {
    fn create(mut payload: impl Read) -> DispatchResult<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile()
            .map_err(|error| DispatchError::execution("stage payload", std::env::temp_dir(), error))?;
        let len = copy_payload(&mut payload, &mut file)
            .map_err(|error| DispatchError::execution("stage payload", file.path(), error))?;
        let path = file.into_temp_path();
        tracing::debug!(
            target: TARGET,
            path = %path.display(),
            bytes = len,
            "staged payload"
        );
        Ok(Self {
            path: Some(path),
            len,
        })
    }

    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    const fn len(&self) -> u64 {
        self.len
    }

    fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(temp) = self.path.take() else {
            return;
        };
        let path: PathBuf = temp.to_path_buf();
        match temp.close() {
            Ok(()) => tracing::debug!(target: TARGET, path = %path.display(), "removed staged payload"),
            Err(error) => tracing::warn!(
                target: TARGET,
                path = %path.display(),
                %error,
                "failed to remove staged payload"
            ),
        }
    }
}

impl Drop for StagedSource {
    fn drop(&mut self) {
        self.remove();
    }
}

fn copy_payload(payload: &mut impl Read, file: &mut NamedTempFile) -> io::Result<u64> {
    let len = io::copy(payload, file)?;
    file.flush()?;
    Ok(len)
}

#[cfg(test)]
mod tests;
