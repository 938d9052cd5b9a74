//! crates/dispatch/src/invoke.rs
//!
//! Runs the secure-copy executable and forwards its output.
//!
//! [`ProcessInvoker`] picks the first candidate path that is an executable
//! regular file, spawns it with piped stdout/stderr and drains both pipes on
//! two scoped reader threads while the calling thread waits for the exit
//! status. Reading both streams concurrently keeps a chatty child from
//! blocking on a full pipe buffer.
//!
//! On Unix the child leads its own process group. A [`CancelToken`] lets
//! another thread abort the wait: the whole group is killed, so helpers such as
//! the `ssh` process forked by `scp` release the output pipes too, the readers
//! are joined and the call fails with an [`io::ErrorKind::Interrupted`]
//! execution error.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use logging::LineSink;

use crate::error::{DispatchError, DispatchResult};

const TARGET: &str = "scp_dispatch::invoke";

/// Interval between exit-status polls while waiting on the child.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Attempts made when the kernel reports the executable as busy.
#[cfg(unix)]
const SPAWN_ATTEMPTS: u32 = 5;

/// Shared flag that aborts a running transfer.
///
/// Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every operation watching this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Reports whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Runs an external program and reports its exit code.
///
/// The dispatcher talks to the subprocess only through this trait, so tests
/// can substitute a spy that records arguments without spawning anything.
pub trait Invoker: Send + Sync {
    /// Runs the first usable program in `candidates` with `args`.
    ///
    /// Output lines go to `stdout` / `stderr`. Returns the exit code once the
    /// process has exited and both streams are drained.
    fn execute(
        &self,
        candidates: &[PathBuf],
        args: &[OsString],
        stdout: &dyn LineSink,
        stderr: &dyn LineSink,
        cancel: &CancelToken,
    ) -> DispatchResult<i32>;
}

/// [`Invoker`] backed by [`std::process::Command`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessInvoker;

impl ProcessInvoker {
    /// Creates the invoker.
    pub const fn new() -> Self {
        Self
    }
}

impl Invoker for ProcessInvoker {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, name = "invoke", fields(args = args.len()))
    )]
    fn execute(
        &self,
        candidates: &[PathBuf],
        args: &[OsString],
        stdout: &dyn LineSink,
        stderr: &dyn LineSink,
        cancel: &CancelToken,
    ) -> DispatchResult<i32> {
        let program = locate_executable(candidates)?;
        tracing::debug!(
            target: TARGET,
            program = %program.display(),
            ?args,
            "spawning secure copy"
        );

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            command.process_group(0);
        }
        let mut child = RunningChild(spawn(&mut command, program)?);

        let stdout_pipe = take_pipe(child.0.stdout.take(), "capture stdout", program)?;
        let stderr_pipe = take_pipe(child.0.stderr.take(), "capture stderr", program)?;

        let (status, stdout_drained, stderr_drained) = thread::scope(|scope| {
            let out = scope.spawn(|| drain(stdout_pipe, stdout));
            let err = scope.spawn(|| drain(stderr_pipe, stderr));
            let status = wait_for_exit(&mut child.0, cancel, program);
            (status, join_reader(out), join_reader(err))
        });

        let status = status?;
        check_drained(stdout_drained, STDOUT, program)?;
        check_drained(stderr_drained, STDERR, program)?;

        let code = exit_code(status);
        tracing::debug!(target: TARGET, code, "secure copy exited");
        Ok(code)
    }
}

/// Returns the first candidate that is an executable regular file.
pub fn locate_executable(candidates: &[PathBuf]) -> DispatchResult<&Path> {
    candidates
        .iter()
        .map(PathBuf::as_path)
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| {
            let probed: Vec<_> = candidates
                .iter()
                .map(|candidate| candidate.display().to_string())
                .collect();
            DispatchError::configuration(format!(
                "no usable executable found (probed: {})",
                probed.join(", ")
            ))
        })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn spawn(command: &mut Command, program: &Path) -> DispatchResult<Child> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            // A just-written executable stays busy while another thread's fork
            // still holds its write descriptor.
            Err(error)
                if error.raw_os_error() == Some(nix::errno::Errno::ETXTBSY as i32)
                    && attempt < SPAWN_ATTEMPTS =>
            {
                attempt += 1;
                thread::sleep(POLL_INTERVAL);
            }
            Err(error) => return Err(DispatchError::execution("spawn", program, error)),
        }
    }
}

#[cfg(not(unix))]
fn spawn(command: &mut Command, program: &Path) -> DispatchResult<Child> {
    command
        .spawn()
        .map_err(|error| DispatchError::execution("spawn", program, error))
}

fn take_pipe<P>(pipe: Option<P>, operation: &'static str, program: &Path) -> DispatchResult<P> {
    pipe.ok_or_else(|| {
        DispatchError::execution(operation, program, io::Error::other("stream was not piped"))
    })
}

/// Child handle that kills and reaps the process if it is still running on drop.
struct RunningChild(Child);

impl Drop for RunningChild {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = terminate(&mut self.0);
        }
        let _ = self.0.wait();
    }
}

/// Kills the child's process group.
///
/// Must be called before the child is reaped; afterwards its pid may name an
/// unrelated process.
#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(errno) => {
            tracing::debug!(target: TARGET, %errno, "process group kill failed, killing child");
            child.kill()
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

fn wait_for_exit(
    child: &mut Child,
    cancel: &CancelToken,
    program: &Path,
) -> DispatchResult<ExitStatus> {
    poll_until_exit(child, cancel, program, Child::try_wait)
}

fn poll_until_exit(
    child: &mut Child,
    cancel: &CancelToken,
    program: &Path,
    mut poll: impl FnMut(&mut Child) -> io::Result<Option<ExitStatus>>,
) -> DispatchResult<ExitStatus> {
    loop {
        match poll(child) {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(error) => {
                // The readers only finish once every writer end is closed.
                let _ = terminate(child);
                let _ = child.wait();
                return Err(DispatchError::execution("wait", program, error));
            }
        }
        if cancel.is_cancelled() {
            if let Err(error) = terminate(child) {
                tracing::warn!(target: TARGET, %error, "failed to kill cancelled secure copy");
            }
            let _ = child.wait();
            tracing::info!(target: TARGET, program = %program.display(), "secure copy cancelled");
            return Err(DispatchError::execution(
                "run",
                program,
                io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Names of one output stream for error reporting.
struct Stream {
    read_operation: &'static str,
    forward_operation: &'static str,
}

const STDOUT: Stream = Stream {
    read_operation: "read stdout",
    forward_operation: "forward stdout",
};

const STDERR: Stream = Stream {
    read_operation: "read stderr",
    forward_operation: "forward stderr",
};

enum DrainFailure {
    Read(io::Error),
    Forward(io::Error),
}

/// Forwards every line of `pipe` to `sink` until end of stream.
///
/// A failing sink stops forwarding but reading continues, so the child never
/// blocks on a full pipe. A read failure ends the drain immediately.
fn drain(pipe: impl Read, sink: &dyn LineSink) -> Result<(), DrainFailure> {
    let mut reader = BufReader::new(pipe);
    let mut buffer = Vec::new();
    let mut forward_error = None;
    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .map_err(DrainFailure::Read)?;
        if read == 0 {
            break;
        }
        if forward_error.is_some() {
            continue;
        }
        let line = trim_line_ending(&buffer);
        if let Err(error) = sink.write_line(&String::from_utf8_lossy(line)) {
            forward_error = Some(error);
        }
    }
    forward_error.map_or(Ok(()), |error| Err(DrainFailure::Forward(error)))
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn join_reader(
    handle: thread::ScopedJoinHandle<'_, Result<(), DrainFailure>>,
) -> Result<(), DrainFailure> {
    handle
        .join()
        .unwrap_or_else(|_| Err(DrainFailure::Read(io::Error::other("output reader panicked"))))
}

fn check_drained(
    drained: Result<(), DrainFailure>,
    stream: Stream,
    program: &Path,
) -> DispatchResult<()> {
    match drained {
        Ok(()) => Ok(()),
        Err(DrainFailure::Read(error)) => {
            Err(DispatchError::execution(stream.read_operation, program, error))
        }
        Err(DrainFailure::Forward(error)) => Err(DispatchError::execution(
            stream.forward_operation,
            program,
            error,
        )),
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
