//! Turns SIGINT, SIGTERM and SIGHUP into transfer cancellation.
//!
//! The secure-copy child runs in its own process group, so terminal signals
//! reach only this process. The handlers set an atomic flag; a watcher thread
//! polls it and fires the transfer's [`CancelToken`], which kills the child's
//! whole group.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use dispatch::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

static SIGNALLED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn record_signal(_signal: nix::libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Installs handlers for SIGINT, SIGTERM and SIGHUP.
///
/// Until installed, those signals terminate the process with their default
/// action and a running secure copy is left to finish on its own. Call once
/// from `main`; embedding applications that manage signals themselves should
/// cancel through [`dispatch::CancelToken`] instead.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn install_handlers() -> io::Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    let action = SigAction::new(
        SigHandler::Handler(record_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: the handler only stores to an atomic.
        unsafe { sigaction(signal, &action) }.map_err(io::Error::from)?;
    }
    Ok(())
}

/// Installs nothing; cancellation relies on the default signal actions.
#[cfg(not(unix))]
pub fn install_handlers() -> io::Result<()> {
    Ok(())
}

/// Runs `body`, cancelling `cancel` if a handled signal arrives meanwhile.
pub(crate) fn cancel_on_signal<T>(cancel: &CancelToken, body: impl FnOnce() -> T) -> T {
    cancel_on_flag(&SIGNALLED, cancel, body)
}

fn cancel_on_flag<T>(flag: &AtomicBool, cancel: &CancelToken, body: impl FnOnce() -> T) -> T {
    struct Finished<'a>(&'a AtomicBool);

    impl Drop for Finished<'_> {
        fn drop(&mut self) {
            self.0.store(true, Ordering::Release);
        }
    }

    let finished = AtomicBool::new(false);
    thread::scope(|scope| {
        scope.spawn(|| {
            while !finished.load(Ordering::Acquire) {
                if flag.load(Ordering::SeqCst) {
                    cancel.cancel();
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }
        });
        let _finished = Finished(&finished);
        body()
    })
}
