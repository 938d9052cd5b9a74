#![deny(unsafe_code)]

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::{env, io, process::ExitCode};

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    if let Err(error) = cli::install_signal_handlers() {
        use std::io::Write as _;

        let _ = writeln!(stderr, "scp-dispatch: signal handlers not installed: {error}");
    }
    let status = cli::run(env::args_os(), &mut stdout, &mut stderr);
    ExitCode::from(u8::try_from(status).unwrap_or(u8::MAX))
}
