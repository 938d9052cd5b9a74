#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` is the command-line front-end of `scp-dispatch`. It loads one
//! destination (from a TOML file or an `scp://` URI), reads a payload from a
//! file or stdin and hands both to [`dispatch::Dispatcher`].
//!
//! # Design
//!
//! [`run`] accepts an argument iterator plus handles for standard output and
//! error so tests can drive it in-process. Parsing uses a `clap` builder with
//! the built-in help and version flags disabled in favour of [`HELP_TEXT`].
//!
//! # Exit codes
//!
//! | code | meaning |
//! |---|---|
//! | `0` | payload delivered; the remote path is printed on stdout |
//! | `1` | usage or configuration error, nothing was spawned |
//! | `11` | local I/O failure (payload, temp files, subprocess pipes) |
//! | `20` | transfer cancelled |
//! | other | exit code of the secure-copy tool, clamped to `1..=255` |
//!
//! # Examples
//!
//! ```
//! let mut stdout = Vec::new();
//! let mut stderr = Vec::new();
//! let exit_code = cli::run(["scp-dispatch", "--version"], &mut stdout, &mut stderr);
//!
//! assert_eq!(exit_code, 0);
//! assert!(String::from_utf8(stdout).unwrap().starts_with("scp-dispatch "));
//! ```

mod exit_code;
mod signal;

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, ArgGroup, Command, builder::OsStringValueParser};
use dispatch::{CancelToken, DispatchError, DispatchResult, Dispatcher, TransferConfig};
use logging::Verbosity;

pub use exit_code::{ExitCode, exit_code_for};
pub use signal::install_handlers as install_signal_handlers;

/// Program name used in diagnostics.
const PROGRAM: &str = "scp-dispatch";

/// Help text printed by `--help`.
pub const HELP_TEXT: &str = concat!(
    "scp-dispatch ",
    env!("CARGO_PKG_VERSION"),
    "\n",
    "\n",
    "Usage: scp-dispatch (--config FILE | --uri URI) [--input FILE|-] [--name NAME] [-v...]\n",
    "\n",
    "Copies one payload to a remote host with the system scp client and prints\n",
    "the remote path it was written to.\n",
    "\n",
    "Options:\n",
    "  -c, --config FILE  Load the destination from a TOML file.\n",
    "  -u, --uri URI      Use an scp://user@host:port/path?option=value destination.\n",
    "  -i, --input FILE   Read the payload from FILE ('-' for stdin, the default).\n",
    "  -n, --name NAME    Remote file name (defaults to the input file name).\n",
    "  -v, --verbose      Increase log detail; repeat for more.\n",
    "  -h, --help         Show this help message and exit.\n",
    "  -V, --version      Output version information and exit.\n",
    "\n",
    "SCP_DISPATCH_LOG accepts tracing filter directives and overrides -v.\n",
);

/// Parsed command line.
#[derive(Debug, Default)]
struct ParsedArgs {
    show_help: bool,
    show_version: bool,
    config: Option<PathBuf>,
    uri: Option<String>,
    input: Option<OsString>,
    name: Option<String>,
    verbose: u8,
}

/// Builds the `clap` command used for parsing.
fn clap_command() -> Command {
    Command::new(PROGRAM)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("help")
                .long("help")
                .short('h')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .short('V')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .value_parser(OsStringValueParser::new())
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("uri")
                .long("uri")
                .short('u')
                .value_name("URI")
                .action(ArgAction::Set),
        )
        .group(ArgGroup::new("destination").args(["config", "uri"]).multiple(false))
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .value_name("FILE")
                .value_parser(OsStringValueParser::new())
                .allow_hyphen_values(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .short('n')
                .value_name("NAME")
                .allow_hyphen_values(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count),
        )
}

fn parse_args<I, S>(arguments: I) -> Result<ParsedArgs, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut args: Vec<OsString> = arguments.into_iter().map(Into::into).collect();
    if args.is_empty() {
        args.push(OsString::from(PROGRAM));
    }

    let mut matches = clap_command().try_get_matches_from(args)?;
    Ok(ParsedArgs {
        show_help: matches.get_flag("help"),
        show_version: matches.get_flag("version"),
        config: matches.remove_one::<OsString>("config").map(PathBuf::from),
        uri: matches.remove_one::<String>("uri"),
        input: matches.remove_one::<OsString>("input"),
        name: matches.remove_one::<String>("name"),
        verbose: matches.get_count("verbose"),
    })
}

/// Runs the CLI with the given arguments and output handles.
///
/// Returns the process exit code; never panics on bad input.
pub fn run<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    match parse_args(arguments) {
        Ok(parsed) => execute(parsed, stdout, stderr),
        Err(error) => {
            let _ = write!(stderr, "{PROGRAM}: {error}");
            ExitCode::Usage.as_i32()
        }
    }
}

fn execute<Out, Err>(parsed: ParsedArgs, stdout: &mut Out, stderr: &mut Err) -> i32
where
    Out: Write,
    Err: Write,
{
    if parsed.show_help {
        let _ = stdout.write_all(HELP_TEXT.as_bytes());
        return ExitCode::Ok.as_i32();
    }
    if parsed.show_version {
        let _ = writeln!(stdout, "{PROGRAM} {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::Ok.as_i32();
    }

    // A subscriber installed by an embedding process stays in place.
    let _ = logging::init_tracing(Verbosity::from_verbose_level(parsed.verbose));

    match transfer(&parsed) {
        Ok(remote_path) => {
            if writeln!(stdout, "{remote_path}").is_err() {
                return ExitCode::FileIo.as_i32();
            }
            ExitCode::Ok.as_i32()
        }
        Err(error) => {
            let _ = writeln!(stderr, "{PROGRAM}: {error}");
            exit_code_for(&error)
        }
    }
}

fn transfer(parsed: &ParsedArgs) -> DispatchResult<String> {
    let config = load_config(parsed)?;
    let input = parsed.input.as_deref().filter(|input| *input != OsStr::new("-"));
    let name = destination_name(parsed.name.as_deref(), input.map(Path::new))?;

    tracing::debug!(
        target: "scp_dispatch::cli",
        host = config.remote_host(),
        name = %name,
        from_stdin = input.is_none(),
        "dispatching payload"
    );
    let dispatcher = Dispatcher::new(config);
    let cancel = CancelToken::new();
    let result = signal::cancel_on_signal(&cancel, || match input {
        Some(path) => {
            let file = File::open(path)
                .map_err(|error| DispatchError::execution("open input", path, error))?;
            dispatcher.dispatch_cancellable(file, &name, &cancel)
        }
        None => dispatcher.dispatch_cancellable(io::stdin().lock(), &name, &cancel),
    });
    dispatcher.shutdown();
    result.map(dispatch::TransferResult::into_remote_path)
}

fn load_config(parsed: &ParsedArgs) -> DispatchResult<TransferConfig> {
    match (&parsed.config, &parsed.uri) {
        (Some(path), _) => TransferConfig::load(path),
        (None, Some(uri)) => TransferConfig::from_uri(uri),
        (None, None) => Err(DispatchError::configuration(
            "a destination is required: pass --config FILE or --uri URI",
        )),
    }
}

fn destination_name(name: Option<&str>, input: Option<&Path>) -> DispatchResult<String> {
    if let Some(name) = name {
        return Ok(name.to_owned());
    }
    input
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            DispatchError::configuration("--name is required when the payload is read from stdin")
        })
}
