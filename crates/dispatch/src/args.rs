//! crates/dispatch/src/args.rs
//!
//! Assembles the secure-copy argument vector.
//!
//! The order is fixed:
//!
//! ```text
//! -P <port> -i <key> -o "ConnectTimeout <s>" -o "StrictHostKeyChecking yes|no"
//!     -o "UserKnownHostsFile <path>" <staged source> <user>@<host>:<quoted remote path>
//! ```
//!
//! The remote path is the only component derived from request data (the
//! destination file name). The remote side hands it to a shell, so it is
//! quoted for POSIX word splitting before it is appended to the operand.

use std::ffi::OsString;
use std::path::Path;

use crate::config::TransferConfig;
use crate::credentials::ResolvedCredentials;

/// Builds the argument vector for one transfer.
pub fn build(
    config: &TransferConfig,
    credentials: &ResolvedCredentials,
    staged_source: &Path,
    file_name: &str,
) -> Vec<OsString> {
    let mut args = Vec::with_capacity(12);
    args.push(OsString::from("-P"));
    args.push(OsString::from(config.port().to_string()));
    args.push(OsString::from("-i"));
    args.push(credentials.private_key_path().as_os_str().to_os_string());
    args.push(OsString::from("-o"));
    args.push(OsString::from(format!(
        "ConnectTimeout {}",
        config.connect_timeout_secs()
    )));
    args.push(OsString::from("-o"));
    args.push(OsString::from(format!(
        "StrictHostKeyChecking {}",
        yes_no(config.strict_host_key_checking())
    )));
    args.push(OsString::from("-o"));
    args.push(known_hosts_option(credentials.known_hosts_path()));
    args.push(staged_source.as_os_str().to_os_string());
    args.push(OsString::from(destination_operand(config, file_name)));
    args
}

/// Renders `user@host:path` with the remote path quoted for the remote shell.
///
/// IPv6 literals are wrapped in brackets so the host/path separator stays
/// unambiguous.
pub fn destination_operand(config: &TransferConfig, file_name: &str) -> String {
    format!(
        "{}@{}:{}",
        config.remote_user(),
        bracket_ipv6(config.remote_host()),
        shell_quote(&config.remote_file_path(file_name))
    )
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn known_hosts_option(path: &Path) -> OsString {
    let mut option = OsString::from("UserKnownHostsFile ");
    let rendered = path.as_os_str();
    // ssh splits this option's value on whitespace unless it is double-quoted.
    if rendered.to_string_lossy().contains(char::is_whitespace) {
        option.push("\"");
        option.push(rendered);
        option.push("\"");
    } else {
        option.push(rendered);
    }
    option
}

fn bracket_ipv6(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    }
}

/// Quotes `s` so a POSIX shell reads it back as exactly one word.
///
/// Values made only of characters the shell never interprets are returned
/// unchanged; anything else is wrapped in single quotes, with embedded single
/// quotes written as `'\''`.
///
/// This matches the legacy scp protocol, where the remote shell splits the
/// target path. An OpenSSH client running in SFTP mode keeps the quotes
/// literally; such installations need `-O` in a wrapper script.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.' | ':' | '=' | '+' | ',' | '@')
        })
    {
        return s.to_owned();
    }

    let mut result = String::with_capacity(s.len() + 2);
    result.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            result.push_str("'\\''");
        } else {
            result.push(ch);
        }
    }
    result.push('\'');
    result
}
