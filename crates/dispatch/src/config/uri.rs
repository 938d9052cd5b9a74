//! Endpoint URIs of the form `scp://user@host:port/remote/path?option=value`.
//!
//! Query options (all optional, later values override earlier ones):
//!
//! | option | meaning |
//! |---|---|
//! | `remoteUser`, `remotePath`, `port` | override the authority / path parts |
//! | `privateKeyFile`, `privateKeyEnv` | key source (file wins when both are given) |
//! | `knownHostsFile` | known-hosts source, `classpath:NAME` allowed |
//! | `useUserKnownHostsFile` | `true` selects `~/.ssh/known_hosts` when no file is given |
//! | `strictHostKeyChecking` | `yes` / `no` |
//! | `connectTimeout` | milliseconds, rounded down to whole seconds (minimum 1) |

use std::path::PathBuf;

use percent_encoding::percent_decode_str;
use url::Url;

use super::file::parse_yes_no;
use super::{KeySource, KnownHostsSource, TransferConfig};
use crate::error::{DispatchError, DispatchResult};

const SCHEME: &str = "scp";

pub(super) fn parse(text: &str) -> DispatchResult<TransferConfig> {
    let url = Url::parse(text)
        .map_err(|error| DispatchError::configuration(format!("invalid URI '{text}': {error}")))?;
    if url.scheme() != SCHEME {
        return Err(DispatchError::configuration(format!(
            "unsupported URI scheme '{}', expected '{SCHEME}'",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
        .unwrap_or_default()
        .to_owned();
    let mut user = decode(url.username())?;
    let mut path = decode(url.path())?;
    let mut port = url.port();

    let mut key_file = None;
    let mut key_env = None;
    let mut known_hosts_file = None;
    let mut use_user_known_hosts = false;
    let mut strict = None;
    let mut timeout_millis = None;

    for (name, value) in url.query_pairs() {
        let value = value.into_owned();
        match &*name {
            "remoteUser" => user = value,
            "remotePath" => path = value,
            "port" => port = Some(parse_number(&name, &value)?),
            "privateKeyFile" => key_file = Some(PathBuf::from(value)),
            "privateKeyEnv" => key_env = Some(value),
            "knownHostsFile" => known_hosts_file = Some(value),
            "useUserKnownHostsFile" => use_user_known_hosts = parse_yes_no(&value)?,
            "strictHostKeyChecking" => strict = Some(parse_yes_no(&value)?),
            "connectTimeout" => timeout_millis = Some(parse_number::<u64>(&name, &value)?),
            other => {
                return Err(DispatchError::configuration(format!(
                    "unknown URI option '{other}'"
                )));
            }
        }
    }

    let key = KeySource::select(key_file, key_env, None)
        .ok_or_else(|| DispatchError::configuration("no private key source configured"))?;
    let known_hosts = match known_hosts_file {
        Some(value) => KnownHostsSource::parse(&value),
        None if use_user_known_hosts => KnownHostsSource::UserDefault,
        None => KnownHostsSource::Disabled,
    };

    let mut builder = TransferConfig::builder(host, user, path)
        .key(key)
        .known_hosts(known_hosts);
    if let Some(port) = port {
        builder = builder.port(port);
    }
    if let Some(strict) = strict {
        builder = builder.strict_host_key_checking(strict);
    }
    if let Some(millis) = timeout_millis {
        let seconds = u32::try_from(millis / 1000).unwrap_or(u32::MAX).max(1);
        builder = builder.connect_timeout_secs(seconds);
    }
    builder.build()
}

fn decode(component: &str) -> DispatchResult<String> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| DispatchError::configuration(format!("'{component}' is not valid UTF-8")))
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> DispatchResult<T> {
    value.parse().map_err(|_| {
        DispatchError::configuration(format!("option '{name}' expects a number, found '{value}'"))
    })
}
