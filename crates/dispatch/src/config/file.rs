//! TOML configuration files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{KeySource, KnownHostsSource, TransferConfig};
use crate::error::{DispatchError, DispatchResult};
use crate::resources::ResourceSet;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    remote_host: String,
    remote_user: String,
    remote_path: String,
    port: Option<u16>,
    strict_host_key_checking: Option<YesNo>,
    connect_timeout_secs: Option<u32>,
    executables: Option<Vec<PathBuf>>,
    #[serde(default)]
    resource_dirs: Vec<PathBuf>,
    #[serde(default)]
    key: KeyTable,
    known_hosts: Option<KnownHostsTable>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyTable {
    file: Option<PathBuf>,
    env: Option<String>,
    inline: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KnownHostsTable {
    source: String,
}

/// Accepts `true`/`false` as well as the `"yes"`/`"no"` spelling used by ssh.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YesNo {
    Bool(bool),
    Word(String),
}

impl YesNo {
    fn into_bool(self) -> DispatchResult<bool> {
        match self {
            Self::Bool(value) => Ok(value),
            Self::Word(word) => parse_yes_no(&word),
        }
    }
}

pub(super) fn parse_yes_no(word: &str) -> DispatchResult<bool> {
    match word.to_ascii_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(DispatchError::configuration(format!(
            "expected yes or no, found '{word}'"
        ))),
    }
}

pub(super) fn load(path: &Path) -> DispatchResult<TransferConfig> {
    let text = fs::read_to_string(path)
        .map_err(|error| DispatchError::execution("read configuration", path, error))?;
    parse(&text).map_err(|error| match error {
        DispatchError::Configuration(message) => {
            DispatchError::configuration(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

pub(super) fn parse(text: &str) -> DispatchResult<TransferConfig> {
    let file: ConfigFile = toml::from_str(text)
        .map_err(|error| DispatchError::configuration(format!("invalid configuration: {error}")))?;

    let key = KeySource::select(
        file.key.file,
        file.key.env,
        file.key.inline.map(String::into_bytes),
    )
    .ok_or_else(|| DispatchError::configuration("no private key source configured"))?;

    let mut resources = ResourceSet::new();
    for directory in file.resource_dirs {
        resources = resources.with_directory(directory);
    }

    let mut builder = TransferConfig::builder(file.remote_host, file.remote_user, file.remote_path)
        .key(key)
        .resources(resources);
    if let Some(port) = file.port {
        builder = builder.port(port);
    }
    if let Some(strict) = file.strict_host_key_checking {
        builder = builder.strict_host_key_checking(strict.into_bool()?);
    }
    if let Some(seconds) = file.connect_timeout_secs {
        builder = builder.connect_timeout_secs(seconds);
    }
    if let Some(executables) = file.executables {
        builder = builder.executables(executables);
    }
    if let Some(known_hosts) = file.known_hosts {
        builder = builder.known_hosts(KnownHostsSource::parse(&known_hosts.source));
    }
    for (name, value) in file.properties {
        builder = builder.property(name, value);
    }
    builder.build()
}
