//! crates/dispatch/src/config.rs
//!
//! Immutable destination configuration.
//!
//! A [`TransferConfig`] describes one remote destination: where to copy to,
//! which key authenticates the copy, how remote host identities are verified
//! and which secure-copy executable runs the transfer. Values are built once
//! through [`TransferConfigBuilder`] (or loaded from TOML / an endpoint URI)
//! and never change afterwards.

mod file;
mod uri;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::error::{DispatchError, DispatchResult};
use crate::resources::{ResourceSet, resource_name};

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Default `ConnectTimeout` handed to the secure-copy tool, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u32 = 10;

/// Candidate locations of the secure-copy executable, probed in order.
pub const DEFAULT_EXECUTABLES: &[&str] = &["/usr/local/bin/scp", "/usr/bin/scp", "/bin/scp"];

/// Origin of the private key used to authenticate transfers.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    /// An existing key file, used in place.
    FilePath(PathBuf),
    /// Raw key material held in memory and written to a private temp file.
    InlineBytes(Zeroizing<Vec<u8>>),
    /// Name of a property or environment variable holding the key material.
    EnvVar(String),
}

impl KeySource {
    /// Shorthand for [`KeySource::FilePath`].
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::FilePath(path.into())
    }

    /// Shorthand for [`KeySource::InlineBytes`].
    pub fn inline(bytes: impl Into<Vec<u8>>) -> Self {
        Self::InlineBytes(Zeroizing::new(bytes.into()))
    }

    /// Shorthand for [`KeySource::EnvVar`].
    pub fn env(name: impl Into<String>) -> Self {
        Self::EnvVar(name.into())
    }

    /// Picks one source when several are supplied at once.
    ///
    /// An explicit file path always wins, then an environment reference, then
    /// inline bytes. Returns `None` when nothing was supplied.
    pub fn select(
        file: Option<PathBuf>,
        env: Option<String>,
        inline: Option<Vec<u8>>,
    ) -> Option<Self> {
        let supplied =
            usize::from(file.is_some()) + usize::from(env.is_some()) + usize::from(inline.is_some());
        let selected = file
            .map(Self::FilePath)
            .or_else(|| env.map(Self::EnvVar))
            .or_else(|| inline.map(Self::inline))?;
        if supplied > 1 {
            tracing::warn!(
                target: "scp_dispatch::config",
                selected = selected.kind(),
                "several private key sources configured; using the {} source",
                selected.kind()
            );
        }
        Some(selected)
    }

    /// Short label for diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FilePath(_) => "file",
            Self::InlineBytes(_) => "inline",
            Self::EnvVar(_) => "env",
        }
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FilePath(path) => f.debug_tuple("FilePath").field(path).finish(),
            Self::InlineBytes(bytes) => write!(f, "InlineBytes(<{} bytes>)", bytes.len()),
            Self::EnvVar(name) => f.debug_tuple("EnvVar").field(name).finish(),
        }
    }
}

/// Origin of the known-hosts file handed to the secure-copy tool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum KnownHostsSource {
    /// `~/.ssh/known_hosts` of the invoking user.
    UserDefault,
    /// A file path; values carrying the `classpath:` prefix name a resource.
    ExplicitPath(PathBuf),
    /// A bundled resource copied to a temp file.
    ClasspathResource(String),
    /// Host identities are not recorded (the null device).
    #[default]
    Disabled,
}

impl KnownHostsSource {
    /// Parses the single-string form used in configuration files and URIs.
    ///
    /// `classpath:NAME` selects a resource, `user-default` and `disabled`
    /// select the keyword variants, and anything else is a path.
    pub fn parse(value: &str) -> Self {
        if let Some(name) = resource_name(value) {
            return Self::ClasspathResource(name.to_owned());
        }
        match value {
            "user-default" => Self::UserDefault,
            "disabled" | "" => Self::Disabled,
            path => Self::ExplicitPath(PathBuf::from(path)),
        }
    }
}

/// Immutable description of one remote destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferConfig {
    remote_host: String,
    remote_user: String,
    remote_path: String,
    port: u16,
    key_source: KeySource,
    known_hosts: KnownHostsSource,
    strict_host_key_checking: bool,
    connect_timeout_secs: u32,
    executables: Vec<PathBuf>,
    properties: BTreeMap<String, String>,
    resources: ResourceSet,
}

impl TransferConfig {
    /// Starts building a configuration for `user@host:path`.
    pub fn builder(
        remote_host: impl Into<String>,
        remote_user: impl Into<String>,
        remote_path: impl Into<String>,
    ) -> TransferConfigBuilder {
        TransferConfigBuilder::new(remote_host, remote_user, remote_path)
    }

    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> DispatchResult<Self> {
        file::parse(text)
    }

    /// Loads a TOML configuration file.
    pub fn load(path: &Path) -> DispatchResult<Self> {
        file::load(path)
    }

    /// Parses an `scp://user@host:port/path?...` endpoint URI.
    pub fn from_uri(uri: &str) -> DispatchResult<Self> {
        uri::parse(uri)
    }

    /// Remote host name or address.
    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    /// Remote account name.
    pub fn remote_user(&self) -> &str {
        &self.remote_user
    }

    /// Remote directory receiving the files.
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Remote SSH port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Where the private key comes from.
    pub const fn key_source(&self) -> &KeySource {
        &self.key_source
    }

    /// Where the known-hosts file comes from.
    pub const fn known_hosts(&self) -> &KnownHostsSource {
        &self.known_hosts
    }

    /// Whether unknown or changed host keys abort the transfer.
    pub const fn strict_host_key_checking(&self) -> bool {
        self.strict_host_key_checking
    }

    /// `ConnectTimeout` in seconds.
    pub const fn connect_timeout_secs(&self) -> u32 {
        self.connect_timeout_secs
    }

    /// Secure-copy executable candidates, in probe order.
    pub fn executables(&self) -> &[PathBuf] {
        &self.executables
    }

    /// Named values consulted before the process environment.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Bundled resources available to `classpath:` references.
    pub const fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    /// Remote path a file called `file_name` lands at.
    ///
    /// Joins with a single `/`, so a remote path of `/` yields `/file_name`.
    /// An empty remote path leaves the name relative to the remote home
    /// directory.
    pub fn remote_file_path(&self, file_name: &str) -> String {
        if self.remote_path.is_empty() {
            return file_name.to_owned();
        }
        format!("{}/{file_name}", self.remote_path.trim_end_matches('/'))
    }

    /// Renders `host:path and port N` for diagnostics.
    pub fn describe_destination(&self) -> String {
        format!(
            "{}:{} and port {}",
            self.remote_host, self.remote_path, self.port
        )
    }
}

/// Validating builder for [`TransferConfig`].
#[derive(Clone, Debug)]
pub struct TransferConfigBuilder {
    remote_host: String,
    remote_user: String,
    remote_path: String,
    port: u16,
    key_source: Option<KeySource>,
    known_hosts: KnownHostsSource,
    strict_host_key_checking: bool,
    connect_timeout_secs: u32,
    executables: Vec<PathBuf>,
    properties: BTreeMap<String, String>,
    resources: ResourceSet,
}

impl TransferConfigBuilder {
    fn new(
        remote_host: impl Into<String>,
        remote_user: impl Into<String>,
        remote_path: impl Into<String>,
    ) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_user: remote_user.into(),
            remote_path: remote_path.into(),
            port: DEFAULT_PORT,
            key_source: None,
            known_hosts: KnownHostsSource::default(),
            strict_host_key_checking: false,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            executables: DEFAULT_EXECUTABLES.iter().map(PathBuf::from).collect(),
            properties: BTreeMap::new(),
            resources: ResourceSet::default(),
        }
    }

    /// Sets the remote SSH port.
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the private key source.
    pub fn key(mut self, source: KeySource) -> Self {
        self.key_source = Some(source);
        self
    }

    /// Sets the known-hosts source.
    pub fn known_hosts(mut self, source: KnownHostsSource) -> Self {
        self.known_hosts = source;
        self
    }

    /// Enables or disables strict host key checking.
    pub const fn strict_host_key_checking(mut self, enabled: bool) -> Self {
        self.strict_host_key_checking = enabled;
        self
    }

    /// Sets `ConnectTimeout` in seconds.
    pub const fn connect_timeout_secs(mut self, seconds: u32) -> Self {
        self.connect_timeout_secs = seconds;
        self
    }

    /// Replaces the executable candidate list.
    pub fn executables<I, P>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.executables = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a named property consulted before the process environment.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Sets the bundled resources.
    pub fn resources(mut self, resources: ResourceSet) -> Self {
        self.resources = resources;
        self
    }

    /// Validates the collected values.
    pub fn build(self) -> DispatchResult<TransferConfig> {
        validate_operand_part("remote host", &self.remote_host, &['@', '/'])?;
        validate_operand_part("remote user", &self.remote_user, &['@', ':'])?;
        if self.remote_path.chars().any(char::is_control) {
            return Err(DispatchError::configuration(
                "remote path must not contain control characters",
            ));
        }
        if self.port == 0 {
            return Err(DispatchError::configuration("port must be non-zero"));
        }
        if self.executables.is_empty() {
            return Err(DispatchError::configuration(
                "no secure-copy executable candidates configured",
            ));
        }
        let key_source = self
            .key_source
            .ok_or_else(|| DispatchError::configuration("no private key source configured"))?;

        Ok(TransferConfig {
            remote_host: self.remote_host,
            remote_user: self.remote_user,
            remote_path: self.remote_path,
            port: self.port,
            key_source,
            known_hosts: self.known_hosts,
            strict_host_key_checking: self.strict_host_key_checking,
            connect_timeout_secs: self.connect_timeout_secs,
            executables: self.executables,
            properties: self.properties,
            resources: self.resources,
        })
    }
}

/// Rejects values that would change the meaning of the destination operand.
///
/// A leading `-` turns the operand into an option of the secure-copy tool.
fn validate_operand_part(label: &str, value: &str, forbidden: &[char]) -> DispatchResult<()> {
    if value.is_empty() {
        return Err(DispatchError::configuration(format!("{label} is required")));
    }
    if value.starts_with('-') {
        return Err(DispatchError::configuration(format!(
            "{label} '{value}' must not start with '-'"
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || forbidden.contains(c))
    {
        return Err(DispatchError::configuration(format!(
            "{label} '{value}' contains invalid character {bad:?}"
        )));
    }
    Ok(())
}
