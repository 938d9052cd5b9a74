//! crates/dispatch/src/credentials.rs
//!
//! Turns a [`TransferConfig`] into concrete key and known-hosts paths.
//!
//! # Key sources
//!
//! | source | result |
//! |---|---|
//! | [`KeySource::FilePath`] | the configured file, used in place |
//! | [`KeySource::EnvVar`] | property or environment value copied to a `0400` temp file |
//! | [`KeySource::InlineBytes`] | the bytes copied to a `0400` temp file |
//!
//! # Known hosts
//!
//! | source | result |
//! |---|---|
//! | [`KnownHostsSource::Disabled`] | the null device |
//! | [`KnownHostsSource::ExplicitPath`] | the path, or a temp copy of the resource for `classpath:` values |
//! | [`KnownHostsSource::ClasspathResource`] | a temp copy of the resource |
//! | [`KnownHostsSource::UserDefault`] | `$HOME/.ssh/known_hosts`, not checked for existence |
//!
//! # Lifetime
//!
//! Temp files are owned by [`ResolvedCredentials`] and removed by
//! [`ResolvedCredentials::close`] or, silently, when the value is dropped.
//! [`CredentialCache`] resolves at most once per configuration and keeps the
//! result until [`CredentialCache::clear`].

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use tempfile::TempPath;
use zeroize::Zeroizing;

use crate::config::{KeySource, KnownHostsSource, TransferConfig};
use crate::error::{DispatchError, DispatchResult};
use crate::resources::resource_name;

/// Path handed to the secure-copy tool when host identities are not recorded.
#[cfg(unix)]
pub const NULL_DEVICE: &str = "/dev/null";

/// Path handed to the secure-copy tool when host identities are not recorded.
#[cfg(windows)]
pub const NULL_DEVICE: &str = "NUL";

/// Mode applied to key material written by the resolver.
#[cfg(unix)]
const OWNER_READ_ONLY: u32 = 0o400;

const TEMP_PREFIX: &str = "scp-dispatch-";

/// A resolved path that is either borrowed from configuration or a temp file
/// owned by the resolver.
enum CredentialPath {
    Configured(PathBuf),
    Temporary(TempPath),
}

impl CredentialPath {
    fn path(&self) -> &Path {
        match self {
            Self::Configured(path) => path,
            Self::Temporary(temp) => temp,
        }
    }

    const fn is_temp(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    fn close(self, role: &'static str) {
        let Self::Temporary(temp) = self else {
            return;
        };
        let path = temp.to_path_buf();
        match temp.close() {
            Ok(()) => tracing::debug!(
                target: "scp_dispatch::credentials",
                role,
                path = %path.display(),
                "removed temporary {role} file"
            ),
            Err(error) => tracing::warn!(
                target: "scp_dispatch::credentials",
                role,
                path = %path.display(),
                %error,
                "failed to remove temporary {role} file"
            ),
        }
    }
}

/// Filesystem-backed credentials derived from a [`TransferConfig`].
pub struct ResolvedCredentials {
    private_key: CredentialPath,
    known_hosts: CredentialPath,
}

impl ResolvedCredentials {
    /// Path passed to `-i`.
    pub fn private_key_path(&self) -> &Path {
        self.private_key.path()
    }

    /// Whether the key file was written by the resolver.
    pub const fn private_key_is_temp(&self) -> bool {
        self.private_key.is_temp()
    }

    /// Path passed as `UserKnownHostsFile`.
    pub fn known_hosts_path(&self) -> &Path {
        self.known_hosts.path()
    }

    /// Whether the known-hosts file was written by the resolver.
    pub const fn known_hosts_is_temp(&self) -> bool {
        self.known_hosts.is_temp()
    }

    /// Paths of every temp file owned by this value.
    pub fn temp_paths(&self) -> Vec<PathBuf> {
        [&self.private_key, &self.known_hosts]
            .into_iter()
            .filter(|entry| entry.is_temp())
            .map(|entry| entry.path().to_path_buf())
            .collect()
    }

    /// Removes owned temp files, logging rather than returning failures.
    pub fn close(self) {
        self.private_key.close("private key");
        self.known_hosts.close("known hosts");
    }
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("private_key_path", &self.private_key_path())
            .field("private_key_is_temp", &self.private_key_is_temp())
            .field("known_hosts_path", &self.known_hosts_path())
            .field("known_hosts_is_temp", &self.known_hosts_is_temp())
            .finish()
    }
}

/// Resolves key and known-hosts paths for `config`, writing temp files as needed.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(skip(config), fields(host = config.remote_host()))
)]
pub fn resolve(config: &TransferConfig) -> DispatchResult<ResolvedCredentials> {
    let private_key = resolve_private_key(config)?;
    let known_hosts = resolve_known_hosts(config)?;
    Ok(ResolvedCredentials {
        private_key,
        known_hosts,
    })
}

fn resolve_private_key(config: &TransferConfig) -> DispatchResult<CredentialPath> {
    match config.key_source() {
        KeySource::FilePath(path) => {
            let is_file = fs::metadata(path).is_ok_and(|metadata| metadata.is_file());
            if !is_file {
                return Err(DispatchError::configuration(format!(
                    "private key file not found: {} does not exist or is not a file",
                    path.display()
                )));
            }
            tracing::debug!(
                target: "scp_dispatch::credentials",
                path = %path.display(),
                "using configured private key file"
            );
            Ok(CredentialPath::Configured(path.clone()))
        }
        KeySource::EnvVar(name) => {
            let material = lookup_key_material(config, name).ok_or_else(|| {
                DispatchError::configuration(format!(
                    "referenced key material not found: neither property nor environment variable '{name}' is set"
                ))
            })?;
            if material.is_empty() {
                return Err(DispatchError::configuration(format!(
                    "referenced key material '{name}' is empty"
                )));
            }
            write_private_temp(".id", &material, "private key").map(CredentialPath::Temporary)
        }
        KeySource::InlineBytes(bytes) => {
            if bytes.is_empty() {
                return Err(DispatchError::configuration(
                    "inline private key material is empty",
                ));
            }
            write_private_temp(".id", bytes, "private key").map(CredentialPath::Temporary)
        }
    }
}

/// Looks `name` up in the configured properties, then in the environment.
fn lookup_key_material(config: &TransferConfig, name: &str) -> Option<Zeroizing<Vec<u8>>> {
    if let Some(value) = config.properties().get(name) {
        return Some(Zeroizing::new(value.as_bytes().to_vec()));
    }
    env::var_os(name).map(|value| Zeroizing::new(os_string_bytes(value)))
}

#[cfg(unix)]
fn os_string_bytes(value: OsString) -> Vec<u8> {
    use std::os::unix::ffi::OsStringExt;
    value.into_vec()
}

#[cfg(not(unix))]
fn os_string_bytes(value: OsString) -> Vec<u8> {
    value.to_string_lossy().into_owned().into_bytes()
}

fn resolve_known_hosts(config: &TransferConfig) -> DispatchResult<CredentialPath> {
    match config.known_hosts() {
        KnownHostsSource::Disabled => Ok(CredentialPath::Configured(PathBuf::from(NULL_DEVICE))),
        KnownHostsSource::ExplicitPath(path) => {
            match path.to_str().and_then(resource_name) {
                Some(name) => materialize_resource(config, name),
                None => {
                    tracing::info!(
                        target: "scp_dispatch::credentials",
                        path = %path.display(),
                        "using known hosts file"
                    );
                    Ok(CredentialPath::Configured(path.clone()))
                }
            }
        }
        KnownHostsSource::ClasspathResource(name) => materialize_resource(config, name),
        KnownHostsSource::UserDefault => {
            let home = home_dir().ok_or_else(|| {
                DispatchError::configuration("cannot determine the home directory of the current user")
            })?;
            Ok(CredentialPath::Configured(
                home.join(".ssh").join("known_hosts"),
            ))
        }
    }
}

fn materialize_resource(config: &TransferConfig, name: &str) -> DispatchResult<CredentialPath> {
    let bytes = config.resources().load(name)?;
    let temp = write_private_temp(".known_hosts", &bytes, "known hosts")?;
    tracing::info!(
        target: "scp_dispatch::credentials",
        resource = name,
        path = %temp.display(),
        "temporary known hosts file created"
    );
    Ok(CredentialPath::Temporary(temp))
}

/// Writes `bytes` to a fresh temp file and restricts it to owner-read-only.
fn write_private_temp(suffix: &str, bytes: &[u8], role: &'static str) -> DispatchResult<TempPath> {
    let temp_dir = env::temp_dir();
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(suffix)
        .tempfile()
        .map_err(|error| DispatchError::execution("create temporary file", &temp_dir, error))?;

    let written = file.write_all(bytes).and_then(|()| file.flush());
    let temp = file.into_temp_path();
    written.map_err(|error| DispatchError::execution("write temporary file", &temp, error))?;
    restrict_to_owner_read(&temp)
        .map_err(|error| DispatchError::execution("restrict permissions", &temp, error))?;

    tracing::debug!(
        target: "scp_dispatch::credentials",
        role,
        path = %temp.display(),
        bytes = bytes.len(),
        "wrote temporary {role} file"
    );
    Ok(temp)
}

#[cfg(unix)]
fn restrict_to_owner_read(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(OWNER_READ_ONLY))
}

#[cfg(not(unix))]
fn restrict_to_owner_read(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions)
}

fn home_dir() -> Option<PathBuf> {
    if let Some(home) = env::var_os("HOME").filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(home));
    }
    #[cfg(unix)]
    {
        nix::unistd::User::from_uid(nix::unistd::getuid())
            .ok()
            .flatten()
            .map(|user| user.dir)
    }
    #[cfg(not(unix))]
    {
        env::var_os("USERPROFILE").map(PathBuf::from)
    }
}

/// Resolves credentials once per configuration and shares the result.
///
/// Concurrent first callers serialise on the internal lock, so exactly one of
/// them writes temp files. Failed resolutions are not cached.
#[derive(Default)]
pub struct CredentialCache {
    slot: Mutex<Option<Arc<ResolvedCredentials>>>,
}

impl CredentialCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached credentials, resolving them on first use.
    pub fn get_or_resolve(
        &self,
        config: &TransferConfig,
    ) -> DispatchResult<Arc<ResolvedCredentials>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(credentials) = slot.as_ref() {
            return Ok(Arc::clone(credentials));
        }
        let credentials = Arc::new(resolve(config)?);
        *slot = Some(Arc::clone(&credentials));
        Ok(credentials)
    }

    /// Returns the cached credentials without resolving.
    pub fn get(&self) -> Option<Arc<ResolvedCredentials>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drops the cached credentials.
    ///
    /// Temp files are removed immediately when no transfer still holds the
    /// credentials; otherwise the last holder removes them on drop.
    pub fn clear(&self) {
        let cached = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(credentials) = cached else {
            return;
        };
        match Arc::try_unwrap(credentials) {
            Ok(credentials) => credentials.close(),
            Err(shared) => tracing::debug!(
                target: "scp_dispatch::credentials",
                holders = Arc::strong_count(&shared) - 1,
                "credentials still in use; temp files are removed when released"
            ),
        }
    }
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("resolved", &self.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests;
