//! crates/dispatch/src/resources.rs
//!
//! Named, bundled resources referenced from configuration as `classpath:NAME`.
//!
//! Resources come from two places, consulted in order:
//!
//! 1. blobs registered by the embedding application, usually through
//!    `include_bytes!`;
//! 2. regular files found by joining `NAME` onto each configured resource
//!    directory.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{DispatchError, DispatchResult};

/// Prefix marking a configuration value as a bundled resource reference.
pub const RESOURCE_PREFIX: &str = "classpath:";

/// Returns the resource name when `value` uses the `classpath:` form.
///
/// A single leading `/` after the prefix is ignored, so `classpath:/known_hosts`
/// and `classpath:known_hosts` name the same resource.
pub fn resource_name(value: &str) -> Option<&str> {
    value
        .strip_prefix(RESOURCE_PREFIX)
        .map(|name| name.strip_prefix('/').unwrap_or(name))
}

/// Lookup table for bundled resources.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResourceSet {
    embedded: BTreeMap<String, &'static [u8]>,
    directories: Vec<PathBuf>,
}

impl ResourceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an in-binary resource under `name`.
    pub fn with_embedded(mut self, name: impl Into<String>, bytes: &'static [u8]) -> Self {
        self.embedded.insert(name.into(), bytes);
        self
    }

    /// Appends a directory searched for resources not registered in-binary.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directories.push(directory.into());
        self
    }

    /// Directories searched by [`load`](Self::load), in order.
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Reports whether no resources or directories are configured.
    pub fn is_empty(&self) -> bool {
        self.embedded.is_empty() && self.directories.is_empty()
    }

    /// Returns the bytes of the resource called `name`.
    ///
    /// Names must be relative and may not contain `..` components; the
    /// lookup never leaves the configured directories.
    pub fn load(&self, name: &str) -> DispatchResult<Vec<u8>> {
        if let Some(bytes) = self.embedded.get(name) {
            return Ok(bytes.to_vec());
        }

        let relative = Path::new(name);
        if name.is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(DispatchError::configuration(format!(
                "invalid resource name '{name}'"
            )));
        }

        for directory in &self.directories {
            let candidate = directory.join(relative);
            match fs::read(&candidate) {
                Ok(bytes) => return Ok(bytes),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) if error.kind() == io::ErrorKind::IsADirectory => {}
                Err(error) => {
                    return Err(DispatchError::execution(
                        "read resource",
                        &candidate,
                        error,
                    ));
                }
            }
        }

        if self.is_empty() {
            return Err(DispatchError::configuration(format!(
                "resource '{name}' not found: no resources or resource directories are configured"
            )));
        }
        Err(DispatchError::configuration(format!(
            "resource '{name}' not found"
        )))
    }
}

impl fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSet")
            .field("embedded", &self.embedded.keys().collect::<Vec<_>>())
            .field("directories", &self.directories)
            .finish()
    }
}
