//! Store configuration via `docstore.toml`
//!
//! A store is either in-memory (nothing touches disk, everything is lost on
//! drop) or persistent (mutations are appended to a commit log under
//! `storage_path` and replayed on the next open). The same struct carries
//! the bounded wait applied to every barrier the scenario harness builds.

use docstore_core::{DocStoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up by the CLI
pub const CONFIG_FILE_NAME: &str = "docstore.toml";

/// Barrier wait applied when the config file omits `barrier_timeout_ms`
pub const DEFAULT_BARRIER_TIMEOUT_MS: u64 = 10_000;

fn default_barrier_timeout_ms() -> Option<u64> {
    Some(DEFAULT_BARRIER_TIMEOUT_MS)
}

/// Store configuration loaded from `docstore.toml`.
///
/// # Example
///
/// ```toml
/// persistent = true
/// storage_path = "/var/lib/docstore"
/// barrier_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Keep a commit log on disk and replay it on open
    #[serde(default)]
    pub persistent: bool,
    /// Directory holding the commit log; required when `persistent`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
    /// Bound on every barrier wait, in milliseconds.
    /// `None` waits forever and is only reachable from code.
    #[serde(
        default = "default_barrier_timeout_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub barrier_timeout_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl StoreConfig {
    /// Ephemeral store with the default barrier timeout
    pub fn in_memory() -> Self {
        StoreConfig {
            persistent: false,
            storage_path: None,
            barrier_timeout_ms: default_barrier_timeout_ms(),
        }
    }

    /// Commit-log backed store rooted at `path`
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            persistent: true,
            storage_path: Some(path.into()),
            barrier_timeout_ms: default_barrier_timeout_ms(),
        }
    }

    /// Replace the barrier timeout
    ///
    /// Sub-millisecond remainders round up to the next millisecond.
    pub fn with_barrier_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.barrier_timeout_ms = timeout.map(|t| {
            let millis = t.as_nanos().div_ceil(1_000_000);
            u64::try_from(millis).unwrap_or(u64::MAX)
        });
        self
    }

    /// Bounded barrier wait, if any
    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout_ms.map(Duration::from_millis)
    }

    /// Check that the fields agree with each other
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when `persistent` has no `storage_path`, when a
    /// `storage_path` is given for an in-memory store, or when the barrier
    /// timeout is zero.
    pub fn validate(&self) -> Result<()> {
        match (self.persistent, &self.storage_path) {
            (true, None) => {
                return Err(DocStoreError::InvalidConfig(
                    "persistent store requires storage_path".to_string(),
                ))
            }
            (false, Some(path)) => {
                return Err(DocStoreError::InvalidConfig(format!(
                    "storage_path '{}' given but persistent = false",
                    path.display()
                )))
            }
            _ => {}
        }

        if self.barrier_timeout_ms == Some(0) {
            return Err(DocStoreError::InvalidConfig(
                "barrier_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Document store configuration
#
# persistent = false keeps everything in memory; nothing is written to disk.
# persistent = true appends every commit to <storage_path>/commits.log and
# replays it on the next open.
persistent = false
# storage_path = "./docstore-data"

# Upper bound on every barrier wait in the scenario harness (milliseconds).
barrier_timeout_ms = 10000
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `InvalidConfig` if it cannot be
    /// parsed or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            DocStoreError::InvalidConfig(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an unbounded barrier timeout, which TOML cannot
    /// express (an omitted key reads back as the default).
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if self.barrier_timeout_ms.is_none() {
            return Err(DocStoreError::InvalidConfig(
                "unbounded barrier timeout cannot be written to a config file".to_string(),
            ));
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DocStoreError::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
