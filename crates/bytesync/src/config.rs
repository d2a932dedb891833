//! Server configuration.

use std::path::PathBuf;

use bytesync_sync::{DispatcherConfig, ReconcileConfig, DEFAULT_MAX_BLOCK_BYTES};

use crate::error::{BytesyncError, Result};

/// Path of the SQLite database; in-memory when unset.
pub const ENV_DATABASE_PATH: &str = "BYTESYNC_DATABASE_PATH";
/// `true`/`false`: reject claims whose hash differs from the server's.
pub const ENV_VERIFY_HASH: &str = "BYTESYNC_VERIFY_HASH";
/// Largest accepted block or info payload, in bytes.
pub const ENV_MAX_BLOCK_BYTES: &str = "BYTESYNC_MAX_BLOCK_BYTES";

/// Configuration for a [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// SQLite database file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    /// See [`ReconcileConfig::verify_hash`].
    pub verify_hash: bool,
    /// Largest accepted block or info payload, in bytes.
    pub max_block_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            verify_hash: true,
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
        }
    }
}

impl ServerConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides from `lookup`, falling back to defaults for absent keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup(ENV_VERIFY_HASH) {
            config.verify_hash = parse_bool(ENV_VERIFY_HASH, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_BLOCK_BYTES) {
            config.max_block_bytes = value.trim().parse().map_err(|e| {
                BytesyncError::Config(format!("{}={:?}: {}", ENV_MAX_BLOCK_BYTES, value, e))
            })?;
        }

        tracing::debug!(?config, "server configuration");
        Ok(config)
    }

    /// The dispatcher settings this configuration implies.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            reconcile: ReconcileConfig {
                verify_hash: self.verify_hash,
            },
            max_block_bytes: self.max_block_bytes,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BytesyncError::Config(format!(
            "{}={:?}: expected true or false",
            name, value
        ))),
    }
}
