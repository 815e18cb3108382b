use std::path::PathBuf;
use tracing::warn;

use crate::store::{CorruptPolicy, StoreOptions, WriteMode};

/// Runtime configuration, read from `LEDGER_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite file holding the stored documents
    pub db_path: PathBuf,
    /// Storage key the ledger is bound to
    pub key: String,
    /// Listen address for the HTTP server
    pub addr: String,
    pub on_corrupt: CorruptPolicy,
    pub write_mode: WriteMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("ledger.db"),
            key: "state".to_string(),
            addr: "0.0.0.0:3000".to_string(),
            on_corrupt: CorruptPolicy::Fallback,
            write_mode: WriteMode::Ordered,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or unreadable values keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("LEDGER_DB") {
            config.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("LEDGER_KEY") {
            if !v.is_empty() {
                config.key = v;
            }
        }
        if let Some(v) = lookup("LEDGER_ADDR") {
            config.addr = v;
        }
        if let Some(v) = lookup("LEDGER_ON_CORRUPT") {
            match v.to_ascii_lowercase().as_str() {
                "strict" => config.on_corrupt = CorruptPolicy::Strict,
                "fallback" => config.on_corrupt = CorruptPolicy::Fallback,
                other => warn!(value = other, "unknown LEDGER_ON_CORRUPT, keeping default"),
            }
        }
        if let Some(v) = lookup("LEDGER_WRITE_MODE") {
            match v.to_ascii_lowercase().as_str() {
                "detached" => config.write_mode = WriteMode::Detached,
                "ordered" => config.write_mode = WriteMode::Ordered,
                other => warn!(value = other, "unknown LEDGER_WRITE_MODE, keeping default"),
            }
        }

        config
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            on_corrupt: self.on_corrupt,
            write_mode: self.write_mode,
        }
    }
}
