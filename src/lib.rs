// Balance Ledger - Core Library
// Exposes all modules for use in CLI, TUI, API server, and tests

pub mod backend;
pub mod change;
pub mod config;
pub mod error;
pub mod format;
pub mod input;
pub mod reducer;
pub mod registry;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use backend::{KvBackend, MemoryBackend, SqliteBackend};
pub use change::{balance, Change, Ledger, NewChange};
pub use config::Config;
pub use error::{DuplicateBindingError, HydrationError, InputError, StoreError};
pub use format::{format_amount, format_relative};
pub use input::{accepts_amount_input, parse_amount};
pub use reducer::{reduce, Action};
pub use registry::{KeyHandle, KeyRegistry};
pub use session::LedgerSession;
pub use store::{CorruptPolicy, LedgerStore, LoadState, Store, StoreOptions, WriteMode};

use anyhow::{Context, Result};
use std::sync::Arc;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Open the configured SQLite backend, bind the ledger key and hydrate it.
///
/// Must run inside a tokio runtime.
pub async fn open_session(config: &Config, registry: &KeyRegistry) -> Result<LedgerSession> {
    let backend = SqliteBackend::open(&config.db_path)?;
    let store = Store::bind(
        registry,
        Arc::new(backend),
        &config.key,
        Vec::new(),
        config.store_options(),
    )?;
    store
        .hydrate()
        .await
        .with_context(|| format!("Failed to load ledger from {:?}", config.db_path))?;

    Ok(LedgerSession::new(store))
}

/// Install the `tracing` subscriber used by the binaries.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
