use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Key-value storage for serialized documents, scoped to this application.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Stored document for `key`, or `None` if nothing was ever written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the document for `key`
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

// ============================================================================
// SQLite backend
// ============================================================================

/// Documents stored in a single SQLite table.
/// Statements run on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored keys
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count)
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery (in-memory databases silently keep "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

#[async_trait]
impl KvBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = conn.lock();
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()
                .with_context(|| format!("Failed to read key {:?}", key))?;
            Ok(value)
        })
        .await
        .context("Storage read task failed")?
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();
        let value = value.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock();
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("Failed to write key {:?}", key))?;
            debug!(key = %key, bytes = value.len(), "document written");
            Ok(())
        })
        .await
        .context("Storage write task failed")?
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local backend. Failures can be switched on to exercise error paths.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    data: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with one document
    pub fn with_value(key: &str, value: &str) -> Self {
        let backend = Self::new();
        backend.insert(key, value);
        backend
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.inner
            .data
            .lock()
            .insert(key.to_string(), value.to_string());
    }

    /// Current document without going through the async interface
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.data.lock().get(key).cloned()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("read of {:?} refused", key));
        }
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("write of {:?} refused", key));
        }
        self.insert(key, value);
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
