use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::KvBackend;
use crate::change::Ledger;
use crate::error::{HydrationError, StoreError};
use crate::registry::{KeyHandle, KeyRegistry};

/// What hydration does with a stored document that fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptPolicy {
    /// Return the parse error and stay unloaded
    Strict,
    /// Log and bind the initial value
    #[default]
    Fallback,
}

/// How writes triggered by updates reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// One independent task per write; completion order is not guaranteed
    #[default]
    Detached,
    /// A single writer task drains a queue, so writes land in update order
    Ordered,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    pub on_corrupt: CorruptPolicy,
    pub write_mode: WriteMode,
}

/// The bound value as consumers see it.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    /// Hydration has not finished; not the same thing as an empty value
    Unloaded,
    Loaded(T),
}

impl<T> LoadState<T> {
    pub fn as_loaded(&self) -> Option<&T> {
        match self {
            LoadState::Unloaded => None,
            LoadState::Loaded(value) => Some(value),
        }
    }
}

enum WriteJob {
    Write {
        json: String,
        ack: Option<oneshot::Sender<anyhow::Result<()>>>,
    },
    Flush(oneshot::Sender<()>),
}

enum Writer {
    Detached {
        pending: Mutex<Vec<JoinHandle<()>>>,
    },
    Ordered {
        queue: mpsc::UnboundedSender<WriteJob>,
    },
}

/// A value bound to one persistence key.
///
/// Reads come from memory. Every update replaces the in-memory value at once
/// and schedules a write of the full value in the background. Only one store
/// per key may exist at a time; the claim is released when the store drops.
pub struct Store<T> {
    handle: KeyHandle,
    backend: Arc<dyn KvBackend>,
    initial: T,
    options: StoreOptions,
    state: Mutex<LoadState<T>>,
    writer: Writer,
    runtime: Handle,
    failed_writes: Arc<AtomicU64>,
}

/// The store used by the application: a ledger of changes.
pub type LedgerStore = Store<Ledger>;

impl<T> Store<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Claim `key` and create an unloaded binding.
    ///
    /// Background writes are spawned onto the current tokio runtime, so this
    /// fails with [`StoreError::NoRuntime`] when called outside one.
    pub fn bind(
        registry: &KeyRegistry,
        backend: Arc<dyn KvBackend>,
        key: &str,
        initial: T,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let runtime =
            Handle::try_current().map_err(|err| StoreError::NoRuntime(key.to_string(), err))?;
        let handle = registry.acquire(key)?;
        let failed_writes = Arc::new(AtomicU64::new(0));

        let writer = match options.write_mode {
            WriteMode::Detached => Writer::Detached {
                pending: Mutex::new(Vec::new()),
            },
            WriteMode::Ordered => {
                let (queue, jobs) = mpsc::unbounded_channel();
                runtime.spawn(run_writer(
                    key.to_string(),
                    Arc::clone(&backend),
                    jobs,
                    Arc::clone(&failed_writes),
                ));
                Writer::Ordered { queue }
            }
        };

        Ok(Self {
            handle,
            backend,
            initial,
            options,
            state: Mutex::new(LoadState::Unloaded),
            writer,
            runtime,
            failed_writes,
        })
    }

    pub fn key(&self) -> &str {
        self.handle.key()
    }

    /// Load the stored document once.
    ///
    /// A missing or empty document, or a failed read, binds the initial value.
    /// If an update already happened, the updated value is kept and the
    /// stored document is ignored.
    pub async fn hydrate(&self) -> Result<(), HydrationError> {
        let stored = match self.backend.get(self.key()).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(key = self.key(), error = %err, "read failed, using initial value");
                None
            }
        };

        let loaded = match stored.as_deref() {
            None | Some("") => {
                debug!(key = self.key(), "nothing stored, using initial value");
                self.initial.clone()
            }
            Some(blob) => match serde_json::from_str::<T>(blob) {
                Ok(value) => value,
                Err(source) => match self.options.on_corrupt {
                    CorruptPolicy::Strict => {
                        return Err(HydrationError::Parse {
                            key: self.key().to_string(),
                            source,
                        })
                    }
                    CorruptPolicy::Fallback => {
                        warn!(key = self.key(), error = %source, "stored value is corrupt, using initial value");
                        self.initial.clone()
                    }
                },
            },
        };

        let mut state = self.state.lock();
        if state.as_loaded().is_none() {
            info!(key = self.key(), "hydrated");
            *state = LoadState::Loaded(loaded);
        } else {
            debug!(key = self.key(), "updated before hydration finished, keeping in-memory value");
        }

        Ok(())
    }

    pub fn state(&self) -> LoadState<T> {
        self.state.lock().clone()
    }

    /// Current value, or `None` while unloaded
    pub fn get(&self) -> Option<T> {
        self.state.lock().as_loaded().cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().as_loaded().is_some()
    }

    /// Replace the value
    pub fn set(&self, value: T) {
        self.update(move |_| value);
    }

    /// Replace the value with `f(latest)`, then write it in the background.
    ///
    /// `f` sees the latest in-memory value (the initial value while unloaded)
    /// and runs under the store's lock, so it must not call back into the store.
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(&T) -> T,
    {
        let mut state = self.state.lock();
        let next = match &*state {
            LoadState::Unloaded => f(&self.initial),
            LoadState::Loaded(prev) => f(prev),
        };
        *state = LoadState::Loaded(next.clone());

        // Scheduled while still locked so queued writes follow update order
        self.schedule_write(&next);
        next
    }

    /// Write `value` and wait for the backend to confirm.
    ///
    /// In ordered mode this goes through the queue behind any earlier writes.
    pub async fn persist(&self, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)
            .map_err(|err| StoreError::Serialize(self.key().to_string(), err))?;

        let result = match &self.writer {
            Writer::Detached { .. } => self.backend.set(self.key(), &json).await,
            Writer::Ordered { queue } => {
                let (ack, done) = oneshot::channel();
                let sent = queue.send(WriteJob::Write {
                    json,
                    ack: Some(ack),
                });
                match sent {
                    Ok(()) => done
                        .await
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("writer stopped"))),
                    Err(_) => Err(anyhow::anyhow!("writer stopped")),
                }
            }
        };

        result.map_err(|err| StoreError::Backend(self.key().to_string(), err))
    }

    /// Wait for every write scheduled so far to finish
    pub async fn flush(&self) {
        match &self.writer {
            Writer::Detached { pending } => {
                let handles: Vec<_> = std::mem::take(&mut *pending.lock());
                for handle in handles {
                    if let Err(err) = handle.await {
                        warn!(key = self.key(), error = %err, "write task aborted");
                    }
                }
            }
            Writer::Ordered { queue } => {
                let (ack, done) = oneshot::channel();
                if queue.send(WriteJob::Flush(ack)).is_ok() {
                    let _ = done.await;
                }
            }
        }
    }

    /// Flush outstanding writes and release the key
    pub async fn close(self) {
        self.flush().await;
        debug!(key = self.key(), "binding closed");
    }

    /// Background writes that failed. Update callers never see these errors.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    fn schedule_write(&self, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                warn!(key = self.key(), error = %err, "unable to serialize value, skipping write");
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        match &self.writer {
            Writer::Detached { pending } => {
                let backend = Arc::clone(&self.backend);
                let failed = Arc::clone(&self.failed_writes);
                let key = self.key().to_string();

                let task = self.runtime.spawn(async move {
                    if let Err(err) = backend.set(&key, &json).await {
                        warn!(key = %key, error = %err, "background write failed");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                });

                let mut pending = pending.lock();
                pending.retain(|task| !task.is_finished());
                pending.push(task);
            }
            Writer::Ordered { queue } => {
                if queue.send(WriteJob::Write { json, ack: None }).is_err() {
                    warn!(key = self.key(), "writer stopped, dropping write");
                    self.failed_writes.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

async fn run_writer(
    key: String,
    backend: Arc<dyn KvBackend>,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
    failed: Arc<AtomicU64>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            WriteJob::Write { json, ack } => {
                let result = backend.set(&key, &json).await;
                match ack {
                    Some(ack) => {
                        let _ = ack.send(result);
                    }
                    None => {
                        if let Err(err) = result {
                            warn!(key = %key, error = %err, "queued write failed");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
            WriteJob::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!(key = %key, "writer finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::change::{Change, NewChange};
    use crate::reducer::{reduce, Action};

    const KEY: &str = "state";

    fn bind(
        registry: &KeyRegistry,
        backend: &MemoryBackend,
        options: StoreOptions,
    ) -> LedgerStore {
        Store::bind(
            registry,
            Arc::new(backend.clone()),
            KEY,
            Vec::new(),
            options,
        )
        .unwrap()
    }

    fn strict() -> StoreOptions {
        StoreOptions {
            on_corrupt: CorruptPolicy::Strict,
            write_mode: WriteMode::Detached,
        }
    }

    fn ordered() -> StoreOptions {
        StoreOptions {
            on_corrupt: CorruptPolicy::Fallback,
            write_mode: WriteMode::Ordered,
        }
    }

    fn push(amount: f64, description: &str) -> Action {
        Action::Push {
            value: NewChange {
                amount,
                description: description.to_string(),
                time: "2024-01-01T00:00:00.000+00:00".to_string(),
            },
        }
    }

    fn stored(backend: &MemoryBackend) -> Vec<Change> {
        crate::change::from_json(&backend.peek(KEY).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_unloaded_until_hydrated() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();
        let store = bind(&registry, &backend, StoreOptions::default());

        assert_eq!(store.state(), LoadState::Unloaded);
        assert!(store.get().is_none());
        assert!(!store.is_loaded());

        store.hydrate().await.unwrap();

        // Loaded and empty is distinct from unloaded
        assert_eq!(store.state(), LoadState::Loaded(Vec::new()));
        assert!(store.is_loaded());
    }

    #[tokio::test]
    async fn test_hydrates_stored_ledger() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::with_value(
            KEY,
            r#"[{"amount":-30,"description":"food","time":"t2","id":2},{"amount":100,"description":"salary","time":"t1","id":1}]"#,
        );
        let store = bind(&registry, &backend, StoreOptions::default());

        store.hydrate().await.unwrap();

        let ledger = store.get().unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].id, 2);
        assert_eq!(ledger[1].description, "salary");
    }

    #[tokio::test]
    async fn test_empty_blob_uses_initial_value() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::with_value(KEY, "");
        let initial = vec![NewChange::now(1.0, "seed").with_id(1)];
        let store: LedgerStore = Store::bind(
            &registry,
            Arc::new(backend.clone()),
            KEY,
            initial.clone(),
            strict(),
        )
        .unwrap();

        store.hydrate().await.unwrap();

        assert_eq!(store.get(), Some(initial));
    }

    #[tokio::test]
    async fn test_corrupt_blob_strict_stays_unloaded() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::with_value(KEY, "{not json");
        let store = bind(&registry, &backend, strict());

        let err = store.hydrate().await.unwrap_err();

        assert!(matches!(err, HydrationError::Parse { ref key, .. } if key == KEY));
        assert_eq!(store.state(), LoadState::Unloaded);
    }

    #[tokio::test]
    async fn test_corrupt_blob_fallback_uses_initial_value() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::with_value(KEY, "{not json");
        let store = bind(&registry, &backend, StoreOptions::default());

        store.hydrate().await.unwrap();

        assert_eq!(store.get(), Some(Vec::new()));
        // The corrupt document is left alone until the next update
        assert_eq!(backend.peek(KEY).as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn test_read_failure_uses_initial_value() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::with_value(KEY, "[]");
        backend.fail_reads(true);
        let store = bind(&registry, &backend, strict());

        store.hydrate().await.unwrap();

        assert_eq!(store.get(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_update_before_hydration_wins() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::with_value(
            KEY,
            r#"[{"amount":5,"description":"old","time":"t","id":9}]"#,
        );
        let store = bind(&registry, &backend, StoreOptions::default());

        // Runs against the initial value since nothing is loaded yet
        store.update(|prev| reduce(prev, push(10.0, "early")));
        store.hydrate().await.unwrap();
        store.flush().await;

        let ledger = store.get().unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].id, 1);
        assert_eq!(ledger[0].description, "early");
        assert_eq!(stored(&backend), ledger);
    }

    #[tokio::test]
    async fn test_updates_are_written_to_backend() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();
        let store = bind(&registry, &backend, StoreOptions::default());
        store.hydrate().await.unwrap();

        store.update(|prev| reduce(prev, push(100.0, "salary")));
        let latest = store.update(|prev| reduce(prev, push(-30.0, "food")));
        store.flush().await;

        assert_eq!(latest.len(), 2);
        assert_eq!(store.get(), Some(latest));
        assert_eq!(backend.write_count(), 2);
        // Detached writes may land in either order
        assert!(!stored(&backend).is_empty());
    }

    #[tokio::test]
    async fn test_ordered_writes_leave_latest_value() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();
        let store = bind(&registry, &backend, ordered());
        store.hydrate().await.unwrap();

        for n in 0..20 {
            store.update(|prev| reduce(prev, push(n as f64, "step")));
        }
        store.update(|prev| reduce(prev, Action::Delete { id: 20 }));
        store.flush().await;

        assert_eq!(backend.write_count(), 21);
        assert_eq!(stored(&backend), store.get().unwrap());
        assert_eq!(stored(&backend).len(), 19);
    }

    #[tokio::test]
    async fn test_set_replaces_value() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();
        let store = bind(&registry, &backend, ordered());

        let ledger = reduce(&[], push(1.0, "a"));
        store.set(ledger.clone());
        store.flush().await;

        assert_eq!(store.get(), Some(ledger.clone()));
        assert_eq!(stored(&backend), ledger);
    }

    #[tokio::test]
    async fn test_failed_writes_are_counted_not_surfaced() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();
        backend.fail_writes(true);

        for options in [StoreOptions::default(), ordered()] {
            let store = bind(&registry, &backend, options);
            store.hydrate().await.unwrap();

            let next = store.update(|prev| reduce(prev, push(1.0, "lost")));
            store.flush().await;

            assert_eq!(next.len(), 1);
            assert_eq!(store.get(), Some(next));
            assert_eq!(store.failed_writes(), 1);
            store.close().await;
        }
        assert_eq!(backend.peek(KEY), None);
    }

    #[tokio::test]
    async fn test_persist_reports_backend_errors() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();

        for options in [strict(), ordered()] {
            let store = bind(&registry, &backend, options);
            let ledger = reduce(&[], push(3.0, "x"));

            backend.fail_writes(false);
            store.persist(&ledger).await.unwrap();
            assert_eq!(stored(&backend), ledger);

            backend.fail_writes(true);
            let err = store.persist(&Vec::new()).await.unwrap_err();
            assert!(matches!(err, StoreError::Backend(ref key, _) if key == KEY));

            store.close().await;
        }
    }

    #[tokio::test]
    async fn test_binding_is_exclusive_per_key() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();

        let first = bind(&registry, &backend, StoreOptions::default());
        let second: Result<LedgerStore, _> = Store::bind(
            &registry,
            Arc::new(backend.clone()),
            KEY,
            Vec::new(),
            StoreOptions::default(),
        );
        assert!(matches!(
            second,
            Err(StoreError::DuplicateBinding(ref err)) if err.key == KEY
        ));

        first.close().await;

        let third: Result<LedgerStore, _> = Store::bind(
            &registry,
            Arc::new(backend.clone()),
            KEY,
            Vec::new(),
            StoreOptions::default(),
        );
        assert!(third.is_ok());
    }

    #[test]
    fn test_bind_outside_runtime_is_an_error() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();

        let result: Result<LedgerStore, _> = Store::bind(
            &registry,
            Arc::new(backend),
            KEY,
            Vec::new(),
            StoreOptions::default(),
        );

        assert!(matches!(result, Err(StoreError::NoRuntime(ref key, _)) if key == KEY));
        // The key is not left claimed
        assert!(!registry.is_bound(KEY));
    }

    #[tokio::test]
    async fn test_nan_amount_survives_rebinding() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();

        let first = bind(&registry, &backend, ordered());
        first.hydrate().await.unwrap();
        first.update(|prev| reduce(prev, push(100.0, "salary")));
        first.update(|prev| reduce(prev, push(-30.0, "food")));
        first.update(|prev| reduce(prev, push(f64::NAN, "typo")));
        first.close().await;

        let second = bind(&registry, &backend, ordered());
        second.hydrate().await.unwrap();

        let ledger = second.get().unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.iter().map(|c| c.id).collect::<Vec<_>>(), vec![3, 2, 1]);
        assert!(ledger[0].amount.is_nan());
        assert_eq!(ledger[1].amount, -30.0);
        assert_eq!(ledger[2].amount, 100.0);
    }

    #[tokio::test]
    async fn test_rebinding_reads_what_was_written() {
        let registry = KeyRegistry::new();
        let backend = MemoryBackend::new();

        let first = bind(&registry, &backend, ordered());
        first.hydrate().await.unwrap();
        let written = first.update(|prev| reduce(prev, push(42.0, "kept")));
        first.close().await;

        let second = bind(&registry, &backend, ordered());
        second.hydrate().await.unwrap();
        assert_eq!(second.get(), Some(written));
    }
}
