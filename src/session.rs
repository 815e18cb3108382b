use tracing::{debug, info};

use crate::change::{balance, Ledger, NewChange};
use crate::error::{InputError, StoreError};
use crate::input::parse_amount;
use crate::reducer::{reduce, Action};
use crate::store::LedgerStore;

/// What the view layer talks to: the ledger, its balance, and the three actions.
///
/// Each action is reduced against the store's latest value and written back
/// through the store, which persists it in the background.
pub struct LedgerSession {
    store: LedgerStore,
}

impl LedgerSession {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Current changes, newest first. `None` until hydrated.
    pub fn changes(&self) -> Option<Ledger> {
        self.store.get()
    }

    /// Balance of the current changes. `None` until hydrated.
    pub fn balance(&self) -> Option<f64> {
        self.store.get().map(|changes| balance(&changes))
    }

    pub fn dispatch(&self, action: Action) -> Ledger {
        debug!(?action, "dispatch");
        self.store.update(|prev| reduce(prev, action))
    }

    /// Add a change stamped with the current time
    pub fn push(&self, amount: f64, description: impl Into<String>) -> Ledger {
        self.dispatch(Action::Push {
            value: NewChange::now(amount, description),
        })
    }

    /// Add a change from raw form input, rejecting amount text that is not a
    /// finite number before anything reaches the reducer.
    pub fn push_input(&self, amount_text: &str, description: &str) -> Result<Ledger, InputError> {
        let amount = parse_amount(amount_text)?;
        Ok(self.push(amount, description))
    }

    pub fn delete(&self, id: i64) -> Ledger {
        self.dispatch(Action::Delete { id })
    }

    pub fn reset(&self) -> Ledger {
        info!("ledger reset");
        self.dispatch(Action::Reset)
    }

    /// Write the current value and wait for the backend
    pub async fn persist(&self) -> Result<(), StoreError> {
        match self.store.get() {
            Some(changes) => self.store.persist(&changes).await,
            None => Ok(()),
        }
    }

    /// Flush pending writes and release the storage key
    pub async fn close(self) {
        self.store.close().await;
    }
}
