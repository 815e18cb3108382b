use thiserror::Error;

/// A second binding was requested for a key that is still bound.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("storage key {key:?} is already bound; release the existing binding first")]
pub struct DuplicateBindingError {
    pub key: String,
}

#[derive(Debug, Error)]
pub enum HydrationError {
    #[error("stored value for key {key:?} is not a valid document")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    DuplicateBinding(#[from] DuplicateBindingError),

    #[error(transparent)]
    Hydration(#[from] HydrationError),

    #[error("binding key {0:?} needs a running tokio runtime")]
    NoRuntime(String, #[source] tokio::runtime::TryCurrentError),

    #[error("unable to serialize value for key {0:?}")]
    Serialize(String, #[source] serde_json::Error),

    #[error("backend write failed for key {0:?}")]
    Backend(String, #[source] anyhow::Error),
}

/// Raw amount text that cannot become a ledger amount.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("amount is empty")]
    EmptyAmount,

    #[error("amount {0:?} is not a finite number")]
    InvalidAmount(String),
}
