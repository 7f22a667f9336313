use std::path::PathBuf;

use crate::atomic::AtomicStoreError;

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error(transparent)]
    Atomic(#[from] AtomicStoreError),

    #[error("failed to (de)serialize {path:?}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StateStoreError {
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            StateStoreError::Atomic(AtomicStoreError::Io { .. })
                | StateStoreError::Atomic(AtomicStoreError::LockTimeout { .. })
        )
    }
}
