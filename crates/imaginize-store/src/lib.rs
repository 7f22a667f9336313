pub mod atomic;
pub mod error;
pub mod state_store;

pub use atomic::{atomic_write, read_atomic, AtomicStoreError, FileLock};
pub use error::StateStoreError;
pub use state_store::StateStore;
