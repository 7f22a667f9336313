use std::path::{Path, PathBuf};
use std::time::Duration;

use imaginize_core::SeriesConfig;
use imaginize_store::{atomic_write, read_atomic, AtomicStoreError, FileLock};

use crate::catalog::Catalog;

const ELEMENTS_FILE: &str = ".elements-memory.json";
const SERIES_CONFIG_FILE: &str = ".imaginize.series.json";
const SERIES_MEMORY_FILE: &str = ".series-elements-memory.json";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum CatalogStoreError {
    #[error(transparent)]
    Atomic(#[from] AtomicStoreError),
    #[error("failed to (de)serialize {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn serde_err(path: &Path, source: serde_json::Error) -> CatalogStoreError {
    CatalogStoreError::Serde {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads the book-scoped Catalog, defaulting to empty if it has never
/// been written (spec §4.2: `loadElements`).
pub fn load_elements(book_dir: &Path) -> Result<Catalog, CatalogStoreError> {
    let path = book_dir.join(ELEMENTS_FILE);
    match read_atomic(&path)? {
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| serde_err(&path, e)),
        None => Ok(Catalog::new()),
    }
}

/// Persists the full Catalog snapshot atomically (spec §4.2: `setElements`).
pub fn set_elements(book_dir: &Path, catalog: &Catalog) -> Result<(), CatalogStoreError> {
    let path = book_dir.join(ELEMENTS_FILE);
    let bytes = serde_json::to_vec_pretty(catalog).map_err(|e| serde_err(&path, e))?;
    atomic_write(&path, &bytes)?;
    Ok(())
}

/// Runs `apply` against the current Catalog under the book's exclusive
/// elements-file lock, then persists the result. This is the only path
/// through which a worker mutates the on-disk Catalog (spec §4.10:
/// "single-writer at a time, enforced by C1 lock").
pub fn with_locked_catalog<T>(
    book_dir: &Path,
    apply: impl FnOnce(&mut Catalog) -> T,
) -> Result<T, CatalogStoreError> {
    let path = book_dir.join(ELEMENTS_FILE);
    let _lock = FileLock::acquire(&path, DEFAULT_LOCK_TIMEOUT)?;
    let mut catalog = load_elements(book_dir)?;
    let result = apply(&mut catalog);
    set_elements(book_dir, &catalog)?;
    Ok(result)
}

pub fn load_series_config(series_root: &Path) -> Result<Option<SeriesConfig>, CatalogStoreError> {
    let path = series_root.join(SERIES_CONFIG_FILE);
    match read_atomic(&path)? {
        Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| serde_err(&path, e)),
        None => Ok(None),
    }
}

pub fn save_series_config(series_root: &Path, config: &SeriesConfig) -> Result<(), CatalogStoreError> {
    let path = series_root.join(SERIES_CONFIG_FILE);
    let bytes = serde_json::to_vec_pretty(config).map_err(|e| serde_err(&path, e))?;
    atomic_write(&path, &bytes)?;
    Ok(())
}

/// SeriesMemory is Catalog-shaped (spec §3: "Catalog-shaped file at series
/// root, keyed by (type,name), with the same Entity shape"), so it reuses
/// `Catalog` directly rather than a parallel type.
pub fn load_series_memory(series_root: &Path) -> Result<Catalog, CatalogStoreError> {
    let path = series_root.join(SERIES_MEMORY_FILE);
    match read_atomic(&path)? {
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| serde_err(&path, e)),
        None => Ok(Catalog::new()),
    }
}

pub fn save_series_memory(series_root: &Path, memory: &Catalog) -> Result<(), CatalogStoreError> {
    let path = series_root.join(SERIES_MEMORY_FILE);
    let bytes = serde_json::to_vec_pretty(memory).map_err(|e| serde_err(&path, e))?;
    atomic_write(&path, &bytes)?;
    Ok(())
}

/// Exclusive read-modify-write over SeriesMemory (spec §4.11, §6:
/// "SeriesMemory: exclusive file lock across the bridge's read-modify-write").
pub fn with_locked_series_memory<T>(
    series_root: &Path,
    apply: impl FnOnce(&mut Catalog) -> T,
) -> Result<T, CatalogStoreError> {
    let path = series_root.join(SERIES_MEMORY_FILE);
    let _lock = FileLock::acquire(&path, DEFAULT_LOCK_TIMEOUT)?;
    let mut memory = load_series_memory(series_root)?;
    let result = apply(&mut memory);
    save_series_memory(series_root, &memory)?;
    Ok(result)
}

/// Async analogue of `with_locked_catalog` for callers that need to run
/// async work (typically AI resolver calls) while holding the lock. The
/// blocking lock-acquire/load/persist steps run on `spawn_blocking`
/// (spec §5: file-lock acquisition and atomic rename are the only
/// operations allowed to block), matching the `tokio::task::spawn_blocking`
/// pattern this workspace uses elsewhere for synchronous I/O inside async
/// code.
pub async fn with_locked_catalog_async<T, Fut>(
    book_dir: PathBuf,
    apply: impl FnOnce(Catalog) -> Fut,
) -> Result<T, CatalogStoreError>
where
    Fut: std::future::Future<Output = (Catalog, T)>,
{
    let dir = book_dir.clone();
    let (lock, catalog) = tokio::task::spawn_blocking(move || -> Result<(FileLock, Catalog), CatalogStoreError> {
        let path = dir.join(ELEMENTS_FILE);
        let lock = FileLock::acquire(&path, DEFAULT_LOCK_TIMEOUT)?;
        let catalog = load_elements(&dir)?;
        Ok((lock, catalog))
    })
    .await
    .expect("lock/load task panicked")?;

    let (catalog, result) = apply(catalog).await;

    let dir = book_dir.clone();
    tokio::task::spawn_blocking(move || set_elements(&dir, &catalog))
        .await
        .expect("persist task panicked")?;
    drop(lock);
    Ok(result)
}
