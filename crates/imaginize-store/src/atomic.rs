use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::Rng;

#[derive(Debug, thiserror::Error)]
pub enum AtomicStoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lock timeout acquiring {path:?}")]
    LockTimeout { path: PathBuf },
}

fn io_err(path: &Path, source: std::io::Error) -> AtomicStoreError {
    AtomicStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `bytes` to `path` via write-temp-then-rename (spec §4.1). The
/// temp file is named `path.tmp.{pid}.{nanos}` so concurrent writers to the
/// same path never collide on the temp name. On rename failure the temp
/// file is removed rather than left as an orphan.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), AtomicStoreError> {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let tmp_path = path.with_extension(format!(
        "{}.tmp.{pid}.{nanos}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let write_result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(&tmp_path, e));
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(path, e));
    }

    Ok(())
}

/// Reads `path` in a single syscall so a reader observes either the
/// pre-write or post-write content, never a partial file (spec §4.1
/// invariant). Returns `None` if the file does not exist.
pub fn read_atomic(path: &Path) -> Result<Option<Vec<u8>>, AtomicStoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Exclusive lock on `path.lock`. Dropping the handle releases the lock.
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    fn lock_path_for(path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_os_string();
        s.push(".lock");
        PathBuf::from(s)
    }

    /// Stale-lock threshold: a lock file older than 5x the caller's
    /// timeout is reclaimable by the next acquirer, provided the pid
    /// recorded inside it is no longer live (spec §4.1).
    fn is_stale(lock_path: &Path, timeout: Duration) -> bool {
        let metadata = match std::fs::metadata(lock_path) {
            Ok(m) => m,
            Err(_) => return false,
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .unwrap_or(Duration::ZERO);
        if age < timeout.saturating_mul(5) {
            return false;
        }
        match std::fs::read_to_string(lock_path) {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(pid) => !pid_is_alive(pid),
                Err(_) => true,
            },
            Err(_) => true,
        }
    }

    /// Reclaims a stale lock, handling the lock-file-as-directory
    /// pathology by removing recursively (spec §4.1).
    fn reclaim(lock_path: &Path) -> std::io::Result<()> {
        let metadata = std::fs::symlink_metadata(lock_path)?;
        if metadata.is_dir() {
            std::fs::remove_dir_all(lock_path)
        } else {
            std::fs::remove_file(lock_path)
        }
    }

    /// Acquires an exclusive lock on `path`, polling with 50-200ms jitter
    /// until `timeout` elapses (spec §4.1).
    pub fn acquire(path: &Path, timeout: Duration) -> Result<FileLock, AtomicStoreError> {
        let lock_path = Self::lock_path_for(path);
        let deadline = Instant::now() + timeout;
        let pid = std::process::id();

        loop {
            if let Some(parent) = lock_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut f) => {
                    let _ = f.write_all(pid.to_string().as_bytes());
                    return Ok(FileLock { lock_path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(&lock_path, timeout) {
                        tracing::warn!(path = %lock_path.display(), "reclaiming stale lock");
                        if Self::reclaim(&lock_path).is_ok() {
                            continue;
                        }
                    }
                    if Instant::now() >= deadline {
                        return Err(AtomicStoreError::LockTimeout {
                            path: path.to_path_buf(),
                        });
                    }
                    let jitter_ms = rand::thread_rng().gen_range(50..=200);
                    std::thread::sleep(Duration::from_millis(jitter_ms));
                }
                Err(e) => return Err(io_err(&lock_path, e)),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_is_alive(pid: u32) -> bool {
    // Conservative: assume alive when liveness cannot be determined, so we
    // never reclaim a lock out from under a live process on other OSes.
    let _ = pid;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_then_read_atomic_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        atomic_write(&path, b"{\"a\":1}").unwrap();
        let read = read_atomic(&path).unwrap().unwrap();
        assert_eq!(read, b"{\"a\":1}");
    }

    #[test]
    fn read_atomic_missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(read_atomic(&path).unwrap().is_none());
    }

    #[test]
    fn atomic_write_overwrites_cleanly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(read_atomic(&path).unwrap().unwrap(), b"second");
        // no leftover temp files
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn lock_is_exclusive_and_releases_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let lock = FileLock::acquire(&path, Duration::from_millis(200)).unwrap();
        let second = FileLock::acquire(&path, Duration::from_millis(100));
        assert!(second.is_err());
        drop(lock);
        let third = FileLock::acquire(&path, Duration::from_millis(200));
        assert!(third.is_ok());
    }

    #[test]
    fn stale_lock_with_dead_pid_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let lock_path = path.with_extension("json.lock");
        std::fs::write(&lock_path, b"999999999").unwrap();
        // a short timeout keeps the 5x staleness threshold (50ms) within
        // reach of a real (but brief) sleep, rather than faking mtime.
        std::thread::sleep(Duration::from_millis(60));
        let lock = FileLock::acquire(&path, Duration::from_millis(10));
        assert!(lock.is_ok());
    }

    #[test]
    fn stale_lock_as_directory_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let lock_path = path.with_extension("json.lock");
        std::fs::create_dir_all(&lock_path).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        let lock = FileLock::acquire(&path, Duration::from_millis(10));
        assert!(lock.is_ok());
    }
}
