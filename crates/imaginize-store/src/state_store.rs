use std::path::{Path, PathBuf};
use std::time::Duration;

use imaginize_core::{BookState, ChapterShard, Manifest, Phase};

use crate::atomic::{atomic_write, read_atomic, FileLock};
use crate::error::StateStoreError;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Typed, book-scoped persistence (spec §4.2). Never exposes raw file
/// handles; every operation goes through `imaginize_store::atomic`.
pub struct StateStore {
    book_dir: PathBuf,
}

impl StateStore {
    pub fn new(book_dir: impl Into<PathBuf>) -> Self {
        StateStore {
            book_dir: book_dir.into(),
        }
    }

    fn book_state_path(&self) -> PathBuf {
        self.book_dir.join(".imaginize.state.json")
    }

    fn phase_dir(&self, phase: Phase) -> PathBuf {
        self.book_dir.join(phase.state_dir_name())
    }

    fn shard_path(&self, phase: Phase, index: u32) -> PathBuf {
        self.phase_dir(phase).join(format!("chapter_{index}.json"))
    }

    fn manifest_path(&self, phase: Phase) -> PathBuf {
        self.phase_dir(phase).join("manifest.json")
    }

    pub fn load_book_state(&self) -> Result<Option<BookState>, StateStoreError> {
        let path = self.book_state_path();
        match read_atomic(&path)? {
            Some(bytes) => {
                let state = serde_json::from_slice(&bytes)
                    .map_err(|source| StateStoreError::Serde { path, source })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Called only at phase boundaries, per spec §4.2.
    pub fn save_book_state(&self, state: &BookState) -> Result<(), StateStoreError> {
        let path = self.book_state_path();
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|source| StateStoreError::Serde { path: path.clone(), source })?;
        atomic_write(&path, &bytes)?;
        Ok(())
    }

    pub fn write_chapter_shard(
        &self,
        phase: Phase,
        shard: &ChapterShard,
    ) -> Result<(), StateStoreError> {
        let path = self.shard_path(phase, shard.chapter_index);
        let bytes = serde_json::to_vec_pretty(shard)
            .map_err(|source| StateStoreError::Serde { path: path.clone(), source })?;
        atomic_write(&path, &bytes)?;
        Ok(())
    }

    pub fn read_chapter_shard(
        &self,
        phase: Phase,
        index: u32,
    ) -> Result<Option<ChapterShard>, StateStoreError> {
        let path = self.shard_path(phase, index);
        match read_atomic(&path)? {
            Some(bytes) => {
                let shard = serde_json::from_slice(&bytes)
                    .map_err(|source| StateStoreError::Serde { path, source })?;
                Ok(Some(shard))
            }
            None => Ok(None),
        }
    }

    /// Acquires the manifest lock, reads, applies `apply`, writes, and
    /// releases (spec §4.2). `apply` receives the current manifest (or a
    /// fresh default on first use) and mutates it in place.
    pub fn update_manifest(
        &self,
        phase: Phase,
        apply: impl FnOnce(&mut Manifest),
    ) -> Result<Manifest, StateStoreError> {
        let path = self.manifest_path(phase);
        let _lock = FileLock::acquire(&path, DEFAULT_LOCK_TIMEOUT)?;
        let mut manifest = match read_atomic(&path)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| StateStoreError::Serde { path: path.clone(), source })?,
            None => Manifest::new(),
        };
        apply(&mut manifest);
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|source| StateStoreError::Serde { path: path.clone(), source })?;
        atomic_write(&path, &bytes)?;
        Ok(manifest)
    }

    pub fn load_manifest(&self, phase: Phase) -> Result<Manifest, StateStoreError> {
        let path = self.manifest_path(phase);
        match read_atomic(&path)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)
                .map_err(|source| StateStoreError::Serde { path, source })?),
            None => Ok(Manifest::new()),
        }
    }

    pub fn book_dir(&self) -> &Path {
        &self.book_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imaginize_core::Status;
    use tempfile::tempdir;

    #[test]
    fn book_state_round_trips() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load_book_state().unwrap().is_none());

        let state = BookState::new("My Book".into(), 100);
        store.save_book_state(&state).unwrap();
        let loaded = store.load_book_state().unwrap().unwrap();
        assert_eq!(loaded.book_title, "My Book");
    }

    #[test]
    fn chapter_shard_round_trips_per_phase() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let shard = ChapterShard::pending(1, "Chapter One".into());
        store.write_chapter_shard(Phase::Analyze, &shard).unwrap();

        let loaded = store
            .read_chapter_shard(Phase::Analyze, 1)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.title, "Chapter One");
        assert_eq!(loaded.status, Status::Pending);

        // Extract phase has its own shard namespace.
        assert!(store.read_chapter_shard(Phase::Extract, 1).unwrap().is_none());
    }

    #[test]
    fn update_manifest_applies_under_lock() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store
            .update_manifest(Phase::Analyze, |m| m.mark_completed(1))
            .unwrap();
        store
            .update_manifest(Phase::Analyze, |m| m.mark_completed(2))
            .unwrap();

        let manifest = store.load_manifest(Phase::Analyze).unwrap();
        assert!(manifest.is_completed(1));
        assert!(manifest.is_completed(2));
    }
}
