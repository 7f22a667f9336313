use std::path::PathBuf;
use std::sync::Arc;

use imaginize_core::{ChapterSpec, Phase};
use imaginize_store::{StateStore, StateStoreError};

use crate::analyze::AnalyzePhase;
use crate::extract::{ExtractError, ExtractPhase};
use crate::illustrate::{IllustrateError, IllustratePhase};
use crate::series_bridge::SeriesBridge;

/// Drives the three phases end-to-end for one book, enforcing phase
/// gating and resuming from on-disk state (spec §4.10, component C10).
pub struct PipelineController {
    pub book_dir: PathBuf,
    pub state_store: Arc<StateStore>,
    pub analyze: AnalyzePhase,
    pub extract: ExtractPhase,
    pub illustrate: IllustratePhase,
    pub series_bridge: Option<SeriesBridge>,
}

impl PipelineController {
    /// Runs Analyze, then Extract, then Illustrate, stopping at the first
    /// phase that hard-fails (spec §4.10's state machine: any phase may
    /// transition to `failed`, which halts the chain).
    pub async fn run_full(&self, chapters: &[ChapterSpec]) -> Result<(), ControllerError> {
        self.run_analyze(chapters).await?;
        self.run_extract(chapters).await?;
        self.run_illustrate(chapters).await?;
        Ok(())
    }

    pub async fn run_analyze(&self, chapters: &[ChapterSpec]) -> Result<(), ControllerError> {
        self.ensure_book_state_exists()?;

        if let Some(bridge) = &self.series_bridge {
            bridge.import_into_book(&self.book_dir).await;
        }

        let outcome = self.analyze.run(chapters).await?;
        if outcome.any_failed && !self.analyze.config.continue_on_failure {
            return Err(ControllerError::PhaseFailed(Phase::Analyze));
        }
        Ok(())
    }

    pub async fn run_extract(&self, chapters: &[ChapterSpec]) -> Result<(), ControllerError> {
        self.require_phase_completed_or_any_chapter(Phase::Analyze)?;
        self.extract.run(chapters).await?;

        if let Some(bridge) = &self.series_bridge {
            bridge.export_from_book(&self.book_dir).await;
        }
        Ok(())
    }

    pub async fn run_illustrate(&self, chapters: &[ChapterSpec]) -> Result<(), ControllerError> {
        self.require_phase_completed(Phase::Extract)?;
        self.illustrate.run(chapters).await?;
        Ok(())
    }

    fn ensure_book_state_exists(&self) -> Result<(), ControllerError> {
        if self.state_store.load_book_state()?.is_none() {
            let state = imaginize_core::BookState::new(String::new(), 0);
            self.state_store.save_book_state(&state)?;
        }
        Ok(())
    }

    /// Extract's prerequisite (spec §4.10): at least one completed
    /// Analyze chapter, not necessarily the whole phase.
    fn require_phase_completed_or_any_chapter(&self, phase: Phase) -> Result<(), ControllerError> {
        let manifest = self.state_store.load_manifest(phase)?;
        if manifest.completed_chapters.is_empty() {
            return Err(ControllerError::MissingPrerequisite(format!(
                "{} requires at least one completed chapter in phase {}",
                Phase::Extract.as_str(),
                phase.as_str()
            )));
        }
        Ok(())
    }

    fn require_phase_completed(&self, phase: Phase) -> Result<(), ControllerError> {
        let state = self.state_store.load_book_state()?;
        let completed = state.map(|s| s.phase_completed(phase)).unwrap_or(false);
        if !completed {
            return Err(ControllerError::MissingPrerequisite(format!(
                "{} must be completed before {} can run",
                phase.as_str(),
                Phase::Illustrate.as_str()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("{0}")]
    MissingPrerequisite(String),
    #[error("phase {0:?} failed")]
    PhaseFailed(Phase),
    #[error(transparent)]
    State(#[from] StateStoreError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Illustrate(#[from] IllustrateError),
}

impl ControllerError {
    /// Exit code mapping per spec §6, reusing `ImaginizeError`'s taxonomy.
    pub fn exit_code(&self) -> i32 {
        match self {
            ControllerError::MissingPrerequisite(_) => 3,
            ControllerError::PhaseFailed(_) => 5,
            ControllerError::State(_) => 5,
            ControllerError::Extract(ExtractError::PrerequisiteMissing(_)) => 3,
            ControllerError::Extract(_) => 5,
            ControllerError::Illustrate(IllustrateError::PrerequisiteMissing(_)) => 3,
            ControllerError::Illustrate(_) => 5,
        }
    }
}
