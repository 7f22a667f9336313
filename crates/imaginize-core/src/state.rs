use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Status;
use crate::scene::SceneConcept;

/// One of the three pipeline phases (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Analyze,
    Extract,
    Illustrate,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Analyze => "analyze",
            Phase::Extract => "extract",
            Phase::Illustrate => "illustrate",
        }
    }

    /// Directory name for this phase's shard/manifest directory
    /// (`.{phase}.state/`, spec §6).
    pub fn state_dir_name(&self) -> String {
        format!(".{}.state", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: Option<Status>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseState {
    pub fn pending() -> Self {
        PhaseState {
            status: Some(Status::Pending),
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasesState {
    pub analyze: PhaseState,
    pub extract: PhaseState,
    pub illustrate: PhaseState,
}

impl Default for PhasesState {
    fn default() -> Self {
        PhasesState {
            analyze: PhaseState::pending(),
            extract: PhaseState::pending(),
            illustrate: PhaseState::pending(),
        }
    }
}

impl PhasesState {
    pub fn get(&self, phase: Phase) -> &PhaseState {
        match phase {
            Phase::Analyze => &self.analyze,
            Phase::Extract => &self.extract,
            Phase::Illustrate => &self.illustrate,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut PhaseState {
        match phase {
            Phase::Analyze => &mut self.analyze,
            Phase::Extract => &mut self.extract,
            Phase::Illustrate => &mut self.illustrate,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenStats {
    pub total_used: u64,
}

/// Global per-book state (spec §3, §6). Updated only at phase boundaries,
/// never per-chapter — per-chapter progress lives in `ChapterShard`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookState {
    pub version: String,
    pub book_title: String,
    pub total_pages: u32,
    pub phases: PhasesState,
    pub token_stats: TokenStats,
    pub last_updated: DateTime<Utc>,
}

impl BookState {
    pub fn new(book_title: String, total_pages: u32) -> Self {
        BookState {
            version: "1".to_string(),
            book_title,
            total_pages,
            phases: PhasesState::default(),
            token_stats: TokenStats::default(),
            last_updated: Utc::now(),
        }
    }

    pub fn mark_phase_completed(&mut self, phase: Phase) {
        let entry = self.phases.get_mut(phase);
        entry.status = Some(Status::Completed);
        entry.completed_at = Some(Utc::now());
        self.last_updated = Utc::now();
    }

    pub fn mark_phase_failed(&mut self, phase: Phase) {
        let entry = self.phases.get_mut(phase);
        entry.status = Some(Status::Failed);
        self.last_updated = Utc::now();
    }

    pub fn mark_phase_in_progress(&mut self, phase: Phase) {
        let entry = self.phases.get_mut(phase);
        entry.status = Some(Status::InProgress);
        self.last_updated = Utc::now();
    }

    pub fn phase_completed(&self, phase: Phase) -> bool {
        self.phases.get(phase).status == Some(Status::Completed)
    }
}

/// Per-chapter file owned by exactly one phase (spec §3, GLOSSARY: Shard).
/// One file per chapter eliminates write contention on the global state
/// file — readers never need the catalog lock to inspect chapter progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterShard {
    pub chapter_index: u32,
    pub title: String,
    pub status: Status,
    pub scene_concepts: Vec<SceneConcept>,
    pub entities_mentioned: Vec<String>,
    pub tokens_used: u64,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ChapterShard {
    pub fn pending(chapter_index: u32, title: String) -> Self {
        ChapterShard {
            chapter_index,
            title,
            status: Status::Pending,
            scene_concepts: Vec::new(),
            entities_mentioned: Vec::new(),
            tokens_used: 0,
            completed_at: None,
            error: None,
        }
    }
}
