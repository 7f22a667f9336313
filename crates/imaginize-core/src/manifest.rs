use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Per-phase index of chapter status sets (spec §3, GLOSSARY: Manifest).
/// Invariant: the union of the three sets equals all known chapter
/// indices; a chapter appears in exactly one set (spec property 4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub completed_chapters: BTreeSet<u32>,
    pub in_progress_chapters: BTreeSet<u32>,
    pub failed_chapters: BTreeSet<u32>,
}

impl Manifest {
    pub fn new() -> Self {
        Manifest::default()
    }

    /// Removes a chapter from whichever set currently holds it.
    fn clear_chapter(&mut self, chapter_index: u32) {
        self.completed_chapters.remove(&chapter_index);
        self.in_progress_chapters.remove(&chapter_index);
        self.failed_chapters.remove(&chapter_index);
    }

    pub fn mark_in_progress(&mut self, chapter_index: u32) {
        self.clear_chapter(chapter_index);
        self.in_progress_chapters.insert(chapter_index);
    }

    pub fn mark_completed(&mut self, chapter_index: u32) {
        self.clear_chapter(chapter_index);
        self.completed_chapters.insert(chapter_index);
    }

    pub fn mark_failed(&mut self, chapter_index: u32) {
        self.clear_chapter(chapter_index);
        self.failed_chapters.insert(chapter_index);
    }

    /// Resets a chapter to untracked (used by the `force` flag, spec §4.10).
    pub fn reset_chapter(&mut self, chapter_index: u32) {
        self.clear_chapter(chapter_index);
    }

    pub fn is_completed(&self, chapter_index: u32) -> bool {
        self.completed_chapters.contains(&chapter_index)
    }

    /// Checks the manifest's internal invariant: every chapter index
    /// appears in at most one set (spec property 4). Used by tests and by
    /// the controller's consistency check on resume.
    pub fn is_consistent(&self) -> bool {
        let sets = [
            &self.completed_chapters,
            &self.in_progress_chapters,
            &self.failed_chapters,
        ];
        let mut seen = BTreeSet::new();
        for set in sets {
            for idx in set {
                if !seen.insert(*idx) {
                    return false;
                }
            }
        }
        true
    }
}
