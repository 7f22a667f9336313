use serde::{Deserialize, Serialize};

use crate::chapter::PageRef;

/// An AI-identified visually illustratable moment within a chapter
/// (spec §3, GLOSSARY). Created by Analyze, annotated with an image path by
/// Illustrate, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConcept {
    pub id: String,
    pub chapter_index: u32,
    pub page_range: PageRef,
    pub source_quote: String,
    pub visual_description: String,
    pub generated_image_path: Option<String>,
}

impl SceneConcept {
    /// Stable id format `ch{N}_scene_{M}` (spec §3).
    pub fn make_id(chapter_index: u32, scene_number: u32) -> String {
        format!("ch{chapter_index}_scene_{scene_number}")
    }
}
