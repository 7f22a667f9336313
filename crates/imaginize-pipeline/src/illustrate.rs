use std::path::PathBuf;
use std::sync::Arc;

use imaginize_ai::AiProvider;
use imaginize_catalog::Catalog;
use imaginize_core::{ChapterSpec, EntityType, Phase, SceneConcept, Status};
use imaginize_scheduler::Scheduler;
use imaginize_store::{atomic_write, StateStore, StateStoreError};
use regex::Regex;

use crate::events::{EventBus, EventKind};
use crate::filename::scene_image_filename;

const CHAPTERS_MARKDOWN_FILE: &str = "Chapters.md";

const STOP_WORDS: &[&str] = &[
    "The", "A", "An", "And", "But", "Or", "In", "On", "At", "To", "For", "Of", "With", "As", "By",
    "Chapter", "He", "She", "It", "They", "His", "Her", "Their", "This", "That",
];

#[derive(Debug, Clone)]
pub struct IllustrateConfig {
    pub image_size: String,
    pub chapter_title_slugs: bool,
}

/// Produces one image per `SceneConcept` (spec §4.9, component C9).
#[derive(Clone)]
pub struct IllustratePhase {
    pub book_dir: PathBuf,
    pub state_store: Arc<StateStore>,
    pub scheduler: Arc<Scheduler>,
    pub ai: Arc<dyn AiProvider>,
    pub events: Arc<EventBus>,
    pub config: IllustrateConfig,
}

impl IllustratePhase {
    pub async fn run(&self, chapters: &[ChapterSpec]) -> Result<(), IllustrateError> {
        let extract_state = self.state_store.load_book_state()?;
        let extract_completed = extract_state.map(|s| s.phase_completed(Phase::Extract)).unwrap_or(false);
        if !extract_completed {
            return Err(IllustrateError::PrerequisiteMissing(
                "Illustrate requires Extract completed".to_string(),
            ));
        }

        let _ = self.events.emit(&self.book_dir, EventKind::PhaseStart { phase: Phase::Illustrate });

        let catalog = imaginize_catalog::load_elements(&self.book_dir)?;

        for chapter in chapters {
            let Some(analyze_shard) = self.state_store.read_chapter_shard(Phase::Analyze, chapter.index)? else {
                continue;
            };
            if analyze_shard.status != Status::Completed {
                continue;
            }

            // The Illustrate shard is its own phase-scoped record, seeded
            // from Analyze's scene list the first time this chapter is
            // illustrated. On resume we keep reading and writing this
            // shard (never Analyze's) so each scene's
            // `generated_image_path` — and therefore the skip check in
            // `run_one_scene` — survives across runs.
            let mut shard = match self.state_store.read_chapter_shard(Phase::Illustrate, chapter.index)? {
                Some(existing) => existing,
                None => imaginize_core::ChapterShard {
                    chapter_index: analyze_shard.chapter_index,
                    title: analyze_shard.title.clone(),
                    status: Status::InProgress,
                    scene_concepts: analyze_shard.scene_concepts.clone(),
                    entities_mentioned: analyze_shard.entities_mentioned.clone(),
                    tokens_used: analyze_shard.tokens_used,
                    completed_at: None,
                    error: None,
                },
            };

            self.state_store.update_manifest(Phase::Illustrate, |m| m.mark_in_progress(chapter.index))?;

            let slug = self.config.chapter_title_slugs.then(|| chapter.title.as_str());
            let mut any_scene_failed = false;
            for scene in &mut shard.scene_concepts {
                if !self.run_one_scene(scene, &catalog, chapter.index, slug).await {
                    any_scene_failed = true;
                }
            }

            shard.status = if any_scene_failed { Status::Failed } else { Status::Completed };
            shard.completed_at = (!any_scene_failed).then(chrono::Utc::now);
            self.state_store.write_chapter_shard(Phase::Illustrate, &shard)?;
            if any_scene_failed {
                self.state_store.update_manifest(Phase::Illustrate, |m| m.mark_failed(chapter.index))?;
            } else {
                self.state_store.update_manifest(Phase::Illustrate, |m| m.mark_completed(chapter.index))?;
            }
        }

        let markdown = render_chapters_markdown(self.state_store.as_ref(), chapters)?;
        atomic_write(&self.book_dir.join(CHAPTERS_MARKDOWN_FILE), markdown.as_bytes())?;

        if let Some(mut state) = self.state_store.load_book_state()? {
            state.mark_phase_completed(Phase::Illustrate);
            self.state_store.save_book_state(&state)?;
        }

        let _ = self.events.emit(&self.book_dir, EventKind::PhaseComplete { phase: Phase::Illustrate });
        Ok(())
    }

    /// Returns true if the scene has a generated image once this call
    /// returns — either it already did (resume skip) or generation just
    /// succeeded — and false only on an actual failure.
    async fn run_one_scene(
        &self,
        scene: &mut SceneConcept,
        catalog: &Catalog,
        chapter_index: u32,
        chapter_title_slug: Option<&str>,
    ) -> bool {
        if scene.generated_image_path.is_some() {
            return true;
        }

        let prompt = enrich_prompt(scene, catalog);
        let size = self.config.image_size.clone();
        let ai = self.ai.clone();
        let prompt_for_call = prompt.clone();

        let result = self
            .scheduler
            .run(move || {
                let ai = ai.clone();
                let prompt = prompt_for_call.clone();
                let size = size.clone();
                async move { ai.generate_image(&prompt, &size).await }
            })
            .await;

        match result {
            Ok(bytes) => {
                let (index, scene_number) = parse_scene_id(&scene.id);
                let filename = scene_image_filename(chapter_index, chapter_title_slug, scene_number.unwrap_or(index));
                let path = self.book_dir.join(&filename);
                match atomic_write(&path, &bytes) {
                    Ok(()) => {
                        scene.generated_image_path = Some(filename);
                        let _ = self.events.emit(
                            &self.book_dir,
                            EventKind::ImageComplete { chapter_index, scene_id: scene.id.clone() },
                        );
                        true
                    }
                    Err(err) => {
                        tracing::error!(scene = %scene.id, error = %err, "failed to write generated image");
                        false
                    }
                }
            }
            Err(err) => {
                tracing::error!(scene = %scene.id, error = %err, "image generation exhausted retries");
                false
            }
        }
    }
}

/// Extracts the `M` from a `ch{N}_scene_{M}` id (spec §3).
fn parse_scene_id(id: &str) -> (u32, Option<u32>) {
    let scene_number = id.rsplit('_').next().and_then(|s| s.parse::<u32>().ok());
    (0, scene_number)
}

/// Spec §4.9 step 1: find capitalized-token-sequence entity mentions in
/// the scene's visual description and source quote, look each up by
/// alias, and append matched descriptions as supplementary context.
fn enrich_prompt(scene: &SceneConcept, catalog: &Catalog) -> String {
    let mut prompt = scene.visual_description.clone();

    let mentions = extract_capitalized_mentions(&scene.visual_description)
        .into_iter()
        .chain(extract_capitalized_mentions(&scene.source_quote));

    let mut appended = std::collections::BTreeSet::new();
    for mention in mentions {
        for entity_type in [
            EntityType::Character,
            EntityType::Creature,
            EntityType::Place,
            EntityType::Item,
            EntityType::Object,
        ] {
            if let Some(entity) = catalog.find_by_alias(entity_type, &mention) {
                if appended.insert(entity.name.clone()) {
                    let header = match entity_type {
                        EntityType::Character | EntityType::Creature => "Character details",
                        EntityType::Place => "Place details",
                        EntityType::Item | EntityType::Object => "Object details",
                    };
                    prompt.push_str(&format!("\n\n{header}: {} — {}", entity.name, entity.description));
                }
            }
        }
    }

    prompt
}

/// Cheap syntactic heuristic: consecutive capitalized-word runs, minus a
/// small stop-word list (spec §4.9 step 1).
fn extract_capitalized_mentions(text: &str) -> Vec<String> {
    let re = Regex::new(r"\b([A-Z][a-zA-Z']*(?:\s+[A-Z][a-zA-Z']*)*)\b").expect("static regex is valid");
    re.find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|m| !STOP_WORDS.contains(&m.as_str()))
        .collect()
}

fn render_chapters_markdown(store: &StateStore, chapters: &[ChapterSpec]) -> Result<String, StateStoreError> {
    let mut out = String::new();
    out.push_str("# Chapters\n\n");

    for chapter in chapters {
        out.push_str(&format!("## {}\n\n", chapter.title));
        // Prefer the Illustrate shard (carries `generated_image_path`);
        // fall back to Analyze's for chapters Illustrate never reached.
        let shard = match store.read_chapter_shard(Phase::Illustrate, chapter.index)? {
            Some(shard) => Some(shard),
            None => store.read_chapter_shard(Phase::Analyze, chapter.index)?,
        };
        let Some(shard) = shard else {
            continue;
        };
        for scene in &shard.scene_concepts {
            out.push_str(&format!("> {}\n\n", scene.source_quote));
            out.push_str(&format!("{}\n\n", scene.visual_description));
            if let Some(image_path) = &scene.generated_image_path {
                out.push_str(&format!("![{}]({})\n\n", scene.id, image_path));
            }
        }
    }

    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum IllustrateError {
    #[error("{0}")]
    PrerequisiteMissing(String),
    #[error(transparent)]
    State(#[from] StateStoreError),
    #[error(transparent)]
    Catalog(#[from] imaginize_catalog::CatalogStoreError),
    #[error(transparent)]
    Atomic(#[from] imaginize_store::AtomicStoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use imaginize_core::{Entity, FirstAppearance};

    fn scene(id: &str, visual: &str, quote: &str) -> SceneConcept {
        SceneConcept {
            id: id.to_string(),
            chapter_index: 1,
            page_range: imaginize_core::PageRef::Single(1),
            source_quote: quote.to_string(),
            visual_description: visual.to_string(),
            generated_image_path: None,
        }
    }

    #[test]
    fn extracts_capitalized_mentions_and_skips_stop_words() {
        let mentions = extract_capitalized_mentions("The Jon Snow walked with Ghost near Winterfell.");
        assert!(mentions.iter().any(|m| m == "Jon Snow"));
        assert!(mentions.iter().any(|m| m == "Ghost"));
        assert!(mentions.iter().any(|m| m == "Winterfell"));
        assert!(!mentions.iter().any(|m| m == "The"));
    }

    #[test]
    fn enrich_prompt_appends_matched_entity_details() {
        let mut catalog = Catalog::new();
        catalog.insert_new(Entity::new(
            EntityType::Character,
            "Jon Snow".into(),
            "a man of the Night's Watch".into(),
            FirstAppearance { book_id: "book-a".into(), chapter_index: 1 },
        ));

        let scene = scene("ch1_scene_1", "Jon Snow stands atop the Wall.", "He looked north.");
        let prompt = enrich_prompt(&scene, &catalog);
        assert!(prompt.contains("Character details"));
        assert!(prompt.contains("Night's Watch"));
    }

    #[test]
    fn enrich_prompt_is_unchanged_with_no_catalog_matches() {
        let catalog = Catalog::new();
        let scene = scene("ch1_scene_1", "A quiet morning.", "nothing notable");
        assert_eq!(enrich_prompt(&scene, &catalog), "A quiet morning.");
    }

    #[test]
    fn parse_scene_id_extracts_scene_number() {
        assert_eq!(parse_scene_id("ch3_scene_2").1, Some(2));
    }
}
