use std::path::Path;
use std::sync::Arc;

use imaginize_ai::AiProvider;
use imaginize_catalog::{with_locked_catalog_async, Catalog};
use imaginize_core::{ChapterSpec, Entity, FirstAppearance, MergeStrategy, Phase};
use imaginize_resolve::ResolutionCache;
use imaginize_store::{StateStore, StateStoreError};

use crate::events::{EventBus, EventKind};

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub entity_match_confidence: f32,
    pub merge_strategy: MergeStrategy,
    pub ai_description_enrichment: bool,
}

/// Finalizes the Catalog and emits `Elements.md` (spec §4.8, component C8).
#[derive(Clone)]
pub struct ExtractPhase {
    pub book_dir: std::path::PathBuf,
    pub book_id: String,
    pub state_store: Arc<StateStore>,
    pub ai: Arc<dyn AiProvider>,
    pub cache: Arc<ResolutionCache>,
    pub events: Arc<EventBus>,
    pub config: ExtractConfig,
}

const ELEMENTS_MARKDOWN_FILE: &str = "Elements.md";

impl ExtractPhase {
    pub async fn run(&self, chapters: &[ChapterSpec]) -> Result<(), ExtractError> {
        let _ = self.events.emit(&self.book_dir, EventKind::PhaseStart { phase: Phase::Extract });

        let manifest = self.state_store.load_manifest(Phase::Analyze)?;
        if manifest.completed_chapters.is_empty() {
            return Err(ExtractError::PrerequisiteMissing(
                "Extract requires at least one completed Analyze chapter".to_string(),
            ));
        }

        // Step 1-2: resume-safety sweep — any shard-extracted entity not
        // yet reflected in the Catalog gets merged now (spec §4.8 step 2).
        for chapter in chapters {
            let Some(shard) = self.state_store.read_chapter_shard(Phase::Analyze, chapter.index)? else {
                continue;
            };
            if shard.status != imaginize_core::Status::Completed {
                continue;
            }
            for name in &shard.entities_mentioned {
                self.ensure_entity_present(name, chapter.index).await;
            }
        }

        // Step 3: description enrichment or simple concatenation.
        let enrichment_strategy = self.config.ai_description_enrichment;
        let ai = self.ai.clone();
        with_locked_catalog_async(self.book_dir.clone(), move |mut catalog| async move {
            if enrichment_strategy {
                collapse_enrichments_with_ai(&mut catalog, ai.as_ref()).await;
            } else {
                collapse_enrichments_by_concatenation(&mut catalog);
            }
            (catalog, ())
        })
        .await?;

        // Step 5: render Elements.md under a write lock — reuse the
        // catalog lock so the render always reflects a consistent snapshot.
        let markdown = with_locked_catalog_async(self.book_dir.clone(), |catalog| async move {
            let rendered = catalog.as_markdown();
            (catalog, rendered)
        })
        .await?;
        write_markdown(&self.book_dir, ELEMENTS_MARKDOWN_FILE, &markdown)?;

        if let Some(mut state) = self.state_store.load_book_state()? {
            state.mark_phase_completed(Phase::Extract);
            self.state_store.save_book_state(&state)?;
        }

        let _ = self.events.emit(&self.book_dir, EventKind::PhaseComplete { phase: Phase::Extract });
        Ok(())
    }

    async fn ensure_entity_present(&self, name: &str, chapter_index: u32) {
        let name = name.to_string();

        let _ = with_locked_catalog_async(self.book_dir.clone(), move |catalog| async move {
            let lower = name.to_lowercase();
            let already_present = catalog
                .iter()
                .any(|e| e.name.eq_ignore_ascii_case(&name) || e.has_alias(&lower));

            // `ChapterShard.entities_mentioned` stores bare names with no
            // entity type, so a name missing from the Catalog here gives
            // us nowhere safe to re-insert it: guessing `EntityType::Character`
            // would silently miscategorize a recovered Creature/Place/Item/
            // Object. This path is only reached if a chapter's shard was
            // written (entities_mentioned recorded) but its entity merges
            // didn't persist — rare, since the catalog is written before
            // the shard in `analyze.rs` — so log and skip rather than
            // fabricate a type.
            if !already_present {
                tracing::warn!(
                    entity = %name,
                    chapter = chapter_index,
                    "shard mentions entity missing from Catalog with no recoverable type; skipping resume-safety merge"
                );
            }
            (catalog, ())
        })
        .await;
    }
}

/// Per spec §4.8 step 3, AI path: any entity carrying at least one pending
/// enrichment gets its description collapsed into one coherent paragraph —
/// a single enrichment still needs to be folded into `description`, since
/// `apply_merge_strategy`'s `Enrich` branch only ever appends an
/// `Enrichment` record and never touches `description` itself.
async fn collapse_enrichments_with_ai(catalog: &mut Catalog, ai: &dyn AiProvider) {
    let names: Vec<(imaginize_core::EntityType, String)> = catalog
        .iter()
        .filter(|e| !e.enrichments.is_empty())
        .map(|e| (e.entity_type, e.name.clone()))
        .collect();

    for (entity_type, name) in names {
        let Some(entity) = catalog.get(entity_type, &name) else { continue };
        let details: Vec<String> = entity.enrichments.iter().map(|e| e.detail.clone()).collect();
        match ai.enrich_description(&entity.description, &details).await {
            Ok(collapsed) => {
                let mut updated = entity.clone();
                updated.description = collapsed;
                updated.last_updated = chrono::Utc::now();
                catalog.replace(updated);
            }
            Err(err) => {
                tracing::warn!(entity = %name, error = %err, "AI description enrichment failed; leaving description as-is");
            }
        }
    }
}

/// Non-AI path: simple deduplicated concatenation of enrichment details
/// into the base description (spec §4.8 step 3, "otherwise"). Runs for
/// every entity with at least one pending enrichment, not just entities
/// with two or more — see `collapse_enrichments_with_ai` for why.
fn collapse_enrichments_by_concatenation(catalog: &mut Catalog) {
    let targets: Vec<(imaginize_core::EntityType, String)> = catalog
        .iter()
        .filter(|e| !e.enrichments.is_empty())
        .map(|e| (e.entity_type, e.name.clone()))
        .collect();

    for (entity_type, name) in targets {
        let Some(entity) = catalog.get(entity_type, &name) else { continue };
        let mut updated = entity.clone();
        let mut seen: Vec<&str> = vec![updated.description.as_str()];
        let mut appended = Vec::new();
        for enrichment in &entity.enrichments {
            if !seen.contains(&enrichment.detail.as_str()) {
                seen.push(enrichment.detail.as_str());
                appended.push(enrichment.detail.clone());
            }
        }
        if !appended.is_empty() {
            updated.description = format!("{} {}", updated.description, appended.join(" "));
            catalog.replace(updated);
        }
    }
}

fn write_markdown(book_dir: &Path, file_name: &str, contents: &str) -> Result<(), imaginize_store::AtomicStoreError> {
    imaginize_store::atomic_write(&book_dir.join(file_name), contents.as_bytes())
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
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
    use imaginize_core::{ChapterShard, Status};
    use tempfile::tempdir;

    fn sample_shard(index: u32, entities: Vec<&str>) -> ChapterShard {
        ChapterShard {
            chapter_index: index,
            title: format!("Chapter {index}"),
            status: Status::Completed,
            scene_concepts: Vec::new(),
            entities_mentioned: entities.into_iter().map(|s| s.to_string()).collect(),
            tokens_used: 10,
            completed_at: Some(chrono::Utc::now()),
            error: None,
        }
    }

    #[test]
    fn collapse_enrichments_by_concatenation_dedupes_and_appends() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::new();
        let mut entity = Entity::new(
            imaginize_core::EntityType::Character,
            "Jon".into(),
            "A man of the Night's Watch.".into(),
            FirstAppearance { book_id: "book-a".into(), chapter_index: 1 },
        );
        entity.enrichments.push(imaginize_core::Enrichment {
            detail: "He carries Longclaw.".into(),
            source_book: "book-a".into(),
            source_chapter: 2,
            added_at: chrono::Utc::now(),
        });
        entity.enrichments.push(imaginize_core::Enrichment {
            detail: "He carries Longclaw.".into(),
            source_book: "book-a".into(),
            source_chapter: 3,
            added_at: chrono::Utc::now(),
        });
        catalog.insert_new(entity);

        collapse_enrichments_by_concatenation(&mut catalog);

        let updated = catalog.get(imaginize_core::EntityType::Character, "Jon").unwrap();
        assert_eq!(updated.description, "A man of the Night's Watch. He carries Longclaw.");
        let _ = dir;
    }

    /// spec.md:343 (scenario S5): a single cross-book enrichment must
    /// still be folded into `description` — `apply_merge_strategy`'s
    /// `Enrich` branch only ever appends an `Enrichment` record and never
    /// touches `description` itself, so Extract is the only place this
    /// happens, and it must not wait for a second enrichment to arrive.
    #[test]
    fn collapse_enrichments_folds_a_single_enrichment_too() {
        let mut catalog = Catalog::new();
        let mut entity = Entity::new(
            imaginize_core::EntityType::Character,
            "Alyra".into(),
            "raven-haired mage".into(),
            FirstAppearance { book_id: "book-a".into(), chapter_index: 1 },
        );
        entity.enrichments.push(imaginize_core::Enrichment {
            detail: "wields a silver staff".into(),
            source_book: "book-b".into(),
            source_chapter: 4,
            added_at: chrono::Utc::now(),
        });
        catalog.insert_new(entity);

        collapse_enrichments_by_concatenation(&mut catalog);

        let updated = catalog.get(imaginize_core::EntityType::Character, "Alyra").unwrap();
        assert_eq!(updated.description, "raven-haired mage wields a silver staff");
    }

    #[test]
    fn sample_shard_entities_mentioned_roundtrip() {
        let shard = sample_shard(1, vec!["Jon", "Ghost"]);
        assert_eq!(shard.entities_mentioned, vec!["Jon", "Ghost"]);
    }
}
