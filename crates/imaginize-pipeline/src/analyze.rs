use std::path::PathBuf;
use std::sync::Arc;

use imaginize_ai::AiProvider;
use imaginize_catalog::with_locked_catalog_async;
use imaginize_core::{
    ChapterSpec, Entity, FirstAppearance, MergeStrategy, Phase, SceneConcept, Status,
};
use imaginize_resolve::ResolutionCache;
use imaginize_scheduler::{Scheduler, SchedulerError};
use imaginize_store::{StateStore, StateStoreError};

use crate::context::build_element_context;
use crate::events::{EventBus, EventKind};
use crate::worklist::{compute_worklist, parse_selection};

/// `numScenes` may be exceeded by up to this factor before scenes are
/// truncated by dropping the shortest-quote entries (spec §4.7, Open
/// Question 3 — flagged there as tunable, not hardcoded inline).
pub const SCENE_OVERSHOOT_FACTOR: usize = 2;

#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    pub pages_per_image: u32,
    pub entity_match_confidence: f32,
    pub merge_strategy: MergeStrategy,
    pub continue_on_failure: bool,
    pub selection: Option<String>,
    pub limit: Option<usize>,
    pub force: bool,
}

/// Drives per-chapter AI calls that populate Chapter Shards and grow the
/// Catalog (spec §4.7, component C7).
#[derive(Clone)]
pub struct AnalyzePhase {
    pub book_dir: PathBuf,
    pub book_id: String,
    pub state_store: Arc<StateStore>,
    pub scheduler: Arc<Scheduler>,
    pub ai: Arc<dyn AiProvider>,
    pub cache: Arc<ResolutionCache>,
    pub events: Arc<EventBus>,
    pub config: AnalyzeConfig,
}

pub struct AnalyzeOutcome {
    pub any_failed: bool,
    pub chapters_run: usize,
}

impl AnalyzePhase {
    pub async fn run(&self, chapters: &[ChapterSpec]) -> Result<AnalyzeOutcome, StateStoreError> {
        let _ = self.events.emit(&self.book_dir, EventKind::PhaseStart { phase: Phase::Analyze });

        if self.config.force {
            let targets: Vec<u32> = match &self.config.selection {
                Some(expr) => parse_selection(expr).into_iter().collect(),
                None => chapters.iter().map(|c| c.index).collect(),
            };
            self.state_store.update_manifest(Phase::Analyze, |m| {
                for idx in &targets {
                    m.reset_chapter(*idx);
                }
            })?;
        }

        let manifest = self.state_store.load_manifest(Phase::Analyze)?;
        let worklist: Vec<ChapterSpec> = compute_worklist(
            chapters,
            &manifest,
            self.config.selection.as_deref(),
            self.config.limit,
        )
        .into_iter()
        .cloned()
        .collect();

        for chapter in &worklist {
            self.state_store.update_manifest(Phase::Analyze, |m| m.mark_in_progress(chapter.index))?;
        }

        let mut handles = Vec::with_capacity(worklist.len());
        for chapter in worklist.clone() {
            let phase = self.clone();
            handles.push(tokio::spawn(async move { phase.run_one_chapter(chapter).await }));
        }

        let mut any_failed = false;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(())) => any_failed = true,
                Err(join_err) => {
                    tracing::error!(error = %join_err, "analyze chapter task panicked");
                    any_failed = true;
                }
            }
        }

        if any_failed && !self.config.continue_on_failure {
            self.state_store.load_book_state()?.map(|mut s| {
                s.mark_phase_failed(Phase::Analyze);
                let _ = self.state_store.save_book_state(&s);
            });
        } else if let Some(mut state) = self.state_store.load_book_state()? {
            state.mark_phase_completed(Phase::Analyze);
            self.state_store.save_book_state(&state)?;
        }

        let _ = self.events.emit(&self.book_dir, EventKind::PhaseComplete { phase: Phase::Analyze });

        Ok(AnalyzeOutcome {
            any_failed,
            chapters_run: worklist.len(),
        })
    }

    /// Steps 3a-3g of spec §4.7, isolated so one chapter's failure never
    /// blocks the rest (spec §4.7: "chapter-level failures are isolated").
    async fn run_one_chapter(&self, chapter: ChapterSpec) -> Result<(), ()> {
        let _ = self
            .events
            .emit(&self.book_dir, EventKind::ChapterStart { chapter_index: chapter.index });

        let element_context = {
            let catalog = imaginize_catalog::load_elements(&self.book_dir).unwrap_or_default();
            let mentioned: Vec<&Entity> = catalog
                .iter()
                .filter(|e| {
                    e.appearances
                        .get(&self.book_id)
                        .map(|chapters| chapters.iter().any(|&idx| idx < chapter.index))
                        .unwrap_or(false)
                })
                .collect();
            build_element_context(&mentioned)
        };

        let num_scenes = num_scenes_for(&chapter, self.config.pages_per_image);

        let ai = self.ai.clone();
        let chapter_for_call = chapter.clone();
        let context_for_call = element_context.clone();
        let result = self
            .scheduler
            .run(move || {
                let ai = ai.clone();
                let chapter = chapter_for_call.clone();
                let context = context_for_call.clone();
                async move { ai.analyze_chapter_unified(&chapter, &context, num_scenes).await }
            })
            .await;

        let analysis = match result {
            Ok(analysis) => analysis,
            Err(err) => {
                self.fail_chapter(&chapter, &err).await;
                return Err(());
            }
        };

        let mut scenes: Vec<SceneConcept> = analysis
            .scenes
            .into_iter()
            .enumerate()
            .map(|(i, draft)| SceneConcept {
                id: SceneConcept::make_id(chapter.index, (i + 1) as u32),
                chapter_index: chapter.index,
                page_range: imaginize_core::PageRef::parse(&draft.page_range),
                source_quote: draft.source_quote,
                visual_description: draft.visual_description,
                generated_image_path: None,
            })
            .collect();
        truncate_scenes(&mut scenes, num_scenes);

        let mut entities_mentioned = Vec::with_capacity(analysis.entities.len());
        for draft in &analysis.entities {
            let candidate = Entity::new(
                draft.entity_type,
                draft.name.clone(),
                draft.description.clone(),
                FirstAppearance {
                    book_id: self.book_id.clone(),
                    chapter_index: chapter.index,
                },
            );
            let book_id = self.book_id.clone();
            let strategy = self.config.merge_strategy;
            let confidence = self.config.entity_match_confidence;
            let ai = self.ai.clone();
            let cache = self.cache.clone();
            let chapter_index = chapter.index;
            let name = draft.name.clone();

            let merge_result = with_locked_catalog_async(self.book_dir.clone(), move |mut catalog| async move {
                let result =
                    imaginize_catalog::merge_entity(&mut catalog, candidate, &book_id, chapter_index, strategy, ai.as_ref(), &cache, confidence)
                        .await;
                (catalog, result)
            })
            .await;

            match merge_result {
                Ok(Ok(_)) => entities_mentioned.push(name),
                Ok(Err(err)) => tracing::warn!(entity = %name, error = %err, "entity resolution call failed; entity dropped for this chapter"),
                Err(err) => tracing::warn!(entity = %name, error = %err, "catalog persistence failed for entity merge"),
            }
        }

        let shard = imaginize_core::ChapterShard {
            chapter_index: chapter.index,
            title: chapter.title.clone(),
            status: Status::Completed,
            scene_concepts: scenes,
            entities_mentioned,
            tokens_used: analysis.tokens_used,
            completed_at: Some(chrono::Utc::now()),
            error: None,
        };

        if let Err(err) = self.state_store.write_chapter_shard(Phase::Analyze, &shard) {
            tracing::error!(chapter = chapter.index, error = %err, "failed to write chapter shard");
            return Err(());
        }

        if let Err(err) = self
            .state_store
            .update_manifest(Phase::Analyze, |m| m.mark_completed(chapter.index))
        {
            tracing::error!(chapter = chapter.index, error = %err, "failed to update manifest");
            return Err(());
        }

        let _ = self
            .events
            .emit(&self.book_dir, EventKind::ChapterComplete { chapter_index: chapter.index });
        Ok(())
    }

    async fn fail_chapter(&self, chapter: &ChapterSpec, err: &SchedulerError<imaginize_ai::AiError>) {
        tracing::error!(chapter = chapter.index, error = %err, "chapter analysis failed");
        let shard = imaginize_core::ChapterShard {
            chapter_index: chapter.index,
            title: chapter.title.clone(),
            status: Status::Failed,
            scene_concepts: Vec::new(),
            entities_mentioned: Vec::new(),
            tokens_used: 0,
            completed_at: None,
            error: Some(err.to_string()),
        };
        let _ = self.state_store.write_chapter_shard(Phase::Analyze, &shard);
        let _ = self.state_store.update_manifest(Phase::Analyze, |m| m.mark_failed(chapter.index));
    }
}

/// `numScenes = max(1, ceil(pageCount / pagesPerImage))` (spec §4.7).
fn num_scenes_for(chapter: &ChapterSpec, pages_per_image: u32) -> u32 {
    let pages_per_image = pages_per_image.max(1);
    let page_count = chapter.page_count().max(1);
    let target = page_count.div_ceil(pages_per_image);
    target.max(1)
}

/// Accepts up to `SCENE_OVERSHOOT_FACTOR * target` scenes, truncating by
/// dropping the shortest-quote scenes first (spec §4.7).
fn truncate_scenes(scenes: &mut Vec<SceneConcept>, target: u32) {
    let max_allowed = (target as usize).saturating_mul(SCENE_OVERSHOOT_FACTOR).max(1);
    if scenes.len() <= max_allowed {
        return;
    }
    scenes.sort_by_key(|s| std::cmp::Reverse(s.source_quote.len()));
    scenes.truncate(max_allowed);
    scenes.sort_by_key(|s| s.id.clone());
}
