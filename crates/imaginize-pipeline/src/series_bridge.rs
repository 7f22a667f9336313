use std::path::{Path, PathBuf};

use imaginize_catalog::{with_locked_catalog_async, CatalogStoreError};
use imaginize_core::MergeStrategy;

/// Pre-Analyze / post-Extract bridge between a book's Catalog and the
/// series-wide SeriesMemory (spec §4.11, component C11). Every operation
/// here is logged-and-non-fatal: a book's own pipeline must never abort
/// because the shared memory file is unavailable.
pub struct SeriesBridge {
    pub series_root: PathBuf,
    pub book_id: String,
    pub merge_strategy: MergeStrategy,
}

impl SeriesBridge {
    /// Pre-Analyze hook: entities from SeriesMemory not yet attributed to
    /// this book are merged into the book's Catalog, giving the model
    /// cross-book context before it sees the new chapters.
    pub async fn import_into_book(&self, book_dir: &Path) {
        let memory = match imaginize_catalog::load_series_memory(&self.series_root) {
            Ok(memory) => memory,
            Err(err) => {
                tracing::warn!(error = %err, "series import skipped: could not load SeriesMemory");
                return;
            }
        };

        let candidates: Vec<imaginize_core::Entity> = memory
            .iter()
            .filter(|e| {
                e.first_appearance.book_id != self.book_id
                    || e.appearances.get(&self.book_id).map(|c| c.is_empty()).unwrap_or(true)
            })
            .cloned()
            .collect();

        if candidates.is_empty() {
            return;
        }

        let book_id = self.book_id.clone();
        let strategy = self.merge_strategy;
        let result: Result<(), CatalogStoreError> = with_locked_catalog_async(book_dir.to_path_buf(), move |mut catalog| async move {
            for candidate in candidates {
                merge_without_resolver(&mut catalog, candidate, &book_id, strategy);
            }
            (catalog, ())
        })
        .await;

        if let Err(err) = result {
            tracing::warn!(error = %err, "series import failed; book proceeds without cross-book context");
        }
    }

    /// Post-Extract hook: merges this book's Catalog back into
    /// SeriesMemory, recording this book as the enrichment source.
    pub async fn export_from_book(&self, book_dir: &Path) {
        let catalog = match imaginize_catalog::load_elements(book_dir) {
            Ok(catalog) => catalog,
            Err(err) => {
                tracing::warn!(error = %err, "series export skipped: could not load this book's Catalog");
                return;
            }
        };

        let book_id = self.book_id.clone();
        let strategy = self.merge_strategy;
        let entities: Vec<imaginize_core::Entity> = catalog.iter().cloned().collect();
        let result = imaginize_catalog::with_locked_series_memory(&self.series_root, move |memory| {
            for entity in entities {
                merge_without_resolver(memory, entity, &book_id, strategy);
            }
        });

        if let Err(err) = result {
            tracing::warn!(error = %err, "series export failed; SeriesMemory left stale for this book's entities");
        }
    }
}

/// Bulk import/export never needs the AI resolver: entities arriving from
/// SeriesMemory or a book's Catalog already carry a stable identity, so a
/// direct alias/syntactic match (or a brand-new insert) is sufficient
/// (spec §4.6: "mergeCatalog ... iterates calling mergeEntity").
fn merge_without_resolver(
    catalog: &mut imaginize_catalog::Catalog,
    candidate: imaginize_core::Entity,
    book_id: &str,
    strategy: MergeStrategy,
) {
    let existing = catalog
        .find_by_alias(candidate.entity_type, &candidate.name)
        .map(|e| e.name.clone());

    match existing {
        Some(name) => {
            if let Some(mut base) = catalog.get(candidate.entity_type, &name).cloned() {
                imaginize_catalog::apply_merge_strategy(&mut base, candidate, strategy);
                base.record_appearance(book_id, base.first_appearance.chapter_index);
                catalog.replace(base);
            }
        }
        None => {
            let mut candidate = candidate;
            candidate.record_appearance(book_id, candidate.first_appearance.chapter_index);
            catalog.replace(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imaginize_core::{Entity, EntityType, FirstAppearance};
    use tempfile::tempdir;

    fn entity(book_id: &str, name: &str, description: &str) -> Entity {
        Entity::new(
            EntityType::Character,
            name.to_string(),
            description.to_string(),
            FirstAppearance { book_id: book_id.to_string(), chapter_index: 1 },
        )
    }

    #[tokio::test]
    async fn import_brings_series_entities_into_a_fresh_book_catalog() {
        let series_root = tempdir().unwrap();
        let book_dir = tempdir().unwrap();

        let mut memory = imaginize_catalog::Catalog::new();
        memory.replace(entity("book-a", "Alyra", "raven-haired mage"));
        imaginize_catalog::save_series_memory(series_root.path(), &memory).unwrap();

        let bridge = SeriesBridge {
            series_root: series_root.path().to_path_buf(),
            book_id: "book-b".to_string(),
            merge_strategy: MergeStrategy::Enrich,
        };
        bridge.import_into_book(book_dir.path()).await;

        let catalog = imaginize_catalog::load_elements(book_dir.path()).unwrap();
        let imported = catalog.find_by_alias(EntityType::Character, "Alyra").unwrap();
        assert_eq!(imported.description, "raven-haired mage");
    }

    #[tokio::test]
    async fn export_merges_book_catalog_into_series_memory() {
        let series_root = tempdir().unwrap();
        let book_dir = tempdir().unwrap();

        let mut catalog = imaginize_catalog::Catalog::new();
        catalog.replace(entity("book-b", "Alyra", "wields a silver staff"));
        imaginize_catalog::set_elements(book_dir.path(), &catalog).unwrap();

        let bridge = SeriesBridge {
            series_root: series_root.path().to_path_buf(),
            book_id: "book-b".to_string(),
            merge_strategy: MergeStrategy::Enrich,
        };
        bridge.export_from_book(book_dir.path()).await;

        let memory = imaginize_catalog::load_series_memory(series_root.path()).unwrap();
        let merged = memory.find_by_alias(EntityType::Character, "Alyra").unwrap();
        assert_eq!(merged.description, "wields a silver staff");
    }

    #[tokio::test]
    async fn import_is_a_no_op_when_series_memory_is_missing() {
        let series_root = tempdir().unwrap();
        let book_dir = tempdir().unwrap();

        let bridge = SeriesBridge {
            series_root: series_root.path().to_path_buf(),
            book_id: "book-b".to_string(),
            merge_strategy: MergeStrategy::Enrich,
        };
        bridge.import_into_book(book_dir.path()).await;

        assert!(imaginize_catalog::load_elements(book_dir.path()).unwrap().is_empty());
    }
}
