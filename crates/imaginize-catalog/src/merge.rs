use imaginize_ai::{AiError, AiProvider, ResolveEntityResponse};
use imaginize_core::{Entity, EntityType, MergeStrategy};
use imaginize_resolve::{ResolutionCache, ResolveKey};

use crate::catalog::Catalog;

const PREFIX_MATCH_MIN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeResult {
    pub matched: bool,
    pub was_new: bool,
    pub confidence: f32,
}

/// Core merge algorithm (spec §4.6, steps 1-5). `confidence_threshold` is
/// `CatalogConfig::entity_match_confidence` (default 0.7).
pub async fn merge_entity(
    catalog: &mut Catalog,
    mut candidate: Entity,
    book_id: &str,
    chapter_index: u32,
    strategy: MergeStrategy,
    resolver: &dyn AiProvider,
    cache: &ResolutionCache,
    confidence_threshold: f32,
) -> Result<MergeResult, AiError> {
    // Step 1: normalize candidate name into its own alias set.
    candidate.aliases.insert(candidate.name.to_lowercase());

    // Step 2: alias intersection or the cheap syntactic heuristic, over
    // entities of the same type, is a direct match — no AI call needed.
    let direct_match = catalog
        .of_type(candidate.entity_type)
        .find(|e| !e.aliases.is_disjoint(&candidate.aliases) || syntactic_match(&e.name, &candidate.name))
        .map(|e| e.name.clone());

    if let Some(existing_name) = direct_match {
        finish_match(catalog, &existing_name, candidate, book_id, chapter_index, strategy);
        return Ok(MergeResult {
            matched: true,
            was_new: false,
            confidence: 1.0,
        });
    }

    // Step 3: entities sharing at least one name token are candidates for
    // the cached/AI resolver; the rest are never consulted (spec §4.5/4.6).
    let mut best: Option<(String, ResolveEntityResponse)> = None;
    for existing in catalog.of_type(candidate.entity_type) {
        if !shares_token(&existing.name, &candidate.name) {
            continue;
        }

        let key = ResolveKey::new(&candidate.name, candidate.entity_type, &existing.name);
        let response = match cache.get(&key) {
            Some(cached) => ResolveEntityResponse {
                is_match: cached.is_match,
                confidence: cached.confidence,
                reasoning: cached.reasoning,
            },
            None => {
                let resolved = resolver
                    .resolve_entity(&candidate.name, candidate.entity_type, &existing.name, &existing.description)
                    .await?;
                cache.put(key, resolved.is_match, resolved.confidence, resolved.reasoning.clone());
                resolved
            }
        };

        if response.is_match && response.confidence >= confidence_threshold {
            let is_better = best.as_ref().map(|(_, b)| response.confidence > b.confidence).unwrap_or(true);
            if is_better {
                best = Some((existing.name.clone(), response));
            }
        }
    }

    if let Some((existing_name, response)) = best {
        finish_match(catalog, &existing_name, candidate, book_id, chapter_index, strategy);
        return Ok(MergeResult {
            matched: true,
            was_new: false,
            confidence: response.confidence,
        });
    }

    // Step 4 (no match) / step 5: brand-new entity, appearance already set by Entity::new.
    catalog.insert_new(candidate);
    Ok(MergeResult {
        matched: false,
        was_new: true,
        confidence: 0.0,
    })
}

fn finish_match(
    catalog: &mut Catalog,
    existing_name: &str,
    candidate: Entity,
    book_id: &str,
    chapter_index: u32,
    strategy: MergeStrategy,
) {
    let entity_type = candidate.entity_type;
    let mut existing = catalog
        .get(entity_type, existing_name)
        .cloned()
        .expect("match target must still be present");

    apply_merge_strategy(&mut existing, candidate, strategy);
    // Step 5: always record the appearance, independent of strategy.
    existing.record_appearance(book_id, chapter_index);
    catalog.replace(existing);
}

/// Applies one of the three merge strategies (spec §4.6/§4.11) to fold
/// `incoming` into `existing` in place.
pub fn apply_merge_strategy(existing: &mut Entity, incoming: Entity, strategy: MergeStrategy) {
    existing.aliases.extend(incoming.aliases.iter().cloned());
    // Dedup by (text, pageRef) per spec §4.6.
    for quote in incoming.quotes {
        if !existing.quotes.iter().any(|q| q.text == quote.text && q.page_ref == quote.page_ref) {
            existing.quotes.push(quote);
        }
    }
    existing.enrichments.extend(incoming.enrichments.clone());

    match strategy {
        MergeStrategy::Enrich => {
            let new_sentences = new_sentences_not_in(&incoming.description, existing);
            if !new_sentences.is_empty() {
                existing.enrichments.push(imaginize_core::Enrichment {
                    detail: new_sentences.join(" "),
                    source_book: incoming.first_appearance.book_id,
                    source_chapter: incoming.first_appearance.chapter_index,
                    added_at: incoming.last_updated,
                });
            }
        }
        MergeStrategy::Union => {
            if !incoming.description.trim().is_empty() && incoming.description != existing.description {
                existing.description = format!("{}\n\n{}", existing.description, incoming.description);
            }
        }
        MergeStrategy::Override => {
            // Replaces regardless of relative length (Open Question decision).
            let changed = existing.description != incoming.description;
            existing.name = incoming.name;
            existing.description = incoming.description.clone();
            if changed {
                existing.enrichments.push(imaginize_core::Enrichment {
                    detail: format!("description overridden: {}", incoming.description),
                    source_book: incoming.first_appearance.book_id,
                    source_chapter: incoming.first_appearance.chapter_index,
                    added_at: incoming.last_updated,
                });
            }
        }
    }

    for (book_id, chapters) in incoming.appearances {
        existing.appearances.entry(book_id).or_default().extend(chapters);
    }
}

/// Sentences of `candidate` that are not already present verbatim as a
/// substring of `existing`'s description or any prior enrichment (spec
/// §4.6: "append any new sentence from candidate that is not a substring
/// of existing"). Checking enrichments too, not just the base
/// description, is what keeps repeated identical merges idempotent
/// (property 5) instead of re-appending the same enrichment every time.
fn new_sentences_not_in(candidate: &str, existing: &Entity) -> Vec<String> {
    candidate
        .split(". ")
        .map(|s| s.trim())
        .filter(|s| {
            !s.is_empty()
                && !existing.description.contains(*s)
                && !existing.enrichments.iter().any(|e| e.detail.contains(*s))
        })
        .map(String::from)
        .collect()
}

fn syntactic_match(a: &str, b: &str) -> bool {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    if a_lower == b_lower {
        return true;
    }
    (a_lower.len() >= PREFIX_MATCH_MIN_LEN && b_lower.starts_with(&a_lower))
        || (b_lower.len() >= PREFIX_MATCH_MIN_LEN && a_lower.starts_with(&b_lower))
}

fn shares_token(a: &str, b: &str) -> bool {
    let a_tokens: std::collections::HashSet<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
    b.to_lowercase().split_whitespace().any(|t| a_tokens.contains(t))
}

pub fn entity_type_from(s: &str) -> Option<EntityType> {
    match s.to_lowercase().as_str() {
        "character" => Some(EntityType::Character),
        "creature" => Some(EntityType::Creature),
        "place" => Some(EntityType::Place),
        "item" => Some(EntityType::Item),
        "object" => Some(EntityType::Object),
        _ => None,
    }
}
