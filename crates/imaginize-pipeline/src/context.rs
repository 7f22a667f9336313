use imaginize_core::Entity;

/// Empirical per-entity / global token ceilings (spec §4.7 step 3a). A
/// token is approximated as 4 characters, a common rough heuristic for
/// prompt-budgeting without a real tokenizer on hand.
const TOKENS_PER_ENTITY_CEILING: usize = 200;
const GLOBAL_TOKEN_CEILING: usize = 2000;
const CHARS_PER_TOKEN: usize = 4;

fn approx_tokens(s: &str) -> usize {
    s.len() / CHARS_PER_TOKEN + 1
}

/// Builds the "element context" string passed alongside a chapter to
/// `analyzeChapterUnified`: entities already mentioned in earlier
/// chapters of this book, each truncated to a per-entity token ceiling,
/// the whole context truncated to a global ceiling (spec §4.7).
///
/// `entities` should already be restricted to ones that appeared in a
/// chapter strictly before `current_chapter_index`; this function only
/// handles the budgeting, not the appearance filter.
pub fn build_element_context(entities: &[&Entity]) -> String {
    let mut lines = Vec::new();
    let mut total_tokens = 0usize;

    for entity in entities {
        let mut description = entity.description.clone();
        if approx_tokens(&description) > TOKENS_PER_ENTITY_CEILING {
            let max_chars = TOKENS_PER_ENTITY_CEILING * CHARS_PER_TOKEN;
            description.truncate(max_chars);
        }
        let line = format!("{} ({}): {}", entity.name, entity.entity_type, description);
        let line_tokens = approx_tokens(&line);
        if total_tokens + line_tokens > GLOBAL_TOKEN_CEILING {
            break;
        }
        total_tokens += line_tokens;
        lines.push(line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use imaginize_core::{EntityType, FirstAppearance};

    fn entity(name: &str, description: &str) -> Entity {
        Entity::new(
            EntityType::Character,
            name.to_string(),
            description.to_string(),
            FirstAppearance {
                book_id: "book-a".into(),
                chapter_index: 1,
            },
        )
    }

    #[test]
    fn truncates_a_single_oversized_entity_description() {
        let long_desc = "x".repeat(5000);
        let e = entity("Jon", &long_desc);
        let ctx = build_element_context(&[&e]);
        assert!(ctx.len() < long_desc.len());
    }

    #[test]
    fn stops_adding_entities_once_global_ceiling_is_hit() {
        let entities: Vec<Entity> = (0..50).map(|i| entity(&format!("E{i}"), &"word ".repeat(100))).collect();
        let refs: Vec<&Entity> = entities.iter().collect();
        let ctx = build_element_context(&refs);
        let included = ctx.lines().count();
        assert!(included < entities.len(), "global ceiling should cut off before all entities are included");
    }

    #[test]
    fn empty_entity_list_yields_empty_context() {
        assert_eq!(build_element_context(&[]), "");
    }
}
