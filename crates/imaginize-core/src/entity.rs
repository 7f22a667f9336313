use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five kinds of story entity tracked by the Catalog (spec §3).
/// Fixed rendering order for `asMarkdown` (spec §4.6, property 8):
/// character, creature, place, item, object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Character,
    Creature,
    Place,
    Item,
    Object,
}

/// Fixed group order used by `Catalog::as_markdown` (spec property 8).
pub const ENTITY_TYPE_ORDER: [EntityType; 5] = [
    EntityType::Character,
    EntityType::Creature,
    EntityType::Place,
    EntityType::Item,
    EntityType::Object,
];

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityType::Character => "character",
            EntityType::Creature => "creature",
            EntityType::Place => "place",
            EntityType::Item => "item",
            EntityType::Object => "object",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub text: String,
    pub page_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstAppearance {
    pub book_id: String,
    pub chapter_index: u32,
}

/// An append-only record of a new detail folded into an entity's
/// description, attributed to its source (spec GLOSSARY: Enrichment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrichment {
    pub detail: String,
    pub source_book: String,
    pub source_chapter: u32,
    pub added_at: DateTime<Utc>,
}

/// A named, typed story object with an evolving description (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub aliases: BTreeSet<String>,
    pub description: String,
    pub quotes: Vec<Quote>,
    pub first_appearance: FirstAppearance,
    /// bookId -> sorted set of chapter indices.
    pub appearances: BTreeMap<String, BTreeSet<u32>>,
    pub enrichments: Vec<Enrichment>,
    pub last_updated: DateTime<Utc>,
}

impl Entity {
    pub fn new(
        entity_type: EntityType,
        name: String,
        description: String,
        first_appearance: FirstAppearance,
    ) -> Self {
        let mut aliases = BTreeSet::new();
        aliases.insert(name.to_lowercase());
        let mut appearances = BTreeMap::new();
        appearances.insert(
            first_appearance.book_id.clone(),
            BTreeSet::from([first_appearance.chapter_index]),
        );
        Entity {
            entity_type,
            name,
            aliases,
            description,
            quotes: Vec::new(),
            first_appearance,
            appearances,
            enrichments: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Records that this entity was seen in `chapter_index` of `book_id`.
    pub fn record_appearance(&mut self, book_id: &str, chapter_index: u32) {
        self.appearances
            .entry(book_id.to_string())
            .or_default()
            .insert(chapter_index);
    }

    pub fn has_alias(&self, alias_lower: &str) -> bool {
        self.aliases.contains(alias_lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_order_is_fixed() {
        assert_eq!(
            ENTITY_TYPE_ORDER,
            [
                EntityType::Character,
                EntityType::Creature,
                EntityType::Place,
                EntityType::Item,
                EntityType::Object,
            ]
        );
    }

    #[test]
    fn new_entity_always_aliases_its_own_name_case_folded() {
        let e = Entity::new(
            EntityType::Character,
            "Jon Snow".into(),
            "a man of the Night's Watch".into(),
            FirstAppearance {
                book_id: "book-a".into(),
                chapter_index: 1,
            },
        );
        assert!(e.has_alias("jon snow"));
        assert_eq!(e.appearances["book-a"], BTreeSet::from([1]));
    }

    #[test]
    fn record_appearance_accumulates_across_chapters() {
        let mut e = Entity::new(
            EntityType::Character,
            "Jon".into(),
            "desc".into(),
            FirstAppearance {
                book_id: "book-a".into(),
                chapter_index: 1,
            },
        );
        e.record_appearance("book-a", 2);
        assert_eq!(e.appearances["book-a"], BTreeSet::from([1, 2]));
    }
}
