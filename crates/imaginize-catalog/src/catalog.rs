use indexmap::IndexMap;
use serde::de::{Deserializer, Error as DeError};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use imaginize_core::{Entity, EntityType, ENTITY_TYPE_ORDER};

/// In-memory entity map, keyed by (type, canonical name). Iteration order
/// is stable insertion order (spec §3); `as_markdown` imposes its own
/// fixed grouping independent of this order (spec property 8).
///
/// Serializes as a flat JSON array of entities — a tuple key has no
/// natural JSON-object representation — and rebuilds the index on load.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: IndexMap<(EntityType, String), Entity>,
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let list: Vec<&Entity> = self.entities.values().collect();
        list.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<Entity>::deserialize(deserializer)?;
        let mut catalog = Catalog::new();
        for entity in list {
            let key = (entity.entity_type, entity.name.to_lowercase());
            if catalog.entities.insert(key, entity).is_some() {
                return Err(DeError::custom("duplicate (type, name) entry in catalog"));
            }
        }
        Ok(catalog)
    }
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn get(&self, entity_type: EntityType, name: &str) -> Option<&Entity> {
        self.entities.get(&(entity_type, name.to_lowercase()))
    }

    /// Case-insensitive alias lookup within `entity_type` (spec §4.6).
    pub fn find_by_alias(&self, entity_type: EntityType, name: &str) -> Option<&Entity> {
        let needle = name.to_lowercase();
        self.entities
            .values()
            .find(|e| e.entity_type == entity_type && e.has_alias(&needle))
    }

    /// Entities of `entity_type`, for the merge algorithm's candidate scan.
    pub(crate) fn of_type(&self, entity_type: EntityType) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.entity_type == entity_type)
    }

    pub(crate) fn insert_new(&mut self, entity: Entity) {
        let key = (entity.entity_type, entity.name.to_lowercase());
        self.entities.insert(key, entity);
    }

    /// Replaces an entity by alias-overlap with the old slot it occupied,
    /// re-keying it if an override merge renamed it. The sanctioned path
    /// for mutating an entity already in the Catalog outside of
    /// `mergeEntity` (e.g. Extract's description-collapse pass).
    pub fn replace(&mut self, entity: Entity) {
        // The entity's canonical-name key may have shifted under an
        // override merge; re-key defensively by scanning for the old slot
        // sharing any alias, so rename-on-override never orphans an entry.
        let old_key = self
            .entities
            .iter()
            .find(|(_, e)| e.aliases.is_subset(&entity.aliases) || entity.aliases.is_subset(&e.aliases))
            .map(|(k, _)| k.clone());
        if let Some(key) = old_key {
            self.entities.shift_remove(&key);
        }
        self.insert_new(entity);
    }

    /// Deterministic render grouped by type in the fixed order
    /// (character, creature, place, item, object), alphabetized within
    /// group, regardless of insertion order (spec §4.6, property 8).
    pub fn as_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Elements\n\n");

        for entity_type in ENTITY_TYPE_ORDER {
            let mut group: Vec<&Entity> = self.of_type(entity_type).collect();
            if group.is_empty() {
                continue;
            }
            group.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

            out.push_str(&format!("## {}\n\n", capitalize(&entity_type.to_string())));
            for entity in group {
                out.push_str(&format!("### {}\n\n{}\n\n", entity.name, entity.description));
            }
        }

        out
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str() + "s",
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imaginize_core::FirstAppearance;

    fn entity(entity_type: EntityType, name: &str) -> Entity {
        Entity::new(
            entity_type,
            name.to_string(),
            format!("{name} description"),
            FirstAppearance {
                book_id: "book-a".into(),
                chapter_index: 1,
            },
        )
    }

    #[test]
    fn as_markdown_groups_in_fixed_type_order_regardless_of_insertion() {
        let mut catalog = Catalog::new();
        catalog.insert_new(entity(EntityType::Place, "Winterfell"));
        catalog.insert_new(entity(EntityType::Character, "Zed"));
        catalog.insert_new(entity(EntityType::Character, "Anna"));

        let md = catalog.as_markdown();
        let characters_pos = md.find("## Characters").unwrap();
        let places_pos = md.find("## Places").unwrap();
        assert!(characters_pos < places_pos);

        let anna_pos = md.find("### Anna").unwrap();
        let zed_pos = md.find("### Zed").unwrap();
        assert!(anna_pos < zed_pos, "within a group, names are alphabetized");
    }

    #[test]
    fn find_by_alias_is_case_insensitive() {
        let mut catalog = Catalog::new();
        catalog.insert_new(entity(EntityType::Character, "Jon Snow"));
        assert!(catalog.find_by_alias(EntityType::Character, "JON SNOW").is_some());
        assert!(catalog.find_by_alias(EntityType::Place, "jon snow").is_none());
    }
}
