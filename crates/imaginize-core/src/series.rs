use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Enrich,
    Union,
    Override,
}

impl MergeStrategy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "enrich" => Some(MergeStrategy::Enrich),
            "union" => Some(MergeStrategy::Union),
            "override" => Some(MergeStrategy::Override),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesBookEntry {
    pub id: String,
    pub title: String,
    pub path: String,
    pub order: u32,
    pub status: BookStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedElementsConfig {
    pub enabled: bool,
    pub merge_strategy: MergeStrategy,
}

/// Lives at series root, independent of any one book (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub name: String,
    pub books: Vec<SeriesBookEntry>,
    pub shared_elements: SharedElementsConfig,
}

impl SeriesConfig {
    pub fn new(name: String, merge_strategy: MergeStrategy) -> Self {
        SeriesConfig {
            name,
            books: Vec::new(),
            shared_elements: SharedElementsConfig {
                enabled: true,
                merge_strategy,
            },
        }
    }
}
