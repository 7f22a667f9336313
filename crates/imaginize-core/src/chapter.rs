use serde::{Deserialize, Serialize};

/// A page reference as returned by the upstream parser or a model response.
/// Scene page references must be parseable as either a single integer or an
/// `N-M` range; anything else is tolerated as an opaque string (spec §4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    Single(u32),
    Range(u32, u32),
    Opaque(String),
}

impl PageRef {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(n) = raw.parse::<u32>() {
            return PageRef::Single(n);
        }
        if let Some((lo, hi)) = raw.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                return PageRef::Range(lo, hi);
            }
        }
        PageRef::Opaque(raw.to_string())
    }
}

/// Immutable per-chapter specification handed to Analyze by the upstream
/// parser (out of scope: the parser itself; spec §1 external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSpec {
    pub index: u32,
    pub title: String,
    pub page_range: PageRef,
    pub raw_text: String,
    pub is_story_content: bool,
}

impl ChapterSpec {
    pub fn page_count(&self) -> u32 {
        match self.page_range {
            PageRef::Single(_) => 1,
            PageRef::Range(lo, hi) => hi.saturating_sub(lo).saturating_add(1),
            PageRef::Opaque(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_page() {
        assert_eq!(PageRef::parse("42"), PageRef::Single(42));
    }

    #[test]
    fn parses_range() {
        assert_eq!(PageRef::parse("10-20"), PageRef::Range(10, 20));
    }

    #[test]
    fn tolerates_unparseable_reference() {
        assert_eq!(
            PageRef::parse("front matter"),
            PageRef::Opaque("front matter".to_string())
        );
    }

    #[test]
    fn page_count_inclusive_of_range() {
        let spec = ChapterSpec {
            index: 1,
            title: "One".into(),
            page_range: PageRef::Range(10, 19),
            raw_text: String::new(),
            is_story_content: true,
        };
        assert_eq!(spec.page_count(), 10);
    }
}
