use std::collections::BTreeSet;

use imaginize_core::{ChapterSpec, Manifest};

/// Parses a chapter-selection expression like `"1-5,10"` into the set of
/// chapter indices it names (spec §4.7). Malformed segments are skipped
/// rather than rejecting the whole expression, since this only narrows an
/// already-computed worklist.
pub fn parse_selection(expr: &str) -> BTreeSet<u32> {
    let mut indices = BTreeSet::new();
    for segment in expr.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if let Some((start, end)) = segment.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>()) {
                if start <= end {
                    indices.extend(start..=end);
                }
            }
        } else if let Ok(index) = segment.parse::<u32>() {
            indices.insert(index);
        }
    }
    indices
}

/// Computes the Analyze worklist (spec §4.7 step 2): story chapters only,
/// minus already-completed chapters, optionally narrowed by a selection
/// expression, optionally truncated by `limit`.
pub fn compute_worklist<'a>(
    chapters: &'a [ChapterSpec],
    manifest: &Manifest,
    selection: Option<&str>,
    limit: Option<usize>,
) -> Vec<&'a ChapterSpec> {
    let selected = selection.map(|s| parse_selection(s));

    let mut worklist: Vec<&ChapterSpec> = chapters
        .iter()
        .filter(|c| c.is_story_content)
        .filter(|c| !manifest.is_completed(c.index))
        .filter(|c| selected.as_ref().map(|s| s.contains(&c.index)).unwrap_or(true))
        .collect();

    if let Some(limit) = limit {
        worklist.truncate(limit);
    }
    worklist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(index: u32, is_story_content: bool) -> ChapterSpec {
        ChapterSpec {
            index,
            title: format!("Chapter {index}"),
            page_range: imaginize_core::PageRef::Single(index),
            raw_text: "text".into(),
            is_story_content,
        }
    }

    #[test]
    fn parse_selection_handles_ranges_and_singletons() {
        let indices = parse_selection("1-5,10");
        assert_eq!(indices, BTreeSet::from([1, 2, 3, 4, 5, 10]));
    }

    #[test]
    fn parse_selection_ignores_malformed_segments() {
        let indices = parse_selection("1-5,abc,10");
        assert_eq!(indices, BTreeSet::from([1, 2, 3, 4, 5, 10]));
    }

    #[test]
    fn worklist_excludes_non_story_and_completed_chapters() {
        let chapters = vec![chapter(1, true), chapter(2, false), chapter(3, true)];
        let mut manifest = Manifest::new();
        manifest.mark_completed(1);

        let worklist = compute_worklist(&chapters, &manifest, None, None);
        assert_eq!(worklist.iter().map(|c| c.index).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn worklist_respects_selection_and_limit() {
        let chapters = vec![chapter(1, true), chapter(2, true), chapter(3, true)];
        let manifest = Manifest::new();

        let worklist = compute_worklist(&chapters, &manifest, Some("1,3"), None);
        assert_eq!(worklist.iter().map(|c| c.index).collect::<Vec<_>>(), vec![1, 3]);

        let limited = compute_worklist(&chapters, &manifest, None, Some(2));
        assert_eq!(limited.iter().map(|c| c.index).collect::<Vec<_>>(), vec![1, 2]);
    }
}
