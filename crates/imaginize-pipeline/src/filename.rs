const MAX_SLUG_LEN: usize = 50;

/// Keeps `[A-Za-z0-9_-]`, collapses runs of anything else into a single
/// `_`, and truncates to `MAX_SLUG_LEN` chars (spec §4.9, Open Question 2).
pub fn sanitize_slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_separator = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            out.push(ch);
            last_was_separator = false;
        } else if !last_was_separator {
            out.push('_');
            last_was_separator = true;
        }
    }
    let trimmed = out.trim_matches('_');
    trimmed.chars().take(MAX_SLUG_LEN).collect()
}

/// `chapter_{N}_{slug?}_scene_{M}.png` (spec §4.9/§6). The slug segment is
/// omitted entirely when the chapter title sanitizes to empty or a
/// title slug was not configured.
pub fn scene_image_filename(chapter_index: u32, chapter_title_slug: Option<&str>, scene_index: u32) -> String {
    match chapter_title_slug.map(|s| sanitize_slug(s)).filter(|s| !s.is_empty()) {
        Some(slug) => format!("chapter_{chapter_index}_{slug}_scene_{scene_index}.png"),
        None => format!("chapter_{chapter_index}_scene_{scene_index}.png"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_runs_of_non_alphanumeric_into_single_underscore() {
        assert_eq!(sanitize_slug("The Dragon's Lair!!"), "The_Dragon_s_Lair");
    }

    #[test]
    fn truncates_to_fifty_chars() {
        let long = "a".repeat(80);
        assert_eq!(sanitize_slug(&long).len(), 50);
    }

    #[test]
    fn filename_without_slug_matches_the_bare_pattern() {
        assert_eq!(scene_image_filename(3, None, 2), "chapter_3_scene_2.png");
    }

    #[test]
    fn filename_with_slug_inserts_it_between_chapter_and_scene() {
        assert_eq!(
            scene_image_filename(3, Some("The Dragon's Lair"), 2),
            "chapter_3_The_Dragon_s_Lair_scene_2.png"
        );
    }

    #[test]
    fn filenames_are_deterministic_for_resume_idempotence() {
        assert_eq!(
            scene_image_filename(1, Some("Intro"), 1),
            scene_image_filename(1, Some("Intro"), 1)
        );
    }
}
