use imaginize_core::ChapterSpec;

/// System prompt for the unified analyze call (spec §4.4). Prompt text
/// itself is explicitly out of scope (spec §1 Non-goals); this is a
/// reasonable default, not a specified literal.
pub fn analyze_system_prompt() -> String {
    "You are a literary analyst. Given a book chapter, identify visually \
     illustratable scenes and the story entities (characters, creatures, \
     places, items, objects) that appear in it. Respond with a single JSON \
     object and nothing else: {\"scenes\":[{\"page_range\":string,\
     \"source_quote\":string,\"visual_description\":string}],\
     \"entities\":[{\"type\":string,\"name\":string,\"description\":string}]}"
        .to_string()
}

pub fn analyze_user_prompt(chapter: &ChapterSpec, element_context: &str, num_scenes: u32) -> String {
    format!(
        "Chapter {index}: {title}\n\n\
         Known entities so far:\n{context}\n\n\
         Target number of scenes: approximately {num_scenes}.\n\n\
         Chapter text:\n{text}",
        index = chapter.index,
        title = chapter.title,
        context = if element_context.is_empty() { "(none yet)" } else { element_context },
        num_scenes = num_scenes,
        text = chapter.raw_text,
    )
}

pub fn resolve_entity_system_prompt() -> String {
    "You resolve whether a newly extracted story entity refers to the same \
     entity as an existing catalog entry. Respond with a single JSON object \
     and nothing else: {\"is_match\":bool,\"confidence\":number between 0 \
     and 1,\"reasoning\":string}"
        .to_string()
}

pub fn resolve_entity_user_prompt(
    new_name: &str,
    new_type: &str,
    candidate_name: &str,
    candidate_description: &str,
) -> String {
    format!(
        "New entity: name=\"{new_name}\", type={new_type}.\n\
         Existing candidate: name=\"{candidate_name}\", description=\"{candidate_description}\".\n\
         Are these the same entity?"
    )
}

pub fn enrich_description_system_prompt() -> String {
    "You merge a base description with new details about the same story \
     entity into one coherent paragraph, preserving all facts. Respond with \
     plain text only, no JSON, no preamble."
        .to_string()
}

pub fn enrich_description_user_prompt(base: &str, new_details: &[String]) -> String {
    format!(
        "Base description:\n{base}\n\nNew details to fold in:\n- {details}",
        details = new_details.join("\n- ")
    )
}
