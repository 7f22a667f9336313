/// Extracts a JSON object from a raw model response, tolerating markdown
/// code fences the model may have wrapped it in: try a ```json fence, then
/// a plain ``` fence, then a raw `{...}` scan.
pub fn extract_json(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + "```json".len()..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim().to_string());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + "```".len()..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim().to_string());
        }
    }

    let first_brace = trimmed.find('{')?;
    let last_brace = trimmed.rfind('}')?;
    if last_brace < first_brace {
        return None;
    }
    Some(trimmed[first_brace..=last_brace].to_string())
}
