use super::StylePrompt;

/// Extract the prompt triple from raw analyzer text.
///
/// Tries the whole trimmed text first, then the slice from the first `{`
/// to the last `}`. Braces are not balanced, so text holding several JSON
/// objects or stray braces may fail or pick up the wrong span. Returns
/// `None` when nothing parses.
pub fn parse_style_prompt(text: &str) -> Option<StylePrompt> {
    let trimmed = text.trim();
    if let Ok(parsed) = serde_json::from_str::<StylePrompt>(trimmed) {
        return Some(parsed);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<StylePrompt>(&trimmed[start..=end]).ok()
}
