//! Text processing utilities.

use regex::Regex;
use std::sync::OnceLock;

static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

/// Collapse runs of whitespace into single spaces and trim both ends.
pub fn normalize_whitespace(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    whitespace_re().replace_all(s, " ").trim().to_string()
}

/// Canonical form of an entity name for exact matching: whitespace collapsed,
/// lowercased. `"  San  Francisco "` and `"san francisco"` compare equal.
pub fn normalize_name(s: &str) -> String {
    normalize_whitespace(s).to_lowercase()
}

/// Truncate to at most `max_len` characters (not bytes), ending in `"..."` when
/// anything was cut. `max_len <= 3` yields only dots.
pub fn truncate_with_ellipsis(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }

    let keep: String = s.chars().take(max_len - 3).collect();
    format!("{keep}...")
}

/// Pull the JSON payload out of a model response that may wrap it in a
/// markdown fence or surrounding prose.
///
/// Tries a ```` ```json ```` fence, then a plain ```` ``` ```` fence, then the
/// outermost `{...}` and finally `[...]`.
pub fn extract_json_from_response(s: &str) -> Option<&str> {
    if let Some(inner) = fenced_block(s, "```json").or_else(|| fenced_block(s, "```")) {
        return Some(inner);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (s.find(open), s.rfind(close)) {
            if end > start {
                return Some(&s[start..=end]);
            }
        }
    }

    None
}

fn fenced_block<'a>(s: &'a str, fence: &str) -> Option<&'a str> {
    let after_fence = s.find(fence)? + fence.len();
    let content_start = after_fence + s[after_fence..].find('\n')? + 1;
    let close = s[content_start..].find("```")?;
    let content = s[content_start..content_start + close].trim();
    (!content.is_empty()).then_some(content)
}
