use std::sync::LazyLock;

use regex::Regex;

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("mention pattern is valid"));

/// Pull `@name` tokens out of comment text, left to right, without the `@`.
/// Repeats are kept: "@a @a" yields two tokens.
pub fn extract_mentions(text: &str) -> Vec<String> {
    MENTION_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}
