//! Vision phrase extraction from reading text
//!
//! Scans prose for capitalized noun phrases introduced or followed by
//! vision wording ("saw a X", "vision of X", "X appears", "X emerges", ...).
//! Results are ordered by where they first occur in the text, deduplicated
//! case-insensitively, and capped at [`MAX_VISIONS`].

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::{VisionError, VisionResult};

/// Upper bound on visions per reading (and per generation job)
pub const MAX_VISIONS: usize = 5;

/// One to four capitalized words
const NOUN_PHRASE: &str = r"([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+){0,3})";

const ARTICLES: [&str; 3] = ["the", "a", "an"];

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            format!(r"\b(?:saw|see|sees|seen)\s+(?:a|an|the)\s+{}", NOUN_PHRASE),
            format!(r"\b[Vv]isions?\s+of\s+(?:(?:a|an|the)\s+)?{}", NOUN_PHRASE),
            format!(r"{}\s+(?:appears|appeared)\b", NOUN_PHRASE),
            format!(r"{}\s+(?:emerges|emerged)\b", NOUN_PHRASE),
            format!(r"{}\s+(?:manifests|manifested)\b", NOUN_PHRASE),
            format!(r"{}\s+(?:reveals|revealed)\s+(?:itself|herself|himself)\b", NOUN_PHRASE),
        ]
        .iter()
        .map(|p| Regex::new(p).expect("vision pattern is a valid regex"))
        .collect()
    })
}

/// Extract up to five distinct vision labels in first-seen order
///
/// Never fails: text without matches yields an empty list.
pub fn extract(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, usize, String)> = Vec::new();

    for (pattern_index, pattern) in patterns().iter().enumerate() {
        for captures in pattern.captures_iter(text) {
            if let Some(phrase) = captures.get(1) {
                if let Some(label) = normalize(phrase.as_str()) {
                    found.push((phrase.start(), pattern_index, label));
                }
            }
        }
    }

    found.sort_by_key(|(offset, pattern_index, _)| (*offset, *pattern_index));

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(_, _, label)| label)
        .filter(|label| seen.insert(label.to_lowercase()))
        .take(MAX_VISIONS)
        .collect()
}

/// Extract from an untyped JSON value; anything but a string is rejected
pub fn extract_from_value(value: &serde_json::Value) -> VisionResult<Vec<String>> {
    value
        .as_str()
        .map(extract)
        .ok_or_else(|| VisionError::InvalidArgument("text must be a string".to_string()))
}

/// Trim, collapse whitespace, drop leading articles, title-case
fn normalize(phrase: &str) -> Option<String> {
    let mut words: Vec<&str> = phrase.split_whitespace().collect();
    while words
        .first()
        .is_some_and(|w| ARTICLES.contains(&w.to_lowercase().as_str()))
    {
        words.remove(0);
    }
    if words.is_empty() {
        return None;
    }

    Some(
        words
            .iter()
            .map(|word| title_case(word))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
