//! Type-specific normalization for parsed values.
//!
//! Every function returns `None` when the value cannot be used; callers drop
//! the field for that character and carry on.

use crate::mood::MoodLabel;
use crate::stats::MAX_LIST_ENTRIES;

/// Maximum characters kept from a "last thought".
pub const LAST_THOUGHT_MAX_CHARS: usize = 600;

/// Default cap for `text_short` custom stats without their own limit.
pub const DEFAULT_TEXT_MAX_LENGTH: usize = 120;

/// Resolve a mood against the fixed vocabulary.
pub fn normalize_mood(raw: &str) -> Option<String> {
    raw.parse::<MoodLabel>()
        .ok()
        .map(|m| m.display_name().to_string())
}

pub fn normalize_last_thought(raw: &str) -> Option<String> {
    normalize_short_text(raw, LAST_THOUGHT_MAX_CHARS)
}

/// Trim, collapse to `max_chars` characters, and reject blank text.
pub fn normalize_short_text(raw: &str, max_chars: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || max_chars == 0 {
        return None;
    }
    let capped: String = trimmed.chars().take(max_chars).collect();
    Some(capped.trim_end().to_string())
}

/// Resolve an enum value to the canonical spelling of one allowed option.
pub fn normalize_enum_option(raw: &str, options: &[String]) -> Option<String> {
    let wanted = raw.trim();
    if wanted.is_empty() {
        return None;
    }
    options
        .iter()
        .find(|opt| opt.trim().eq_ignore_ascii_case(wanted))
        .map(|opt| opt.trim().to_string())
}

/// Interpret loose boolean text.
pub fn parse_bool_text(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Trim entries, drop blanks, de-duplicate case-insensitively keeping the
/// first spelling, and cap the list at [`MAX_LIST_ENTRIES`].
pub fn normalize_list(items: &[String], max_chars: usize) -> Option<Vec<String>> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for item in items {
        let Some(text) = normalize_short_text(item, max_chars) else {
            continue;
        };
        let key = text.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(text);
        if out.len() == MAX_LIST_ENTRIES {
            break;
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_resolves_to_canonical_label() {
        assert_eq!(normalize_mood("happy").as_deref(), Some("Happy"));
        assert_eq!(normalize_mood("ecstatic"), None);
    }

    #[test]
    fn short_text_is_trimmed_and_capped() {
        assert_eq!(normalize_short_text("  hello  ", 10).as_deref(), Some("hello"));
        assert_eq!(normalize_short_text("abcdef", 3).as_deref(), Some("abc"));
        assert_eq!(normalize_short_text("   ", 10), None);
    }

    #[test]
    fn last_thought_cap_counts_characters_not_bytes() {
        let long: String = "é".repeat(LAST_THOUGHT_MAX_CHARS + 10);
        let out = normalize_last_thought(&long).expect("non-empty");
        assert_eq!(out.chars().count(), LAST_THOUGHT_MAX_CHARS);
    }

    #[test]
    fn enum_option_matches_case_insensitively() {
        let options = vec!["Dating".to_string(), "Friends".to_string()];
        assert_eq!(normalize_enum_option("dating", &options).as_deref(), Some("Dating"));
        assert_eq!(normalize_enum_option("married", &options), None);
    }

    #[test]
    fn bool_text_variants() {
        assert_eq!(parse_bool_text("Yes"), Some(true));
        assert_eq!(parse_bool_text("0"), Some(false));
        assert_eq!(parse_bool_text("maybe"), None);
    }

    #[test]
    fn list_is_deduplicated_and_capped() {
        let mut items: Vec<String> = vec!["Rose".into(), "rose".into(), " ".into()];
        items.extend((0..30).map(|i| format!("item{i}")));
        let out = normalize_list(&items, 50).expect("non-empty");
        assert_eq!(out.len(), MAX_LIST_ENTRIES);
        assert_eq!(out[0], "Rose");
        assert_eq!(out[1], "item0");
    }
}
