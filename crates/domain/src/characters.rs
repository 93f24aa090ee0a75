//! Reserved character names and user aliasing.
//!
//! Character names are plain strings. Two values are reserved: one for the
//! user (the human side of the chat) and one for the shared owner of
//! globally scoped custom stats.

use std::collections::HashMap;

/// Reserved name for the user.
pub const USER_SENTINEL: &str = "__user__";

/// Reserved owner key for globally scoped custom stats.
pub const GLOBAL_OWNER: &str = "__global__";

/// True when the character list is exactly the user and nobody else.
pub fn is_user_only(characters: &[String]) -> bool {
    matches!(characters, [only] if only == USER_SENTINEL)
}

/// Replace the user sentinel with the user's display name.
///
/// A blank display name leaves the prompt untouched so the model still sees
/// a stable identifier.
pub fn alias_user_in_prompt(prompt: &str, user_display_name: &str) -> String {
    let display = user_display_name.trim();
    if display.is_empty() {
        return prompt.to_string();
    }
    prompt.replace(USER_SENTINEL, display)
}

/// Reverse alias map handed to the parsers: display name -> canonical name.
pub fn user_alias_map(user_display_name: &str) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    let display = user_display_name.trim();
    if !display.is_empty() {
        aliases.insert(display.to_string(), USER_SENTINEL.to_string());
    }
    aliases
}
