//! Parser for the JSON stat protocol.
//!
//! Models wrap JSON in prose or markdown fences, misspell names, and mix
//! numbers with numeric strings. The parser takes the outermost JSON object,
//! resolves names against the requested characters (and the user alias),
//! and keeps whatever fits. It never fails.

use regex_lite::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

use rapport_domain::{
    BuiltInStat, CustomStatDefinition, CustomValue, ParsedCustomResponse, ParsedDeltaResponse,
};

use crate::infrastructure::ports::ResponseParserPort;

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex"));

// Model-specific special tokens (e.g. <|end|>, [INST])
static SPECIAL_TOKENS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[^|>]+\|>|\[/?INST\]").expect("valid regex"));

/// Reads responses shaped like
/// `{"characters":[{"name":..,"confidence":..,"deltas":{..},"mood":..,"lastThought":..,"custom":{..}}]}`.
///
/// A top-level object keyed by character name is accepted as well.
#[derive(Debug, Clone, Default)]
pub struct JsonResponseParser;

impl JsonResponseParser {
    pub fn new() -> Self {
        Self
    }
}

impl ResponseParserPort for JsonResponseParser {
    fn parse_builtin(
        &self,
        raw: &str,
        characters: &[String],
        stats: &[BuiltInStat],
        max_delta: u32,
        aliases: &HashMap<String, String>,
    ) -> ParsedDeltaResponse {
        let mut parsed = ParsedDeltaResponse::default();
        let Some(root) = extract_json(raw) else {
            return parsed;
        };
        let bound = f64::from(max_delta.max(1));

        for (name, entry) in character_entries(&root, characters, aliases) {
            if let Some(conf) = entry.get("confidence").and_then(number) {
                parsed.confidence.entry(name.clone()).or_insert(unit(conf));
            }
            for stat in stats {
                match stat.as_numeric() {
                    Some(numeric) => {
                        let Some(delta) = lookup(entry, "deltas", stat.key()).and_then(number)
                        else {
                            continue;
                        };
                        parsed
                            .deltas
                            .entry(numeric)
                            .or_default()
                            .entry(name.clone())
                            .or_insert(delta.clamp(-bound, bound));
                    }
                    None if *stat == BuiltInStat::Mood => {
                        if let Some(mood) = entry.get("mood").and_then(text) {
                            parsed.mood.entry(name.clone()).or_insert(mood);
                        }
                    }
                    None => {
                        let thought = ["lastThought", "last_thought", "thought"]
                            .iter()
                            .find_map(|key| entry.get(*key).and_then(text));
                        if let Some(thought) = thought {
                            parsed.last_thought.entry(name.clone()).or_insert(thought);
                        }
                    }
                }
            }
        }
        parsed
    }

    fn parse_custom(
        &self,
        raw: &str,
        characters: &[String],
        stats: &[CustomStatDefinition],
        max_delta: u32,
        aliases: &HashMap<String, String>,
    ) -> ParsedCustomResponse {
        let mut parsed = ParsedCustomResponse::default();
        let Some(root) = extract_json(raw) else {
            return parsed;
        };

        for (name, entry) in character_entries(&root, characters, aliases) {
            if let Some(conf) = entry.get("confidence").and_then(number) {
                parsed.confidence.entry(name.clone()).or_insert(unit(conf));
            }
            for def in stats {
                let Some(reported) = lookup(entry, "custom", &def.id) else {
                    continue;
                };
                // {"value": .., "confidence": ..} carries its own confidence
                let (value, stat_conf) = match reported {
                    Value::Object(obj) => (
                        obj.get("value").or_else(|| obj.get("delta")),
                        obj.get("confidence").and_then(number),
                    ),
                    other => (Some(other), None),
                };
                let Some(value) = value else {
                    continue;
                };

                let stored = if def.is_numeric() {
                    let bound = f64::from(def.effective_max_delta(max_delta));
                    match number(value) {
                        Some(delta) => {
                            parsed
                                .deltas
                                .entry(def.id.clone())
                                .or_default()
                                .entry(name.clone())
                                .or_insert(delta.clamp(-bound, bound));
                            true
                        }
                        None => false,
                    }
                } else {
                    match custom_value(value) {
                        Some(v) => {
                            parsed
                                .values
                                .entry(def.id.clone())
                                .or_default()
                                .entry(name.clone())
                                .or_insert(v);
                            true
                        }
                        None => false,
                    }
                };
                if let (true, Some(conf)) = (stored, stat_conf) {
                    parsed
                        .stat_confidence
                        .entry(def.id.clone())
                        .or_default()
                        .entry(name.clone())
                        .or_insert(unit(conf));
                }
            }
        }
        parsed
    }
}

/// Pull the outermost JSON object out of model text.
fn extract_json(raw: &str) -> Option<Value> {
    let cleaned = SPECIAL_TOKENS_RE.replace_all(raw, "");
    let body = CODE_FENCE_RE
        .captures(&cleaned)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| cleaned.to_string());

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&body[start..=end]) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Response is not valid JSON");
            None
        }
    }
}

/// Per-character objects resolved to requested names, in response order.
fn character_entries<'v>(
    root: &'v Value,
    characters: &[String],
    aliases: &HashMap<String, String>,
) -> Vec<(String, &'v Map<String, Value>)> {
    let mut entries = Vec::new();
    match root.get("characters") {
        Some(Value::Array(items)) => {
            for item in items {
                let Some(obj) = item.as_object() else {
                    continue;
                };
                let Some(raw_name) = ["name", "character"]
                    .iter()
                    .find_map(|key| obj.get(*key).and_then(Value::as_str))
                else {
                    continue;
                };
                if let Some(name) = resolve_name(raw_name, characters, aliases) {
                    entries.push((name, obj));
                }
            }
        }
        Some(Value::Object(by_name)) => collect_keyed(by_name, characters, aliases, &mut entries),
        _ => {
            if let Some(by_name) = root.as_object() {
                collect_keyed(by_name, characters, aliases, &mut entries);
            }
        }
    }
    entries
}

fn collect_keyed<'v>(
    by_name: &'v Map<String, Value>,
    characters: &[String],
    aliases: &HashMap<String, String>,
    entries: &mut Vec<(String, &'v Map<String, Value>)>,
) {
    for (raw_name, item) in by_name {
        if let (Some(name), Some(obj)) = (resolve_name(raw_name, characters, aliases), item.as_object())
        {
            entries.push((name, obj));
        }
    }
}

/// Map a reported name onto one of the requested characters.
fn resolve_name(raw: &str, characters: &[String], aliases: &HashMap<String, String>) -> Option<String> {
    let wanted = raw.trim();
    let canonical = aliases
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(wanted))
        .map(|(_, canonical)| canonical.as_str())
        .unwrap_or(wanted);
    characters
        .iter()
        .find(|c| c.as_str() == canonical)
        .or_else(|| characters.iter().find(|c| c.eq_ignore_ascii_case(canonical)))
        .cloned()
}

/// `entry[group][key]`, falling back to `entry[key]`.
fn lookup<'v>(entry: &'v Map<String, Value>, group: &str, key: &str) -> Option<&'v Value> {
    entry
        .get(group)
        .and_then(|g| g.get(key))
        .or_else(|| entry.get(key))
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('+').parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn custom_value(value: &Value) -> Option<CustomValue> {
    match value {
        Value::Bool(b) => Some(CustomValue::Bool(*b)),
        Value::String(s) => Some(CustomValue::Text(s.clone())),
        Value::Number(n) => Some(CustomValue::Text(n.to_string())),
        Value::Array(items) => Some(CustomValue::List(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
        )),
        Value::Null | Value::Object(_) => None,
    }
}
