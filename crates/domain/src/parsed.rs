//! Structured results produced by the response parsers.
//!
//! Parsers never fail: malformed text degrades to an empty or partial
//! record. The engine only reads these.

use serde::Serialize;
use std::collections::HashMap;

use crate::rules::DEFAULT_CONFIDENCE;
use crate::stats::{BuiltInStat, CustomValue, NumericStat};

/// Parsed built-in stats from one response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDeltaResponse {
    /// character -> confidence in `[0, 1]`
    pub confidence: HashMap<String, f64>,
    /// stat -> character -> raw delta
    pub deltas: HashMap<NumericStat, HashMap<String, f64>>,
    pub mood: HashMap<String, String>,
    pub last_thought: HashMap<String, String>,
}

impl ParsedDeltaResponse {
    pub fn confidence_for(&self, character: &str) -> f64 {
        self.confidence
            .get(character)
            .copied()
            .unwrap_or(DEFAULT_CONFIDENCE)
    }

    pub fn delta_for(&self, stat: NumericStat, character: &str) -> Option<f64> {
        self.deltas.get(&stat).and_then(|m| m.get(character)).copied()
    }

    /// True when at least one requested character has a value for `stat`.
    pub fn has_values_for(&self, stat: BuiltInStat, characters: &[String]) -> bool {
        let has = |name: &String| match stat.as_numeric() {
            Some(numeric) => self.delta_for(numeric, name).is_some(),
            None if stat == BuiltInStat::Mood => self.mood.contains_key(name),
            None => self.last_thought.contains_key(name),
        };
        characters.iter().any(has)
    }

    /// Number of individual character/stat values.
    pub fn value_count(&self) -> usize {
        self.deltas.values().map(HashMap::len).sum::<usize>()
            + self.mood.len()
            + self.last_thought.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value_count() == 0
    }
}

/// Parsed custom stats from one response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCustomResponse {
    /// character -> confidence, shared by every stat in the response
    pub confidence: HashMap<String, f64>,
    /// statId -> character -> confidence; overrides `confidence`
    pub stat_confidence: HashMap<String, HashMap<String, f64>>,
    /// statId -> character -> raw delta (numeric stats)
    pub deltas: HashMap<String, HashMap<String, f64>>,
    /// statId -> character -> value (non-numeric stats)
    pub values: HashMap<String, HashMap<String, CustomValue>>,
}

impl ParsedCustomResponse {
    pub fn confidence_for(&self, stat_id: &str, character: &str) -> f64 {
        self.stat_confidence
            .get(stat_id)
            .and_then(|m| m.get(character))
            .or_else(|| self.confidence.get(character))
            .copied()
            .unwrap_or(DEFAULT_CONFIDENCE)
    }

    pub fn delta_for(&self, stat_id: &str, character: &str) -> Option<f64> {
        self.deltas.get(stat_id).and_then(|m| m.get(character)).copied()
    }

    pub fn value_for(&self, stat_id: &str, character: &str) -> Option<&CustomValue> {
        self.values.get(stat_id).and_then(|m| m.get(character))
    }

    /// True when at least one requested character has a delta or value.
    pub fn has_values_for(&self, stat_id: &str, characters: &[String]) -> bool {
        characters.iter().any(|name| {
            self.delta_for(stat_id, name).is_some() || self.value_for(stat_id, name).is_some()
        })
    }

    pub fn value_count(&self) -> usize {
        self.deltas.values().map(HashMap::len).sum::<usize>()
            + self.values.values().map(HashMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.value_count() == 0
    }

    /// Replace one stat's entries with those from `other`, pinning the
    /// confidences `other` reported for them.
    pub fn splice_stat(&mut self, other: &ParsedCustomResponse, stat_id: &str) {
        self.deltas.remove(stat_id);
        self.values.remove(stat_id);
        self.stat_confidence.remove(stat_id);

        let mut pinned = HashMap::new();
        if let Some(deltas) = other.deltas.get(stat_id) {
            for name in deltas.keys() {
                pinned.insert(name.clone(), other.confidence_for(stat_id, name));
            }
            self.deltas.insert(stat_id.to_string(), deltas.clone());
        }
        if let Some(values) = other.values.get(stat_id) {
            for name in values.keys() {
                pinned.insert(name.clone(), other.confidence_for(stat_id, name));
            }
            self.values.insert(stat_id.to_string(), values.clone());
        }
        if !pinned.is_empty() {
            self.stat_confidence.insert(stat_id.to_string(), pinned);
        }
    }
}
