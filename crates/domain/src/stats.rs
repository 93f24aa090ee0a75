//! Built-in stat identifiers and the statistics maps the engine produces.
//!
//! Numeric stats hold integers in `[0, 100]` per character. Text stats hold
//! a mood label or a free-text "last thought". Custom stats are keyed by
//! their definition id, then by character name (or [`crate::GLOBAL_OWNER`]
//! for globally scoped stats).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::DomainError;

/// Maximum number of entries kept in a list-valued custom stat.
pub const MAX_LIST_ENTRIES: usize = 20;

/// The numeric built-in stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumericStat {
    Affection,
    Trust,
    Desire,
    Connection,
}

impl NumericStat {
    pub fn all() -> &'static [NumericStat] {
        &[
            NumericStat::Affection,
            NumericStat::Trust,
            NumericStat::Desire,
            NumericStat::Connection,
        ]
    }

    pub fn as_builtin(self) -> BuiltInStat {
        match self {
            NumericStat::Affection => BuiltInStat::Affection,
            NumericStat::Trust => BuiltInStat::Trust,
            NumericStat::Desire => BuiltInStat::Desire,
            NumericStat::Connection => BuiltInStat::Connection,
        }
    }
}

impl fmt::Display for NumericStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_builtin().fmt(f)
    }
}

/// Every built-in stat, numeric and text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuiltInStat {
    Affection,
    Trust,
    Desire,
    Connection,
    Mood,
    LastThought,
}

impl BuiltInStat {
    /// All built-ins in protocol order.
    pub fn all() -> &'static [BuiltInStat] {
        &[
            BuiltInStat::Affection,
            BuiltInStat::Trust,
            BuiltInStat::Desire,
            BuiltInStat::Connection,
            BuiltInStat::Mood,
            BuiltInStat::LastThought,
        ]
    }

    /// Wire key used in prompts, parsed responses, and request metadata.
    pub fn key(&self) -> &'static str {
        match self {
            BuiltInStat::Affection => "affection",
            BuiltInStat::Trust => "trust",
            BuiltInStat::Desire => "desire",
            BuiltInStat::Connection => "connection",
            BuiltInStat::Mood => "mood",
            BuiltInStat::LastThought => "lastThought",
        }
    }

    pub fn as_numeric(&self) -> Option<NumericStat> {
        match self {
            BuiltInStat::Affection => Some(NumericStat::Affection),
            BuiltInStat::Trust => Some(NumericStat::Trust),
            BuiltInStat::Desire => Some(NumericStat::Desire),
            BuiltInStat::Connection => Some(NumericStat::Connection),
            BuiltInStat::Mood | BuiltInStat::LastThought => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_numeric().is_some()
    }
}

impl fmt::Display for BuiltInStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for BuiltInStat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "affection" => Ok(BuiltInStat::Affection),
            "trust" => Ok(BuiltInStat::Trust),
            "desire" => Ok(BuiltInStat::Desire),
            "connection" => Ok(BuiltInStat::Connection),
            "mood" => Ok(BuiltInStat::Mood),
            "lastthought" | "last_thought" => Ok(BuiltInStat::LastThought),
            _ => Err(DomainError::parse(format!("Unknown stat: {}", s))),
        }
    }
}

/// Value of a non-numeric custom stat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomValue::Bool(b) => write!(f, "{}", b),
            CustomValue::Text(s) => write!(f, "{}", s),
            CustomValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// statId -> character (or global owner) -> value
pub type CustomStatistics = BTreeMap<String, BTreeMap<String, i32>>;

/// statId -> character (or global owner) -> value
pub type CustomNonNumericStatistics = BTreeMap<String, BTreeMap<String, CustomValue>>;

/// Built-in statistics for every tracked character.
///
/// All six maps are always present in serialized output, even when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    pub affection: BTreeMap<String, i32>,
    pub trust: BTreeMap<String, i32>,
    pub desire: BTreeMap<String, i32>,
    pub connection: BTreeMap<String, i32>,
    pub mood: BTreeMap<String, String>,
    pub last_thought: BTreeMap<String, String>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn numeric(&self, stat: NumericStat) -> &BTreeMap<String, i32> {
        match stat {
            NumericStat::Affection => &self.affection,
            NumericStat::Trust => &self.trust,
            NumericStat::Desire => &self.desire,
            NumericStat::Connection => &self.connection,
        }
    }

    pub fn numeric_mut(&mut self, stat: NumericStat) -> &mut BTreeMap<String, i32> {
        match stat {
            NumericStat::Affection => &mut self.affection,
            NumericStat::Trust => &mut self.trust,
            NumericStat::Desire => &mut self.desire,
            NumericStat::Connection => &mut self.connection,
        }
    }

    /// Look up a numeric value for a character.
    pub fn numeric_value(&self, stat: NumericStat, character: &str) -> Option<i32> {
        self.numeric(stat).get(character).copied()
    }
}

/// Everything known about the previous turn, supplied by the caller.
///
/// `custom`/`custom_non_numeric` are the resolved previous values (possibly
/// filled with defaults by the caller); the `raw_*` maps contain only values
/// that were actually recorded and decide whether a custom stat already has
/// a baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PriorState {
    pub statistics: Statistics,
    pub custom: CustomStatistics,
    pub custom_non_numeric: CustomNonNumericStatistics,
    pub raw_custom: CustomStatistics,
    pub raw_custom_non_numeric: CustomNonNumericStatistics,
    /// Whether the chat has any earlier tracker output at all
    pub has_tracker_data: bool,
}

impl PriorState {
    /// True when a value was actually recorded for this stat and owner.
    pub fn has_raw_value(&self, stat_id: &str, owner: &str) -> bool {
        self.raw_custom
            .get(stat_id)
            .is_some_and(|m| m.contains_key(owner))
            || self
                .raw_custom_non_numeric
                .get(stat_id)
                .is_some_and(|m| m.contains_key(owner))
    }

    /// True when any owner has a recorded value for this stat.
    pub fn has_any_raw_value(&self, stat_id: &str) -> bool {
        self.raw_custom.get(stat_id).is_some_and(|m| !m.is_empty())
            || self
                .raw_custom_non_numeric
                .get(stat_id)
                .is_some_and(|m| !m.is_empty())
    }

    /// Every owner holding a value for this stat in any of the prior maps,
    /// in sorted order.
    pub fn owners_of(&self, stat_id: &str) -> BTreeSet<&str> {
        let numeric = [&self.custom, &self.raw_custom]
            .into_iter()
            .filter_map(|maps| maps.get(stat_id))
            .flat_map(|m| m.keys());
        let non_numeric = [&self.custom_non_numeric, &self.raw_custom_non_numeric]
            .into_iter()
            .filter_map(|maps| maps.get(stat_id))
            .flat_map(|m| m.keys());
        numeric.chain(non_numeric).map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_stat_parses_wire_keys() {
        for stat in BuiltInStat::all() {
            let parsed: BuiltInStat = stat.key().parse().expect("wire key parses");
            assert_eq!(parsed, *stat);
        }
        assert!("charisma".parse::<BuiltInStat>().is_err());
    }

    #[test]
    fn only_four_builtins_are_numeric() {
        let numeric: Vec<_> = BuiltInStat::all()
            .iter()
            .filter(|s| s.is_numeric())
            .collect();
        assert_eq!(numeric.len(), 4);
        assert!(!BuiltInStat::Mood.is_numeric());
        assert!(!BuiltInStat::LastThought.is_numeric());
    }

    #[test]
    fn empty_statistics_serialize_every_map() {
        let json = serde_json::to_value(Statistics::new()).expect("serializes");
        for key in ["affection", "trust", "desire", "connection", "mood", "lastThought"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn custom_value_deserializes_untagged() {
        let b: CustomValue = serde_json::from_str("true").expect("bool");
        let t: CustomValue = serde_json::from_str("\"calm\"").expect("text");
        let l: CustomValue = serde_json::from_str("[\"a\",\"b\"]").expect("list");
        assert_eq!(b, CustomValue::Bool(true));
        assert_eq!(t, CustomValue::Text("calm".into()));
        assert_eq!(l, CustomValue::List(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn owners_of_collects_every_prior_map() {
        let mut prior = PriorState::default();
        assert!(!prior.has_any_raw_value("tension"));
        prior
            .raw_custom
            .entry("tension".into())
            .or_default()
            .insert("Kai".into(), 70);
        prior
            .custom
            .entry("tension".into())
            .or_default()
            .insert("Ada".into(), 40);
        assert!(prior.has_any_raw_value("tension"));
        assert!(!prior.has_any_raw_value("mood_ring"));
        let owners: Vec<_> = prior.owners_of("tension").into_iter().collect();
        assert_eq!(owners, vec!["Ada", "Kai"]);
    }
}
