//! User-defined stat definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;
use crate::normalize::{
    normalize_enum_option, normalize_list, normalize_short_text, parse_bool_text,
    DEFAULT_TEXT_MAX_LENGTH,
};
use crate::rules::clamp_stat;
use crate::stats::CustomValue;

/// Numeric fallback when a numeric stat's default is not a number.
const FALLBACK_NUMERIC_DEFAULT: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomStatKind {
    Numeric,
    EnumSingle,
    Boolean,
    TextShort,
}

impl fmt::Display for CustomStatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomStatKind::Numeric => write!(f, "numeric"),
            CustomStatKind::EnumSingle => write!(f, "enum_single"),
            CustomStatKind::Boolean => write!(f, "boolean"),
            CustomStatKind::TextShort => write!(f, "text_short"),
        }
    }
}

impl std::str::FromStr for CustomStatKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numeric" | "number" => Ok(CustomStatKind::Numeric),
            "enum_single" | "enum" => Ok(CustomStatKind::EnumSingle),
            "boolean" | "bool" => Ok(CustomStatKind::Boolean),
            "text_short" | "text" => Ok(CustomStatKind::TextShort),
            _ => Err(DomainError::parse(format!("Unknown custom stat kind: {}", s))),
        }
    }
}

/// Configured default for a custom stat, before kind-specific normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatDefault {
    Number(f64),
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

/// A user-defined stat.
///
/// `id` is lowercase, unique across the configured definitions, and stable
/// once created: it keys the stored statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomStatDefinition {
    pub id: String,
    pub kind: CustomStatKind,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Falls back per kind when absent: 50, `false`, the first enum option,
    /// or no value for text.
    #[serde(default)]
    pub default_value: Option<StatDefault>,
    #[serde(default)]
    pub max_delta_per_turn: Option<u32>,
    #[serde(default)]
    pub enum_options: Vec<String>,
    #[serde(default)]
    pub text_max_length: Option<usize>,
    #[serde(default = "default_true")]
    pub track: bool,
    #[serde(default)]
    pub global_scope: bool,
    #[serde(default)]
    pub private_to_owner: bool,
}

fn default_true() -> bool {
    true
}

impl CustomStatDefinition {
    pub fn new(id: impl Into<String>, kind: CustomStatKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            description: String::new(),
            default_value: None,
            max_delta_per_turn: None,
            enum_options: Vec::new(),
            text_max_length: None,
            track: true,
            global_scope: false,
            private_to_owner: false,
        }
    }

    pub fn with_default(mut self, value: StatDefault) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_max_delta(mut self, max_delta: u32) -> Self {
        self.max_delta_per_turn = Some(max_delta);
        self
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.enum_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn global(mut self) -> Self {
        self.global_scope = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.private_to_owner = true;
        self
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == CustomStatKind::Numeric
    }

    /// Global-scope stats are shared by the whole chat, so the private flag
    /// has no effect on them.
    pub fn is_private(&self) -> bool {
        self.private_to_owner && !self.global_scope
    }

    /// Per-stat bound, falling back to the global per-turn bound.
    pub fn effective_max_delta(&self, global_max_delta: u32) -> u32 {
        self.max_delta_per_turn.unwrap_or(global_max_delta).max(1)
    }

    pub fn text_limit(&self) -> usize {
        self.text_max_length.unwrap_or(DEFAULT_TEXT_MAX_LENGTH)
    }

    /// Clamped numeric default.
    pub fn numeric_default(&self) -> i32 {
        match &self.default_value {
            Some(StatDefault::Number(n)) => clamp_stat(*n),
            Some(StatDefault::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(clamp_stat)
                .unwrap_or(FALLBACK_NUMERIC_DEFAULT),
            Some(StatDefault::Bool(_) | StatDefault::List(_)) | None => FALLBACK_NUMERIC_DEFAULT,
        }
    }

    /// Normalized default for non-numeric kinds.
    pub fn non_numeric_default(&self) -> Option<CustomValue> {
        let raw = match &self.default_value {
            Some(StatDefault::Number(n)) => CustomValue::Text(n.to_string()),
            Some(StatDefault::Bool(b)) => CustomValue::Bool(*b),
            Some(StatDefault::Text(s)) => CustomValue::Text(s.clone()),
            Some(StatDefault::List(items)) => CustomValue::List(items.clone()),
            None => match self.kind {
                CustomStatKind::Boolean => CustomValue::Bool(false),
                CustomStatKind::EnumSingle => CustomValue::Text(
                    self.enum_options
                        .iter()
                        .find(|o| !o.trim().is_empty())?
                        .clone(),
                ),
                CustomStatKind::Numeric | CustomStatKind::TextShort => return None,
            },
        };
        self.normalize_value(&raw)
    }

    /// Normalize a parsed value for this stat's kind.
    ///
    /// Returns `None` when the value does not fit the kind (an enum value
    /// outside the options, unparseable boolean text, blank text).
    pub fn normalize_value(&self, value: &CustomValue) -> Option<CustomValue> {
        match self.kind {
            CustomStatKind::Numeric => None,
            CustomStatKind::EnumSingle => match value {
                CustomValue::Text(s) => {
                    normalize_enum_option(s, &self.enum_options).map(CustomValue::Text)
                }
                CustomValue::List(items) => items
                    .iter()
                    .find_map(|s| normalize_enum_option(s, &self.enum_options))
                    .map(CustomValue::Text),
                CustomValue::Bool(_) => None,
            },
            CustomStatKind::Boolean => match value {
                CustomValue::Bool(b) => Some(CustomValue::Bool(*b)),
                CustomValue::Text(s) => parse_bool_text(s).map(CustomValue::Bool),
                CustomValue::List(_) => None,
            },
            CustomStatKind::TextShort => match value {
                CustomValue::Text(s) => {
                    normalize_short_text(s, self.text_limit()).map(CustomValue::Text)
                }
                CustomValue::List(items) => {
                    normalize_list(items, self.text_limit()).map(CustomValue::List)
                }
                CustomValue::Bool(b) => Some(CustomValue::Text(b.to_string())),
            },
        }
    }

    /// Check the definition's own invariants.
    pub fn validate(&self) -> Result<(), DomainError> {
        let valid_id = self
            .id
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
            && self
                .id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid_id {
            return Err(DomainError::validation(format!(
                "custom stat id must be lowercase [a-z][a-z0-9_]*: {:?}",
                self.id
            )));
        }
        if self.max_delta_per_turn == Some(0) {
            return Err(DomainError::validation(format!(
                "custom stat {} has maxDeltaPerTurn 0",
                self.id
            )));
        }
        match self.kind {
            CustomStatKind::EnumSingle => {
                if self.enum_options.iter().all(|o| o.trim().is_empty()) {
                    return Err(DomainError::validation(format!(
                        "enum stat {} has no options",
                        self.id
                    )));
                }
                if self.non_numeric_default().is_none() {
                    return Err(DomainError::validation(format!(
                        "enum stat {} default is not one of its options",
                        self.id
                    )));
                }
            }
            CustomStatKind::Boolean => {
                if self.non_numeric_default().is_none() {
                    return Err(DomainError::validation(format!(
                        "boolean stat {} has a non-boolean default",
                        self.id
                    )));
                }
            }
            CustomStatKind::Numeric | CustomStatKind::TextShort => {}
        }
        Ok(())
    }
}
