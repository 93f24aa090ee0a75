//! Extraction settings value object
//!
//! The engine receives one fully resolved `ExtractionSettings` per run and
//! validates it once at the boundary. Settings deserialize from camelCase
//! JSON with every field optional; missing fields take the defaults below.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::custom_stat::CustomStatDefinition;
use crate::error::DomainError;
use crate::mood::MoodLabel;
use crate::rules::{clamp_stat, DeltaPolicy};
use crate::stats::{BuiltInStat, NumericStat};

/// Hard cap on sequential-mode worker pool size.
pub const MAX_WORKERS: usize = 8;

/// Hard cap on the retry/repair ladder budget.
pub const MAX_RETRY_BUDGET: u32 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// One batched request per visibility scope.
    #[default]
    Unified,
    /// One request per stat, public stats through worker pools.
    Sequential,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::Unified => write!(f, "unified"),
            ExtractionMode::Sequential => write!(f, "sequential"),
        }
    }
}

impl std::str::FromStr for ExtractionMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unified" | "batched" => Ok(ExtractionMode::Unified),
            "sequential" | "parallel" | "per_stat" => Ok(ExtractionMode::Sequential),
            _ => Err(DomainError::parse(format!("Unknown extraction mode: {}", s))),
        }
    }
}

/// All configurable extraction settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionSettings {
    // ============================================================================
    // Request Planning
    // ============================================================================

    pub extraction_mode: ExtractionMode,

    /// Built-in stats to extract
    pub enabled_stats: Vec<BuiltInStat>,

    /// Built-in stats requested once per owner instead of publicly
    pub private_stats: Vec<BuiltInStat>,

    pub custom_stats: Vec<CustomStatDefinition>,

    /// Requested worker pool size in sequential mode (capped at MAX_WORKERS)
    pub max_concurrent_calls: usize,

    // ============================================================================
    // Merge Rules
    // ============================================================================

    pub max_delta_per_turn: u32,

    /// Dampening factor in [0, 1]; 0 ignores confidence entirely
    pub confidence_dampening: f64,

    /// Minimum confidence required to change mood
    pub mood_stickiness: f64,

    // ============================================================================
    // Retry / Repair
    // ============================================================================

    pub strict_json_repair: bool,
    pub max_retries_per_stat: u32,

    // ============================================================================
    // Baselines
    // ============================================================================

    pub default_affection: i32,
    pub default_trust: i32,
    pub default_desire: i32,
    pub default_connection: i32,
    pub default_mood: String,

    // ============================================================================
    // Diagnostics
    // ============================================================================

    pub debug: bool,

    /// Keep prompts and context text in the debug record
    pub include_context_in_diagnostics: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            extraction_mode: ExtractionMode::Unified,
            enabled_stats: BuiltInStat::all().to_vec(),
            private_stats: Vec::new(),
            custom_stats: Vec::new(),
            max_concurrent_calls: 3,
            max_delta_per_turn: 15,
            confidence_dampening: 0.65,
            mood_stickiness: 0.6,
            strict_json_repair: true,
            max_retries_per_stat: 2,
            default_affection: 50,
            default_trust: 50,
            default_desire: 50,
            default_connection: 50,
            default_mood: MoodLabel::Neutral.display_name().to_string(),
            debug: false,
            include_context_in_diagnostics: false,
        }
    }
}

impl ExtractionSettings {
    /// Load scalar options from environment variables, using defaults for
    /// missing or unparseable values. Stat lists are left at their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            extraction_mode: env_or("RAPPORT_EXTRACTION_MODE", defaults.extraction_mode),
            max_concurrent_calls: env_or("RAPPORT_MAX_CONCURRENT_CALLS", defaults.max_concurrent_calls),
            max_delta_per_turn: env_or("RAPPORT_MAX_DELTA_PER_TURN", defaults.max_delta_per_turn),
            confidence_dampening: env_or("RAPPORT_CONFIDENCE_DAMPENING", defaults.confidence_dampening),
            mood_stickiness: env_or("RAPPORT_MOOD_STICKINESS", defaults.mood_stickiness),
            strict_json_repair: env_or("RAPPORT_STRICT_JSON_REPAIR", defaults.strict_json_repair),
            max_retries_per_stat: env_or("RAPPORT_MAX_RETRIES_PER_STAT", defaults.max_retries_per_stat),
            debug: env_or("RAPPORT_DEBUG", defaults.debug),
            ..defaults
        }
    }

    pub fn is_enabled(&self, stat: BuiltInStat) -> bool {
        self.enabled_stats.contains(&stat)
    }

    pub fn is_private(&self, stat: BuiltInStat) -> bool {
        self.private_stats.contains(&stat)
    }

    /// Enabled built-ins in protocol order, without duplicates.
    pub fn enabled_builtins(&self) -> Vec<BuiltInStat> {
        BuiltInStat::all()
            .iter()
            .copied()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }

    /// Custom stats that are switched on for tracking.
    pub fn tracked_custom_stats(&self) -> impl Iterator<Item = &CustomStatDefinition> {
        self.custom_stats.iter().filter(|d| d.track)
    }

    pub fn default_numeric(&self, stat: NumericStat) -> i32 {
        let raw = match stat {
            NumericStat::Affection => self.default_affection,
            NumericStat::Trust => self.default_trust,
            NumericStat::Desire => self.default_desire,
            NumericStat::Connection => self.default_connection,
        };
        clamp_stat(raw as f64)
    }

    /// Canonical default mood label.
    pub fn default_mood_label(&self) -> String {
        self.default_mood
            .parse::<MoodLabel>()
            .unwrap_or_default()
            .display_name()
            .to_string()
    }

    /// Policy for a built-in numeric stat.
    pub fn delta_policy(&self) -> DeltaPolicy {
        DeltaPolicy::new(self.max_delta_per_turn, self.confidence_dampening)
    }

    /// Policy for a numeric custom stat, honoring its own bound.
    pub fn custom_delta_policy(&self, def: &CustomStatDefinition) -> DeltaPolicy {
        DeltaPolicy::new(
            def.effective_max_delta(self.max_delta_per_turn),
            self.confidence_dampening,
        )
    }

    /// Retry/repair attempts allowed after the initial request.
    pub fn retry_budget(&self) -> u32 {
        if self.strict_json_repair {
            self.max_retries_per_stat.min(MAX_RETRY_BUDGET)
        } else {
            0
        }
    }

    /// Validate every option once, before the engine starts.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_delta_per_turn < 1 {
            return Err(DomainError::validation("maxDeltaPerTurn must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.confidence_dampening) {
            return Err(DomainError::validation(format!(
                "confidenceDampening must be within [0, 1], got {}",
                self.confidence_dampening
            )));
        }
        if !(0.0..=1.0).contains(&self.mood_stickiness) {
            return Err(DomainError::validation(format!(
                "moodStickiness must be within [0, 1], got {}",
                self.mood_stickiness
            )));
        }
        if self.max_concurrent_calls == 0 {
            return Err(DomainError::validation("maxConcurrentCalls must be at least 1"));
        }
        if self.default_mood.parse::<MoodLabel>().is_err() {
            return Err(DomainError::validation(format!(
                "defaultMood is not a known mood: {}",
                self.default_mood
            )));
        }

        let mut seen = HashSet::new();
        for def in &self.custom_stats {
            def.validate()?;
            if !seen.insert(def.id.as_str()) {
                return Err(DomainError::constraint(format!(
                    "duplicate custom stat id: {}",
                    def.id
                )));
            }
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_stat::CustomStatKind;

    #[test]
    fn defaults_are_valid() {
        let settings = ExtractionSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.enabled_builtins().len(), 6);
        assert_eq!(settings.default_mood_label(), "Neutral");
    }

    #[test]
    fn retry_budget_is_capped_and_gated() {
        let mut settings = ExtractionSettings {
            max_retries_per_stat: 9,
            ..Default::default()
        };
        assert_eq!(settings.retry_budget(), MAX_RETRY_BUDGET);
        settings.strict_json_repair = false;
        assert_eq!(settings.retry_budget(), 0);
    }

    #[test]
    fn rejects_out_of_range_factors() {
        let settings = ExtractionSettings {
            confidence_dampening: 1.5,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(DomainError::Validation(_))));

        let settings = ExtractionSettings {
            mood_stickiness: f64::NAN,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = ExtractionSettings {
            max_delta_per_turn: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_custom_ids() {
        let def = CustomStatDefinition::new("rivalry", CustomStatKind::Numeric, "Rivalry");
        let settings = ExtractionSettings {
            custom_stats: vec![def.clone(), def],
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(DomainError::Constraint(_))));
    }

    #[test]
    fn custom_policy_uses_override() {
        let def = CustomStatDefinition::new("rivalry", CustomStatKind::Numeric, "Rivalry")
            .with_max_delta(4);
        let settings = ExtractionSettings::default();
        assert_eq!(settings.custom_delta_policy(&def).max_delta, 4);
        assert_eq!(settings.delta_policy().max_delta, 15);
    }

    #[test]
    fn deserializes_partial_camel_case_json() {
        let json = r#"{ "extractionMode": "sequential", "maxConcurrentCalls": 8, "privateStats": ["lastThought"] }"#;
        let settings: ExtractionSettings = serde_json::from_str(json).expect("valid settings");
        assert_eq!(settings.extraction_mode, ExtractionMode::Sequential);
        assert_eq!(settings.max_concurrent_calls, 8);
        assert!(settings.is_private(BuiltInStat::LastThought));
        assert_eq!(settings.max_delta_per_turn, 15);
    }
}
