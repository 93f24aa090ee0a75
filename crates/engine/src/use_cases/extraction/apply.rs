//! Folding parsed values into the running statistics.
//!
//! Built-ins start from the previous value (or the configured default) for
//! every active character, so characters the model skipped keep their
//! value. Custom stats with a baseline start from it; first-run custom stats
//! are seeded. Every write that comes from a parsed value or a seed is
//! recorded in the diagnostics.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use rapport_domain::normalize::{normalize_last_thought, normalize_mood};
use rapport_domain::{
    apply_mood, apply_numeric_delta, BuiltInStat, CustomNonNumericStatistics, CustomStatDefinition,
    CustomStatistics, CustomValue, ExtractionSettings, MoodDecision, ParsedCustomResponse,
    ParsedDeltaResponse, PriorState, Statistics, GLOBAL_OWNER,
};

use super::coverage::ParsedBatch;
use super::repair::RawOutput;
use super::scope::{CustomStatScope, ExtractionPlan, PlannedBatch, StatVisibility};

/// statKey -> owner -> value
pub type ValueLog = BTreeMap<String, BTreeMap<String, Value>>;

/// What happened to one planned batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTrace {
    pub label: String,
    pub stats: Vec<String>,
    pub characters: Vec<String>,
    pub prompt: String,
    pub outputs: Vec<RawOutput>,
    pub covered: bool,
    pub first_parse_empty: bool,
    pub parsed_values: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeDiagnostics {
    pub parsed: ValueLog,
    pub applied: ValueLog,
    pub seeded: ValueLog,
    /// Characters whose mood was requested but not usable
    pub mood_fallbacks: Vec<String>,
    pub batches: Vec<BatchTrace>,
}

impl MergeDiagnostics {
    fn record(log: &mut ValueLog, stat: &str, owner: &str, value: Value) {
        log.entry(stat.to_string())
            .or_default()
            .insert(owner.to_string(), value);
    }

    pub fn count(log: &ValueLog) -> usize {
        log.values().map(BTreeMap::len).sum()
    }
}

/// Statistics being built for one run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionState {
    pub statistics: Statistics,
    pub custom: CustomStatistics,
    pub custom_non_numeric: CustomNonNumericStatistics,
    pub diagnostics: MergeDiagnostics,
}

impl ExtractionState {
    /// Start from previous values and seed first-run custom stats.
    pub fn initialize(
        settings: &ExtractionSettings,
        characters: &[String],
        prior: &PriorState,
        plan: &ExtractionPlan,
    ) -> Self {
        let mut state = Self::default();

        for stat in settings.enabled_builtins() {
            for name in characters {
                match stat.as_numeric() {
                    Some(numeric) => {
                        let value = prior
                            .statistics
                            .numeric_value(numeric, name)
                            .map(|v| v.clamp(rapport_domain::STAT_MIN, rapport_domain::STAT_MAX))
                            .unwrap_or_else(|| settings.default_numeric(numeric));
                        state
                            .statistics
                            .numeric_mut(numeric)
                            .insert(name.clone(), value);
                    }
                    None if stat == BuiltInStat::Mood => {
                        let mood = prior
                            .statistics
                            .mood
                            .get(name)
                            .and_then(|m| normalize_mood(m))
                            .unwrap_or_else(|| settings.default_mood_label());
                        state.statistics.mood.insert(name.clone(), mood);
                    }
                    None => {
                        if let Some(thought) = prior
                            .statistics
                            .last_thought
                            .get(name)
                            .and_then(|t| normalize_last_thought(t))
                        {
                            state.statistics.last_thought.insert(name.clone(), thought);
                        }
                    }
                }
            }
        }

        for scope in &plan.custom {
            // Baselines are carried over silently; first-run values are seeds.
            let baseline_owners: Vec<String> = match scope.visibility {
                StatVisibility::Global if scope.is_requested() => vec![GLOBAL_OWNER.to_string()],
                StatVisibility::Global => Vec::new(),
                _ => scope.existing.clone(),
            };
            for owner in &baseline_owners {
                state.write_previous(&scope.definition, owner, characters, prior);
            }
            seed_custom_stat(&mut state, scope, characters, prior);
        }

        state
    }

    /// Write the previous (or default) value for one owner. Returns the value
    /// written, for diagnostics.
    fn write_previous(
        &mut self,
        def: &CustomStatDefinition,
        owner: &str,
        characters: &[String],
        prior: &PriorState,
    ) -> Option<Value> {
        if def.is_numeric() {
            let value = previous_numeric(def, owner, characters, prior)
                .unwrap_or_else(|| def.numeric_default());
            self.custom
                .entry(def.id.clone())
                .or_default()
                .insert(owner.to_string(), value);
            Some(json!(value))
        } else {
            let value = previous_non_numeric(def, owner, characters, prior)
                .or_else(|| def.non_numeric_default())?;
            let logged = json!(value);
            self.custom_non_numeric
                .entry(def.id.clone())
                .or_default()
                .insert(owner.to_string(), value);
            Some(logged)
        }
    }
}

/// Previous numeric value for `owner`.
///
/// Global stats fall back to a legacy per-character value when nothing is
/// stored under the global owner, preferring active characters.
pub fn previous_numeric(
    def: &CustomStatDefinition,
    owner: &str,
    characters: &[String],
    prior: &PriorState,
) -> Option<i32> {
    let lookup = |name: &str| {
        prior
            .custom
            .get(&def.id)
            .and_then(|m| m.get(name))
            .or_else(|| prior.raw_custom.get(&def.id).and_then(|m| m.get(name)))
            .copied()
    };
    let found = lookup(owner).or_else(|| {
        if owner == GLOBAL_OWNER {
            legacy_owners(&def.id, characters, prior).find_map(lookup)
        } else {
            None
        }
    });
    found.map(|v| v.clamp(rapport_domain::STAT_MIN, rapport_domain::STAT_MAX))
}

/// Previous non-numeric value for `owner`, normalized for the stat's kind.
pub fn previous_non_numeric(
    def: &CustomStatDefinition,
    owner: &str,
    characters: &[String],
    prior: &PriorState,
) -> Option<CustomValue> {
    let lookup = |name: &str| {
        prior
            .custom_non_numeric
            .get(&def.id)
            .and_then(|m| m.get(name))
            .or_else(|| {
                prior
                    .raw_custom_non_numeric
                    .get(&def.id)
                    .and_then(|m| m.get(name))
            })
            .and_then(|v| def.normalize_value(v))
    };
    lookup(owner).or_else(|| {
        if owner == GLOBAL_OWNER {
            legacy_owners(&def.id, characters, prior).find_map(lookup)
        } else {
            None
        }
    })
}

/// Per-character owners a global stat may inherit from: active characters
/// in request order, then any other recorded owner in sorted order.
fn legacy_owners<'a>(
    stat_id: &'a str,
    characters: &'a [String],
    prior: &'a PriorState,
) -> impl Iterator<Item = &'a str> {
    let active = characters.iter().map(String::as_str);
    let others = prior
        .owners_of(stat_id)
        .into_iter()
        .filter(move |o| *o != GLOBAL_OWNER && !characters.iter().any(|c| c == o));
    active.chain(others)
}

/// Seed every first-run owner of a custom stat with its previous or default
/// value. Seeds count as applied values too. Seeding the same scope twice
/// writes the same values.
pub fn seed_custom_stat(
    state: &mut ExtractionState,
    scope: &CustomStatScope,
    characters: &[String],
    prior: &PriorState,
) {
    for owner in &scope.first_run {
        if let Some(logged) = state.write_previous(&scope.definition, owner, characters, prior) {
            let id = &scope.definition.id;
            MergeDiagnostics::record(&mut state.diagnostics.applied, id, owner, logged.clone());
            MergeDiagnostics::record(&mut state.diagnostics.seeded, id, owner, logged);
        }
    }
}

/// Apply both halves of a parsed batch.
pub fn apply_batch(
    state: &mut ExtractionState,
    batch: &PlannedBatch,
    parsed: &ParsedBatch,
    settings: &ExtractionSettings,
) {
    if !batch.builtin_stats.is_empty() {
        apply_builtin(state, batch, &parsed.builtin, settings);
    }
    if !batch.custom_stats.is_empty() {
        apply_custom(state, batch, &parsed.custom, settings);
    }
}

pub fn apply_builtin(
    state: &mut ExtractionState,
    batch: &PlannedBatch,
    parsed: &ParsedDeltaResponse,
    settings: &ExtractionSettings,
) {
    let policy = settings.delta_policy();

    for stat in &batch.builtin_stats {
        for name in &batch.characters {
            match stat.as_numeric() {
                Some(numeric) => {
                    let Some(delta) = parsed.delta_for(numeric, name) else {
                        continue;
                    };
                    let previous = state
                        .statistics
                        .numeric_value(numeric, name)
                        .unwrap_or_else(|| settings.default_numeric(numeric));
                    let next =
                        apply_numeric_delta(previous, delta, parsed.confidence_for(name), policy);
                    state
                        .statistics
                        .numeric_mut(numeric)
                        .insert(name.clone(), next);
                    let diag = &mut state.diagnostics;
                    MergeDiagnostics::record(&mut diag.parsed, stat.key(), name, json!(delta));
                    MergeDiagnostics::record(&mut diag.applied, stat.key(), name, json!(next));
                }
                None if *stat == BuiltInStat::Mood => {
                    let previous = state
                        .statistics
                        .mood
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| settings.default_mood_label());
                    let proposed = parsed.mood.get(name);
                    let next = match proposed.and_then(|m| normalize_mood(m)) {
                        Some(label) => {
                            match apply_mood(parsed.confidence_for(name), settings.mood_stickiness)
                            {
                                MoodDecision::Adopt => label,
                                MoodDecision::Keep => previous,
                            }
                        }
                        None => {
                            tracing::warn!(
                                character = %name,
                                proposed = ?proposed,
                                "No usable mood, keeping previous"
                            );
                            state.diagnostics.mood_fallbacks.push(name.clone());
                            previous
                        }
                    };
                    if let Some(raw) = proposed {
                        MergeDiagnostics::record(
                            &mut state.diagnostics.parsed,
                            stat.key(),
                            name,
                            json!(raw),
                        );
                    }
                    MergeDiagnostics::record(
                        &mut state.diagnostics.applied,
                        stat.key(),
                        name,
                        json!(next),
                    );
                    state.statistics.mood.insert(name.clone(), next);
                }
                None => {
                    let Some(raw) = parsed.last_thought.get(name) else {
                        continue;
                    };
                    MergeDiagnostics::record(
                        &mut state.diagnostics.parsed,
                        stat.key(),
                        name,
                        json!(raw),
                    );
                    if let Some(thought) = normalize_last_thought(raw) {
                        MergeDiagnostics::record(
                            &mut state.diagnostics.applied,
                            stat.key(),
                            name,
                            json!(thought),
                        );
                        state.statistics.last_thought.insert(name.clone(), thought);
                    }
                }
            }
        }
    }
}

pub fn apply_custom(
    state: &mut ExtractionState,
    batch: &PlannedBatch,
    parsed: &ParsedCustomResponse,
    settings: &ExtractionSettings,
) {
    for def in &batch.custom_stats {
        let targets = batch.targets_for(&def.id);

        if def.global_scope {
            // One shared value, taken from the first target that reported one
            let source = targets.iter().find(|name| {
                parsed.delta_for(&def.id, name).is_some() || parsed.value_for(&def.id, name).is_some()
            });
            if let Some(source) = source {
                apply_custom_value(state, def, parsed, source, GLOBAL_OWNER, settings);
            }
            continue;
        }

        for name in targets {
            apply_custom_value(state, def, parsed, name, name, settings);
        }
    }
}

/// Merge what `source` reported for `def` into `owner`'s slot.
fn apply_custom_value(
    state: &mut ExtractionState,
    def: &CustomStatDefinition,
    parsed: &ParsedCustomResponse,
    source: &str,
    owner: &str,
    settings: &ExtractionSettings,
) {
    if def.is_numeric() {
        let Some(delta) = parsed.delta_for(&def.id, source) else {
            return;
        };
        let previous = state
            .custom
            .get(&def.id)
            .and_then(|m| m.get(owner))
            .copied()
            .unwrap_or_else(|| def.numeric_default());
        let next = apply_numeric_delta(
            previous,
            delta,
            parsed.confidence_for(&def.id, source),
            settings.custom_delta_policy(def),
        );
        state
            .custom
            .entry(def.id.clone())
            .or_default()
            .insert(owner.to_string(), next);
        let diag = &mut state.diagnostics;
        MergeDiagnostics::record(&mut diag.parsed, &def.id, owner, json!(delta));
        MergeDiagnostics::record(&mut diag.applied, &def.id, owner, json!(next));
        return;
    }

    let Some(raw) = parsed.value_for(&def.id, source) else {
        return;
    };
    MergeDiagnostics::record(&mut state.diagnostics.parsed, &def.id, owner, json!(raw));
    match def.normalize_value(raw) {
        Some(value) => {
            MergeDiagnostics::record(&mut state.diagnostics.applied, &def.id, owner, json!(value));
            state
                .custom_non_numeric
                .entry(def.id.clone())
                .or_default()
                .insert(owner.to_string(), value);
        }
        None => {
            tracing::warn!(
                stat = %def.id,
                character = %owner,
                value = %raw,
                "Dropping value that does not fit the stat"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::extraction::scope::{build_batches, classify_custom_stat, plan_extraction};
    use rapport_domain::{CustomStatKind, ExtractionMode, NumericStat, StatDefault};
    use std::collections::HashMap;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn single_builtin(stat: BuiltInStat, characters: &[String]) -> PlannedBatch {
        let settings = ExtractionSettings {
            enabled_stats: vec![stat],
            ..Default::default()
        };
        let plan = plan_extraction(&settings, characters, &PriorState::default());
        build_batches(&plan, ExtractionMode::Sequential, characters)
            .public_builtin
            .remove(0)
    }

    fn full_confidence_settings() -> ExtractionSettings {
        ExtractionSettings {
            confidence_dampening: 1.0,
            max_delta_per_turn: 15,
            ..Default::default()
        }
    }

    #[test]
    fn initialize_uses_previous_or_default() {
        let settings = ExtractionSettings {
            default_trust: 35,
            ..Default::default()
        };
        let characters = names(&["Mira", "Jon"]);
        let mut prior = PriorState::default();
        prior.statistics.trust.insert("Mira".into(), 70);
        prior.statistics.mood.insert("Mira".into(), "sad".into());
        let plan = plan_extraction(&settings, &characters, &prior);

        let state = ExtractionState::initialize(&settings, &characters, &prior, &plan);

        assert_eq!(state.statistics.trust.get("Mira"), Some(&70));
        assert_eq!(state.statistics.trust.get("Jon"), Some(&35));
        assert_eq!(state.statistics.mood.get("Mira").map(String::as_str), Some("Sad"));
        assert_eq!(state.statistics.mood.get("Jon").map(String::as_str), Some("Neutral"));
        assert!(state.statistics.last_thought.is_empty());
    }

    #[test]
    fn numeric_delta_is_confidence_weighted() {
        let characters = names(&["Mira"]);
        let batch = single_builtin(BuiltInStat::Affection, &characters);
        let settings = full_confidence_settings();
        let mut state = ExtractionState::default();
        state.statistics.affection.insert("Mira".into(), 50);

        let mut parsed = ParsedDeltaResponse::default();
        parsed.confidence.insert("Mira".into(), 1.0);
        parsed.deltas.insert(
            NumericStat::Affection,
            HashMap::from([("Mira".to_string(), 10.0)]),
        );
        apply_builtin(&mut state, &batch, &parsed, &settings);

        assert_eq!(state.statistics.affection.get("Mira"), Some(&60));
        assert_eq!(state.diagnostics.applied["affection"]["Mira"], json!(60));
    }

    #[test]
    fn missing_character_keeps_previous_value() {
        let characters = names(&["Mira", "Jon"]);
        let batch = single_builtin(BuiltInStat::Trust, &characters);
        let mut state = ExtractionState::default();
        state.statistics.trust.insert("Jon".into(), 44);
        let mut parsed = ParsedDeltaResponse::default();
        parsed
            .deltas
            .insert(NumericStat::Trust, HashMap::from([("Mira".to_string(), 3.0)]));

        apply_builtin(&mut state, &batch, &parsed, &full_confidence_settings());

        assert_eq!(state.statistics.trust.get("Jon"), Some(&44));
        assert!(!state.diagnostics.applied["trust"].contains_key("Jon"));
    }

    #[test]
    fn low_confidence_mood_is_sticky() {
        let characters = names(&["Mira"]);
        let batch = single_builtin(BuiltInStat::Mood, &characters);
        let settings = ExtractionSettings {
            mood_stickiness: 0.6,
            ..Default::default()
        };
        let mut state = ExtractionState::default();
        state.statistics.mood.insert("Mira".into(), "Content".into());

        let mut parsed = ParsedDeltaResponse::default();
        parsed.confidence.insert("Mira".into(), 0.5);
        parsed.mood.insert("Mira".into(), "Angry".into());
        apply_builtin(&mut state, &batch, &parsed, &settings);
        assert_eq!(state.statistics.mood["Mira"], "Content");

        parsed.confidence.insert("Mira".into(), 0.6);
        apply_builtin(&mut state, &batch, &parsed, &settings);
        assert_eq!(state.statistics.mood["Mira"], "Angry");
    }

    #[test]
    fn unusable_mood_falls_back_and_is_flagged() {
        let characters = names(&["Mira", "Jon"]);
        let batch = single_builtin(BuiltInStat::Mood, &characters);
        let mut state = ExtractionState::default();
        state.statistics.mood.insert("Mira".into(), "Hopeful".into());

        let mut parsed = ParsedDeltaResponse::default();
        parsed.mood.insert("Mira".into(), "transcendent".into());
        apply_builtin(&mut state, &batch, &parsed, &ExtractionSettings::default());

        assert_eq!(state.statistics.mood["Mira"], "Hopeful");
        assert_eq!(state.statistics.mood["Jon"], "Neutral");
        assert_eq!(state.diagnostics.mood_fallbacks, names(&["Mira", "Jon"]));
    }

    #[test]
    fn seeding_is_idempotent() {
        let def = CustomStatDefinition::new("rivalry", CustomStatKind::Numeric, "Rivalry")
            .with_default(StatDefault::Number(20.0));
        let characters = names(&["Mira"]);
        let prior = PriorState::default();
        let scope = classify_custom_stat(&def, &characters, &prior);
        assert_eq!(scope.first_run, characters);

        let mut state = ExtractionState::default();
        seed_custom_stat(&mut state, &scope, &characters, &prior);
        let once = state.custom.clone();
        seed_custom_stat(&mut state, &scope, &characters, &prior);

        assert_eq!(state.custom, once);
        assert_eq!(state.custom["rivalry"]["Mira"], 20);
        assert_eq!(state.diagnostics.seeded["rivalry"]["Mira"], json!(20));
        assert_eq!(state.diagnostics.applied["rivalry"]["Mira"], json!(20));
    }

    #[test]
    fn global_stat_inherits_value_from_inactive_character() {
        let def = CustomStatDefinition::new("tension", CustomStatKind::Numeric, "Tension").global();
        let characters = names(&["Mira"]);
        let mut prior = PriorState {
            has_tracker_data: true,
            ..Default::default()
        };
        prior.raw_custom.insert(
            "tension".into(),
            BTreeMap::from([("Zed".to_string(), 90), ("Kai".to_string(), 70)]),
        );

        let scope = classify_custom_stat(&def, &characters, &prior);
        assert_eq!(scope.existing, characters);
        assert!(scope.first_run.is_empty());
        assert_eq!(previous_numeric(&def, GLOBAL_OWNER, &characters, &prior), Some(70));

        prior
            .raw_custom
            .entry("tension".into())
            .or_default()
            .insert("Mira".into(), 10);
        assert_eq!(previous_numeric(&def, GLOBAL_OWNER, &characters, &prior), Some(10));
    }

    #[test]
    fn global_stat_collapses_to_first_reporting_target() {
        let def = CustomStatDefinition::new("tension", CustomStatKind::Numeric, "Tension").global();
        let characters = names(&["Mira", "Jon"]);
        let mut prior = PriorState {
            has_tracker_data: true,
            ..Default::default()
        };
        prior
            .raw_custom
            .insert("tension".into(), BTreeMap::from([(GLOBAL_OWNER.to_string(), 30)]));
        let settings = ExtractionSettings {
            custom_stats: vec![def],
            confidence_dampening: 0.0,
            ..Default::default()
        };
        let plan = plan_extraction(&settings, &characters, &prior);
        let mut state = ExtractionState::initialize(&settings, &characters, &prior, &plan);
        let batch = build_batches(&plan, ExtractionMode::Unified, &characters)
            .public_builtin
            .remove(0);

        let mut parsed = ParsedCustomResponse::default();
        parsed.deltas.insert(
            "tension".into(),
            HashMap::from([("Jon".to_string(), 5.0), ("Mira".to_string(), -4.0)]),
        );
        apply_custom(&mut state, &batch, &parsed, &settings);

        assert_eq!(state.custom["tension"], BTreeMap::from([(GLOBAL_OWNER.to_string(), 26)]));
    }

    #[test]
    fn enum_value_outside_options_is_dropped() {
        let def = CustomStatDefinition::new("stance", CustomStatKind::EnumSingle, "Stance")
            .with_options(["wary", "open"])
            .with_default(StatDefault::Text("wary".into()));
        let characters = names(&[rapport_domain::USER_SENTINEL]);
        let settings = ExtractionSettings {
            custom_stats: vec![def],
            ..Default::default()
        };
        let prior = PriorState::default();
        let plan = plan_extraction(&settings, &characters, &prior);
        let mut state = ExtractionState::initialize(&settings, &characters, &prior, &plan);
        let batch = build_batches(&plan, ExtractionMode::Unified, &characters)
            .public_builtin
            .remove(0);

        let mut parsed = ParsedCustomResponse::default();
        parsed.values.insert(
            "stance".into(),
            HashMap::from([(characters[0].clone(), CustomValue::Text("furious".into()))]),
        );
        apply_custom(&mut state, &batch, &parsed, &settings);
        assert_eq!(
            state.custom_non_numeric["stance"][&characters[0]],
            CustomValue::Text("wary".into())
        );

        parsed.values.insert(
            "stance".into(),
            HashMap::from([(characters[0].clone(), CustomValue::Text("OPEN".into()))]),
        );
        apply_custom(&mut state, &batch, &parsed, &settings);
        assert_eq!(
            state.custom_non_numeric["stance"][&characters[0]],
            CustomValue::Text("open".into())
        );
    }
}
