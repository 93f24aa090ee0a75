//! Coverage checks for parsed responses.
//!
//! A stat is covered when at least one of its target characters got a value.
//! Single-stat and private batches need every stat covered at once. The
//! unified public batch treats built-ins as one group and each custom stat on
//! its own, so a retry can fill in whatever the first answer missed.

use rapport_domain::{BuiltInStat, ParsedCustomResponse, ParsedDeltaResponse};

use crate::infrastructure::ports::BatchKind;

use super::scope::PlannedBatch;

/// Parsed built-in and custom values for one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBatch {
    pub builtin: ParsedDeltaResponse,
    pub custom: ParsedCustomResponse,
}

impl ParsedBatch {
    pub fn value_count(&self) -> usize {
        self.builtin.value_count() + self.custom.value_count()
    }

    pub fn is_empty(&self) -> bool {
        self.value_count() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageMode {
    /// All requested stats, all at once
    Strict,
    /// Built-in group plus each custom stat independently
    UnifiedAll,
}

impl CoverageMode {
    pub fn for_batch(batch: &PlannedBatch) -> Self {
        match batch.kind {
            BatchKind::UnifiedAll => CoverageMode::UnifiedAll,
            BatchKind::UnifiedPrivate | BatchKind::SingleStat => CoverageMode::Strict,
        }
    }
}

/// Which requested stats a parse is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    pub missing_builtin: Vec<BuiltInStat>,
    pub missing_custom: Vec<String>,
    pub requested: usize,
}

impl CoverageReport {
    pub fn is_complete(&self) -> bool {
        self.missing_builtin.is_empty() && self.missing_custom.is_empty()
    }

    pub fn covered_count(&self) -> usize {
        self.requested - self.missing_builtin.len() - self.missing_custom.len()
    }
}

pub fn evaluate(parsed: &ParsedBatch, batch: &PlannedBatch) -> CoverageReport {
    let missing_builtin = batch
        .builtin_stats
        .iter()
        .copied()
        .filter(|stat| !parsed.builtin.has_values_for(*stat, &batch.characters))
        .collect();
    let missing_custom = batch
        .custom_stats
        .iter()
        .filter(|def| !parsed.custom.has_values_for(&def.id, batch.targets_for(&def.id)))
        .map(|def| def.id.clone())
        .collect();
    CoverageReport {
        missing_builtin,
        missing_custom,
        requested: batch.stat_count(),
    }
}

pub fn has_coverage(parsed: &ParsedBatch, batch: &PlannedBatch) -> bool {
    evaluate(parsed, batch).is_complete()
}

/// Fold a retry's parse into the working parse.
///
/// Strict mode keeps whichever parse covers more stats (earliest on ties).
/// Unified mode takes the retry's built-in group when it covers more
/// built-ins, and splices in each custom stat the working parse lacks.
pub fn merge_retry(working: &mut ParsedBatch, candidate: ParsedBatch, batch: &PlannedBatch) {
    let current = evaluate(working, batch);
    let next = evaluate(&candidate, batch);

    match CoverageMode::for_batch(batch) {
        CoverageMode::Strict => {
            if next.covered_count() > current.covered_count() {
                *working = candidate;
            }
        }
        CoverageMode::UnifiedAll => {
            if next.missing_builtin.len() < current.missing_builtin.len() {
                working.builtin = candidate.builtin.clone();
            }
            for stat_id in &current.missing_custom {
                if !next.missing_custom.contains(stat_id) {
                    working.custom.splice_stat(&candidate.custom, stat_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::extraction::scope::{build_batches, plan_extraction};
    use rapport_domain::{
        CustomStatDefinition, CustomStatKind, ExtractionMode, ExtractionSettings, NumericStat,
        PriorState, USER_SENTINEL,
    };
    use std::collections::HashMap;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn unified_batch() -> PlannedBatch {
        let settings = ExtractionSettings {
            enabled_stats: vec![BuiltInStat::Trust, BuiltInStat::Mood],
            custom_stats: vec![
                CustomStatDefinition::new("rivalry", CustomStatKind::Numeric, "Rivalry"),
                CustomStatDefinition::new("flirty", CustomStatKind::Boolean, "Flirty")
                    .with_default(rapport_domain::StatDefault::Bool(false)),
            ],
            ..Default::default()
        };
        let characters = names(&[USER_SENTINEL]);
        let plan = plan_extraction(&settings, &characters, &PriorState::default());
        build_batches(&plan, ExtractionMode::Unified, &characters)
            .public_builtin
            .remove(0)
    }

    fn with_trust(mut parsed: ParsedBatch, value: f64) -> ParsedBatch {
        parsed.builtin.deltas.insert(
            NumericStat::Trust,
            HashMap::from([(USER_SENTINEL.to_string(), value)]),
        );
        parsed
    }

    fn with_mood(mut parsed: ParsedBatch) -> ParsedBatch {
        parsed
            .builtin
            .mood
            .insert(USER_SENTINEL.to_string(), "Happy".into());
        parsed
    }

    fn with_custom_delta(mut parsed: ParsedBatch, id: &str, value: f64) -> ParsedBatch {
        parsed.custom.deltas.insert(
            id.to_string(),
            HashMap::from([(USER_SENTINEL.to_string(), value)]),
        );
        parsed
    }

    #[test]
    fn coverage_requires_every_stat() {
        let batch = unified_batch();
        let parsed = with_mood(with_trust(ParsedBatch::default(), 2.0));
        let report = evaluate(&parsed, &batch);
        assert!(!report.is_complete());
        assert_eq!(report.missing_custom, names(&["rivalry", "flirty"]));
        assert_eq!(report.covered_count(), 2);
    }

    #[test]
    fn unified_merge_keeps_covered_builtins_and_adds_custom() {
        let batch = unified_batch();
        let mut working = with_mood(with_trust(ParsedBatch::default(), 2.0));
        // Retry lost the mood but answered rivalry
        let candidate = with_custom_delta(with_trust(ParsedBatch::default(), 9.0), "rivalry", 3.0);

        merge_retry(&mut working, candidate, &batch);

        assert_eq!(
            working.builtin.delta_for(NumericStat::Trust, USER_SENTINEL),
            Some(2.0)
        );
        assert_eq!(working.custom.delta_for("rivalry", USER_SENTINEL), Some(3.0));
        assert_eq!(evaluate(&working, &batch).missing_custom, names(&["flirty"]));
    }

    #[test]
    fn strict_merge_prefers_more_coverage_and_earliest_on_ties() {
        let mut batch = unified_batch();
        batch.kind = BatchKind::UnifiedPrivate;

        let mut working = with_trust(ParsedBatch::default(), 1.0);
        merge_retry(&mut working, with_trust(ParsedBatch::default(), 5.0), &batch);
        assert_eq!(
            working.builtin.delta_for(NumericStat::Trust, USER_SENTINEL),
            Some(1.0)
        );

        let better = with_mood(with_trust(ParsedBatch::default(), 7.0));
        merge_retry(&mut working, better.clone(), &batch);
        assert_eq!(working, better);
    }
}
