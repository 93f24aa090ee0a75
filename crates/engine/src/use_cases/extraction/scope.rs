//! Request scoping: which stats go into which request, for whom.
//!
//! Custom stats are split per owner into those with a baseline ("existing",
//! requested and merged as deltas) and those without one ("first run",
//! seeded with their previous or default value and never requested).
//! Built-in stats are always requested.

use std::collections::HashMap;

use rapport_domain::{
    is_user_only, BuiltInStat, CustomStatDefinition, ExtractionMode, ExtractionSettings,
    PriorState, GLOBAL_OWNER,
};

use crate::infrastructure::ports::BatchKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatVisibility {
    /// Requested once for every character
    Public,
    /// Requested separately for each owner
    Private,
    /// One shared value stored under the global owner
    Global,
}

/// Scope of one tracked custom stat for this run.
#[derive(Debug, Clone)]
pub struct CustomStatScope {
    pub definition: CustomStatDefinition,
    pub visibility: StatVisibility,
    /// Owners with a baseline. For global stats this is every active
    /// character (any of them may report the shared value).
    pub existing: Vec<String>,
    /// Owners to seed instead of request. For global stats this is
    /// `[GLOBAL_OWNER]` when no baseline exists.
    pub first_run: Vec<String>,
}

impl CustomStatScope {
    pub fn is_requested(&self) -> bool {
        !self.existing.is_empty()
    }
}

/// Everything requested in one run, before it is cut into batches.
#[derive(Debug, Clone, Default)]
pub struct ExtractionPlan {
    pub public_builtins: Vec<BuiltInStat>,
    pub private_builtins: Vec<BuiltInStat>,
    pub custom: Vec<CustomStatScope>,
}

impl ExtractionPlan {
    /// Public and global custom stats that need a request.
    pub fn shared_custom(&self) -> impl Iterator<Item = &CustomStatScope> {
        self.custom
            .iter()
            .filter(|s| s.visibility != StatVisibility::Private && s.is_requested())
    }

    /// Private custom stats `owner` has a baseline for.
    pub fn private_custom_for<'a>(
        &'a self,
        owner: &'a str,
    ) -> impl Iterator<Item = &'a CustomStatScope> + 'a {
        self.custom.iter().filter(move |s| {
            s.visibility == StatVisibility::Private && s.existing.iter().any(|c| c == owner)
        })
    }
}

/// Whether `owner` already has a baseline within a request scope of `scope`.
///
/// A scope of exactly the user always counts as existing.
fn has_baseline(prior: &PriorState, stat_id: &str, scope: &[String], owner: &str) -> bool {
    is_user_only(scope) || (prior.has_tracker_data && prior.has_raw_value(stat_id, owner))
}

/// Classify one custom stat for the active characters.
pub fn classify_custom_stat(
    definition: &CustomStatDefinition,
    characters: &[String],
    prior: &PriorState,
) -> CustomStatScope {
    let id = definition.id.as_str();

    if definition.global_scope {
        let baseline =
            is_user_only(characters) || (prior.has_tracker_data && prior.has_any_raw_value(id));
        let (existing, first_run) = if baseline {
            (characters.to_vec(), Vec::new())
        } else {
            (Vec::new(), vec![GLOBAL_OWNER.to_string()])
        };
        return CustomStatScope {
            definition: definition.clone(),
            visibility: StatVisibility::Global,
            existing,
            first_run,
        };
    }

    let private = definition.is_private();
    let (existing, first_run): (Vec<String>, Vec<String>) =
        characters.iter().cloned().partition(|c| {
            if private {
                has_baseline(prior, id, std::slice::from_ref(c), c)
            } else {
                has_baseline(prior, id, characters, c)
            }
        });

    CustomStatScope {
        definition: definition.clone(),
        visibility: if private {
            StatVisibility::Private
        } else {
            StatVisibility::Public
        },
        existing,
        first_run,
    }
}

/// Scope every enabled built-in and tracked custom stat.
pub fn plan_extraction(
    settings: &ExtractionSettings,
    characters: &[String],
    prior: &PriorState,
) -> ExtractionPlan {
    let (private_builtins, public_builtins) = settings
        .enabled_builtins()
        .into_iter()
        .partition(|s| settings.is_private(*s));

    let custom = settings
        .tracked_custom_stats()
        .map(|def| classify_custom_stat(def, characters, prior))
        .collect();

    ExtractionPlan {
        public_builtins,
        private_builtins,
        custom,
    }
}

// =============================================================================
// Batches
// =============================================================================

/// One planned request (before retries).
#[derive(Debug, Clone)]
pub struct PlannedBatch {
    /// Progress and log label
    pub label: String,
    pub kind: BatchKind,
    /// Characters named in the prompt and accepted from the response
    pub characters: Vec<String>,
    pub builtin_stats: Vec<BuiltInStat>,
    pub custom_stats: Vec<CustomStatDefinition>,
    /// statId -> characters whose values are merged; defaults to `characters`
    pub custom_targets: HashMap<String, Vec<String>>,
}

impl PlannedBatch {
    fn new(label: impl Into<String>, kind: BatchKind, characters: Vec<String>) -> Self {
        Self {
            label: label.into(),
            kind,
            characters,
            builtin_stats: Vec::new(),
            custom_stats: Vec::new(),
            custom_targets: HashMap::new(),
        }
    }

    fn with_builtins(mut self, stats: Vec<BuiltInStat>) -> Self {
        self.builtin_stats = stats;
        self
    }

    fn with_custom(mut self, scope: &CustomStatScope, targets: Vec<String>) -> Self {
        self.custom_targets
            .insert(scope.definition.id.clone(), targets);
        self.custom_stats.push(scope.definition.clone());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.builtin_stats.is_empty() && self.custom_stats.is_empty()
    }

    pub fn stat_count(&self) -> usize {
        self.builtin_stats.len() + self.custom_stats.len()
    }

    /// Wire keys of every stat, built-ins first.
    pub fn stat_keys(&self) -> Vec<String> {
        self.builtin_stats
            .iter()
            .map(|s| s.key().to_string())
            .chain(self.custom_stats.iter().map(|d| d.id.clone()))
            .collect()
    }

    /// Characters whose values for `stat_id` are merged.
    pub fn targets_for(&self, stat_id: &str) -> &[String] {
        self.custom_targets
            .get(stat_id)
            .map(Vec::as_slice)
            .unwrap_or(&self.characters)
    }
}

/// Batches grouped by the phase that runs them.
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    /// Built-in stats for everyone (the single unified batch in unified mode)
    pub public_builtin: Vec<PlannedBatch>,
    /// Public and global custom stats (sequential mode only)
    pub public_custom: Vec<PlannedBatch>,
    /// Per-owner private requests, in owner order
    pub private: Vec<PlannedBatch>,
}

impl BatchPlan {
    pub fn len(&self) -> usize {
        self.public_builtin.len() + self.public_custom.len() + self.private.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cut a plan into the requests the chosen mode issues.
pub fn build_batches(
    plan: &ExtractionPlan,
    mode: ExtractionMode,
    characters: &[String],
) -> BatchPlan {
    match mode {
        ExtractionMode::Unified => unified_batches(plan, characters),
        ExtractionMode::Sequential => sequential_batches(plan, characters),
    }
}

fn unified_batches(plan: &ExtractionPlan, characters: &[String]) -> BatchPlan {
    let mut batches = BatchPlan::default();

    let mut public = PlannedBatch::new("unified", BatchKind::UnifiedAll, characters.to_vec())
        .with_builtins(plan.public_builtins.clone());
    for scope in plan.shared_custom() {
        public = public.with_custom(scope, scope.existing.clone());
    }
    if !public.is_empty() {
        batches.public_builtin.push(public);
    }

    for owner in characters {
        let mut private = PlannedBatch::new(
            format!("private:{}", owner),
            BatchKind::UnifiedPrivate,
            vec![owner.clone()],
        )
        .with_builtins(plan.private_builtins.clone());
        for scope in plan.private_custom_for(owner) {
            private = private.with_custom(scope, vec![owner.clone()]);
        }
        if !private.is_empty() {
            batches.private.push(private);
        }
    }
    batches
}

fn sequential_batches(plan: &ExtractionPlan, characters: &[String]) -> BatchPlan {
    let mut batches = BatchPlan::default();

    for stat in &plan.public_builtins {
        batches.public_builtin.push(
            PlannedBatch::new(stat.key(), BatchKind::SingleStat, characters.to_vec())
                .with_builtins(vec![*stat]),
        );
    }

    for scope in plan.shared_custom() {
        batches.public_custom.push(
            PlannedBatch::new(
                scope.definition.id.clone(),
                BatchKind::SingleStat,
                characters.to_vec(),
            )
            .with_custom(scope, scope.existing.clone()),
        );
    }

    for owner in characters {
        for stat in &plan.private_builtins {
            batches.private.push(
                PlannedBatch::new(
                    format!("{}:{}", stat.key(), owner),
                    BatchKind::SingleStat,
                    vec![owner.clone()],
                )
                .with_builtins(vec![*stat]),
            );
        }
        for scope in plan.private_custom_for(owner) {
            batches.private.push(
                PlannedBatch::new(
                    format!("{}:{}", scope.definition.id, owner),
                    BatchKind::SingleStat,
                    vec![owner.clone()],
                )
                .with_custom(scope, vec![owner.clone()]),
            );
        }
    }
    batches
}
