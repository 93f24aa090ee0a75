//! Relationship stat extraction.
//!
//! One call to [`ExtractStatistics::execute`] plans the requests for a turn,
//! sends them (retrying and repairing incomplete answers), and folds the
//! parsed values into new statistics. A run either completes or fails as a
//! whole; cancellation and transport failures never yield partial results.

mod apply;
mod coverage;
mod debug;
mod driver;
mod executor;
mod progress;
mod repair;
mod scope;


use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use rapport_domain::{
    user_alias_map, CustomNonNumericStatistics, CustomStatistics, DomainError, ExtractionMode,
    ExtractionRequestMeta, ExtractionSettings, PriorState, Statistics,
};

use crate::infrastructure::ports::{
    ClockPort, GenerationError, GenerationPort, PromptBuilderPort, ResponseParserPort,
};

pub use apply::{
    apply_batch, apply_builtin, apply_custom, seed_custom_stat, BatchTrace, ExtractionState,
    MergeDiagnostics,
};
pub use coverage::{evaluate, has_coverage, CoverageMode, CoverageReport, ParsedBatch};
pub use debug::{DebugCounts, DebugRecord, DebugRecordBuilder};
pub use driver::worker_pool_size;
pub use executor::{RequestExecutor, RequestSpec, TransportRetryPolicy, DEFAULT_TRANSPORT_BACKOFF_MS};
pub use progress::ProgressReporter;
pub use repair::{RawOutput, RepairOutcome};
pub use scope::{
    build_batches, classify_custom_stat, plan_extraction, BatchPlan, CustomStatScope,
    ExtractionPlan, PlannedBatch, StatVisibility,
};

use driver::{run_sequential, run_unified, RunContext};
use progress::ProgressTracker;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extraction cancelled")]
    Cancelled,
    #[error("Generation failed: {0}")]
    Transport(#[source] GenerationError),
    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] DomainError),
}

impl ExtractionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    fn from_generation(error: GenerationError) -> Self {
        if error.is_cancellation() {
            Self::Cancelled
        } else {
            Self::Transport(error)
        }
    }
}

/// Everything one extraction run needs from the caller.
pub struct ExtractionInput {
    pub settings: ExtractionSettings,
    /// Active characters, in order; may include the user sentinel
    pub characters: Vec<String>,
    pub user_display_name: String,
    pub context_text: String,
    pub prior: PriorState,
    /// Earlier snapshots, oldest first
    pub history: Vec<Statistics>,
    pub cancel: CancellationToken,
    pub progress: Option<Arc<dyn ProgressReporter>>,
}

impl ExtractionInput {
    pub fn new(settings: ExtractionSettings, characters: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            settings,
            characters: characters.into_iter().map(Into::into).collect(),
            user_display_name: String::new(),
            context_text: String::new(),
            prior: PriorState::default(),
            history: Vec::new(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_user_display_name(mut self, name: impl Into<String>) -> Self {
        self.user_display_name = name.into();
        self
    }

    pub fn with_context(mut self, context_text: impl Into<String>) -> Self {
        self.context_text = context_text.into();
        self
    }

    pub fn with_prior(mut self, prior: PriorState) -> Self {
        self.prior = prior;
        self
    }

    pub fn with_history(mut self, history: Vec<Statistics>) -> Self {
        self.history = history;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Trimmed, non-blank, first occurrence wins.
    fn active_characters(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for name in &self.characters {
            let name = name.trim();
            if !name.is_empty() && !seen.iter().any(|s: &String| s == name) {
                seen.push(name.to_string());
            }
        }
        seen
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub statistics: Statistics,
    pub custom_statistics: CustomStatistics,
    pub custom_non_numeric_statistics: CustomNonNumericStatistics,
    pub request_meta: Vec<ExtractionRequestMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugRecord>,
}

/// Extracts relationship statistics for one turn.
pub struct ExtractStatistics {
    generation: Arc<dyn GenerationPort>,
    prompts: Arc<dyn PromptBuilderPort>,
    parser: Arc<dyn ResponseParserPort>,
    clock: Arc<dyn ClockPort>,
    transport: TransportRetryPolicy,
}

impl ExtractStatistics {
    pub fn new(
        generation: Arc<dyn GenerationPort>,
        prompts: Arc<dyn PromptBuilderPort>,
        parser: Arc<dyn ResponseParserPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            generation,
            prompts,
            parser,
            clock,
            transport: TransportRetryPolicy::default(),
        }
    }

    pub fn with_transport_policy(mut self, policy: TransportRetryPolicy) -> Self {
        self.transport = policy;
        self
    }

    pub async fn execute(&self, input: ExtractionInput) -> Result<ExtractionOutcome, ExtractionError> {
        let settings = &input.settings;
        settings.validate()?;

        let started_at = self.clock.now();
        let characters = input.active_characters();
        let plan = plan_extraction(settings, &characters, &input.prior);
        let batches = build_batches(&plan, settings.extraction_mode, &characters);
        let state = ExtractionState::initialize(settings, &characters, &input.prior, &plan);

        tracing::info!(
            mode = %settings.extraction_mode,
            characters = characters.len(),
            batches = batches.len(),
            "Starting stat extraction"
        );

        let ctx = RunContext {
            settings,
            prior: &input.prior,
            history: &input.history,
            context_text: &input.context_text,
            user_display_name: &input.user_display_name,
            aliases: user_alias_map(&input.user_display_name),
            executor: RequestExecutor::new(
                Arc::clone(&self.generation),
                Arc::clone(&self.clock),
                self.transport.clone(),
                input.cancel.clone(),
            ),
            prompts: self.prompts.as_ref(),
            parser: self.parser.as_ref(),
            progress: ProgressTracker::new(input.progress.clone(), batches.len()),
        };

        let state = Mutex::new(state);
        let result = match settings.extraction_mode {
            ExtractionMode::Unified => run_unified(&ctx, batches, &state).await,
            ExtractionMode::Sequential => run_sequential(&ctx, batches, &state).await,
        };
        let request_meta = ctx.executor.audit().await;

        if let Err(e) = result {
            tracing::warn!(
                error = %e,
                requests = request_meta.len(),
                "Stat extraction aborted, discarding partial results"
            );
            return Err(e);
        }
        if input.cancel.is_cancelled() {
            tracing::info!("Stat extraction cancelled after last request");
            return Err(ExtractionError::Cancelled);
        }
        ctx.progress.finish();

        let state = state.into_inner();
        let finished_at = self.clock.now();
        let debug = settings.debug.then(|| {
            DebugRecordBuilder::new(settings, started_at)
                .with_characters(&characters)
                .with_context(input.context_text.clone())
                .build(&state.diagnostics, &request_meta, finished_at)
        });

        tracing::info!(
            mode = %settings.extraction_mode,
            duration_ms = (finished_at - started_at).num_milliseconds(),
            requests = request_meta.len(),
            applied = MergeDiagnostics::count(&state.diagnostics.applied),
            seeded = MergeDiagnostics::count(&state.diagnostics.seeded),
            mood_fallbacks = state.diagnostics.mood_fallbacks.len(),
            "Stat extraction complete"
        );

        Ok(ExtractionOutcome {
            statistics: state.statistics,
            custom_statistics: state.custom,
            custom_non_numeric_statistics: state.custom_non_numeric,
            request_meta,
            debug,
        })
    }
}
