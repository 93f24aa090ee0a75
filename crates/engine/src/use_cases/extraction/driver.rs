//! Request scheduling for both extraction modes.
//!
//! Unified mode sends the public batch first and then each owner's private
//! batch. Sequential mode drains two queues (public built-ins and public
//! custom stats) through bounded worker pools that run side by side, then
//! runs private requests one owner at a time. Workers share the running
//! state behind a mutex that is never held across a request.

use std::collections::{HashMap, VecDeque};

use futures_util::future::try_join_all;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use rapport_domain::{alias_user_in_prompt, ExtractionSettings, PriorState, Statistics, MAX_WORKERS};

use crate::infrastructure::ports::{PromptBuilderPort, PromptRequest, ResponseParserPort};

use super::apply::{apply_batch, BatchTrace, ExtractionState};
use super::executor::RequestExecutor;
use super::progress::ProgressTracker;
use super::repair::run_with_repair;
use super::scope::{BatchPlan, PlannedBatch};
use super::ExtractionError;

/// Shared, read-only inputs for one run.
pub(crate) struct RunContext<'a> {
    pub settings: &'a ExtractionSettings,
    pub prior: &'a PriorState,
    pub history: &'a [Statistics],
    pub context_text: &'a str,
    pub user_display_name: &'a str,
    /// display name -> canonical character name
    pub aliases: HashMap<String, String>,
    pub executor: RequestExecutor,
    pub prompts: &'a dyn PromptBuilderPort,
    pub parser: &'a dyn ResponseParserPort,
    pub progress: ProgressTracker,
}

impl RunContext<'_> {
    fn cancel(&self) -> &CancellationToken {
        self.executor.cancel_token()
    }

    fn check_cancelled(&self) -> Result<(), ExtractionError> {
        if self.cancel().is_cancelled() {
            Err(ExtractionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// `max(1, min(configured, MAX_WORKERS, queue_len))`
pub fn worker_pool_size(configured: usize, queue_len: usize) -> usize {
    configured.min(MAX_WORKERS).min(queue_len).max(1)
}

/// Build, send, repair, and merge one planned batch.
async fn run_batch(
    ctx: &RunContext<'_>,
    batch: &PlannedBatch,
    state: &Mutex<ExtractionState>,
) -> Result<(), ExtractionError> {
    ctx.check_cancelled()?;
    ctx.progress.step(Some(&batch.label));

    let request = PromptRequest {
        kind: batch.kind,
        characters: &batch.characters,
        builtin_stats: &batch.builtin_stats,
        custom_stats: &batch.custom_stats,
        context_text: ctx.context_text,
        prior: ctx.prior,
        history: ctx.history,
        max_delta: ctx.settings.max_delta_per_turn,
    };
    let prompt = alias_user_in_prompt(&ctx.prompts.build(&request), ctx.user_display_name);
    tracing::debug!(
        batch = %batch.label,
        stats = ?request.stat_keys(),
        characters = ?batch.characters,
        "Sending batch"
    );

    let outcome = run_with_repair(ctx, batch, &prompt)
        .await
        .map_err(ExtractionError::from_generation)?;
    ctx.progress.step(None);

    {
        let mut state = state.lock().await;
        apply_batch(&mut state, batch, &outcome.parsed, ctx.settings);
        state.diagnostics.batches.push(BatchTrace {
            label: batch.label.clone(),
            stats: batch.stat_keys(),
            characters: batch.characters.clone(),
            prompt,
            parsed_values: outcome.parsed.value_count(),
            covered: outcome.covered,
            first_parse_empty: outcome.first_parse_empty,
            outputs: outcome.outputs,
        });
    }
    ctx.progress.step(None);

    tracing::debug!(
        batch = %batch.label,
        covered = outcome.covered,
        "Batch merged"
    );
    Ok(())
}

async fn worker(
    id: usize,
    ctx: &RunContext<'_>,
    queue: &Mutex<VecDeque<PlannedBatch>>,
    state: &Mutex<ExtractionState>,
) -> Result<(), ExtractionError> {
    loop {
        ctx.check_cancelled()?;
        let Some(batch) = queue.lock().await.pop_front() else {
            tracing::trace!(worker = id, "Queue drained, worker exiting");
            return Ok(());
        };
        run_batch(ctx, &batch, state).await?;
    }
}

/// Drain `batches` with a bounded pool. The first error stops every worker.
pub(crate) async fn run_pool(
    ctx: &RunContext<'_>,
    batches: Vec<PlannedBatch>,
    state: &Mutex<ExtractionState>,
) -> Result<(), ExtractionError> {
    if batches.is_empty() {
        return Ok(());
    }
    let size = worker_pool_size(ctx.settings.max_concurrent_calls, batches.len());
    tracing::debug!(workers = size, queued = batches.len(), "Starting worker pool");

    let queue = Mutex::new(VecDeque::from(batches));
    try_join_all((0..size).map(|id| worker(id, ctx, &queue, state))).await?;
    Ok(())
}

async fn run_in_order(
    ctx: &RunContext<'_>,
    batches: &[PlannedBatch],
    state: &Mutex<ExtractionState>,
) -> Result<(), ExtractionError> {
    for batch in batches {
        run_batch(ctx, batch, state).await?;
    }
    Ok(())
}

/// Public batch first, then private batches per owner.
pub(crate) async fn run_unified(
    ctx: &RunContext<'_>,
    batches: BatchPlan,
    state: &Mutex<ExtractionState>,
) -> Result<(), ExtractionError> {
    run_in_order(ctx, &batches.public_builtin, state).await?;
    run_in_order(ctx, &batches.public_custom, state).await?;
    run_in_order(ctx, &batches.private, state).await
}

/// Two pools for public stats concurrently, then private requests in order.
pub(crate) async fn run_sequential(
    ctx: &RunContext<'_>,
    batches: BatchPlan,
    state: &Mutex<ExtractionState>,
) -> Result<(), ExtractionError> {
    let BatchPlan {
        public_builtin,
        public_custom,
        private,
    } = batches;

    futures_util::future::try_join(
        run_pool(ctx, public_builtin, state),
        run_pool(ctx, public_custom, state),
    )
    .await?;

    run_in_order(ctx, &private, state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_is_bounded_by_config_cap_and_queue() {
        assert_eq!(worker_pool_size(8, 2), 2);
        assert_eq!(worker_pool_size(3, 10), 3);
        assert_eq!(worker_pool_size(20, 30), MAX_WORKERS);
        assert_eq!(worker_pool_size(0, 5), 1);
        assert_eq!(worker_pool_size(4, 0), 1);
    }
}
