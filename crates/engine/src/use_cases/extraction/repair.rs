//! Retry/repair ladder for answers that do not cover the request.
//!
//! After the initial request the ladder is: one strict-JSON retry, then one
//! stat-specific repair (single-stat batches only), then strict retries until
//! the budget is spent. Running out of budget is not an error; the best
//! parse seen is kept.

use serde::Serialize;

use rapport_domain::RetryType;

use crate::infrastructure::ports::{GenerationError, RepairTemplate};

use super::coverage::{evaluate, merge_retry, ParsedBatch};
use super::driver::RunContext;
use super::executor::RequestSpec;
use super::scope::PlannedBatch;

/// One raw model answer, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOutput {
    pub retry_type: RetryType,
    pub attempt: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub parsed: ParsedBatch,
    pub covered: bool,
    pub first_parse_empty: bool,
    pub outputs: Vec<RawOutput>,
}

/// Which repair template applies, if the batch asks for exactly one stat.
fn repair_target(batch: &PlannedBatch) -> Option<(RepairTemplate, String)> {
    if batch.stat_count() != 1 {
        return None;
    }
    if let Some(stat) = batch.builtin_stats.first() {
        return Some((RepairTemplate::for_stat(*stat), stat.key().to_string()));
    }
    batch
        .custom_stats
        .first()
        .map(|def| (RepairTemplate::Generic, def.id.clone()))
}

fn parse(ctx: &RunContext<'_>, batch: &PlannedBatch, raw: &str) -> ParsedBatch {
    let max_delta = ctx.settings.max_delta_per_turn;
    let mut parsed = ParsedBatch::default();
    if !batch.builtin_stats.is_empty() {
        parsed.builtin = ctx.parser.parse_builtin(
            raw,
            &batch.characters,
            &batch.builtin_stats,
            max_delta,
            &ctx.aliases,
        );
    }
    if !batch.custom_stats.is_empty() {
        parsed.custom = ctx.parser.parse_custom(
            raw,
            &batch.characters,
            &batch.custom_stats,
            max_delta,
            &ctx.aliases,
        );
    }
    parsed
}

/// Request `prompt`, then climb the ladder until the batch is covered or the
/// retry budget runs out.
pub(crate) async fn run_with_repair(
    ctx: &RunContext<'_>,
    batch: &PlannedBatch,
    prompt: &str,
) -> Result<RepairOutcome, GenerationError> {
    let stat_list = batch.stat_keys();
    let budget = ctx.settings.retry_budget();
    let mut outputs = Vec::new();

    let raw = ctx
        .executor
        .execute(RequestSpec {
            prompt,
            stat_list: &stat_list,
            retry_type: RetryType::Initial,
            attempt: 1,
        })
        .await?;
    let mut working = parse(ctx, batch, &raw);
    let first_parse_empty = working.is_empty();
    outputs.push(RawOutput {
        retry_type: RetryType::Initial,
        attempt: 1,
        text: raw,
    });

    let mut report = evaluate(&working, batch);
    let mut retries_used = 0;
    while !report.is_complete() && retries_used < budget {
        retries_used += 1;
        let (retry_type, retry_prompt) = match (retries_used, repair_target(batch)) {
            (1, _) => (RetryType::Strict, ctx.prompts.strict_retry(prompt)),
            (2, Some((template, key))) => {
                (RetryType::Repair, ctx.prompts.repair(prompt, template, &key))
            }
            _ => (RetryType::StrictLoop, ctx.prompts.strict_retry(prompt)),
        };
        let attempt = retries_used + 1;

        tracing::debug!(
            batch = %batch.label,
            retry_type = %retry_type,
            attempt,
            missing_builtin = ?report.missing_builtin,
            missing_custom = ?report.missing_custom,
            "Response incomplete, retrying"
        );

        let raw = ctx
            .executor
            .execute(RequestSpec {
                prompt: &retry_prompt,
                stat_list: &stat_list,
                retry_type,
                attempt,
            })
            .await?;
        let candidate = parse(ctx, batch, &raw);
        outputs.push(RawOutput {
            retry_type,
            attempt,
            text: raw,
        });

        merge_retry(&mut working, candidate, batch);
        report = evaluate(&working, batch);
    }

    let covered = report.is_complete();
    if covered && retries_used > 0 {
        tracing::info!(
            batch = %batch.label,
            retries = retries_used,
            "Retry produced a complete response"
        );
    } else if !covered {
        tracing::warn!(
            batch = %batch.label,
            retries = retries_used,
            missing_builtin = ?report.missing_builtin,
            missing_custom = ?report.missing_custom,
            "Response still incomplete after retries, applying partial result"
        );
    }

    Ok(RepairOutcome {
        parsed: working,
        covered,
        first_parse_empty,
        outputs,
    })
}
