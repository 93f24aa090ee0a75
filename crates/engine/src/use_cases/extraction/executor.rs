//! Transport-level request execution with fixed backoff and cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use rapport_domain::{ExtractionRequestMeta, RetryType};

use crate::infrastructure::ports::{ClockPort, GenerationError, GenerationPort};

/// Delays between transport attempts.
pub const DEFAULT_TRANSPORT_BACKOFF_MS: [u64; 2] = [350, 1200];

/// Transport retry schedule; one attempt more than there are delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRetryPolicy {
    pub backoff_ms: Vec<u64>,
}

impl Default for TransportRetryPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: DEFAULT_TRANSPORT_BACKOFF_MS.to_vec(),
        }
    }
}

impl TransportRetryPolicy {
    /// Same number of attempts as the default, without waiting.
    pub fn immediate() -> Self {
        Self {
            backoff_ms: vec![0; DEFAULT_TRANSPORT_BACKOFF_MS.len()],
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.backoff_ms.len() + 1
    }
}

/// One logical request as seen by the retry ladder.
#[derive(Debug, Clone, Copy)]
pub struct RequestSpec<'a> {
    pub prompt: &'a str,
    pub stat_list: &'a [String],
    pub retry_type: RetryType,
    /// Ladder attempt number, starting at 1
    pub attempt: u32,
}

/// Sends prompts to the generation backend, retrying transient failures and
/// recording one audit entry per successful call.
pub struct RequestExecutor {
    generation: Arc<dyn GenerationPort>,
    clock: Arc<dyn ClockPort>,
    policy: TransportRetryPolicy,
    cancel: CancellationToken,
    audit: Mutex<Vec<ExtractionRequestMeta>>,
}

impl RequestExecutor {
    pub fn new(
        generation: Arc<dyn GenerationPort>,
        clock: Arc<dyn ClockPort>,
        policy: TransportRetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            generation,
            clock,
            policy,
            cancel,
            audit: Mutex::new(Vec::new()),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn cancelled(stage: &str) -> GenerationError {
        GenerationError::cancelled(format!("extraction cancelled {}", stage))
    }

    /// Run one request. Cancellation is checked before each call, after each
    /// call, and before (and during) each backoff wait.
    pub async fn execute(&self, spec: RequestSpec<'_>) -> Result<String, GenerationError> {
        let mut last_error = None;

        for transport_retry in 0..self.policy.max_attempts() {
            if self.cancel.is_cancelled() {
                return Err(Self::cancelled("before request"));
            }

            let started = Instant::now();
            let result = self.generation.generate(spec.prompt).await;

            if self.cancel.is_cancelled() {
                return Err(Self::cancelled("after request"));
            }

            match result {
                Ok(response) => {
                    let measured = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    let meta = ExtractionRequestMeta {
                        profile_id: response.meta.profile_id.clone(),
                        prompt_chars: spec.prompt.chars().count(),
                        output_chars: response.text.chars().count(),
                        duration_ms: if response.meta.duration_ms > 0 {
                            response.meta.duration_ms
                        } else {
                            measured
                        },
                        stat_list: spec.stat_list.to_vec(),
                        attempt: spec.attempt,
                        retry_type: spec.retry_type,
                        transport_retry: transport_retry as u32,
                        timestamp: self.clock.now(),
                    };
                    tracing::debug!(
                        stats = ?meta.stat_list,
                        label = %meta.retry_label(),
                        duration_ms = meta.duration_ms,
                        output_chars = meta.output_chars,
                        "Generation request completed"
                    );
                    if transport_retry > 0 {
                        tracing::info!(
                            attempt = transport_retry + 1,
                            retry_type = %spec.retry_type,
                            "Generation request succeeded after retry"
                        );
                    }
                    self.audit.lock().await.push(meta);
                    return Ok(response.text);
                }
                Err(e) if e.is_cancellation() => {
                    tracing::info!(error = %e, "Generation request aborted");
                    return Err(GenerationError::Cancelled(e.to_string()));
                }
                Err(e) => {
                    if let Some(delay) = self.policy.backoff_ms.get(transport_retry).copied() {
                        tracing::warn!(
                            attempt = transport_retry + 1,
                            max_attempts = self.policy.max_attempts(),
                            delay_ms = delay,
                            error = %e,
                            retry_type = %spec.retry_type,
                            "Generation request failed, retrying..."
                        );
                        if self.cancel.is_cancelled() {
                            return Err(Self::cancelled("before backoff"));
                        }
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                return Err(Self::cancelled("during backoff"));
                            }
                            _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| GenerationError::request_failed("no transport attempts made"));
        tracing::error!(
            attempts = self.policy.max_attempts(),
            error = %error,
            retry_type = %spec.retry_type,
            "Generation request failed after all retry attempts"
        );
        Err(error)
    }

    /// Audit entries recorded so far, in completion order.
    pub async fn audit(&self) -> Vec<ExtractionRequestMeta> {
        self.audit.lock().await.clone()
    }
}
