//! Test fixtures and doubles shared by engine tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_fixtures::{extractor, ScriptedGeneration};
//!
//! #[tokio::test]
//! async fn test_trust_rises() {
//!     let generation = Arc::new(ScriptedGeneration::replying(r#"{"characters":[]}"#));
//!     let outcome = extractor(generation.clone()).execute(input).await;
//!     // ... assertions
//! }
//! ```

pub mod llm_integration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::infrastructure::clock::FixedClock;
use crate::infrastructure::ports::{GenerationError, GenerationPort, GenerationResponse};
use crate::infrastructure::prompt_builder::ProtocolPromptBuilder;
use crate::infrastructure::response_parser::JsonResponseParser;
use crate::use_cases::extraction::{ExtractStatistics, TransportRetryPolicy};

type Responder = Box<dyn Fn(&str) -> Result<String, GenerationError> + Send + Sync>;

/// Generation double driven by a closure over the prompt text.
///
/// Records every prompt it receives and the peak number of concurrent calls.
pub struct ScriptedGeneration {
    responder: Responder,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedGeneration {
    pub fn new(
        responder: impl Fn(&str) -> Result<String, GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: None,
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always answer with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Answer from a fixed script; repeats the last entry once exhausted.
    pub fn scripted(replies: Vec<Result<String, GenerationError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            let mut queue = queue.lock().expect("script lock");
            match queue.len() {
                0 => Err(GenerationError::request_failed("script exhausted")),
                1 => queue[0].clone(),
                _ => queue
                    .pop_front()
                    .unwrap_or_else(|| Err(GenerationError::request_failed("script exhausted"))),
            }
        })
    }

    /// Hold each call open for `delay` so concurrent calls overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().expect("prompt lock").len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationPort for ScriptedGeneration {
    async fn generate(&self, prompt: &str) -> Result<GenerationResponse, GenerationError> {
        self.prompts
            .lock()
            .expect("prompt lock")
            .push(prompt.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.responder)(prompt).map(GenerationResponse::new)
    }
}

/// Fixed timestamp used by test clocks.
pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Extractor wired with the default prompt protocol and parser, a fixed
/// clock, and no transport backoff.
pub fn extractor(generation: Arc<dyn GenerationPort>) -> ExtractStatistics {
    ExtractStatistics::new(
        generation,
        Arc::new(ProtocolPromptBuilder::new()),
        Arc::new(JsonResponseParser::new()),
        Arc::new(FixedClock(test_time())),
    )
    .with_transport_policy(TransportRetryPolicy::immediate())
}
