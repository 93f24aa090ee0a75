//! External service port traits (text generation, prompt protocol, response parsing).

use async_trait::async_trait;
use std::collections::HashMap;

use rapport_domain::{
    BuiltInStat, CustomStatDefinition, ParsedCustomResponse, ParsedDeltaResponse, PriorState,
    Statistics,
};

use super::error::GenerationError;

// =============================================================================
// Generation
// =============================================================================

/// What the backend reports about a single call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationMeta {
    /// Backend profile or model that served the request
    pub profile_id: Option<String>,
    pub prompt_chars: usize,
    pub output_chars: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResponse {
    pub text: String,
    pub meta: GenerationMeta,
}

impl GenerationResponse {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            meta: GenerationMeta {
                output_chars: text.chars().count(),
                ..Default::default()
            },
            text,
        }
    }
}

/// One prompt in, one completion out. Retries and cancellation are handled
/// by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationPort: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GenerationResponse, GenerationError>;
}

// =============================================================================
// Prompt Protocol
// =============================================================================

/// Shape of the request a prompt is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Every public built-in and custom stat for every character
    UnifiedAll,
    /// Private stats for a single owner
    UnifiedPrivate,
    /// One stat, one request
    SingleStat,
}

/// Which repair wording to wrap a failed prompt in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairTemplate {
    Generic,
    Mood,
    LastThought,
}

impl RepairTemplate {
    /// Mood and last thought have dedicated wording; everything else is generic.
    pub fn for_stat(stat: BuiltInStat) -> Self {
        match stat {
            BuiltInStat::Mood => RepairTemplate::Mood,
            BuiltInStat::LastThought => RepairTemplate::LastThought,
            _ => RepairTemplate::Generic,
        }
    }
}

/// Everything a prompt builder needs for one request.
#[derive(Debug, Clone, Copy)]
pub struct PromptRequest<'a> {
    pub kind: BatchKind,
    pub characters: &'a [String],
    pub builtin_stats: &'a [BuiltInStat],
    pub custom_stats: &'a [CustomStatDefinition],
    pub context_text: &'a str,
    pub prior: &'a PriorState,
    pub history: &'a [Statistics],
    pub max_delta: u32,
}

impl PromptRequest<'_> {
    /// Wire keys of every stat in the request, built-ins first.
    pub fn stat_keys(&self) -> Vec<String> {
        self.builtin_stats
            .iter()
            .map(|s| s.key().to_string())
            .chain(self.custom_stats.iter().map(|d| d.id.clone()))
            .collect()
    }
}

/// Builds prompt text. Implementations are pure and synchronous.
pub trait PromptBuilderPort: Send + Sync {
    fn build(&self, request: &PromptRequest<'_>) -> String;

    /// Wrap a prompt whose answer could not be parsed.
    fn strict_retry(&self, original: &str) -> String;

    /// Stat-specific repair for a single-stat request.
    fn repair(&self, original: &str, template: RepairTemplate, stat_key: &str) -> String;
}

// =============================================================================
// Response Parsing
// =============================================================================

/// Turns raw model text into parsed records. Parsing never fails; bad input
/// yields an empty or partial record.
#[cfg_attr(test, mockall::automock)]
pub trait ResponseParserPort: Send + Sync {
    fn parse_builtin(
        &self,
        raw: &str,
        characters: &[String],
        stats: &[BuiltInStat],
        max_delta: u32,
        aliases: &HashMap<String, String>,
    ) -> ParsedDeltaResponse;

    fn parse_custom(
        &self,
        raw: &str,
        characters: &[String],
        stats: &[CustomStatDefinition],
        max_delta: u32,
        aliases: &HashMap<String, String>,
    ) -> ParsedCustomResponse;
}
