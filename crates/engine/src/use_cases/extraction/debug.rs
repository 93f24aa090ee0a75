//! Debug record for one extraction run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use rapport_domain::{ExtractionMode, ExtractionRequestMeta, ExtractionSettings};

use super::apply::{BatchTrace, MergeDiagnostics, ValueLog};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugCounts {
    pub requests: usize,
    pub batches: usize,
    pub uncovered_batches: usize,
    pub parsed_values: usize,
    pub applied_values: usize,
    pub seeded_values: usize,
    pub mood_fallbacks: usize,
}

/// Everything needed to explain a run after the fact.
///
/// Prompts and context text are omitted unless the settings ask for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugRecord {
    pub mode: ExtractionMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub characters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_text: Option<String>,
    pub counts: DebugCounts,
    pub batches: Vec<BatchTrace>,
    pub parsed: ValueLog,
    pub applied: ValueLog,
    pub seeded: ValueLog,
    pub mood_fallbacks: Vec<String>,
    pub requests: Vec<ExtractionRequestMeta>,
}

pub struct DebugRecordBuilder {
    mode: ExtractionMode,
    include_context: bool,
    characters: Vec<String>,
    context_text: String,
    started_at: DateTime<Utc>,
}

impl DebugRecordBuilder {
    pub fn new(settings: &ExtractionSettings, started_at: DateTime<Utc>) -> Self {
        Self {
            mode: settings.extraction_mode,
            include_context: settings.include_context_in_diagnostics,
            characters: Vec::new(),
            context_text: String::new(),
            started_at,
        }
    }

    pub fn with_characters(mut self, characters: &[String]) -> Self {
        self.characters = characters.to_vec();
        self
    }

    pub fn with_context(mut self, context_text: impl Into<String>) -> Self {
        self.context_text = context_text.into();
        self
    }

    pub fn build(
        self,
        diagnostics: &MergeDiagnostics,
        requests: &[ExtractionRequestMeta],
        finished_at: DateTime<Utc>,
    ) -> DebugRecord {
        let batches: Vec<BatchTrace> = diagnostics
            .batches
            .iter()
            .cloned()
            .map(|mut trace| {
                if !self.include_context {
                    trace.prompt.clear();
                }
                trace
            })
            .collect();

        let counts = DebugCounts {
            requests: requests.len(),
            batches: batches.len(),
            uncovered_batches: batches.iter().filter(|b| !b.covered).count(),
            parsed_values: MergeDiagnostics::count(&diagnostics.parsed),
            applied_values: MergeDiagnostics::count(&diagnostics.applied),
            seeded_values: MergeDiagnostics::count(&diagnostics.seeded),
            mood_fallbacks: diagnostics.mood_fallbacks.len(),
        };

        DebugRecord {
            mode: self.mode,
            started_at: self.started_at,
            finished_at,
            characters: self.characters,
            context_text: self.include_context.then_some(self.context_text),
            counts,
            batches,
            parsed: diagnostics.parsed.clone(),
            applied: diagnostics.applied.clone(),
            seeded: diagnostics.seeded.clone(),
            mood_fallbacks: diagnostics.mood_fallbacks.clone(),
            requests: requests.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diagnostics() -> MergeDiagnostics {
        let mut diag = MergeDiagnostics::default();
        diag.applied
            .entry("trust".into())
            .or_default()
            .insert("Mira".into(), json!(55));
        diag.mood_fallbacks.push("Jon".into());
        diag.batches.push(BatchTrace {
            label: "trust".into(),
            stats: vec!["trust".into()],
            characters: vec!["Mira".into()],
            prompt: "secret prompt".into(),
            outputs: Vec::new(),
            covered: false,
            first_parse_empty: true,
            parsed_values: 0,
        });
        diag
    }

    #[test]
    fn prompts_and_context_are_omitted_by_default() {
        let settings = ExtractionSettings::default();
        let record = DebugRecordBuilder::new(&settings, DateTime::<Utc>::default())
            .with_context("the whole chat")
            .build(&diagnostics(), &[], DateTime::<Utc>::default());

        assert!(record.context_text.is_none());
        assert!(record.batches[0].prompt.is_empty());
        assert_eq!(record.counts.applied_values, 1);
        assert_eq!(record.counts.uncovered_batches, 1);
        assert_eq!(record.counts.mood_fallbacks, 1);
    }

    #[test]
    fn prompts_and_context_kept_when_enabled() {
        let settings = ExtractionSettings {
            include_context_in_diagnostics: true,
            ..Default::default()
        };
        let record = DebugRecordBuilder::new(&settings, DateTime::<Utc>::default())
            .with_context("the whole chat")
            .build(&diagnostics(), &[], DateTime::<Utc>::default());

        assert_eq!(record.context_text.as_deref(), Some("the whole chat"));
        assert_eq!(record.batches[0].prompt, "secret prompt");
        let json = serde_json::to_value(&record).expect("serializes");
        assert_eq!(json["counts"]["batches"], 1);
    }
}
