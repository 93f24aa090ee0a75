//! Default prompt protocol for stat extraction.
//!
//! Asks for one JSON object with a `characters` array. Each entry carries a
//! name, an optional confidence, numeric `deltas`, `mood`, `lastThought`, and
//! a `custom` object keyed by custom stat id. [`super::response_parser`]
//! reads the same shape back.

use rapport_domain::{BuiltInStat, CustomStatDefinition, CustomStatKind, MoodLabel, GLOBAL_OWNER};

use crate::infrastructure::ports::{BatchKind, PromptBuilderPort, PromptRequest, RepairTemplate};

const ROLE_INSTRUCTIONS: &str = r#"You track how each character currently feels about the user in an ongoing roleplay.
Read the recent conversation and report how the relationship moved during the latest exchange.
Numeric stats are reported as signed deltas, not absolute values. Report 0 when nothing changed."#;

const RESPONSE_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{"characters":[{"name":"<character>","confidence":<0.0-1.0>,"deltas":{<numeric stat>:<integer>},"mood":"<label>","lastThought":"<one sentence>","custom":{<stat id>:<value>}}]}
Only include the stats listed above. Include every listed character."#;

const STRICT_RETRY_PREFIX: &str = r#"Your previous answer could not be read.
Reply with STRICT JSON only: no prose, no markdown fences, no comments.
Follow the response format exactly."#;

const MOOD_REPAIR: &str = r#"Your previous answer did not contain a usable mood.
Reply with STRICT JSON only, of the form {"characters":[{"name":"<character>","confidence":<0.0-1.0>,"mood":"<label>"}]}.
The mood must be exactly one of:"#;

const LAST_THOUGHT_REPAIR: &str = r#"Your previous answer did not contain a usable last thought.
Reply with STRICT JSON only, of the form {"characters":[{"name":"<character>","lastThought":"<one short first-person sentence>"}]}."#;

const GENERIC_REPAIR: &str = r#"Your previous answer did not contain a usable value for the requested stat.
Reply with STRICT JSON only, following the response format exactly."#;

/// How many history snapshots are shown in a prompt.
const HISTORY_WINDOW: usize = 3;

/// Plain-text prompt builder speaking the JSON protocol above.
#[derive(Debug, Clone, Default)]
pub struct ProtocolPromptBuilder;

impl ProtocolPromptBuilder {
    pub fn new() -> Self {
        Self
    }

    fn describe_builtin(stat: BuiltInStat, max_delta: u32) -> String {
        match stat {
            BuiltInStat::Mood => format!("- mood: one of {}", MoodLabel::vocabulary()),
            BuiltInStat::LastThought => {
                "- lastThought: the character's private thought right now, first person".to_string()
            }
            numeric => format!(
                "- {}: integer delta between -{} and {}",
                numeric.key(),
                max_delta,
                max_delta
            ),
        }
    }

    fn describe_custom(def: &CustomStatDefinition, max_delta: u32) -> String {
        let detail = match def.kind {
            CustomStatKind::Numeric => {
                let bound = def.effective_max_delta(max_delta);
                format!("integer delta between -{} and {}", bound, bound)
            }
            CustomStatKind::EnumSingle => format!("one of {}", def.enum_options.join(", ")),
            CustomStatKind::Boolean => "true or false".to_string(),
            CustomStatKind::TextShort => {
                format!("short text, at most {} characters", def.text_limit())
            }
        };
        let mut line = format!("- custom.{} ({}): {}", def.id, def.label, detail);
        if !def.description.trim().is_empty() {
            line.push_str(&format!(". {}", def.description.trim()));
        }
        if def.global_scope {
            line.push_str(". Shared by everyone; report it once on any character");
        }
        line
    }

    fn previous_values(request: &PromptRequest<'_>) -> Vec<String> {
        let mut lines = Vec::new();
        for name in request.characters {
            let mut parts = Vec::new();
            for stat in request.builtin_stats {
                let value = match stat.as_numeric() {
                    Some(numeric) => request
                        .prior
                        .statistics
                        .numeric_value(numeric, name)
                        .map(|v| v.to_string()),
                    None if *stat == BuiltInStat::Mood => {
                        request.prior.statistics.mood.get(name).cloned()
                    }
                    None => request.prior.statistics.last_thought.get(name).cloned(),
                };
                if let Some(value) = value {
                    parts.push(format!("{}={}", stat.key(), value));
                }
            }
            for def in request.custom_stats {
                let owner = if def.global_scope {
                    GLOBAL_OWNER
                } else {
                    name.as_str()
                };
                let value = request
                    .prior
                    .custom
                    .get(&def.id)
                    .and_then(|m| m.get(owner))
                    .map(|v| v.to_string())
                    .or_else(|| {
                        request
                            .prior
                            .custom_non_numeric
                            .get(&def.id)
                            .and_then(|m| m.get(owner))
                            .map(|v| v.to_string())
                    });
                if let Some(value) = value {
                    parts.push(format!("{}={}", def.id, value));
                }
            }
            if !parts.is_empty() {
                lines.push(format!("- {}: {}", name, parts.join(", ")));
            }
        }
        lines
    }

    fn history_lines(request: &PromptRequest<'_>) -> Vec<String> {
        let start = request.history.len().saturating_sub(HISTORY_WINDOW);
        request.history[start..]
            .iter()
            .enumerate()
            .flat_map(|(turn, snapshot)| {
                request.characters.iter().filter_map(move |name| {
                    let mood = snapshot.mood.get(name)?;
                    Some(format!("- turn -{}: {} felt {}", HISTORY_WINDOW - turn, name, mood))
                })
            })
            .collect()
    }
}

impl PromptBuilderPort for ProtocolPromptBuilder {
    fn build(&self, request: &PromptRequest<'_>) -> String {
        let mut sections = vec![ROLE_INSTRUCTIONS.to_string()];

        let scope = match request.kind {
            BatchKind::UnifiedAll => "Report every stat below for every character.",
            BatchKind::UnifiedPrivate => {
                "These stats are private to the character below. Report them only for that character."
            }
            BatchKind::SingleStat => "Report only the single stat below.",
        };
        sections.push(format!(
            "## Characters\n{}\n{}",
            request.characters.join(", "),
            scope
        ));

        let stats: Vec<String> = request
            .builtin_stats
            .iter()
            .map(|s| Self::describe_builtin(*s, request.max_delta))
            .chain(
                request
                    .custom_stats
                    .iter()
                    .map(|d| Self::describe_custom(d, request.max_delta)),
            )
            .collect();
        sections.push(format!("## Stats to report\n{}", stats.join("\n")));

        let previous = Self::previous_values(request);
        if !previous.is_empty() {
            sections.push(format!("## Current values\n{}", previous.join("\n")));
        }

        let history = Self::history_lines(request);
        if !history.is_empty() {
            sections.push(format!("## Recent moods\n{}", history.join("\n")));
        }

        sections.push(format!("## Conversation\n{}", request.context_text.trim()));
        sections.push(RESPONSE_FORMAT.to_string());
        sections.join("\n\n")
    }

    fn strict_retry(&self, original: &str) -> String {
        format!("{}\n\n{}", STRICT_RETRY_PREFIX, original)
    }

    fn repair(&self, original: &str, template: RepairTemplate, stat_key: &str) -> String {
        let header = match template {
            RepairTemplate::Mood => format!("{} {}", MOOD_REPAIR, MoodLabel::vocabulary()),
            RepairTemplate::LastThought => LAST_THOUGHT_REPAIR.to_string(),
            RepairTemplate::Generic => format!("{}\nRequested stat: {}", GENERIC_REPAIR, stat_key),
        };
        format!("{}\n\n{}", header, original)
    }
}
