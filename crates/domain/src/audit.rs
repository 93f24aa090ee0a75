//! Request audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which rung of the retry ladder produced a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryType {
    /// First request for a batch
    Initial,
    /// Generic strict-JSON retry
    Strict,
    /// Stat-specific repair retry
    Repair,
    /// Repeated strict retry until the budget runs out
    StrictLoop,
}

impl RetryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryType::Initial => "initial",
            RetryType::Strict => "strict",
            RetryType::Repair => "repair",
            RetryType::StrictLoop => "strict_loop",
        }
    }
}

impl fmt::Display for RetryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of one successful generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequestMeta {
    pub profile_id: Option<String>,
    pub prompt_chars: usize,
    pub output_chars: usize,
    pub duration_ms: u64,
    pub stat_list: Vec<String>,
    /// Ladder attempt number within the batch, starting at 1
    pub attempt: u32,
    pub retry_type: RetryType,
    /// Transport retry index; 0 for the first transport attempt
    pub transport_retry: u32,
    pub timestamp: DateTime<Utc>,
}

impl ExtractionRequestMeta {
    /// `strict`, or `strict_retry2` when the transport needed retries.
    pub fn retry_label(&self) -> String {
        if self.transport_retry == 0 {
            self.retry_type.as_str().to_string()
        } else {
            format!("{}_retry{}", self.retry_type, self.transport_retry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(retry_type: RetryType, transport_retry: u32) -> ExtractionRequestMeta {
        ExtractionRequestMeta {
            profile_id: None,
            prompt_chars: 10,
            output_chars: 5,
            duration_ms: 3,
            stat_list: vec!["trust".into()],
            attempt: 1,
            retry_type,
            transport_retry,
            timestamp: DateTime::<Utc>::default(),
        }
    }

    #[test]
    fn label_is_suffixed_only_after_transport_retry() {
        assert_eq!(meta(RetryType::Initial, 0).retry_label(), "initial");
        assert_eq!(meta(RetryType::StrictLoop, 2).retry_label(), "strict_loop_retry2");
    }

    #[test]
    fn retry_type_serializes_snake_case() {
        let json = serde_json::to_string(&RetryType::StrictLoop).expect("serializes");
        assert_eq!(json, "\"strict_loop\"");
    }
}
