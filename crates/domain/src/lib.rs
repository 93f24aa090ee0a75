//! Rapport domain types.
//!
//! Everything in this crate is pure: stat identifiers, custom stat
//! definitions, the parsed-response records produced by the response
//! parsers, and the rules used to fold parsed values into the running
//! statistics. The engine crate owns all I/O and orchestration.

pub mod audit;
pub mod characters;
pub mod custom_stat;
pub mod error;
pub mod mood;
pub mod normalize;
pub mod parsed;
pub mod rules;
pub mod settings;
pub mod stats;

pub use audit::{ExtractionRequestMeta, RetryType};
pub use characters::{alias_user_in_prompt, is_user_only, user_alias_map, GLOBAL_OWNER, USER_SENTINEL};
pub use custom_stat::{CustomStatDefinition, CustomStatKind, StatDefault};
pub use error::DomainError;
pub use mood::MoodLabel;
pub use parsed::{ParsedCustomResponse, ParsedDeltaResponse};
pub use rules::{
    apply_mood, apply_numeric_delta, clamp_stat, confidence_scale, round_half_away, DeltaPolicy,
    MoodDecision, DEFAULT_CONFIDENCE, STAT_MAX, STAT_MIN,
};
pub use settings::{ExtractionMode, ExtractionSettings, MAX_RETRY_BUDGET, MAX_WORKERS};
pub use stats::{
    BuiltInStat, CustomNonNumericStatistics, CustomStatistics, CustomValue, NumericStat,
    PriorState, Statistics, MAX_LIST_ENTRIES,
};
