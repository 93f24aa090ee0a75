//! Rapport extraction engine.
//!
//! Plans, sends, repairs, and merges the model requests that keep
//! per-character relationship stats up to date.
//!
//! ## Structure
//!
//! - `use_cases/` - Extraction orchestration
//! - `infrastructure/` - Port traits and their reference adapters
//!
//! ## Wiring
//!
//! ```rust,ignore
//! let extractor = ExtractStatistics::new(
//!     Arc::new(OllamaClient::from_env()),
//!     Arc::new(ProtocolPromptBuilder::new()),
//!     Arc::new(JsonResponseParser::new()),
//!     Arc::new(SystemClock),
//! );
//! let input = ExtractionInput::new(ExtractionSettings::from_env(), ["Mira", "Jon"])
//!     .with_context(transcript)
//!     .with_prior(prior);
//! let outcome = extractor.execute(input).await?;
//! ```

pub mod infrastructure;
pub mod use_cases;

/// Scripted doubles shared by engine tests.
#[cfg(test)]
pub mod test_fixtures;

pub use use_cases::extraction::{
    ExtractStatistics, ExtractionError, ExtractionInput, ExtractionOutcome,
};
