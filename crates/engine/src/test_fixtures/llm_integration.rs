//! Live-model helpers for Ollama.
//!
//! Tests using these are `#[ignore]`d and only run against a local server:
//!
//! ```rust,ignore
//! #[tokio::test]
//! #[ignore = "requires ollama"]
//! async fn test_live_extraction() {
//!     skip_if_ollama_unavailable().await;
//!     let generation = Arc::new(create_test_ollama_client());
//!     // ... test logic
//! }
//! ```

use crate::infrastructure::ollama::{OllamaClient, DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL};
use crate::infrastructure::ports::GenerationPort;

/// Client configured from `OLLAMA_BASE_URL` / `OLLAMA_MODEL`.
pub fn create_test_ollama_client() -> OllamaClient {
    OllamaClient::from_env()
}

pub fn create_test_ollama_client_with_timeout(timeout_secs: u64) -> OllamaClient {
    let base_url =
        std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());
    let model =
        std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
    OllamaClient::with_timeout(&base_url, &model, timeout_secs)
}

pub async fn ollama_available() -> bool {
    create_test_ollama_client_with_timeout(10)
        .generate("Reply with {}")
        .await
        .is_ok()
}

pub async fn skip_if_ollama_unavailable() {
    if !ollama_available().await {
        panic!("Ollama is not available - skipping test");
    }
}

/// A short exchange with an obvious warm turn between two characters.
pub const WARM_SCENE: &str = "Mira: I kept the lantern lit for you all night.\n\
Jon: You did? Nobody has ever waited up for me before.\n\
Mira: Of course. I was worried.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::extractor;
    use crate::use_cases::extraction::ExtractionInput;
    use rapport_domain::ExtractionSettings;
    use std::sync::Arc;

    #[tokio::test]
    #[ignore = "requires ollama"]
    async fn live_unified_extraction_produces_bounded_stats() {
        skip_if_ollama_unavailable().await;
        let generation = Arc::new(create_test_ollama_client());
        let input = ExtractionInput::new(ExtractionSettings::default(), ["Mira", "Jon"])
            .with_context(WARM_SCENE);

        let outcome = extractor(generation)
            .execute(input)
            .await
            .expect("extraction completes");

        let trust = &outcome.statistics.trust;
        for name in ["Mira", "Jon"] {
            let value = trust.get(name).copied().expect("trust present");
            assert!((0..=100).contains(&value), "{name}: {value}");
        }
    }
}
