//! Ollama generation backend (OpenAI-compatible chat completions)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::infrastructure::ports::{
    GenerationError, GenerationMeta, GenerationPort, GenerationResponse,
};

/// Default Ollama base URL.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Default model for stat extraction.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";

/// Extraction prompts expect terse JSON; a low temperature keeps it stable.
const EXTRACTION_TEMPERATURE: f32 = 0.2;

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self::with_timeout(base_url, model, 120)
    }

    pub fn with_timeout(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create client from `OLLAMA_BASE_URL` and `OLLAMA_MODEL`, falling back
    /// to defaults if not set.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
        Self::new(&base_url, &model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL)
    }
}

#[async_trait]
impl GenerationPort for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<GenerationResponse, GenerationError> {
        let started = Instant::now();
        let api_request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature: Some(EXTRACTION_TEMPERATURE),
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&api_request)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;
            return Err(GenerationError::RequestFailed(format!(
                "{}: {}",
                status, error_text
            )));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let text = first_choice_text(api_response)?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(GenerationResponse {
            meta: GenerationMeta {
                profile_id: Some(self.model.clone()),
                prompt_chars: prompt.chars().count(),
                output_chars: text.chars().count(),
                duration_ms,
            },
            text,
        })
    }
}

fn first_choice_text(response: ChatResponse) -> Result<String, GenerationError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("No choices in response".to_string()))?;
    Ok(choice.message.content.unwrap_or_default())
}

// =============================================================================
// OpenAI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let client = OllamaClient::new("http://gpu-box:11434/", "qwen2.5");
        assert_eq!(client.endpoint(), "http://gpu-box:11434/v1/chat/completions");
        assert_eq!(client.model(), "qwen2.5");
    }

    #[test]
    fn extracts_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"characters\":[]}"}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).expect("valid body");
        assert_eq!(
            first_choice_text(response).expect("has choice"),
            "{\"characters\":[]}"
        );
    }

    #[test]
    fn empty_choices_is_invalid_response() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("valid body");
        assert!(matches!(
            first_choice_text(response),
            Err(GenerationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn request_serializes_without_stream_by_default() {
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: Some("hi".into()),
            }],
            temperature: None,
            stream: false,
        };
        let json = serde_json::to_value(&request).expect("serializes");
        assert_eq!(json["stream"], false);
        assert!(json.get("temperature").is_none());
    }
}
