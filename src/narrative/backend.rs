//! AI backend abstraction.
//!
//! Supports multiple AI backends:
//! - Local: Ollama (default)
//! - Remote: Gemini (feature-flagged)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::NarrativeError;
use crate::config::NarrativeConfig;

/// A message in a conversation with the AI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request to the AI backend.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            json_mode: false,
        }
    }

    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from the AI backend.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
}

/// Trait for AI backends.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Send a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, NarrativeError>;

    /// Check if the backend is available.
    async fn health_check(&self) -> Result<bool, NarrativeError>;
}

fn build_client(timeout_seconds: u64) -> Result<reqwest::Client, NarrativeError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| NarrativeError::BackendUnavailable(format!("HTTP client: {e}")))
}

fn request_error(e: reqwest::Error, timeout_seconds: u64) -> NarrativeError {
    if e.is_timeout() {
        NarrativeError::Timeout(timeout_seconds)
    } else {
        NarrativeError::BackendUnavailable(e.to_string())
    }
}

/// Ollama backend implementation.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_seconds: u64,
}

impl OllamaBackend {
    pub fn new(base_url: String, model: String, timeout_seconds: u64) -> Result<Self, NarrativeError> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout_seconds,
        })
    }
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Default)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[async_trait]
impl AiBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, NarrativeError> {
        let url = format!("{}/api/chat", self.base_url);

        let messages: Vec<OllamaMessage> = request
            .messages
            .into_iter()
            .map(|m| OllamaMessage {
                role: m.role.as_str().to_string(),
                content: m.content,
            })
            .collect();

        let ollama_request = OllamaRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: request.json_mode.then(|| "json".to_string()),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        debug!("Sending request to Ollama: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout_seconds))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NarrativeError::BackendUnavailable(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| NarrativeError::ResponseParseError(e.to_string()))?;

        Ok(ChatResponse {
            content: ollama_response.message.content,
            model: ollama_response.model,
        })
    }

    async fn health_check(&self) -> Result<bool, NarrativeError> {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// --- Gemini backend ---

#[cfg(feature = "remote-ai")]
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[cfg(feature = "remote-ai")]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[cfg(feature = "remote-ai")]
#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[cfg(feature = "remote-ai")]
#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[cfg(feature = "remote-ai")]
#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[cfg(feature = "remote-ai")]
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[cfg(feature = "remote-ai")]
#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

/// Google Gemini backend implementation.
#[cfg(feature = "remote-ai")]
pub struct GeminiBackend {
    client: reqwest::Client,
    model: String,
    api_key: String,
    timeout_seconds: u64,
}

#[cfg(feature = "remote-ai")]
impl GeminiBackend {
    pub fn new(api_key: String, model: String, timeout_seconds: u64) -> Result<Self, NarrativeError> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            model,
            api_key,
            timeout_seconds,
        })
    }

    pub fn from_env(api_key_env: &str, model: String, timeout_seconds: u64) -> Result<Self, NarrativeError> {
        let api_key = std::env::var(api_key_env).map_err(|_| {
            NarrativeError::BackendUnavailable(format!("{api_key_env} env var not set"))
        })?;
        Self::new(api_key, model, timeout_seconds)
    }

    fn build_request(request: ChatRequest) -> GeminiRequest {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for msg in request.messages {
            match msg.role {
                MessageRole::System => system_parts.push(GeminiPart { text: msg.content }),
                MessageRole::User => contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![GeminiPart { text: msg.content }],
                }),
                MessageRole::Assistant => contents.push(GeminiContent {
                    role: Some("model".to_string()),
                    parts: vec![GeminiPart { text: msg.content }],
                }),
            }
        }

        GeminiRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then(|| GeminiContent {
                role: None,
                parts: system_parts,
            }),
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: request
                    .json_mode
                    .then(|| "application/json".to_string()),
            },
        }
    }
}

#[cfg(feature = "remote-ai")]
#[async_trait]
impl AiBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, NarrativeError> {
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.model);
        let gemini_request = Self::build_request(request);

        debug!("Sending request to Gemini model {}", self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout_seconds))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NarrativeError::BackendUnavailable(format!(
                "Gemini API returned {}: {}",
                status, body
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| NarrativeError::ResponseParseError(e.to_string()))?;

        let content = gemini_response
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| {
                NarrativeError::ResponseParseError("Gemini returned no candidates".to_string())
            })?;

        Ok(ChatResponse {
            content,
            model: self.model.clone(),
        })
    }

    async fn health_check(&self) -> Result<bool, NarrativeError> {
        // No health endpoint; assume available if the key is set
        Ok(!self.api_key.is_empty())
    }
}

/// Create an AI backend from configuration.
pub fn create_backend(config: &NarrativeConfig) -> Result<Box<dyn AiBackend>, NarrativeError> {
    match config.backend.to_ascii_lowercase().as_str() {
        "ollama" => Ok(Box::new(OllamaBackend::new(
            config.base_url.clone(),
            config.model.clone(),
            config.timeout_seconds,
        )?)),
        #[cfg(feature = "remote-ai")]
        "gemini" => Ok(Box::new(GeminiBackend::from_env(
            &config.api_key_env,
            config.model.clone(),
            config.timeout_seconds,
        )?)),
        other => Err(NarrativeError::BackendUnavailable(format!(
            "unknown or disabled narrative backend '{other}'"
        ))),
    }
}

/// Mock backend for testing.
#[cfg(test)]
pub struct MockBackend {
    response: Result<String, String>,
}

#[cfg(test)]
impl MockBackend {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: Ok(response.into()),
        }
    }

    /// A backend whose every call fails as unavailable.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            response: Err(reason.into()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl AiBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, NarrativeError> {
        match &self.response {
            Ok(content) => Ok(ChatResponse {
                content: content.clone(),
                model: "mock".to_string(),
            }),
            Err(reason) => Err(NarrativeError::BackendUnavailable(reason.clone())),
        }
    }

    async fn health_check(&self) -> Result<bool, NarrativeError> {
        Ok(self.response.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let system = ChatMessage::system("You are a commentator");
        assert_eq!(system.role, MessageRole::System);

        let user = ChatMessage::user("Hello");
        assert_eq!(user.role, MessageRole::User);
    }

    #[test]
    fn test_chat_request_builder() {
        let request = ChatRequest::new(vec![ChatMessage::user("Test")])
            .with_json_mode()
            .with_temperature(0.9)
            .with_max_tokens(2048);

        assert!(request.json_mode);
        assert_eq!(request.temperature, Some(0.9));
        assert_eq!(request.max_tokens, Some(2048));
    }

    #[tokio::test]
    async fn test_mock_backend() {
        let backend = MockBackend::new(r#"{"events": []}"#);

        let request = ChatRequest::new(vec![ChatMessage::user("Test")]);
        let response = backend.chat(request).await.unwrap();

        assert_eq!(response.content, r#"{"events": []}"#);
        assert!(backend.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_mock_backend() {
        let backend = MockBackend::failing("offline");
        let request = ChatRequest::new(vec![ChatMessage::user("Test")]);

        let err = backend.chat(request).await.unwrap_err();
        assert!(matches!(err, NarrativeError::BackendUnavailable(_)));
        assert!(!backend.health_check().await.unwrap());
    }

    #[test]
    fn test_create_backend_ollama() {
        let backend = create_backend(&NarrativeConfig::default()).unwrap();
        assert_eq!(backend.name(), "ollama");
    }

    #[test]
    fn test_create_backend_unknown() {
        let config = NarrativeConfig {
            backend: "carrier-pigeon".to_string(),
            ..NarrativeConfig::default()
        };
        assert!(create_backend(&config).is_err());
    }

    #[test]
    fn test_ollama_request_json_format() {
        let request = OllamaRequest {
            model: "llama3.2".to_string(),
            messages: vec![OllamaMessage {
                role: "user".to_string(),
                content: "Hi".to_string(),
            }],
            stream: false,
            format: Some("json".to_string()),
            options: OllamaOptions::default(),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""format":"json""#));
        assert!(!json.contains("temperature"));
    }

    #[cfg(feature = "remote-ai")]
    #[test]
    fn test_gemini_request_serialization() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("You are a commentator"),
            ChatMessage::user("ENG vs BRA"),
        ])
        .with_json_mode()
        .with_temperature(0.9);

        let json = serde_json::to_string(&GeminiBackend::build_request(request)).unwrap();
        assert!(json.contains("systemInstruction"));
        assert!(json.contains("application/json"));
        assert!(json.contains("ENG vs BRA"));
    }

    #[cfg(feature = "remote-ai")]
    #[test]
    fn test_gemini_response_deserialization() {
        let json = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"events\": []}"}]}}]
        }"#;

        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.candidates.len(), 1);
        assert_eq!(response.candidates[0].content.parts[0].text, "{\"events\": []}");
    }
}
