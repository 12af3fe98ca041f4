//! Narrative source backed by a chat-completion model.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::backend::{AiBackend, ChatMessage, ChatRequest};
use super::{extract_json, NarrativeError, NarrativeRequest, NarrativeSource, RawEvent};

const SYSTEM_PROMPT: &str = "You are a football match commentator. \
You always answer with a single JSON object and nothing else.";

/// Expected model response shape.
#[derive(Debug, Deserialize)]
struct MatchScript {
    events: Vec<RawEvent>,
    /// Claimed score; never trusted, only logged
    #[serde(default, rename = "finalScore")]
    final_score: Option<BTreeMap<String, serde_json::Value>>,
}

/// Asks an AI backend for a full 90-minute match timeline.
pub struct AiNarrativeSource {
    backend: Arc<dyn AiBackend>,
    temperature: f32,
}

impl AiNarrativeSource {
    pub fn new(backend: Arc<dyn AiBackend>) -> Self {
        Self {
            backend,
            temperature: 0.9,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_prompt(request: &NarrativeRequest) -> String {
        let home = &request.home_name;
        let away = &request.away_name;

        format!(
            r#"Create a realistic 90-minute football match between {home} vs {away} with full match commentary.

Team rosters:
{home} players: {home_roster}
{away} players: {away_roster}

The result must be unpredictable: either team can win, lose or draw.

Return ONLY valid JSON in this exact format:
{{
  "events": [
    {{"minute": 1, "type": "commentary", "team": "{home}", "player": "", "description": "The match kicks off!"}},
    {{"minute": 15, "type": "goal", "team": "{home}", "player": "Player Name From Roster", "description": "GOAL! ..."}}
  ],
  "finalScore": {{"{home}": 0, "{away}": 0}}
}}

Rules:
- Every goal event names the exact scorer from the rosters above
- Total goals anywhere from 0 to 7 combined
- 20 to 35 events spread over minutes 1 to 90, in chronological order
- Event types: "goal", "yellow_card", "red_card", "substitution", "commentary"
- Team names must exactly match "{home}" or "{away}""#,
            home_roster = roster_line(&request.home_roster),
            away_roster = roster_line(&request.away_roster),
        )
    }

    /// Parse a model response into raw events.
    pub fn parse_response(content: &str) -> Result<Vec<RawEvent>, NarrativeError> {
        let json = extract_json(content);
        let script: MatchScript = serde_json::from_str(json)
            .map_err(|e| NarrativeError::ResponseParseError(e.to_string()))?;

        if let Some(claimed) = &script.final_score {
            debug!("Narrative claimed final score {:?} (ignored)", claimed);
        }

        Ok(script.events)
    }
}

fn roster_line(names: &[String]) -> String {
    if names.is_empty() {
        "No player data available".to_string()
    } else {
        names.join(", ")
    }
}

#[async_trait]
impl NarrativeSource for AiNarrativeSource {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    async fn generate(&self, request: &NarrativeRequest) -> Result<Vec<RawEvent>, NarrativeError> {
        info!(
            "Requesting narrative for {} vs {} from {}",
            request.home_name,
            request.away_name,
            self.backend.name()
        );

        let chat = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(Self::build_prompt(request)),
        ])
        .with_json_mode()
        .with_temperature(self.temperature);

        let response = self.backend.chat(chat).await?;
        debug!(
            "Narrative response from {}: {} chars",
            response.model,
            response.content.len()
        );

        let events = Self::parse_response(&response.content).inspect_err(|e| {
            warn!("Discarding narrative from {}: {}", self.backend.name(), e);
        })?;

        info!("Narrative source produced {} events", events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::backend::MockBackend;

    fn request() -> NarrativeRequest {
        NarrativeRequest {
            home_name: "ENG".to_string(),
            away_name: "BRA".to_string(),
            home_roster: vec!["Kane".to_string(), "Rice".to_string()],
            away_roster: vec![],
        }
    }

    #[test]
    fn test_prompt_mentions_teams_and_rosters() {
        let prompt = AiNarrativeSource::build_prompt(&request());
        assert!(prompt.contains("ENG vs BRA"));
        assert!(prompt.contains("ENG players: Kane, Rice"));
        assert!(prompt.contains("BRA players: No player data available"));
    }

    #[test]
    fn test_parse_response_fenced() {
        let content = "```json\n{\"events\": [{\"minute\": 15, \"type\": \"goal\", \"team\": \"ENG\", \"player\": \"Kane\", \"description\": \"GOAL!\"}], \"finalScore\": {\"ENG\": 3, \"BRA\": 0}}\n```";
        let events = AiNarrativeSource::parse_response(content).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].player.as_deref(), Some("Kane"));
    }

    #[test]
    fn test_parse_response_missing_events() {
        let err = AiNarrativeSource::parse_response(r#"{"finalScore": {}}"#).unwrap_err();
        assert!(matches!(err, NarrativeError::ResponseParseError(_)));
    }

    #[tokio::test]
    async fn test_generate_with_mock_backend() {
        let backend = Arc::new(MockBackend::new(
            r#"{"events": [{"minute": 1, "type": "commentary", "team": "ENG", "player": "", "description": "Kick-off"}]}"#,
        ));
        let source = AiNarrativeSource::new(backend);

        let events = source.generate(&request()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(source.name(), "mock");
    }

    #[tokio::test]
    async fn test_generate_malformed_json() {
        let source = AiNarrativeSource::new(Arc::new(MockBackend::new("the match was great")));
        let err = source.generate(&request()).await.unwrap_err();
        assert!(matches!(err, NarrativeError::ResponseParseError(_)));
    }

    #[tokio::test]
    async fn test_generate_backend_down() {
        let source = AiNarrativeSource::new(Arc::new(MockBackend::failing("connection refused")));
        let err = source.generate(&request()).await.unwrap_err();
        assert!(matches!(err, NarrativeError::BackendUnavailable(_)));
    }
}
