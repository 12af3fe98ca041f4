//! Narrative sources.
//!
//! A narrative source turns two team names (and optionally their rosters)
//! into a timeline of raw match events. The resolver never trusts the
//! output: it clips, sorts and re-scores it, and falls back to local
//! generation when the source fails.

pub mod ai;
pub mod backend;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Errors a narrative source can report. The resolver absorbs all of them.
#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("Narrative backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Narrative response unparseable: {0}")]
    ResponseParseError(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),
}

/// What a narrative source is asked to describe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarrativeRequest {
    pub home_name: String,
    pub away_name: String,
    pub home_roster: Vec<String>,
    pub away_roster: Vec<String>,
}

/// One event as reported by a narrative source, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawEvent {
    #[serde(deserialize_with = "lenient_minute")]
    pub minute: i64,

    #[serde(alias = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub team: String,

    #[serde(default, deserialize_with = "blank_as_none")]
    pub player: Option<String>,

    #[serde(default)]
    pub description: String,
}

impl RawEvent {
    pub fn new(minute: i64, kind: &str, team: &str, player: Option<&str>, description: &str) -> Self {
        Self {
            minute,
            kind: kind.to_string(),
            team: team.to_string(),
            player: player.map(str::to_string),
            description: description.to_string(),
        }
    }
}

/// Accepts `12`, `12.0`, `"12"` and stoppage notation like `"45+2"`.
fn lenient_minute<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = serde_json::Value::deserialize(deserializer)?;
    match &value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| D::Error::custom(format!("invalid minute {n}"))),
        serde_json::Value::String(s) => {
            let invalid = || D::Error::custom(format!("invalid minute {s:?}"));
            let mut total = 0i64;
            for part in s.trim().trim_end_matches('\'').split('+') {
                let n = part.trim().parse::<i64>().map_err(|_| invalid())?;
                total = total.checked_add(n).ok_or_else(invalid)?;
            }
            Ok(total)
        }
        other => Err(D::Error::custom(format!("invalid minute {other}"))),
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Anything that can produce a match timeline.
#[async_trait]
pub trait NarrativeSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &'static str;

    /// Produce raw events covering a 90-minute match.
    async fn generate(&self, request: &NarrativeRequest) -> Result<Vec<RawEvent>, NarrativeError>;
}

/// Pull the JSON object out of a model response that may be wrapped in
/// markdown fences or surrounding prose.
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// A source that replays a fixed script. Useful for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    events: Vec<RawEvent>,
}

impl ScriptedSource {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl NarrativeSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, _request: &NarrativeRequest) -> Result<Vec<RawEvent>, NarrativeError> {
        Ok(self.events.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_strips_fences() {
        let wrapped = "```json\n{\"events\": []}\n```";
        assert_eq!(extract_json(wrapped), "{\"events\": []}");
    }

    #[test]
    fn test_extract_json_strips_prose() {
        let wrapped = "Here is your match: {\"events\": [{\"minute\": 1}]} Enjoy!";
        assert_eq!(extract_json(wrapped), "{\"events\": [{\"minute\": 1}]}");
    }

    #[test]
    fn test_extract_json_without_object() {
        assert_eq!(extract_json("  no json here "), "no json here");
    }

    #[test]
    fn test_raw_event_accepts_type_alias() {
        let event: RawEvent = serde_json::from_str(
            r#"{"minute": 15, "type": "goal", "team": "ENG", "player": "Kane", "description": "GOAL!"}"#,
        )
        .unwrap();
        assert_eq!(event, RawEvent::new(15, "goal", "ENG", Some("Kane"), "GOAL!"));
    }

    #[test]
    fn test_raw_event_lenient_minutes() {
        let parse = |m: &str| -> i64 {
            let json = format!(r#"{{"minute": {m}, "type": "commentary"}}"#);
            serde_json::from_str::<RawEvent>(&json).unwrap().minute
        };
        assert_eq!(parse("12"), 12);
        assert_eq!(parse("33.0"), 33);
        assert_eq!(parse("\"70\""), 70);
        assert_eq!(parse("\"45+2\""), 47);
        assert_eq!(parse("\"90+4'\""), 94);
    }

    #[test]
    fn test_raw_event_rejects_garbage_minute() {
        let json = r#"{"minute": "late", "type": "goal"}"#;
        assert!(serde_json::from_str::<RawEvent>(json).is_err());
    }

    #[test]
    fn test_raw_event_rejects_overflowing_minute() {
        let json = r#"{"minute": "9223372036854775807+1", "type": "goal"}"#;
        assert!(serde_json::from_str::<RawEvent>(json).is_err());

        let json = r#"{"minute": "-9223372036854775807+-5", "type": "goal"}"#;
        assert!(serde_json::from_str::<RawEvent>(json).is_err());
    }

    #[test]
    fn test_blank_player_is_none() {
        let event: RawEvent =
            serde_json::from_str(r#"{"minute": 1, "type": "commentary", "player": ""}"#).unwrap();
        assert!(event.player.is_none());
    }

    #[tokio::test]
    async fn test_scripted_source_replays() {
        let source = ScriptedSource::new(vec![RawEvent::new(3, "goal", "A", None, "x")]);
        let events = source.generate(&NarrativeRequest::default()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(source.name(), "scripted");
    }
}
