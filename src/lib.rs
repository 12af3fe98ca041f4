//! # Knockout Cup
//!
//! An eight-team football knockout competition with simulated matches,
//! generated commentary and penalty shootouts.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (teams, players, tournaments, matches)
//! - **narrative**: Narrative sources and AI chat backends
//! - **resolver**: Regulation time, random fallback and penalty shootouts
//! - **bracket**: Seeding and round-by-round advancement
//! - **storage**: Store traits with in-memory and JSONL implementations
//! - **tournament**: The service wiring everything to the stores
//! - **config**: Configuration loading and validation

pub mod bracket;
pub mod config;
pub mod models;
pub mod narrative;
pub mod resolver;
pub mod storage;
pub mod tournament;

pub use models::*;

use std::time::Duration;

/// Parse a human-friendly duration string (e.g., "500ms", "2s", "5m", "1h").
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        // Default to seconds
        (s, 1)
    };

    let num: u64 = num_str.parse().ok()?;
    Some(Duration::from_secs(num * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_millis() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_duration_default_seconds() {
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("ms"), None);
        assert_eq!(parse_duration(""), None);
    }
}
