//! Commentary events emitted while a match is played.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TeamId;

/// Last minute of regulation time.
pub const REGULATION_MINUTES: u32 = 90;

/// First minute used by the penalty shootout.
pub const SHOOTOUT_FIRST_MINUTE: u32 = REGULATION_MINUTES + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Goal,
    Card,
    Substitution,
    Narrative,
}

impl EventKind {
    /// Map a free-form kind tag (as written by a narrative source).
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "goal" => EventKind::Goal,
            "card" | "yellow_card" | "red_card" | "booking" => EventKind::Card,
            "substitution" | "sub" => EventKind::Substitution,
            _ => EventKind::Narrative,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Goal => "goal",
            EventKind::Card => "card",
            EventKind::Substitution => "substitution",
            EventKind::Narrative => "narrative",
        };
        f.write_str(s)
    }
}

/// One line of match commentary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentaryEvent {
    pub minute: u32,

    pub kind: EventKind,

    pub description: String,

    /// Team credited with the action (scoring team for goals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,

    /// Player named in the action (scorer for goals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
}

impl CommentaryEvent {
    pub fn narrative(minute: u32, description: impl Into<String>) -> Self {
        Self {
            minute,
            kind: EventKind::Narrative,
            description: description.into(),
            team: None,
            player: None,
        }
    }

    pub fn goal(
        minute: u32,
        team: TeamId,
        player: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            minute,
            kind: EventKind::Goal,
            description: description.into(),
            team: Some(team),
            player,
        }
    }

    pub fn with_team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }

    pub fn is_goal_for(&self, team: &TeamId) -> bool {
        self.kind == EventKind::Goal && self.team.as_ref() == Some(team)
    }
}

impl fmt::Display for CommentaryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3}' {}", self.minute, self.description)
    }
}

/// Returns true if minutes never decrease along the sequence.
pub fn is_chronological(events: &[CommentaryEvent]) -> bool {
    events.windows(2).all(|w| w[0].minute <= w[1].minute)
}
