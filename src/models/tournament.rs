//! Tournament lifecycle model and the bracket it carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Pairing, TeamId, TournamentId, ValidationError};

/// Number of teams a tournament admits.
pub const TOURNAMENT_CAPACITY: usize = 8;

/// Tournament stage.
///
/// Stages only move forward one step at a time; an explicit reset is the
/// only way back to `Registration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "Registration")]
    Registration,
    #[serde(rename = "Quarter Finals")]
    QuarterFinals,
    #[serde(rename = "Semi Finals")]
    SemiFinals,
    #[serde(rename = "Final")]
    Final,
    #[serde(rename = "Completed")]
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Registration => "Registration",
            Stage::QuarterFinals => "Quarter Finals",
            Stage::SemiFinals => "Semi Finals",
            Stage::Final => "Final",
            Stage::Completed => "Completed",
        }
    }

    pub fn short_code(&self) -> &'static str {
        match self {
            Stage::Registration => "REG",
            Stage::QuarterFinals => "QF",
            Stage::SemiFinals => "SF",
            Stage::Final => "F",
            Stage::Completed => "END",
        }
    }

    /// The following stage, or `None` once completed.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Registration => Some(Stage::QuarterFinals),
            Stage::QuarterFinals => Some(Stage::SemiFinals),
            Stage::SemiFinals => Some(Stage::Final),
            Stage::Final => Some(Stage::Completed),
            Stage::Completed => None,
        }
    }

    /// Number of fixtures played in this stage.
    pub fn fixture_count(&self) -> usize {
        match self {
            Stage::QuarterFinals => 4,
            Stage::SemiFinals => 2,
            Stage::Final => 1,
            Stage::Registration | Stage::Completed => 0,
        }
    }

    pub fn is_playing_round(&self) -> bool {
        self.fixture_count() > 0
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "registration" | "reg" => Ok(Stage::Registration),
            "quarterfinals" | "quarterfinal" | "qf" => Ok(Stage::QuarterFinals),
            "semifinals" | "semifinal" | "sf" => Ok(Stage::SemiFinals),
            "final" | "f" => Ok(Stage::Final),
            "completed" | "complete" | "end" => Ok(Stage::Completed),
            _ => Err(ValidationError::new(format!("unknown stage: {s}"))),
        }
    }
}

/// Round-by-round pairings of the knockout bracket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub quarter_finals: Vec<Pairing>,

    /// Unresolved until both feeding quarter-finals have a winner
    pub semi_finals: [Option<Pairing>; 2],

    /// Unresolved until both semi-finals have a winner
    pub final_pairing: Option<Pairing>,

    pub champion: Option<TeamId>,
}

impl Bracket {
    pub fn is_seeded(&self) -> bool {
        !self.quarter_finals.is_empty()
    }

    /// Resolved pairings of a stage, in bracket order.
    pub fn pairings(&self, stage: Stage) -> Vec<&Pairing> {
        match stage {
            Stage::QuarterFinals => self.quarter_finals.iter().collect(),
            Stage::SemiFinals => self.semi_finals.iter().flatten().collect(),
            Stage::Final => self.final_pairing.iter().collect(),
            Stage::Registration | Stage::Completed => Vec::new(),
        }
    }

    /// Display text for a slot whose teams are not known yet.
    pub fn placeholder(stage: Stage, slot: usize) -> String {
        match stage {
            Stage::SemiFinals => format!(
                "Winner of QF{} vs Winner of QF{}",
                slot * 2 + 1,
                slot * 2 + 2
            ),
            Stage::Final => "Winner of SF1 vs Winner of SF2".to_string(),
            _ => "TBD".to_string(),
        }
    }
}

/// A knockout tournament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,

    pub name: String,

    pub stage: Stage,

    /// Registered teams in seeding order
    pub teams_qualified: Vec<TeamId>,

    pub bracket: Bracket,

    /// Set only once the stage is `Completed`
    pub champion: Option<TeamId>,

    /// Bumped by every successful compare-and-set write
    #[serde(default)]
    pub revision: u64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Tournament {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TournamentId::random(),
            name: name.into(),
            stage: Stage::Registration,
            teams_qualified: Vec::new(),
            bracket: Bracket::default(),
            champion: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: TournamentId) -> Self {
        self.id = id;
        self
    }

    pub fn is_full(&self) -> bool {
        self.teams_qualified.len() >= TOURNAMENT_CAPACITY
    }

    pub fn registration_open(&self) -> bool {
        self.stage == Stage::Registration && !self.is_full()
    }

    pub fn is_qualified(&self, team: &TeamId) -> bool {
        self.teams_qualified.contains(team)
    }
}
