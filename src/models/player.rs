//! Player model: positions, per-position ratings and goal tallies.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{PlayerId, TeamId, ValidationError};

/// Playing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK")]
    Goalkeeper,
    #[serde(rename = "DF")]
    Defender,
    #[serde(rename = "MD")]
    Midfielder,
    #[serde(rename = "AT")]
    Attacker,
}

impl Position {
    pub const ALL: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Attacker,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "GK",
            Position::Defender => "DF",
            Position::Midfielder => "MD",
            Position::Attacker => "AT",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Position {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GK" => Ok(Position::Goalkeeper),
            "DF" => Ok(Position::Defender),
            "MD" | "MF" => Ok(Position::Midfielder),
            "AT" | "FW" => Ok(Position::Attacker),
            other => Err(ValidationError::new(format!("unknown position: {other}"))),
        }
    }
}

/// Rating (0-100) for each of the four positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRatings {
    #[serde(rename = "GK")]
    pub goalkeeper: u8,
    #[serde(rename = "DF")]
    pub defender: u8,
    #[serde(rename = "MD")]
    pub midfielder: u8,
    #[serde(rename = "AT")]
    pub attacker: u8,
}

impl PositionRatings {
    /// Random ratings: 50..=100 in the natural position, 0..=50 elsewhere.
    pub fn generate<R: Rng>(natural: Position, rng: &mut R) -> Self {
        let mut roll = |position: Position| -> u8 {
            if position == natural {
                rng.random_range(50..=100)
            } else {
                rng.random_range(0..=50)
            }
        };

        Self {
            goalkeeper: roll(Position::Goalkeeper),
            defender: roll(Position::Defender),
            midfielder: roll(Position::Midfielder),
            attacker: roll(Position::Attacker),
        }
    }

    pub fn get(&self, position: Position) -> u8 {
        match position {
            Position::Goalkeeper => self.goalkeeper,
            Position::Defender => self.defender,
            Position::Midfielder => self.midfielder,
            Position::Attacker => self.attacker,
        }
    }

    /// Rounded mean of the four ratings.
    pub fn overall(&self) -> u8 {
        let sum: u32 = Position::ALL.iter().map(|p| u32::from(self.get(*p))).sum();
        (f64::from(sum) / 4.0).round() as u8
    }
}

/// A squad member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub team_id: TeamId,
    pub name: String,
    pub position: Position,
    pub ratings: PositionRatings,
    pub overall_rating: u8,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub is_captain: bool,
}

impl Player {
    pub fn new(
        team_id: TeamId,
        name: impl Into<String>,
        position: Position,
        ratings: PositionRatings,
    ) -> Self {
        Self {
            id: PlayerId::random(),
            team_id,
            name: name.into(),
            position,
            overall_rating: ratings.overall(),
            ratings,
            goals: 0,
            is_captain: false,
        }
    }

    pub fn with_captaincy(mut self, is_captain: bool) -> Self {
        self.is_captain = is_captain;
        self
    }

    /// Case-insensitive name comparison, ignoring surrounding whitespace.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}
