//! Match record: fixture, score, winner and commentary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{CommentaryEvent, MatchId, Pairing, Stage, TeamId, TournamentId, ValidationError};

/// Goals (or converted penalties) for each side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    pub fn is_level(&self) -> bool {
        self.home == self.away
    }

    /// The leading side, if any.
    pub fn leader(&self) -> Option<Side> {
        match self.home.cmp(&self.away) {
            std::cmp::Ordering::Greater => Some(Side::Home),
            std::cmp::Ordering::Less => Some(Side::Away),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn get(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }

    pub fn add(&mut self, side: Side) {
        match side {
            Side::Home => self.home += 1,
            Side::Away => self.away += 1,
        }
    }
}

/// Parses `"2-1"` (home first).
impl FromStr for Score {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (home, away) = s
            .split_once('-')
            .ok_or_else(|| ValidationError::new(format!("expected HOME-AWAY, got {s:?}")))?;
        let parse = |n: &str| {
            n.trim()
                .parse::<u32>()
                .map_err(|_| ValidationError::new(format!("invalid goal count in {s:?}")))
        };
        Ok(Score::new(parse(home)?, parse(away)?))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn other(&self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

/// Per-match lifecycle.
///
/// `Upcoming → Live → RegulationComplete → [PenaltyShootout] → Final`;
/// a reset returns any state to `Upcoming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Upcoming,
    Live,
    RegulationComplete,
    PenaltyShootout,
    Final,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Live => "live",
            MatchStatus::RegulationComplete => "regulation_complete",
            MatchStatus::PenaltyShootout => "penalty_shootout",
            MatchStatus::Final => "final",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Final)
    }

    /// A resolution is running (or was interrupted mid-way).
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            MatchStatus::Live | MatchStatus::RegulationComplete | MatchStatus::PenaltyShootout
        )
    }

    /// Validates a forward transition. Resets are handled by `MatchRecord::reset`.
    pub fn validate_transition(&self, next: MatchStatus) -> Result<(), ValidationError> {
        let valid = match self {
            MatchStatus::Upcoming => matches!(next, MatchStatus::Live),
            MatchStatus::Live => matches!(next, MatchStatus::RegulationComplete),
            MatchStatus::RegulationComplete => {
                matches!(next, MatchStatus::PenaltyShootout | MatchStatus::Final)
            }
            MatchStatus::PenaltyShootout => matches!(next, MatchStatus::Final),
            MatchStatus::Final => false,
        };

        if valid {
            Ok(())
        } else {
            Err(ValidationError::new(format!(
                "invalid match status transition {} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the regulation-time result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// Events produced by a narrative source
    Narrative,
    /// Locally generated random events
    Fallback,
    /// Entered by an administrator
    Manual,
}

/// A fixture between two teams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,

    pub tournament_id: TournamentId,

    pub stage: Stage,

    /// Slot within the stage (bracket order)
    pub slot: usize,

    pub home_team: TeamId,

    pub away_team: TeamId,

    /// Regulation-time score
    pub score: Score,

    /// Present only when a level match went to penalties
    pub penalty_score: Option<Score>,

    pub winner: Option<TeamId>,

    pub status: MatchStatus,

    pub simulated: bool,

    /// The shootout hit its round cap and was settled by a coin flip
    #[serde(default)]
    pub forced_shootout: bool,

    #[serde(default)]
    pub result_source: Option<ResultSource>,

    pub commentary: Vec<CommentaryEvent>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl MatchRecord {
    /// Create an upcoming match for a bracket pairing.
    pub fn for_pairing(tournament_id: TournamentId, pairing: &Pairing) -> Self {
        let now = Utc::now();
        Self {
            id: pairing.match_id(&tournament_id),
            tournament_id,
            stage: pairing.stage,
            slot: pairing.slot,
            home_team: pairing.home.clone(),
            away_team: pairing.away.clone(),
            score: Score::default(),
            penalty_score: None,
            winner: None,
            status: MatchStatus::Upcoming,
            simulated: false,
            forced_shootout: false,
            result_source: None,
            commentary: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_final(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn team(&self, side: Side) -> &TeamId {
        match side {
            Side::Home => &self.home_team,
            Side::Away => &self.away_team,
        }
    }

    pub fn side_of(&self, team: &TeamId) -> Option<Side> {
        if team == &self.home_team {
            Some(Side::Home)
        } else if team == &self.away_team {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn loser(&self) -> Option<&TeamId> {
        let winner = self.winner.as_ref()?;
        self.side_of(winner).map(|side| self.team(side.other()))
    }

    /// Move to the next lifecycle state.
    pub fn advance_status(&mut self, next: MatchStatus) -> Result<(), ValidationError> {
        self.status.validate_transition(next)?;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the winner. Must be one of the two sides.
    pub fn set_winner(&mut self, team: &TeamId) -> Result<(), ValidationError> {
        if self.side_of(team).is_none() {
            return Err(ValidationError::new(format!(
                "{} is not playing in match {}",
                team, self.id
            )));
        }
        self.winner = Some(team.clone());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Back to the upcoming state: no score, no winner, no commentary.
    pub fn reset(&mut self) {
        self.score = Score::default();
        self.penalty_score = None;
        self.winner = None;
        self.status = MatchStatus::Upcoming;
        self.simulated = false;
        self.forced_shootout = false;
        self.result_source = None;
        self.commentary.clear();
        self.updated_at = Utc::now();
    }

    pub fn push_commentary(&mut self, event: CommentaryEvent) {
        self.commentary.push(event);
        self.updated_at = Utc::now();
    }

    /// Check internal consistency of a stored record.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.home_team == self.away_team {
            return Err(ValidationError::new(format!(
                "match {} pairs {} with itself",
                self.id, self.home_team
            )));
        }
        if let Some(winner) = &self.winner {
            if self.side_of(winner).is_none() {
                return Err(ValidationError::new(format!(
                    "match {} winner {} is not a participant",
                    self.id, winner
                )));
            }
        }
        if let Some(penalties) = &self.penalty_score {
            if !self.score.is_level() {
                return Err(ValidationError::new(format!(
                    "match {} has penalties after a decisive {} score",
                    self.id, self.score
                )));
            }
            if penalties.is_level() {
                return Err(ValidationError::new(format!(
                    "match {} has a level penalty score {}",
                    self.id, penalties
                )));
            }
        }
        if self.status.is_terminal() && self.winner.is_none() {
            return Err(ValidationError::new(format!(
                "match {} is final without a winner",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MatchRecord {
        let pairing = Pairing::new(
            Stage::QuarterFinals,
            0,
            TeamId::from("ENG"),
            TeamId::from("BRA"),
        );
        MatchRecord::for_pairing(TournamentId::from("cup"), &pairing)
    }

    #[test]
    fn test_new_match_is_upcoming() {
        let m = record();
        assert_eq!(m.status, MatchStatus::Upcoming);
        assert_eq!(m.score, Score::default());
        assert!(m.winner.is_none());
        assert!(m.commentary.is_empty());
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_winner_must_be_participant() {
        let mut m = record();
        assert!(m.set_winner(&TeamId::from("ARG")).is_err());
        assert!(m.winner.is_none());

        m.set_winner(&TeamId::from("BRA")).unwrap();
        assert_eq!(m.loser(), Some(&TeamId::from("ENG")));
    }

    #[test]
    fn test_status_transitions() {
        let mut m = record();
        assert!(m.advance_status(MatchStatus::Final).is_err());
        m.advance_status(MatchStatus::Live).unwrap();
        m.advance_status(MatchStatus::RegulationComplete).unwrap();
        m.advance_status(MatchStatus::PenaltyShootout).unwrap();
        m.advance_status(MatchStatus::Final).unwrap();
        assert!(m.advance_status(MatchStatus::Live).is_err());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut m = record();
        m.score = Score::new(1, 1);
        m.penalty_score = Some(Score::new(4, 3));
        m.winner = Some(TeamId::from("ENG"));
        m.status = MatchStatus::Final;
        m.push_commentary(CommentaryEvent::narrative(1, "Kick-off"));

        m.reset();

        assert_eq!(m.status, MatchStatus::Upcoming);
        assert_eq!(m.score, Score::default());
        assert!(m.penalty_score.is_none());
        assert!(m.winner.is_none());
        assert!(m.commentary.is_empty());
    }

    #[test]
    fn test_validate_penalties_only_after_draw() {
        let mut m = record();
        m.score = Score::new(2, 1);
        m.penalty_score = Some(Score::new(5, 4));
        assert!(m.validate().is_err());

        m.score = Score::new(1, 1);
        m.penalty_score = Some(Score::new(3, 3));
        assert!(m.validate().is_err());

        m.penalty_score = Some(Score::new(3, 2));
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_final_requires_winner() {
        let mut m = record();
        m.status = MatchStatus::Final;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_score_helpers() {
        let mut s = Score::default();
        assert!(s.is_level());
        s.add(Side::Away);
        assert_eq!(s.leader(), Some(Side::Away));
        assert_eq!(s.get(Side::Away), 1);
        assert_eq!(s.to_string(), "0-1");
    }

    #[test]
    fn test_score_from_str() {
        assert_eq!("2-1".parse::<Score>().unwrap(), Score::new(2, 1));
        assert_eq!(" 0 - 0 ".parse::<Score>().unwrap(), Score::new(0, 0));
        assert!("2:1".parse::<Score>().is_err());
        assert!("a-1".parse::<Score>().is_err());
        assert!("-1-2".parse::<Score>().is_err());
    }
}
