//! Pairing model: two teams drawn against each other in a knockout round.

use serde::{Deserialize, Serialize};

use super::{MatchId, Stage, TeamId, TournamentId};

/// A fixture slot in the bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    /// Round this pairing belongs to
    pub stage: Stage,

    /// Position within the round (0-based, bracket order)
    pub slot: usize,

    pub home: TeamId,

    pub away: TeamId,
}

impl Pairing {
    pub fn new(stage: Stage, slot: usize, home: TeamId, away: TeamId) -> Self {
        Self {
            stage,
            slot,
            home,
            away,
        }
    }

    pub fn involves(&self, team: &TeamId) -> bool {
        &self.home == team || &self.away == team
    }

    /// Unordered comparison of the two sides.
    pub fn same_teams(&self, a: &TeamId, b: &TeamId) -> bool {
        (&self.home == a && &self.away == b) || (&self.home == b && &self.away == a)
    }

    /// The other side of the pairing, if `team` plays in it.
    pub fn opponent(&self, team: &TeamId) -> Option<&TeamId> {
        if &self.home == team {
            Some(&self.away)
        } else if &self.away == team {
            Some(&self.home)
        } else {
            None
        }
    }

    /// Deterministic match id for this pairing within a tournament.
    pub fn match_id(&self, tournament_id: &TournamentId) -> MatchId {
        MatchId::generate(&[
            tournament_id.as_str(),
            self.stage.as_str(),
            &self.slot.to_string(),
            self.home.as_str(),
            self.away.as_str(),
        ])
    }

    /// Short bracket label, e.g. "QF1" or "SF2".
    pub fn label(&self) -> String {
        format!("{}{}", self.stage.short_code(), self.slot + 1)
    }
}
