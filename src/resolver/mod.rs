//! Match resolution: regulation time and the penalty shootout.
//!
//! The resolver is pure computation over an RNG and an optional narrative
//! source. Pacing, persistence and cancellation belong to the tournament
//! service, which reveals the produced events one at a time.

pub mod fallback;
pub mod regulation;
pub mod shootout;

use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::models::{
    CommentaryEvent, PlayerId, ResultSource, Score, Side, Team, TeamId,
};
use crate::narrative::{NarrativeRequest, NarrativeSource};

/// One side of a fixture as the resolver sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSide {
    pub team_id: TeamId,
    pub label: String,
    /// (player id, name) in squad order
    pub roster: Vec<(PlayerId, String)>,
}

impl MatchSide {
    pub fn new(team_id: TeamId, label: impl Into<String>) -> Self {
        Self {
            team_id,
            label: label.into(),
            roster: Vec::new(),
        }
    }

    pub fn from_team(team: &Team) -> Self {
        Self {
            team_id: team.id.clone(),
            label: team.label.clone(),
            roster: team
                .players
                .iter()
                .filter(|p| !p.name.trim().is_empty())
                .map(|p| (p.id.clone(), p.name.clone()))
                .collect(),
        }
    }

    pub fn with_player(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.roster
            .push((PlayerId::generate(&[self.team_id.as_str(), &name]), name));
        self
    }

    /// First `limit` roster names.
    pub fn roster_names(&self, limit: usize) -> Vec<String> {
        self.roster
            .iter()
            .take(limit)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Roster lookup, case-insensitive on the trimmed name.
    pub fn find_player(&self, name: &str) -> Option<&(PlayerId, String)> {
        let wanted = name.trim();
        self.roster
            .iter()
            .find(|(_, n)| n.trim().eq_ignore_ascii_case(wanted))
    }

    /// Whether a narrative team reference names this side.
    pub fn answers_to(&self, reference: &str) -> bool {
        let reference = reference.trim();
        !reference.is_empty()
            && (reference == self.team_id.as_str() || reference.eq_ignore_ascii_case(&self.label))
    }
}

/// A goal attributed to a rostered player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalCredit {
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub minute: u32,
}

/// Regulation-time result. `score` always equals the goal events.
#[derive(Debug, Clone, PartialEq)]
pub struct RegulationOutcome {
    pub events: Vec<CommentaryEvent>,
    pub score: Score,
    pub source: ResultSource,
    pub goal_credits: Vec<GoalCredit>,
}

/// Penalty shootout result.
#[derive(Debug, Clone, PartialEq)]
pub struct ShootoutOutcome {
    pub tally: Score,
    pub winner: Side,
    pub commentary: Vec<CommentaryEvent>,
    /// Rounds taken, sudden death included
    pub rounds: u32,
    /// Settled by coin flip after the sudden-death cap
    pub forced: bool,
}

/// Complete match result.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub regulation: RegulationOutcome,
    pub shootout: Option<ShootoutOutcome>,
    pub winner: Side,
}

impl MatchOutcome {
    pub fn penalty_score(&self) -> Option<Score> {
        self.shootout.as_ref().map(|s| s.tally)
    }

    /// Regulation events followed by shootout commentary.
    pub fn all_commentary(&self) -> Vec<CommentaryEvent> {
        let mut events = self.regulation.events.clone();
        if let Some(shootout) = &self.shootout {
            events.extend(shootout.commentary.iter().cloned());
        }
        events
    }
}

/// Produces match outcomes from a narrative source with local fallback.
#[derive(Clone)]
pub struct MatchResolver {
    narrative: Option<Arc<dyn NarrativeSource>>,
    settings: SimulationConfig,
}

impl MatchResolver {
    pub fn new(settings: SimulationConfig) -> Self {
        Self {
            narrative: None,
            settings,
        }
    }

    pub fn with_narrative(mut self, source: Arc<dyn NarrativeSource>) -> Self {
        self.narrative = Some(source);
        self
    }

    pub fn settings(&self) -> &SimulationConfig {
        &self.settings
    }

    /// Regulation time. Narrative failures are absorbed and the local
    /// generator is used instead; this never fails.
    pub async fn play_regulation<R: Rng + Send>(
        &self,
        home: &MatchSide,
        away: &MatchSide,
        rng: &mut R,
    ) -> RegulationOutcome {
        if let Some(source) = &self.narrative {
            let request = NarrativeRequest {
                home_name: home.label.clone(),
                away_name: away.label.clone(),
                home_roster: home.roster_names(self.settings.roster_limit),
                away_roster: away.roster_names(self.settings.roster_limit),
            };

            match source.generate(&request).await {
                Ok(raw) => {
                    return regulation::build(raw, home, away, ResultSource::Narrative);
                }
                Err(e) => {
                    warn!(
                        "Narrative source {} failed for {} vs {}: {}; using fallback",
                        source.name(),
                        home.label,
                        away.label,
                        e
                    );
                }
            }
        }

        let raw = fallback::generate(home, away, self.settings.max_goals_per_team, rng);
        regulation::build(raw, home, away, ResultSource::Fallback)
    }

    /// Penalty shootout between two sides.
    pub fn shootout<R: Rng>(&self, home: &MatchSide, away: &MatchSide, rng: &mut R) -> ShootoutOutcome {
        shootout::run(home, away, &self.settings, rng)
    }

    /// Regulation plus a shootout when level.
    pub async fn resolve<R: Rng + Send>(
        &self,
        home: &MatchSide,
        away: &MatchSide,
        rng: &mut R,
    ) -> MatchOutcome {
        let regulation = self.play_regulation(home, away, rng).await;

        let (shootout, winner) = match regulation.score.leader() {
            Some(side) => (None, side),
            None => {
                let outcome = self.shootout(home, away, rng);
                let winner = outcome.winner;
                (Some(outcome), winner)
            }
        };

        info!(
            "{} {} {} ({:?}){}",
            home.label,
            regulation.score,
            away.label,
            regulation.source,
            shootout
                .as_ref()
                .map(|s| format!(", {} on penalties", s.tally))
                .unwrap_or_default()
        );

        MatchOutcome {
            regulation,
            shootout,
            winner,
        }
    }
}
