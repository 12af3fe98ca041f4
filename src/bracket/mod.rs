//! Bracket engine.
//!
//! Pure functions over a [`Tournament`] value: registration, seeding the
//! quarter-finals, advancing round by round as winners become known, and
//! resetting. Nothing here touches a store; callers persist the returned
//! tournament (with a compare-and-set on its revision).
//!
//! The engine only needs to know whether a match has a winner, which is
//! what [`FixtureResult`] exposes.

use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    Bracket, MatchRecord, Pairing, Stage, TeamId, Tournament, ValidationError,
    TOURNAMENT_CAPACITY,
};

/// Errors raised by bracket operations. No input is mutated on error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BracketError {
    #[error("Bracket needs exactly 8 teams, got {0}")]
    InvalidSeedCount(usize),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl BracketError {
    fn invalid(message: impl Into<String>) -> Self {
        BracketError::Validation(ValidationError::new(message))
    }
}

/// Seed positions paired in the quarter-finals: 1v8, 4v5, 2v7, 3v6.
///
/// With this order seeds 1 and 2 cannot meet before the final.
pub const SEED_ORDER: [(usize, usize); 4] = [(0, 7), (3, 4), (1, 6), (2, 5)];

/// The part of a played match the bracket cares about.
pub trait FixtureResult {
    fn stage(&self) -> Stage;
    fn home(&self) -> &TeamId;
    fn away(&self) -> &TeamId;
    fn winner(&self) -> Option<&TeamId>;
}

impl FixtureResult for MatchRecord {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn home(&self) -> &TeamId {
        &self.home_team
    }

    fn away(&self) -> &TeamId {
        &self.away_team
    }

    /// Only a finished match counts; a level score awaiting penalties is pending.
    fn winner(&self) -> Option<&TeamId> {
        if self.is_final() {
            self.winner.as_ref()
        } else {
            None
        }
    }
}

/// What `advance_round` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Nothing is being played (registration or completed)
    Idle,

    /// The active round still has fixtures without a winner
    Pending { stage: Stage, remaining: usize },

    /// The round is complete and the stage moved one step
    Advanced {
        from: Stage,
        to: Stage,
        new_pairings: Vec<Pairing>,
    },
}

/// Result of [`advance_round`]: the (possibly unchanged) tournament.
#[derive(Debug, Clone)]
pub struct Advancement {
    pub tournament: Tournament,
    pub outcome: AdvanceOutcome,
}

impl Advancement {
    pub fn advanced(&self) -> bool {
        matches!(self.outcome, AdvanceOutcome::Advanced { .. })
    }
}

/// Check a team list: exactly eight distinct, non-blank ids.
fn validate_entrants(teams: &[TeamId]) -> Result<(), BracketError> {
    if teams.len() != TOURNAMENT_CAPACITY {
        return Err(BracketError::InvalidSeedCount(teams.len()));
    }
    for (i, team) in teams.iter().enumerate() {
        if team.is_empty() {
            return Err(BracketError::invalid(format!("seed {} has a blank id", i + 1)));
        }
        if teams[..i].contains(team) {
            return Err(BracketError::invalid(format!("team {team} is seeded twice")));
        }
    }
    Ok(())
}

/// Pair eight teams into quarter-finals using [`SEED_ORDER`].
pub fn seed(teams: &[TeamId]) -> Result<Vec<Pairing>, BracketError> {
    validate_entrants(teams)?;

    Ok(SEED_ORDER
        .iter()
        .enumerate()
        .map(|(slot, &(home, away))| {
            Pairing::new(
                Stage::QuarterFinals,
                slot,
                teams[home].clone(),
                teams[away].clone(),
            )
        })
        .collect())
}

/// Append a team to the qualified list.
pub fn register(tournament: &Tournament, team: &TeamId) -> Result<Tournament, BracketError> {
    if tournament.stage != Stage::Registration {
        return Err(BracketError::invalid(format!(
            "registration is closed ({})",
            tournament.stage
        )));
    }
    if team.is_empty() {
        return Err(BracketError::invalid("team id must not be blank"));
    }
    if tournament.is_qualified(team) {
        return Err(BracketError::invalid(format!(
            "team {team} is already registered"
        )));
    }
    if tournament.is_full() {
        return Err(BracketError::invalid(format!(
            "tournament already has {TOURNAMENT_CAPACITY} teams"
        )));
    }

    let mut next = tournament.clone();
    next.teams_qualified.push(team.clone());
    debug!(
        "Registered {} ({}/{})",
        team,
        next.teams_qualified.len(),
        TOURNAMENT_CAPACITY
    );
    Ok(next)
}

/// Take a team off the qualified list while registration is open.
pub fn withdraw(tournament: &Tournament, team: &TeamId) -> Result<Tournament, BracketError> {
    if tournament.stage != Stage::Registration {
        return Err(BracketError::invalid(format!(
            "team {team} is playing in {} ({})",
            tournament.name, tournament.stage
        )));
    }

    let mut next = tournament.clone();
    next.teams_qualified.retain(|t| t != team);
    Ok(next)
}

/// Seed the bracket and open the quarter-finals.
pub fn start(tournament: &Tournament) -> Result<Tournament, BracketError> {
    if tournament.stage != Stage::Registration {
        return Err(BracketError::invalid(format!(
            "tournament already started ({})",
            tournament.stage
        )));
    }

    let quarter_finals = seed(&tournament.teams_qualified)?;

    let mut next = tournament.clone();
    next.bracket = Bracket {
        quarter_finals,
        ..Bracket::default()
    };
    next.champion = None;
    next.stage = Stage::QuarterFinals;
    info!("Tournament {} seeded, quarter-finals open", tournament.name);
    Ok(next)
}

/// Winner of every pairing in the active round, in bracket order, or the
/// number of pairings still undecided.
fn round_winners<R: FixtureResult>(
    pairings: &[&Pairing],
    stage: Stage,
    results: &[R],
) -> Result<Result<Vec<TeamId>, usize>, BracketError> {
    let in_stage: Vec<&R> = results.iter().filter(|r| r.stage() == stage).collect();

    // Every result of the active stage must belong to one of its pairings.
    for result in &in_stage {
        let pairing = pairings
            .iter()
            .find(|p| p.same_teams(result.home(), result.away()))
            .ok_or_else(|| {
                BracketError::invalid(format!(
                    "{} match {} vs {} is not in the bracket",
                    stage,
                    result.home(),
                    result.away()
                ))
            })?;
        if let Some(winner) = result.winner() {
            if !pairing.involves(winner) {
                return Err(BracketError::invalid(format!(
                    "winner {} did not play in {}",
                    winner,
                    pairing.label()
                )));
            }
        }
    }

    let mut winners = Vec::with_capacity(pairings.len());
    let mut remaining = 0;

    for pairing in pairings {
        let mut decided: Option<&TeamId> = None;
        for result in in_stage
            .iter()
            .filter(|r| pairing.same_teams(r.home(), r.away()))
        {
            if let Some(winner) = result.winner() {
                match decided {
                    Some(previous) if previous != winner => {
                        return Err(BracketError::invalid(format!(
                            "conflicting winners for {}: {} and {}",
                            pairing.label(),
                            previous,
                            winner
                        )));
                    }
                    _ => decided = Some(winner),
                }
            }
        }

        match decided {
            Some(winner) => winners.push(winner.clone()),
            None => remaining += 1,
        }
    }

    if remaining > 0 {
        Ok(Err(remaining))
    } else {
        Ok(Ok(winners))
    }
}

/// Advance the tournament one stage if every fixture of the active stage
/// has a winner; otherwise return it unchanged.
///
/// Results from other stages are ignored, so calling this repeatedly with
/// the same inputs is harmless.
pub fn advance_round<R: FixtureResult>(
    tournament: &Tournament,
    results: &[R],
) -> Result<Advancement, BracketError> {
    let stage = tournament.stage;
    if !stage.is_playing_round() {
        return Ok(Advancement {
            tournament: tournament.clone(),
            outcome: AdvanceOutcome::Idle,
        });
    }

    let pairings = tournament.bracket.pairings(stage);
    if pairings.len() != stage.fixture_count() {
        return Err(BracketError::invalid(format!(
            "{} has {} pairings, expected {}",
            stage,
            pairings.len(),
            stage.fixture_count()
        )));
    }

    let winners = match round_winners(&pairings, stage, results)? {
        Ok(winners) => winners,
        Err(remaining) => {
            debug!("{} still has {} undecided fixtures", stage, remaining);
            return Ok(Advancement {
                tournament: tournament.clone(),
                outcome: AdvanceOutcome::Pending { stage, remaining },
            });
        }
    };

    let mut next = tournament.clone();
    let mut new_pairings = Vec::new();

    let to = match stage {
        Stage::QuarterFinals => {
            for slot in 0..2 {
                let pairing = Pairing::new(
                    Stage::SemiFinals,
                    slot,
                    winners[slot * 2].clone(),
                    winners[slot * 2 + 1].clone(),
                );
                next.bracket.semi_finals[slot] = Some(pairing.clone());
                new_pairings.push(pairing);
            }
            Stage::SemiFinals
        }
        Stage::SemiFinals => {
            let pairing = Pairing::new(Stage::Final, 0, winners[0].clone(), winners[1].clone());
            next.bracket.final_pairing = Some(pairing.clone());
            new_pairings.push(pairing);
            Stage::Final
        }
        Stage::Final => {
            let champion = winners[0].clone();
            info!("Tournament {} won by {}", tournament.name, champion);
            next.bracket.champion = Some(champion.clone());
            next.champion = Some(champion);
            Stage::Completed
        }
        Stage::Registration | Stage::Completed => unreachable!("not a playing round"),
    };
    next.stage = to;

    info!("Tournament {} advanced {} -> {}", tournament.name, stage, to);

    Ok(Advancement {
        tournament: next,
        outcome: AdvanceOutcome::Advanced {
            from: stage,
            to,
            new_pairings,
        },
    })
}

/// Clear the bracket and reopen registration. Qualified teams are kept.
pub fn reset(tournament: &Tournament) -> Tournament {
    let mut next = tournament.clone();
    next.bracket = Bracket::default();
    next.champion = None;
    next.stage = Stage::Registration;
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchStatus, Score, TournamentId};
    use pretty_assertions::assert_eq;

    fn teams() -> Vec<TeamId> {
        (1..=8).map(|i| TeamId::from(format!("T{i}"))).collect()
    }

    fn t(name: &str) -> TeamId {
        TeamId::from(name)
    }

    fn started() -> Tournament {
        let mut tournament = Tournament::new("Cup").with_id(TournamentId::from("cup"));
        tournament.teams_qualified = teams();
        start(&tournament).unwrap()
    }

    fn finished(pairing: &Pairing, winner: &str, score: Score) -> MatchRecord {
        let mut record = MatchRecord::for_pairing(TournamentId::from("cup"), pairing);
        record.score = score;
        record.winner = Some(t(winner));
        record.status = MatchStatus::Final;
        record
    }

    fn pairs(pairings: &[Pairing]) -> Vec<(String, String)> {
        pairings
            .iter()
            .map(|p| (p.home.to_string(), p.away.to_string()))
            .collect()
    }

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_seed_pattern() {
        let pairings = seed(&teams()).unwrap();
        assert_eq!(
            pairs(&pairings),
            vec![
                pair("T1", "T8"),
                pair("T4", "T5"),
                pair("T2", "T7"),
                pair("T3", "T6"),
            ]
        );
        assert!(pairings.iter().enumerate().all(|(i, p)| p.slot == i));
        assert!(pairings.iter().all(|p| p.stage == Stage::QuarterFinals));
    }

    #[test]
    fn test_seed_covers_each_team_once() {
        let pairings = seed(&teams()).unwrap();
        for team in teams() {
            assert_eq!(pairings.iter().filter(|p| p.involves(&team)).count(), 1);
        }
    }

    #[test]
    fn test_seed_wrong_count() {
        assert_eq!(seed(&teams()[..7]), Err(BracketError::InvalidSeedCount(7)));
        let mut nine = teams();
        nine.push(t("T9"));
        assert_eq!(seed(&nine), Err(BracketError::InvalidSeedCount(9)));
    }

    #[test]
    fn test_seed_duplicates_rejected() {
        let mut dup = teams();
        dup[7] = t("T1");
        assert!(matches!(seed(&dup), Err(BracketError::Validation(_))));
    }

    #[test]
    fn test_register_rules() {
        let mut tournament = Tournament::new("Cup");
        for team in teams() {
            tournament = register(&tournament, &team).unwrap();
        }
        assert_eq!(tournament.teams_qualified, teams());

        // ninth team
        assert!(register(&tournament, &t("T9")).is_err());

        // duplicate
        let partial = Tournament::new("Cup");
        let partial = register(&partial, &t("T1")).unwrap();
        assert!(register(&partial, &t("T1")).is_err());
        assert_eq!(partial.teams_qualified.len(), 1);
    }

    #[test]
    fn test_withdraw_only_during_registration() {
        let mut tournament = Tournament::new("Cup");
        for team in &teams()[..3] {
            tournament = register(&tournament, team).unwrap();
        }
        let withdrawn = withdraw(&tournament, &t("T2")).unwrap();
        assert_eq!(withdrawn.teams_qualified, vec![t("T1"), t("T3")]);

        assert!(withdraw(&started(), &t("T1")).is_err());
    }

    #[test]
    fn test_register_closed_after_start() {
        let tournament = started();
        assert!(register(&tournament, &t("T9")).is_err());
    }

    #[test]
    fn test_start_requires_eight() {
        let mut tournament = Tournament::new("Cup");
        tournament.teams_qualified = teams()[..5].to_vec();
        assert_eq!(start(&tournament).unwrap_err(), BracketError::InvalidSeedCount(5));
        assert_eq!(tournament.stage, Stage::Registration);
    }

    #[test]
    fn test_start_twice_fails() {
        let tournament = started();
        assert_eq!(tournament.stage, Stage::QuarterFinals);
        assert!(start(&tournament).is_err());
    }

    #[test]
    fn test_advance_pending_until_all_decided() {
        let tournament = started();
        let qf = tournament.bracket.quarter_finals.clone();
        let results = vec![
            finished(&qf[0], "T1", Score::new(2, 0)),
            finished(&qf[1], "T4", Score::new(1, 0)),
        ];

        let advancement = advance_round(&tournament, &results).unwrap();
        assert_eq!(
            advancement.outcome,
            AdvanceOutcome::Pending {
                stage: Stage::QuarterFinals,
                remaining: 2
            }
        );
        assert_eq!(advancement.tournament, tournament);
    }

    #[test]
    fn test_level_match_without_winner_is_pending() {
        let tournament = started();
        let qf = tournament.bracket.quarter_finals.clone();
        let mut level = MatchRecord::for_pairing(TournamentId::from("cup"), &qf[3]);
        level.score = Score::new(1, 1);
        level.status = MatchStatus::PenaltyShootout;

        let results = vec![
            finished(&qf[0], "T1", Score::new(2, 0)),
            finished(&qf[1], "T4", Score::new(1, 0)),
            finished(&qf[2], "T2", Score::new(3, 1)),
            level,
        ];

        let advancement = advance_round(&tournament, &results).unwrap();
        assert!(!advancement.advanced());
        assert_eq!(advancement.tournament.stage, Stage::QuarterFinals);
    }

    #[test]
    fn test_quarter_final_scenario() {
        let tournament = started();
        let qf = tournament.bracket.quarter_finals.clone();

        let mut shootout = finished(&qf[3], "T6", Score::new(1, 1));
        shootout.penalty_score = Some(Score::new(3, 4));

        let results = vec![
            finished(&qf[0], "T1", Score::new(2, 0)),
            finished(&qf[1], "T4", Score::new(1, 0)),
            finished(&qf[2], "T2", Score::new(3, 1)),
            shootout,
        ];

        let advancement = advance_round(&tournament, &results).unwrap();
        let next = advancement.tournament;
        assert_eq!(next.stage, Stage::SemiFinals);

        let semis: Vec<Pairing> = next.bracket.semi_finals.iter().flatten().cloned().collect();
        assert_eq!(pairs(&semis), vec![pair("T1", "T4"), pair("T2", "T6")]);
        assert!(next.bracket.final_pairing.is_none());
    }

    #[test]
    fn test_advance_is_idempotent() {
        let tournament = started();
        let qf = tournament.bracket.quarter_finals.clone();
        let results: Vec<MatchRecord> = qf
            .iter()
            .map(|p| finished(p, p.home.as_str(), Score::new(1, 0)))
            .collect();

        let once = advance_round(&tournament, &results).unwrap().tournament;
        let twice = advance_round(&once, &results).unwrap();

        assert!(!twice.advanced());
        assert_eq!(twice.tournament, once);
    }

    #[test]
    fn test_full_run_to_champion() {
        let mut tournament = started();

        for _ in 0..3 {
            let stage = tournament.stage;
            let results: Vec<MatchRecord> = tournament
                .bracket
                .pairings(stage)
                .into_iter()
                .map(|p| finished(p, p.away.as_str(), Score::new(0, 1)))
                .collect();
            tournament = advance_round(&tournament, &results).unwrap().tournament;
        }

        assert_eq!(tournament.stage, Stage::Completed);
        // Away sides win every round: T8 beats T1, T5 beats T4 -> T5 beats T8;
        // T7, T6 -> T6; final T5 v T6 -> T6.
        assert_eq!(tournament.champion, Some(t("T6")));
        assert_eq!(tournament.bracket.champion, Some(t("T6")));

        let after = advance_round::<MatchRecord>(&tournament, &[]).unwrap();
        assert_eq!(after.outcome, AdvanceOutcome::Idle);
    }

    #[test]
    fn test_unknown_fixture_rejected() {
        let tournament = started();
        let stray = Pairing::new(Stage::QuarterFinals, 0, t("T1"), t("T2"));
        let results = vec![finished(&stray, "T1", Score::new(1, 0))];

        let err = advance_round(&tournament, &results).unwrap_err();
        assert!(matches!(err, BracketError::Validation(_)));
    }

    #[test]
    fn test_other_stage_results_ignored() {
        let tournament = started();
        let stray = Pairing::new(Stage::SemiFinals, 0, t("T1"), t("T2"));
        let results = vec![finished(&stray, "T1", Score::new(1, 0))];

        let advancement = advance_round(&tournament, &results).unwrap();
        assert!(!advancement.advanced());
    }

    #[test]
    fn test_conflicting_results_rejected() {
        let tournament = started();
        let qf = tournament.bracket.quarter_finals.clone();
        let results = vec![
            finished(&qf[0], "T1", Score::new(1, 0)),
            finished(&qf[0], "T8", Score::new(0, 1)),
        ];
        assert!(advance_round(&tournament, &results).is_err());
    }

    #[test]
    fn test_reset_keeps_teams() {
        let tournament = started();
        let cleared = reset(&tournament);

        assert_eq!(cleared.stage, Stage::Registration);
        assert_eq!(cleared.bracket, Bracket::default());
        assert!(cleared.champion.is_none());
        assert_eq!(cleared.teams_qualified, teams());
        assert_eq!(reset(&cleared), cleared);
    }

    #[test]
    fn test_reset_then_reseed() {
        let cleared = reset(&started());
        let reseeded = start(&cleared).unwrap();
        assert_eq!(reseeded.bracket.quarter_finals, started().bracket.quarter_finals);
    }

    #[test]
    fn test_unfinished_record_has_no_bracket_winner() {
        let tournament = started();
        let mut record =
            MatchRecord::for_pairing(TournamentId::from("cup"), &tournament.bracket.quarter_finals[0]);
        record.winner = Some(t("T1"));
        record.status = MatchStatus::RegulationComplete;
        assert!(FixtureResult::winner(&record).is_none());
    }
}
