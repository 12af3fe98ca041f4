//! Penalty shootout.

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::debug;

use super::{MatchSide, ShootoutOutcome};
use crate::config::SimulationConfig;
use crate::models::{CommentaryEvent, Score, Side, SHOOTOUT_FIRST_MINUTE};

/// Run a shootout to completion. The result is never level.
///
/// Standard rounds are always taken in full, home kicking first. Sudden
/// death follows one pair at a time until a completed pair separates the
/// sides. After `max_sudden_death_rounds` a coin flip awards one extra
/// converted kick and the outcome is marked forced.
pub fn run<R: Rng>(
    home: &MatchSide,
    away: &MatchSide,
    settings: &SimulationConfig,
    rng: &mut R,
) -> ShootoutOutcome {
    let mut tally = Score::default();
    let mut commentary = vec![CommentaryEvent::narrative(
        SHOOTOUT_FIRST_MINUTE,
        "The match is level! We're going to a penalty shootout to decide the winner!",
    )];

    let mut shootout = Kicks {
        home,
        away,
        tally: &mut tally,
        commentary: &mut commentary,
    };

    for round in 1..=settings.standard_rounds {
        shootout.pair(round, "Penalty", settings.penalty_success_rate, rng);
    }

    let mut rounds = settings.standard_rounds;
    let mut sudden_death = 0;
    while shootout.tally.is_level() && sudden_death < settings.max_sudden_death_rounds {
        sudden_death += 1;
        rounds += 1;
        shootout.pair(rounds, "Sudden death", settings.sudden_death_success_rate, rng);
    }

    let (winner, forced) = match tally.leader() {
        Some(side) => (side, false),
        None => {
            let side = if rng.random_bool(0.5) { Side::Home } else { Side::Away };
            tally.add(side);
            let team = if side == Side::Home { home } else { away };
            commentary.push(
                CommentaryEvent::narrative(
                    SHOOTOUT_FIRST_MINUTE + rounds + 1,
                    format!(
                        "Still level after {} rounds! A coin toss hands the shootout to {}. Penalties: {}",
                        rounds, team.label, tally
                    ),
                )
                .with_team(team.team_id.clone()),
            );
            (side, true)
        }
    };

    debug!(
        "Shootout {} {} {} after {} rounds{}",
        home.label,
        tally,
        away.label,
        rounds,
        if forced { " (forced)" } else { "" }
    );

    ShootoutOutcome {
        tally,
        winner,
        commentary,
        rounds,
        forced,
    }
}

struct Kicks<'a> {
    home: &'a MatchSide,
    away: &'a MatchSide,
    tally: &'a mut Score,
    commentary: &'a mut Vec<CommentaryEvent>,
}

impl Kicks<'_> {
    fn pair<R: Rng>(&mut self, round: u32, phase: &str, success_rate: f64, rng: &mut R) {
        for side in [Side::Home, Side::Away] {
            self.kick(side, round, phase, success_rate, rng);
        }
    }

    fn kick<R: Rng>(&mut self, side: Side, round: u32, phase: &str, success_rate: f64, rng: &mut R) {
        let team = match side {
            Side::Home => self.home,
            Side::Away => self.away,
        };
        let names = team.roster_names(usize::MAX);
        let taker = names.choose(rng).map(String::as_str).unwrap_or("Player");

        let scored = rng.random_bool(success_rate);
        if scored {
            self.tally.add(side);
        }

        let mut event = CommentaryEvent::narrative(
            SHOOTOUT_FIRST_MINUTE + round,
            format!(
                "{} {} - {} ({}) {}! Penalties: {}",
                phase,
                round,
                taker,
                team.label,
                if scored { "SCORES" } else { "MISSES" },
                self.tally
            ),
        )
        .with_team(team.team_id.clone());
        event.player = Some(taker.to_string());
        self.commentary.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{is_chronological, TeamId};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sides() -> (MatchSide, MatchSide) {
        (
            MatchSide::new(TeamId::from("h"), "POR").with_player("Ronaldo"),
            MatchSide::new(TeamId::from("a"), "ESP"),
        )
    }

    fn kicks(outcome: &ShootoutOutcome) -> usize {
        outcome.commentary.iter().filter(|e| e.player.is_some()).count()
    }

    #[test]
    fn test_shootout_always_has_winner() {
        let (home, away) = sides();
        let settings = SimulationConfig::default();

        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let outcome = run(&home, &away, &settings, &mut rng);

            assert!(!outcome.tally.is_level());
            assert_eq!(outcome.tally.leader(), Some(outcome.winner));
            assert!(outcome.rounds >= settings.standard_rounds);
            assert!(outcome.rounds <= settings.standard_rounds + settings.max_sudden_death_rounds);
            assert!(is_chronological(&outcome.commentary));
            assert!(outcome.commentary.iter().all(|e| e.minute >= SHOOTOUT_FIRST_MINUTE));
        }
    }

    #[test]
    fn test_sudden_death_one_pair_at_a_time() {
        let (home, away) = sides();
        let settings = SimulationConfig::default();
        let mut saw_sudden_death = false;

        for seed in 0..300 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let outcome = run(&home, &away, &settings, &mut rng);
            assert_eq!(kicks(&outcome), 2 * outcome.rounds as usize);

            if outcome.rounds > settings.standard_rounds && !outcome.forced {
                saw_sudden_death = true;
                // a completed pair separates the sides by exactly one
                assert_eq!(outcome.tally.home.abs_diff(outcome.tally.away), 1);

                // level going into the deciding pair
                let before_last_pair = &outcome.commentary[outcome.commentary.len() - 3];
                assert!(before_last_pair.description.ends_with(&format!(
                    "Penalties: {}-{}",
                    outcome.tally.home.min(outcome.tally.away),
                    outcome.tally.home.min(outcome.tally.away)
                )));
            }
        }

        assert!(saw_sudden_death);
    }

    #[test]
    fn test_forced_coin_flip_after_cap() {
        let (home, away) = sides();
        let settings = SimulationConfig {
            penalty_success_rate: 1.0,
            sudden_death_success_rate: 1.0,
            max_sudden_death_rounds: 3,
            ..SimulationConfig::default()
        };

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let outcome = run(&home, &away, &settings, &mut rng);

        assert!(outcome.forced);
        assert_eq!(outcome.rounds, 8);
        assert_eq!(outcome.tally.home.max(outcome.tally.away), 9);
        assert_eq!(outcome.tally.home.min(outcome.tally.away), 8);
        assert_eq!(kicks(&outcome), 16);
        assert!(is_chronological(&outcome.commentary));
    }

    #[test]
    fn test_level_after_five_goes_to_sudden_death() {
        let (home, away) = sides();
        // every standard kick scores: 5-5 forces sudden death
        let settings = SimulationConfig {
            penalty_success_rate: 1.0,
            ..SimulationConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let outcome = run(&home, &away, &settings, &mut rng);

        assert!(outcome.rounds > settings.standard_rounds);
        assert!(outcome.tally.home >= 5 && outcome.tally.away >= 5);
        assert!(outcome
            .commentary
            .iter()
            .any(|e| e.description.starts_with("Sudden death 6 -")));
    }
}
