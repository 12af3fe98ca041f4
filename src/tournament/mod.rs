//! Tournament service.
//!
//! Wires the bracket engine and the match resolver to the stores. Clients
//! pull state with the getters; nothing is pushed.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bracket::{self, AdvanceOutcome, Advancement, BracketError};
use crate::models::{
    CommentaryEvent, EntityId, EventKind, MatchId, MatchRecord, MatchStatus, Pairing, PlayerEdit,
    PlayerId, ResultSource, RosterEntry, Score, Side, Stage, Team, TeamId, Tournament, TournamentId,
    ValidationError, REGULATION_MINUTES,
};
use crate::resolver::{GoalCredit, MatchResolver, MatchSide};
use crate::storage::{MatchStore, StorageError, Store, TeamStore, TournamentStore};

/// Attempts at a compare-and-set before giving up.
const MAX_CAS_ATTEMPTS: usize = 5;

/// Errors reported by the tournament service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Match {0} is already final")]
    AlreadyResolved(MatchId),

    #[error("Match {0} is already being resolved")]
    InProgress(MatchId),

    #[error("Resolution of match {0} was cancelled")]
    Cancelled(MatchId),

    #[error("Bracket error: {0}")]
    Bracket(#[from] BracketError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        ServiceError::Validation(e.0)
    }
}

/// A running resolution. `cancel` asks it to stop; `finished` fires once it
/// has made its last write.
#[derive(Clone, Default)]
struct Resolution {
    cancel: CancellationToken,
    finished: CancellationToken,
}

/// The cup's application service. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TournamentService {
    store: Arc<dyn Store>,
    resolver: Arc<MatchResolver>,
    in_flight: Arc<Mutex<HashMap<MatchId, Resolution>>>,
}

impl TournamentService {
    pub fn new(store: Arc<dyn Store>, resolver: MatchResolver) -> Self {
        Self {
            store,
            resolver: Arc::new(resolver),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// RNG for one entity. Reproducible when a seed is configured.
    fn rng_for(&self, key: &str) -> ChaCha8Rng {
        match self.resolver.settings().seed {
            Some(seed) => {
                let digest = EntityId::generate(&[&seed.to_string(), key]);
                let derived = u64::from_str_radix(digest.as_str(), 16).unwrap_or(seed);
                ChaCha8Rng::seed_from_u64(derived)
            }
            None => ChaCha8Rng::from_os_rng(),
        }
    }

    // --- registration ---

    pub async fn create_tournament(&self, name: &str) -> Result<Tournament, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation(
                "tournament name must not be empty".to_string(),
            ));
        }

        let tournament = Tournament::new(name);
        self.store.create_tournament(&tournament).await?;
        info!("Created tournament {} ({})", tournament.name, tournament.id);
        Ok(tournament)
    }

    /// Register a team from a roster form.
    pub async fn register_team(
        &self,
        label: &str,
        manager: &str,
        roster: &[RosterEntry],
    ) -> Result<Team, ServiceError> {
        let mut rng = self.rng_for(&format!("team|{label}"));
        let team = Team::register(label, manager, roster, &mut rng)?;
        self.store.put_team(&team).await?;
        info!(
            "Registered team {} ({} players, rating {})",
            team.label,
            team.players.len(),
            team.stats.average_rating
        );
        Ok(team)
    }

    /// Add a registered team to a tournament's qualified list.
    pub async fn qualify_team(
        &self,
        tournament_id: &TournamentId,
        team_id: &TeamId,
    ) -> Result<Tournament, ServiceError> {
        let team = self.store.get_team(team_id).await?;

        match self.store.append_qualified(tournament_id, team_id).await {
            Ok(tournament) => {
                info!(
                    "{} qualified for {} ({} teams)",
                    team.label,
                    tournament.name,
                    tournament.teams_qualified.len()
                );
                Ok(tournament)
            }
            Err(StorageError::Duplicate { .. }) => Err(ServiceError::Validation(format!(
                "team {} is already qualified",
                team.label
            ))),
            Err(StorageError::Conflict(reason)) => Err(ServiceError::Validation(reason)),
            Err(e) => Err(e.into()),
        }
    }

    /// Seed the bracket and create the quarter-final fixtures.
    pub async fn start_tournament(&self, id: &TournamentId) -> Result<Tournament, ServiceError> {
        let current = self.store.get_tournament(id).await?;
        let started = bracket::start(&current)?;
        let committed = self.store.compare_and_set(&started).await?;

        for team in &committed.teams_qualified {
            self.store.set_eliminated(team, false).await?;
        }
        self.ensure_fixtures(&committed).await?;

        info!("Tournament {} started", committed.name);
        Ok(committed)
    }

    /// Make sure every pairing of the active stage has a match record.
    async fn ensure_fixtures(&self, tournament: &Tournament) -> Result<usize, ServiceError> {
        let mut created = 0;
        for pairing in tournament.bracket.pairings(tournament.stage) {
            let record = MatchRecord::for_pairing(tournament.id.clone(), pairing);
            if self.store.insert_if_absent(&record).await? {
                debug!("Created fixture {} ({})", pairing.label(), record.id);
                created += 1;
            }
        }
        Ok(created)
    }

    // --- match resolution ---

    /// Resolve an upcoming match: regulation, then penalties when level.
    ///
    /// Events are written to the store one by one. A second concurrent call
    /// for the same match fails with `InProgress`; a final match reports
    /// `AlreadyResolved` and is left untouched.
    pub async fn play_match(&self, id: &MatchId) -> Result<MatchRecord, ServiceError> {
        let current = self.store.get_match(id).await?;
        if current.is_final() {
            return Err(ServiceError::AlreadyResolved(id.clone()));
        }

        let resolution = Resolution::default();
        let _finished = resolution.finished.clone().drop_guard();
        let live = self.claim(id, &resolution).await?;

        info!("Kick-off: match {} ({})", id, live.stage);
        let result = match self.resolve_live(live, &resolution.cancel).await {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!("Match {} not completed: {}", id, e);
                self.rewind(id).await;
                Err(e)
            }
        };
        self.in_flight.lock().await.remove(id);
        result
    }

    /// Register a resolution and flip the match to live.
    ///
    /// The registration comes first, so a live match always has an entry
    /// that resets can stop and wait for.
    async fn claim(
        &self,
        id: &MatchId,
        resolution: &Resolution,
    ) -> Result<MatchRecord, ServiceError> {
        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.contains_key(id) {
                return Err(ServiceError::InProgress(id.clone()));
            }
            in_flight.insert(id.clone(), resolution.clone());
        }

        match self.store.begin_resolution(id).await {
            Ok(live) => Ok(live),
            Err(e) => {
                self.in_flight.lock().await.remove(id);
                Err(match e {
                    StorageError::Conflict(reason) => {
                        let status = self.store.get_match(id).await?.status;
                        if status == MatchStatus::Final {
                            ServiceError::AlreadyResolved(id.clone())
                        } else if status.is_in_progress() {
                            ServiceError::InProgress(id.clone())
                        } else {
                            StorageError::Conflict(reason).into()
                        }
                    }
                    e => e.into(),
                })
            }
        }
    }

    /// Put an interrupted match back to upcoming.
    async fn rewind(&self, id: &MatchId) {
        match self.store.get_match(id).await {
            Ok(mut record) if !record.is_final() => {
                record.reset();
                if let Err(e) = self.store.update_match(&record).await {
                    warn!("Could not reset match {}: {}", id, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Could not reset match {}: {}", id, e),
        }
    }

    async fn resolve_live(
        &self,
        mut record: MatchRecord,
        token: &CancellationToken,
    ) -> Result<MatchRecord, ServiceError> {
        let id = record.id.clone();
        let home = MatchSide::from_team(&self.store.get_team(&record.home_team).await?);
        let away = MatchSide::from_team(&self.store.get_team(&record.away_team).await?);
        let mut rng = self.rng_for(id.as_str());

        let outcome = tokio::select! {
            _ = token.cancelled() => return Err(ServiceError::Cancelled(id.clone())),
            outcome = self.resolver.resolve(&home, &away, &mut rng) => outcome,
        };

        record.simulated = true;
        record.result_source = Some(outcome.regulation.source);

        for event in &outcome.regulation.events {
            self.pause(&id, token).await?;
            if event.kind == EventKind::Goal {
                if let Some(side) = event.team.as_ref().and_then(|t| record.side_of(t)) {
                    record.score.add(side);
                }
            }
            debug!("{} {}", id, event);
            record.push_commentary(event.clone());
            self.store.update_match(&record).await?;
        }

        record.advance_status(MatchStatus::RegulationComplete)?;
        self.store.update_match(&record).await?;

        if let Some(shootout) = &outcome.shootout {
            record.advance_status(MatchStatus::PenaltyShootout)?;
            self.store.update_match(&record).await?;

            for event in &shootout.commentary {
                self.pause(&id, token).await?;
                debug!("{} {}", id, event);
                record.push_commentary(event.clone());
                self.store.update_match(&record).await?;
            }

            record.penalty_score = Some(shootout.tally);
            record.forced_shootout = shootout.forced;
        }

        // last chance to cancel before the terminal write
        if token.is_cancelled() {
            return Err(ServiceError::Cancelled(id));
        }

        let winner = record.team(outcome.winner).clone();
        self.finish(record, &winner, &outcome.regulation.goal_credits)
            .await
    }

    /// Commit the winner and apply team statistics.
    async fn finish(
        &self,
        mut record: MatchRecord,
        winner: &TeamId,
        credits: &[GoalCredit],
    ) -> Result<MatchRecord, ServiceError> {
        record.set_winner(winner)?;
        record.advance_status(MatchStatus::Final)?;
        record.validate()?;
        self.store.update_match(&record).await?;

        for credit in credits {
            if let Err(e) = self
                .store
                .increment_player_goals(&credit.team_id, &credit.player_id)
                .await
            {
                warn!("Goal for {} not credited: {}", credit.player_name, e);
            }
        }

        let score = record.score;
        self.store
            .add_goals(&record.home_team, score.home, score.away)
            .await?;
        self.store
            .add_goals(&record.away_team, score.away, score.home)
            .await?;
        if let Some(loser) = record.loser() {
            self.store.set_eliminated(loser, true).await?;
        }

        info!(
            "Full time in {}: {} {} {}{} (winner {})",
            record.id,
            record.home_team,
            record.score,
            record.away_team,
            record
                .penalty_score
                .map(|p| format!(", {p} on penalties"))
                .unwrap_or_default(),
            winner
        );
        Ok(record)
    }

    async fn pause(&self, id: &MatchId, token: &CancellationToken) -> Result<(), ServiceError> {
        if token.is_cancelled() {
            return Err(ServiceError::Cancelled(id.clone()));
        }

        let delay = self.resolver.settings().event_delay();
        if !delay.is_zero() {
            tokio::select! {
                _ = token.cancelled() => return Err(ServiceError::Cancelled(id.clone())),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }

    /// Signal a running resolution to stop. Returns false if none is running.
    pub async fn cancel_match(&self, id: &MatchId) -> bool {
        match self.in_flight.lock().await.get(id) {
            Some(resolution) => {
                info!("Cancelling match {}", id);
                resolution.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel a running resolution and wait until it has stopped writing.
    /// Returns false if none was running.
    async fn stop_resolution(&self, id: &MatchId) -> bool {
        let running = self.in_flight.lock().await.get(id).cloned();
        match running {
            Some(resolution) => {
                info!("Stopping match {}", id);
                resolution.cancel.cancel();
                resolution.finished.cancelled().await;
                true
            }
            None => false,
        }
    }

    /// Enter a result by hand.
    ///
    /// A level score needs a decisive penalty score; a decisive score must
    /// come without one.
    pub async fn record_result(
        &self,
        id: &MatchId,
        score: Score,
        penalties: Option<Score>,
    ) -> Result<MatchRecord, ServiceError> {
        let winner_side = match (score.leader(), penalties) {
            (Some(_), Some(_)) => {
                return Err(ServiceError::Validation(format!(
                    "a decisive {score} result cannot have penalties"
                )))
            }
            (Some(side), None) => side,
            (None, Some(p)) => p.leader().ok_or_else(|| {
                ServiceError::Validation(format!("penalty score {p} must not be level"))
            })?,
            (None, None) => {
                return Err(ServiceError::Validation(format!(
                    "a level {score} result needs a penalty score"
                )))
            }
        };

        let current = self.store.get_match(id).await?;
        if current.is_final() {
            return Err(ServiceError::AlreadyResolved(id.clone()));
        }

        let resolution = Resolution::default();
        let _finished = resolution.finished.clone().drop_guard();
        let live = self.claim(id, &resolution).await?;

        let result = match self.enter_result(live, score, penalties, winner_side).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.rewind(id).await;
                Err(e)
            }
        };
        self.in_flight.lock().await.remove(id);
        result
    }

    async fn enter_result(
        &self,
        mut record: MatchRecord,
        score: Score,
        penalties: Option<Score>,
        winner_side: Side,
    ) -> Result<MatchRecord, ServiceError> {
        record.score = score;
        record.result_source = Some(ResultSource::Manual);
        record.simulated = false;
        record.push_commentary(CommentaryEvent::narrative(
            REGULATION_MINUTES,
            format!("Result entered manually: {score}"),
        ));
        record.advance_status(MatchStatus::RegulationComplete)?;

        if let Some(p) = penalties {
            record.advance_status(MatchStatus::PenaltyShootout)?;
            record.penalty_score = Some(p);
        }

        let winner = record.team(winner_side).clone();
        self.finish(record, &winner, &[]).await
    }

    /// Return a match to upcoming. Only allowed while its stage is active.
    pub async fn reset_match(&self, id: &MatchId) -> Result<MatchRecord, ServiceError> {
        let record = self.store.get_match(id).await?;
        let tournament = self.store.get_tournament(&record.tournament_id).await?;
        if tournament.stage != record.stage {
            return Err(ServiceError::Validation(format!(
                "match {} belongs to {}, but the tournament is at {}",
                id, record.stage, tournament.stage
            )));
        }

        // a stopped resolution has either rewound or finished; re-read it
        let mut record = if self.stop_resolution(id).await {
            self.store.get_match(id).await?
        } else {
            record
        };
        if let Some(loser) = record.loser() {
            self.store.set_eliminated(loser, false).await?;
        }
        record.reset();
        self.store.update_match(&record).await?;
        info!("Match {} reset", id);
        Ok(record)
    }

    // --- squad management ---

    /// Rename, move or (un)captain a player.
    pub async fn update_player(
        &self,
        team: &TeamId,
        player: &PlayerId,
        edit: &PlayerEdit,
    ) -> Result<Team, ServiceError> {
        match self.store.update_player(team, player, edit).await {
            Ok(updated) => {
                info!("Updated player {} of {}", player, updated.label);
                Ok(updated)
            }
            Err(StorageError::Conflict(reason)) => Err(ServiceError::Validation(reason)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a team and its players.
    ///
    /// Refused while the team is qualified for a tournament past
    /// registration. Tournaments still registering lose the team from their
    /// qualified list.
    pub async fn delete_team(&self, id: &TeamId) -> Result<(), ServiceError> {
        let team = self.store.get_team(id).await?;

        let entered: Vec<Tournament> = self
            .store
            .list_tournaments()
            .await?
            .into_iter()
            .filter(|t| t.is_qualified(id))
            .collect();
        if let Some(playing) = entered.iter().find(|t| t.stage != Stage::Registration) {
            return Err(ServiceError::Validation(format!(
                "team {} is qualified for {} ({})",
                team.label, playing.name, playing.stage
            )));
        }

        for tournament in &entered {
            self.withdraw(&tournament.id, id).await?;
        }
        self.store.delete_team(id).await?;
        info!("Deleted team {} ({} players)", team.label, team.players.len());
        Ok(())
    }

    async fn withdraw(&self, tournament: &TournamentId, team: &TeamId) -> Result<(), ServiceError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.store.get_tournament(tournament).await?;
            if !current.is_qualified(team) {
                return Ok(());
            }
            match self
                .store
                .compare_and_set(&bracket::withdraw(&current, team)?)
                .await
            {
                Ok(_) => return Ok(()),
                Err(StorageError::Conflict(reason)) => {
                    debug!("Withdraw attempt {} lost a race: {}", attempt, reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::Conflict(format!(
            "tournament {tournament} kept changing during withdrawal"
        ))
        .into())
    }

    // --- bracket progression ---

    /// Move to the next stage once every active fixture has a winner.
    ///
    /// Safe to call repeatedly and concurrently: the commit is a
    /// compare-and-set on the tournament revision, so only one caller
    /// advances and the others observe no change.
    pub async fn advance(&self, id: &TournamentId) -> Result<Advancement, ServiceError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.store.get_tournament(id).await?;
            if current.stage.is_playing_round() {
                self.ensure_fixtures(&current).await?;
            }

            let matches = if current.stage.is_playing_round() {
                self.store.list_matches(id, Some(current.stage)).await?
            } else {
                Vec::new()
            };

            let advancement = bracket::advance_round(&current, &matches)?;
            let new_pairings = match &advancement.outcome {
                AdvanceOutcome::Advanced { new_pairings, .. } => new_pairings.clone(),
                _ => return Ok(advancement),
            };

            match self.store.compare_and_set(&advancement.tournament).await {
                Ok(committed) => {
                    self.create_fixtures(&committed, &new_pairings).await?;
                    if let Some(champion) = &committed.champion {
                        info!("{} champion: {}", committed.name, champion);
                    }
                    return Ok(Advancement {
                        tournament: committed,
                        outcome: advancement.outcome,
                    });
                }
                Err(StorageError::Conflict(reason)) => {
                    debug!("Advance attempt {} lost a race: {}", attempt, reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::Conflict(format!(
            "tournament {id} kept changing during {MAX_CAS_ATTEMPTS} advance attempts"
        ))
        .into())
    }

    async fn create_fixtures(
        &self,
        tournament: &Tournament,
        pairings: &[Pairing],
    ) -> Result<(), ServiceError> {
        for pairing in pairings {
            let record = MatchRecord::for_pairing(tournament.id.clone(), pairing);
            self.store.insert_if_absent(&record).await?;
        }
        Ok(())
    }

    /// Clear the bracket and every match; qualified teams stay registered.
    pub async fn reset_tournament(&self, id: &TournamentId) -> Result<Tournament, ServiceError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.store.get_tournament(id).await?;

            for record in self.store.list_matches(id, None).await? {
                self.stop_resolution(&record.id).await;
            }

            match self.store.compare_and_set(&bracket::reset(&current)).await {
                Ok(committed) => {
                    let removed = self.store.delete_matches(id).await?;
                    for team in &committed.teams_qualified {
                        self.store.set_eliminated(team, false).await?;
                    }
                    info!(
                        "Tournament {} reset ({} matches removed)",
                        committed.name, removed
                    );
                    return Ok(committed);
                }
                Err(StorageError::Conflict(reason)) => {
                    debug!("Reset attempt {} lost a race: {}", attempt, reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::Conflict(format!("tournament {id} kept changing during reset")).into())
    }

    /// Play every remaining match, round by round, until a champion is known.
    pub async fn run_to_completion(&self, id: &TournamentId) -> Result<Tournament, ServiceError> {
        loop {
            let tournament = self.store.get_tournament(id).await?;
            match tournament.stage {
                Stage::Completed => return Ok(tournament),
                Stage::Registration => {
                    return Err(ServiceError::Validation(format!(
                        "tournament {} has not started",
                        tournament.name
                    )))
                }
                _ => {}
            }

            self.ensure_fixtures(&tournament).await?;
            let upcoming: Vec<MatchId> = self
                .store
                .list_matches(id, Some(tournament.stage))
                .await?
                .into_iter()
                .filter(|m| m.status == MatchStatus::Upcoming)
                .map(|m| m.id)
                .collect();

            info!(
                "Playing {} {} matches concurrently",
                upcoming.len(),
                tournament.stage
            );

            let mut tasks = JoinSet::new();
            for match_id in upcoming.iter().cloned() {
                let service = self.clone();
                tasks.spawn(async move { service.play_match(&match_id).await });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined? {
                    Ok(_) => {}
                    Err(ServiceError::AlreadyResolved(m)) | Err(ServiceError::InProgress(m)) => {
                        debug!("Match {} handled elsewhere", m);
                    }
                    Err(e) => return Err(e),
                }
            }

            let advancement = self.advance(id).await?;
            if !advancement.advanced() && upcoming.is_empty() {
                return Err(ServiceError::Validation(format!(
                    "{} cannot finish: {:?}",
                    tournament.stage, advancement.outcome
                )));
            }
        }
    }

    // --- pull operations ---

    pub async fn get_tournament(&self, id: &TournamentId) -> Result<Tournament, ServiceError> {
        Ok(self.store.get_tournament(id).await?)
    }

    pub async fn list_tournaments(&self) -> Result<Vec<Tournament>, ServiceError> {
        Ok(self.store.list_tournaments().await?)
    }

    pub async fn get_match(&self, id: &MatchId) -> Result<MatchRecord, ServiceError> {
        Ok(self.store.get_match(id).await?)
    }

    pub async fn list_matches(
        &self,
        tournament: &TournamentId,
        stage: Option<Stage>,
    ) -> Result<Vec<MatchRecord>, ServiceError> {
        Ok(self.store.list_matches(tournament, stage).await?)
    }

    pub async fn get_team(&self, id: &TeamId) -> Result<Team, ServiceError> {
        Ok(self.store.get_team(id).await?)
    }

    pub async fn list_teams(&self) -> Result<Vec<Team>, ServiceError> {
        Ok(self.store.list_teams().await?)
    }

    /// Which side won a final match, if any.
    pub fn winning_side(record: &MatchRecord) -> Option<Side> {
        record.winner.as_ref().and_then(|w| record.side_of(w))
    }
}
