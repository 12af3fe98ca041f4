//! In-process store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::{qualify, sort_matches, MatchStore, StorageError, TeamStore, TournamentStore};
use crate::models::{
    MatchId, MatchRecord, MatchStatus, PlayerEdit, PlayerId, Stage, Team, TeamId, Tournament, TournamentId,
};

/// All three stores behind `tokio` read-write locks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    teams: RwLock<HashMap<TeamId, Team>>,
    matches: RwLock<HashMap<MatchId, MatchRecord>>,
    tournaments: RwLock<HashMap<TournamentId, Tournament>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store preloaded with documents.
    pub fn from_parts(
        teams: Vec<Team>,
        matches: Vec<MatchRecord>,
        tournaments: Vec<Tournament>,
    ) -> Self {
        Self {
            teams: RwLock::new(teams.into_iter().map(|t| (t.id.clone(), t)).collect()),
            matches: RwLock::new(matches.into_iter().map(|m| (m.id.clone(), m)).collect()),
            tournaments: RwLock::new(
                tournaments.into_iter().map(|t| (t.id.clone(), t)).collect(),
            ),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every operation fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn snapshot_teams(&self) -> Vec<Team> {
        let mut teams: Vec<Team> = self.teams.read().await.values().cloned().collect();
        teams.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        teams
    }

    pub async fn snapshot_matches(&self) -> Vec<MatchRecord> {
        let mut matches: Vec<MatchRecord> = self.matches.read().await.values().cloned().collect();
        matches.sort_by(|a, b| {
            a.tournament_id
                .cmp(&b.tournament_id)
                .then(a.stage.cmp(&b.stage))
                .then(a.slot.cmp(&b.slot))
        });
        matches
    }

    pub async fn snapshot_tournaments(&self) -> Vec<Tournament> {
        let mut tournaments: Vec<Tournament> =
            self.tournaments.read().await.values().cloned().collect();
        tournaments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tournaments
    }

    async fn with_team<F>(&self, id: &TeamId, update: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Team) -> Result<(), StorageError> + Send,
    {
        self.check_online()?;
        let mut teams = self.teams.write().await;
        let team = teams
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("team", id))?;
        update(team)
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn put_team(&self, team: &Team) -> Result<(), StorageError> {
        self.check_online()?;
        self.teams.write().await.insert(team.id.clone(), team.clone());
        Ok(())
    }

    async fn get_team(&self, id: &TeamId) -> Result<Team, StorageError> {
        self.check_online()?;
        self.teams
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("team", id))
    }

    async fn list_teams(&self) -> Result<Vec<Team>, StorageError> {
        self.check_online()?;
        Ok(self.snapshot_teams().await)
    }

    async fn update_player(
        &self,
        team: &TeamId,
        player: &PlayerId,
        edit: &PlayerEdit,
    ) -> Result<Team, StorageError> {
        self.check_online()?;
        let mut teams = self.teams.write().await;
        let stored = teams
            .get_mut(team)
            .ok_or_else(|| StorageError::not_found("team", team))?;

        let mut next = stored.clone();
        next.update_player(player, edit)
            .map_err(|e| StorageError::Conflict(e.0))?;
        *stored = next.clone();
        Ok(next)
    }

    async fn delete_team(&self, id: &TeamId) -> Result<(), StorageError> {
        self.check_online()?;
        self.teams
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("team", id))
    }

    async fn increment_player_goals(
        &self,
        team: &TeamId,
        player: &PlayerId,
    ) -> Result<(), StorageError> {
        self.with_team(team, |t| {
            let p = t
                .player_mut(player)
                .ok_or_else(|| StorageError::not_found("player", player))?;
            p.goals += 1;
            debug!("{} now has {} goals", p.name, p.goals);
            Ok(())
        })
        .await
    }

    async fn add_goals(&self, team: &TeamId, scored: u32, conceded: u32) -> Result<(), StorageError> {
        self.with_team(team, |t| {
            t.stats.goals_scored += scored;
            t.stats.goals_conceded += conceded;
            Ok(())
        })
        .await
    }

    async fn set_eliminated(&self, team: &TeamId, eliminated: bool) -> Result<(), StorageError> {
        self.with_team(team, |t| {
            t.stats.eliminated = eliminated;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn insert_if_absent(&self, record: &MatchRecord) -> Result<bool, StorageError> {
        self.check_online()?;
        let mut matches = self.matches.write().await;
        if matches.contains_key(&record.id) {
            return Ok(false);
        }
        matches.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    async fn get_match(&self, id: &MatchId) -> Result<MatchRecord, StorageError> {
        self.check_online()?;
        self.matches
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("match", id))
    }

    async fn update_match(&self, record: &MatchRecord) -> Result<(), StorageError> {
        self.check_online()?;
        let mut matches = self.matches.write().await;
        match matches.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(StorageError::not_found("match", &record.id)),
        }
    }

    async fn begin_resolution(&self, id: &MatchId) -> Result<MatchRecord, StorageError> {
        self.check_online()?;
        let mut matches = self.matches.write().await;
        let record = matches
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("match", id))?;

        if record.status != MatchStatus::Upcoming {
            return Err(StorageError::Conflict(format!(
                "match {} is {}, not upcoming",
                id, record.status
            )));
        }

        record.status = MatchStatus::Live;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_matches(
        &self,
        tournament: &TournamentId,
        stage: Option<Stage>,
    ) -> Result<Vec<MatchRecord>, StorageError> {
        self.check_online()?;
        let mut found: Vec<MatchRecord> = self
            .matches
            .read()
            .await
            .values()
            .filter(|m| &m.tournament_id == tournament)
            .filter(|m| stage.map_or(true, |s| m.stage == s))
            .cloned()
            .collect();
        sort_matches(&mut found);
        Ok(found)
    }

    async fn delete_matches(&self, tournament: &TournamentId) -> Result<usize, StorageError> {
        self.check_online()?;
        let mut matches = self.matches.write().await;
        let before = matches.len();
        matches.retain(|_, m| &m.tournament_id != tournament);
        Ok(before - matches.len())
    }
}

#[async_trait]
impl TournamentStore for MemoryStore {
    async fn create_tournament(&self, tournament: &Tournament) -> Result<(), StorageError> {
        self.check_online()?;
        let mut tournaments = self.tournaments.write().await;
        if tournaments.contains_key(&tournament.id) {
            return Err(StorageError::duplicate("tournament", &tournament.id));
        }
        tournaments.insert(tournament.id.clone(), tournament.clone());
        Ok(())
    }

    async fn get_tournament(&self, id: &TournamentId) -> Result<Tournament, StorageError> {
        self.check_online()?;
        self.tournaments
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("tournament", id))
    }

    async fn list_tournaments(&self) -> Result<Vec<Tournament>, StorageError> {
        self.check_online()?;
        Ok(self.snapshot_tournaments().await)
    }

    async fn compare_and_set(&self, next: &Tournament) -> Result<Tournament, StorageError> {
        self.check_online()?;
        let mut tournaments = self.tournaments.write().await;
        let stored = tournaments
            .get_mut(&next.id)
            .ok_or_else(|| StorageError::not_found("tournament", &next.id))?;

        if stored.revision != next.revision {
            return Err(StorageError::Conflict(format!(
                "tournament {} is at revision {}, write expected {}",
                next.id, stored.revision, next.revision
            )));
        }

        let mut committed = next.clone();
        committed.revision += 1;
        committed.updated_at = Utc::now();
        *stored = committed.clone();
        Ok(committed)
    }

    async fn append_qualified(
        &self,
        id: &TournamentId,
        team: &TeamId,
    ) -> Result<Tournament, StorageError> {
        self.check_online()?;
        let mut tournaments = self.tournaments.write().await;
        let stored = tournaments
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("tournament", id))?;

        let mut committed = qualify(stored, team)?;
        committed.revision += 1;
        committed.updated_at = Utc::now();
        *stored = committed.clone();
        Ok(committed)
    }
}
