//! Persistent state behind store traits.
//!
//! Three stores hold the cup's state:
//! - Teams (rosters, goal counters, elimination flags)
//! - Matches (fixtures, results, commentary)
//! - Tournaments (stage, bracket, revision counter)
//!
//! `memory` keeps everything in process; `jsonl` writes through to
//! JSON Lines files under the data directory.

pub mod jsonl;
pub mod memory;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{
    MatchId, MatchRecord, PlayerEdit, PlayerId, Stage, Team, TeamId, Tournament, TournamentId,
};

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    Duplicate { kind: &'static str, id: String },

    /// A compare-and-set lost a race or a precondition no longer holds
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn duplicate(kind: &'static str, id: impl ToString) -> Self {
        StorageError::Duplicate {
            kind,
            id: id.to_string(),
        }
    }
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn teams_path(&self) -> PathBuf {
        self.data_dir.join(jsonl::EntityType::Team.filename())
    }

    pub fn matches_path(&self) -> PathBuf {
        self.data_dir.join(jsonl::EntityType::Match.filename())
    }

    pub fn tournaments_path(&self) -> PathBuf {
        self.data_dir.join(jsonl::EntityType::Tournament.filename())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}

/// Team documents and their counters.
#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn put_team(&self, team: &Team) -> Result<(), StorageError>;

    async fn get_team(&self, id: &TeamId) -> Result<Team, StorageError>;

    async fn list_teams(&self) -> Result<Vec<Team>, StorageError>;

    /// Apply a player edit atomically. A rejected edit is a `Conflict` and
    /// leaves the team unchanged.
    async fn update_player(
        &self,
        team: &TeamId,
        player: &PlayerId,
        edit: &PlayerEdit,
    ) -> Result<Team, StorageError>;

    /// Remove a team together with its players.
    async fn delete_team(&self, id: &TeamId) -> Result<(), StorageError>;

    /// Add one goal to a player's tally.
    async fn increment_player_goals(
        &self,
        team: &TeamId,
        player: &PlayerId,
    ) -> Result<(), StorageError>;

    /// Add to the team's goals scored and conceded.
    async fn add_goals(&self, team: &TeamId, scored: u32, conceded: u32) -> Result<(), StorageError>;

    async fn set_eliminated(&self, team: &TeamId, eliminated: bool) -> Result<(), StorageError>;
}

/// Match documents.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Insert unless a match with the same id exists. Returns whether it was inserted.
    async fn insert_if_absent(&self, record: &MatchRecord) -> Result<bool, StorageError>;

    async fn get_match(&self, id: &MatchId) -> Result<MatchRecord, StorageError>;

    /// Replace an existing match.
    async fn update_match(&self, record: &MatchRecord) -> Result<(), StorageError>;

    /// Compare-and-set `Upcoming -> Live`. Any other current status is a
    /// `Conflict`, so only one resolution of a match can be running.
    async fn begin_resolution(&self, id: &MatchId) -> Result<MatchRecord, StorageError>;

    /// Matches of a tournament in (stage, slot) order.
    async fn list_matches(
        &self,
        tournament: &TournamentId,
        stage: Option<Stage>,
    ) -> Result<Vec<MatchRecord>, StorageError>;

    /// Remove every match of a tournament, returning how many were removed.
    async fn delete_matches(&self, tournament: &TournamentId) -> Result<usize, StorageError>;
}

/// Tournament documents, written with compare-and-set on `revision`.
#[async_trait]
pub trait TournamentStore: Send + Sync {
    async fn create_tournament(&self, tournament: &Tournament) -> Result<(), StorageError>;

    async fn get_tournament(&self, id: &TournamentId) -> Result<Tournament, StorageError>;

    async fn list_tournaments(&self) -> Result<Vec<Tournament>, StorageError>;

    /// Store `next` if the stored revision still equals `next.revision`.
    /// The stored copy gets a bumped revision and fresh `updated_at`.
    async fn compare_and_set(&self, next: &Tournament) -> Result<Tournament, StorageError>;

    /// Atomically append a qualified team; duplicates are rejected.
    async fn append_qualified(
        &self,
        id: &TournamentId,
        team: &TeamId,
    ) -> Result<Tournament, StorageError>;
}

/// Everything the tournament service needs.
pub trait Store: TeamStore + MatchStore + TournamentStore {}

impl<T: TeamStore + MatchStore + TournamentStore> Store for T {}

/// Shared validation for `append_qualified` implementations.
pub(crate) fn qualify(current: &Tournament, team: &TeamId) -> Result<Tournament, StorageError> {
    if current.is_qualified(team) {
        return Err(StorageError::duplicate("qualified team", team));
    }
    crate::bracket::register(current, team).map_err(|e| StorageError::Conflict(e.to_string()))
}

/// Order matches the way the bracket lists them.
pub(crate) fn sort_matches(matches: &mut [MatchRecord]) {
    matches.sort_by(|a, b| a.stage.cmp(&b.stage).then(a.slot.cmp(&b.slot)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_paths() {
        let config = StorageConfig::new(PathBuf::from("/data"));

        assert_eq!(config.teams_path(), PathBuf::from("/data/teams.jsonl"));
        assert_eq!(config.matches_path(), PathBuf::from("/data/matches.jsonl"));
        assert_eq!(
            config.tournaments_path(),
            PathBuf::from("/data/tournaments.jsonl")
        );
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn test_qualify_rejects_duplicates() {
        let t = Tournament::new("Cup");
        let team = TeamId::from("ENG");
        let t = qualify(&t, &team).unwrap();
        assert!(matches!(
            qualify(&t, &team),
            Err(StorageError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("match", "abc");
        assert_eq!(err.to_string(), "match abc not found");
    }
}
