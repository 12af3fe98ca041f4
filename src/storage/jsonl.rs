//! JSONL (JSON Lines) storage.
//!
//! Each entity type lives in one file under the data directory, one JSON
//! object per line. The store keeps a full copy in memory and rewrites the
//! affected file after every successful write.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    MatchStore, MemoryStore, StorageConfig, StorageError, TeamStore, TournamentStore,
};
use crate::models::{
    MatchId, MatchRecord, PlayerEdit, PlayerId, Stage, Team, TeamId, Tournament, TournamentId,
};

/// Entity types for JSONL storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Team,
    Match,
    Tournament,
}

impl EntityType {
    /// Get the filename for this entity type.
    pub fn filename(&self) -> &'static str {
        match self {
            EntityType::Team => "teams.jsonl",
            EntityType::Match => "matches.jsonl",
            EntityType::Tournament => "tournaments.jsonl",
        }
    }
}

/// JSONL file writer.
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    /// Create a new JSONL writer for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Ensure the parent directory exists.
    fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append a single entity to the file.
    pub fn append(&self, entity: &T) -> Result<(), StorageError> {
        self.ensure_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string(entity)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        debug!("Appended entity to {:?}", self.path);
        Ok(())
    }

    /// Write entities, replacing the entire file.
    ///
    /// Goes through a temporary sibling file and a rename so a crash never
    /// leaves a half-written file behind.
    pub fn write_all(&self, entities: &[T]) -> Result<usize, StorageError> {
        self.ensure_dir()?;

        let tmp = self.path.with_extension("jsonl.tmp");
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        let mut count = 0;

        for entity in entities {
            let json = serde_json::to_string(entity)?;
            writeln!(writer, "{}", json)?;
            count += 1;
        }

        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, &self.path)?;

        debug!("Wrote {} entities to {:?}", count, self.path);
        Ok(count)
    }
}

/// JSONL file reader.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// Create a new JSONL reader for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Check if the file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read all entities from the file. Unparseable lines are skipped.
    pub fn read_all(&self) -> Result<Vec<T>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut entities = Vec::new();
        let mut line_num = 0;

        for line in reader.lines() {
            line_num += 1;
            let line = line?;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str(&line) {
                Ok(entity) => entities.push(entity),
                Err(e) => {
                    warn!(
                        "Failed to parse line {} in {:?}: {}",
                        line_num, self.path, e
                    );
                }
            }
        }

        debug!("Read {} entities from {:?}", entities.len(), self.path);
        Ok(entities)
    }
}

/// File-backed store: an in-memory store that writes through to JSONL.
pub struct JsonlStore {
    config: StorageConfig,
    inner: MemoryStore,
    /// Serializes snapshot-and-write so a later snapshot is never
    /// overwritten by an earlier one
    persist: Mutex<()>,
}

impl JsonlStore {
    /// Open (or create) a store in `config.data_dir`.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;

        let teams = JsonlReader::<Team>::new(config.teams_path()).read_all()?;
        let matches = JsonlReader::<MatchRecord>::new(config.matches_path()).read_all()?;
        let tournaments = JsonlReader::<Tournament>::new(config.tournaments_path()).read_all()?;

        info!(
            "Opened store at {:?}: {} teams, {} matches, {} tournaments",
            config.data_dir,
            teams.len(),
            matches.len(),
            tournaments.len()
        );

        Ok(Self {
            inner: MemoryStore::from_parts(teams, matches, tournaments),
            config,
            persist: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    async fn persist(&self, entity: EntityType) -> Result<(), StorageError> {
        let _guard = self.persist.lock().await;
        match entity {
            EntityType::Team => JsonlWriter::new(self.config.teams_path())
                .write_all(&self.inner.snapshot_teams().await)?,
            EntityType::Match => JsonlWriter::new(self.config.matches_path())
                .write_all(&self.inner.snapshot_matches().await)?,
            EntityType::Tournament => JsonlWriter::new(self.config.tournaments_path())
                .write_all(&self.inner.snapshot_tournaments().await)?,
        };
        Ok(())
    }
}

#[async_trait]
impl TeamStore for JsonlStore {
    async fn put_team(&self, team: &Team) -> Result<(), StorageError> {
        self.inner.put_team(team).await?;
        self.persist(EntityType::Team).await
    }

    async fn get_team(&self, id: &TeamId) -> Result<Team, StorageError> {
        self.inner.get_team(id).await
    }

    async fn list_teams(&self) -> Result<Vec<Team>, StorageError> {
        self.inner.list_teams().await
    }

    async fn update_player(
        &self,
        team: &TeamId,
        player: &PlayerId,
        edit: &PlayerEdit,
    ) -> Result<Team, StorageError> {
        let updated = self.inner.update_player(team, player, edit).await?;
        self.persist(EntityType::Team).await?;
        Ok(updated)
    }

    async fn delete_team(&self, id: &TeamId) -> Result<(), StorageError> {
        self.inner.delete_team(id).await?;
        self.persist(EntityType::Team).await
    }

    async fn increment_player_goals(
        &self,
        team: &TeamId,
        player: &PlayerId,
    ) -> Result<(), StorageError> {
        self.inner.increment_player_goals(team, player).await?;
        self.persist(EntityType::Team).await
    }

    async fn add_goals(&self, team: &TeamId, scored: u32, conceded: u32) -> Result<(), StorageError> {
        self.inner.add_goals(team, scored, conceded).await?;
        self.persist(EntityType::Team).await
    }

    async fn set_eliminated(&self, team: &TeamId, eliminated: bool) -> Result<(), StorageError> {
        self.inner.set_eliminated(team, eliminated).await?;
        self.persist(EntityType::Team).await
    }
}

#[async_trait]
impl MatchStore for JsonlStore {
    async fn insert_if_absent(&self, record: &MatchRecord) -> Result<bool, StorageError> {
        let inserted = self.inner.insert_if_absent(record).await?;
        if inserted {
            self.persist(EntityType::Match).await?;
        }
        Ok(inserted)
    }

    async fn get_match(&self, id: &MatchId) -> Result<MatchRecord, StorageError> {
        self.inner.get_match(id).await
    }

    async fn update_match(&self, record: &MatchRecord) -> Result<(), StorageError> {
        self.inner.update_match(record).await?;
        self.persist(EntityType::Match).await
    }

    async fn begin_resolution(&self, id: &MatchId) -> Result<MatchRecord, StorageError> {
        let live = self.inner.begin_resolution(id).await?;
        self.persist(EntityType::Match).await?;
        Ok(live)
    }

    async fn list_matches(
        &self,
        tournament: &TournamentId,
        stage: Option<Stage>,
    ) -> Result<Vec<MatchRecord>, StorageError> {
        self.inner.list_matches(tournament, stage).await
    }

    async fn delete_matches(&self, tournament: &TournamentId) -> Result<usize, StorageError> {
        let removed = self.inner.delete_matches(tournament).await?;
        if removed > 0 {
            self.persist(EntityType::Match).await?;
        }
        Ok(removed)
    }
}

#[async_trait]
impl TournamentStore for JsonlStore {
    async fn create_tournament(&self, tournament: &Tournament) -> Result<(), StorageError> {
        self.inner.create_tournament(tournament).await?;
        self.persist(EntityType::Tournament).await
    }

    async fn get_tournament(&self, id: &TournamentId) -> Result<Tournament, StorageError> {
        self.inner.get_tournament(id).await
    }

    async fn list_tournaments(&self) -> Result<Vec<Tournament>, StorageError> {
        self.inner.list_tournaments().await
    }

    async fn compare_and_set(&self, next: &Tournament) -> Result<Tournament, StorageError> {
        let committed = self.inner.compare_and_set(next).await?;
        self.persist(EntityType::Tournament).await?;
        Ok(committed)
    }

    async fn append_qualified(
        &self,
        id: &TournamentId,
        team: &TeamId,
    ) -> Result<Tournament, StorageError> {
        let committed = self.inner.append_qualified(id, team).await?;
        self.persist(EntityType::Tournament).await?;
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchStatus, Pairing, Position, RosterEntry};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestEntity {
        id: String,
        value: u32,
    }

    fn entity(id: &str, value: u32) -> TestEntity {
        TestEntity {
            id: id.to_string(),
            value,
        }
    }

    #[test]
    fn test_jsonl_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.jsonl");
        let entities = vec![entity("1", 100), entity("2", 200)];

        let writer: JsonlWriter<TestEntity> = JsonlWriter::new(path.clone());
        assert_eq!(writer.write_all(&entities).unwrap(), 2);

        let reader: JsonlReader<TestEntity> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap(), entities);
    }

    #[test]
    fn test_jsonl_append() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("append.jsonl");

        let writer: JsonlWriter<TestEntity> = JsonlWriter::new(path.clone());
        writer.append(&entity("1", 1)).unwrap();
        writer.append(&entity("2", 2)).unwrap();

        let reader: JsonlReader<TestEntity> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_write_all_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("overwrite.jsonl");

        let writer: JsonlWriter<TestEntity> = JsonlWriter::new(path.clone());
        let reader: JsonlReader<TestEntity> = JsonlReader::new(path.clone());

        writer.write_all(&[entity("old", 1)]).unwrap();
        writer.write_all(&[entity("a", 2), entity("b", 3)]).unwrap();

        let read = reader.read_all().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].id, "a");
        assert!(!path.with_extension("jsonl.tmp").exists());
    }

    #[test]
    fn test_read_all_skips_bad_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad_lines.jsonl");

        std::fs::write(
            &path,
            r#"{"id":"1","value":1}
not-valid-json

{"id":"2","value":2}
"#,
        )
        .unwrap();

        let reader: JsonlReader<TestEntity> = JsonlReader::new(path);
        let entities = reader.read_all().unwrap();
        assert_eq!(entities, vec![entity("1", 1), entity("2", 2)]);
    }

    #[test]
    fn test_reader_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let reader: JsonlReader<TestEntity> =
            JsonlReader::new(temp_dir.path().join("nonexistent.jsonl"));
        assert!(!reader.exists());
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_entity_type_filenames() {
        assert_eq!(EntityType::Team.filename(), "teams.jsonl");
        assert_eq!(EntityType::Match.filename(), "matches.jsonl");
        assert_eq!(EntityType::Tournament.filename(), "tournaments.jsonl");
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::new(temp_dir.path().to_path_buf());

        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let team = Team::register(
            "ENG",
            "Southgate",
            &[RosterEntry::new("Kane", Position::Attacker).captain()],
            &mut rng,
        )
        .unwrap();
        let tournament = Tournament::new("Cup");
        let pairing = Pairing::new(
            Stage::QuarterFinals,
            0,
            team.id.clone(),
            TeamId::from("other"),
        );
        let record = MatchRecord::for_pairing(tournament.id.clone(), &pairing);

        {
            let store = JsonlStore::open(config.clone()).unwrap();
            store.put_team(&team).await.unwrap();
            store
                .increment_player_goals(&team.id, &team.players[0].id)
                .await
                .unwrap();
            store.create_tournament(&tournament).await.unwrap();
            store.append_qualified(&tournament.id, &team.id).await.unwrap();
            store.insert_if_absent(&record).await.unwrap();
            store.begin_resolution(&record.id).await.unwrap();
        }

        let reopened = JsonlStore::open(config).unwrap();
        assert_eq!(reopened.data_dir(), temp_dir.path());

        let stored_team = reopened.get_team(&team.id).await.unwrap();
        assert_eq!(stored_team.players[0].goals, 1);

        let stored_tournament = reopened.get_tournament(&tournament.id).await.unwrap();
        assert_eq!(stored_tournament.teams_qualified, vec![team.id.clone()]);
        assert_eq!(stored_tournament.revision, 1);

        let stored_match = reopened.get_match(&record.id).await.unwrap();
        assert_eq!(stored_match.status, MatchStatus::Live);
    }

    #[tokio::test]
    async fn test_delete_matches_persists() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::new(temp_dir.path().to_path_buf());
        let tournament = Tournament::new("Cup");
        let pairing = Pairing::new(
            Stage::QuarterFinals,
            0,
            TeamId::from("a"),
            TeamId::from("b"),
        );

        let store = JsonlStore::open(config.clone()).unwrap();
        store
            .insert_if_absent(&MatchRecord::for_pairing(tournament.id.clone(), &pairing))
            .await
            .unwrap();
        assert_eq!(store.delete_matches(&tournament.id).await.unwrap(), 1);

        let reader: JsonlReader<MatchRecord> = JsonlReader::new(config.matches_path());
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_player_edit_and_team_delete_persist() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::new(temp_dir.path().to_path_buf());

        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let roster = [
            RosterEntry::new("Kane", Position::Attacker).captain(),
            RosterEntry::new("Rice", Position::Midfielder),
        ];
        let england = Team::register("ENG", "Southgate", &roster, &mut rng).unwrap();
        let france = Team::register("FRA", "Deschamps", &roster, &mut rng).unwrap();
        let rice = england.players[1].id.clone();

        {
            let store = JsonlStore::open(config.clone()).unwrap();
            store.put_team(&england).await.unwrap();
            store.put_team(&france).await.unwrap();
            let edit = PlayerEdit {
                captain: Some(true),
                ..PlayerEdit::default()
            };
            store.update_player(&england.id, &rice, &edit).await.unwrap();
            store.delete_team(&france.id).await.unwrap();
        }

        let store = JsonlStore::open(config).unwrap();
        let stored = store.get_team(&england.id).await.unwrap();
        assert_eq!(stored.captain_id, Some(rice));
        assert_eq!(stored.players.iter().filter(|p| p.is_captain).count(), 1);
        assert!(matches!(
            store.get_team(&france.id).await,
            Err(StorageError::NotFound { .. })
        ));
    }
}
