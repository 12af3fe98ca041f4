//! Team model and roster registration.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{Player, PlayerId, Position, PositionRatings, TeamId, ValidationError};

/// Aggregate team statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub average_rating: u32,
    pub goals_scored: u32,
    pub goals_conceded: u32,
    pub eliminated: bool,
}

/// One line of a registration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub position: Position,
    #[serde(default)]
    pub captain: bool,
}

impl RosterEntry {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            position,
            captain: false,
        }
    }

    pub fn captain(mut self) -> Self {
        self.captain = true;
        self
    }
}

/// Parses `Name:POS` or `Name:POS:C` (the trailing flag marks the captain).
impl FromStr for RosterEntry {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let (name, position, flag) = match parts.as_slice() {
            [name, position] => (*name, *position, None),
            [name, position, flag] => (*name, *position, Some(*flag)),
            _ => {
                return Err(ValidationError::new(format!(
                    "expected NAME:POSITION[:C], got {s:?}"
                )))
            }
        };

        let entry = RosterEntry::new(name, position.parse()?);
        match flag {
            None => Ok(entry),
            Some(f) if f.eq_ignore_ascii_case("c") || f.eq_ignore_ascii_case("captain") => {
                Ok(entry.captain())
            }
            Some(f) => Err(ValidationError::new(format!("unknown roster flag: {f}"))),
        }
    }
}

/// Changes to one squad member. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEdit {
    pub name: Option<String>,
    pub position: Option<Position>,
    pub captain: Option<bool>,
}

/// A registered national team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,

    /// Federation code shown on fixtures (e.g. "ENG")
    pub label: String,

    pub manager: String,

    pub players: Vec<Player>,

    pub captain_id: Option<PlayerId>,

    pub stats: TeamStats,

    pub created_at: DateTime<Utc>,
}

impl Team {
    /// Register a team from a roster form, generating player ratings.
    pub fn register<R: Rng>(
        label: impl Into<String>,
        manager: impl Into<String>,
        roster: &[RosterEntry],
        rng: &mut R,
    ) -> Result<Self, ValidationError> {
        let label = label.into().trim().to_string();
        if label.is_empty() {
            return Err(ValidationError::new("team label must not be empty"));
        }
        if roster.is_empty() {
            return Err(ValidationError::new(format!(
                "team {label} must register at least one player"
            )));
        }
        if roster.iter().filter(|e| e.captain).count() > 1 {
            return Err(ValidationError::new(format!(
                "team {label} has more than one captain"
            )));
        }
        if let Some(blank) = roster.iter().position(|e| e.name.trim().is_empty()) {
            return Err(ValidationError::new(format!(
                "player #{} of team {label} has no name",
                blank + 1
            )));
        }

        let id = TeamId::random();
        let players: Vec<Player> = roster
            .iter()
            .map(|entry| {
                let ratings = PositionRatings::generate(entry.position, rng);
                Player::new(id.clone(), entry.name.trim(), entry.position, ratings)
                    .with_captaincy(entry.captain)
            })
            .collect();

        let captain_id = players.iter().find(|p| p.is_captain).map(|p| p.id.clone());

        let mut team = Self {
            id,
            label,
            manager: manager.into(),
            players,
            captain_id,
            stats: TeamStats::default(),
            created_at: Utc::now(),
        };
        team.stats.average_rating = team.average_rating();
        Ok(team)
    }

    /// Rounded mean of the players' overall ratings.
    pub fn average_rating(&self) -> u32 {
        if self.players.is_empty() {
            return 0;
        }
        let total: u32 = self.players.iter().map(|p| u32::from(p.overall_rating)).sum();
        (f64::from(total) / self.players.len() as f64).round() as u32
    }

    /// Check the one-captain invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let captains = self.players.iter().filter(|p| p.is_captain).count();
        if captains > 1 {
            return Err(ValidationError::new(format!(
                "team {} has {} captains",
                self.label, captains
            )));
        }
        if let Some(stray) = self.players.iter().find(|p| p.team_id != self.id) {
            return Err(ValidationError::new(format!(
                "player {} does not belong to team {}",
                stray.name, self.label
            )));
        }
        Ok(())
    }

    /// Rename, move or (un)captain one player.
    ///
    /// Handing the armband to a player takes it from whoever held it, so the
    /// one-captain invariant holds after every edit. Ratings are kept.
    pub fn update_player(&mut self, id: &PlayerId, edit: &PlayerEdit) -> Result<(), ValidationError> {
        let name = match &edit.name {
            Some(name) if name.trim().is_empty() => {
                return Err(ValidationError::new("player name must not be empty"))
            }
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };
        if self.player(id).is_none() {
            return Err(ValidationError::new(format!(
                "player {} is not in team {}",
                id, self.label
            )));
        }

        match edit.captain {
            Some(true) => {
                for p in &mut self.players {
                    p.is_captain = &p.id == id;
                }
                self.captain_id = Some(id.clone());
            }
            Some(false) => {
                if self.captain_id.as_ref() == Some(id) {
                    self.captain_id = None;
                }
            }
            None => {}
        }

        if let Some(player) = self.player_mut(id) {
            if let Some(name) = name {
                player.name = name;
            }
            if let Some(position) = edit.position {
                player.position = position;
            }
            if edit.captain == Some(false) {
                player.is_captain = false;
            }
        }
        self.validate()
    }

    pub fn captain(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_captain)
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    pub fn find_player_by_name(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.answers_to(name))
    }

    /// Player names in squad order, truncated to `limit` (the starting XI).
    pub fn roster_names(&self, limit: usize) -> Vec<String> {
        self.players
            .iter()
            .map(|p| p.name.clone())
            .filter(|n| !n.trim().is_empty())
            .take(limit)
            .collect()
    }

    /// Top scorers first, ties broken by name.
    pub fn scorers(&self) -> Vec<&Player> {
        let mut scorers: Vec<&Player> = self.players.iter().filter(|p| p.goals > 0).collect();
        scorers.sort_by(|a, b| b.goals.cmp(&a.goals).then_with(|| a.name.cmp(&b.name)));
        scorers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry::new("Jordan Pickford", Position::Goalkeeper),
            RosterEntry::new("John Stones", Position::Defender),
            RosterEntry::new("Declan Rice", Position::Midfielder),
            RosterEntry::new("Harry Kane", Position::Attacker).captain(),
        ]
    }

    #[test]
    fn test_register_builds_roster() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let team = Team::register(" ENG ", "Southgate", &roster(), &mut rng).unwrap();

        assert_eq!(team.label, "ENG");
        assert_eq!(team.players.len(), 4);
        assert!(team.players.iter().all(|p| p.team_id == team.id));
        assert_eq!(team.captain().unwrap().name, "Harry Kane");
        assert_eq!(team.captain_id.as_ref(), Some(&team.captain().unwrap().id));
        assert_eq!(team.stats.average_rating, team.average_rating());
        assert!(!team.stats.eliminated);
        assert!(team.validate().is_ok());
    }

    #[test]
    fn test_register_rejects_two_captains() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut entries = roster();
        entries[0].captain = true;
        assert!(Team::register("ENG", "Southgate", &entries, &mut rng).is_err());
    }

    #[test]
    fn test_register_rejects_empty_inputs() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(Team::register("", "m", &roster(), &mut rng).is_err());
        assert!(Team::register("ENG", "m", &[], &mut rng).is_err());
        let blank = vec![RosterEntry::new("  ", Position::Defender)];
        assert!(Team::register("ENG", "m", &blank, &mut rng).is_err());
    }

    #[test]
    fn test_roster_names_limit() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let team = Team::register("ENG", "m", &roster(), &mut rng).unwrap();
        assert_eq!(
            team.roster_names(2),
            vec!["Jordan Pickford".to_string(), "John Stones".to_string()]
        );
        assert!(team.find_player_by_name("harry kane").is_some());
    }

    #[test]
    fn test_scorers_sorted() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut team = Team::register("ENG", "m", &roster(), &mut rng).unwrap();
        team.players[3].goals = 2;
        team.players[2].goals = 1;
        let names: Vec<_> = team.scorers().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Harry Kane", "Declan Rice"]);
    }

    #[test]
    fn test_roster_entry_from_str() {
        let kane: RosterEntry = "Harry Kane:AT:C".parse().unwrap();
        assert_eq!(kane, RosterEntry::new("Harry Kane", Position::Attacker).captain());

        let rice: RosterEntry = " Declan Rice : mf ".parse().unwrap();
        assert_eq!(rice, RosterEntry::new("Declan Rice", Position::Midfielder));

        assert!("Kane".parse::<RosterEntry>().is_err());
        assert!("Kane:ST".parse::<RosterEntry>().is_err());
        assert!("Kane:AT:vice".parse::<RosterEntry>().is_err());
    }

    #[test]
    fn test_update_player_moves_captaincy() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut team = Team::register("ENG", "m", &roster(), &mut rng).unwrap();
        let rice = team.players[2].id.clone();
        let ratings = team.players[2].ratings;

        let edit = PlayerEdit {
            name: Some(" Declan Rice Jr ".to_string()),
            position: Some(Position::Defender),
            captain: Some(true),
        };
        team.update_player(&rice, &edit).unwrap();

        assert_eq!(team.players.iter().filter(|p| p.is_captain).count(), 1);
        assert_eq!(team.captain().unwrap().id, rice);
        assert_eq!(team.captain_id, Some(rice.clone()));
        assert!(!team.players[3].is_captain);

        let player = team.player(&rice).unwrap();
        assert_eq!(player.name, "Declan Rice Jr");
        assert_eq!(player.position, Position::Defender);
        assert_eq!(player.ratings, ratings);
        assert!(team.validate().is_ok());
    }

    #[test]
    fn test_update_player_drops_captaincy() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut team = Team::register("ENG", "m", &roster(), &mut rng).unwrap();
        let kane = team.players[3].id.clone();
        let stones = team.players[1].id.clone();

        // un-captaining someone else leaves the armband where it is
        let off = PlayerEdit {
            captain: Some(false),
            ..PlayerEdit::default()
        };
        team.update_player(&stones, &off).unwrap();
        assert_eq!(team.captain_id, Some(kane.clone()));

        team.update_player(&kane, &off).unwrap();
        assert!(team.captain().is_none());
        assert!(team.captain_id.is_none());
    }

    #[test]
    fn test_update_player_rejects_bad_edits() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut team = Team::register("ENG", "m", &roster(), &mut rng).unwrap();
        let before = team.clone();
        let keeper = team.players[0].id.clone();

        let blank = PlayerEdit {
            name: Some("   ".to_string()),
            captain: Some(true),
            ..PlayerEdit::default()
        };
        assert!(team.update_player(&keeper, &blank).is_err());
        assert!(team
            .update_player(&PlayerId::from("ghost"), &PlayerEdit::default())
            .is_err());
        assert_eq!(team, before);
    }

    #[test]
    fn test_validate_catches_second_captain() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut team = Team::register("ENG", "m", &roster(), &mut rng).unwrap();
        team.players[0].is_captain = true;
        assert!(team.validate().is_err());
    }
}
