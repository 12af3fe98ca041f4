use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use knockout_cup::bracket::AdvanceOutcome;
use knockout_cup::config::AppConfig;
use knockout_cup::narrative::ai::AiNarrativeSource;
use knockout_cup::narrative::backend::create_backend;
use knockout_cup::parse_duration;
use knockout_cup::resolver::MatchResolver;
use knockout_cup::storage::{JsonlStore, MemoryStore, StorageConfig, Store};
use knockout_cup::tournament::TournamentService;
use knockout_cup::{
    Bracket, MatchId, MatchRecord, PlayerEdit, PlayerId, Position, RosterEntry, Score, Stage,
    Team, TeamId, Tournament, TournamentId,
};

#[derive(Parser)]
#[command(name = "knockout-cup")]
#[command(about = "Eight-team football knockout cup with simulated matches")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Data directory path (overrides the configuration file)
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a whole cup in memory with eight built-in teams
    Simulate {
        /// Seed for reproducible results
        #[arg(long)]
        seed: Option<u64>,

        /// Print every match's commentary
        #[arg(long)]
        commentary: bool,
    },

    /// Create a tournament
    CreateTournament { name: String },

    /// Register a team
    AddTeam {
        /// Federation code (e.g. "ENG")
        #[arg(long)]
        label: String,

        #[arg(long, default_value = "")]
        manager: String,

        /// Player as NAME:POSITION[:C], repeatable (positions GK, DF, MD, AT)
        #[arg(long = "player", required = true)]
        players: Vec<RosterEntry>,
    },

    /// Rename, move or (un)captain a player
    EditPlayer {
        team: String,

        player: String,

        #[arg(long)]
        name: Option<String>,

        /// New position (GK, DF, MD, AT)
        #[arg(long)]
        position: Option<Position>,

        /// Hand the armband to this player (`--captain false` takes it away)
        #[arg(long)]
        captain: Option<bool>,
    },

    /// Delete a team and its players
    DeleteTeam { team: String },

    /// Qualify a registered team for a tournament
    Qualify { tournament: String, team: String },

    /// Seed the bracket and create the quarter-finals
    Start { tournament: String },

    /// Resolve one match (Ctrl-C cancels and resets it)
    Play { match_id: String },

    /// Enter a result by hand, e.g. `2-1` or `1-1 --penalties 4-3`
    RecordResult {
        match_id: String,

        score: Score,

        #[arg(long)]
        penalties: Option<Score>,
    },

    /// Move to the next stage if the current one is complete
    Advance {
        tournament: String,

        /// Keep advancing at an interval until the cup is completed
        #[arg(long)]
        watch: bool,

        /// Polling interval (e.g., "500ms", "5s", "1m")
        #[arg(long, default_value = "5s")]
        interval: String,
    },

    /// Play every remaining match until a champion is crowned
    Run { tournament: String },

    /// Clear the bracket and all matches of a tournament
    Reset { tournament: String },

    /// Return a match of the active stage to upcoming
    ResetMatch { match_id: String },

    /// Show a tournament's bracket
    Show { tournament: String },

    /// List a tournament's matches
    Matches {
        tournament: String,

        /// Only this stage (e.g. "qf", "semi finals")
        #[arg(long)]
        stage: Option<Stage>,
    },

    /// Print a match's commentary
    Commentary { match_id: String },

    /// List registered teams
    Teams,

    /// List tournaments
    Tournaments,
}

/// Teams used by `simulate`.
const DEMO_TEAMS: [(&str, &str, [&str; 5]); 8] = [
    ("ENG", "Southgate", ["Pickford", "Stones", "Walker", "Rice", "Kane"]),
    ("BRA", "Dorival", ["Alisson", "Marquinhos", "Militao", "Paqueta", "Vinicius"]),
    ("ARG", "Scaloni", ["Martinez", "Romero", "Otamendi", "De Paul", "Messi"]),
    ("FRA", "Deschamps", ["Maignan", "Saliba", "Kounde", "Griezmann", "Mbappe"]),
    ("GER", "Nagelsmann", ["Neuer", "Rudiger", "Tah", "Kroos", "Havertz"]),
    ("ESP", "De la Fuente", ["Simon", "Laporte", "Carvajal", "Rodri", "Morata"]),
    ("ITA", "Spalletti", ["Donnarumma", "Bastoni", "Di Lorenzo", "Barella", "Retegui"]),
    ("NED", "Koeman", ["Verbruggen", "Van Dijk", "Ake", "De Jong", "Gakpo"]),
];

fn demo_roster(names: &[&str; 5]) -> Vec<RosterEntry> {
    let positions = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Defender,
        Position::Midfielder,
        Position::Attacker,
    ];
    names
        .iter()
        .zip(positions)
        .enumerate()
        .map(|(i, (name, position))| {
            let entry = RosterEntry::new(*name, position);
            if i == names.len() - 1 {
                entry.captain()
            } else {
                entry
            }
        })
        .collect()
}

async fn build_resolver(config: &AppConfig) -> MatchResolver {
    let resolver = MatchResolver::new(config.simulation.clone());
    if !config.narrative.enabled {
        return resolver;
    }

    let backend = match create_backend(&config.narrative) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!("Narrative backend unavailable ({}); using random fallback", e);
            return resolver;
        }
    };

    match backend.health_check().await {
        Ok(true) => {
            tracing::info!(
                "Narrative backend {} ready (model {})",
                backend.name(),
                config.narrative.model
            );
            resolver.with_narrative(Arc::new(AiNarrativeSource::new(Arc::from(backend))))
        }
        Ok(false) | Err(_) => {
            tracing::warn!(
                "Narrative backend {} not reachable; using random fallback",
                backend.name()
            );
            resolver
        }
    }
}

async fn team_labels(service: &TournamentService) -> Result<HashMap<TeamId, String>> {
    Ok(service
        .list_teams()
        .await?
        .into_iter()
        .map(|t| (t.id, t.label))
        .collect())
}

fn label<'a>(labels: &'a HashMap<TeamId, String>, id: &'a TeamId) -> &'a str {
    labels.get(id).map(String::as_str).unwrap_or(id.as_str())
}

fn print_bracket(tournament: &Tournament, labels: &HashMap<TeamId, String>) {
    println!("=== {} ({}) ===", tournament.name, tournament.stage);
    println!("ID: {}", tournament.id);
    println!(
        "Qualified: {}",
        tournament
            .teams_qualified
            .iter()
            .map(|t| label(labels, t))
            .collect::<Vec<_>>()
            .join(", ")
    );

    for stage in [Stage::QuarterFinals, Stage::SemiFinals, Stage::Final] {
        println!("\n{}:", stage);
        let pairings = tournament.bracket.pairings(stage);
        for slot in 0..stage.fixture_count() {
            match pairings.iter().find(|p| p.slot == slot) {
                Some(p) => println!(
                    "  {}{}: {} vs {}",
                    stage.short_code(),
                    slot + 1,
                    label(labels, &p.home),
                    label(labels, &p.away)
                ),
                None => println!(
                    "  {}{}: {}",
                    stage.short_code(),
                    slot + 1,
                    Bracket::placeholder(stage, slot)
                ),
            }
        }
    }

    if let Some(champion) = &tournament.champion {
        println!("\nChampion: {}", label(labels, champion));
    }
}

fn print_roster(team: &Team) {
    for p in &team.players {
        println!(
            "  [{}] {:<20} {} overall {}{}",
            p.id,
            p.name,
            p.position,
            p.overall_rating,
            if p.is_captain { " (C)" } else { "" }
        );
    }
}

fn print_match(record: &MatchRecord, labels: &HashMap<TeamId, String>) {
    let penalties = record
        .penalty_score
        .map(|p| format!(" ({p} pens)"))
        .unwrap_or_default();
    let winner = record
        .winner
        .as_ref()
        .map(|w| format!("  winner {}", label(labels, w)))
        .unwrap_or_default();
    println!(
        "  [{}] {}{} {} {} {}{}  {}{}",
        record.id,
        record.stage.short_code(),
        record.slot + 1,
        label(labels, &record.home_team),
        record.score,
        label(labels, &record.away_team),
        penalties,
        record.status,
        winner
    );
}

fn print_commentary(record: &MatchRecord) {
    for event in &record.commentary {
        println!("    {}", event);
    }
}

async fn open_service(config: &AppConfig) -> Result<TournamentService> {
    let storage = StorageConfig::new(config.data_dir.clone());
    let store = JsonlStore::open(storage)
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    let store: Arc<dyn Store> = Arc::new(store);
    Ok(TournamentService::new(store, build_resolver(config).await))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(Path::new(&cli.config))
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(cli.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!("Starting knockout-cup v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Simulate { seed, commentary } => {
            if seed.is_some() {
                config.simulation.seed = seed;
            }
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let service = TournamentService::new(store, build_resolver(&config).await);

            let cup = service.create_tournament("Exhibition Cup").await?;
            for (code, manager, names) in &DEMO_TEAMS {
                let team = service
                    .register_team(code, manager, &demo_roster(names))
                    .await?;
                service.qualify_team(&cup.id, &team.id).await?;
            }
            service.start_tournament(&cup.id).await?;
            let done = service.run_to_completion(&cup.id).await?;

            let labels = team_labels(&service).await?;
            print_bracket(&done, &labels);
            println!("\nResults:");
            for record in service.list_matches(&cup.id, None).await? {
                print_match(&record, &labels);
                if commentary {
                    print_commentary(&record);
                }
            }

            println!("\nTop scorers:");
            let mut scorers: Vec<(String, String, u32)> = service
                .list_teams()
                .await?
                .iter()
                .flat_map(|t| {
                    t.scorers()
                        .into_iter()
                        .map(|p| (p.name.clone(), t.label.clone(), p.goals))
                        .collect::<Vec<_>>()
                })
                .collect();
            scorers.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
            for (name, team, goals) in scorers.iter().take(5) {
                println!("  {:<14} {:<4} {}", name, team, goals);
            }
        }
        Commands::CreateTournament { name } => {
            let service = open_service(&config).await?;
            let tournament = service.create_tournament(&name).await?;
            println!("Created tournament {} ({})", tournament.name, tournament.id);
        }
        Commands::AddTeam {
            label,
            manager,
            players,
        } => {
            let service = open_service(&config).await?;
            let team = service.register_team(&label, &manager, &players).await?;
            println!("Registered {} ({})", team.label, team.id);
            print_roster(&team);
            println!("Average rating: {}", team.stats.average_rating);
        }
        Commands::EditPlayer {
            team,
            player,
            name,
            position,
            captain,
        } => {
            let service = open_service(&config).await?;
            let edit = PlayerEdit {
                name,
                position,
                captain,
            };
            let team = service
                .update_player(&TeamId::from(team), &PlayerId::from(player), &edit)
                .await?;
            print_roster(&team);
        }
        Commands::DeleteTeam { team } => {
            let service = open_service(&config).await?;
            service.delete_team(&TeamId::from(team.clone())).await?;
            println!("Deleted team {team}");
        }
        Commands::Qualify { tournament, team } => {
            let service = open_service(&config).await?;
            let t = service
                .qualify_team(&TournamentId::from(tournament), &TeamId::from(team))
                .await?;
            println!(
                "{}: {}/8 teams qualified",
                t.name,
                t.teams_qualified.len()
            );
        }
        Commands::Start { tournament } => {
            let service = open_service(&config).await?;
            let t = service
                .start_tournament(&TournamentId::from(tournament))
                .await?;
            print_bracket(&t, &team_labels(&service).await?);
        }
        Commands::Play { match_id } => {
            let service = open_service(&config).await?;
            let id = MatchId::from(match_id);

            let runner = service.clone();
            let play_id = id.clone();
            let mut play = tokio::spawn(async move { runner.play_match(&play_id).await });

            let result = tokio::select! {
                joined = &mut play => joined?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, cancelling match {}", id);
                    service.cancel_match(&id).await;
                    play.await?
                }
            };

            let record = result?;
            let labels = team_labels(&service).await?;
            print_match(&record, &labels);
            print_commentary(&record);
        }
        Commands::RecordResult {
            match_id,
            score,
            penalties,
        } => {
            let service = open_service(&config).await?;
            let record = service
                .record_result(&MatchId::from(match_id), score, penalties)
                .await?;
            print_match(&record, &team_labels(&service).await?);
        }
        Commands::Advance {
            tournament,
            watch,
            interval,
        } => {
            let service = open_service(&config).await?;
            let id = TournamentId::from(tournament);
            let Some(period) = parse_duration(&interval) else {
                bail!("invalid interval: {interval}");
            };

            loop {
                let advancement = service.advance(&id).await?;
                match &advancement.outcome {
                    AdvanceOutcome::Advanced { from, to, .. } => {
                        println!("Advanced {} -> {}", from, to);
                    }
                    AdvanceOutcome::Pending { stage, remaining } => {
                        println!("{}: {} matches still to finish", stage, remaining);
                    }
                    AdvanceOutcome::Idle => {
                        println!("Nothing to advance ({})", advancement.tournament.stage);
                    }
                }

                if !watch || advancement.tournament.stage == Stage::Completed {
                    if advancement.tournament.stage == Stage::Completed {
                        print_bracket(&advancement.tournament, &team_labels(&service).await?);
                    }
                    break;
                }
                tokio::time::sleep(period).await;
            }
        }
        Commands::Run { tournament } => {
            let service = open_service(&config).await?;
            let done = service
                .run_to_completion(&TournamentId::from(tournament))
                .await?;
            print_bracket(&done, &team_labels(&service).await?);
        }
        Commands::Reset { tournament } => {
            let service = open_service(&config).await?;
            let t = service
                .reset_tournament(&TournamentId::from(tournament))
                .await?;
            println!("{} reset to {}", t.name, t.stage);
        }
        Commands::ResetMatch { match_id } => {
            let service = open_service(&config).await?;
            let record = service.reset_match(&MatchId::from(match_id)).await?;
            print_match(&record, &team_labels(&service).await?);
        }
        Commands::Show { tournament } => {
            let service = open_service(&config).await?;
            let t = service
                .get_tournament(&TournamentId::from(tournament))
                .await?;
            print_bracket(&t, &team_labels(&service).await?);
        }
        Commands::Matches { tournament, stage } => {
            let service = open_service(&config).await?;
            let labels = team_labels(&service).await?;
            let matches = service
                .list_matches(&TournamentId::from(tournament), stage)
                .await?;
            if matches.is_empty() {
                println!("No matches.");
            }
            for record in &matches {
                print_match(record, &labels);
            }
        }
        Commands::Commentary { match_id } => {
            let service = open_service(&config).await?;
            let record = service.get_match(&MatchId::from(match_id)).await?;
            print_match(&record, &team_labels(&service).await?);
            print_commentary(&record);
        }
        Commands::Teams => {
            let service = open_service(&config).await?;
            for team in service.list_teams().await? {
                println!(
                    "  [{}] {:<4} {:<16} rating {:>3}  GF {:>2} GA {:>2}{}",
                    team.id,
                    team.label,
                    team.manager,
                    team.stats.average_rating,
                    team.stats.goals_scored,
                    team.stats.goals_conceded,
                    if team.stats.eliminated { "  eliminated" } else { "" }
                );
            }
        }
        Commands::Tournaments => {
            let service = open_service(&config).await?;
            for t in service.list_tournaments().await? {
                println!(
                    "  [{}] {} ({}, {} teams)",
                    t.id,
                    t.name,
                    t.stage,
                    t.teams_qualified.len()
                );
            }
        }
    }

    Ok(())
}
