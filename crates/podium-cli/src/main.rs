//! Podium - tournament scoring CLI
//!
//! The `podium` command drives the scoring core against the configured
//! SurrealDB store and prints every result as JSON.
//!
//! ## Commands
//!
//! - `tournament put`: register a tournament and its class
//! - `event ensure` / `event validate`: event identity
//! - `score submit`: record judge scores and recompute the event
//! - `recompute` / `standings`: ranking of one event
//! - `tie begin` / `tie resolve`: manual podium tie-break
//! - `points`: payout lookup, no store needed

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use podium_core::{
    points, CategoryType, Competitor, CompetitorId, CoreConfig, EventId, JudgeScores,
    OperationSpan, Provenance, ScoringService, TournamentClass, TournamentId, PODIUM_MAX_RANK,
};
use podium_state::{PodiumStore, SurrealScoreStore, TournamentRecord, TournamentStore};
use serde_json::{json, Value};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "podium")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tournament scoring: ranks, points and podium tie-breaks", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Core configuration file (JSON); `PODIUM_*` variables override it
    #[arg(long, global = true, env = "PODIUM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Commands {
    /// Manage tournaments
    Tournament {
        #[command(subcommand)]
        action: TournamentAction,
    },

    /// Event identity operations
    Event {
        #[command(subcommand)]
        action: EventAction,
    },

    /// Score operations
    Score {
        #[command(subcommand)]
        action: ScoreAction,
    },

    /// Recompute ranks and points for an event
    Recompute {
        /// Event id
        #[arg(long)]
        event: String,
    },

    /// Show the current standings of an event
    Standings {
        /// Event id
        #[arg(long)]
        event: String,
    },

    /// Manual tie-break of a podium tie
    Tie {
        #[command(subcommand)]
        action: TieAction,
    },

    /// Look up the points paid for a rank
    Points {
        /// Final rank (1-based)
        #[arg(long)]
        rank: u32,

        /// Tournament class (AAA, AA, A, B, C)
        #[arg(long, value_parser = parse_class)]
        class: TournamentClass,

        /// Number of competitors in the event
        #[arg(long)]
        field: usize,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum TournamentAction {
    /// Create or replace a tournament
    Put {
        /// Tournament id
        #[arg(long)]
        id: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Tournament class (AAA, AA, A, B, C)
        #[arg(long, value_parser = parse_class)]
        class: TournamentClass,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum EventAction {
    /// Return the event for (tournament, category), creating it if needed
    Ensure {
        #[arg(long)]
        tournament: String,

        #[arg(long)]
        category: String,
    },

    /// Check that an event id is well formed and present
    Validate {
        /// Event id
        event: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum ScoreAction {
    /// Record one competitor's judge scores
    Submit {
        #[arg(long)]
        tournament: String,

        #[arg(long)]
        category: String,

        #[arg(long)]
        competitor: String,

        /// Display name, defaults to the competitor id
        #[arg(long)]
        name: Option<String>,

        /// How the competitor entered the roster: registered, walk-in, imported
        #[arg(long, default_value = "registered", value_parser = parse_provenance)]
        provenance: Provenance,

        /// Judge A score
        #[arg(long)]
        judge_a: f64,

        /// Judge B score
        #[arg(long)]
        judge_b: f64,

        /// Judge C score
        #[arg(long)]
        judge_c: f64,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum TieAction {
    /// Put the tie at a podium rank up for selection
    Begin {
        /// Event id
        #[arg(long)]
        event: String,

        /// Shared rank of the tie
        #[arg(long)]
        rank: u32,
    },

    /// Apply a chosen order to a tie awaiting selection
    Resolve {
        /// Event id
        #[arg(long)]
        event: String,

        /// Shared rank of the tie
        #[arg(long)]
        rank: u32,

        /// Every member but one, best first (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        winners: Vec<String>,
    },
}

impl Commands {
    fn op_name(&self) -> &'static str {
        match self {
            Commands::Tournament { .. } => "tournament.put",
            Commands::Event {
                action: EventAction::Ensure { .. },
            } => "event.ensure",
            Commands::Event {
                action: EventAction::Validate { .. },
            } => "event.validate",
            Commands::Score { .. } => "score.submit",
            Commands::Recompute { .. } => "event.recompute",
            Commands::Standings { .. } => "event.standings",
            Commands::Tie {
                action: TieAction::Begin { .. },
            } => "tie.begin",
            Commands::Tie {
                action: TieAction::Resolve { .. },
            } => "tie.resolve",
            Commands::Points { .. } => "points",
        }
    }
}

fn parse_class(raw: &str) -> std::result::Result<TournamentClass, String> {
    raw.parse().map_err(|e: podium_core::points::UnknownClass| e.to_string())
}

fn parse_provenance(raw: &str) -> std::result::Result<Provenance, String> {
    raw.parse().map_err(|e: podium_core::ValidationError| e.to_string())
}

fn load_config(path: Option<&PathBuf>) -> Result<CoreConfig> {
    let base = match path {
        Some(path) => CoreConfig::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => CoreConfig::default(),
    };
    base.with_overrides(|var| std::env::var(var).ok())
        .context("invalid PODIUM_* override")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    podium_core::init_tracing(cli.json, level);

    let _span = OperationSpan::enter(cli.command.op_name(), "cli");

    let output = match cli.command {
        Commands::Points { rank, class, field } => points_report(rank, class, field),
        command => {
            let config = load_config(cli.config.as_ref())?;
            let store = SurrealScoreStore::from_env()
                .await
                .context("Failed to connect to Podium database")?;
            let service = ScoringService::new(Arc::new(store), config);
            execute(&service, command).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Run one store-backed command and return its JSON report.
async fn execute<S>(service: &ScoringService<S>, command: Commands) -> Result<Value>
where
    S: PodiumStore + ?Sized,
{
    match command {
        Commands::Tournament {
            action: TournamentAction::Put { id, name, class },
        } => {
            let id = TournamentId::new(id)?;
            let record = TournamentRecord {
                tournament_id: id.to_string(),
                name,
                class: class.to_string(),
            };
            service
                .store()
                .put_tournament(record.clone())
                .await
                .context("failed to store tournament")?;
            info!(tournament_id = %id, class = %class, "tournament stored");
            Ok(serde_json::to_value(record)?)
        }
        Commands::Event {
            action: EventAction::Ensure {
                tournament,
                category,
            },
        } => {
            let event_id = service
                .guard()
                .get_or_create(&TournamentId::new(tournament)?, &CategoryType::new(category)?)
                .await?;
            Ok(json!({ "event_id": event_id }))
        }
        Commands::Event {
            action: EventAction::Validate { event },
        } => Ok(serde_json::to_value(service.guard().validate(&event).await?)?),
        Commands::Score {
            action:
                ScoreAction::Submit {
                    tournament,
                    category,
                    competitor,
                    name,
                    provenance,
                    judge_a,
                    judge_b,
                    judge_c,
                },
        } => {
            let judge_scores = JudgeScores::new(judge_a, judge_b, judge_c)?;
            let id = CompetitorId::new(competitor)?;
            let entry = Competitor {
                display_name: name.unwrap_or_else(|| id.as_str().to_string()),
                id,
                provenance,
            };
            let submission = service
                .submit_entry(
                    &TournamentId::new(tournament)?,
                    &CategoryType::new(category)?,
                    &entry,
                    judge_scores,
                )
                .await?;
            Ok(serde_json::to_value(submission)?)
        }
        Commands::Recompute { event } => {
            let outcome = service.recompute_event(&EventId::parse(&event)?).await?;
            Ok(serde_json::to_value(outcome)?)
        }
        Commands::Standings { event } => {
            let standings = service.standings(&EventId::parse(&event)?).await?;
            Ok(serde_json::to_value(standings)?)
        }
        Commands::Tie {
            action: TieAction::Begin { event, rank },
        } => {
            let event_id = EventId::parse(&event)?;
            let resolver = service.resolver();
            let group = resolver.current_group(&event_id, rank).await?;
            let members = resolver.begin_resolution(&event_id, &group).await?;
            Ok(json!({ "group": group, "members": members }))
        }
        Commands::Tie {
            action:
                TieAction::Resolve {
                    event,
                    rank,
                    winners,
                },
        } => {
            let event_id = EventId::parse(&event)?;
            let resolver = service.resolver();
            let group = resolver.current_group(&event_id, rank).await?;
            let resolved = resolver.resolve(&event_id, &group, &winners).await?;
            Ok(json!({ "group": group, "resolved": resolved }))
        }
        Commands::Points { rank, class, field } => Ok(points_report(rank, class, field)),
    }
}

fn points_report(rank: u32, class: TournamentClass, field: usize) -> Value {
    json!({
        "rank": rank,
        "class": class,
        "field_size": field,
        "podium": (1..=PODIUM_MAX_RANK).contains(&rank),
        "points": points(rank, class, field),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use podium_state::fakes::MemoryStore;

    fn service() -> ScoringService<MemoryStore> {
        ScoringService::new(Arc::new(MemoryStore::new()), CoreConfig::default())
    }

    fn submit(competitor: &str, each: f64) -> Commands {
        Commands::Score {
            action: ScoreAction::Submit {
                tournament: "spring-open".into(),
                category: "kata".into(),
                competitor: competitor.into(),
                name: None,
                provenance: Provenance::Registered,
                judge_a: each,
                judge_b: each,
                judge_c: each,
            },
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_tie_resolve_splits_winners() {
        let cli = Cli::try_parse_from([
            "podium",
            "tie",
            "resolve",
            "--event",
            "0d7c1f6e-8a2b-4c3d-9e4f-5a6b7c8d9e01",
            "--rank",
            "1",
            "--winners",
            "cat,ann",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Tie {
                action: TieAction::Resolve {
                    event: "0d7c1f6e-8a2b-4c3d-9e4f-5a6b7c8d9e01".into(),
                    rank: 1,
                    winners: vec!["cat".into(), "ann".into()],
                },
            }
        );
    }

    #[test]
    fn test_parse_class_is_case_insensitive_and_strict() {
        let cli = Cli::try_parse_from([
            "podium", "points", "--rank", "2", "--class", "aa", "--field", "8",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Points {
                rank: 2,
                class: TournamentClass::AA,
                field: 8
            }
        );
        assert!(
            Cli::try_parse_from(["podium", "points", "--rank", "1", "--class", "Z", "--field", "3"])
                .is_err()
        );
    }

    #[test]
    fn test_parse_score_submit_provenance() {
        let args = |provenance: &'static str| {
            [
                "podium", "score", "submit", "--tournament", "t-1", "--category", "kata",
                "--competitor", "c-1", "--provenance", provenance, "--judge-a", "9",
                "--judge-b", "8", "--judge-c", "9",
            ]
        };
        let cli = Cli::try_parse_from(args("walk-in")).unwrap();
        match cli.command {
            Commands::Score {
                action:
                    ScoreAction::Submit {
                        name, provenance, ..
                    },
            } => {
                assert_eq!(name, None);
                assert_eq!(provenance, Provenance::WalkIn);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(args("guest")).is_err());
    }

    #[test]
    fn test_points_report() {
        let report = points_report(1, TournamentClass::C, 3);
        assert_eq!(report["points"], 1);
        assert_eq!(report["podium"], true);
        assert_eq!(points_report(4, TournamentClass::AAA, 10)["points"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tie_break_end_to_end() {
        let service = service();
        execute(
            &service,
            Commands::Tournament {
                action: TournamentAction::Put {
                    id: "spring-open".into(),
                    name: "Spring Open".into(),
                    class: TournamentClass::C,
                },
            },
        )
        .await
        .unwrap();

        let mut last = Value::Null;
        for (who, each) in [("dan", 5.0), ("eve", 5.0), ("fay", 4.0)] {
            last = execute(&service, submit(who, each)).await.unwrap();
        }
        let event = last["event_id"].as_str().unwrap().to_string();
        assert_eq!(last["recompute"]["pending_ties"][0]["base_rank"], 1);

        let begun = execute(
            &service,
            Commands::Tie {
                action: TieAction::Begin {
                    event: event.clone(),
                    rank: 1,
                },
            },
        )
        .await
        .unwrap();
        assert_eq!(begun["members"].as_array().unwrap().len(), 2);

        let resolved = execute(
            &service,
            Commands::Tie {
                action: TieAction::Resolve {
                    event: event.clone(),
                    rank: 1,
                    winners: vec!["eve".into()],
                },
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved["resolved"][0]["competitor_id"], "eve");
        assert_eq!(resolved["resolved"][0]["points_earned"], 1);
        assert_eq!(resolved["resolved"][1]["final_rank"], 2);

        let standings = execute(&service, Commands::Standings { event })
            .await
            .unwrap();
        let order: Vec<_> = standings["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["competitor_id"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["eve", "dan", "fay"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_commands_report_identity() {
        let service = service();
        let ensure = || Commands::Event {
            action: EventAction::Ensure {
                tournament: "spring-open".into(),
                category: "kata".into(),
            },
        };
        let first = execute(&service, ensure()).await.unwrap();
        let second = execute(&service, ensure()).await.unwrap();
        assert_eq!(first, second);

        let event = first["event_id"].as_str().unwrap().to_string();
        let valid = execute(
            &service,
            Commands::Event {
                action: EventAction::Validate { event },
            },
        )
        .await
        .unwrap();
        assert_eq!(valid["valid"], true);

        let invalid = execute(
            &service,
            Commands::Event {
                action: EventAction::Validate {
                    event: "not-an-id".into(),
                },
            },
        )
        .await
        .unwrap();
        assert_eq!(invalid["valid"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_for_unknown_tournament_fails() {
        let err = execute(&service(), submit("dan", 5.0)).await.unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");
    }
}
