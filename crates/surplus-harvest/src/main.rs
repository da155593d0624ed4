//! # Surplus Harvest CLI (`svh`)
//!
//! The `svh` binary drives the connector pipeline: database setup, manual
//! and periodic connector runs, and inspection of run history, ingested
//! cases, and audit events.
//!
//! ## Usage
//!
//! ```bash
//! svh --config ./config/svh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `svh init` | Create the SQLite database and run schema migrations |
//! | `svh sources` | List connectors and their aggregated health |
//! | `svh sync <connector>` | Run one connector (`GA-FULTON`) or `all` |
//! | `svh runs` | List run rows, most recent first |
//! | `svh cases` | List ingested canonical case records |
//! | `svh audits` | List locally captured audit events |
//! | `svh watch` | Run cycles periodically until interrupted |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use surplus_harvest::config::{load_config, Config};
use surplus_harvest::orchestrator::Orchestrator;
use surplus_harvest::registry::ConnectorRegistry;
use surplus_harvest::scrapyd::ScrapydClient;
use surplus_harvest::sqlite_store::{SqliteRunStore, SqliteStateStore};
use surplus_harvest::{db, migrate, sources, worker};

use surplus_harvest_core::jurisdiction::JurisdictionSet;
use surplus_harvest_core::models::ConnectorKey;
use surplus_harvest_core::store::{RunQuery, RunStore, StateStore};

/// Surplus Harvest — connector orchestration and ingestion for county
/// excess-funds listings.
#[derive(Parser)]
#[command(
    name = "svh",
    about = "Surplus Harvest — connector orchestration and ingestion pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/svh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// List connectors and their aggregated status.
    Sources,

    /// Run one connector (`STATE-COUNTY`, e.g. `GA-FULTON`) or `all` for a
    /// full cycle with retry.
    Sync {
        connector: String,
    },

    /// List run rows, most recent first.
    Runs {
        /// Filter by connector id (spider name).
        #[arg(long)]
        connector: Option<String>,

        /// Only runs whose stats mention this case reference.
        #[arg(long)]
        case_ref: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// List ingested canonical case records.
    Cases,

    /// List locally captured audit events.
    Audits,

    /// Run connector cycles periodically until interrupted.
    Watch,
}

fn build_orchestrator(config: &Config, pool: sqlx::SqlitePool) -> Result<Arc<Orchestrator>> {
    let registry = Arc::new(ConnectorRegistry::from_config(config));
    let state = Arc::new(SqliteStateStore::new(pool.clone()));
    let runs = Arc::new(SqliteRunStore::new(pool));
    let jobs = Arc::new(ScrapydClient::new(&config.scrapyd)?);

    let gate = if config.jurisdictions.is_empty() {
        Arc::new(JurisdictionSet::permissive())
    } else {
        Arc::new(JurisdictionSet::from_flags(config.jurisdictions.iter().map(
            |entry| {
                (
                    entry.state.clone(),
                    entry.county_code.clone(),
                    entry.enabled,
                )
            },
        )))
    };

    Ok(Arc::new(Orchestrator::new(registry, state, runs, jobs, gate)))
}

fn parse_connector_key(spec: &str) -> Result<ConnectorKey> {
    match spec.split_once('-') {
        Some((state, county)) if !state.is_empty() && !county.is_empty() => {
            Ok(ConnectorKey::new(state, county))
        }
        _ => bail!("connector must be STATE-COUNTY, e.g. GA-FULTON (got '{}')", spec),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized {}", config.db.path.display());
        }

        Commands::Sources => {
            let pool = db::connect(&config).await?;
            let orchestrator = build_orchestrator(&config, pool)?;
            sources::list_sources(&orchestrator).await?;
        }

        Commands::Sync { connector } => {
            let pool = db::connect(&config).await?;
            let orchestrator = build_orchestrator(&config, pool)?;

            if connector == "all" {
                let outcomes = orchestrator
                    .run_all_connectors_with_backoff(config.retry)
                    .await?;
                println!("cycle complete: {} connectors", outcomes.len());
                for outcome in outcomes {
                    println!(
                        "  {:<14} job {}  extracted {}  created {}",
                        outcome.connector.canonical(),
                        outcome.job_id,
                        outcome.extracted,
                        outcome.created
                    );
                }
            } else {
                let key = parse_connector_key(&connector)?;
                let connector = orchestrator
                    .registry()
                    .get(&key)
                    .cloned()
                    .with_context(|| format!("unknown connector {}", key.canonical()))?;
                let outcome = orchestrator.run_connector(&connector).await?;
                println!("sync {}", outcome.connector.canonical());
                println!("  job: {}", outcome.job_id);
                println!("  extracted: {}", outcome.extracted);
                println!("  created: {}", outcome.created);
                println!("ok");
            }
        }

        Commands::Runs {
            connector,
            case_ref,
            limit,
        } => {
            let pool = db::connect(&config).await?;
            let orchestrator = build_orchestrator(&config, pool)?;
            let runs = orchestrator
                .runs()
                .list_runs(RunQuery {
                    connector_id: connector,
                    case_ref,
                    limit,
                })
                .await?;

            for run in runs {
                println!(
                    "{}  {:<14} {:<24} {:<8} attempt {}  {}",
                    run.started_at.format("%Y-%m-%dT%H:%M:%SZ"),
                    run.key.canonical(),
                    run.connector_id,
                    run.status.as_str(),
                    run.attempt_count,
                    run.error_message.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Cases => {
            let pool = db::connect(&config).await?;
            let orchestrator = build_orchestrator(&config, pool)?;
            let cases = orchestrator.state().list_cases().await?;

            for case in &cases {
                println!(
                    "{}  {:<14} property {}  sale {}",
                    case.case_ref,
                    case.connector.canonical(),
                    case.property_id,
                    case.sale_date.as_deref().unwrap_or("unknown")
                );
            }
            println!("{} cases", cases.len());
        }

        Commands::Audits => {
            let pool = db::connect(&config).await?;
            let orchestrator = build_orchestrator(&config, pool)?;
            let audits = orchestrator.state().list_audits().await?;

            for audit in &audits {
                println!(
                    "{}  {:<14} {:<24} {}",
                    audit.at.format("%Y-%m-%dT%H:%M:%SZ"),
                    audit.connector.canonical(),
                    audit.event.as_str(),
                    audit.payload
                );
            }
        }

        Commands::Watch => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            let orchestrator = build_orchestrator(&config, pool)?;
            worker::run_worker(orchestrator, config.worker.clone(), config.retry).await?;
        }
    }

    Ok(())
}
