mod config;
mod telemetry;

use clap::{Parser, Subcommand};
use config::Config;
use gateway::AppState;
use ingest::scheduler::Scheduler;
use ingest::{
    FetchError, GithubClient, IngestError, PubDevClient, ScoreIngestor, StatsIngestor,
};
use serde_json::json;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use store::config::ProcessEnv;
use store::{ConfigRegistry, SeedOutcome, Storage};

#[derive(Parser)]
#[command(version, about = "Tracks package scores and repository stats")]
struct Cli {
    /// YAML configuration file. Built-in defaults apply when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve package data and the management API.
    Serve,
    /// Fetch registry scores for every tracked package once.
    IngestScores,
    /// Fetch repository stats for every mapped package once.
    IngestStats,
    /// Write the default repo mappings if none are stored.
    InitMappings,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("could not create upstream client: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("gateway stopped: {0}")]
    Serve(#[from] gateway::api::ServeError),
    #[error("admin listener stopped: {0}")]
    Admin(#[from] std::io::Error),
    #[error("could not encode output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("failed to initialize repository mappings")]
    InitFailed,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = telemetry::init(&config.common);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: CliCommand, config: Config) -> Result<(), CliError> {
    let storage = Storage::connect(&config.store, &config.defaults, &ProcessEnv);
    let registry = ConfigRegistry::new(storage, config.defaults.clone());

    match command {
        CliCommand::Serve => serve(config, registry).await,
        CliCommand::IngestScores => {
            let report = score_ingestor(&config, &registry)?.run().await?;
            print_json(&json!({
                "message": format!("Data fetched for {} packages", report.updated),
                "report": report,
            }))
        }
        CliCommand::IngestStats => {
            let (report, batch) = stats_ingestor(&config, &registry)?.run().await?;
            print_json(&json!({
                "message": format!("GitHub data fetched for {} packages", report.updated),
                "report": report,
                "data": batch,
            }))
        }
        CliCommand::InitMappings => {
            let (message, mappings) = match registry.seed_repo_mappings().await {
                Some(SeedOutcome::Seeded(m)) => ("Repository mappings initialized successfully", m),
                Some(SeedOutcome::Existing(m)) => ("Repository mappings already exist", m),
                None => return Err(CliError::InitFailed),
            };
            print_json(&json!({ "message": message, "mappings": mappings }))
        }
    }
}

async fn serve(config: Config, registry: ConfigRegistry) -> Result<(), CliError> {
    match registry.seed_repo_mappings().await {
        Some(SeedOutcome::Seeded(_)) => tracing::info!("seeded default repo mappings"),
        Some(SeedOutcome::Existing(_)) => {}
        None => tracing::warn!("could not seed default repo mappings"),
    }

    let scheduler = Scheduler::start(
        &config.schedule,
        Arc::new(score_ingestor(&config, &registry)?),
        Arc::new(stats_ingestor(&config, &registry)?),
    );
    if scheduler.is_empty() {
        tracing::info!("no ingestion schedule configured, relying on external triggers");
    }

    let tier = registry.storage().tier();
    let app = gateway::router(AppState::new(registry, config.gateway.clone()));

    match config.admin_listener {
        Some(admin) => {
            let admin_service =
                AdminService::<_, std::io::Error>::new(move || tier.as_str().to_string());
            tokio::select! {
                result = gateway::serve(config.listener, app) => result?,
                result = run_http_service(&admin.host, admin.port, admin_service) => result?,
            }
        }
        None => gateway::serve(config.listener, app).await?,
    }

    Ok(())
}

fn score_ingestor(config: &Config, registry: &ConfigRegistry) -> Result<ScoreIngestor, CliError> {
    let client = PubDevClient::new(&config.upstreams.score_url, config.upstreams.timeout())?;
    Ok(ScoreIngestor::new(
        registry.clone(),
        Arc::new(client),
        &config.upstreams,
    ))
}

fn stats_ingestor(config: &Config, registry: &ConfigRegistry) -> Result<StatsIngestor, CliError> {
    let token = config.upstreams.resolve_github_token(&ProcessEnv);
    if token.is_none() {
        tracing::debug!("no GitHub token configured, using unauthenticated rate limits");
    }

    let client = GithubClient::new(
        &config.upstreams.github_url,
        token.as_deref(),
        config.upstreams.timeout(),
    )?;
    Ok(StatsIngestor::new(
        registry.clone(),
        Arc::new(client),
        &config.upstreams,
    ))
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
