use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use futureyou::{
    config::Config,
    pipeline::Orchestrator,
    reasoning::GeminiClient,
    storage::{SqliteMemoryBank, Timeline},
    SessionResult,
};

/// Simulate a decision across parallel future scenarios.
#[derive(Parser, Debug)]
#[command(name = "futureyou", version, about)]
struct Args {
    /// Path to a JSON request file with user_profile, decision and
    /// optionally timelines.
    #[arg(long, conflicts_with = "resume")]
    input: Option<PathBuf>,

    /// Resume a persisted session by id instead of starting a new run.
    #[arg(long)]
    resume: Option<String>,

    /// Write the result as JSON to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// On-disk shape of an `--input` request file.
#[derive(Debug, Deserialize)]
struct RunRequest {
    user_profile: serde_json::Value,
    decision: String,
    #[serde(default)]
    timelines: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "FutureYou decision simulator starting..."
    );

    // Initialize storage
    let memory = match SqliteMemoryBank::new(&config.database).await {
        Ok(m) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Arc::new(m)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Initialize reasoning client
    let client = match GeminiClient::new(&config.gemini, &config.request) {
        Ok(c) => {
            info!(base_url = %config.gemini.base_url, model = %config.gemini.model, "Gemini client initialized");
            Arc::new(c)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Gemini client");
            return Err(e.into());
        }
    };

    let orchestrator = Orchestrator::new(client, memory, config.request, config.simulation);

    let result = match (&args.input, &args.resume) {
        (_, Some(session_id)) => orchestrator.resume(session_id).await?,
        (Some(path), None) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read input file {}", path.display()))?;
            let request: RunRequest = serde_json::from_str(&raw)
                .with_context(|| format!("invalid request JSON in {}", path.display()))?;

            let timelines = if request.timelines.is_empty() {
                Timeline::defaults()
            } else {
                request.timelines.iter().map(Timeline::new).collect()
            };

            orchestrator
                .run(request.user_profile, &request.decision, &timelines)
                .await?
        }
        (None, None) => {
            eprintln!("Either --input <file> or --resume <session_id> is required");
            std::process::exit(2);
        }
    };

    emit_result(&result, args.output.as_deref())?;

    if let Some(failure) = &result.failure {
        error!(
            session_id = %result.session_id,
            stage = %failure.stage,
            detail = %failure.detail,
            "Run stopped before completion; resume with --resume"
        );
        std::process::exit(1);
    }

    info!(session_id = %result.session_id, "Run complete");
    Ok(())
}

fn emit_result(result: &SessionResult, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(result)?;
    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("failed to write result to {}", path.display()))?,
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        futureyou::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        futureyou::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
