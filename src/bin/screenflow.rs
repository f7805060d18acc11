//! JSON-in/JSON-out CLI over the screenflow library.
//!
//! The gateway is built from `OPENAI_API_KEY` / `OPENAI_BASE_URL`; usage
//! lines go to stderr, results to the output file or stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use screenflow::{
    batch::{self, BatchOptions, Profile, WorkItem},
    decision::{self, DecisionInput, DecisionOptions},
    gateway::OracleGateway,
    prep::{self, PrepOptions, PrepState},
    search::NoopSearchProvider,
};

#[derive(Parser)]
#[command(name = "screenflow", about = "Batch scoring and analysis pipelines over an LLM oracle")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score a list of work items against a candidate profile.
    BatchScore {
        /// Input JSON: {"profile": {...}, "items": [...]}
        #[arg(long)]
        input: PathBuf,
        /// Output path; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 20)]
        group_size: usize,
        #[arg(long, default_value_t = 3)]
        concurrency: usize,
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,
    },
    /// Build an interview preparation pack.
    Prep {
        /// Input JSON: a PrepState seed (company, role, experience_years, ...).
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 240)]
        deadline_secs: u64,
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,
    },
    /// Produce a hiring recommendation.
    Decide {
        /// Input JSON: a DecisionInput document.
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,
    },
}

#[derive(Deserialize)]
struct BatchScoreRequest {
    profile: Profile,
    items: Vec<WorkItem>,
}

async fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

async fn emit(
    out: Option<PathBuf>,
    value: &impl serde::Serialize,
) -> Result<(), Box<dyn std::error::Error>> {
    let rendered = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => tokio::fs::write(path, rendered).await?,
        None => println!("{rendered}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let gateway = Arc::new(OracleGateway::from_env()?);
    let search = Arc::new(NoopSearchProvider);

    match cli.command {
        Command::BatchScore {
            input,
            out,
            group_size,
            concurrency,
            model,
        } => {
            let request: BatchScoreRequest = read_json(&input).await?;
            let options = BatchOptions {
                group_size,
                max_concurrency: concurrency,
                model,
                ..BatchOptions::default()
            };
            let outcome = batch::score_batch(gateway, &request.profile, request.items, options).await;
            emit(out, &outcome).await?;
        }
        Command::Prep {
            input,
            out,
            deadline_secs,
            model,
        } => {
            let state: PrepState = read_json(&input).await?;
            let options = PrepOptions {
                model,
                deadline: Duration::from_secs(deadline_secs),
                ..PrepOptions::default()
            };
            let run = prep::prepare_interview(gateway, search, state, options).await;
            emit(out, &run.state).await?;
        }
        Command::Decide { input, out, model } => {
            let request: DecisionInput = read_json(&input).await?;
            let options = DecisionOptions {
                model,
                ..DecisionOptions::default()
            };
            let outcome = decision::recommend(gateway, search, request, options).await;
            emit(out, &outcome).await?;
        }
    }
    Ok(())
}
