use std::path::PathBuf;

use anyhow::{Context, Result};
use arbitration::{Adjudicator, ArbitrationEngine, EngineConfig, ScriptedAdjudicator};
use clap::Parser;
use review_agents::{process_stream, AgentsConfig, ChatCompletionsAdjudicator};
use tokio::io::{AsyncWrite, BufReader};
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSONL file of samples (defaults to stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// JSONL file for audits (defaults to stdout)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Engine configuration TOML
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay recorded answers instead of calling the endpoint
    #[arg(long)]
    replay: Option<PathBuf>,
}

fn build_adjudicator(args: &Args) -> Result<Box<dyn Adjudicator>> {
    if let Some(path) = &args.replay {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let document: serde_json::Value =
            serde_json::from_str(&raw).context("Replay file is not valid JSON")?;
        let scripted = ScriptedAdjudicator::from_replay(&document)?;
        info!(replay = %path.display(), "Using replay adjudicator");
        return Ok(Box::new(scripted));
    }

    let config = AgentsConfig::default();
    info!(
        url = %config.endpoint.url,
        model = %config.endpoint.model,
        "Using chat-completions adjudicator"
    );
    Ok(Box::new(ChatCompletionsAdjudicator::new(config.endpoint)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let engine_config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let adjudicator = build_adjudicator(&args)?;
    let engine = ArbitrationEngine::new(adjudicator.as_ref(), &engine_config);

    let mut writer: Box<dyn AsyncWrite + Unpin> = match &args.output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let stats = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            process_stream(&engine, BufReader::new(file), &mut writer).await?
        }
        None => process_stream(&engine, BufReader::new(tokio::io::stdin()), &mut writer).await?,
    };

    if stats.abandoned > 0 {
        anyhow::bail!(
            "{} of {} samples abandoned",
            stats.abandoned,
            stats.abandoned + stats.processed
        );
    }
    Ok(())
}
