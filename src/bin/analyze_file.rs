use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rustyreader::analysis::{AnalysisPipeline, PipelineSettings};
use rustyreader::config::Config;
use rustyreader::documents::{DirectoryDocumentSource, DocumentSource};
use rustyreader::metrics::AnalysisMetrics;
use rustyreader::summarization::build_completion_client;

#[derive(Parser)]
#[command(
    name = "analyze-file",
    about = "Run the document analysis pipeline outside the server"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a text file and print the consolidated analysis as JSON.
    Run {
        #[arg(long)]
        file: PathBuf,
        /// Override ANALYSIS_CHUNK_MAX_CHARS.
        #[arg(long)]
        chunk_chars: Option<usize>,
        /// Override ANALYSIS_SAMPLE_COUNT.
        #[arg(long)]
        samples: Option<usize>,
        /// Seed chunk sampling for reproducible runs.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List cached document ids.
    Documents {
        #[arg(long, default_value = "uploads")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            file,
            chunk_chars,
            samples,
            seed,
        } => analyze(file, chunk_chars, samples, seed).await,
        Command::Documents { dir } => list_documents(dir).await,
    }
}

async fn analyze(
    file: PathBuf,
    chunk_chars: Option<usize>,
    samples: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("failed to load configuration")?;
    let text = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut settings = PipelineSettings::from_config(&config);
    if let Some(chunk_chars) = chunk_chars {
        if chunk_chars == 0 {
            bail!("--chunk-chars must be greater than zero");
        }
        settings.max_chunk_chars = chunk_chars;
    }
    if let Some(samples) = samples {
        settings.sample_count = samples;
    }
    settings.sample_seed = seed.or(settings.sample_seed);

    let client = build_completion_client(&config).context("failed to build summarization client")?;
    let metrics = Arc::new(AnalysisMetrics::new());
    let pipeline = AnalysisPipeline::new(client, settings, Arc::clone(&metrics));
    let analysis = pipeline
        .run(&text)
        .await
        .with_context(|| format!("analysis of {} failed", file.display()))?;

    println!("{}", serde_json::to_string_pretty(&analysis)?);
    let snapshot = metrics.snapshot();
    eprintln!(
        "chunk calls: {} succeeded, {} failed",
        snapshot.chunk_calls_succeeded, snapshot.chunk_calls_failed
    );
    Ok(())
}

async fn list_documents(dir: PathBuf) -> Result<()> {
    let source = DirectoryDocumentSource::new(dir);
    let ids = source
        .list()
        .await
        .with_context(|| format!("failed to list {}", source.root().display()))?;
    for id in ids {
        println!("{id}");
    }
    Ok(())
}
