//! Reasonbench CLI
//!
//! Runs every prompt set against every configured (provider, model) and
//! writes a timestamped results file.
//!
//! Usage:
//!   cargo run -p reasonbench -- [OPTIONS]
//!
//! Examples:
//!   cargo run -p reasonbench -- --list                 # Show prompt sets, models and the graph
//!   cargo run -p reasonbench -- --prompt cubes         # Run one prompt set
//!   cargo run -p reasonbench -- --workflow reflective  # Verify-and-revise loop
//!   cargo run -p reasonbench -- --concurrency 4 -o markdown

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use reasonbench::{
    outcome_channel, sink::results_path, BenchmarkRunner, BenchmarkSummary, OutputFormat,
    PromptLibrary, Reporter, ResultSink, RunLogLayer, RunnerConfig,
};
use reasonbench_agent::{load_dotenv, BenchConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "reasonbench")]
#[command(about = "Benchmark LLM providers on a multi-step reasoning workflow")]
struct Cli {
    /// Provider config path (searches for reasonbench.toml if not specified)
    #[arg(short, long, env = "REASONBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of prompt set JSON files
    #[arg(long, env = "REASONBENCH_PROMPTS", default_value = "prompts")]
    prompts_dir: PathBuf,

    /// Run a single prompt set by name
    #[arg(short, long)]
    prompt: Option<String>,

    /// Run only the named provider
    #[arg(long)]
    provider: Option<String>,

    /// Workflow: reasoning, reflective, calculator
    #[arg(short, long, default_value = "reasoning")]
    workflow: String,

    /// Runs in flight at once
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Per-run timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Run triples again even if already run in this invocation
    #[arg(long)]
    rerun: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Terminal)]
    output: OutputFormat,

    /// Do not write a results file
    #[arg(long)]
    no_save: bool,

    /// Do not write per-model log files
    #[arg(long)]
    no_logs: bool,

    /// Print verbose output during benchmark execution
    #[arg(short, long)]
    verbose: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// List prompt sets, models and the workflow graph, then exit
    #[arg(long)]
    list: bool,
}

fn init_tracing(verbose: bool, format: LogFormat, run_logs: Option<RunLogLayer>) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter).with(run_logs);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing and tracing, so .env can supply RUST_LOG and REASONBENCH_* flags
    let env_file = load_dotenv();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let run_logs = if cli.no_logs || cli.list {
        None
    } else {
        Some(RunLogLayer::new(&config.output.logs_dir).with_context(|| {
            format!("creating log directory {}", config.output.logs_dir.display())
        })?)
    };
    init_tracing(cli.verbose, cli.log_format, run_logs);
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    run_bench(cli, config).await
}

fn load_config(cli: &Cli) -> Result<BenchConfig> {
    let mut config = match cli.config {
        Some(ref path) => BenchConfig::load_from_path(path)?,
        None => BenchConfig::load()?,
    };

    if let Some(ref name) = cli.provider {
        if config.provider(name).is_none() {
            anyhow::bail!("Provider '{}' is not configured", name);
        }
        config.providers.retain(|p| &p.name == name);
    }

    if config.providers.is_empty() {
        anyhow::bail!("No providers configured. Add [[providers]] entries to reasonbench.toml");
    }
    Ok(config)
}

fn load_prompts(cli: &Cli) -> Result<PromptLibrary> {
    let library = PromptLibrary::load_dir(&cli.prompts_dir)
        .with_context(|| format!("loading prompt sets from {}", cli.prompts_dir.display()))?;

    let library = match cli.prompt {
        Some(ref name) => library.only(name).ok_or_else(|| {
            anyhow::anyhow!(
                "Prompt set '{}' not found. Available: {}",
                name,
                library.names().join(", ")
            )
        })?,
        None => library,
    };

    if library.is_empty() {
        anyhow::bail!("No prompt sets found in {}", cli.prompts_dir.display());
    }
    Ok(library)
}

async fn run_bench(cli: Cli, config: BenchConfig) -> Result<()> {
    let format = cli.output;
    let reporter = Reporter::new(format);

    let library = load_prompts(&cli)?;

    let runner_config = RunnerConfig {
        concurrency: cli.concurrency,
        workflow: cli.workflow.clone(),
        run_timeout: cli.timeout.map(Duration::from_secs),
    };
    let runner = BenchmarkRunner::with_defaults(runner_config)?;

    if cli.list {
        println!("Prompt sets:");
        for name in library.names() {
            println!("  - {}", name);
        }
        println!("\nProviders:");
        for provider in &config.providers {
            println!("  {} ({:?})", provider.name, provider.kind);
            for model in &provider.models {
                println!("    - {}", model);
            }
        }
        println!("\nWorkflow '{}':\n{}", runner.workflow().name(), runner.workflow().to_mermaid());
        return Ok(());
    }

    let path = (!cli.no_save).then(|| results_path(&config.output.results_dir, Utc::now()));

    if matches!(format, OutputFormat::Terminal) {
        let models: usize = config.providers.iter().map(|p| p.models.len()).sum();
        println!("\n=== Reasonbench ===");
        println!("Workflow: {}", runner.workflow().name());
        println!("Prompt sets: {} | Models: {}", library.len(), models);
        if let Some(ref path) = path {
            println!("Results: {}", path.display());
        }
        if !cli.no_logs {
            println!("Logs: {}", config.output.logs_dir.display());
        }
        println!();
    }

    let mut sink = ResultSink::new(runner.workflow().name(), path);
    if matches!(format, OutputFormat::Terminal) {
        sink = sink.with_progress(reporter);
    }
    let (tx, rx) = outcome_channel();
    let sink_handle = tokio::spawn(sink.consume(rx));

    let run_result = runner
        .run_all(library.sets(), &config.providers, cli.rerun, Some(&tx))
        .await;
    drop(tx);
    let document = sink_handle.await.context("result sink task panicked")?;
    let records = run_result?;

    let summary = BenchmarkSummary::from_records(&records);
    println!("{}", reporter.summary(&summary));

    if cli.verbose && !matches!(format, OutputFormat::Terminal) {
        println!("{}", reporter.results(&records));
    }

    tracing::debug!(records = document.results.len(), "Benchmark complete");
    Ok(())
}
