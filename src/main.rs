// src/main.rs
// orbit-chaos CLI - batch runs, reclassification and reports

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use orbit_chaos::batch::{BatchOrchestrator, BatchOutcome};
use orbit_chaos::config::{self, AnalysisConfig};
use orbit_chaos::exponent::{ExponentComputer, Thresholds};
use orbit_chaos::oracle::ProcessOracle;
use orbit_chaos::report;
use orbit_chaos::sequence::{self, MoveSequence};
use orbit_chaos::store::{JsonDirStore, RecordStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "orbit-chaos")]
#[command(about = "Lyapunov-like sensitivity analysis of move-sequence periods")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.orbit-chaos/config.toml)
    #[arg(long, global = true, env = "ORBIT_CONFIG")]
    config: Option<PathBuf>,

    /// Records directory, overriding config and environment
    #[arg(long, global = true)]
    records_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute exponents for a set of base sequences
    Run(RunArgs),

    /// Re-derive every stored classification from its stored exponent
    Reclassify {
        /// Lower edge of strongly chaotic
        #[arg(long)]
        weak: Option<f64>,
        /// Lower edge of extremely chaotic
        #[arg(long)]
        strong: Option<f64>,
    },

    /// Write summary JSON and CSV for stored records and print the summary
    Summarize {
        /// Output directory (default: the records directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ratio spectrum, move patterns and divergence data
    Analyze {
        /// Output directory (default: the records directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration and validation report
    CheckConfig,
}

#[derive(Args)]
struct RunArgs {
    /// Comma-separated sequences, e.g. FR,UF OR,RO,UF
    sequences: Vec<String>,

    /// Also generate this many random sequences
    #[arg(long)]
    random: Option<usize>,

    /// Shortest random sequence
    #[arg(long, default_value = "2")]
    min_length: usize,

    /// Longest random sequence
    #[arg(long, default_value = "6")]
    max_length: usize,

    /// Every ordered pair of the 12 base moves
    #[arg(long)]
    pairs: bool,

    /// Every base move composed with itself
    #[arg(long)]
    self_compositions: bool,
}

fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut config = config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.records_dir {
        config.store.records_dir = Some(dir.clone());
    }

    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if !validation.is_valid() {
        bail!("invalid configuration\n{}", validation.report());
    }
    Ok(config)
}

/// Base sequences named on the command line plus any generated sets
fn collect_sequences(
    config: &AnalysisConfig,
    args: &RunArgs,
    seed: u64,
) -> Result<Vec<MoveSequence>> {
    let mut sequences = args
        .sequences
        .iter()
        .map(|raw| sequence::parse_sequence(raw))
        .collect::<orbit_chaos::Result<Vec<_>>>()?;

    if args.pairs || args.self_compositions {
        let grid = config.grid_alphabet()?;
        if args.pairs {
            sequences.extend(sequence::all_pairs(&grid));
        }
        if args.self_compositions {
            sequences.extend(sequence::self_compositions(&grid));
        }
    }
    if let Some(count) = args.random {
        let mut rng = StdRng::seed_from_u64(seed);
        sequences.extend(sequence::random_batch(
            count,
            args.min_length,
            args.max_length,
            &config.perturbation_alphabet()?,
            true,
            &mut rng,
        )?);
    }

    if sequences.is_empty() {
        bail!("no sequences given; pass sequences or use --random, --pairs, --self-compositions");
    }
    Ok(sequences)
}

async fn run_batch(config: &AnalysisConfig, args: RunArgs) -> Result<()> {
    let seed = config.resolve_seed();
    let sequences = collect_sequences(config, &args, seed)?;
    info!(config = %config.summary(), seed, "Starting analysis");

    let oracle = Arc::new(ProcessOracle::new(&config.oracle)?);
    let computer = ExponentComputer::new(
        oracle,
        config.perturbation_engine()?,
        config.exponent_config(seed),
    );
    let store = Arc::new(JsonDirStore::open(config.records_dir()).await?);
    let orchestrator = BatchOrchestrator::new(
        Arc::new(computer),
        store,
        config.sequence_alphabet()?,
        config.batch_config(),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning in-flight sequences");
            on_signal.cancel();
        }
    });

    let outcome = orchestrator.run(sequences, cancel).await?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &BatchOutcome) {
    println!("{}", outcome.summary());
    for record in &outcome.records {
        println!(
            "  {:<30} λ={:.4}  {}",
            record.sequence_rendered, record.exponent, record.classification
        );
    }
    if !outcome.failures.is_empty() {
        println!("Failures:");
        for failure in &outcome.failures {
            println!("  {}", failure);
        }
    }
}

async fn run_reclassify(config: &AnalysisConfig, weak: Option<f64>, strong: Option<f64>) -> Result<()> {
    let thresholds = Thresholds::new(
        weak.unwrap_or(config.classification.weak),
        strong.unwrap_or(config.classification.strong),
    )?;
    let store = JsonDirStore::open(config.records_dir()).await?;
    let report = store.reclassify_all(&thresholds).await?;
    println!(
        "Reclassified {} of {} records (weak={}, strong={})",
        report.updated, report.total, thresholds.weak, thresholds.strong
    );
    Ok(())
}

async fn run_summarize(config: &AnalysisConfig, output: Option<PathBuf>) -> Result<()> {
    let store = JsonDirStore::open(config.records_dir()).await?;
    let records = store.load_all().await?;
    let summary = report::summarize(&records);

    let output = output.unwrap_or_else(|| store.dir().to_path_buf());
    tokio::fs::create_dir_all(&output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;
    report::write_summary(&output.join("lyapunov_summary.json"), &summary).await?;
    report::write_csv(&output.join("lyapunov_results.csv"), &records).await?;

    print!("{}", report::render_summary(&summary));
    Ok(())
}

async fn run_analyze(config: &AnalysisConfig, output: Option<PathBuf>) -> Result<()> {
    let store = JsonDirStore::open(config.records_dir()).await?;
    let records = store.load_all().await?;
    let analysis = report::analyze(&records);

    let output = output.unwrap_or_else(|| store.dir().to_path_buf());
    tokio::fs::create_dir_all(&output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;
    tokio::fs::write(
        output.join("extended_analysis.json"),
        serde_json::to_string_pretty(&analysis)?,
    )
    .await?;
    tokio::fs::write(
        output.join("divergence_vs_lambda.csv"),
        report::analysis::divergence_csv(&analysis.divergence),
    )
    .await?;

    print!("{}", report::render_analysis(&analysis));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then project - project overrides)
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".orbit-chaos/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        match &cli.command {
            Commands::Run(_) | Commands::Reclassify { .. } => Level::INFO,
            Commands::Summarize { .. } | Commands::Analyze { .. } | Commands::CheckConfig => {
                Level::WARN
            }
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run(args) => run_batch(&config, args).await?,
        Commands::Reclassify { weak, strong } => run_reclassify(&config, weak, strong).await?,
        Commands::Summarize { output } => run_summarize(&config, output).await?,
        Commands::Analyze { output } => run_analyze(&config, output).await?,
        Commands::CheckConfig => {
            println!("{}", config.summary());
            println!("records: {}", config.records_dir().display());
            println!("{}", config.validate().report());
        }
    }

    Ok(())
}
