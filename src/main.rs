use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

use timetable_normalizer::app::{LoadReport, LoadUseCase, NormalizeUseCase, RunSummary};
use timetable_normalizer::config::Config;
use timetable_normalizer::infra::{read_timetable, InMemoryStore, JsonFileSink, JsonRowSource};
use timetable_normalizer::constants;
use timetable_normalizer::logging;
use timetable_normalizer::pipeline::{EntityNormalizer, WriteThrottle};
use timetable_normalizer::types::{EntityKind, Timetable};

#[derive(Parser)]
#[command(name = "timetable_normalizer")]
#[command(about = "Normalize wide-format bus timetables into relational record sets")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (defaults to timetable.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize the row source and write one JSON file per entity kind
    Extract {
        /// JSON array of row objects exported from the spreadsheet
        #[arg(long)]
        input: Option<PathBuf>,
        /// Directory for the normalized JSON files
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Load previously extracted JSON files into the record store
    Seed {
        /// Directory holding the normalized JSON files
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Run extract and seed sequentially
    Run {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Extract { .. } => "extract",
            Commands::Seed { .. } => "seed",
            Commands::Run { .. } => "run",
        }
    }
}

fn extract(config: &Config) -> anyhow::Result<Timetable> {
    println!("🔄 Normalizing {}...", config.input.path.display());

    let use_case = NormalizeUseCase::new(
        Box::new(JsonRowSource::new(&config.input.path)),
        EntityNormalizer::new(config.normalize_options()),
        Box::new(JsonFileSink::new(&config.output.dir)),
    );
    let (timetable, summary) = use_case.run()?;
    print_summary(&summary, config);
    Ok(timetable)
}

fn print_summary(summary: &RunSummary, config: &Config) {
    println!("✅ Data extraction complete! ({} rows from {})", summary.rows, summary.source);
    println!("{}", summary.counts);
    println!("\nOutput files created in {}:", config.output.dir.display());
    for kind in EntityKind::LOAD_ORDER {
        println!("   - {}.json", kind.table_name());
    }
}

async fn seed(config: &Config, timetable: &Timetable) -> anyhow::Result<LoadReport> {
    println!("🌱 Seeding record store...");

    let store = Arc::new(InMemoryStore::new());
    let mut use_case = LoadUseCase::new(store);
    for kind in EntityKind::LOAD_ORDER {
        let limits = config.throttle_limits(kind);
        if !limits.is_unlimited() {
            info!("Throttling {} writes: {:?}", kind.table_name(), limits);
            use_case = use_case.with_throttle(kind, WriteThrottle::new(limits));
        }
    }

    let report = use_case.load(timetable).await?;
    println!("\n📊 Seed results:");
    print!("{report}");
    if report.is_complete() {
        println!("✅ All records written");
    } else {
        warn!("{} records were not written", report.failures.len());
        println!("⚠️  {} records were not written", report.failures.len());
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let _log_guard = logging::init_logging(Path::new(constants::LOG_DIR));

    let cli = Cli::parse();
    let span = logging::run_span(cli.command.name());
    execute(cli).instrument(span).await
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .or_else(|| std::env::var("TIMETABLE_CONFIG").ok().map(PathBuf::from));
    let mut config = Config::load(config_path.as_deref())?;

    match cli.command {
        Commands::Extract { input, output_dir } => {
            apply_overrides(&mut config, input, output_dir);
            if let Err(e) = extract(&config) {
                error!("Extraction failed: {}", e);
                return Err(e);
            }
        }
        Commands::Seed { output_dir } => {
            apply_overrides(&mut config, None, output_dir);
            let timetable = read_timetable(&config.output.dir)?;
            seed(&config, &timetable).await?;
        }
        Commands::Run { input, output_dir } => {
            apply_overrides(&mut config, input, output_dir);
            let timetable = extract(&config)?;
            seed(&config, &timetable).await?;
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, input: Option<PathBuf>, output_dir: Option<PathBuf>) {
    if let Some(input) = input {
        config.input.path = input;
    }
    if let Some(output_dir) = output_dir {
        config.output.dir = output_dir;
    }
}
