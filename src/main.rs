use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use jmdict_install::config::InstallConfig;
use jmdict_install::install::{open_database, Corpus, InstallReport, Installer};
use jmdict_install::kanjidic::{load_characters, open_characters};
use jmdict_install::lexicon::{load_lexicon, open_lexicon};
use jmdict_install::schema::{self, KANJIDIC_SCHEMA, LEXICON_SCHEMA};
use jmdict_install::ImportError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "jmdict-install")]
#[command(about = "Install JMdict and KANJIDIC2 dictionary files into SQLite")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON config file with `jmdict`, `kanjidic2` and `database` keys
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a JMdict lexicon file
    Lexicon(InstallArgs),
    /// Install a KANJIDIC2 character file
    Kanji(InstallArgs),
}

#[derive(Args)]
struct InstallArgs {
    /// Path to the dictionary file (.xml or .bz2); defaults to the config value
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// SQLite database file; defaults to the config value
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Schema file to run instead of the bundled one
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Decode only - don't touch the database
    #[arg(long)]
    dry_run: bool,

    /// Decode every record into memory before inserting
    #[arg(long)]
    eager: bool,

    /// With --dry-run, print the Nth record (1-based) as JSON
    #[arg(long, requires = "dry_run")]
    show: Option<usize>,

    /// Show a progress spinner
    #[arg(long)]
    progress: bool,
}

struct Plan {
    input: PathBuf,
    database: PathBuf,
    schema: String,
}

impl Plan {
    fn resolve(corpus: Corpus, args: &InstallArgs, config: &InstallConfig) -> Result<Self> {
        let input = args.input.clone().unwrap_or_else(|| match corpus {
            Corpus::Lexicon => PathBuf::from(&config.lexicon_file),
            Corpus::Kanjidic => PathBuf::from(&config.kanjidic_file),
        });
        let database = args
            .database
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.database.connection));
        let schema = match &args.schema {
            Some(path) => schema::load_schema(path)?,
            None => match corpus {
                Corpus::Lexicon => LEXICON_SCHEMA.to_string(),
                Corpus::Kanjidic => KANJIDIC_SCHEMA.to_string(),
            },
        };
        Ok(Self {
            input,
            database,
            schema,
        })
    }
}

fn dry_run<T, I>(corpus: Corpus, records: I, show: Option<usize>) -> Result<()>
where
    T: Serialize,
    I: IntoIterator<Item = Result<T, ImportError>>,
{
    let start = Instant::now();
    let mut count = 0usize;
    for record in records {
        let record = record?;
        count += 1;
        if show == Some(count) {
            let json = serde_json::to_string_pretty(&record)
                .context("Failed to serialize record")?;
            println!("{json}");
        }
    }

    if let Some(n) = show {
        if n == 0 || n > count {
            bail!("Record {n} out of range, the file holds {count} records");
        }
    }

    info!(
        %corpus,
        records = count,
        duration_secs = start.elapsed().as_secs_f64(),
        "Dry run complete"
    );
    println!("Decoded {count} {corpus} records, nothing written");
    Ok(())
}

fn print_report(report: &InstallReport, database: &Path) {
    println!(
        "Installed {} {} records ({} rows) into {} in {:.2}s",
        report.records,
        report.corpus,
        report.stats.rows,
        database.display(),
        report.elapsed.as_secs_f64()
    );
    for (table, rows) in report.stats.busiest(5) {
        println!("  {table:<26} {rows:>10}");
    }
}

fn run_install(corpus: Corpus, args: InstallArgs, config: &InstallConfig) -> Result<()> {
    let plan = Plan::resolve(corpus, &args, config)?;
    info!(%corpus, input = %plan.input.display(), "Starting install");

    if args.dry_run {
        return match corpus {
            Corpus::Lexicon => dry_run(corpus, open_lexicon(&plan.input)?, args.show),
            Corpus::Kanjidic => dry_run(corpus, open_characters(&plan.input)?, args.show),
        };
    }

    let mut conn = open_database(&plan.database)
        .with_context(|| format!("Failed to open database {}", plan.database.display()))?;
    let mut installer = Installer::new(&mut conn).with_progress(args.progress);

    let report = match (corpus, args.eager) {
        (Corpus::Lexicon, false) => {
            installer.install_lexicon(&plan.schema, open_lexicon(&plan.input)?)?
        }
        (Corpus::Lexicon, true) => {
            let entries = load_lexicon(&plan.input)?;
            info!(records = entries.len(), "Decoded all entries");
            installer.install_lexicon(&plan.schema, entries.into_iter().map(Ok))?
        }
        (Corpus::Kanjidic, false) => {
            installer.install_characters(&plan.schema, open_characters(&plan.input)?)?
        }
        (Corpus::Kanjidic, true) => {
            let characters = load_characters(&plan.input)?;
            info!(records = characters.len(), "Decoded all characters");
            installer.install_characters(&plan.schema, characters.into_iter().map(Ok))?
        }
    };

    print_report(&report, &plan.database);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => InstallConfig::load(path)?,
        None => InstallConfig::default(),
    };
    match cli.command {
        Commands::Lexicon(args) => run_install(Corpus::Lexicon, args, &config),
        Commands::Kanji(args) => run_install(Corpus::Kanjidic, args, &config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    let result = run(cli);

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
