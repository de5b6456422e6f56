use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::application::{IngestError, IngestionOrchestrator, TableDropper};
use crate::domain::csv::{DropSummary, FileStatus, RunSummary};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::{AppConfig, ConfigService};
use crate::infrastructure::db::PgConnector;

#[derive(Parser)]
#[command(name = "csvship", version)]
#[command(about = "Load folders of CSV files into PostgreSQL tables")]
struct Cli {
    /// Configuration file (default: ./csvship.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every CSV file of a directory, appending to existing tables
    Ingest(IngestArgs),
    /// Same as ingest, but existing tables are always truncated first
    Ship(LoadArgs),
    /// Drop the tables derived from the CSV files of a directory
    Drop(DropArgs),
}

#[derive(Args)]
struct ConnectionArgs {
    /// Database host (or set DB_HOST)
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Database name (or set DB_NAME)
    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Use ambient credentials (PG* variables, .pgpass)
    #[arg(long)]
    trusted: bool,
}

#[derive(Args)]
struct IngestArgs {
    /// Truncate tables that already exist
    #[arg(long)]
    truncate: bool,

    #[command(flatten)]
    load: LoadArgs,
}

#[derive(Args)]
struct LoadArgs {
    /// Directory holding the CSV files
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Target schema (default: public)
    #[arg(short, long)]
    schema: Option<String>,

    /// Rows per committed insert chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Args)]
struct DropArgs {
    #[arg(short, long)]
    dir: Option<PathBuf>,

    #[arg(short, long)]
    schema: Option<String>,

    /// Only report which tables would be dropped
    #[arg(long)]
    dry_run: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,

    #[arg(long)]
    json: bool,

    #[command(flatten)]
    connection: ConnectionArgs,
}

pub fn run() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "csvship failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config = ConfigService::load(cli.config.as_deref())?;

    match cli.command {
        Command::Ingest(args) => ingest(&mut config, args.load, args.truncate, false).await,
        Command::Ship(args) => ingest(&mut config, args, true, true).await,
        Command::Drop(args) => drop_tables(&mut config, args).await,
    }
}

async fn ingest(
    config: &mut AppConfig,
    args: LoadArgs,
    truncate: bool,
    ship: bool,
) -> Result<ExitCode> {
    apply_connection(config, &args.connection);

    let mut settings = config.ingest_settings(ship);
    if let Some(schema) = args.schema {
        settings.schema = schema;
    }
    if let Some(chunk_size) = args.chunk_size {
        settings.chunk_size = chunk_size;
    }
    if truncate {
        settings.truncate_existing = true;
    }
    settings.validate().map_err(AppError::ConfigError)?;
    config.database.validate().map_err(AppError::ConfigError)?;

    let configured = if ship {
        config.dirs.for_ship()
    } else {
        config.dirs.for_ingest()
    };
    let dir = source_dir(args.dir, configured)?;

    let connector = PgConnector::new(&config.database);
    match IngestionOrchestrator::new(settings).run(&dir, &connector).await {
        Ok(summary) => {
            if args.json {
                print_json(&summary)?;
            } else {
                print_run_summary(&summary);
            }
            Ok(ExitCode::SUCCESS)
        }
        // Already logged with its hint
        Err(IngestError::Connection(_)) => Ok(ExitCode::FAILURE),
        Err(e) => Err(e.into()),
    }
}

async fn drop_tables(config: &mut AppConfig, args: DropArgs) -> Result<ExitCode> {
    apply_connection(config, &args.connection);
    config.database.validate().map_err(AppError::ConfigError)?;

    let schema = args.schema.unwrap_or_else(|| config.ingest.schema.clone());
    let dir = source_dir(args.dir, config.dirs.for_drop())?;
    let dropper = TableDropper::new(&schema, args.dry_run);

    if !args.dry_run && !args.yes {
        let targets = dropper.targets(&dir)?;
        if targets.is_empty() {
            println!("No CSV files in {}, nothing to drop.", dir.display());
            return Ok(ExitCode::SUCCESS);
        }
        let names: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        if !confirm(&names)? {
            println!("Aborted.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let connector = PgConnector::new(&config.database);
    match dropper.run(&dir, &connector).await {
        Ok(summary) => {
            if args.json {
                print_json(&summary)?;
            } else {
                print_drop_summary(&summary);
            }
            Ok(if summary.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        // Already logged with its hint
        Err(IngestError::Connection(_)) => Ok(ExitCode::FAILURE),
        Err(e) => Err(e.into()),
    }
}

fn apply_connection(config: &mut AppConfig, args: &ConnectionArgs) {
    let db = &mut config.database;
    if let Some(host) = &args.host {
        db.host = host.clone();
    }
    if let Some(port) = args.port {
        db.port = port;
    }
    if let Some(name) = &args.database {
        db.name = name.clone();
    }
    if let Some(user) = &args.user {
        db.user = Some(user.clone());
    }
    if let Some(password) = &args.password {
        db.password = Some(password.clone());
    }
    if args.trusted {
        db.trusted = true;
    }
}

fn source_dir(flag: Option<PathBuf>, configured: Option<&Path>) -> Result<PathBuf> {
    flag.or_else(|| configured.map(Path::to_path_buf))
        .ok_or_else(|| {
            AppError::ConfigError(
                "no source directory: pass --dir or set CSV_FILES_DIR".to_string(),
            )
        })
}

fn confirm(tables: &[String]) -> Result<bool> {
    let mut stderr = io::stderr();
    writeln!(stderr, "The following tables will be dropped:")?;
    for table in tables {
        writeln!(stderr, "  {}", table)?;
    }
    write!(stderr, "Continue? [y/N] ")?;
    stderr.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize summary: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!(
        "{} file(s) in {} -> schema {}",
        summary.files.len(),
        summary.source_dir.display(),
        summary.schema
    );
    for report in &summary.files {
        let status = match report.status {
            FileStatus::Loaded => "loaded",
            FileStatus::SkippedEmpty => "skipped (empty)",
            FileStatus::SkippedUnreadable => "skipped (unreadable)",
            FileStatus::SchemaFailed => "failed (table)",
            FileStatus::LoadFailed => "failed (load)",
        };
        let rows = report
            .outcome
            .as_ref()
            .map(|o| format!(" {}/{} rows", o.rows_inserted, o.rows_processed))
            .unwrap_or_default();
        println!("  {:<22} {} -> {}{}", status, report.file.display(), report.table, rows);
        if let Some(error) = &report.error {
            println!("  {:<22} {}", "", error);
        }
    }
    println!(
        "loaded {}, skipped {}, failed {}, rows inserted {}, took {}s",
        summary.loaded(),
        summary.skipped(),
        summary.failed(),
        summary.rows_inserted(),
        (summary.finished_at - summary.started_at).num_seconds()
    );
}

fn print_drop_summary(summary: &DropSummary) {
    if summary.dry_run {
        println!("Dry run: no table was dropped.");
    }
    for table in &summary.planned {
        let state = if summary.dropped.contains(table) {
            "dropped"
        } else if summary.missing.contains(table) {
            "missing"
        } else if summary.failed.contains(table) {
            "failed"
        } else {
            "would drop"
        };
        println!("  {:<10} {}", state, table);
    }
}
