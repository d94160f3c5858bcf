use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use revstore_core::{
    ConfigFile, ConfigOption, Configuration, Context, Driver, HEAD, HumanDuration, RunMode,
    RunReport,
};
use revstore_sqlite::{SqliteDriver, SqliteManager, create_version_table, migration};
use tracing_subscriber::EnvFilter;

/// Output format for commands that print structured data.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "revstore")]
#[command(about = "Schema migrations and configuration checks for revstore datastores")]
#[command(version)]
struct Cli {
    /// Log migration progress to stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate datastore parameters and print the effective configuration.
    CheckConfig(CheckConfigArgs),
    /// Print the schema version stored in an existing database.
    Version(VersionArgs),
    /// Print the latest migration known to this binary.
    Head,
    /// Apply pending migrations to a database.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args)]
struct CheckConfigArgs {
    /// YAML config file; flags given here override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Idle duration after which a pooled connection is closed.
    #[arg(long, value_parser = parse_duration_arg)]
    conn_max_idle_time: Option<Duration>,
    /// Age after which a pooled connection is closed.
    #[arg(long, value_parser = parse_duration_arg)]
    conn_max_lifetime: Option<Duration>,
    /// Minimum connection pool size.
    #[arg(long)]
    min_open_conns: Option<i32>,
    /// Maximum connection pool size.
    #[arg(long)]
    max_open_conns: Option<i32>,
    /// Watch buffer capacity.
    #[arg(long)]
    watch_buffer_length: Option<u16>,
    /// Revision quantization bucket (e.g. 5s).
    #[arg(long, value_parser = parse_duration_arg)]
    revision_quantization: Option<Duration>,
    /// GC window (e.g. 24h).
    #[arg(long, value_parser = parse_duration_arg)]
    gc_window: Option<Duration>,
    /// Output format.
    #[arg(long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct VersionArgs {
    /// Database connection string (e.g. sqlite:///var/lib/revstore.db).
    #[arg(long)]
    db: String,
    /// Abort if the operation takes longer than this.
    #[arg(long, value_parser = parse_duration_arg)]
    timeout: Option<Duration>,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Database connection string (e.g. sqlite:///var/lib/revstore.db).
    #[arg(long)]
    db: String,
    /// Target migration version.
    #[arg(long, default_value = HEAD)]
    to: String,
    /// Plan the run without applying anything.
    #[arg(long)]
    dry_run: bool,
    /// Abort if the run takes longer than this.
    #[arg(long, value_parser = parse_duration_arg)]
    timeout: Option<Duration>,
    /// Output format.
    #[arg(long, default_value = "text")]
    format: OutputFormat,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::CheckConfig(args) => run_check_config(args),
        Command::Version(args) => run_version(args),
        Command::Head => run_head(),
        Command::Migrate(args) => run_migrate(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// check-config command
// ---------------------------------------------------------------------------

fn run_check_config(args: CheckConfigArgs) -> Result<(), String> {
    let mut options = match &args.config {
        Some(path) => ConfigFile::load(path).map_err(|e| e.to_string())?.options(),
        None => Vec::new(),
    };
    options.extend(flag_options(&args));

    let config = Configuration::build(options).map_err(|e| format!("invalid configuration: {e}"))?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&config)
                .map_err(|e| format!("JSON serialization failed: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Text => print_configuration(&config),
    }
    Ok(())
}

/// Options for the flags that were given, in field order.
fn flag_options(args: &CheckConfigArgs) -> Vec<ConfigOption> {
    [
        args.conn_max_idle_time.map(ConfigOption::ConnMaxIdleTime),
        args.conn_max_lifetime.map(ConfigOption::ConnMaxLifetime),
        args.min_open_conns.map(ConfigOption::MinOpenConns),
        args.max_open_conns.map(ConfigOption::MaxOpenConns),
        args.watch_buffer_length.map(ConfigOption::WatchBufferLength),
        args.revision_quantization.map(ConfigOption::RevisionQuantization),
        args.gc_window.map(ConfigOption::GcWindow),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn print_configuration(config: &Configuration) {
    let duration_or = |d: Option<Duration>, unset: &str| {
        d.map_or_else(|| unset.to_string(), |d| HumanDuration(d).to_string())
    };
    let conns_or = |n: Option<i32>, unset: &str| n.map_or_else(|| unset.to_string(), |n| n.to_string());

    println!("Configuration OK:");
    println!("  Revision quantization: {}", HumanDuration(config.revision_quantization()));
    println!("  GC window: {}", HumanDuration(config.gc_window()));
    println!("  Watch buffer length: {}", config.watch_buffer_length());
    println!("  Min open conns: {}", conns_or(config.min_open_conns(), "unset"));
    println!("  Max open conns: {}", conns_or(config.max_open_conns(), "no limit"));
    println!(
        "  Conn max idle time: {}",
        duration_or(config.conn_max_idle_time(), "no maximum")
    );
    println!(
        "  Conn max lifetime: {}",
        duration_or(config.conn_max_lifetime(), "no maximum")
    );
}

// ---------------------------------------------------------------------------
// version / head commands
// ---------------------------------------------------------------------------

fn run_version(args: VersionArgs) -> Result<(), String> {
    let ctx = context_for(args.timeout);
    let mut driver = SqliteDriver::open_read_only(&args.db)
        .map_err(|e| format!("Failed to open database '{}': {e}", args.db))?;
    let version = driver
        .version(&ctx)
        .map_err(|e| format!("Failed to read schema version: {e}"))?;
    driver
        .close()
        .map_err(|e| format!("Failed to close database '{}': {e}", args.db))?;

    if version.is_empty() {
        println!("(uninitialized)");
    } else {
        println!("{version}");
    }
    Ok(())
}

fn run_head() -> Result<(), String> {
    let head = catalog()?
        .head_revision()
        .map_err(|e| format!("Failed to determine head migration: {e}"))?;
    println!("{head}");
    Ok(())
}

// ---------------------------------------------------------------------------
// migrate command
// ---------------------------------------------------------------------------

fn run_migrate(args: MigrateArgs) -> Result<(), String> {
    let ctx = context_for(args.timeout);
    let manager = catalog()?;
    let mode = if args.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Live
    };

    let mut driver = open_driver(&args.db)?;
    let report = manager
        .run(&mut driver, &ctx, &args.to, mode)
        .map_err(|e| format!("Migration failed: {e}"))?;
    driver
        .close()
        .map_err(|e| format!("Failed to close database '{}': {e}", args.db))?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| format!("JSON serialization failed: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let starting = display_version(&report.starting);
    if report.applied.is_empty() {
        println!("Already at '{}'. Nothing to apply.", report.target);
        return;
    }
    if report.dry_run {
        println!("Dry run from {starting} to '{}':", report.target);
        for version in &report.applied {
            println!("  would apply: {version}");
        }
    } else {
        println!("Migrated from {starting} to '{}':", report.target);
        for version in &report.applied {
            println!("  applied: {version}");
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Migrations shipped with this binary.
fn catalog() -> Result<SqliteManager, String> {
    let mut manager = SqliteManager::new();
    manager
        .register(
            "initial",
            "",
            migration(|_ctx, tx| {
                create_version_table(tx)?;
                Ok(())
            }),
        )
        .map_err(|e| format!("Failed to register migration: {e}"))?;
    Ok(manager)
}

fn open_driver(url: &str) -> Result<SqliteDriver, String> {
    SqliteDriver::open(url).map_err(|e| format!("Failed to open database '{url}': {e}"))
}

fn context_for(timeout: Option<Duration>) -> Context {
    timeout.map_or_else(Context::background, Context::with_timeout)
}

fn display_version(version: &str) -> String {
    if version.is_empty() {
        "(uninitialized)".to_string()
    } else {
        format!("'{version}'")
    }
}

fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    revstore_core::parse_duration(value).map_err(|e| e.to_string())
}
