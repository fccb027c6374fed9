use clap::Parser;
use escrow_engine::application::engine::EscrowEngine;
use escrow_engine::config::EngineConfig;
use escrow_engine::domain::identity::Principal;
use escrow_engine::domain::ports::{AuditSinkBox, TransactionStoreBox};
use escrow_engine::infrastructure::audit::{FanOutAuditSink, InMemoryAuditSink, TracingAuditSink};
use escrow_engine::infrastructure::in_memory::{InMemoryLedger, InMemoryTransactionStore, ManualClock};
use escrow_engine::interfaces::csv::command_reader::CommandReader;
use escrow_engine::interfaces::csv::record_writer::RecordWriter;
use escrow_engine::interfaces::runner::CommandRunner;
use miette::{IntoDiagnostic, Result, miette};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// TOML engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Admin principal; overrides the configuration file
    #[arg(long)]
    admin: Option<String>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Print every audit event as a JSON line on stderr
    #[arg(long)]
    audit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.admin)?;

    let store = open_store(cli.db_path.as_deref())?;
    let ledger = InMemoryLedger::new();
    let clock = ManualClock::default();
    let recorded = InMemoryAuditSink::new();
    let audit: AuditSinkBox = Box::new(FanOutAuditSink::new(vec![
        Box::new(TracingAuditSink),
        Box::new(recorded.clone()),
    ]));

    let engine = EscrowEngine::new(
        config,
        store,
        Box::new(ledger.clone()),
        Box::new(clock.clone()),
        audit,
    )
    .into_diagnostic()?;
    let runner = CommandRunner::new(engine, ledger, clock);
    runner.restore_custody().await.into_diagnostic()?;

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(e) = runner.run(command).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    if cli.audit {
        for event in recorded.events() {
            eprintln!("{}", serde_json::to_string(&event).into_diagnostic()?);
        }
    }

    // Output final registry
    let records = runner.engine().transactions().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = RecordWriter::new(stdout.lock());
    writer.write_records(&records).into_diagnostic()?;

    Ok(())
}

fn load_config(path: Option<&Path>, admin: Option<String>) -> Result<EngineConfig> {
    let admin = admin.map(Principal::new).transpose().into_diagnostic()?;
    let mut config = match (path, admin.clone()) {
        (Some(path), _) => EngineConfig::from_file(path).into_diagnostic()?,
        (None, Some(admin)) => EngineConfig::new(admin),
        (None, None) => return Err(miette!("either --config or --admin is required")),
    };
    if let Some(admin) = admin {
        config.admin = admin;
    }
    config.validate().into_diagnostic()?;
    Ok(config)
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<&Path>) -> Result<TransactionStoreBox> {
    use escrow_engine::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => Ok(Box::new(RocksDBStore::open(path).into_diagnostic()?)),
        None => Ok(Box::new(InMemoryTransactionStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<&Path>) -> Result<TransactionStoreBox> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Box::new(InMemoryTransactionStore::new()))
}
