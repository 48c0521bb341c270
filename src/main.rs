/// Version injected at compile time via WORKLOAD_AGGREGATE_VERSION (set by
/// CI/CD), or "dev" for local builds.
pub const VERSION: &str = match option_env!("WORKLOAD_AGGREGATE_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use workload_aggregate::config::Config;
use workload_aggregate::memory::Fixture;
use workload_aggregate::workload::{DisconnectPolicy, QueryOptions, ResourceFilter};
use workload_aggregate::{AggregateStore, Record, RequestContext};

/// One logical collection over every workload kind
#[derive(Parser, Debug)]
#[command(name = "workload-aggregate", version, about, long_about = None)]
struct Args {
    /// Fixture file seeding the workload collections
    #[arg(short, long)]
    fixture: Option<PathBuf>,

    /// Namespace for created workloads without `namespaceId`
    #[arg(short, long)]
    namespace: Option<String>,

    /// Project the credential catalog is queried for
    #[arg(short, long)]
    project: Option<String>,

    /// Aggregate watch behavior when one kind's stream ends
    #[arg(long, value_enum)]
    policy: Option<WatchPolicy>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List workloads of every kind
    List {
        /// Only show workloads where FIELD equals one of the comma-separated values
        #[arg(long = "filter", value_name = "FIELD=VALUES")]
        filters: Vec<String>,
    },
    /// Show one workload by `<kind>:<id>`
    Get { id: String },
    /// Create a workload from a YAML or JSON payload
    Create { payload: PathBuf },
    /// Update a workload by `<kind>:<id>` from a YAML or JSON payload
    Update { id: String, payload: PathBuf },
    /// Delete a workload by `<kind>:<id>`
    Delete { id: String },
    /// Stream changes of every kind
    Watch {
        /// Stop after this many seconds
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Remember a fixture file in the config
    UseFixture { path: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WatchPolicy {
    TearDown,
    Isolate,
}

impl From<WatchPolicy> for DisconnectPolicy {
    fn from(policy: WatchPolicy) -> Self {
        match policy {
            WatchPolicy::TearDown => DisconnectPolicy::TearDown,
            WatchPolicy::Isolate => DisconnectPolicy::Isolate,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_env("WORKLOAD_AGGREGATE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("workload-aggregate {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("workload-aggregate").join("workload-aggregate.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".workload-aggregate").join("workload-aggregate.log");
    }
    PathBuf::from("workload-aggregate.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let mut config = Config::load();

    if let Command::UseFixture { path } = &args.command {
        config.set_fixture(path)?;
        println!("Using fixture {}", path.display());
        return Ok(());
    }

    let fixture = match config.effective_fixture(args.fixture.clone()) {
        Some(path) => Fixture::load(&path)
            .with_context(|| format!("Failed to load fixture {}", path.display()))?,
        None => {
            tracing::warn!("No fixture configured, starting with empty collections");
            Fixture::default()
        }
    };

    let policy = config.effective_policy(args.policy.map(DisconnectPolicy::from));
    let store = fixture.into_store(policy)?;

    let span = tracing::info_span!(
        "workload_request",
        project = args.project.as_deref().unwrap_or_default()
    );
    let mut ctx = RequestContext::new().with_span(span);
    if let Some(project) = &args.project {
        ctx = ctx.with_project(project);
    }

    run(&store, &ctx, &config, &args).await
}

async fn run(store: &AggregateStore, ctx: &RequestContext, config: &Config, args: &Args) -> Result<()> {
    match &args.command {
        Command::List { filters } => {
            let mut opts = QueryOptions::default();
            for expr in filters {
                let filter = ResourceFilter::parse(expr)
                    .with_context(|| format!("Invalid filter {:?}, expected FIELD=VALUES", expr))?;
                opts = opts.with_filter(filter);
            }
            let items = store.list(ctx, &opts).await?;
            print_json(&serde_json::Value::Array(
                items.into_iter().map(Record::into_value).collect(),
            ))
        }
        Command::Get { id } => print_json(&store.by_id(ctx, id).await?.into_value()),
        Command::Create { payload } => {
            let mut data = read_payload(payload)?;
            if data.is_empty_value("namespaceId") {
                data.insert("namespaceId", config.effective_namespace(args.namespace.clone()));
            }
            print_json(&store.create(ctx, data).await?.into_value())
        }
        Command::Update { id, payload } => {
            let data = read_payload(payload)?;
            print_json(&store.update(ctx, data, id).await?.into_value())
        }
        Command::Delete { id } => print_json(&store.delete(ctx, id).await?.into_value()),
        Command::Watch { seconds } => watch(store, ctx, Duration::from_secs(*seconds)).await,
        Command::UseFixture { .. } => Ok(()),
    }
}

async fn watch(store: &AggregateStore, ctx: &RequestContext, limit: Duration) -> Result<()> {
    let mut events = store.watch(ctx, &QueryOptions::default()).await?;
    let deadline = tokio::time::sleep(limit);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(event) => print_json(&event.into_value())?,
                None => {
                    tracing::info!("Aggregate watch closed");
                    break;
                }
            },
        }
    }

    ctx.cancellation().cancel();
    Ok(())
}

fn read_payload(path: &Path) -> Result<Record> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload {}", path.display()))?;
    let value: serde_json::Value =
        serde_yaml::from_str(&content).context("Failed to parse payload")?;
    Record::from_value(value).context("Payload must be a mapping")
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
