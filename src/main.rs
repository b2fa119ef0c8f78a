use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use graded::config::Config;
use graded::engine::model::{Submission, TestDefinition};
use graded::engine::{ExecutionBackend, InProcessBackend};
use graded::remote::RemoteBackend;
use graded::{rest, AppContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "graded",
    about = "graded — submission test-evaluation engine",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to graded.toml
    #[arg(long, env = "GRADED_CONFIG")]
    config: Option<PathBuf>,

    /// REST server port (overrides config)
    #[arg(long, env = "GRADED_PORT")]
    port: Option<u16>,

    /// Bind address (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "GRADED_BIND")]
    bind_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GRADED_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "GRADED_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log format: pretty or json
    #[arg(long, env = "GRADED_LOG_FORMAT")]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the evaluation server (default when no subcommand given).
    ///
    /// Examples:
    ///   graded serve
    ///   graded
    Serve,
    /// Evaluate a solution directory against a task file, offline.
    ///
    /// Reads test definitions from a JSON task file (either an array of
    /// tests or an object with a `tests` field), treats every file in the
    /// directory as the submission, prints the EvaluationResult JSON, and
    /// exits non-zero when any test fails.
    ///
    /// Examples:
    ///   graded check --task task.json --dir ./solution
    ///   graded check --task task.json --dir ./solution --remote
    Check {
        /// Task definition JSON file
        #[arg(long)]
        task: PathBuf,
        /// Directory containing the solution files
        #[arg(long)]
        dir: PathBuf,
        /// Evaluate at the remote sandbox provider instead of in-process
        #[arg(long)]
        remote: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log.as_deref().unwrap_or("info").to_string();
    let log_format = args.log_format.as_deref().unwrap_or("pretty").to_string();
    let _guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind_address {
        config.server.bind_address = bind;
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Check { task, dir, remote } => check(config, &task, &dir, remote).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting graded");
    let ctx = Arc::new(AppContext::new(config));
    rest::start_rest_server(ctx).await
}

async fn check(config: Config, task_path: &Path, dir: &Path, remote: bool) -> Result<()> {
    let tests = load_task(task_path)?;
    let files = load_submission(dir)?;
    info!(
        tests = tests.len(),
        files = files.len(),
        remote,
        "running offline check"
    );

    let result = if remote {
        RemoteBackend::new(config.sandbox.clone())
            .evaluate(&files, &tests)
            .await
    } else {
        InProcessBackend::new(config.engine.clone())
            .evaluate(&files, &tests)
            .await
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.passed {
        std::process::exit(1);
    }
    Ok(())
}

/// Accept both task shapes: a bare array of tests, or `{"tests": [...]}`.
fn load_task(path: &Path) -> Result<Vec<TestDefinition>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read task file: {}", path.display()))?;
    if let Ok(tests) = serde_json::from_str::<Vec<TestDefinition>>(&raw) {
        return Ok(tests);
    }

    #[derive(serde::Deserialize)]
    struct TaskFile {
        #[serde(default)]
        tests: Vec<TestDefinition>,
    }
    let task: TaskFile = serde_json::from_str(&raw)
        .with_context(|| format!("parse task file: {}", path.display()))?;
    Ok(task.tests)
}

/// Read every regular file in `dir` (top level only) into a submission map.
fn load_submission(dir: &Path) -> Result<Submission> {
    let mut files = Submission::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read solution directory: {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let source = std::fs::read_to_string(entry.path())
            .with_context(|| format!("read solution file: {name}"))?;
        files.insert(name, source);
    }
    Ok(files)
}

// ── Logging setup ─────────────────────────────────────────────────────────────

/// Initialize tracing with optional daily-rotated file output.
///
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("graded.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
