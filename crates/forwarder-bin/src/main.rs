//! batch-forwarder binary entry point.
//!
//! Usage:
//!   batch-forwarder run --config <file> [--workers N] [--log-level L] [--redis-url U] [--stdin]
//!   batch-forwarder check --config <file> [--stdin]

use batch_forwarder::{ForwarderConfig, ForwarderResult, Overrides, Source};
use batch_sink::ShutdownSignal;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long blocked tasks (a pending stdin read) may delay exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Forward records to a stream load endpoint in transactional batches.
#[derive(Parser, Debug)]
#[command(name = "batch-forwarder")]
#[command(about = "Forward records from a Redis stream to a stream load endpoint in transactional batches")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the forwarder until interrupted.
    Run(RunArgs),
    /// Validate the configuration and print the effective settings.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the JSON config file.
    #[arg(long, short)]
    config: PathBuf,

    /// Number of concurrent workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Redis connection URL.
    #[arg(long)]
    redis_url: Option<String>,

    /// Read records from stdin, one per line, instead of Redis.
    #[arg(long)]
    stdin: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Path to the JSON config file.
    #[arg(long, short)]
    config: PathBuf,

    /// Validate for stdin input (no redis section needed).
    #[arg(long)]
    stdin: bool,
}

fn source(stdin: bool) -> Source {
    if stdin {
        Source::Stdin
    } else {
        Source::Redis
    }
}

fn main() -> ForwarderResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check(args) => check(args),
        Command::Run(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(run(args));
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            result
        }
    }
}

fn check(args: CheckArgs) -> ForwarderResult<()> {
    let config = ForwarderConfig::resolve(&args.config, &Overrides::default())?;
    config.validate(source(args.stdin))?;

    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

async fn run(args: RunArgs) -> ForwarderResult<()> {
    let overrides = Overrides {
        workers: args.workers,
        log_level: args.log_level,
        redis_url: args.redis_url,
    };
    let config = ForwarderConfig::resolve(&args.config, &overrides)?;
    let source = source(args.stdin);
    config.validate(source)?;

    observability::init_with_config(observability::LogConfig {
        service_name: "batch-forwarder".into(),
        default_level: config.log_level.clone(),
        log_path: config.log_path.clone(),
        also_stderr: config.log_path.is_some(),
        format: config.log_format,
    })?;

    info!(
        source = ?source,
        workers = config.workers,
        batch_size = config.sink.batch_size,
        flush_interval_ms = config.sink.flush_interval_ms,
        fe_nodes = ?config.stream_load.fe_nodes,
        database = %config.stream_load.database,
        table = %config.stream_load.table,
        "Configuration loaded"
    );

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("Received shutdown signal, finishing current cycles...");
            shutdown.trigger();
        });
    }

    match batch_forwarder::run(config, source, shutdown).await {
        Ok(snapshot) => {
            info!(
                batch_empty = snapshot.batch_empty,
                batch_underflow = snapshot.batch_underflow,
                batch_complete = snapshot.batch_complete,
                drain_attempt = snapshot.drain_attempt,
                drain_success = snapshot.drain_success,
                "Forwarder stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Forwarder exited with error");
            Err(e)
        }
    }
}

/// Resolve on Ctrl-C or, on unix, SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM, using Ctrl-C only"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
