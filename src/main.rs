use std::process::ExitCode;

use castellan::Bootstrap;
use castellan_config::{ConfigError, LogFormat, Settings};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Distributed monitoring core daemon: check scheduler, notification engine,
/// cluster transport, and perfdata writers.
#[derive(Parser, Debug)]
#[command(name = "castellan", version, about)]
struct Cli {
    /// Path to the process-level settings file (without extension; `config`
    /// resolves .toml/.yaml/.json from it). Defaults to /etc/castellan/castellan.
    #[arg(long)]
    config: Option<String>,

    /// Load and validate settings, then exit without starting the daemon.
    #[arg(long)]
    validate: bool,

    /// Request a running instance to reload its settings. Not meaningful when
    /// passed to a freshly started process; reserved for a future control socket.
    #[arg(long)]
    reload: bool,
}

const EXIT_SUCCESS: u8 = 0;
const EXIT_RUNTIME_ERROR: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_VALIDATION_FAILURE: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.reload {
        eprintln!("--reload requires a running instance with a control socket; not yet wired up for this invocation");
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(ConfigError::Validation(msg)) => {
            eprintln!("configuration validation failed: {msg}");
            return ExitCode::from(EXIT_VALIDATION_FAILURE);
        }
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if cli.validate {
        println!("configuration is valid");
        return ExitCode::from(EXIT_SUCCESS);
    }

    init_logging(&settings);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    match runtime.block_on(run(settings)) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            tracing::error!(error = %e, "castellan exited with an error");
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_new(&settings.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.logging.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Fmt => subscriber.init(),
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let bootstrap = Bootstrap::build(settings).await?;
    let background = bootstrap.spawn().await?;

    let snapshot_interval = std::time::Duration::from_secs(300);
    let snapshot_timer = bootstrap.timers.add_periodic(
        snapshot_interval,
        {
            let registry = bootstrap.registry.clone();
            let state = bootstrap.state.clone();
            std::sync::Arc::new(move || {
                let registry = registry.clone();
                let state = state.clone();
                Box::pin(async move {
                    if let Err(e) = state.snapshot(&registry) {
                        tracing::error!(error = %e, "periodic state snapshot failed");
                    }
                })
            })
        },
    );

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");

    let _ = bootstrap.timers.cancel(snapshot_timer);
    bootstrap.shutdown(&background).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
