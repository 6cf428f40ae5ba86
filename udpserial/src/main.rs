//! udpserial entry point

use anyhow::Context as _;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Interval;
use udpserial::server::{Context, RestartOutcome, Service, ServiceSettings};
use udpserial::transport::TokioSerialOpener;

/// Bridge serial ports to UDP endpoints
#[derive(Parser, Debug)]
#[command(name = "udpserial")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port configuration file, created empty if missing
    #[arg(short = 'c', long, default_value = "config.json")]
    config: PathBuf,

    /// Device mapping file
    #[arg(short = 'd', long, default_value = "definitions.json")]
    definitions: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Log a statistics snapshot every N seconds (0 disables)
    #[arg(long, default_value = "0")]
    stats_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("Starting udpserial");
    info!("Configuration: {}", args.config.display());
    info!("Definitions: {}", args.definitions.display());

    let context = Context::init(&args.config, &args.definitions).with_context(|| {
        format!(
            "cannot load {} / {}",
            args.config.display(),
            args.definitions.display()
        )
    })?;
    let service = Service::start(
        Arc::new(context),
        Arc::new(TokioSerialOpener),
        ServiceSettings::default(),
    );

    let mut hangup = signals::Listener::hangup().context("cannot watch SIGHUP")?;
    let mut terminate = signals::Listener::terminate().context("cannot watch SIGTERM")?;
    let mut stats = (args.stats_interval > 0)
        .then(|| tokio::time::interval(Duration::from_secs(args.stats_interval)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = terminate.recv() => {
                info!("Terminated");
                break;
            }
            _ = hangup.recv() => {
                info!("Reloading configuration");
                match service.reload_and_restart().await {
                    Ok(RestartOutcome::Restarted { launched, .. }) => {
                        info!("Restarted with {} ports", launched);
                    }
                    Ok(RestartOutcome::AlreadyInProgress) => info!("Restart already in progress"),
                    Err(e) => error!("Reload failed: {}", e),
                }
            }
            _ = tick(&mut stats) => {
                match serde_json::to_string(&service.snapshot()) {
                    Ok(json) => info!("Statistics: {}", json),
                    Err(e) => error!("{}", e),
                }
            }
        }
    }

    let report = service.shutdown().await?;
    info!(
        "Shutdown complete: {} bridges stopped, {} abandoned",
        report.observed, report.abandoned
    );
    Ok(())
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
mod signals {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    pub struct Listener(Signal);

    impl Listener {
        pub fn hangup() -> std::io::Result<Self> {
            signal(SignalKind::hangup()).map(Self)
        }

        pub fn terminate() -> std::io::Result<Self> {
            signal(SignalKind::terminate()).map(Self)
        }

        pub async fn recv(&mut self) {
            self.0.recv().await;
        }
    }
}

#[cfg(not(unix))]
mod signals {
    /// Signals that never arrive on this platform
    pub struct Listener;

    impl Listener {
        pub fn hangup() -> std::io::Result<Self> {
            Ok(Self)
        }

        pub fn terminate() -> std::io::Result<Self> {
            Ok(Self)
        }

        pub async fn recv(&mut self) {
            std::future::pending::<()>().await
        }
    }
}
