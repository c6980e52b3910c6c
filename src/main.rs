use clap::Parser;
use cleaner::MediaCleaner;
use cli::Cli;
use config::{FileConfig, RunConfig};
use log::{debug, error, info};
use logging::setup_logging;
use scheduler::{Scheduler, TokioSleeper};
use tokio::sync::watch;

mod catalog;
mod cleaner;
mod cli;
mod config;
mod executor;
mod http;
mod logging;
mod managers;
mod prompt;
mod retention;
mod scheduler;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level)?;
    debug!("log level: {}", args.log_level);

    let file_config = match &args.config {
        Some(path) => FileConfig::load(path).await?,
        None => FileConfig::default(),
    };
    let config = RunConfig::resolve(&args, file_config)?;
    let schedule = config.schedule;
    let cleaner = MediaCleaner::new(config.clone())?;

    if args.list_libraries {
        return cleaner.list_libraries().await;
    }

    config.log_summary();

    let Some(schedule) = schedule else {
        return cleaner.cleanup().await;
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("failed to listen for shutdown signals: {e:#}");
            return;
        }
        info!("received shutdown signal, stopping after the current cycle");
        let _ = shutdown_tx.send(true);
        if shutdown_signal().await.is_ok() {
            info!("received second shutdown signal, exiting now");
            std::process::exit(130);
        }
    });

    Scheduler::new(schedule, TokioSleeper::new(shutdown_rx))
        .run(&cleaner)
        .await;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
