use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use drono_common::SessionEvent;
use drono_distribution::{DistributionEvent, DistributionScheduler, DistributionState};
use drono_fetch::HttpFetchClient;
use drono_identity::{
    AlwaysOnline, Connectivity, IdentityRotator, RotationConfig, ShellConnectivity,
};
use drono_session::SessionController;
use drono_snapshot::{FileSnapshotStore, SnapshotStore};

mod config;
use config::EngineConfig;

/// Drono traffic engine - timed fetch sequences with identity rotation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Attempt to restore and resume an interrupted run
    #[arg(long)]
    resume: bool,

    /// Run duration in seconds (for testing)
    #[arg(long)]
    run_duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    info!("Starting drono traffic engine");
    info!("Config file: {}", args.config);

    let engine_config = EngineConfig::load_from_file(&args.config)?;
    let session_config = engine_config.session_config();
    session_config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid session configuration: {}", e))?;

    // Snapshot store
    let snapshots: Arc<dyn SnapshotStore> = match &engine_config.snapshot_directory {
        Some(dir) => {
            info!("Using snapshot directory override: {}", dir);
            Arc::new(FileSnapshotStore::with_base_directory(dir.clone()))
        }
        None => Arc::new(FileSnapshotStore::with_defaults()),
    };

    // Connectivity for identity rotation
    let connectivity: Arc<dyn Connectivity> = match &engine_config.connectivity {
        Some(settings) => Arc::new(ShellConnectivity::new(settings.into())),
        None => {
            if session_config.rotate_identity {
                bail!("identity rotation is enabled but no connectivity commands are configured");
            }
            Arc::new(AlwaysOnline)
        }
    };
    let rotator = Arc::new(IdentityRotator::new(connectivity, RotationConfig::default()));

    // Fetch client
    let fetch_client = Arc::new(
        HttpFetchClient::new(Duration::from_millis(engine_config.session.fetch_timeout_ms))
            .map_err(|e| anyhow::anyhow!("Failed to build fetch client: {}", e))?,
    );

    let controller = SessionController::new(fetch_client, rotator, Arc::clone(&snapshots));
    spawn_session_event_logger(&controller).await?;

    // Start (or restore) the session
    if args.resume {
        let restored = controller
            .restore_from_snapshot(session_config.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Restore failed: {}", e))?;
        if restored {
            info!("Restored interrupted session; resuming");
            controller
                .resume()
                .await
                .map_err(|e| anyhow::anyhow!("Resume failed: {}", e))?;
        } else {
            info!("No snapshot to restore; starting fresh");
            controller
                .start(session_config.clone())
                .await
                .map_err(|e| anyhow::anyhow!("Start failed: {}", e))?;
        }
    } else {
        controller
            .start(session_config.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Start failed: {}", e))?;
    }

    // In scheduled mode the scheduler drives single iterations
    let scheduler = if let Some(distribution) = &engine_config.distribution {
        let scheduler = DistributionScheduler::new(controller.clone(), Arc::clone(&snapshots));
        scheduler
            .configure_schedule(
                session_config.total_iterations,
                distribution.window_hours,
                distribution.pattern.clone(),
            )
            .await
            .map_err(|e| anyhow::anyhow!("Schedule configuration failed: {}", e))?;
        spawn_scheduler_event_logger(&scheduler).await?;
        scheduler
            .start_distribution()
            .await
            .map_err(|e| anyhow::anyhow!("Distribution start failed: {}", e))?;
        Some(scheduler)
    } else {
        None
    };

    // Run until the session finishes, a signal arrives, or the test
    // duration elapses
    tokio::select! {
        _ = wait_for_completion(&controller, scheduler.as_ref()) => {
            info!("Run finished");
        }
        _ = setup_signal_handlers() => {
            info!("Shutting down on signal...");
        }
        _ = sleep_for(args.run_duration) => {
            info!("Run duration elapsed (test mode)");
        }
    }

    if let Some(scheduler) = &scheduler {
        if let Err(e) = scheduler.stop_distribution().await {
            error!("Failed to stop distribution: {}", e);
        }
    }
    if let Err(e) = controller.stop().await {
        error!("Failed to stop session: {}", e);
    }
    info!("Engine shut down");

    Ok(())
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    Ok(())
}

/// Forward session events to the log.
async fn spawn_session_event_logger(controller: &SessionController) -> Result<()> {
    let mut events = controller
        .subscribe()
        .await
        .map_err(|e| anyhow::anyhow!("Subscribe failed: {}", e))?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Progress { current, total } => {
                    info!("Progress: {}/{}", current, total);
                }
                SessionEvent::RotationStarted => {
                    info!("Identity rotation started");
                }
                SessionEvent::RotationEnded { success } => {
                    if success {
                        info!("Identity rotation finished");
                    } else {
                        warn!("Identity rotation failed");
                    }
                }
                SessionEvent::StatusChanged { status } => {
                    info!("Session status: {}", status);
                }
            }
        }
    });
    Ok(())
}

/// Forward scheduler events to the log.
async fn spawn_scheduler_event_logger(scheduler: &DistributionScheduler) -> Result<()> {
    let mut events = scheduler
        .subscribe()
        .await
        .map_err(|e| anyhow::anyhow!("Subscribe failed: {}", e))?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                DistributionEvent::StatusChanged { running, progress } => {
                    info!(
                        "Distribution {} ({}%)",
                        if running { "running" } else { "idle" },
                        progress
                    );
                }
                DistributionEvent::EntryScheduled {
                    fire_in,
                    index,
                    total,
                } => {
                    info!(
                        "Next request {}/{} in {}s",
                        index + 1,
                        total,
                        fire_in.as_secs()
                    );
                }
            }
        }
    });
    Ok(())
}

/// Resolve when the run is finished: the session reaches a terminal
/// status, or (in scheduled mode) the distribution completes.
async fn wait_for_completion(
    controller: &SessionController,
    scheduler: Option<&DistributionScheduler>,
) {
    loop {
        let status = controller.status().await;
        if status.is_terminal() {
            return;
        }
        if let Some(scheduler) = scheduler {
            if scheduler.state().await == DistributionState::Completed {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Sleep for the test-mode run duration, or forever when none is set.
async fn sleep_for(run_duration: Option<u64>) {
    match run_duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

async fn setup_signal_handlers() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
