// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tidemark Daemon (tmd)
//!
//! Background process that consumes the project's topics and serves
//! subscribers.

use std::path::PathBuf;
use std::sync::Arc;

use tm_daemon::{lifecycle, server, DaemonPaths, LifecycleError, TidemarkConfig};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let project_root = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        std::env::current_dir()?
    };

    let paths = DaemonPaths::for_project(&project_root)?;

    // Before tracing setup, so the marker precedes everything this run logs
    write_startup_marker(&paths)?;
    let log_guard = setup_logging(&paths)?;

    info!("Starting tmd for project: {}", paths.project_root.display());

    let config = match TidemarkConfig::load(&paths.config_path) {
        Ok(config) => config,
        Err(e) => {
            write_startup_error(&paths, &e);
            error!("Invalid configuration: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut daemon = match lifecycle::startup(&paths, config).await {
        Ok(d) => d,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&paths, &e);
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("Daemon ready, listening on {}", paths.socket_path.display());

    // Signal ready for a parent process waiting on startup
    println!("READY");

    let mut failed_sends: u64 = 0;
    loop {
        tokio::select! {
            result = daemon.listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&daemon.server);
                        tokio::spawn(async move {
                            if let Err(e) = server::handle_connection(ctx, stream).await {
                                error!("Error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }

            Some(failure) = daemon.send_failures.recv() => {
                failed_sends += 1;
                debug!(topic = %failure.topic, failed_sends, "produce not delivered");
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
        }
    }

    daemon.shutdown().await?;
    info!(failed_sends, "Daemon stopped");
    Ok(())
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- tmd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- tmd: starting (pid: ";

/// Append the startup marker to the log file
fn write_startup_marker(paths: &DaemonPaths) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = paths.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write a startup error synchronously, in case the process exits before
/// the non-blocking writer flushes.
fn write_startup_error(paths: &DaemonPaths, error: &dyn std::error::Error) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    paths: &DaemonPaths,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = paths.log_path.parent().ok_or(LifecycleError::NoStateDir)?;
    let file = paths.log_path.file_name().ok_or(LifecycleError::NoStateDir)?;
    std::fs::create_dir_all(dir)?;

    let file_appender = tracing_appender::rolling::never(dir, file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
