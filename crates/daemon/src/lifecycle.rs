// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup and shutdown.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use thiserror::Error;
use tm_adapters::{Broker, BrokerError, MemoryBroker, MemoryBrokerConfig, TracedBroker};
use tm_core::UuidIdGen;
use tm_engine::{
    CacheConfig, CacheView, Emitter, FanOut, GroupConfig, GroupConsumer, LatestField, MaterializedCache,
    RouteResolver, Router, RouterConfig, SendFailure, StatusProjection, Supervisor,
};
use tm_storage::{Store, StoreConfig, StoreError};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{TidemarkConfig, CONFIG_FILE};
use crate::server::ServerContext;

/// The embedded broker, wrapped with tracing. Its log lives in
/// [`DaemonPaths::broker_dir`].
pub type DaemonBroker = TracedBroker<MemoryBroker>;

/// Where a project's daemon keeps its files
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub project_root: PathBuf,
    pub config_path: PathBuf,
    pub socket_path: PathBuf,
    /// Lock file, holding the daemon's PID
    pub lock_path: PathBuf,
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    pub store_dir: PathBuf,
    pub broker_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl DaemonPaths {
    /// Paths for a project, keyed by a hash of its canonical root
    pub fn for_project(project_root: &Path) -> Result<Self, LifecycleError> {
        let canonical = project_root
            .canonicalize()
            .map_err(|e| LifecycleError::ProjectNotFound(project_root.to_path_buf(), e))?;
        Ok(Self::in_dirs(&canonical, &state_dir()?, &socket_dir()))
    }

    pub fn in_dirs(project_root: &Path, state_dir: &Path, socket_dir: &Path) -> Self {
        let hash = project_hash(project_root);
        let state_dir = state_dir.join("projects").join(&hash);
        Self {
            project_root: project_root.to_path_buf(),
            config_path: project_root.join(CONFIG_FILE),
            socket_path: socket_dir.join(format!("{}.sock", hash)),
            lock_path: state_dir.join("daemon.pid"),
            version_path: state_dir.join("daemon.version"),
            log_path: state_dir.join("daemon.log"),
            store_dir: state_dir.join("store"),
            broker_dir: state_dir.join("broker"),
            cache_dir: state_dir.join("cache"),
        }
    }
}

/// Daemon state during operation
pub struct DaemonState {
    pub paths: DaemonPaths,
    pub config: TidemarkConfig,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    pub store: Store,
    pub broker: DaemonBroker,
    pub supervisor: Supervisor,
    /// Read handle on the routing cache, when one is configured
    pub cache: Option<CacheView>,
    /// Shared by every connection task
    pub server: Arc<ServerContext<UuidIdGen>>,
    /// Producer failures from the emitter
    pub send_failures: mpsc::UnboundedReceiver<SendFailure>,
    pub start_time: Instant,
}

impl DaemonState {
    /// Stop every task, flush queued events and remove runtime files
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        // Groups finish their in-flight record first
        self.supervisor.shutdown().await;
        self.server.emitter.flush().await;

        if let Err(e) = self.store.compact() {
            warn!(error = %e, "final compaction failed");
        }

        for path in [
            &self.paths.socket_path,
            &self.paths.lock_path,
            &self.paths.version_path,
        ] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove file");
                }
            }
        }

        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "Daemon shutdown complete"
        );
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Project not found at {0}: {1}")]
    ProjectNotFound(PathBuf, std::io::Error),

    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(
    paths: &DaemonPaths,
    config: TidemarkConfig,
) -> Result<DaemonState, LifecycleError> {
    match startup_inner(paths, config).await {
        Ok(state) => Ok(state),
        // Another daemon owns these files
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(paths);
            Err(e)
        }
    }
}

async fn startup_inner(
    paths: &DaemonPaths,
    config: TidemarkConfig,
) -> Result<DaemonState, LifecycleError> {
    if let Some(parent) = paths.lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = paths.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Lock FIRST; truncate only once it is ours
    let mut lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&paths.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    {
        use std::io::Write;
        writeln!(lock_file, "{}", std::process::id())?;
    }
    std::fs::write(&paths.version_path, env!("CARGO_PKG_VERSION"))?;

    let store = Store::open(
        &paths.store_dir,
        StoreConfig {
            compaction_threshold: config.store.compaction_threshold,
        },
    )?;
    info!(
        records = store.len(),
        meta = store.meta_len(),
        sequence = store.sequence(),
        "Loaded store"
    );

    // Offsets in the store only mean something against the same log
    let broker = TracedBroker::new(MemoryBroker::open(
        MemoryBrokerConfig {
            partitions: config.broker.partitions,
            auto_create_topics: config.broker.auto_create_topics,
        },
        &paths.broker_dir,
    )?);
    let (emitter, send_failures) = Emitter::spawn(broker.producer());
    let fanout = FanOut::new();

    let (supervisor, cache) =
        spawn_topology(&config, &paths.cache_dir, &broker, &store, &emitter, &fanout)?;

    // Bind LAST, only after everything else is up
    if paths.socket_path.exists() {
        std::fs::remove_file(&paths.socket_path)?;
    }
    let listener = UnixListener::bind(&paths.socket_path)
        .map_err(|e| LifecycleError::BindFailed(paths.socket_path.clone(), e))?;

    info!(
        "Daemon started for project: {}",
        paths.project_root.display()
    );

    let server = Arc::new(ServerContext {
        fanout,
        emitter,
        ids: UuidIdGen,
        handshake_timeout: config.server.handshake_timeout,
        outbound_queue: config.server.outbound_queue,
    });

    Ok(DaemonState {
        paths: paths.clone(),
        config,
        lock_file,
        listener,
        store,
        broker,
        supervisor,
        cache,
        server,
        send_failures,
        start_time: Instant::now(),
    })
}

/// Spawn the configured groups, cache and router
///
/// Returns the supervisor owning them and the cache's read handle.
pub fn spawn_topology(
    config: &TidemarkConfig,
    cache_dir: &Path,
    broker: &DaemonBroker,
    store: &Store,
    emitter: &Emitter,
    fanout: &FanOut,
) -> Result<(Supervisor, Option<CacheView>), LifecycleError> {
    let mut supervisor = Supervisor::new();

    for group in &config.groups {
        supervisor.spawn_group(GroupConsumer::new(
            GroupConfig {
                name: group.name.clone(),
                topics: group.topics.clone(),
                from_beginning: group.from_beginning,
            },
            broker.clone(),
            store.clone(),
            StatusProjection::new(group.output_topic.clone()),
            emitter.clone(),
        ));
    }

    let view = match &config.cache {
        Some(section) if section.topics.is_empty() => {
            warn!(cache = %section.name, "cache has no topics, not started");
            None
        }
        Some(section) => {
            let mut cache_config = CacheConfig::new(section.name.clone(), section.topics.clone());
            cache_config.snapshot_every = section.snapshot_every;
            if section.snapshot {
                std::fs::create_dir_all(cache_dir)?;
                cache_config.snapshot_dir = Some(cache_dir.to_path_buf());
            }
            Some(supervisor.spawn_cache(MaterializedCache::new(
                cache_config,
                broker.clone(),
                LatestField::new(section.routing_field.clone()),
            )))
        }
        None => None,
    };

    if config.router.topics.is_empty() {
        info!("no router topics, fan-out disabled");
    } else {
        supervisor.spawn_router(Router::new(
            RouterConfig {
                group: config.router.group.clone(),
                topics: config.router.topics.clone(),
            },
            broker.clone(),
            RouteResolver::new(config.router.routing_field.clone(), view.clone()),
            fanout.clone(),
        ));
    }

    Ok((supervisor, view))
}

/// Clean up resources on startup failure
fn cleanup_on_failure(paths: &DaemonPaths) {
    for path in [&paths.socket_path, &paths.version_path, &paths.lock_path] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Get the state directory for tidemark
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("TIDEMARK_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = dirs::state_dir() {
        return Ok(dir.join("tidemark"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/tidemark"))
}

/// Get the socket directory for tidemark
///
/// Uses /tmp/tidemark by default to keep paths short (macOS SUN_LEN = 104).
pub fn socket_dir() -> PathBuf {
    std::env::var("TIDEMARK_SOCKET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp/tidemark"))
}

/// Short stable key for a project root
fn project_hash(path: &Path) -> String {
    format!("{:08x}", crc32fast::hash(path.to_string_lossy().as_bytes()))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
