// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owns the consumption tasks and their shutdown

use crate::cache::{CacheView, MaterializedCache, Reducer};
use crate::consumer::{GroupConsumer, GroupHandle, GroupState};
use crate::handler::RecordHandler;
use crate::router::Router;
use tm_adapters::Broker;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawns groups, caches and routers, and stops them together
pub struct Supervisor {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
    groups: Vec<GroupHandle>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Start a consumer group; its state stays observable through the handle
    pub fn spawn_group<B: Broker, H: RecordHandler>(
        &mut self,
        group: GroupConsumer<B, H>,
    ) -> GroupHandle {
        let handle = group.handle();
        let name = format!("group:{}", group.name());
        let shutdown = self.shutdown.subscribe();
        let task = tokio::spawn(async move {
            // The group logs its own failure; the state is kept in the handle
            group.run(shutdown).await;
        });
        self.tasks.push((name, task));
        self.groups.push(handle.clone());
        handle
    }

    pub fn spawn_cache<B: Broker, R: Reducer>(&mut self, cache: MaterializedCache<B, R>) -> CacheView {
        let view = cache.view();
        let name = cache.name().to_string();
        let shutdown = self.shutdown.subscribe();
        let cache_name = name.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = cache.run(shutdown).await {
                tracing::error!(cache = %cache_name, error = %e, "cache failed");
            }
        });
        self.tasks.push((format!("cache:{}", name), task));
        view
    }

    pub fn spawn_router<B: Broker>(&mut self, router: Router<B>) {
        let shutdown = self.shutdown.subscribe();
        let task = tokio::spawn(async move {
            if let Err(e) = router.run(shutdown).await {
                tracing::error!(error = %e, "router failed");
            }
        });
        self.tasks.push(("router".to_string(), task));
    }

    /// Current state of every group, in spawn order
    pub fn group_states(&self) -> Vec<(String, GroupState)> {
        self.groups
            .iter()
            .map(|g| (g.name.clone(), g.current()))
            .collect()
    }

    pub fn group(&self, name: &str) -> Option<&GroupHandle> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Signal every task and wait for them to finish their in-flight record
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(task = %name, error = %e, "task panicked");
            }
        }
        tracing::info!("supervisor stopped");
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
