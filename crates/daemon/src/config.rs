// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tidemark.toml` project configuration
//!
//! Every field has a default, so an absent file or section runs the daemon
//! with an empty topology: a store, a broker and the socket.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use tm_engine::DEFAULT_OUTBOUND_QUEUE;

use crate::protocol::DEFAULT_HANDSHAKE_TIMEOUT;

/// File name looked up in the project root
pub const CONFIG_FILE: &str = "tidemark.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TidemarkConfig {
    pub store: StoreSection,
    pub broker: BrokerSection,
    pub groups: Vec<GroupSection>,
    pub cache: Option<CacheSection>,
    pub router: RouterSection,
    pub server: ServerSection,
}

impl TidemarkConfig {
    /// Load `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// The router looks records up in the cache by the field the cache
    /// keeps, so the two must agree
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(cache) = &self.cache {
            if cache.routing_field != self.router.routing_field {
                return Err(ConfigError::Invalid(format!(
                    "cache.routing_field {:?} does not match router.routing_field {:?}",
                    cache.routing_field, self.router.routing_field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    /// WAL appends between automatic compactions; 0 disables
    pub compaction_threshold: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            compaction_threshold: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerSection {
    pub partitions: u32,
    pub auto_create_topics: bool,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            partitions: 1,
            auto_create_topics: true,
        }
    }
}

/// One `[[groups]]` entry, run with the status projection
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSection {
    pub name: String,
    pub topics: Vec<String>,
    /// Where status changes are emitted; none means store-only
    #[serde(default)]
    pub output_topic: Option<String>,
    #[serde(default = "default_true")]
    pub from_beginning: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub name: String,
    pub topics: Vec<String>,
    pub routing_field: String,
    pub snapshot: bool,
    pub snapshot_every: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            name: "routing".to_string(),
            topics: Vec::new(),
            routing_field: default_routing_field(),
            snapshot: true,
            snapshot_every: 1_000,
        }
    }
}

/// The router runs only when it has topics
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterSection {
    pub group: String,
    pub topics: Vec<String>,
    pub routing_field: String,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            group: "router".to_string(),
            topics: Vec::new(),
            routing_field: default_routing_field(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
    /// Lines a subscriber may fall behind before it is dropped
    pub outbound_queue: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_routing_field() -> String {
    "location".to_string()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
