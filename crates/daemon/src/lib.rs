// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tm-daemon: the Tidemark daemon (`tmd`)
//!
//! Hosts the store, the embedded broker and the consumption engine for one
//! project, and serves subscribers over a Unix socket.

pub mod config;
pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use config::{ConfigError, TidemarkConfig};
pub use lifecycle::{startup, DaemonPaths, DaemonState, LifecycleError};
pub use server::{handle_connection, ServerContext, ServerError};
