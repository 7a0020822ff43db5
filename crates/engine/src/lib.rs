// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Tidemark consumption engine
//!
//! - `consumer`: consumer groups with store-authoritative offset recovery
//! - `cache`: in-memory materialized views folded from the log
//! - `fanout` / `router`: routing-key delivery to live connections
//! - `emitter`: fire-and-forget producer queue
//! - `supervisor`: task ownership and cooperative shutdown

mod cache;
mod consumer;
mod emitter;
mod error;
mod fanout;
mod handler;
mod router;
mod supervisor;

#[cfg(test)]
mod test_support;

pub use cache::{CacheConfig, CacheView, LatestField, MaterializedCache, Reducer};
pub use consumer::{
    checkpoint_key, Checkpoint, GroupConfig, GroupConsumer, GroupHandle, GroupState, GroupStats,
};
pub use emitter::{Emitter, SendFailure};
pub use error::{CacheError, EngineError};
pub use fanout::{
    ChannelListener, Delivery, DeliveryError, FanOut, Listener, DEFAULT_OUTBOUND_QUEUE,
};
pub use handler::{Emit, HandlerError, Outcome, RecordHandler, StatusProjection};
pub use router::{RouteResolver, Router, RouterConfig};
pub use supervisor::Supervisor;
