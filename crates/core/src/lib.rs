// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tm-core: shared vocabulary for Tidemark
//!
//! This crate provides:
//! - `Record`, the typed envelope every log payload is validated into
//! - `LogRecord` and `TopicPartition`, the broker's view of a record
//! - `RoutingKey`, the case-folded key used by fan-out
//! - `Envelope`, the JSON messages delivered to subscribers
//! - Connection id generation

pub mod envelope;
pub mod id;
pub mod log;
pub mod record;
pub mod routing;

pub use envelope::Envelope;
pub use id::{ConnectionId, IdGen, SequentialIdGen, UuidIdGen};
pub use log::{LogRecord, TopicPartition};
pub use record::{Record, RecordError};
pub use routing::RoutingKey;
