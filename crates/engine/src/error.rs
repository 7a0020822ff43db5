// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the consumption loops

use crate::emitter::SendFailure;
use crate::handler::HandlerError;
use tm_adapters::BrokerError;
use tm_storage::{SnapshotError, StoreError};
use thiserror::Error;

/// Errors that stop a consumer group
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),
    #[error("derived event not sent: {0}")]
    Send(#[from] SendFailure),
    #[error("invalid checkpoint for group {group}: {message}")]
    Checkpoint { group: String, message: String },
}

/// Errors that stop a materialized cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}
