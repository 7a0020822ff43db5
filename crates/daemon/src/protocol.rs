// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for subscriber connections
//!
//! Newline-delimited JSON in both directions. The first client line is the
//! handshake (`{"location": "..."}`); every later line is a
//! [`ClientMessage`]. Server lines are [`Envelope`]s.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tm_core::{Envelope, RoutingKey};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines};

/// Default time a client has to send its handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors on the connection itself (not rejected requests)
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timed out waiting for the client")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,
}

/// Messages a client may send after its handshake
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Append `value` to `topic` through the daemon's producer
    Produce {
        topic: String,
        #[serde(default)]
        key: Option<String>,
        value: Value,
    },
}

#[derive(Deserialize)]
struct Handshake {
    #[serde(default)]
    location: Option<Value>,
}

/// Validate a handshake line into the connection's routing key
///
/// On rejection, returns the reasons to send back in the ack.
pub fn parse_handshake(line: &str) -> Result<RoutingKey, Vec<String>> {
    let handshake: Handshake = serde_json::from_str(line)
        .map_err(|e| vec![format!("handshake is not a JSON object: {}", e)])?;

    match handshake.location {
        None | Some(Value::Null) => Err(vec!["location is required".to_string()]),
        Some(Value::String(raw)) => {
            RoutingKey::new(&raw).ok_or_else(|| vec!["location must not be blank".to_string()])
        }
        Some(_) => Err(vec!["location must be a string".to_string()]),
    }
}

/// Parse a post-handshake line
pub fn parse_message(line: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(line)?)
}

/// Read the next non-blank line, optionally bounded by `timeout`
pub async fn read_line<R>(
    lines: &mut Lines<R>,
    timeout: Option<Duration>,
) -> Result<String, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let next = match timeout {
            Some(limit) => tokio::time::timeout(limit, lines.next_line())
                .await
                .map_err(|_| ProtocolError::Timeout)??,
            None => lines.next_line().await?,
        };
        match next {
            None => return Err(ProtocolError::ConnectionClosed),
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(line),
        }
    }
}

/// Write one already-encoded line
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut framed = Vec::with_capacity(line.len() + 1);
    framed.extend_from_slice(line.as_bytes());
    framed.push(b'\n');
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_line(writer, &envelope.to_line()?).await
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
