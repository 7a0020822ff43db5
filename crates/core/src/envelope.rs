// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messages delivered to subscriber connections
//!
//! Existing clients rely on the `type` tag values `"kafka"` and
//! `"handshake.ack"`; they must not change.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message written to a subscriber connection, one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// A log record routed to the subscriber
    #[serde(rename = "kafka")]
    Log { topic: String, log: Value },

    /// Reply to the subscriber's handshake
    #[serde(rename = "handshake.ack")]
    HandshakeAck {
        ok: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        reasons: Vec<String>,
    },

    /// Reply to a produce request (sent before delivery is confirmed)
    #[serde(rename = "produce.ack")]
    ProduceAck {
        ok: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        reasons: Vec<String>,
    },
}

impl Envelope {
    pub fn handshake_ok() -> Self {
        Envelope::HandshakeAck {
            ok: true,
            reasons: Vec::new(),
        }
    }

    pub fn handshake_rejected(reasons: Vec<String>) -> Self {
        Envelope::HandshakeAck { ok: false, reasons }
    }

    /// Serialize to a single line of JSON (no trailing newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
