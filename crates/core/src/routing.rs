// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Case-folded routing keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized routing key (e.g. a location name)
///
/// Keys are lower-cased on construction so that `"Austin"` and `"austin"`
/// address the same subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Normalize a raw key; blank keys are rejected
    pub fn new(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self(raw.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        capitalized = { "Austin", "austin" },
        upper = { "AUSTIN", "austin" },
        lower = { "austin", "austin" },
        spaced = { "New York", "new york" },
    )]
    fn folds_case(raw: &str, expected: &str) {
        assert_eq!(RoutingKey::new(raw).unwrap().as_str(), expected);
    }

    #[test]
    fn differently_cased_keys_are_equal() {
        assert_eq!(RoutingKey::new("Austin"), RoutingKey::new("aUSTIN"));
    }

    #[parameterized(
        empty = { "" },
        whitespace = { "   " },
    )]
    fn rejects_blank(raw: &str) {
        assert!(RoutingKey::new(raw).is_none());
    }
}
