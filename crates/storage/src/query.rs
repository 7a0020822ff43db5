// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Field-equality filters for table scans

use serde_json::{Map, Value};

/// Options applied to every field comparison of a query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Compare string fields without regard to case
    pub case_insensitive: bool,
}

/// Expected field values; an entry matches when every field is equal.
///
/// An empty filter matches every entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Map<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check a stored value against the filter
    pub fn matches(&self, value: &Value, options: QueryOptions) -> bool {
        if self.fields.is_empty() {
            return true;
        }
        let Value::Object(object) = value else {
            return false;
        };

        self.fields.iter().all(|(field, expected)| {
            object
                .get(field)
                .is_some_and(|actual| field_eq(actual, expected, options))
        })
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

fn field_eq(actual: &Value, expected: &Value, options: QueryOptions) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(e)) if options.case_insensitive => {
            a.to_lowercase() == e.to_lowercase()
        }
        _ => actual == expected,
    }
}
