// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record envelope validated at the consumption boundary
//!
//! Log payloads are schema-less JSON objects. The only field the core
//! relies on is `id`; everything else lands in an attribute bag that is
//! inspected defensively (`location`, `status`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised when a payload cannot be turned into a [`Record`]
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no `id` field")]
    MissingId,
    #[error("`id` must be a non-empty string")]
    InvalidId,
}

/// A domain record: a required `id` plus free-form attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Parse raw payload bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let Value::Object(mut attributes) = value else {
            return Err(RecordError::NotAnObject);
        };

        let id = match attributes.remove("id") {
            None | Some(Value::Null) => return Err(RecordError::MissingId),
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(_) => return Err(RecordError::InvalidId),
        };

        Ok(Self { id, attributes })
    }

    /// A string attribute, ignoring missing, non-string, and empty values
    pub fn str_attr(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.str_attr("status")
    }

    pub fn location(&self) -> Option<&str> {
        self.str_attr("location")
    }

    /// The record as a single JSON object (id included)
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.attributes.len() + 1);
        object.insert("id".to_string(), Value::String(self.id.clone()));
        for (name, value) in &self.attributes {
            object.insert(name.clone(), value.clone());
        }
        Value::Object(object)
    }

    /// Overlay this record's attributes on a previously stored value.
    ///
    /// Fields absent from this record keep their previous value. A previous
    /// value that is not an object is replaced outright.
    pub fn merged_over(&self, previous: Option<&Value>) -> Value {
        let mut merged = match previous {
            Some(Value::Object(object)) => object.clone(),
            _ => Map::new(),
        };
        for (name, value) in &self.attributes {
            merged.insert(name.clone(), value.clone());
        }
        merged.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(merged)
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
