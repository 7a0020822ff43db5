// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory table materialized from WAL replay

use crate::entry::Operation;
use crate::query::{Filter, QueryOptions};
use serde_json::Value;
use std::collections::BTreeMap;

/// Records and metadata in two disjoint namespaces
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Table {
    pub(crate) records: BTreeMap<String, Value>,
    pub(crate) meta: BTreeMap<String, Value>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operation to update the table (last write wins)
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::Put { key, value } => {
                self.records.insert(key.clone(), value.clone());
            }
            Operation::PutMeta { key, value } => {
                self.meta.insert(key.clone(), value.clone());
            }
            Operation::Batch { ops } => {
                for op in ops {
                    self.apply(op);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.records.get(key)
    }

    pub fn get_meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// Linear scan over records, in key order
    pub fn query(&self, filter: &Filter, options: QueryOptions) -> Vec<(String, Value)> {
        self.records
            .iter()
            .filter(|(_, value)| filter.matches(value, options))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn meta_len(&self) -> usize {
        self.meta.len()
    }
}
