//! Field-keyed validation errors shared by the models.

use std::collections::BTreeMap;

use serde::Serialize;

/// Messages grouped by field name, in insertion order per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Errors {
    fields: BTreeMap<String, Vec<String>>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Messages for `field`; empty when the field has none.
    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str, message: &str) -> bool {
        self.get(field).iter().any(|m| m == message)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.fields.values().flatten().cloned().collect()
    }
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
