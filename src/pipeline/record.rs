// In: src/pipeline/record.rs

//! The unit of data that flows through pipeline links.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single named measurement.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Reading {
    pub name: String,
    pub value: f64,
}

impl Reading {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One sample produced by a source and enriched by downstream stages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Monotonic sequence number assigned by the producing source.
    pub sequence: u64,
    /// Time since the producing source observed the `Started` phase.
    pub elapsed: Duration,
    pub readings: Vec<Reading>,
    /// Free-form annotations added along the pipeline.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Record {
    pub fn new(sequence: u64, elapsed: Duration) -> Self {
        Self {
            sequence,
            elapsed,
            readings: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_reading(mut self, name: impl Into<String>, value: f64) -> Self {
        self.readings.push(Reading::new(name, value));
        self
    }

    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn reading(&self, name: &str) -> Option<f64> {
        self.readings
            .iter()
            .find(|reading| reading.name == name)
            .map(|reading| reading.value)
    }
}
