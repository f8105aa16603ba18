//! Advisory key/value telemetry written by the scheduler.
//!
//! Nothing in the scheduler reads these values back; a sink is purely an
//! observer.  Keys follow a `<table>/<entry>` layout, e.g. `Arm/.command`
//! or `Scheduler/Names`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

/// One value written to a [`TelemetrySink`].
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryValue {
    String(String),
    Bool(bool),
    StringArray(Vec<String>),
    NumberArray(Vec<f64>),
}

/// Receives observational writes from the scheduler.
pub trait TelemetrySink: Send {
    fn put(&mut self, key: &str, value: TelemetryValue);

    fn put_string(&mut self, key: &str, value: &str) {
        self.put(key, TelemetryValue::String(value.to_string()));
    }

    fn put_bool(&mut self, key: &str, value: bool) {
        self.put(key, TelemetryValue::Bool(value));
    }

    fn put_string_array(&mut self, key: &str, values: &[String]) {
        self.put(key, TelemetryValue::StringArray(values.to_vec()));
    }

    fn put_number_array(&mut self, key: &str, values: &[f64]) {
        self.put(key, TelemetryValue::NumberArray(values.to_vec()));
    }
}

/// Discards every write.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn put(&mut self, _key: &str, _value: TelemetryValue) {}
}

/// Emits every write as a `trace`-level event on the
/// `robocmd::telemetry` target.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn put(&mut self, key: &str, value: TelemetryValue) {
        trace!(target: "robocmd::telemetry", key, value = ?value);
    }
}

#[derive(Default)]
struct MemoryTable {
    latest: HashMap<String, TelemetryValue>,
    history: Vec<(String, TelemetryValue)>,
}

/// In-memory sink that keeps the latest value per key plus the full write
/// history.  Clones share storage.
#[derive(Clone, Default)]
pub struct MemorySink {
    table: Arc<Mutex<MemoryTable>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, MemoryTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Latest value written under `key`.
    pub fn get(&self, key: &str) -> Option<TelemetryValue> {
        self.table().latest.get(key).cloned()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(TelemetryValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(TelemetryValue::Bool(b)) => Some(b),
            _ => None,
        }
    }

    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key) {
            Some(TelemetryValue::StringArray(v)) => Some(v),
            _ => None,
        }
    }

    /// Every value ever written under `key`, oldest first.
    pub fn history(&self, key: &str) -> Vec<TelemetryValue> {
        self.table()
            .history
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn put(&mut self, key: &str, value: TelemetryValue) {
        let mut table = self.table();
        table.history.push((key.to_string(), value.clone()));
        table.latest.insert(key.to_string(), value);
    }
}
