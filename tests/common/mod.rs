#![allow(dead_code)]

use runlog::{Context, Store};
use serde_json::Value;
use tempfile::TempDir;

/// A store over a fresh temporary root. Keep the `TempDir` alive for the
/// duration of the test.
pub fn temp_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

pub fn run_context(run_id: &str) -> Context {
    Context::new().with("run_id", run_id)
}

/// Extract one field from every row, in order, for assertions.
pub fn column(rows: &[runlog::Row], field: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}
