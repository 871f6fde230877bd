//! Encoding of logged values at the storage boundary.
//!
//! A logged value is one of a closed set of encodable kinds, inspected once
//! at the boundary: plain JSON passes through, files and tables become
//! content-addressed artifact markers, containers recurse field by field.
//! Pluggable encoders for exotic types live outside this crate; callers
//! convert such values to one of these kinds before logging.

use crate::artifact::ArtifactStore;
use crate::error::Result;
use crate::shard::Row;
use crate::table::Table;
use log::warn;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One encodable value.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Any JSON-compatible value, stored as-is.
    Json(Value),
    /// A local file, copied into the artifact store at log time.
    File(PathBuf),
    /// A table, persisted as a CSV artifact at log time.
    Table(Table),
    /// A mapping whose values are encoded recursively.
    Map(BTreeMap<String, Payload>),
    /// A sequence whose items are encoded recursively.
    List(Vec<Payload>),
}

impl Payload {
    /// A file payload from a local path.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Payload::File(path.into())
    }

    /// Encode any `Serialize` value as a JSON payload.
    pub fn from_serialize<T: serde::Serialize>(value: &T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

impl From<Table> for Payload {
    fn from(t: Table) -> Self {
        Payload::Table(t)
    }
}

/// The fields of one log call, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, Payload)>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Builder-style field insertion.
    pub fn field(mut self, name: impl Into<String>, payload: impl Into<Payload>) -> Self {
        self.fields.push((name.into(), payload.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &(String, Payload)> {
        self.fields.iter()
    }
}

/// A JSON object converts field-by-field. A non-object value has no field
/// names to log under, so it converts to an empty record with a diagnostic;
/// wrap scalars in an object or use [`Record::field`] directly.
impl From<Value> for Record {
    fn from(value: Value) -> Self {
        let mut record = Record::new();
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    record = record.field(k, v);
                }
            }
            other => warn!("runlog: discarding non-object log value: {other}"),
        }
        record
    }
}

/// Encode one payload, storing any file/table leaves as artifacts.
pub(crate) fn encode_payload(payload: &Payload, store: &ArtifactStore) -> Result<Value> {
    match payload {
        Payload::Json(v) => Ok(v.clone()),
        Payload::File(path) => store.store_file(path),
        Payload::Table(table) => store.store_table(table),
        Payload::Map(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), encode_payload(v, store)?);
            }
            Ok(Value::Object(out))
        }
        Payload::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encode_payload(item, store)?);
            }
            Ok(Value::Array(out))
        }
    }
}

/// Encode a whole record into a flat row.
pub(crate) fn encode_record(record: &Record, store: &ArtifactStore) -> Result<Row> {
    let mut row = Row::new();
    for (name, payload) in record.iter() {
        row.insert(name.clone(), encode_payload(payload, store)?);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn json_object_converts_to_record() {
        let record: Record = json!({"step": 1, "loss": 4.2}).into();
        let names: Vec<_> = record.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["loss", "step"]); // serde_json maps sort keys
    }

    #[test]
    fn non_object_value_converts_to_empty_record() {
        let record: Record = json!(5).into();
        assert!(record.is_empty());
        let record: Record = json!(["a", "b"]).into();
        assert!(record.is_empty());
    }

    #[test]
    fn nested_file_payload_becomes_marker() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let src = dir.path().join("weights.bin");
        std::fs::write(&src, [1u8, 2, 3]).unwrap();

        let payload = Payload::Map(BTreeMap::from([(
            "checkpoint".to_string(),
            Payload::file(&src),
        )]));
        let encoded = encode_payload(&payload, &store).unwrap();
        let marker = &encoded["checkpoint"];
        assert_eq!(marker[crate::artifact::ARTIFACT_KIND_KEY], "file");
        assert_eq!(marker["filename"], "weights.bin");
    }
}
