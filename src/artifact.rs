//! Content-addressed artifact storage and marker rehydration.
//!
//! Files and tables are stored once per content hash under
//! `artifacts/<hash>/<filename>`. Rows reference them through a fixed-shape
//! marker object; an explicit discriminator key distinguishes markers from
//! user data that legitimately contains `path`/`hash`/`filename` keys.

use crate::error::{Error, Result};
use crate::table::Table;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Reserved discriminator key set by the encoder on every artifact marker.
pub const ARTIFACT_KIND_KEY: &str = "__artifact__";

const KIND_FILE: &str = "file";
const KIND_TABLE: &str = "table";
const TABLE_FILENAME: &str = "table.csv";
const ARTIFACTS_DIR: &str = "artifacts";

/// Writes blobs and tables into the content-addressed store under one root.
#[derive(Debug, Clone)]
pub(crate) struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactStore { root: root.into() }
    }

    /// Store a local file by content hash and return its marker.
    ///
    /// Destination is `artifacts/<hash>/<basename>`. If the destination
    /// already exists the copy is skipped — logging the same bytes twice
    /// (even from different source paths) stores exactly one copy.
    pub(crate) fn store_file(&self, src: &Path) -> Result<Value> {
        let bytes = match fs::read(src) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NoSuchFile {
                    path: src.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let hash = content_hash(&bytes);
        let filename = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| hash.clone());

        let dest_dir = self.root.join(ARTIFACTS_DIR).join(&hash);
        let dest = dest_dir.join(&filename);
        if !dest.exists() {
            fs::create_dir_all(&dest_dir)?;
            fs::copy(src, &dest)?;
        }

        let rel_path = format!("{ARTIFACTS_DIR}/{hash}/{filename}");
        Ok(json!({
            ARTIFACT_KIND_KEY: KIND_FILE,
            "src": src.to_string_lossy(),
            "path": rel_path,
            "hash": hash,
            "filename": filename,
        }))
    }

    /// Store a table as CSV by the hash of its canonical byte serialization.
    ///
    /// Destination is `artifacts/<hash>/table.csv`, written at most once per
    /// distinct hash. The filename inside a hash directory is fixed, so two
    /// different tables colliding on the hash would retain only the first
    /// write — accepted and documented, not worked around.
    pub(crate) fn store_table(&self, table: &Table) -> Result<Value> {
        let hash = content_hash(&table.canonical_bytes()?);
        let dest_dir = self.root.join(ARTIFACTS_DIR).join(&hash);
        let dest = dest_dir.join(TABLE_FILENAME);
        if !dest.exists() {
            fs::create_dir_all(&dest_dir)?;
            fs::write(&dest, table.to_csv())?;
        }

        let rel_path = format!("{ARTIFACTS_DIR}/{hash}/{TABLE_FILENAME}");
        Ok(json!({
            ARTIFACT_KIND_KEY: KIND_TABLE,
            "path": rel_path,
            "hash": hash,
            "filename": TABLE_FILENAME,
        }))
    }
}

/// Hex-encoded sha256 of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn marker_kind(map: &Map<String, Value>) -> Option<&str> {
    let kind = map.get(ARTIFACT_KIND_KEY)?.as_str()?;
    // A marker always carries the full fixed shape.
    if map.get("path").is_some() && map.get("hash").is_some() && map.get("filename").is_some() {
        Some(kind)
    } else {
        None
    }
}

/// A resolved value tree: plain JSON with artifact markers replaced by
/// handles bound to the storage root.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// A scalar leaf (null, bool, number or string).
    Value(Value),
    List(Vec<Resolved>),
    Map(BTreeMap<String, Resolved>),
    File(FileHandle),
    Table(TableHandle),
}

impl Resolved {
    pub fn is_null(&self) -> bool {
        matches!(self, Resolved::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileHandle> {
        match self {
            Resolved::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableHandle> {
        match self {
            Resolved::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Key lookup for map-shaped values.
    pub fn get(&self, key: &str) -> Option<&Resolved> {
        match self {
            Resolved::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Convert back to plain JSON, turning handles back into marker objects.
    pub fn to_json(&self) -> Value {
        match self {
            Resolved::Value(v) => v.clone(),
            Resolved::List(items) => Value::Array(items.iter().map(Resolved::to_json).collect()),
            Resolved::Map(m) => {
                Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            Resolved::File(f) => f.marker.clone(),
            Resolved::Table(t) => t.file.marker.clone(),
        }
    }
}

impl PartialEq<Value> for Resolved {
    fn eq(&self, other: &Value) -> bool {
        self.to_json() == *other
    }
}

/// Handle to a stored file artifact, bound to a storage root.
#[derive(Debug, Clone)]
pub struct FileHandle {
    root: PathBuf,
    marker: Value,
    rel_path: String,
    hash: String,
    filename: String,
}

impl FileHandle {
    /// Absolute path of the artifact under the storage root.
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.rel_path)
    }

    /// Content hash recorded at store time.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Original source path, if the artifact came from a local file.
    pub fn src(&self) -> Option<&str> {
        self.marker.get("src").and_then(Value::as_str)
    }

    /// Read the artifact's bytes.
    pub fn read(&self) -> Result<Vec<u8>> {
        let path = self.path();
        match fs::read(&path) {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::MissingArtifact { path })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Handle to a stored table artifact.
#[derive(Debug, Clone)]
pub struct TableHandle {
    file: FileHandle,
}

impl TableHandle {
    pub fn path(&self) -> PathBuf {
        self.file.path()
    }

    pub fn hash(&self) -> &str {
        self.file.hash()
    }

    /// Load the table back from its CSV artifact.
    ///
    /// The table must already have been durably stored; asking before that
    /// point is a usage error, not a silent empty result.
    pub fn as_table(&self) -> Result<Table> {
        let path = self.file.path();
        if !path.exists() {
            return Err(Error::ArtifactNotStored {
                hash: self.file.hash.clone(),
            });
        }
        let text = fs::read_to_string(&path)?;
        Ok(Table::from_csv(&text))
    }
}

/// Recursively convert marker objects inside `value` into handles bound to
/// `root`. Non-marker values pass through structurally unchanged.
pub(crate) fn rehydrate(value: &Value, root: &Path) -> Resolved {
    match value {
        Value::Object(map) => match marker_kind(map) {
            Some(kind) => {
                let handle = FileHandle {
                    root: root.to_path_buf(),
                    marker: value.clone(),
                    rel_path: map
                        .get("path")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    hash: map
                        .get("hash")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    filename: map
                        .get("filename")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                };
                if kind == KIND_TABLE {
                    Resolved::Table(TableHandle { file: handle })
                } else {
                    Resolved::File(handle)
                }
            }
            None => Resolved::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), rehydrate(v, root)))
                    .collect(),
            ),
        },
        Value::Array(items) => Resolved::List(items.iter().map(|v| rehydrate(v, root)).collect()),
        other => Resolved::Value(other.clone()),
    }
}
