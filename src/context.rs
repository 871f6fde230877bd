use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field that identifies a run. Auto-assigned by [`Store::init`](crate::Store::init)
/// when the caller does not provide one.
pub const RUN_ID_FIELD: &str = "run_id";

/// An immutable set of scalar fields identifying a logical run.
///
/// Two log calls whose explicit context fields and values are equal share one
/// [`Source`](crate::Source). Identity is a stable hash over the canonical
/// (sorted-key) JSON serialization — the backing map is a `BTreeMap`, so
/// serializing it is already canonical.
///
/// # Examples
///
/// ```
/// use runlog::Context;
/// use serde_json::json;
///
/// let a = Context::new().with("run_id", "exp-1").with("lr", 0.01);
/// let b = Context::new().with("lr", 0.01).with("run_id", "exp-1");
/// assert_eq!(a.fingerprint(), b.fingerprint());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    fields: BTreeMap<String, Value>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Context::default()
    }

    /// Builder-style field insertion. Later calls with the same key overwrite.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Returns a new context with `overrides` upserted over this one.
    /// `self` is not modified — contexts are immutable once a source owns them.
    pub fn merged(&self, overrides: &Context) -> Context {
        let mut fields = self.fields.clone();
        for (k, v) in &overrides.fields {
            fields.insert(k.clone(), v.clone());
        }
        Context { fields }
    }

    /// Canonical byte serialization (sorted keys, compact JSON).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // BTreeMap keys are sorted; a map of JSON scalars cannot fail to serialize.
        serde_json::to_vec(&self.fields).unwrap_or_default()
    }

    /// Stable fingerprint of the canonical serialization, used as the shard
    /// filename stem. Hex-encoded xxh64, 16 characters.
    pub fn fingerprint(&self) -> String {
        let hash = xxhash_rust::xxh64::xxh64(&self.canonical_bytes(), 0);
        format!("{hash:016x}")
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = Context::new();
        for (k, v) in iter {
            ctx.insert(k, v);
        }
        ctx
    }
}
