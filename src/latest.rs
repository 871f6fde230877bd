//! "Latest value" resolution over a materialized row sequence.
//!
//! State-free: operates on the rows a view hands it, in append order.
//! Scalar mode folds each requested field across rows (optionally
//! deep-merging mapping values); grouped mode takes, per group and per
//! field, the last non-missing value within the group.

use crate::artifact::{Resolved, rehydrate};
use crate::shard::Row;
use crate::table::Table;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

/// Which fields a latest query projects.
#[derive(Debug, Clone)]
enum FieldSelect {
    /// Union of every field name observed across all visible rows.
    All,
    Fields(Vec<String>),
}

/// A latest-value query.
///
/// Defaults: no grouping index, deep merge enabled, groups without any
/// requested value dropped.
///
/// # Examples
///
/// ```
/// use runlog::LatestQuery;
///
/// let by_step = LatestQuery::field("loss").index("step");
/// let shallow = LatestQuery::field("config").deep_merge(false);
/// let everything = LatestQuery::all();
/// ```
#[derive(Debug, Clone)]
pub struct LatestQuery {
    select: FieldSelect,
    index: Vec<String>,
    deep_merge: bool,
    keep_missing: bool,
}

impl LatestQuery {
    /// Query a single field. Scalar mode yields the value directly.
    pub fn field(name: impl Into<String>) -> Self {
        LatestQuery {
            select: FieldSelect::Fields(vec![name.into()]),
            index: Vec::new(),
            deep_merge: true,
            keep_missing: false,
        }
    }

    /// Query several fields. Scalar mode yields a field → value mapping.
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LatestQuery {
            select: FieldSelect::Fields(names.into_iter().map(Into::into).collect()),
            index: Vec::new(),
            deep_merge: true,
            keep_missing: false,
        }
    }

    /// Wildcard: every field observed in the visible rows.
    pub fn all() -> Self {
        LatestQuery {
            select: FieldSelect::All,
            index: Vec::new(),
            deep_merge: true,
            keep_missing: false,
        }
    }

    /// Group rows by this field before resolving. May be called more than
    /// once for a composite key. Switches the result to a table.
    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.index.push(field.into());
        self
    }

    /// Whether mapping values are recursively merged across rows (default)
    /// or replaced wholesale by the latest occurrence.
    pub fn deep_merge(mut self, enabled: bool) -> Self {
        self.deep_merge = enabled;
        self
    }

    /// Keep groups where every requested field is missing (default: drop).
    pub fn keep_missing(mut self, enabled: bool) -> Self {
        self.keep_missing = enabled;
        self
    }
}

/// Result of a latest query.
#[derive(Debug, Clone)]
pub enum LatestResult {
    /// Scalar mode, single requested field. Explicit null if the field was
    /// absent from every row.
    Value(Resolved),
    /// Scalar mode, several requested fields (or wildcard).
    Fields(BTreeMap<String, Resolved>),
    /// Grouped mode.
    Table(Table),
}

impl LatestResult {
    pub fn value(&self) -> Option<&Resolved> {
        match self {
            LatestResult::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Resolved> {
        match self {
            LatestResult::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Resolved> {
        match self {
            LatestResult::Fields(map) => map.get(name),
            _ => None,
        }
    }

    pub fn fields(&self) -> Option<&BTreeMap<String, Resolved>> {
        match self {
            LatestResult::Fields(map) => Some(map),
            _ => None,
        }
    }

    pub fn table(&self) -> Option<&Table> {
        match self {
            LatestResult::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            LatestResult::Table(t) => Some(t),
            _ => None,
        }
    }
}

/// Run a latest query over rows in append order. Artifact markers in scalar
/// results are rehydrated against `root`.
pub(crate) fn resolve(rows: &[Row], query: &LatestQuery, root: &Path) -> LatestResult {
    let single = match &query.select {
        FieldSelect::Fields(names) if names.len() == 1 && query.index.is_empty() => {
            Some(names[0].clone())
        }
        _ => None,
    };

    let fields = match &query.select {
        FieldSelect::All => observed_fields(rows, &query.index),
        FieldSelect::Fields(names) => names.clone(),
    };

    if !query.index.is_empty() {
        return LatestResult::Table(grouped(rows, &fields, &query.index, query.keep_missing));
    }

    let folded = scalar(rows, &fields, query.deep_merge);
    if let Some(name) = single {
        let value = folded.get(&name).cloned().unwrap_or(Value::Null);
        return LatestResult::Value(rehydrate(&value, root));
    }

    LatestResult::Fields(
        fields
            .iter()
            .map(|name| {
                let value = folded.get(name).cloned().unwrap_or(Value::Null);
                (name.clone(), rehydrate(&value, root))
            })
            .collect(),
    )
}

/// Union of field names across rows, in first-observed order, excluding the
/// index fields.
fn observed_fields(rows: &[Row], index: &[String]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for row in rows {
        for name in row.keys() {
            if !index.iter().any(|i| i == name) && !fields.iter().any(|f| f == name) {
                fields.push(name.clone());
            }
        }
    }
    fields
}

fn scalar(rows: &[Row], fields: &[String], deep: bool) -> BTreeMap<String, Value> {
    let mut latest: BTreeMap<String, Value> = BTreeMap::new();
    for row in rows {
        for field in fields {
            // rows that omit the field never reset it
            let Some(value) = row.get(field) else { continue };
            let next = match latest.get(field) {
                Some(acc) if deep => merge_values(acc, value),
                _ => value.clone(),
            };
            latest.insert(field.clone(), next);
        }
    }
    latest
}

/// Recursive union of two values: mappings merge key-by-key with the later
/// occurrence winning at scalar leaves, anything else is replaced by `b`.
pub(crate) fn merge_values(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            let mut out = ma.clone();
            for (k, vb) in mb {
                let merged = match out.get(k) {
                    Some(va) => merge_values(va, vb),
                    None => vb.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Value::Object(out)
        }
        _ => b.clone(),
    }
}

fn grouped(rows: &[Row], fields: &[String], index: &[String], keep_missing: bool) -> Table {
    // An index field absent from every row yields an explicitly empty table.
    for index_field in index {
        if !rows.iter().any(|row| row.contains_key(index_field)) {
            log::debug!("runlog: index field '{index_field}' not present in any row");
            return Table::default();
        }
    }

    // Group rows by composite key, skipping rows with a missing or null key
    // part. Values: last non-missing occurrence per requested field.
    let mut groups: Vec<(Vec<Value>, Vec<Value>)> = Vec::new();
    'rows: for row in rows {
        let mut key = Vec::with_capacity(index.len());
        for index_field in index {
            match row.get(index_field) {
                Some(v) if !v.is_null() => key.push(v.clone()),
                _ => continue 'rows,
            }
        }

        let idx = match groups.iter().position(|(k, _)| *k == key) {
            Some(idx) => idx,
            None => {
                groups.push((key, vec![Value::Null; fields.len()]));
                groups.len() - 1
            }
        };
        for (slot, field) in groups[idx].1.iter_mut().zip(fields) {
            if let Some(v) = row.get(field) {
                if !v.is_null() {
                    *slot = v.clone();
                }
            }
        }
    }

    groups.sort_by(|(a, _), (b, _)| cmp_keys(a, b));

    let mut table = Table::new(index.iter().chain(fields.iter()).map(String::as_str));
    for (key, values) in groups {
        if !keep_missing && values.iter().all(Value::is_null) {
            continue;
        }
        table.add_row(key.into_iter().chain(values));
    }
    table
}

fn cmp_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (va, vb) in a.iter().zip(b) {
        let ord = cmp_value(va, vb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Total order over JSON scalars for stable group ordering: null < bool <
/// number < string < array < object; numbers compare numerically.
fn cmp_value(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let fx = x.as_f64().unwrap_or(f64::NAN);
            let fy = y.as_f64().unwrap_or(f64::NAN);
            fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| {
            // same rank but not comparable above: fall back to serialized text
            a.to_string().cmp(&b.to_string())
        }),
    }
}
