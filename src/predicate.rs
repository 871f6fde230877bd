//! Field predicates and their context-level / row-level split.
//!
//! A view is scoped by a conjunction of per-field predicates. For each source
//! the predicates decidable from the source's context are applied once; the
//! rest are deferred to row evaluation. A predicate that fails while being
//! applied rejects the candidate and is reported as a diagnostic, never
//! propagated.

use crate::context::Context;
use crate::error::Result;
use crate::shard::Row;
use log::warn;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type PredicateFn = Arc<dyn Fn(&Value) -> Result<bool> + Send + Sync>;

/// A predicate over one field's value.
#[derive(Clone)]
pub enum Predicate {
    /// Field equals the given value. An absent field never matches.
    Equals(Value),
    /// Arbitrary test. Receives `Value::Null` for an absent field; an `Err`
    /// counts as a rejection.
    Test(PredicateFn),
}

impl Predicate {
    pub fn equals(value: impl Into<Value>) -> Self {
        Predicate::Equals(value.into())
    }

    pub fn test<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<bool> + Send + Sync + 'static,
    {
        Predicate::Test(Arc::new(f))
    }

    fn accepts(&self, field: &str, value: Option<&Value>) -> bool {
        match self {
            Predicate::Equals(expected) => value == Some(expected),
            Predicate::Test(f) => match f(value.unwrap_or(&Value::Null)) {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!("runlog: predicate on field '{field}' failed, rejecting: {e}");
                    false
                }
            },
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Predicate::Test(_) => f.write_str("Test(..)"),
        }
    }
}

/// A conjunction of per-field predicates.
#[derive(Clone, Debug, Default)]
pub struct PredicateMap {
    predicates: Vec<(String, Predicate)>,
}

impl PredicateMap {
    pub fn new() -> Self {
        PredicateMap::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.predicates.push((field.into(), predicate));
        self
    }

    /// Equality predicates for every field of the given context.
    pub fn equals_all(fields: &Context) -> Self {
        let mut map = PredicateMap::new();
        for (k, v) in fields.iter() {
            map.predicates
                .push((k.clone(), Predicate::Equals(v.clone())));
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Split against a source's context: predicates whose field appears in
    /// the context are evaluated once, the rest are deferred to rows.
    ///
    /// Returns `None` if any context-decidable predicate rejects, otherwise
    /// the residual row-level map. A field that is context-level on one
    /// source may be row-level on another; the split is per source.
    pub(crate) fn split(&self, context: &Context) -> Option<PredicateMap> {
        let mut residual = PredicateMap::new();
        for (field, predicate) in &self.predicates {
            match context.get(field) {
                Some(value) => {
                    if !predicate.accepts(field, Some(value)) {
                        return None;
                    }
                }
                None => residual.predicates.push((field.clone(), predicate.clone())),
            }
        }
        Some(residual)
    }

    /// Evaluate every predicate against a materialized row.
    pub(crate) fn accepts_row(&self, row: &Row) -> bool {
        self.predicates
            .iter()
            .all(|(field, predicate)| predicate.accepts(field, row.get(field)))
    }

    /// Conjunction of two predicate maps.
    pub(crate) fn and(&self, other: &PredicateMap) -> PredicateMap {
        let mut combined = self.clone();
        combined
            .predicates
            .extend(other.predicates.iter().cloned());
        combined
    }
}
