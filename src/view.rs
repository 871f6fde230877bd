//! Composable, filtered read/write handles over sources.

use crate::artifact::Resolved;
use crate::context::{Context, RUN_ID_FIELD};
use crate::encode::{Record, encode_record};
use crate::error::Result;
use crate::latest::{self, LatestQuery, LatestResult};
use crate::predicate::PredicateMap;
use crate::registry::SharedSource;
use crate::shard::Row;
use crate::store::Shared;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A context field whose value is computed at log time rather than fixed at
/// init. Logged fields always override the computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DynamicField {
    /// The view's own current latest `step`, so metric-only rows attribute
    /// to the step that was last logged.
    Step,
    /// Current wall-clock time, ISO-8601.
    Timestamp,
}

#[derive(Clone)]
struct ScopeEntry {
    fingerprint: String,
    source: SharedSource,
    /// Predicates not decidable from this source's context, applied per row.
    residual: PredicateMap,
}

pub(crate) struct ViewInner {
    shared: Arc<Shared>,
    write_context: Context,
    write_source: SharedSource,
    /// Full accumulated predicate conjunction, used to judge sources that
    /// appear after this view was created.
    predicates: PredicateMap,
    dynamics: Vec<DynamicField>,
    /// Sources this view can see, each paired with its residual row filter.
    /// Extended in place when fan-out or reload offers a matching source.
    scope: Mutex<Vec<ScopeEntry>>,
    closed: AtomicBool,
}

impl ViewInner {
    /// Fan-out entry point: a row was appended to `source`, or `source` was
    /// discovered by a reload. If the source already belongs to this view's
    /// scope nothing happens — its rows are visible through the source
    /// itself. Otherwise the source joins the scope when the view's
    /// context-level predicates accept its context.
    pub(crate) fn observe_source(
        &self,
        fingerprint: &str,
        context: &Context,
        source: &SharedSource,
    ) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let mut scope = self.scope.lock();
        if scope.iter().any(|e| e.fingerprint == fingerprint) {
            return;
        }
        if let Some(residual) = self.predicates.split(context) {
            scope.push(ScopeEntry {
                fingerprint: fingerprint.to_string(),
                source: source.clone(),
                residual,
            });
        }
    }
}

/// A filtered handle over one or more sources plus its own write target.
///
/// Views are created by [`Store::init`](crate::Store::init),
/// [`Store::get`](crate::Store::get) or [`View::filter`]; filtering returns a
/// new independent view and never mutates the parent. A live view
/// automatically observes rows logged by any sibling view in the same
/// process whose context matches its predicates.
pub struct View {
    inner: Arc<ViewInner>,
}

impl View {
    pub(crate) fn build(
        shared: &Arc<Shared>,
        write_context: Context,
        predicates: PredicateMap,
        dynamics: Vec<DynamicField>,
    ) -> Result<View> {
        let mut registry = shared.registry.lock();
        let write_source = registry.resolve(&write_context)?;
        let all_sources = registry.scan()?;
        drop(registry);

        let mut scope = Vec::new();
        for source in all_sources {
            let guard = source.lock();
            if let Some(residual) = predicates.split(guard.context()) {
                scope.push(ScopeEntry {
                    fingerprint: guard.fingerprint().to_string(),
                    source: source.clone(),
                    residual,
                });
            }
        }

        let inner = Arc::new(ViewInner {
            shared: shared.clone(),
            write_context,
            write_source,
            predicates,
            dynamics,
            scope: Mutex::new(scope),
            closed: AtomicBool::new(false),
        });
        shared.register(&inner);
        Ok(View { inner })
    }

    /// The context this view's own writes are logged under.
    pub fn context(&self) -> &Context {
        &self.inner.write_context
    }

    /// The run identity field of the write context, if present.
    pub fn run_id(&self) -> Option<&str> {
        self.inner
            .write_context
            .get(RUN_ID_FIELD)
            .and_then(Value::as_str)
    }

    /// Log a record under this view's context.
    ///
    /// Dynamic context fields are evaluated first (current latest `step`,
    /// timestamp), then the record's fields are encoded — files and tables
    /// become content-addressed artifact markers — and merged over them. The
    /// encoded row is appended to this view's own source (memory only until
    /// flush) and offered to every other live view in the process. Returns
    /// the row as committed.
    pub fn log(&self, record: impl Into<Record>) -> Result<Row> {
        let record = record.into();
        let mut row = Row::new();
        for dynamic in &self.inner.dynamics {
            match dynamic {
                DynamicField::Step => {
                    if let Some(step) = self.current_step() {
                        row.insert("step".to_string(), step);
                    }
                }
                DynamicField::Timestamp => {
                    row.insert(
                        "timestamp".to_string(),
                        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
                    );
                }
            }
        }

        let encoded = encode_record(&record, self.inner.shared.artifacts())?;
        for (name, value) in encoded {
            row.insert(name, value);
        }

        self.inner.write_source.lock().append(row.clone());
        self.inner
            .shared
            .offer(Some(&self.inner), &self.inner.write_source);
        Ok(row)
    }

    /// Narrow this view with additional per-field predicates.
    ///
    /// For each visible source, predicates decidable from the source's
    /// context are applied once; the rest join that source's row-level
    /// residual. The new view's write context is the parent's. The parent is
    /// unchanged.
    pub fn filter(&self, predicates: PredicateMap) -> Result<View> {
        self.filter_with(predicates, Context::new())
    }

    /// Like [`View::filter`], additionally merging `context_overrides` into
    /// the new view's write context.
    pub fn filter_with(
        &self,
        predicates: PredicateMap,
        context_overrides: Context,
    ) -> Result<View> {
        let shared = &self.inner.shared;
        let write_context = self.inner.write_context.merged(&context_overrides);
        let write_source = shared.registry.lock().resolve(&write_context)?;

        let parent_scope: Vec<ScopeEntry> = self.inner.scope.lock().clone();
        let mut scope = Vec::new();
        for entry in parent_scope {
            let residual = {
                let guard = entry.source.lock();
                predicates.split(guard.context())
            };
            if let Some(residual) = residual {
                scope.push(ScopeEntry {
                    fingerprint: entry.fingerprint,
                    source: entry.source,
                    residual: entry.residual.and(&residual),
                });
            }
        }

        let inner = Arc::new(ViewInner {
            shared: shared.clone(),
            write_context,
            write_source,
            predicates: self.inner.predicates.and(&predicates),
            dynamics: self.inner.dynamics.clone(),
            scope: Mutex::new(scope),
            closed: AtomicBool::new(false),
        });
        // A context override may point at a source the parent never scoped;
        // the new view still only sees its own writes if they pass its
        // predicates.
        let own = inner.write_source.clone();
        let (fingerprint, context) = {
            let guard = own.lock();
            (guard.fingerprint().to_string(), guard.context().clone())
        };
        inner.observe_source(&fingerprint, &context, &own);
        shared.register(&inner);
        Ok(View { inner })
    }

    /// Equality-filter sugar: every given field must equal the given value.
    pub fn get(&self, fields: Context) -> Result<View> {
        self.filter(PredicateMap::equals_all(&fields))
    }

    /// Materialize every row this view can see: for each scoped source, the
    /// source's rows (persisted and buffered) merged under its context and
    /// passing the residual row filter. Within one source append order is
    /// preserved; ordering across sources is unspecified.
    pub fn rows(&self) -> Vec<Row> {
        let scope: Vec<ScopeEntry> = self.inner.scope.lock().clone();
        let mut out = Vec::new();
        for entry in &scope {
            let source = entry.source.lock();
            let context = source.context().clone();
            for row in source.rows() {
                let merged = merge_under_context(&context, row);
                if entry.residual.accepts_row(&merged) {
                    out.push(merged);
                }
            }
        }
        out
    }

    /// Resolve a latest-value query over this view's visible rows.
    pub fn latest(&self, query: &LatestQuery) -> LatestResult {
        let rows = self.rows();
        latest::resolve(&rows, query, self.inner.shared.root())
    }

    /// Single-field convenience for `latest(&LatestQuery::field(name))`.
    pub fn latest_value(&self, field: &str) -> Resolved {
        match self.latest(&LatestQuery::field(field)) {
            LatestResult::Value(v) => v,
            // a single field without an index always resolves to a value
            _ => Resolved::Value(Value::Null),
        }
    }

    /// Deregister from fan-out. The view stops observing newly logged rows;
    /// already-scoped sources remain readable.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
        self.inner.shared.deregister(&self.inner);
    }

    fn current_step(&self) -> Option<Value> {
        // latest 'step' over the view's visible rows; scalars replace, so the
        // last non-null occurrence is the latest value
        self.rows()
            .iter()
            .rev()
            .find_map(|row| row.get("step").filter(|v| !v.is_null()).cloned())
    }
}

/// A materialized row: the source's context fields with the stored row's
/// fields merged over them.
fn merge_under_context(context: &Context, row: &Row) -> Row {
    let mut merged: Row = context
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (k, v) in row {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

pub(crate) fn dynamic_defaults() -> Vec<DynamicField> {
    vec![DynamicField::Step, DynamicField::Timestamp]
}
