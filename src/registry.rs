//! Process-wide registry of live sources, keyed by context fingerprint.

use crate::context::Context;
use crate::error::Result;
use crate::shard;
use crate::source::Source;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A source shared between the registry and every view scoped to it.
pub(crate) type SharedSource = Arc<Mutex<Source>>;

/// Maps a context fingerprint to its source, lazily materializing from disk
/// or memory.
#[derive(Debug)]
pub(crate) struct Registry {
    root: PathBuf,
    sources: BTreeMap<String, SharedSource>,
}

impl Registry {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Registry {
            root: root.into(),
            sources: BTreeMap::new(),
        }
    }

    /// The source for a context, creating one (marked needs-persist) if the
    /// fingerprint has never been seen in memory or on disk.
    ///
    /// Idempotent: equal contexts resolve to the same `Arc` within a process.
    pub(crate) fn resolve(&mut self, context: &Context) -> Result<SharedSource> {
        let fingerprint = context.fingerprint();
        if let Some(source) = self.sources.get(&fingerprint) {
            return Ok(source.clone());
        }
        let source = match Source::load(&self.root, &fingerprint)? {
            Some(source) => source,
            None => Source::new(context.clone()),
        };
        let shared = Arc::new(Mutex::new(source));
        self.sources.insert(fingerprint, shared.clone());
        Ok(shared)
    }

    /// An existing in-memory source, or one loaded from its on-disk context
    /// record and data shard. `Ok(None)` for an unknown fingerprint.
    pub(crate) fn by_fingerprint(&mut self, fingerprint: &str) -> Result<Option<SharedSource>> {
        if let Some(source) = self.sources.get(fingerprint) {
            return Ok(Some(source.clone()));
        }
        let Some(source) = Source::load(&self.root, fingerprint)? else {
            return Ok(None);
        };
        let shared = Arc::new(Mutex::new(source));
        self.sources
            .insert(fingerprint.to_string(), shared.clone());
        Ok(Some(shared))
    }

    /// Materialize every shard under the root. Returns the full source set.
    pub(crate) fn scan(&mut self) -> Result<Vec<SharedSource>> {
        for fingerprint in shard::scan_fingerprints(&self.root)? {
            self.by_fingerprint(&fingerprint)?;
        }
        Ok(self.sources.values().cloned().collect())
    }

    /// Reload every cached source from disk and pick up shards created by
    /// other processes. Returns sources that are new to this registry.
    pub(crate) fn reload(&mut self) -> Result<Vec<SharedSource>> {
        for source in self.sources.values() {
            source.lock().reload(&self.root)?;
        }
        let mut discovered = Vec::new();
        for fingerprint in shard::scan_fingerprints(&self.root)? {
            if !self.sources.contains_key(&fingerprint) {
                if let Some(source) = self.by_fingerprint(&fingerprint)? {
                    discovered.push(source);
                }
            }
        }
        Ok(discovered)
    }

    /// Flush every source's buffer, in fingerprint order.
    pub(crate) fn flush_all(&self) -> Result<()> {
        for source in self.sources.values() {
            source.lock().flush(&self.root)?;
        }
        Ok(())
    }
}
