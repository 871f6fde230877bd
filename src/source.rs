//! One append-only row log bound to exactly one immutable context.

use crate::context::Context;
use crate::error::Result;
use crate::shard::{self, Row};
use std::path::Path;

/// Owns a context and an ordered, append-only sequence of rows, split into a
/// persisted prefix and a buffered suffix pending flush.
///
/// Appends touch memory only; durability happens at [`Source::flush`]. Rows
/// are never reordered, deleted or mutated once appended.
#[derive(Debug)]
pub struct Source {
    context: Context,
    fingerprint: String,
    persisted: Vec<Row>,
    buffered: Vec<Row>,
    /// Context record not yet written to disk (source created this process,
    /// never flushed).
    needs_persist: bool,
}

impl Source {
    /// A source for a context never seen on disk.
    pub(crate) fn new(context: Context) -> Self {
        let fingerprint = context.fingerprint();
        Source {
            context,
            fingerprint,
            persisted: Vec::new(),
            buffered: Vec::new(),
            needs_persist: true,
        }
    }

    /// Materialize a source from its on-disk context record and data shard.
    /// Returns `Ok(None)` if no context record exists for the fingerprint.
    pub(crate) fn load(root: &Path, fingerprint: &str) -> Result<Option<Source>> {
        let Some(context) = shard::read_context(root, fingerprint)? else {
            return Ok(None);
        };
        let persisted = shard::read_rows(root, fingerprint)?;
        Ok(Some(Source {
            context,
            fingerprint: fingerprint.to_string(),
            persisted,
            buffered: Vec::new(),
            needs_persist: false,
        }))
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Buffer a row in memory. No I/O.
    pub fn append(&mut self, row: Row) {
        self.buffered.push(row);
    }

    /// Persisted rows followed by buffered rows, in append order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.persisted.iter().chain(self.buffered.iter())
    }

    pub fn len(&self) -> usize {
        self.persisted.len() + self.buffered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persisted.is_empty() && self.buffered.is_empty()
    }

    /// Durably write the context record (first flush only), then the buffered
    /// rows as discrete records in order, then merge the buffer into the
    /// persisted set.
    ///
    /// No-op on an empty buffer — a context that was only ever queried, never
    /// logged to, leaves no shard behind. Idempotent once flushed.
    pub fn flush(&mut self, root: &Path) -> Result<()> {
        if self.buffered.is_empty() {
            return Ok(());
        }
        if self.needs_persist {
            shard::write_context(root, &self.fingerprint, &self.context)?;
            self.needs_persist = false;
        }
        shard::append_rows(root, &self.fingerprint, &self.buffered)?;
        self.persisted.append(&mut self.buffered);
        Ok(())
    }

    /// Discard the cached persisted rows and rescan the data shard. Buffered
    /// rows (not yet on disk) are kept.
    pub fn reload(&mut self, root: &Path) -> Result<()> {
        if !self.needs_persist {
            self.persisted = shard::read_rows(root, &self.fingerprint)?;
        }
        Ok(())
    }
}
