//! Local, file-backed experiment log.
//!
//! Records structured rows under an immutable run identity (a [`Context`]),
//! stores files and tables as content-addressed artifacts, and answers
//! "latest value" queries — scalar, deep-merged, or grouped by an index
//! field — through composable filtered [`View`]s.
//!
//! Storage layout under one root, one shard per context fingerprint:
//!
//! ```text
//! <fingerprint>.context.json      context fields, pretty-printed
//! <fingerprint>.data.jsonl        rows, one JSON object per line
//! artifacts/<hash>/<filename>     file artifacts, stored once per hash
//! artifacts/<hash>/table.csv      table artifacts
//! ```
//!
//! Appends buffer in memory per source and flush in one batch on
//! [`Store::flush`], [`Store::finish`] or when the last handle drops. Within
//! a process, views observe each other's freshly logged rows through push
//! fan-out; rows from other processes become visible on [`Store::reload`].
//!
//! ```no_run
//! use runlog::{Context, LatestQuery, Store};
//! use serde_json::json;
//!
//! let store = Store::open("/tmp/experiments")?;
//! let run = store.init(Context::new().with("run_id", "exp-1"))?;
//! run.log(json!({"step": 1, "loss": 42}))?;
//! run.log(json!({"loss": 4.2}))?;
//!
//! let by_step = run.latest(&LatestQuery::field("loss").index("step"));
//! store.finish()?;
//! # Ok::<(), runlog::Error>(())
//! ```

mod artifact;
mod context;
mod encode;
mod error;
mod latest;
mod predicate;
mod registry;
mod shard;
mod source;
mod store;
mod sync;
mod table;
mod view;

pub use artifact::{ARTIFACT_KIND_KEY, FileHandle, Resolved, TableHandle, content_hash};
pub use context::{Context, RUN_ID_FIELD};
pub use encode::{Payload, Record};
pub use error::{Error, Result};
pub use latest::{LatestQuery, LatestResult};
pub use predicate::{Predicate, PredicateMap};
pub use shard::Row;
pub use source::Source;
pub use store::Store;
pub use sync::{GitSync, NoSync, SyncAdapter};
pub use table::Table;
pub use view::View;
