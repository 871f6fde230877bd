//! The top-level store handle: owns the root, the source registry, the
//! subscriber list for push fan-out, and the sync adapter.

use crate::artifact::ArtifactStore;
use crate::context::{Context, RUN_ID_FIELD};
use crate::error::Result;
use crate::predicate::PredicateMap;
use crate::registry::{Registry, SharedSource};
use crate::sync::{NoSync, SyncAdapter};
use crate::view::{self, View, ViewInner};
use log::warn;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// State shared by a store handle and every view derived from it.
///
/// The subscriber list is the explicit fan-out registry: every live view
/// holds a weak entry here and is offered each newly written-to source.
pub(crate) struct Shared {
    root: PathBuf,
    pub(crate) registry: Mutex<Registry>,
    artifacts: ArtifactStore,
    subscribers: Mutex<Vec<Weak<ViewInner>>>,
    /// Serializes commit-and-publish; the only mutual exclusion the data
    /// model requires.
    sync: Mutex<Box<dyn SyncAdapter>>,
}

impl Shared {
    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub(crate) fn register(&self, view: &Arc<ViewInner>) {
        self.subscribers.lock().push(Arc::downgrade(view));
    }

    pub(crate) fn deregister(&self, view: &Arc<ViewInner>) {
        self.subscribers.lock().retain(|weak| match weak.upgrade() {
            Some(live) => !Arc::ptr_eq(&live, view),
            None => false,
        });
    }

    /// Offer a source to every live view except the originator. Views that
    /// already scope the source ignore the offer; the rest accept it if
    /// their context-level predicates match.
    pub(crate) fn offer(&self, origin: Option<&Arc<ViewInner>>, source: &SharedSource) {
        let (fingerprint, context) = {
            let guard = source.lock();
            (guard.fingerprint().to_string(), guard.context().clone())
        };
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|weak| weak.strong_count() > 0);
        for weak in subscribers.iter() {
            let Some(subscriber) = weak.upgrade() else {
                continue;
            };
            if let Some(origin) = origin {
                if Arc::ptr_eq(&subscriber, origin) {
                    continue;
                }
            }
            subscriber.observe_source(&fingerprint, &context, source);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // safety net: scope exit flushes whatever explicit finish() missed
        if let Err(e) = self.registry.lock().flush_all() {
            warn!("runlog: flush on close failed: {e}");
        }
    }
}

/// Handle to one storage root.
///
/// Cloning is cheap and shares the registry, fan-out list and sync adapter.
/// Dropping the last handle (and every view) flushes all buffered rows.
///
/// # Examples
///
/// ```no_run
/// use runlog::{Context, Store};
/// use serde_json::json;
///
/// let store = Store::open("/tmp/my-experiments")?;
/// let run = store.init(Context::new().with("lr", 0.01))?;
/// run.log(json!({"step": 1, "loss": 0.73}))?;
/// store.finish()?;
/// # Ok::<(), runlog::Error>(())
/// ```
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl Store {
    /// Open or create a storage root, with no external replication.
    pub fn open(root: impl AsRef<Path>) -> Result<Store> {
        Store::open_with_sync(root, Box::new(NoSync))
    }

    /// Open or create a storage root with a sync adapter. The adapter's
    /// `prepare` runs once here; a failure is a diagnostic, not an error.
    pub fn open_with_sync(root: impl AsRef<Path>, sync: Box<dyn SyncAdapter>) -> Result<Store> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        if let Err(e) = sync.prepare(&root) {
            warn!("runlog: sync prepare failed: {e}");
        }
        Ok(Store {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::new(&root)),
                artifacts: ArtifactStore::new(&root),
                subscribers: Mutex::new(Vec::new()),
                sync: Mutex::new(sync),
                root,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Start (or resume) a run: upsert the given fields into a write
    /// context, assigning a random short `run_id` if none is present, and
    /// return a view scoped to that exact context. Dynamic `step` and
    /// `timestamp` fields are enabled on the returned view.
    pub fn init(&self, fields: Context) -> Result<View> {
        let mut context = fields;
        if !context.contains(RUN_ID_FIELD) {
            let mut id = uuid::Uuid::new_v4().simple().to_string();
            id.truncate(8);
            context.insert(RUN_ID_FIELD, id);
        }
        let predicates = PredicateMap::equals_all(&context);
        View::build(
            &self.shared,
            context,
            predicates,
            view::dynamic_defaults(),
        )
    }

    /// A view over every row whose fields equal the given values.
    pub fn get(&self, fields: Context) -> Result<View> {
        self.filter(PredicateMap::equals_all(&fields))
    }

    /// A view over every row accepted by the given predicates.
    pub fn filter(&self, predicates: PredicateMap) -> Result<View> {
        View::build(&self.shared, Context::new(), predicates, Vec::new())
    }

    /// An unfiltered view over everything under the root.
    pub fn view(&self) -> Result<View> {
        self.filter(PredicateMap::new())
    }

    /// Discard cached source contents, rescan the storage root, and offer
    /// newly discovered sources to every live view. This is how rows written
    /// by other processes become visible.
    pub fn reload(&self) -> Result<()> {
        let discovered = self.shared.registry.lock().reload()?;
        for source in &discovered {
            self.shared.offer(None, source);
        }
        Ok(())
    }

    /// Flush every source's buffered rows to its data shard.
    pub fn flush(&self) -> Result<()> {
        self.shared.registry.lock().flush_all()
    }

    /// Flush, then best-effort sync through the adapter. Sync failures are
    /// diagnostics only; logging is never blocked by replication.
    pub fn finish(&self) -> Result<()> {
        self.flush()?;
        let sync = self.shared.sync.lock();
        if let Err(e) = sync.sync(&self.shared.root) {
            warn!("runlog: sync failed: {e}");
        }
        Ok(())
    }
}
