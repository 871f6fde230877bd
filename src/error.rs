use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the storage and query engine.
///
/// Diagnostics the engine is required to swallow (corrupt trailing records,
/// failing filter predicates, sync failures) are reported through the `log`
/// crate instead and never appear here.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A context record on disk exists but cannot be parsed. Unlike a
    /// corrupt data row this is not skippable — without the context the
    /// shard's rows cannot be attributed to a run.
    #[error("corrupt context record: {path}")]
    CorruptContext { path: PathBuf },

    /// Rehydration was requested for an artifact that was never durably
    /// stored. This is a usage error (e.g. `as_table` on a table that was
    /// constructed but not yet logged), distinct from [`Error::MissingArtifact`].
    #[error("artifact {hash} has not been stored yet")]
    ArtifactNotStored { hash: String },

    /// An artifact that was stored at some point is no longer present under
    /// the storage root.
    #[error("artifact file missing from store: {path}")]
    MissingArtifact { path: PathBuf },

    /// The source file handed to the artifact store does not exist.
    #[error("no such file: {path}")]
    NoSuchFile { path: PathBuf },
}
