//! Durable-sync collaborators.
//!
//! Replication is strictly best-effort: logging must never be blocked by a
//! missing remote or a network failure, so adapters report problems through
//! diagnostics and return `Ok` for anything short of a local programming
//! error. The store serializes all `sync` calls behind one mutex.

use crate::error::Result;
use log::warn;
use std::path::Path;
use std::process::Command;

/// Pushes the storage root to an external durability backend.
pub trait SyncAdapter: Send {
    /// Prepare the root for syncing (e.g. initialize a repository).
    /// Idempotent.
    fn prepare(&self, root: &Path) -> Result<()>;

    /// Durably commit local state and best-effort publish it. Must not fail
    /// on a missing remote or unreachable network; report and return `Ok`.
    fn sync(&self, root: &Path) -> Result<()>;
}

/// The default adapter: no external replication.
#[derive(Debug, Default)]
pub struct NoSync;

impl SyncAdapter for NoSync {
    fn prepare(&self, _root: &Path) -> Result<()> {
        Ok(())
    }

    fn sync(&self, _root: &Path) -> Result<()> {
        Ok(())
    }
}

/// Replicates the storage root through a git repository: commit everything,
/// rebase on the remote, push. Every git failure is a diagnostic.
#[derive(Debug, Default)]
pub struct GitSync;

impl GitSync {
    fn run(root: &Path, args: &[&str]) -> Option<std::process::Output> {
        match Command::new("git").args(args).current_dir(root).output() {
            Ok(output) => Some(output),
            Err(e) => {
                warn!("runlog: failed to run git {}: {e}", args.join(" "));
                None
            }
        }
    }
}

impl SyncAdapter for GitSync {
    fn prepare(&self, root: &Path) -> Result<()> {
        if !root.join(".git").exists() {
            warn!(
                "runlog: no git repository at {}, initializing one",
                root.display()
            );
            Self::run(root, &["init"]);
        }
        // track artifacts through LFS so binary blobs don't bloat the repo
        match Self::run(root, &["lfs", "install"]) {
            Some(output) if output.status.success() => {
                Self::run(root, &["lfs", "track", "artifacts/*"]);
            }
            _ => warn!("runlog: git lfs unavailable, artifacts tracked as plain blobs"),
        }
        Ok(())
    }

    fn sync(&self, root: &Path) -> Result<()> {
        Self::run(root, &["add", "-A"]);
        Self::run(root, &["commit", "-m", "Sync run data"]);
        Self::run(root, &["pull", "--rebase"]);
        if let Some(output) = Self::run(root, &["push"]) {
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stderr.contains("No configured push destination") {
                    warn!("runlog: no remote configured, skipping publish");
                } else {
                    warn!("runlog: failed to push changes: {}", stderr.trim());
                }
            }
        }
        Ok(())
    }
}
