//! Holder of the served review index.
//!
//! Readers clone the current `Arc` and never see a half-built index. A
//! rebuild happens off to the side, the JSON snapshot is written to a temp
//! file and renamed into place, and only then is the `Arc` swapped.

use super::builder::build_index;
use super::models::{IndexStats, ReviewIndex};
use crate::location_store::LocationStore;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IndexRebuildError {
    #[error("A review index rebuild is already in progress")]
    InProgress,

    #[error("Review index rebuild failed: {0:#}")]
    Failed(anyhow::Error),
}

pub struct ReviewIndexHandle {
    current: RwLock<Arc<ReviewIndex>>,
    snapshot_path: Option<PathBuf>,
    rebuilding: AtomicBool,
}

/// Clears the rebuild flag however the rebuild ends.
struct RebuildGuard<'a>(&'a AtomicBool);

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ReviewIndexHandle {
    /// In-memory handle starting from an empty index.
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self::with_index(ReviewIndex::empty(), snapshot_path)
    }

    pub fn with_index(index: ReviewIndex, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
            snapshot_path,
            rebuilding: AtomicBool::new(false),
        }
    }

    /// Load the snapshot at `path` if present, otherwise start empty.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No review index snapshot at {:?}, starting empty", path);
            return Ok(Self::new(Some(path.to_path_buf())));
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read review index snapshot {:?}", path))?;
        let index: ReviewIndex = serde_json::from_str(&json)
            .with_context(|| format!("Corrupted review index snapshot {:?}", path))?;
        info!(
            "Loaded review index snapshot: {} salons in {} cities",
            index.stats().total_salons,
            index.stats().cities_included
        );
        Ok(Self::with_index(index, Some(path.to_path_buf())))
    }

    pub fn current(&self) -> Arc<ReviewIndex> {
        self.current.read().unwrap().clone()
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    /// Rebuild the whole index from the store and swap it in.
    ///
    /// On failure the previously served index is left untouched.
    pub fn regenerate(
        &self,
        store: &dyn LocationStore,
    ) -> std::result::Result<IndexStats, IndexRebuildError> {
        if self
            .rebuilding
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IndexRebuildError::InProgress);
        }
        let _guard = RebuildGuard(&self.rebuilding);

        let index = build_index(store).map_err(|e| {
            warn!("Review index rebuild failed, keeping previous index: {:#}", e);
            IndexRebuildError::Failed(e)
        })?;

        if let Some(path) = &self.snapshot_path {
            write_snapshot(path, &index).map_err(|e| {
                warn!("Failed to write review index snapshot: {:#}", e);
                IndexRebuildError::Failed(e)
            })?;
        }

        let stats = index.stats().clone();
        *self.current.write().unwrap() = Arc::new(index);
        Ok(stats)
    }
}

fn write_snapshot(path: &Path, index: &ReviewIndex) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    serde_json::to_writer(&mut tmp, index)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move snapshot into {:?}", path))?;
    Ok(())
}
