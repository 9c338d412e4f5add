//! Service context tying the metadata store, the disk store and the
//! live-file counter together.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use crate::errors::DepotError;
use crate::fs::DiskStore;
use crate::metastore::{Durability, FileRecord, FjallStore, MetaStore};

pub struct Depot {
    pub(crate) meta: Arc<dyn MetaStore>,
    pub(crate) disk: DiskStore,
    live_count: AtomicU64,
    /// Serializes expiry sweeps and single-record reclamations so
    /// overlapping runs cannot double-count or race on pruning.
    pub(crate) reap_lock: Mutex<()>,
}

impl Depot {
    /// Opens the depot with a fjall metadata store under `meta_root`
    /// and blobs under `data_root`.
    pub fn open(
        data_root: impl Into<PathBuf>,
        meta_root: impl Into<PathBuf>,
        durability: Durability,
    ) -> Result<Self, DepotError> {
        let disk = DiskStore::open(data_root).map_err(DepotError::Io)?;
        let meta = FjallStore::open(meta_root, durability).map_err(DepotError::MetaRead)?;
        Self::with_parts(disk, Arc::new(meta))
    }

    /// Assembles a depot from pre-built parts. The live count starts
    /// from the number of committed records.
    pub fn with_parts(disk: DiskStore, meta: Arc<dyn MetaStore>) -> Result<Self, DepotError> {
        let count = meta.len().map_err(DepotError::MetaRead)?;
        info!(files = count, data_root = %disk.root().display(), "depot opened");
        Ok(Self {
            meta,
            disk,
            live_count: AtomicU64::new(count),
            reap_lock: Mutex::new(()),
        })
    }

    /// Number of currently tracked files. Exact at quiescence, only
    /// eventually consistent while ingests or sweeps are in flight.
    pub fn file_count(&self) -> u64 {
        self.live_count.load(Ordering::Acquire)
    }

    pub fn disk(&self) -> &DiskStore {
        &self.disk
    }

    pub(crate) fn count_ingested(&self) {
        self.live_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn count_reclaimed(&self) {
        let _ = self
            .live_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Metadata record for a single path.
    ///
    /// An expired record found here is reclaimed on the spot, after
    /// which the path reports as absent on disk.
    pub async fn info(&self, path: &str) -> Result<FileRecord, DepotError> {
        let record = self
            .meta
            .get(path)
            .map_err(DepotError::MetaRead)?
            .ok_or_else(|| DepotError::NotFoundInMetadata(path.to_string()))?;
        if record.is_expired(Utc::now().timestamp_millis()) {
            self.reclaim_one(path).await;
            return Err(DepotError::NotFoundOnDisk(path.to_string()));
        }
        match self.disk.probe(path).await? {
            Some(_) => Ok(record),
            None => Err(DepotError::NotFoundOnDisk(path.to_string())),
        }
    }

    /// File paths under a directory, filtered by case-insensitive
    /// suffix match on the final segment.
    pub async fn list(
        &self,
        path: &str,
        suffix: &str,
        recursive: bool,
    ) -> Result<Vec<String>, DepotError> {
        if recursive {
            self.disk.walk_dir(path, suffix).await
        } else {
            self.disk.list_dir(path, suffix).await
        }
    }

    /// Full metadata snapshot as one opaque blob.
    pub fn backup(&self) -> Result<Vec<u8>, DepotError> {
        self.meta.backup().map_err(DepotError::MetaRead)
    }
}
