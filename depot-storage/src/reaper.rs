//! Expiry-driven garbage collection with bottom-up directory pruning.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::depot::Depot;
use crate::errors::DepotError;
use crate::metastore::FileRecord;

/// Outcome of one expiry sweep.
#[derive(Debug, Default)]
pub struct ReapReport {
    reclaimed: BTreeMap<String, FileRecord>,
}

impl ReapReport {
    pub fn count(&self) -> usize {
        self.reclaimed.len()
    }

    pub fn reclaimed(&self) -> &BTreeMap<String, FileRecord> {
        &self.reclaimed
    }

    pub fn into_reclaimed(self) -> BTreeMap<String, FileRecord> {
        self.reclaimed
    }
}

impl Depot {
    /// Sweeps the metadata store and reclaims every expired record.
    ///
    /// Individual delete failures are logged and skipped, never fatal
    /// to the sweep. Each record deletion is its own small transaction
    /// so ingestion is not blocked for the duration of the scan.
    /// Overlapping sweeps serialize on the run guard.
    pub async fn reap(&self) -> Result<ReapReport, DepotError> {
        let _guard = self.reap_lock.lock().await;
        let now = Utc::now().timestamp_millis();

        let mut expired = BTreeMap::new();
        for (path, record) in self.meta.scan().map_err(DepotError::MetaRead)? {
            if record.is_expired(now) {
                expired.insert(path, record);
            }
        }
        if expired.is_empty() {
            return Ok(ReapReport::default());
        }

        let mut touched = BTreeSet::new();
        for path in expired.keys() {
            self.delete_one(path, &mut touched).await;
        }
        self.disk.prune_dirs(touched).await;

        info!(count = expired.len(), "expiry sweep reclaimed files");
        Ok(ReapReport { reclaimed: expired })
    }

    /// Reclaims a single known-expired record, used by info lookups.
    /// Takes the same run guard as a full sweep.
    pub(crate) async fn reclaim_one(&self, path: &str) {
        let _guard = self.reap_lock.lock().await;
        debug!(path = %path, "reclaiming expired record on lookup");
        let mut touched = BTreeSet::new();
        self.delete_one(path, &mut touched).await;
        self.disk.prune_dirs(touched).await;
    }

    /// Best-effort removal of one file and its record. The record
    /// counts as reclaimed regardless of partial sub-failures.
    async fn delete_one(&self, path: &str, touched: &mut BTreeSet<PathBuf>) {
        if let Err(e) = self.disk.remove(path).await {
            warn!(path = %path, error = %e, "could not remove expired file");
        }
        touched.extend(self.disk.ancestors(path));
        if let Err(e) = self.meta.delete(path) {
            warn!(path = %path, error = %e, "could not delete metadata entry");
        }
        self.count_reclaimed();
    }
}
