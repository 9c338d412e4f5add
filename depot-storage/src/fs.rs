//! Filesystem abstraction for blob bytes and directory pruning.
//!
//! Logical paths (`/seg/seg`) map one-to-one onto a subtree under the
//! configured data root. Writes go to a temporary sibling first and
//! become visible at the final path only through an atomic rename.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use futures::io::AsyncWriteExt;
use futures::TryStreamExt;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::errors::DepotError;

const SEGMENT_SEPARATOR: char = '/';

#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Opens the store, creating the data root if needed.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a logical path onto the data root.
    ///
    /// Rejects anything that is not absolute-style or that contains
    /// empty or dot segments, so a request can never escape the root.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf, DepotError> {
        if logical.is_empty() || !logical.starts_with(SEGMENT_SEPARATOR) {
            return Err(DepotError::InvalidPath(logical.to_string()));
        }
        let trimmed = if logical.len() > 1 {
            logical.trim_end_matches(SEGMENT_SEPARATOR)
        } else {
            logical
        };
        if trimmed == "/" {
            return Ok(self.root.clone());
        }
        if trimmed.is_empty() {
            return Err(DepotError::InvalidPath(logical.to_string()));
        }
        let mut local = self.root.clone();
        for segment in trimmed.split(SEGMENT_SEPARATOR).skip(1) {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(DepotError::InvalidPath(logical.to_string()));
            }
            local.push(segment);
        }
        Ok(local)
    }

    /// Inverse of [`resolve`](Self::resolve) for paths under the root.
    pub fn logical_of(&self, local: &Path) -> String {
        let rel = local.strip_prefix(&self.root).unwrap_or(local);
        let mut logical = String::new();
        for component in rel.components() {
            logical.push(SEGMENT_SEPARATOR);
            logical.push_str(&component.as_os_str().to_string_lossy());
        }
        if logical.is_empty() {
            logical.push(SEGMENT_SEPARATOR);
        }
        logical
    }

    /// Stat the path; absence is not an error.
    pub async fn probe(&self, logical: &str) -> Result<Option<std::fs::Metadata>, DepotError> {
        let local = self.resolve(logical)?;
        match async_fs::metadata(&local).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DepotError::Io(e)),
        }
    }

    pub async fn ensure_parent_dirs(&self, logical: &str) -> Result<(), DepotError> {
        let local = self.resolve(logical)?;
        if let Some(parent) = local.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(DepotError::DirectoryCreate)?;
        }
        Ok(())
    }

    /// Opens a hidden temporary sibling as the write target for the
    /// path. The file appears at its final name only on
    /// [`TempTarget::publish`].
    pub async fn open_temp(&self, logical: &str) -> Result<TempTarget, DepotError> {
        let local = self.resolve(logical)?;
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DepotError::InvalidPath(logical.to_string()))?;
        let tmp = local.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4().simple()));
        let file = async_fs::File::create(&tmp).await.map_err(DepotError::Io)?;
        Ok(TempTarget {
            file,
            tmp,
            dest: local,
        })
    }

    pub async fn open_read(
        &self,
        logical: &str,
    ) -> Result<(async_fs::File, std::fs::Metadata), DepotError> {
        let local = self.resolve(logical)?;
        let file = match async_fs::File::open(&local).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DepotError::NotFoundOnDisk(logical.to_string()))
            }
            Err(e) => return Err(DepotError::Io(e)),
        };
        let meta = file.metadata().await.map_err(DepotError::Io)?;
        Ok((file, meta))
    }

    pub async fn remove(&self, logical: &str) -> Result<(), DepotError> {
        let local = self.resolve(logical)?;
        trace!(path = %local.display(), "remove file");
        async_fs::remove_file(&local).await.map_err(DepotError::Io)
    }

    /// Local directories strictly between the path and the root,
    /// innermost first. Empty for paths directly under the root.
    pub fn ancestors(&self, logical: &str) -> Vec<PathBuf> {
        let Ok(local) = self.resolve(logical) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut current = local.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            out.push(dir.to_path_buf());
            current = dir.parent();
        }
        out
    }

    /// Removes whichever of the given directories are empty, deepest
    /// first so an emptied child is observed before its parent. A
    /// non-empty directory is left in place; the root never qualifies.
    pub async fn prune_dirs(&self, dirs: BTreeSet<PathBuf>) {
        // BTreeSet order puts parents before children; reversing it
        // visits children first.
        for dir in dirs.into_iter().rev() {
            if dir == self.root || !dir.starts_with(&self.root) {
                continue;
            }
            match async_fs::remove_dir(&dir).await {
                Ok(()) => debug!(dir = %dir.display(), "removed empty directory"),
                Err(_) => trace!(dir = %dir.display(), "directory kept"),
            }
        }
    }

    /// Immediate file children of the directory whose final segment
    /// matches the suffix case-insensitively, as sorted logical paths.
    /// A missing directory yields an empty listing.
    pub async fn list_dir(&self, logical: &str, suffix: &str) -> Result<Vec<String>, DepotError> {
        let dir = self.resolve(logical)?;
        let suffix_uc = suffix.to_uppercase();
        let mut out = Vec::new();
        let mut entries = match async_fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %logical, "listing missing directory");
                return Ok(out);
            }
            Err(e) => return Err(DepotError::Io(e)),
        };
        while let Some(entry) = entries.try_next().await.map_err(DepotError::Io)? {
            let file_type = entry.file_type().await.map_err(DepotError::Io)?;
            if file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.to_uppercase().ends_with(&suffix_uc) {
                out.push(self.logical_of(&entry.path()));
            }
        }
        out.sort();
        Ok(out)
    }

    /// Like [`list_dir`](Self::list_dir) but walks the whole subtree.
    pub async fn walk_dir(&self, logical: &str, suffix: &str) -> Result<Vec<String>, DepotError> {
        let start = self.resolve(logical)?;
        let suffix_uc = suffix.to_uppercase();
        let mut out = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match async_fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(path = %dir.display(), "walking missing directory");
                    continue;
                }
                Err(e) => return Err(DepotError::Io(e)),
            };
            while let Some(entry) = entries.try_next().await.map_err(DepotError::Io)? {
                let file_type = entry.file_type().await.map_err(DepotError::Io)?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.to_uppercase().ends_with(&suffix_uc) {
                    out.push(self.logical_of(&entry.path()));
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

/// In-flight write target. Bytes land in a temporary sibling; the file
/// becomes visible at its destination only through `publish`.
pub struct TempTarget {
    file: async_fs::File,
    tmp: PathBuf,
    dest: PathBuf,
}

impl TempTarget {
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf).await
    }

    /// Flushes, syncs and atomically renames the temporary into place.
    pub async fn publish(mut self) -> Result<(), DepotError> {
        let result = async {
            self.file.flush().await?;
            self.file.sync_all().await?;
            async_fs::rename(&self.tmp, &self.dest).await
        }
        .await;
        if let Err(e) = result {
            let _ = async_fs::remove_file(&self.tmp).await;
            return Err(DepotError::Io(e));
        }
        Ok(())
    }

    /// Abandons the write and deletes the temporary.
    pub async fn discard(self) {
        drop(self.file);
        if let Err(e) = async_fs::remove_file(&self.tmp).await {
            warn!(tmp = %self.tmp.display(), error = %e, "could not remove temporary file");
        }
    }
}
