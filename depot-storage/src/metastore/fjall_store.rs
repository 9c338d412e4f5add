use std::fmt;
use std::path::PathBuf;

use fjall::{PartitionCreateOptions, PersistMode, TxKeyspace, TxPartitionHandle};
use tracing::warn;

use super::{Durability, FileRecord, MetaError, MetaStore};

/// Transactional metadata store backed by a fjall keyspace.
///
/// Write transactions take the keyspace writer lock, giving the
/// single-writer semantics the depot relies on; `read_tx` snapshots
/// keep scans consistent while writers proceed.
pub struct FjallStore {
    keyspace: TxKeyspace,
    files: TxPartitionHandle,
    persist_mode: PersistMode,
    path: PathBuf,
}

impl FjallStore {
    pub fn open(path: impl Into<PathBuf>, durability: Durability) -> Result<Self, MetaError> {
        let path = path.into();
        let keyspace = fjall::Config::new(&path)
            .open_transactional()
            .map_err(|e| MetaError::Open(e.to_string()))?;
        let files = keyspace
            .open_partition("files", PartitionCreateOptions::default())
            .map_err(|e| MetaError::Open(e.to_string()))?;
        let persist_mode = match durability {
            Durability::Buffer => PersistMode::Buffer,
            Durability::Fsync => PersistMode::SyncAll,
            Durability::Fdatasync => PersistMode::SyncData,
        };
        Ok(Self {
            keyspace,
            files,
            persist_mode,
            path,
        })
    }

    fn persist(&self) -> Result<(), fjall::Error> {
        match self.persist_mode {
            PersistMode::Buffer => Ok(()),
            mode => self.keyspace.persist(mode),
        }
    }
}

impl fmt::Debug for FjallStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FjallStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl MetaStore for FjallStore {
    fn put(&self, path: &str, record: &FileRecord) -> Result<(), MetaError> {
        let raw = record.to_vec()?;
        let mut tx = self.keyspace.write_tx();
        tx.insert(&self.files, path.as_bytes(), raw);
        tx.commit().map_err(|e| MetaError::Put {
            path: path.to_string(),
            msg: e.to_string(),
        })?;
        self.persist().map_err(|e| MetaError::Put {
            path: path.to_string(),
            msg: e.to_string(),
        })
    }

    fn get(&self, path: &str) -> Result<Option<FileRecord>, MetaError> {
        let rtx = self.keyspace.read_tx();
        let raw = rtx.get(&self.files, path.as_bytes()).map_err(|e| MetaError::Get {
            path: path.to_string(),
            msg: e.to_string(),
        })?;
        raw.map(|slice| FileRecord::try_from_slice(&slice)).transpose()
    }

    fn delete(&self, path: &str) -> Result<(), MetaError> {
        let mut tx = self.keyspace.write_tx();
        tx.remove(&self.files, path.as_bytes());
        tx.commit().map_err(|e| MetaError::Delete {
            path: path.to_string(),
            msg: e.to_string(),
        })?;
        self.persist().map_err(|e| MetaError::Delete {
            path: path.to_string(),
            msg: e.to_string(),
        })
    }

    fn scan(&self) -> Result<Box<dyn Iterator<Item = (String, FileRecord)> + Send>, MetaError> {
        let rtx = self.keyspace.read_tx();
        let mut entries = Vec::new();
        for item in rtx.iter(&self.files) {
            let (key, value) = item.map_err(|e| MetaError::Scan(e.to_string()))?;
            let path = String::from_utf8_lossy(&key).into_owned();
            match FileRecord::try_from_slice(&value) {
                Ok(record) => entries.push((path, record)),
                Err(e) => warn!(path = %path, error = %e, "skipping corrupt metadata record"),
            }
        }
        Ok(Box::new(entries.into_iter()))
    }

    fn len(&self) -> Result<u64, MetaError> {
        let rtx = self.keyspace.read_tx();
        let mut count = 0u64;
        for item in rtx.iter(&self.files) {
            item.map_err(|e| MetaError::Scan(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    fn backup(&self) -> Result<Vec<u8>, MetaError> {
        let rtx = self.keyspace.read_tx();
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
        for item in rtx.iter(&self.files) {
            let (key, value) = item.map_err(|e| MetaError::Scan(e.to_string()))?;
            entries.push((String::from_utf8_lossy(&key).into_owned(), value.to_vec()));
        }
        bincode::encode_to_vec(&entries, bincode::config::standard())
            .map_err(|e| MetaError::Encoding(e.to_string()))
    }
}
