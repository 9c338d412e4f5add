use std::fmt::Debug;
use std::str::FromStr;

use super::{FileRecord, MetaError};

/// MetaStore is the interface that defines the methods to interact with
/// the metadata store.
///
/// All mutating operations are atomic and, depending on the configured
/// [`Durability`], survive a crash immediately after acknowledgment.
/// Writers serialize against each other; readers never observe a
/// partial write.
pub trait MetaStore: Send + Sync + Debug + 'static {
    /// Commits a record for the path, replacing any existing one.
    fn put(&self, path: &str, record: &FileRecord) -> Result<(), MetaError>;

    /// Gets the record for the path, if any.
    fn get(&self, path: &str) -> Result<Option<FileRecord>, MetaError>;

    /// Deletes the record for the path. Deleting an absent path is not
    /// an error.
    fn delete(&self, path: &str) -> Result<(), MetaError>;

    /// Returns a point-in-time-consistent sequence of all records in
    /// lexicographic path order. Restartable per call; concurrent
    /// writers do not affect an in-progress scan.
    ///
    /// Records that fail to decode are logged and skipped.
    fn scan(&self) -> Result<Box<dyn Iterator<Item = (String, FileRecord)> + Send>, MetaError>;

    /// Number of records currently committed.
    fn len(&self) -> Result<u64, MetaError>;

    /// Encodes a full snapshot of the store as one opaque blob.
    fn backup(&self) -> Result<Vec<u8>, MetaError>;
}

#[derive(Debug, Clone, Copy)]
pub enum Durability {
    Buffer,
    Fsync,
    Fdatasync,
}

impl FromStr for Durability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buffer" => Ok(Durability::Buffer),
            "fsync" => Ok(Durability::Fsync),
            "fdatasync" => Ok(Durability::Fdatasync),
            _ => Err(format!("Unknown durability option: {}", s)),
        }
    }
}
