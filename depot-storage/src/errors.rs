use std::error::Error;
use std::fmt;
use std::io;

use crate::metastore::MetaError;

/// Errors surfaced by depot operations.
///
/// Every variant is recoverable: callers convert these into structured
/// results at the operation boundary, none should take the process down.
#[derive(Debug)]
pub enum DepotError {
    /// The logical path is empty, does not start with `/`, or contains
    /// empty or dot segments.
    InvalidPath(String),
    /// The expiry duration is unparseable or not strictly positive.
    InvalidExpiry(String),
    /// The target path exists as a directory.
    PathIsDirectory(String),
    /// Creating ancestor directories failed.
    DirectoryCreate(io::Error),
    /// Opening, reading or writing blob bytes failed.
    Io(io::Error),
    /// The transport-compressed payload could not be decoded.
    UpstreamDecode(io::Error),
    /// A metadata read failed.
    MetaRead(MetaError),
    /// A metadata commit failed.
    MetaWrite(MetaError),
    /// No metadata record exists for the path.
    NotFoundInMetadata(String),
    /// No file exists on disk at the path.
    NotFoundOnDisk(String),
}

impl fmt::Display for DepotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepotError::InvalidPath(path) => write!(f, "invalid path: {path}"),
            DepotError::InvalidExpiry(raw) => write!(f, "invalid expiry duration: {raw}"),
            DepotError::PathIsDirectory(path) => write!(f, "path is a directory: {path}"),
            DepotError::DirectoryCreate(e) => write!(f, "could not create directories: {e}"),
            DepotError::Io(e) => write!(f, "io error: {e}"),
            DepotError::UpstreamDecode(e) => write!(f, "malformed compressed payload: {e}"),
            DepotError::MetaRead(e) => write!(f, "metadata read failed: {e}"),
            DepotError::MetaWrite(e) => write!(f, "metadata write failed: {e}"),
            DepotError::NotFoundInMetadata(path) => {
                write!(f, "file not found in metadata: {path}")
            }
            DepotError::NotFoundOnDisk(path) => write!(f, "file not found on disk: {path}"),
        }
    }
}

impl Error for DepotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DepotError::DirectoryCreate(e) | DepotError::Io(e) | DepotError::UpstreamDecode(e) => {
                Some(e)
            }
            DepotError::MetaRead(e) | DepotError::MetaWrite(e) => Some(e),
            _ => None,
        }
    }
}
