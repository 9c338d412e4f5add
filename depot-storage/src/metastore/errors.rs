use std::error::Error;
use std::fmt;

/// Metadata store failure, carrying the attempted operation.
///
/// A failed transaction has no effect; callers must not assume any
/// partial write happened.
#[derive(Debug)]
pub enum MetaError {
    Open(String),
    Put { path: String, msg: String },
    Get { path: String, msg: String },
    Delete { path: String, msg: String },
    Scan(String),
    Encoding(String),
}

impl fmt::Display for MetaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaError::Open(msg) => write!(f, "could not open metadata store: {msg}"),
            MetaError::Put { path, msg } => write!(f, "put {path}: {msg}"),
            MetaError::Get { path, msg } => write!(f, "get {path}: {msg}"),
            MetaError::Delete { path, msg } => write!(f, "delete {path}: {msg}"),
            MetaError::Scan(msg) => write!(f, "scan: {msg}"),
            MetaError::Encoding(msg) => write!(f, "record encoding: {msg}"),
        }
    }
}

impl Error for MetaError {}
