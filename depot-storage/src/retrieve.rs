//! Retrieval path: disk-only lookup with transport compression
//! negotiation.

use std::time::SystemTime;

use async_compression::futures::bufread::GzipEncoder;
use futures::io::{AsyncRead, BufReader};
use tracing::trace;

use crate::depot::Depot;
use crate::errors::DepotError;

/// An open blob ready for streaming to a client.
pub struct RetrievedFile {
    pub reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
    /// Size of the plaintext content at rest. When `compressed` is set
    /// the transport length differs and is only known at stream end.
    pub plain_size: u64,
    pub modified: SystemTime,
    /// Whether the stream carries gzip transport compression.
    pub compressed: bool,
}

impl std::fmt::Debug for RetrievedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievedFile")
            .field("plain_size", &self.plain_size)
            .field("modified", &self.modified)
            .field("compressed", &self.compressed)
            .finish_non_exhaustive()
    }
}

impl Depot {
    /// Resolves a path to its bytes straight from the disk store.
    ///
    /// Retrieval deliberately bypasses the metadata store, so serving
    /// never depends on a metadata read. Content is stored plaintext;
    /// when the caller accepts compressed transport the stream is
    /// gzip-encoded on the fly.
    pub async fn retrieve(
        &self,
        path: &str,
        accepts_compressed: bool,
    ) -> Result<RetrievedFile, DepotError> {
        let (file, meta) = self.disk.open_read(path).await?;
        if meta.is_dir() {
            return Err(DepotError::PathIsDirectory(path.to_string()));
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let plain_size = meta.len();
        trace!(path = %path, size = plain_size, compressed = accepts_compressed, "serving file");
        let reader: Box<dyn AsyncRead + Send + Sync + Unpin> = if accepts_compressed {
            Box::new(GzipEncoder::new(BufReader::new(file)))
        } else {
            Box::new(file)
        };
        Ok(RetrievedFile {
            reader,
            plain_size,
            modified,
            compressed: accepts_compressed,
        })
    }
}
