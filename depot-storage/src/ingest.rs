//! Atomic ingestion pipeline: decode, hash, durable commit, rollback.

use std::io;
use std::time::Duration;

use async_compression::futures::bufread::GzipDecoder;
use futures::io::{AsyncRead, AsyncReadExt, BufReader};
use md5::{Digest, Md5};
use tracing::{debug, error, trace, warn};

use crate::depot::Depot;
use crate::errors::DepotError;
use crate::fs::TempTarget;
use crate::metastore::FileRecord;

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Transport encoding of an upload payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
}

/// Whether an ingest may replace an existing file at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    Replace,
    Keep,
}

/// Result of a successful ingest call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new record was committed.
    Stored(FileRecord),
    /// The path already existed and the policy forbade replacement;
    /// nothing was written and the pre-existing record is returned.
    AlreadyExists(FileRecord),
}

impl IngestOutcome {
    pub fn record(&self) -> &FileRecord {
        match self {
            IngestOutcome::Stored(record) | IngestOutcome::AlreadyExists(record) => record,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, IngestOutcome::Stored(_))
    }
}

impl Depot {
    /// Streams `source` into the file at `path` and commits a metadata
    /// record for it.
    ///
    /// Bytes are decompressed if transport-compressed, hashed as
    /// plaintext, and written to a temporary sibling that is renamed
    /// into place only once fully written. If the metadata commit then
    /// fails, the published file is deleted again so no orphan claims
    /// to be tracked.
    pub async fn ingest<R>(
        &self,
        path: &str,
        source: R,
        encoding: ContentEncoding,
        expiry: &str,
        overwrite: OverwritePolicy,
    ) -> Result<IngestOutcome, DepotError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        validate_file_path(path)?;
        let ttl = parse_expiry(expiry)?;

        match self.disk.probe(path).await? {
            Some(meta) if meta.is_dir() => {
                return Err(DepotError::PathIsDirectory(path.to_string()))
            }
            Some(_) if overwrite == OverwritePolicy::Keep => {
                debug!(path = %path, "exists and replacement is disabled, keeping current file");
                return match self.meta.get(path).map_err(DepotError::MetaRead)? {
                    Some(record) => Ok(IngestOutcome::AlreadyExists(record)),
                    // file on disk but never committed; nothing to report
                    None => Err(DepotError::NotFoundInMetadata(path.to_string())),
                };
            }
            _ => {}
        }

        // counter hint only; a failed read here just skips the
        // new-key bookkeeping below
        let prior_exists = self
            .meta
            .get(path)
            .map(|record| record.is_some())
            .unwrap_or(false);

        self.disk.ensure_parent_dirs(path).await?;
        let mut target = self.disk.open_temp(path).await?;
        let content_hash = match copy_and_hash(source, encoding, &mut target).await {
            Ok(hash) => hash,
            Err(e) => {
                target.discard().await;
                return Err(e);
            }
        };
        target.publish().await?;

        let record = FileRecord::new(content_hash, ttl);
        if let Err(e) = self.meta.put(path, &record) {
            warn!(path = %path, error = %e, "metadata commit failed, rolling back published file");
            if let Err(re) = self.disk.remove(path).await {
                error!(path = %path, error = %re, "rollback failed, orphaned file left on disk");
            }
            return Err(DepotError::MetaWrite(e));
        }

        if !prior_exists {
            self.count_ingested();
        }
        debug!(path = %path, hash = %record.hash_hex(), "stored file");
        Ok(IngestOutcome::Stored(record))
    }
}

fn validate_file_path(path: &str) -> Result<(), DepotError> {
    if path.len() <= 1 || !path.starts_with('/') || path.ends_with('/') {
        return Err(DepotError::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn parse_expiry(raw: &str) -> Result<Duration, DepotError> {
    let ttl = humantime::parse_duration(raw.trim())
        .map_err(|e| DepotError::InvalidExpiry(format!("{raw}: {e}")))?;
    if ttl.is_zero() {
        return Err(DepotError::InvalidExpiry(format!("{raw}: must be positive")));
    }
    Ok(ttl)
}

async fn copy_and_hash<R>(
    source: R,
    encoding: ContentEncoding,
    target: &mut TempTarget,
) -> Result<[u8; 16], DepotError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut reader: Box<dyn AsyncRead + Send + Unpin> = match encoding {
        ContentEncoding::Gzip => Box::new(GzipDecoder::new(BufReader::new(source))),
        ContentEncoding::Identity => Box::new(source),
    };
    let mut hasher = Md5::new();
    let mut total: u64 = 0;
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| classify_read_error(encoding, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        target.write_all(&buf[..n]).await.map_err(DepotError::Io)?;
        total += n as u64;
    }
    trace!(bytes = total, "received plaintext bytes");
    Ok(hasher.finalize().into())
}

// Once the decoder wraps the stream, a corrupt payload and a broken
// source both surface on the read side; attribute them to the decoder.
fn classify_read_error(encoding: ContentEncoding, e: io::Error) -> DepotError {
    match encoding {
        ContentEncoding::Gzip => DepotError::UpstreamDecode(e),
        ContentEncoding::Identity => DepotError::Io(e),
    }
}
