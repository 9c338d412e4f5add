//! # Depot Storage Engine
//!
//! Storage engine for a network-accessible file depot: clients upload
//! byte blobs to a logical path, the engine persists them on disk,
//! records per-path metadata (creation time, MD5 content hash, expiry)
//! and later serves them back or reclaims them once expired.
//!
//! The engine is split along its failure domains:
//!
//! - **Metadata**: a transactional path -> [`FileRecord`] map backed by
//!   fjall ([`metastore`]). Writers serialize, readers see snapshots.
//! - **Blobs**: a filesystem subtree mirroring the path namespace
//!   ([`fs::DiskStore`]). Ingestion writes a temporary sibling and
//!   publishes it with an atomic rename, so no reader ever observes a
//!   partially written file at its final path.
//! - **Reclamation**: an expiry sweep that deletes stale records and
//!   their files, then prunes emptied directories bottom-up.
//!
//! All of it hangs off the [`Depot`] service context:
//!
//! ```no_run
//! use depot_storage::{ContentEncoding, Depot, Durability, OverwritePolicy};
//!
//! # async fn example() -> Result<(), depot_storage::DepotError> {
//! let depot = Depot::open("./data", "./meta", Durability::Fdatasync)?;
//!
//! let payload = futures::io::Cursor::new(b"hello".to_vec());
//! let outcome = depot
//!     .ingest("/logs/a.log", payload, ContentEncoding::Identity, "2400h", OverwritePolicy::Replace)
//!     .await?;
//! println!("stored with hash {}", outcome.record().hash_hex());
//! # Ok(())
//! # }
//! ```

pub mod depot;
pub mod errors;
pub mod fs;
pub mod metastore;

mod ingest;
mod reaper;
mod retrieve;

pub use depot::Depot;
pub use errors::DepotError;
pub use fs::DiskStore;
pub use ingest::{ContentEncoding, IngestOutcome, OverwritePolicy};
pub use metastore::{Durability, FileRecord, FjallStore, MetaError, MetaStore};
pub use reaper::ReapReport;
pub use retrieve::RetrievedFile;
