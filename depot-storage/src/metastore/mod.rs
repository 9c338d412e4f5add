//! Durable, transactional mapping from logical path to file record.

mod errors;
mod fjall_store;
mod record;
mod traits;

pub use errors::MetaError;
pub use fjall_store::FjallStore;
pub use record::FileRecord;
pub use traits::{Durability, MetaStore};
