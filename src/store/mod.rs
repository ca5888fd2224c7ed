//! Persistence boundary for decoded records.
//!
//! ## Implementations
//!
//! - [`MemoryStore`]: process-local, atomic batches, used by tests and when no
//!   document store is configured
//! - `MongoStore` (feature `mongo`): one collection in a MongoDB database
//!
//! The process builds one store at startup and shares it as
//! `Arc<dyn RecordStore>`.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::{Record, StoredRecord};

mod memory;
#[cfg(feature = "mongo")]
mod mongo;

pub use memory::MemoryStore;
#[cfg(feature = "mongo")]
#[cfg_attr(docsrs, doc(cfg(feature = "mongo")))]
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected batch: {0}")]
    Rejected(String),
    #[cfg(feature = "mongo")]
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Offset window into the store's default ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    /// Always at least 1
    pub limit: u64,
}

impl Page {
    /// Window for 1-based page `number` of size `limit`.
    /// Zero inputs are clamped to 1; the offset saturates instead of overflowing.
    pub fn new(number: u64, limit: u64) -> Self {
        let number = number.max(1);
        let limit = limit.max(1);
        Self {
            skip: (number - 1).saturating_mul(limit),
            limit,
        }
    }
}

/// One page of records plus the full persisted count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageResult {
    pub data: Vec<StoredRecord>,
    pub total: u64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist `records` as one batch and return them with their assigned
    /// identifiers, in input order. An empty batch is valid and returns an
    /// empty list.
    async fn insert_batch(&self, records: Vec<Record>) -> StoreResult<Vec<StoredRecord>>;

    /// Records `page.skip..page.skip + page.limit` in store order. A skip past
    /// the end yields an empty page, not an error.
    async fn query(&self, page: Page) -> StoreResult<PageResult>;

    /// Whether a failed `insert_batch` is guaranteed to have written nothing.
    fn supports_atomic_batch(&self) -> bool;
}
