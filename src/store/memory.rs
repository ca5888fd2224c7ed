use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Page, PageResult, RecordStore, StoreResult};
use crate::{Record, RecordId, StoredRecord};

/// In-process store keeping records in insertion order.
///
/// Ids are a running counter rendered as 24 hex digits, so they sort the
/// same way as the records do.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    records: Vec<StoredRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_batch(&self, records: Vec<Record>) -> StoreResult<Vec<StoredRecord>> {
        // One write guard for the whole batch: concurrent readers see all of it or none
        let mut inner = self.inner.write().await;
        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            inner.next_id += 1;
            inserted.push(StoredRecord {
                id: RecordId::new(format!("{:024x}", inner.next_id)),
                record,
            });
        }
        inner.records.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn query(&self, page: Page) -> StoreResult<PageResult> {
        let inner = self.inner.read().await;
        let skip = usize::try_from(page.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        let data = inner.records.iter().skip(skip).take(limit).cloned().collect();
        Ok(PageResult {
            data,
            total: inner.records.len() as u64,
        })
    }

    fn supports_atomic_batch(&self) -> bool {
        true
    }
}
