use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson};
use mongodb::{Client, Collection};
use serde::Deserialize;

use super::{Page, PageResult, RecordStore, StoreError, StoreResult};
use crate::config::RECORD_COLLECTION;
use crate::{Record, RecordId, StoredRecord};

/// Records kept as documents in one MongoDB collection.
///
/// `insert_many` runs ordered and without a transaction: when it fails, the
/// documents before the failing one stay written.
#[derive(Debug, Clone)]
pub struct MongoStore {
    collection: Collection<Record>,
}

#[derive(Debug, Deserialize)]
struct UserDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    #[serde(flatten)]
    record: Record,
}

impl MongoStore {
    /// Connect and verify the server answers before accepting traffic.
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 }).await?;
        tracing::info!(database, collection = RECORD_COLLECTION, "connected to MongoDB");
        Ok(Self {
            collection: db.collection(RECORD_COLLECTION),
        })
    }
}

fn id_from_bson(value: &Bson) -> RecordId {
    match value {
        Bson::ObjectId(oid) => RecordId::new(oid.to_hex()),
        other => RecordId::new(other.to_string()),
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn insert_batch(&self, records: Vec<Record>) -> StoreResult<Vec<StoredRecord>> {
        // insert_many refuses an empty document list
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let result = self.collection.insert_many(&records).await?;
        records
            .into_iter()
            .enumerate()
            .map(|(idx, record)| {
                let id = result.inserted_ids.get(&idx).ok_or_else(|| {
                    StoreError::Rejected(format!("no id reported for document {idx}"))
                })?;
                Ok(StoredRecord {
                    id: id_from_bson(id),
                    record,
                })
            })
            .collect()
    }

    async fn query(&self, page: Page) -> StoreResult<PageResult> {
        let cursor = self
            .collection
            .clone_with_type::<UserDocument>()
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .skip(page.skip)
            .limit(i64::try_from(page.limit).unwrap_or(i64::MAX))
            .await?;
        let docs: Vec<UserDocument> = cursor.try_collect().await?;
        let total = self.collection.count_documents(doc! {}).await?;

        Ok(PageResult {
            data: docs
                .into_iter()
                .map(|d| StoredRecord {
                    id: RecordId::new(d.id.to_hex()),
                    record: d.record,
                })
                .collect(),
            total,
        })
    }

    fn supports_atomic_batch(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_maps_to_hex() {
        let oid = ObjectId::parse_str("65f1c0ffee0000000000abcd").unwrap();
        assert_eq!(id_from_bson(&Bson::ObjectId(oid)).as_str(), "65f1c0ffee0000000000abcd");
    }

    #[test]
    fn other_id_types_fall_back_to_display() {
        assert_eq!(id_from_bson(&Bson::Int32(7)).as_str(), "7");
        assert_eq!(id_from_bson(&Bson::Int64(42)).as_str(), "42");
    }
}
