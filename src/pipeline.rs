use crate::config::READ_BUFFER_CAPACITY;
use crate::io::{build_csv_reader, reader_from_path, CsvMeta, QuoteGuard};
use crate::store::RecordStore;
use crate::{IngestError, IngestResult, Record, RowLayout, StoredRecord};
use csv_async::{AsyncReaderBuilder, StringRecord};
use std::path::Path;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncRead;

/// Parse a whole CSV stream and commit it to `store` as one batch.
///
/// Rows are decoded in a single forward pass and held in memory; the store is
/// called exactly once, after the last row, so a malformed or truncated input
/// never reaches it. Input ending inside a quoted field is rejected as a
/// parse failure. The returned records keep source-row order.
pub async fn ingest<R>(reader: R, store: &dyn RecordStore) -> IngestResult<Vec<StoredRecord>>
where
    R: AsyncRead + Unpin + Send,
{
    let started = Instant::now();
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        // short and long rows are decoded with missing cells read as empty
        .flexible(true)
        .buffer_capacity(READ_BUFFER_CAPACITY)
        .create_reader(QuoteGuard::new(reader));

    let layout = RowLayout::new(rdr.headers().await?);

    let mut batch = Vec::new();
    let mut row = StringRecord::new();
    while rdr.read_record(&mut row).await? {
        batch.push(Record::from_row(&layout.row(&row)));
    }

    let rows = batch.len();
    let inserted = store.insert_batch(batch).await.map_err(|source| {
        let partial_write_possible = !store.supports_atomic_batch();
        if partial_write_possible {
            tracing::warn!(rows, "batch insert failed on a non-atomic store; some rows may be persisted");
        }
        IngestError::Persistence {
            source,
            partial_write_possible,
        }
    })?;

    tracing::info!(
        rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "ingested CSV batch"
    );
    Ok(inserted)
}

/// Ingest a local file, picking decompression from its extension.
pub async fn ingest_path(path: &Path, store: &dyn RecordStore) -> IngestResult<Vec<StoredRecord>> {
    let (reader, _meta) = reader_from_path(path).await?;
    ingest(reader, store).await
}

/// Ingest a local file with caller-supplied meta, e.g. a spooled upload whose
/// original name and content type are known.
pub async fn ingest_file(
    path: &Path,
    meta: CsvMeta,
    store: &dyn RecordStore,
) -> IngestResult<Vec<StoredRecord>> {
    let file = File::open(path).await?;
    let (reader, _meta) = build_csv_reader(file, meta);
    ingest(reader, store).await
}
