//! CSV upload service: parse uploaded CSV files into user records, persist
//! them as one batch and serve them back page by page.
//!
//! - Decoding: [`Record::from_row`] over a [`RawRow`], lenient numeric coercion
//!   via [`parse_leading_int`].
//! - Ingestion: [`ingest`] / [`ingest_path`], single forward pass, one
//!   [`RecordStore::insert_batch`] call per file.
//! - Storage: [`RecordStore`] trait, [`MemoryStore`] always, `MongoStore`
//!   behind feature `mongo`.
//! - HTTP: [`http::create_router`] (`POST /upload`, `GET /data`).
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
pub mod config;
pub mod http;
mod io;
mod pipeline;
mod record;
pub mod store;

pub use crate::io::{build_csv_reader, reader_from_path, CsvMeta, QuoteGuard};
pub use crate::pipeline::{ingest, ingest_file, ingest_path};
pub use crate::record::{parse_leading_int, RawRow, Record, RecordId, RowLayout, StoredRecord, COLUMNS};
pub use crate::store::{MemoryStore, Page, PageResult, RecordStore, StoreError};

use thiserror::Error;

/// Error type returned by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed CSV or a failed read of the input stream. Nothing was inserted.
    #[error("failed to parse CSV input: {0}")]
    Parse(#[from] csv_async::Error),
    /// Reading the input failed before the store was called: missing file,
    /// broken compression stream, truncated upload or an unterminated quoted
    /// field. Counted with [`IngestError::Parse`] by [`IngestError::is_parse`].
    #[error("failed to read CSV input: {0}")]
    Io(#[from] std::io::Error),
    /// The store rejected the batch or could not be reached.
    #[error("failed to persist batch: {source}")]
    Persistence {
        #[source]
        source: StoreError,
        /// Set when the store cannot guarantee all-or-nothing batches, so a
        /// prefix of the batch may already be durable.
        partial_write_possible: bool,
    },
}

impl IngestError {
    /// True for every failure that happened before the store was called,
    /// including I/O errors on the input: nothing was inserted.
    pub fn is_parse(&self) -> bool {
        matches!(self, IngestError::Parse(_) | IngestError::Io(_))
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
