//! HTTP surface
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Welcome text |
//! | `POST` | `/upload` | Multipart upload of one CSV file in field `file` |
//! | `GET` | `/data?page=&limit=` | One page of stored records plus the total |
//! | `GET` | `/uploads/*` | Spooled upload files |

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::{DEFAULT_LIMIT, DEFAULT_PAGE, UPLOAD_FIELD};
use crate::store::{Page, PageResult, RecordStore};
use crate::{ingest_file, parse_leading_int, CsvMeta, IngestError, StoredRecord};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.upload_dir);
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(welcome))
        .route("/upload", post(upload))
        .route("/data", get(list_records))
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve `router` until Ctrl+C, letting in-flight requests finish.
pub async fn serve(router: Router, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// Client-facing failures. Bodies carry a stable code and a generic message;
/// diagnostic detail only goes to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    NoFile,
    MultipleFiles,
    InvalidUpload,
    PayloadTooLarge,
    UploadFailed,
    ParseFailed,
    PersistenceFailed,
    QueryFailed,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    code: &'static str,
}

impl ApiError {
    pub fn status(self) -> StatusCode {
        match self {
            ApiError::NoFile | ApiError::MultipleFiles | ApiError::InvalidUpload => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UploadFailed
            | ApiError::ParseFailed
            | ApiError::PersistenceFailed
            | ApiError::QueryFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ApiError::NoFile => "no_file",
            ApiError::MultipleFiles => "multiple_files",
            ApiError::InvalidUpload => "invalid_upload",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::UploadFailed => "upload_failed",
            ApiError::ParseFailed => "parse_failed",
            ApiError::PersistenceFailed => "persistence_failed",
            ApiError::QueryFailed => "query_failed",
        }
    }

    fn message(self) -> &'static str {
        match self {
            ApiError::NoFile => "No file uploaded.",
            ApiError::MultipleFiles => "Exactly one file must be uploaded.",
            ApiError::InvalidUpload => "Malformed upload request.",
            ApiError::PayloadTooLarge => "Uploaded file is too large.",
            _ => "Internal server error.",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message(),
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        tracing::warn!(error = %err.body_text(), "rejected multipart upload");
        ApiError::InvalidUpload
    }
}

/// `GET /`
async fn welcome() -> &'static str {
    "Welcome to the Data-Driven Web Application!"
}

/// `POST /upload` — spool the file, ingest it, answer with the stored batch.
async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<StoredRecord>>, ApiError> {
    // A request that is not multipart at all carries no file either
    let multipart = multipart.map_err(|_| ApiError::NoFile)?;
    let (path, meta) = receive_upload(multipart, &state.upload_dir).await?;

    match ingest_file(&path, meta, state.store.as_ref()).await {
        Ok(inserted) => {
            tracing::info!(file = %path.display(), rows = inserted.len(), "upload stored");
            Ok(Json(inserted))
        }
        Err(err) => {
            tracing::error!(file = %path.display(), error = %err, "upload ingestion failed");
            discard(&path).await;
            Err(match err {
                IngestError::Persistence { .. } => ApiError::PersistenceFailed,
                _ => ApiError::ParseFailed,
            })
        }
    }
}

/// Read the multipart body, spooling the single `file` part to disk.
/// Other fields are skipped.
async fn receive_upload(
    mut multipart: Multipart,
    upload_dir: &Path,
) -> Result<(PathBuf, CsvMeta), ApiError> {
    let mut spooled: Option<(PathBuf, CsvMeta)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some((path, _)) = &spooled {
                    discard(path).await;
                }
                return Err(multipart_error(e));
            }
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        if let Some((path, _)) = &spooled {
            discard(path).await;
            return Err(ApiError::MultipleFiles);
        }

        let meta = CsvMeta::for_upload(field.file_name(), field.content_type());
        let path = upload_dir.join(spool_name(&meta.name_hint));
        match spool(field, &path).await {
            Ok(bytes) => tracing::debug!(file = %path.display(), bytes, "upload spooled"),
            Err(e) => {
                discard(&path).await;
                return Err(e);
            }
        }
        spooled = Some((path, meta));
    }

    spooled.ok_or(ApiError::NoFile)
}

/// Unique file name per upload, keeping the compression suffix so the
/// spooled file stays readable when served back.
fn spool_name(original: &str) -> String {
    let ext = if original.ends_with(".gz") {
        "csv.gz"
    } else if original.ends_with(".zst") {
        "csv.zst"
    } else {
        "csv"
    };
    format!("{}.{ext}", Uuid::new_v4())
}

async fn spool(mut field: Field<'_>, path: &Path) -> Result<u64, ApiError> {
    let io_failed = |e: std::io::Error| {
        tracing::error!(file = %path.display(), error = %e, "failed to spool upload");
        ApiError::UploadFailed
    };

    let mut file = File::create(path).await.map_err(io_failed)?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        file.write_all(&chunk).await.map_err(io_failed)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_failed)?;
    Ok(written)
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(file = %path.display(), error = %e, "failed to remove spooled upload");
        }
    }
}

/// Raw `page`/`limit` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageParams {
    /// Leading-integer coercion; absent, unparseable or non-positive values
    /// fall back to page 1 and limit 20.
    pub fn to_page(&self) -> Page {
        fn positive(raw: Option<&str>, default: u64) -> u64 {
            raw.and_then(parse_leading_int)
                .and_then(|v| u64::try_from(v).ok())
                .filter(|&v| v >= 1)
                .unwrap_or(default)
        }
        Page::new(
            positive(self.page.as_deref(), DEFAULT_PAGE),
            positive(self.limit.as_deref(), DEFAULT_LIMIT),
        )
    }
}

/// `GET /data`
async fn list_records(
    State(state): State<AppState>,
    params: Option<Query<PageParams>>,
) -> Result<Json<PageResult>, ApiError> {
    let page = params.map(|Query(p)| p).unwrap_or_default().to_page();
    state.store.query(page).await.map(Json).map_err(|e| {
        tracing::error!(skip = page.skip, limit = page.limit, error = %e, "record query failed");
        ApiError::QueryFailed
    })
}
