//! HTTP tests driving the router with an in-memory store and a temporary
//! upload directory, via tower::ServiceExt.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use csv_upload::http::{create_router, AppState};
use csv_upload::store::{Page, PageResult, RecordStore, StoreError, StoreResult};
use csv_upload::{MemoryStore, Record, StoredRecord};

const BOUNDARY: &str = "csv-upload-test-boundary";

const SAMPLE: &str = "Email,Name,CreditScore,CreditLines,MaskedPhoneNumber\n\
                      a@x.com,Alice,700,3,***1234\n\
                      b@x.com,Bob,abc,2,***5678\n";

struct TestApp {
    router: axum::Router,
    store: Arc<MemoryStore>,
    dir: tempfile::TempDir,
}

fn test_app_with_limit(max_upload_bytes: usize) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let state = AppState {
        store: store.clone(),
        upload_dir: dir.path().to_path_buf(),
        max_upload_bytes,
    };
    TestApp {
        router: create_router(state),
        store,
        dir,
    }
}

fn test_app() -> TestApp {
    test_app_with_limit(10 * 1024 * 1024)
}

/// One multipart part: (field name, file name, content type, content)
type Part<'a> = (&'a str, Option<&'a str>, &'a str, &'a [u8]);

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content_type, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match file_name {
            Some(f) => format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n"),
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: &axum::Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn spooled_files(app: &TestApp) -> usize {
    std::fs::read_dir(app.dir.path()).unwrap().count()
}

fn users_csv(n: usize) -> String {
    let mut csv = String::from("Email,Name,CreditScore,CreditLines,MaskedPhoneNumber\n");
    for i in 1..=n {
        csv.push_str(&format!("user{i}@x.com,User {i},{},{},***{i:04}\n", 600 + i, i % 5));
    }
    csv
}

// ---------------------------------------------------------------
// Upload
// ---------------------------------------------------------------

#[tokio::test]
async fn upload_returns_inserted_records_with_ids() {
    let app = test_app();
    let req = upload_request(&[("file", Some("user_data.csv"), "text/csv", SAMPLE.as_bytes())]);
    let (status, json) = send(&app.router, req).await;

    assert_eq!(status, StatusCode::OK);
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["_id"].is_string()));

    assert_eq!(records[0]["email"], "a@x.com");
    assert_eq!(records[0]["name"], "Alice");
    assert_eq!(records[0]["creditScore"], 700);
    assert_eq!(records[0]["creditLines"], 3);
    assert_eq!(records[0]["maskedPhoneNumber"], "***1234");

    assert_eq!(records[1]["email"], "b@x.com");
    assert!(records[1]["creditScore"].is_null());
    assert_eq!(records[1]["creditLines"], 2);

    assert_eq!(app.store.len().await, 2);
    // the upload stays available under /uploads
    assert_eq!(spooled_files(&app), 1);
}

#[tokio::test]
async fn uploads_are_spooled_to_distinct_files() {
    let app = test_app();
    for _ in 0..2 {
        let req = upload_request(&[("file", Some("user_data.csv"), "text/csv", SAMPLE.as_bytes())]);
        let (status, _) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(spooled_files(&app), 2);
    assert_eq!(app.store.len().await, 4);
}

#[tokio::test]
async fn header_only_upload_returns_empty_array() {
    let app = test_app();
    let csv: &[u8] = b"Email,Name,CreditScore,CreditLines,MaskedPhoneNumber\n";
    let (status, json) = send(
        &app.router,
        upload_request(&[("file", Some("empty.csv"), "text/csv", csv)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let app = test_app();
    let note: &[u8] = b"no file here";
    let req = upload_request(&[("comment", None, "text/plain", note)]);
    let (status, json) = send(&app.router, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "no_file");
    assert!(app.store.is_empty().await);
    assert_eq!(spooled_files(&app), 0);
}

#[tokio::test]
async fn upload_without_multipart_body_is_rejected() {
    let app = test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "no_file");
}

#[tokio::test]
async fn upload_with_two_files_is_rejected() {
    let app = test_app();
    let req = upload_request(&[
        ("file", Some("a.csv"), "text/csv", SAMPLE.as_bytes()),
        ("file", Some("b.csv"), "text/csv", SAMPLE.as_bytes()),
    ]);
    let (status, json) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "multiple_files");
    assert!(app.store.is_empty().await);
    assert_eq!(spooled_files(&app), 0);
}

#[tokio::test]
async fn malformed_csv_is_a_server_error_without_detail() {
    let app = test_app();
    let csv: &[u8] = b"Email,Name\n\"a@x.com,Alice\nb@x.com,Bob\n";
    let (status, json) = send(
        &app.router,
        upload_request(&[("file", Some("broken.csv"), "text/csv", csv)]),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "parse_failed");
    assert_eq!(json["error"], "Internal server error.");
    assert!(app.store.is_empty().await);
    assert_eq!(spooled_files(&app), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = test_app_with_limit(1024);
    let csv = users_csv(200);
    let req = upload_request(&[("file", Some("big.csv"), "text/csv", csv.as_bytes())]);
    let (status, json) = send(&app.router, req).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "payload_too_large");
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn truncated_upload_inserts_nothing() {
    let app = test_app();
    let mut body = multipart_body(&[("file", Some("users.csv"), "text/csv", SAMPLE.as_bytes())]);
    // client went away mid-row: no closing boundary
    let row = body.windows(5).position(|w| w == b"a@x.c").unwrap();
    body.truncate(row + 12);
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&app.router, req).await;

    assert!(!status.is_success(), "unexpected status {status}");
    assert!(app.store.is_empty().await);
    assert_eq!(spooled_files(&app), 0);
}

#[tokio::test]
async fn gzip_upload_ingests_like_plain_csv() {
    use async_compression::tokio::bufread::GzipEncoder;
    use tokio::io::AsyncReadExt;

    let app = test_app();
    let csv = users_csv(25);
    let mut gz = Vec::new();
    GzipEncoder::new(csv.as_bytes())
        .read_to_end(&mut gz)
        .await
        .unwrap();

    let req = upload_request(&[("file", Some("users.csv.gz"), "application/octet-stream", &gz)]);
    let (status, json) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 25);
    assert_eq!(records[0]["email"], "user1@x.com");
    assert_eq!(records[24]["creditScore"], 625);

    // spooled copy keeps the compression suffix
    let names: Vec<String> = std::fs::read_dir(app.dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with(".csv.gz"), "spooled as {}", names[0]);
}

#[tokio::test]
async fn charset_from_part_content_type_is_honoured() {
    let app = test_app();
    let csv: &[u8] = b"Email,Name,CreditScore,CreditLines,MaskedPhoneNumber\nj@x.com,Jos\xe9,640,1,***0001\n";
    let req = upload_request(&[(
        "file",
        Some("latin.csv"),
        "text/csv; charset=windows-1252",
        csv,
    )]);
    let (status, json) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["name"], "José");
}

// ---------------------------------------------------------------
// Listing
// ---------------------------------------------------------------

#[tokio::test]
async fn data_pages_through_stored_records() {
    let app = test_app();
    let csv = users_csv(25);
    let (status, _) = send(
        &app.router,
        upload_request(&[("file", Some("users.csv"), "text/csv", csv.as_bytes())]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app.router, get("/data?page=2&limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 25);
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 10);
    assert_eq!(data[0]["email"], "user11@x.com");
    assert_eq!(data[9]["email"], "user20@x.com");

    let (_, past_end) = send(&app.router, get("/data?page=5&limit=10")).await;
    assert_eq!(past_end["total"], 25);
    assert_eq!(past_end["data"], serde_json::json!([]));
}

#[tokio::test]
async fn data_without_params_matches_defaults() {
    let app = test_app();
    let csv = users_csv(30);
    send(
        &app.router,
        upload_request(&[("file", Some("users.csv"), "text/csv", csv.as_bytes())]),
    )
    .await;

    let (_, bare) = send(&app.router, get("/data")).await;
    let (_, explicit) = send(&app.router, get("/data?page=1&limit=20")).await;
    let (_, garbage) = send(&app.router, get("/data?page=zero&limit=-4")).await;
    assert_eq!(bare, explicit);
    assert_eq!(bare, garbage);
    assert_eq!(bare["data"].as_array().unwrap().len(), 20);
    assert_eq!(bare["total"], 30);
}

#[tokio::test]
async fn data_on_empty_store() {
    let app = test_app();
    let (status, json) = send(&app.router, get("/data")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({ "data": [], "total": 0 }));
}

#[tokio::test]
async fn welcome_text() {
    let app = test_app();
    let resp = app.router.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(std::str::from_utf8(&body).unwrap().starts_with("Welcome"));
}

// ---------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------

struct DownStore;

#[async_trait]
impl RecordStore for DownStore {
    async fn insert_batch(&self, _records: Vec<Record>) -> StoreResult<Vec<StoredRecord>> {
        Err(StoreError::Unavailable("connection refused (127.0.0.1:27017)".into()))
    }

    async fn query(&self, _page: Page) -> StoreResult<PageResult> {
        Err(StoreError::Unavailable("connection refused (127.0.0.1:27017)".into()))
    }

    fn supports_atomic_batch(&self) -> bool {
        false
    }
}

fn down_app(dir: &tempfile::TempDir) -> axum::Router {
    create_router(AppState {
        store: Arc::new(DownStore),
        upload_dir: dir.path().to_path_buf(),
        max_upload_bytes: 1024 * 1024,
    })
}

#[tokio::test]
async fn persistence_failure_hides_store_detail() {
    let dir = tempfile::tempdir().unwrap();
    let router = down_app(&dir);
    let req = upload_request(&[("file", Some("user_data.csv"), "text/csv", SAMPLE.as_bytes())]);
    let (status, json) = send(&router, req).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "persistence_failed");
    assert!(!json.to_string().contains("27017"));
}

#[tokio::test]
async fn query_failure_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let router = down_app(&dir);
    let (status, json) = send(&router, get("/data")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "query_failed");
}
