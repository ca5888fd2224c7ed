use crate::config::READ_BUFFER_CAPACITY;
use crate::IngestResult;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader, ReadBuf};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::codec::Utf8Transcoder;

#[derive(Debug, Clone)]
pub struct CsvMeta {
    /// Media type without parameters, e.g. "application/gzip" or "text/csv"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// original file name (used for extension fallback)
    pub name_hint: String,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for CsvMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

impl CsvMeta {
    /// Meta for a multipart file part, from its file name and `Content-Type`.
    ///
    /// A `charset` parameter selects transcoding; unknown labels fall back to
    /// UTF-8.
    pub fn for_upload(file_name: Option<&str>, content_type: Option<&str>) -> Self {
        let mut meta = CsvMeta {
            name_hint: file_name.unwrap_or_default().to_string(),
            ..Default::default()
        };

        if let Some(ct) = content_type {
            let mut parts = ct.split(';');
            meta.content_type = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            for param in parts {
                if let Some((key, value)) = param.split_once('=') {
                    if key.trim().eq_ignore_ascii_case("charset") {
                        let label = value.trim().trim_matches('"');
                        if let Some(enc) = encoding_rs::Encoding::for_label(label.as_bytes()) {
                            meta.charset = enc;
                        }
                    }
                }
            }
        }
        meta
    }

    fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(
                self.content_type.as_str(),
                "application/gzip" | "application/x-gzip"
            )
            || self.name_hint.ends_with(".gz")
    }

    fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.content_type == "application/zstd"
            || self.name_hint.ends_with(".zst")
    }
}

/// From a generic AsyncRead, wrap with optional decompression and UTF-8
/// transcoding.
/// Returns an AsyncRead suitable for csv_async plus the meta we used.
pub fn build_csv_reader<R>(raw: R, meta: CsvMeta) -> (impl AsyncRead + Unpin + Send, CsvMeta)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // 1) decompression choice: encoding -> type -> extension
    let buf = BufReader::with_capacity(READ_BUFFER_CAPACITY, raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = if meta.is_gzip() {
        Box::new(GzipDecoder::new(buf))
    } else if meta.is_zstd() {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };

    // 2) transcoding to UTF-8 only when charset != UTF-8 to avoid extra copies
    let text: Box<dyn AsyncRead + Unpin + Send> = if meta.charset == encoding_rs::UTF_8 {
        decompressed
    } else {
        let framed = FramedRead::new(decompressed, Utf8Transcoder::new(meta.charset));
        Box::new(StreamReader::new(framed))
    };

    (text, meta)
}

/// Build a reader from a local file path (lightweight meta from extension).
pub async fn reader_from_path(path: &Path) -> IngestResult<(impl AsyncRead + Unpin + Send, CsvMeta)> {
    let file = File::open(path).await?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut meta = CsvMeta {
        name_hint: name,
        ..Default::default()
    };

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match ext {
        "gz" => {
            meta.content_type = "application/gzip".into();
            meta.content_encoding = "gzip".into();
        }
        "zst" => {
            meta.content_type = "application/zstd".into();
            meta.content_encoding = "zstd".into();
        }
        _ => {
            meta.content_type = "text/csv".into();
        }
    }

    Ok(build_csv_reader(file, meta))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Reader adapter that fails with `InvalidData` when the input ends inside a
/// quoted field. Expects UTF-8 text, where `"`, `,` and newlines are single
/// bytes.
///
/// The CSV reader itself accepts an unterminated quote and silently swallows
/// the rest of the file into one cell. The state machine mirrors its quoting
/// rules: a quote only opens a field at field start, `""` inside a quoted
/// field is an escaped quote, and stray quotes in unquoted fields are literal.
#[derive(Debug)]
pub struct QuoteGuard<R> {
    inner: R,
    state: QuoteState,
}

impl<R> QuoteGuard<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: QuoteState::FieldStart,
        }
    }

    fn scan(&mut self, bytes: &[u8]) {
        use QuoteState::*;
        for &b in bytes {
            self.state = match (self.state, b) {
                (FieldStart, b'"') => Quoted,
                (FieldStart | Unquoted | QuoteInQuoted, b',' | b'\n' | b'\r') => FieldStart,
                (FieldStart | Unquoted, _) => Unquoted,
                (Quoted, b'"') => QuoteInQuoted,
                (Quoted, _) => Quoted,
                (QuoteInQuoted, b'"') => Quoted,
                (QuoteInQuoted, _) => Unquoted,
            };
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for QuoteGuard<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let had_room = buf.remaining() > 0;

        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let fresh = &buf.filled()[before..];
        if fresh.is_empty() && had_room && this.state == QuoteState::Quoted {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unterminated quoted field at end of input",
            )));
        }
        this.scan(fresh);
        Poll::Ready(Ok(()))
    }
}
