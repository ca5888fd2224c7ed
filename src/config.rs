//! Configuration constants and server settings
//!
//! Tunables live here as constants; [`ServerConfig`] is what the `server`
//! binary assembles from its flags and environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

// ============================================================================
// HTTP
// ============================================================================

pub const DEFAULT_PORT: u16 = 3001;

pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Ceiling for a whole upload request body
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10 MB

/// Multipart field carrying the uploaded file
pub const UPLOAD_FIELD: &str = "file";

pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

// ============================================================================
// Pagination
// ============================================================================

pub const DEFAULT_PAGE: u64 = 1;

pub const DEFAULT_LIMIT: u64 = 20;

// ============================================================================
// Storage
// ============================================================================

pub const DEFAULT_MONGO_DB: &str = "webapp";

pub const RECORD_COLLECTION: &str = "users";

// ============================================================================
// I/O
// ============================================================================

/// Buffer in front of the raw upload stream
///
/// 1 MiB keeps syscall count low for the decompressors and the CSV reader
/// while staying well under the upload ceiling.
pub const READ_BUFFER_CAPACITY: usize = 1 << 20; // 1 MiB

/// Settings for one server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Where uploads are spooled; also served under `/uploads`
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Document store address; `None` selects the in-memory store
    pub mongo_uri: Option<String>,
    pub mongo_db: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND,
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            mongo_uri: None,
            mongo_db: DEFAULT_MONGO_DB.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}
