//! The remote conversion service, seen as an opaque capability.
//!
//! The lifecycle only needs four things from the service: log in, upload a
//! file, look a document up, and delete it. They are expressed as two traits
//! so the lifecycle can be driven by the real HTTP client in production
//! ([`http::HttpService`]) and by [`memory::InMemoryService`] in tests.
//!
//! ```text
//! RemoteService ──login──▶ RemoteSession ──upload──────────▶ UploadReceipt
//!                                          ├─find_document──▶ Option<RemoteDocument>
//!                                          └─destroy_document▶ bool
//! ```
//!
//! A document that does not exist is `Ok(None)` from
//! [`RemoteSession::find_document`]; `Err` is reserved for real failures.

pub mod http;
pub mod memory;

use crate::config::{AccessLevel, Credentials};
use crate::error::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Entry point to the remote service: exchanges credentials for a session.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Authenticate and return a session handle.
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn RemoteSession>, RemoteError>;
}

/// An authenticated handle to the remote service.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Upload a file (or a URL the service fetches itself) for conversion.
    ///
    /// `Ok(None)` means the service accepted the call but returned no
    /// document identifiers.
    async fn upload(&self, request: UploadRequest) -> Result<Option<UploadReceipt>, RemoteError>;

    /// Look a document up by its remote id. `Ok(None)` when it does not exist.
    async fn find_document(&self, doc_id: &str) -> Result<Option<RemoteDocument>, RemoteError>;

    /// Delete a document. `Ok(false)` when the service refused.
    async fn destroy_document(&self, document: &RemoteDocument) -> Result<bool, RemoteError>;
}

/// What to send to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// A public URL; the service downloads it.
    Url(String),
    /// A local file; its bytes are sent in the request under `file_name`.
    File { path: PathBuf, file_name: String },
}

impl UploadSource {
    /// Human-readable location for logs.
    pub fn location(&self) -> String {
        match self {
            UploadSource::Url(url) => url.clone(),
            UploadSource::File { path, .. } => path.display().to_string(),
        }
    }
}

/// A single upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub source: UploadSource,
    pub access: AccessLevel,
    /// Optional owner id forwarded to the service (`my_user_id`).
    pub owner_id: Option<String>,
}

/// Identifiers returned by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub doc_id: String,
    pub access_key: String,
}

/// A document as the remote service currently reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub doc_id: String,
    /// Raw status string, e.g. `PROCESSING`, `DISPLAYABLE`, `DONE`, `ERROR`.
    pub conversion_status: String,
    pub thumbnail_url: Option<String>,
}
