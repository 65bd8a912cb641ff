//! # edgequake-ipaper
//!
//! Convert record attachments into hosted, viewable iPaper documents and keep
//! the remote document's identity and lifecycle in step with the record.
//!
//! ## Why this crate?
//!
//! Applications that let users attach PDFs, slide decks, or office documents
//! usually want them readable in the browser without shipping a viewer. A
//! remote conversion service does the rendering; this crate does the
//! bookkeeping around it: when to upload, which file path or URL to hand over,
//! how to remember the resulting document, how to ask whether conversion
//! finished, and how to clean up when the record goes away.
//!
//! ## Lifecycle Overview
//!
//! ```text
//! record saved
//!  │
//!  ├─ 1. Eligible?  supported content type and no ref yet, else skip
//!  ├─ 2. Session    log in once per process (SessionManager)
//!  ├─ 3. Resolve    S3/CDN URL, staged temp copy, or local path
//!  ├─ 4. Upload     remote call, returns (doc id, access key)
//!  └─ 5. Persist    set ref on the record and save it
//!
//! record read      → status: PROCESSING / DONE / ERROR / UNKNOWN
//! record destroyed → best-effort remote delete, never blocks the destroy
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ipaper::adapter::{BoxError, Record, SingleAttachment};
//! use edgequake_ipaper::path::StorageDescriptor;
//! use edgequake_ipaper::remote::http::HttpService;
//! use edgequake_ipaper::{ConfigStore, ConversionLifecycle, RemoteDocumentRef, SessionManager};
//! use std::sync::Arc;
//!
//! struct Report {
//!     id: u64,
//!     content_type: String,
//!     path: String,
//!     ipaper: Option<RemoteDocumentRef>,
//! }
//!
//! #[async_trait::async_trait]
//! impl Record for Report {
//!     fn record_id(&self) -> String {
//!         format!("report#{}", self.id)
//!     }
//!     async fn persist(&mut self) -> Result<(), BoxError> {
//!         Ok(()) // write to the database here
//!     }
//! }
//!
//! impl SingleAttachment for Report {
//!     fn content_type(&self) -> Option<String> {
//!         Some(self.content_type.clone())
//!     }
//!     fn storage(&self) -> StorageDescriptor {
//!         StorageDescriptor::local(&self.path)
//!     }
//!     fn remote_ref(&self) -> Option<RemoteDocumentRef> {
//!         self.ipaper.clone()
//!     }
//!     fn set_remote_ref(&mut self, value: Option<RemoteDocumentRef>) {
//!         self.ipaper = value;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(ConfigStore::from_env());
//!     let config = store.load()?;
//!     let service = Arc::new(HttpService::from_config(&config)?);
//!     let sessions = Arc::new(SessionManager::new(store, service));
//!     let lifecycle = ConversionLifecycle::<Report>::single(sessions);
//!
//!     let mut report = Report {
//!         id: 1,
//!         content_type: "application/pdf".into(),
//!         path: "/srv/uploads/q3.pdf".into(),
//!         ipaper: None,
//!     };
//!     lifecycle.upload(&mut report).await?;
//!     println!("{}", lifecycle.status(&report).await);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ipaper` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ipaper = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod adapter;
pub mod config;
pub mod document;
pub mod embed;
pub mod error;
pub mod lifecycle;
pub mod path;
pub mod progress;
pub mod remote;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use adapter::{
    AttachmentAdapter, AttributeAccessors, AttributeRegistry, MultiAttributeAdapter, Record,
    SingleAttachment, SingleAttachmentAdapter,
};
pub use config::{AccessLevel, ConfigStore, ServiceConfig, ServiceConfigBuilder, StorageMode};
pub use document::{is_supported_content_type, RemoteDocumentRef, RemoteDocumentStatus};
pub use embed::{build_embed_code, embed_params, EmbedOptions, EmbedValue};
pub use error::{ConfigError, IpaperError, RemoteError};
pub use lifecycle::{
    ConversionLifecycle, ConvertibleModel, DestroyOutcome, PollConfig, SkipReason, UploadOutcome,
    ValidationIssue,
};
pub use progress::{LifecycleObserver, NoopObserver};
pub use session::SessionManager;
