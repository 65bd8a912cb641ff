//! The upload → status → destroy state machine.
//!
//! ```text
//!  Unconverted ──upload──▶ Converted ──destroy_remote──▶ Destroyed
//!   (no ref)     (ref set, persisted)                    (ref cleared)
//!      ▲                                                      │
//!      └──────────────────────── upload again ◀───────────────┘
//! ```
//!
//! A [`ConversionLifecycle`] drives one attachment slot of a record type
//! through those states. [`ConvertibleModel`] fans the hooks out over every
//! slot a record type has.
//!
//! ## Error policy
//!
//! | Operation          | Failure                         | Result                       |
//! |--------------------|---------------------------------|------------------------------|
//! | `upload`           | ineligible                      | `Ok(Skipped)`, no remote call |
//! | `upload`           | config / login                  | `Err(Config)` / `Err(Auth)`  |
//! | `upload`           | remote error or empty response  | `Err(Upload)`, ref untouched |
//! | `status`           | no ref, not found, lookup error | `UNKNOWN`                    |
//! | `destroy_remote`   | anything                        | `DestroyOutcome`, never `Err` |
//!
//! Nothing here retries automatically. [`ConversionLifecycle::wait_for_conversion`]
//! polls status; it never re-uploads.

use crate::adapter::{
    AttachmentAdapter, AttributeRegistry, Record, SingleAttachment, SingleAttachmentAdapter,
};
use crate::document::is_supported_content_type;
pub use crate::document::{RemoteDocumentRef, RemoteDocumentStatus};
use crate::embed::{build_embed_code, EmbedOptions};
use crate::error::IpaperError;
use crate::progress::{NoopObserver, Observer};
use crate::remote::{RemoteDocument, UploadRequest};
use crate::session::SessionManager;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

// ── Outcomes ─────────────────────────────────────────────────────────────

/// Why an upload was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The record already holds a ref.
    AlreadyConverted,
    /// The attachment has no content type (usually: no attachment).
    MissingContentType,
    /// The service cannot convert this content type.
    UnsupportedContentType,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::AlreadyConverted => "already converted",
            SkipReason::MissingContentType => "no content type",
            SkipReason::UnsupportedContentType => "unsupported content type",
        })
    }
}

/// Result of [`ConversionLifecycle::upload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Skipped { reason: SkipReason },
    Uploaded { doc: RemoteDocumentRef },
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

/// Result of a best-effort remote deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DestroyOutcome {
    /// No ref; nothing to delete.
    NotConverted,
    /// The service no longer knows the document.
    AlreadyGone,
    Destroyed,
    /// Lookup or deletion failed. Logged, never raised.
    Failed(String),
}

impl DestroyOutcome {
    /// Whether the remote document is known to be gone.
    pub fn is_gone(&self) -> bool {
        matches!(self, DestroyOutcome::AlreadyGone | DestroyOutcome::Destroyed)
    }
}

/// Problems reported by [`ConversionLifecycle::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", content = "value", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// Remote id or access key is missing.
    MissingRef,
    MissingContentType,
    UnsupportedContentType(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingRef => f.write_str("remote id and access key must be present"),
            ValidationIssue::MissingContentType => f.write_str("content type must be present"),
            ValidationIssue::UnsupportedContentType(ct) => {
                write!(f, "content type '{ct}' cannot be converted")
            }
        }
    }
}

// ── Polling ──────────────────────────────────────────────────────────────

/// How [`ConversionLifecycle::wait_for_conversion`] polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay before the second status read, in milliseconds. Default: 2000.
    pub interval_ms: u64,

    /// Maximum number of status reads. Default: 30.
    pub max_attempts: u32,

    /// Double the delay after each read. Default: true.
    pub backoff: bool,

    /// Upper bound on a single delay when backing off. Default: 60 000.
    pub max_interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_attempts: 30,
            backoff: true,
            max_interval_ms: 60_000,
        }
    }
}

impl PollConfig {
    /// Delay before read number `attempt` (0-indexed). Zero for the first read.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let ms = if self.backoff {
            let factor = 1u64 << (attempt - 1).min(32);
            self.interval_ms
                .saturating_mul(factor)
                .min(self.max_interval_ms.max(self.interval_ms))
        } else {
            self.interval_ms
        };
        Duration::from_millis(ms)
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────

/// Conversion lifecycle for one attachment slot of record type `R`.
pub struct ConversionLifecycle<R: Record> {
    sessions: Arc<SessionManager>,
    adapter: Arc<dyn AttachmentAdapter<R>>,
    observer: Observer,
}

impl<R: Record> Clone for ConversionLifecycle<R> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            adapter: Arc::clone(&self.adapter),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<R: Record> fmt::Debug for ConversionLifecycle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionLifecycle")
            .field("attachment", &self.adapter.name())
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl<R: SingleAttachment + 'static> ConversionLifecycle<R> {
    /// Lifecycle for a record with exactly one attachment.
    pub fn single(sessions: Arc<SessionManager>) -> Self {
        Self::new(sessions, Arc::new(SingleAttachmentAdapter))
    }
}

impl<R: Record + 'static> ConversionLifecycle<R> {
    pub fn new(sessions: Arc<SessionManager>, adapter: Arc<dyn AttachmentAdapter<R>>) -> Self {
        Self {
            sessions,
            adapter,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    pub fn adapter(&self) -> &dyn AttachmentAdapter<R> {
        self.adapter.as_ref()
    }

    /// Name of the attachment slot this lifecycle drives.
    pub fn attachment(&self) -> &str {
        self.adapter.name()
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn remote_ref(&self, record: &R) -> Option<RemoteDocumentRef> {
        self.adapter.remote_ref(record)
    }

    fn skip_reason(&self, record: &R) -> Option<SkipReason> {
        if self.adapter.remote_ref(record).is_some() {
            return Some(SkipReason::AlreadyConverted);
        }
        match self.adapter.content_type(record) {
            None => Some(SkipReason::MissingContentType),
            Some(ct) if !is_supported_content_type(&ct) => Some(SkipReason::UnsupportedContentType),
            Some(_) => None,
        }
    }

    /// Supported content type and no ref yet.
    pub fn is_eligible(&self, record: &R) -> bool {
        self.skip_reason(record).is_none()
    }

    /// Upload the attachment if eligible, then set and persist the ref.
    ///
    /// # Errors
    /// * [`IpaperError::Config`] / [`IpaperError::Auth`] — no session.
    /// * [`IpaperError::TempCopy`] — a pending file could not be staged.
    /// * [`IpaperError::Upload`] — the service failed or returned no ids. The
    ///   ref is left unset, so the record stays eligible.
    /// * [`IpaperError::Persist`] — the ref was set but the record could not
    ///   be saved.
    pub async fn upload(&self, record: &mut R) -> Result<UploadOutcome, IpaperError> {
        let record_id = record.record_id();
        let attachment = self.adapter.name().to_string();

        if let Some(reason) = self.skip_reason(record) {
            debug!("{} [{}]: upload skipped ({})", record_id, attachment, reason);
            self.observer.on_upload_skipped(&record_id, &attachment, reason);
            return Ok(UploadOutcome::Skipped { reason });
        }

        let doc = match self.send(record, &record_id).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("{} [{}]: upload failed: {}", record_id, attachment, e);
                self.observer.on_upload_failed(&record_id, &attachment, &e.to_string());
                return Err(e);
            }
        };

        self.adapter.set_remote_ref(record, Some(doc.clone()));
        record.persist().await.map_err(|e| IpaperError::Persist {
            record: record_id.clone(),
            detail: e.to_string(),
        })?;

        info!(
            "{} [{}]: uploaded as document {}",
            record_id,
            attachment,
            doc.remote_id()
        );
        self.observer.on_upload_complete(&record_id, &attachment, &doc);
        Ok(UploadOutcome::Uploaded { doc })
    }

    async fn send(&self, record: &R, record_id: &str) -> Result<RemoteDocumentRef, IpaperError> {
        let config = self.sessions.config()?;
        let session = self.sessions.session().await?;

        // Held until the call returns; a staged copy is deleted on drop.
        let path = self.adapter.file_path(record, config.storage_mode).await?;
        let request = UploadRequest {
            source: path.to_upload_source(),
            access: record.access_override().unwrap_or(config.default_access),
            owner_id: record.owner_id(),
        };
        debug!(
            "{}: uploading {} ({})",
            record_id,
            request.source.location(),
            request.access
        );

        let upload_err = |detail: String| IpaperError::Upload {
            record: record_id.to_string(),
            detail,
        };
        let receipt = session
            .upload(request)
            .await
            .map_err(|e| upload_err(e.to_string()))?
            .ok_or_else(|| upload_err("service returned no document identifiers".into()))?;

        RemoteDocumentRef::new(&receipt.doc_id, &receipt.access_key)
            .ok_or_else(|| upload_err("service returned blank document identifiers".into()))
    }

    /// Delete the remote document, best-effort.
    ///
    /// Clears the ref in memory when the document is known to be gone. The
    /// record is not persisted: this runs while it is being destroyed.
    pub async fn destroy_remote(&self, record: &mut R) -> DestroyOutcome {
        let record_id = record.record_id();
        let outcome = match self.adapter.remote_ref(record) {
            None => DestroyOutcome::NotConverted,
            Some(doc) => self.destroy_by_id(&record_id, doc.remote_id()).await,
        };
        if outcome.is_gone() {
            self.adapter.set_remote_ref(record, None);
        }
        self.observer.on_destroy(&record_id, self.adapter.name(), &outcome);
        outcome
    }

    /// Delete a document by remote id, best-effort.
    pub async fn destroy_document(&self, doc_id: &str) -> DestroyOutcome {
        let outcome = self.destroy_by_id(doc_id, doc_id).await;
        self.observer.on_destroy(doc_id, self.adapter.name(), &outcome);
        outcome
    }

    async fn destroy_by_id(&self, label: &str, doc_id: &str) -> DestroyOutcome {
        let session = match self.sessions.session().await {
            Ok(s) => s,
            Err(e) => {
                warn!("{}: cannot delete document {}: {}", label, doc_id, e);
                return DestroyOutcome::Failed(e.to_string());
            }
        };

        let document = match session.find_document(doc_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                info!("{}: document {} already gone", label, doc_id);
                return DestroyOutcome::AlreadyGone;
            }
            Err(e) => {
                warn!("{}: lookup of document {} failed: {}", label, doc_id, e);
                return DestroyOutcome::Failed(e.to_string());
            }
        };

        match session.destroy_document(&document).await {
            Ok(true) => {
                info!("{}: deleted document {}", label, doc_id);
                DestroyOutcome::Destroyed
            }
            Ok(false) => {
                warn!("{}: service refused to delete document {}", label, doc_id);
                DestroyOutcome::Failed("deletion refused".into())
            }
            Err(e) => {
                warn!("{}: deleting document {} failed: {}", label, doc_id, e);
                DestroyOutcome::Failed(e.to_string())
            }
        }
    }

    async fn lookup(&self, label: &str, doc_id: &str) -> Option<RemoteDocument> {
        let session = match self.sessions.session().await {
            Ok(s) => s,
            Err(e) => {
                warn!("{}: status unavailable: {}", label, e);
                return None;
            }
        };
        match session.find_document(doc_id).await {
            Ok(found) => {
                if found.is_none() {
                    debug!("{}: document {} not found", label, doc_id);
                }
                found
            }
            Err(e) => {
                warn!("{}: lookup of document {} failed: {}", label, doc_id, e);
                None
            }
        }
    }

    /// The remote document, or `None` when there is no ref, the service does
    /// not know it, or the lookup failed.
    pub async fn remote_document(&self, record: &R) -> Option<RemoteDocument> {
        let doc = self.adapter.remote_ref(record)?;
        self.lookup(&record.record_id(), doc.remote_id()).await
    }

    /// Conversion status from a single lookup. Never fails.
    ///
    /// Without a ref this returns `UNKNOWN` without contacting the service.
    pub async fn status(&self, record: &R) -> RemoteDocumentStatus {
        let record_id = record.record_id();
        let status = match self.adapter.remote_ref(record) {
            None => RemoteDocumentStatus::Unknown,
            Some(doc) => self.status_by_id(&record_id, doc.remote_id()).await,
        };
        self.observer.on_status(&record_id, self.adapter.name(), status);
        status
    }

    /// Conversion status of a document by remote id. Never fails.
    pub async fn document_status(&self, doc_id: &str) -> RemoteDocumentStatus {
        let status = self.status_by_id(doc_id, doc_id).await;
        self.observer.on_status(doc_id, self.adapter.name(), status);
        status
    }

    async fn status_by_id(&self, label: &str, doc_id: &str) -> RemoteDocumentStatus {
        self.lookup(label, doc_id)
            .await
            .map(|doc| RemoteDocumentStatus::from_remote(&doc.conversion_status))
            .unwrap_or(RemoteDocumentStatus::Unknown)
    }

    /// Poll until the conversion completes or `poll.max_attempts` reads are
    /// used up. Returns the last status read.
    pub async fn wait_for_conversion(&self, record: &R, poll: &PollConfig) -> RemoteDocumentStatus {
        if self.adapter.remote_ref(record).is_none() {
            return RemoteDocumentStatus::Unknown;
        }
        let mut status = RemoteDocumentStatus::Unknown;
        for attempt in 0..poll.max_attempts.max(1) {
            let delay = poll.delay(attempt);
            if !delay.is_zero() {
                debug!("Waiting {:?} before status read {}", delay, attempt + 1);
                sleep(delay).await;
            }
            status = self.status(record).await;
            if status.is_complete() {
                break;
            }
        }
        status
    }

    /// [`ConversionLifecycle::wait_for_conversion`] by remote id.
    pub async fn wait_for_document(&self, doc_id: &str, poll: &PollConfig) -> RemoteDocumentStatus {
        let mut status = RemoteDocumentStatus::Unknown;
        for attempt in 0..poll.max_attempts.max(1) {
            let delay = poll.delay(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }
            status = self.document_status(doc_id).await;
            if status.is_complete() {
                break;
            }
        }
        status
    }

    /// Remote thumbnail if the service has one, else the adapter's fallback.
    pub async fn thumbnail_url(&self, record: &R) -> Option<String> {
        let remote = self.remote_document(record).await;
        self.adapter.thumbnail_url(record, remote.as_ref())
    }

    /// Check that the record is fully set up as a converted document.
    pub fn validate(&self, record: &R) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if self.adapter.remote_ref(record).is_none() {
            issues.push(ValidationIssue::MissingRef);
        }
        match self.adapter.content_type(record) {
            None => issues.push(ValidationIssue::MissingContentType),
            Some(ct) if !is_supported_content_type(&ct) => {
                issues.push(ValidationIssue::UnsupportedContentType(ct))
            }
            Some(_) => {}
        }
        issues
    }

    /// Viewer markup for the converted document, `None` if not converted.
    pub fn embed_code(&self, record: &R, options: &EmbedOptions) -> Option<String> {
        let doc = self.adapter.remote_ref(record)?;
        Some(build_embed_code(doc.remote_id(), doc.access_key(), options))
    }
}

// ── Hook fan-out ─────────────────────────────────────────────────────────

/// Every conversion lifecycle of a record type, driven from save and destroy
/// hooks.
pub struct ConvertibleModel<R: Record> {
    lifecycles: Vec<ConversionLifecycle<R>>,
}

impl<R: Record> fmt::Debug for ConvertibleModel<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.lifecycles.iter().map(|l| l.adapter.name()))
            .finish()
    }
}

impl<R: SingleAttachment + 'static> ConvertibleModel<R> {
    /// Model with one attachment.
    pub fn single(sessions: Arc<SessionManager>) -> Self {
        Self {
            lifecycles: vec![ConversionLifecycle::single(sessions)],
        }
    }
}

impl<R: Record + 'static> ConvertibleModel<R> {
    /// One lifecycle per registered attribute, in registration order.
    ///
    /// # Errors
    /// [`IpaperError::InvalidConfig`] if the registry is empty.
    pub fn from_registry(
        sessions: Arc<SessionManager>,
        registry: &AttributeRegistry<R>,
    ) -> Result<Self, IpaperError> {
        if registry.is_empty() {
            return Err(IpaperError::InvalidConfig(
                "no attachment attributes registered".into(),
            ));
        }
        let lifecycles = registry
            .adapters()
            .into_iter()
            .map(|adapter| {
                let adapter: Arc<dyn AttachmentAdapter<R>> = Arc::new(adapter);
                ConversionLifecycle::new(Arc::clone(&sessions), adapter)
            })
            .collect();
        Ok(Self { lifecycles })
    }

    pub fn with_observer(self, observer: Observer) -> Self {
        Self {
            lifecycles: self
                .lifecycles
                .into_iter()
                .map(|l| l.with_observer(Arc::clone(&observer)))
                .collect(),
        }
    }

    pub fn lifecycles(&self) -> &[ConversionLifecycle<R>] {
        &self.lifecycles
    }

    /// Lifecycle for a named attachment.
    ///
    /// # Errors
    /// [`IpaperError::UnregisteredAttribute`] if no lifecycle has that name.
    pub fn lifecycle(&self, attachment: &str) -> Result<&ConversionLifecycle<R>, IpaperError> {
        self.lifecycles
            .iter()
            .find(|l| l.attachment() == attachment)
            .ok_or_else(|| IpaperError::UnregisteredAttribute {
                name: attachment.to_string(),
            })
    }

    /// Save hook: upload every eligible attachment, in order.
    ///
    /// Stops at the first error; attachments already uploaded keep their refs.
    pub async fn after_save(&self, record: &mut R) -> Result<Vec<(String, UploadOutcome)>, IpaperError> {
        let mut outcomes = Vec::with_capacity(self.lifecycles.len());
        for lifecycle in &self.lifecycles {
            let outcome = lifecycle.upload(record).await?;
            outcomes.push((lifecycle.attachment().to_string(), outcome));
        }
        Ok(outcomes)
    }

    /// Destroy hook: delete every remote document, best-effort.
    pub async fn before_destroy(&self, record: &mut R) -> Vec<(String, DestroyOutcome)> {
        let mut outcomes = Vec::with_capacity(self.lifecycles.len());
        for lifecycle in &self.lifecycles {
            let outcome = lifecycle.destroy_remote(record).await;
            outcomes.push((lifecycle.attachment().to_string(), outcome));
        }
        outcomes
    }

    /// Viewer markup for a named attachment, `None` if it is not converted.
    pub fn embed_code(
        &self,
        record: &R,
        attachment: &str,
        options: &EmbedOptions,
    ) -> Result<Option<String>, IpaperError> {
        Ok(self.lifecycle(attachment)?.embed_code(record, options))
    }
}
