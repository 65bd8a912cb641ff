//! Observer trait for lifecycle events.
//!
//! Inject an [`Arc<dyn LifecycleObserver>`] via
//! [`crate::lifecycle::ConversionLifecycle::with_observer`] to be told when
//! uploads happen or are skipped, when a status is read, and how a remote
//! deletion ended. Tracing logs cover the same events; the observer exists for
//! callers that need them as values (metrics, audit rows, a progress bar).
//!
//! # Example
//!
//! ```rust
//! use edgequake_ipaper::{LifecycleObserver, RemoteDocumentRef};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct CountingObserver {
//!     uploads: AtomicUsize,
//! }
//!
//! impl LifecycleObserver for CountingObserver {
//!     fn on_upload_complete(&self, _record: &str, _attachment: &str, _doc: &RemoteDocumentRef) {
//!         self.uploads.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::document::{RemoteDocumentRef, RemoteDocumentStatus};
use crate::lifecycle::{DestroyOutcome, SkipReason};
use std::sync::Arc;

/// Called by [`crate::lifecycle::ConversionLifecycle`] as records move
/// through the conversion states.
///
/// All methods default to no-ops. Implementations must be `Send + Sync`:
/// lifecycles for different records run concurrently.
pub trait LifecycleObserver: Send + Sync {
    /// An upload was not attempted.
    fn on_upload_skipped(&self, record: &str, attachment: &str, reason: SkipReason) {
        let _ = (record, attachment, reason);
    }

    /// The ref was set and persisted.
    fn on_upload_complete(&self, record: &str, attachment: &str, doc: &RemoteDocumentRef) {
        let _ = (record, attachment, doc);
    }

    /// The upload raised. `error` is the rendered error.
    fn on_upload_failed(&self, record: &str, attachment: &str, error: &str) {
        let _ = (record, attachment, error);
    }

    /// A status was computed (including `UNKNOWN`).
    fn on_status(&self, record: &str, attachment: &str, status: RemoteDocumentStatus) {
        let _ = (record, attachment, status);
    }

    /// A remote deletion attempt ended.
    fn on_destroy(&self, record: &str, attachment: &str, outcome: &DestroyOutcome) {
        let _ = (record, attachment, outcome);
    }
}

/// Observer that ignores every event. The default.
pub struct NoopObserver;

impl LifecycleObserver for NoopObserver {}

/// Shared observer handle as stored by the lifecycle.
pub type Observer = Arc<dyn LifecycleObserver>;
