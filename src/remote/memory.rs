//! In-memory remote service for tests and offline development.
//!
//! Every call is recorded so tests can assert on what the lifecycle did
//! ("no upload was made", "login happened once"), and each operation can be
//! switched into a failure mode to exercise error paths without a network.
//!
//! ```rust
//! use edgequake_ipaper::remote::memory::InMemoryService;
//!
//! let service = InMemoryService::new();
//! service.fail_uploads(true);
//! assert_eq!(service.upload_count(), 0);
//! ```

use super::{RemoteDocument, RemoteService, RemoteSession, UploadReceipt, UploadRequest};
use crate::config::Credentials;
use crate::error::RemoteError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    documents: HashMap<String, RemoteDocument>,
    next_id: u64,

    login_count: usize,
    uploads: Vec<UploadRequest>,
    lookup_count: usize,
    destroyed: Vec<String>,

    expected_credentials: Option<(String, String)>,
    fail_login: bool,
    fail_upload: bool,
    empty_upload: bool,
    fail_lookup: bool,
    refuse_destroy: bool,
}

/// Remote service backed by a `HashMap`. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryService {
    state: Arc<Mutex<State>>,
}

impl InMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    // ── Failure switches ─────────────────────────────────────────────────

    /// Only accept logins with this user/password pair.
    pub fn expect_credentials(&self, user: impl Into<String>, password: impl Into<String>) {
        self.lock().expected_credentials = Some((user.into(), password.into()));
    }

    pub fn fail_logins(&self, fail: bool) {
        self.lock().fail_login = fail;
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.lock().fail_upload = fail;
    }

    /// Make uploads succeed at the transport level but return no receipt.
    pub fn empty_uploads(&self, empty: bool) {
        self.lock().empty_upload = empty;
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.lock().fail_lookup = fail;
    }

    /// Make deletions return `Ok(false)`.
    pub fn refuse_destroys(&self, refuse: bool) {
        self.lock().refuse_destroy = refuse;
    }

    // ── Remote state ─────────────────────────────────────────────────────

    /// Add a document as if it had been uploaded out of band.
    pub fn insert_document(&self, doc_id: impl Into<String>, status: impl Into<String>) {
        let doc_id = doc_id.into();
        self.lock().documents.insert(
            doc_id.clone(),
            RemoteDocument {
                doc_id,
                conversion_status: status.into(),
                thumbnail_url: None,
            },
        );
    }

    /// Change a document's conversion status. No-op for unknown ids.
    pub fn set_status(&self, doc_id: &str, status: impl Into<String>) {
        if let Some(doc) = self.lock().documents.get_mut(doc_id) {
            doc.conversion_status = status.into();
        }
    }

    pub fn set_thumbnail(&self, doc_id: &str, url: impl Into<String>) {
        if let Some(doc) = self.lock().documents.get_mut(doc_id) {
            doc.thumbnail_url = Some(url.into());
        }
    }

    /// Remove a document behind the lifecycle's back.
    pub fn forget_document(&self, doc_id: &str) {
        self.lock().documents.remove(doc_id);
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.lock().documents.contains_key(doc_id)
    }

    // ── Call records ─────────────────────────────────────────────────────

    pub fn login_count(&self) -> usize {
        self.lock().login_count
    }

    pub fn upload_count(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Every upload request received, including failed ones.
    pub fn uploads(&self) -> Vec<UploadRequest> {
        self.lock().uploads.clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.lock().lookup_count
    }

    /// Ids of documents successfully deleted.
    pub fn destroyed(&self) -> Vec<String> {
        self.lock().destroyed.clone()
    }
}

#[async_trait]
impl RemoteService for InMemoryService {
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn RemoteSession>, RemoteError> {
        let mut state = self.lock();
        state.login_count += 1;

        if state.fail_login {
            return Err(RemoteError::Transport("connection refused".into()));
        }
        if let Some((user, password)) = &state.expected_credentials {
            if *user != credentials.user || *password != credentials.password {
                return Err(RemoteError::Api {
                    code: 401,
                    message: "invalid username or password".into(),
                });
            }
        }

        Ok(Arc::new(InMemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Session handed out by [`InMemoryService`].
#[derive(Debug)]
pub struct InMemorySession {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl RemoteSession for InMemorySession {
    async fn upload(&self, request: UploadRequest) -> Result<Option<UploadReceipt>, RemoteError> {
        let mut state = lock(&self.state);
        state.uploads.push(request);

        if state.fail_upload {
            return Err(RemoteError::Api {
                code: 500,
                message: "upload rejected".into(),
            });
        }
        if state.empty_upload {
            return Ok(None);
        }

        state.next_id += 1;
        let doc_id = format!("doc_{}", state.next_id);
        let access_key = format!("key-{}", state.next_id);
        state.documents.insert(
            doc_id.clone(),
            RemoteDocument {
                doc_id: doc_id.clone(),
                conversion_status: "PROCESSING".into(),
                thumbnail_url: None,
            },
        );

        Ok(Some(UploadReceipt { doc_id, access_key }))
    }

    async fn find_document(&self, doc_id: &str) -> Result<Option<RemoteDocument>, RemoteError> {
        let mut state = lock(&self.state);
        state.lookup_count += 1;

        if state.fail_lookup {
            return Err(RemoteError::Transport("timed out".into()));
        }
        Ok(state.documents.get(doc_id).cloned())
    }

    async fn destroy_document(&self, document: &RemoteDocument) -> Result<bool, RemoteError> {
        let mut state = lock(&self.state);

        if state.refuse_destroy {
            return Ok(false);
        }
        if state.documents.remove(&document.doc_id).is_none() {
            return Ok(false);
        }
        state.destroyed.push(document.doc_id.clone());
        Ok(true)
    }
}

// A panic while holding the lock leaves the maps consistent enough for test use.
fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
