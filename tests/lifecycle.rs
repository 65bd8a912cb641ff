//! Integration tests for the conversion lifecycle.
//!
//! Every test drives the public API against `InMemoryService`, so nothing
//! here touches the network.
//!
//! Run with:
//!   cargo test --test lifecycle

use async_trait::async_trait;
use edgequake_ipaper::adapter::BoxError;
use edgequake_ipaper::path::StorageDescriptor;
use edgequake_ipaper::remote::memory::InMemoryService;
use edgequake_ipaper::remote::UploadSource;
use edgequake_ipaper::{
    AccessLevel, AttributeAccessors, AttributeRegistry, ConfigStore, ConversionLifecycle,
    ConvertibleModel, DestroyOutcome, EmbedOptions, IpaperError, LifecycleObserver, PollConfig,
    Record, RemoteDocumentRef, RemoteDocumentStatus, ServiceConfig, SessionManager,
    SingleAttachment, SkipReason, UploadOutcome, ValidationIssue,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A record with one attachment and the ref stored as two nullable columns.
#[derive(Debug, Default)]
struct Document {
    id: u64,
    content_type: Option<String>,
    path: PathBuf,
    url: Option<String>,
    pending: Option<(PathBuf, String)>,
    public: Option<bool>,
    ipaper_id: Option<String>,
    ipaper_access_key: Option<String>,
    saves: usize,
    fail_persist: bool,
}

impl Document {
    fn pdf(id: u64) -> Self {
        Self {
            id,
            content_type: Some("application/pdf".into()),
            path: PathBuf::from(format!("/srv/uploads/{id}/report.pdf")),
            ..Default::default()
        }
    }

    fn with_ref(mut self, doc_id: &str, access_key: &str) -> Self {
        self.ipaper_id = Some(doc_id.into());
        self.ipaper_access_key = Some(access_key.into());
        self
    }
}

#[async_trait]
impl Record for Document {
    fn record_id(&self) -> String {
        format!("document#{}", self.id)
    }

    fn access_override(&self) -> Option<AccessLevel> {
        self.public.map(|p| if p { AccessLevel::Public } else { AccessLevel::Private })
    }

    async fn persist(&mut self) -> Result<(), BoxError> {
        if self.fail_persist {
            return Err("disk full".into());
        }
        self.saves += 1;
        Ok(())
    }
}

impl SingleAttachment for Document {
    fn content_type(&self) -> Option<String> {
        self.content_type.clone()
    }

    fn storage(&self) -> StorageDescriptor {
        let mut storage = StorageDescriptor::local(&self.path);
        if let Some(url) = &self.url {
            storage = storage.with_url(url.clone());
        }
        if let Some((staged, name)) = &self.pending {
            storage = storage.with_pending(staged, name.clone());
        }
        storage
    }

    fn fallback_thumbnail_url(&self) -> Option<String> {
        Some("/images/document.png".into())
    }

    fn remote_ref(&self) -> Option<RemoteDocumentRef> {
        RemoteDocumentRef::from_fields(self.ipaper_id.as_deref(), self.ipaper_access_key.as_deref())
    }

    fn set_remote_ref(&mut self, value: Option<RemoteDocumentRef>) {
        self.ipaper_id = value.as_ref().map(|r| r.remote_id().to_string());
        self.ipaper_access_key = value.as_ref().map(|r| r.access_key().to_string());
    }
}

fn config(access: AccessLevel) -> ServiceConfig {
    ServiceConfig::builder()
        .key("api-key")
        .secret("api-secret")
        .username("writer")
        .password("hunter2")
        .default_access(access)
        .build()
        .unwrap()
}

fn sessions_with(service: &InMemoryService, config: ServiceConfig) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        Arc::new(ConfigStore::from_config(config)),
        Arc::new(service.clone()),
    ))
}

/// Route library logs to the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (InMemoryService, ConversionLifecycle<Document>) {
    init_tracing();
    let service = InMemoryService::new();
    let sessions = sessions_with(&service, config(AccessLevel::Private));
    (service, ConversionLifecycle::single(sessions))
}

// ── Upload guard ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_content_type_is_a_silent_noop() {
    let (service, lifecycle) = setup();

    for ct in ["application/zip", "video/mp4", "application/octet-stream"] {
        let mut doc = Document {
            content_type: Some(ct.into()),
            ..Document::pdf(1)
        };
        assert!(!lifecycle.is_eligible(&doc));

        let outcome = lifecycle.upload(&mut doc).await.unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::Skipped {
                reason: SkipReason::UnsupportedContentType
            }
        );
        assert!(doc.ipaper_id.is_none() && doc.ipaper_access_key.is_none());
        assert_eq!(doc.saves, 0);
    }

    assert_eq!(service.login_count(), 0, "no remote call for ineligible records");
    assert_eq!(service.upload_count(), 0);
}

#[tokio::test]
async fn missing_content_type_is_skipped() {
    let (service, lifecycle) = setup();
    let mut doc = Document {
        content_type: None,
        ..Document::pdf(1)
    };

    let outcome = lifecycle.upload(&mut doc).await.unwrap();
    assert_eq!(
        outcome,
        UploadOutcome::Skipped {
            reason: SkipReason::MissingContentType
        }
    );
    assert_eq!(service.upload_count(), 0);
}

#[tokio::test]
async fn converted_record_is_never_reuploaded() {
    let (service, lifecycle) = setup();

    for ct in ["application/pdf", "application/zip"] {
        let mut doc = Document {
            content_type: Some(ct.into()),
            ..Document::pdf(1).with_ref("doc_id", "access_key")
        };
        let outcome = lifecycle.upload(&mut doc).await.unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::Skipped {
                reason: SkipReason::AlreadyConverted
            }
        );
        assert_eq!(doc.ipaper_id.as_deref(), Some("doc_id"));
        assert_eq!(doc.ipaper_access_key.as_deref(), Some("access_key"));
    }
    assert_eq!(service.upload_count(), 0);
}

// ── Upload ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn eligible_upload_sets_and_persists_ref() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(7);
    assert!(lifecycle.is_eligible(&doc));

    let outcome = lifecycle.upload(&mut doc).await.unwrap();
    assert!(outcome.is_uploaded());

    assert_eq!(doc.ipaper_id.as_deref(), Some("doc_1"));
    assert_eq!(doc.ipaper_access_key.as_deref(), Some("key-1"));
    assert_eq!(doc.saves, 1);
    assert!(!lifecycle.is_eligible(&doc));

    let uploads = service.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].access, AccessLevel::Private);
    assert_eq!(
        uploads[0].source,
        UploadSource::File {
            path: PathBuf::from("/srv/uploads/7/report.pdf"),
            file_name: "report.pdf".into(),
        }
    );
}

#[tokio::test]
async fn upload_failure_raises_and_leaves_ref_unset() {
    let (service, lifecycle) = setup();
    service.fail_uploads(true);
    let mut doc = Document::pdf(3);

    let err = lifecycle.upload(&mut doc).await.unwrap_err();
    match err {
        IpaperError::Upload { record, .. } => assert_eq!(record, "document#3"),
        other => panic!("expected Upload error, got {other:?}"),
    }
    assert!(doc.ipaper_id.is_none() && doc.ipaper_access_key.is_none());
    assert_eq!(doc.saves, 0);
    assert!(lifecycle.is_eligible(&doc), "record stays eligible for a later retry");
    assert_eq!(service.upload_count(), 1, "no automatic retry");
}

#[tokio::test]
async fn empty_upload_response_is_an_upload_error() {
    let (service, lifecycle) = setup();
    service.empty_uploads(true);
    let mut doc = Document::pdf(3);

    let err = lifecycle.upload(&mut doc).await.unwrap_err();
    assert!(matches!(err, IpaperError::Upload { .. }), "got {err:?}");
    assert!(doc.ipaper_id.is_none());
}

#[tokio::test]
async fn auth_failure_propagates_to_the_saving_caller() {
    let service = InMemoryService::new();
    service.expect_credentials("someone-else", "secret");
    let lifecycle: ConversionLifecycle<Document> =
        ConversionLifecycle::single(sessions_with(&service, config(AccessLevel::Private)));
    let mut doc = Document::pdf(1);

    let err = lifecycle.upload(&mut doc).await.unwrap_err();
    assert!(matches!(err, IpaperError::Auth { .. }), "got {err:?}");
    assert_eq!(service.upload_count(), 0);
    assert!(doc.ipaper_id.is_none());
}

#[tokio::test]
async fn absent_config_resource_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::from_root(dir.path());
    assert!(store.load().is_err());

    let service = InMemoryService::new();
    let sessions = Arc::new(SessionManager::new(Arc::new(store), Arc::new(service.clone())));
    let lifecycle: ConversionLifecycle<Document> = ConversionLifecycle::single(sessions);

    let err = lifecycle.upload(&mut Document::pdf(1)).await.unwrap_err();
    assert!(matches!(err, IpaperError::Config(_)), "got {err:?}");
    assert_eq!(service.login_count(), 0);
}

#[tokio::test]
async fn config_loaded_from_disk_drives_access_level() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("config")).unwrap();
    std::fs::write(
        dir.path().join("config/ipaper.toml"),
        "key = ' k '\nsecret = 's'\nuser = 'u'\npassword = 'p'\naccess = 'public'\n",
    )
    .unwrap();

    let service = InMemoryService::new();
    let sessions = Arc::new(SessionManager::new(
        Arc::new(ConfigStore::from_root(dir.path())),
        Arc::new(service.clone()),
    ));
    let lifecycle: ConversionLifecycle<Document> = ConversionLifecycle::single(sessions);

    lifecycle.upload(&mut Document::pdf(1)).await.unwrap();
    assert_eq!(service.uploads()[0].access, AccessLevel::Public);
}

#[tokio::test]
async fn per_record_access_overrides_default() {
    let service = InMemoryService::new();
    let lifecycle: ConversionLifecycle<Document> =
        ConversionLifecycle::single(sessions_with(&service, config(AccessLevel::Public)));

    let mut private = Document {
        public: Some(false),
        ..Document::pdf(1)
    };
    let mut default = Document::pdf(2);
    lifecycle.upload(&mut private).await.unwrap();
    lifecycle.upload(&mut default).await.unwrap();

    let uploads = service.uploads();
    assert_eq!(uploads[0].access, AccessLevel::Private);
    assert_eq!(uploads[1].access, AccessLevel::Public);
}

#[tokio::test]
async fn hosted_attachment_uploads_stripped_escaped_url() {
    let (service, lifecycle) = setup();
    let mut doc = Document {
        url: Some("https://bucket.s3.amazonaws.com/uploads/Q3 report.pdf?1271234567".into()),
        ..Document::pdf(1)
    };

    lifecycle.upload(&mut doc).await.unwrap();
    assert_eq!(
        service.uploads()[0].source,
        UploadSource::Url("https://bucket.s3.amazonaws.com/uploads/Q3%20report.pdf".into())
    );
}

#[tokio::test]
async fn hosted_attachment_already_encoded_is_not_encoded_twice() {
    let (service, lifecycle) = setup();
    let mut doc = Document {
        url: Some("https://d111abc.cloudfront.net/uploads/Q3%20report.pdf?1271234567".into()),
        ..Document::pdf(1)
    };

    lifecycle.upload(&mut doc).await.unwrap();
    assert_eq!(
        service.uploads()[0].source,
        UploadSource::Url("https://d111abc.cloudfront.net/uploads/Q3%20report.pdf".into())
    );
}

#[tokio::test]
async fn pending_attachment_is_staged_then_removed() {
    let dir = tempfile::tempdir().unwrap();
    let staged = dir.path().join("RackMultipart20240101-abc");
    std::fs::write(&staged, b"%PDF-1.4 test").unwrap();

    let (service, lifecycle) = setup();
    let mut doc = Document {
        pending: Some((staged.clone(), "Annual Report.pdf".into())),
        ..Document::pdf(1)
    };
    lifecycle.upload(&mut doc).await.unwrap();

    match &service.uploads()[0].source {
        UploadSource::File { path, file_name } => {
            assert_eq!(file_name, "Annual Report.pdf");
            assert!(!path.exists(), "temporary copy must be gone after upload");
        }
        other => panic!("expected a file upload, got {other:?}"),
    }
    assert!(staged.exists());
}

#[tokio::test]
async fn pending_copy_is_removed_when_upload_fails() {
    let dir = tempfile::tempdir().unwrap();
    let staged = dir.path().join("upload-tmp");
    std::fs::write(&staged, b"data").unwrap();

    let (service, lifecycle) = setup();
    service.fail_uploads(true);
    let mut doc = Document {
        pending: Some((staged, "a.pdf".into())),
        ..Document::pdf(1)
    };
    assert!(lifecycle.upload(&mut doc).await.is_err());

    match &service.uploads()[0].source {
        UploadSource::File { path, .. } => assert!(!path.exists()),
        other => panic!("expected a file upload, got {other:?}"),
    }
}

#[tokio::test]
async fn persist_failure_is_reported() {
    let (_service, lifecycle) = setup();
    let mut doc = Document {
        fail_persist: true,
        ..Document::pdf(5)
    };

    let err = lifecycle.upload(&mut doc).await.unwrap_err();
    assert!(matches!(err, IpaperError::Persist { ref record, .. } if record == "document#5"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_share_one_login() {
    let (service, lifecycle) = setup();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move {
                let mut doc = Document::pdf(i);
                lifecycle.upload(&mut doc).await.map(|_| doc.ipaper_id)
            })
        })
        .collect();

    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap().unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(service.login_count(), 1);
}

// ── Destroy ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn destroy_without_ref_is_a_noop() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(1);
    assert_eq!(lifecycle.destroy_remote(&mut doc).await, DestroyOutcome::NotConverted);
    assert_eq!(service.login_count(), 0);
}

#[tokio::test]
async fn destroy_of_missing_remote_document_completes() {
    let (_service, lifecycle) = setup();
    let mut doc = Document::pdf(1).with_ref("gone_123", "k");

    assert_eq!(lifecycle.destroy_remote(&mut doc).await, DestroyOutcome::AlreadyGone);
    assert!(doc.ipaper_id.is_none());
}

#[tokio::test]
async fn destroy_deletes_and_clears_ref() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(1);
    lifecycle.upload(&mut doc).await.unwrap();

    assert_eq!(lifecycle.destroy_remote(&mut doc).await, DestroyOutcome::Destroyed);
    assert_eq!(service.destroyed(), vec!["doc_1".to_string()]);
    assert!(doc.ipaper_id.is_none() && doc.ipaper_access_key.is_none());

    // The record cycles back to unconverted and can be uploaded again.
    assert!(lifecycle.is_eligible(&doc));
    lifecycle.upload(&mut doc).await.unwrap();
    assert_eq!(doc.ipaper_id.as_deref(), Some("doc_2"));
}

#[tokio::test]
async fn refused_deletion_is_logged_not_raised() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(1);
    lifecycle.upload(&mut doc).await.unwrap();
    service.refuse_destroys(true);

    let outcome = lifecycle.destroy_remote(&mut doc).await;
    assert!(matches!(outcome, DestroyOutcome::Failed(_)));
    assert!(service.contains("doc_1"));
    assert_eq!(doc.ipaper_id.as_deref(), Some("doc_1"));
}

#[tokio::test]
async fn lookup_failure_during_destroy_is_not_raised() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(1);
    lifecycle.upload(&mut doc).await.unwrap();
    service.fail_lookups(true);

    assert!(matches!(
        lifecycle.destroy_remote(&mut doc).await,
        DestroyOutcome::Failed(_)
    ));
}

#[tokio::test]
async fn auth_failure_during_destroy_is_not_raised() {
    let service = InMemoryService::new();
    service.fail_logins(true);
    let lifecycle: ConversionLifecycle<Document> =
        ConversionLifecycle::single(sessions_with(&service, config(AccessLevel::Private)));
    let mut doc = Document::pdf(1).with_ref("doc_9", "k");

    assert!(matches!(
        lifecycle.destroy_remote(&mut doc).await,
        DestroyOutcome::Failed(_)
    ));
}

// ── Status ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_without_ref_is_unknown_without_remote_call() {
    let (service, lifecycle) = setup();
    let doc = Document::pdf(1);

    assert_eq!(lifecycle.status(&doc).await, RemoteDocumentStatus::Unknown);
    assert_eq!(service.login_count(), 0);
    assert_eq!(service.lookup_count(), 0);
}

#[tokio::test]
async fn status_maps_remote_values_from_one_lookup() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(1);
    lifecycle.upload(&mut doc).await.unwrap();

    let cases = [
        ("PROCESSING", RemoteDocumentStatus::Processing),
        ("DISPLAYABLE", RemoteDocumentStatus::Done),
        ("DONE", RemoteDocumentStatus::Done),
        ("ERROR", RemoteDocumentStatus::Error),
        ("QUEUED", RemoteDocumentStatus::Unknown),
    ];
    for (raw, expected) in cases {
        service.set_status("doc_1", raw);
        let before = service.lookup_count();
        let status = lifecycle.status(&doc).await;
        assert_eq!(status, expected, "remote status {raw}");
        assert_eq!(service.lookup_count(), before + 1, "one lookup per status");
    }

    service.set_status("doc_1", "DONE");
    let status = lifecycle.status(&doc).await;
    assert!(status.is_complete() && status.is_successful() && !status.is_error());
}

#[tokio::test]
async fn status_is_unknown_when_lookup_fails_or_document_vanished() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(1);
    lifecycle.upload(&mut doc).await.unwrap();

    service.fail_lookups(true);
    assert_eq!(lifecycle.status(&doc).await, RemoteDocumentStatus::Unknown);

    service.fail_lookups(false);
    service.forget_document("doc_1");
    assert_eq!(lifecycle.status(&doc).await, RemoteDocumentStatus::Unknown);
    assert!(lifecycle.remote_document(&doc).await.is_none());
}

/// Flips the remote status to DONE after a fixed number of reads.
struct FinishAfter {
    service: InMemoryService,
    doc_id: String,
    reads: AtomicUsize,
    after: usize,
}

impl LifecycleObserver for FinishAfter {
    fn on_status(&self, _record: &str, _attachment: &str, _status: RemoteDocumentStatus) {
        if self.reads.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.service.set_status(&self.doc_id, "DONE");
        }
    }
}

#[tokio::test]
async fn wait_for_conversion_polls_until_complete() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(1);
    lifecycle.upload(&mut doc).await.unwrap();

    let observer = Arc::new(FinishAfter {
        service: service.clone(),
        doc_id: "doc_1".into(),
        reads: AtomicUsize::new(0),
        after: 3,
    });
    let lifecycle = lifecycle.with_observer(observer.clone());
    let poll = PollConfig {
        interval_ms: 1,
        max_attempts: 10,
        backoff: false,
        ..PollConfig::default()
    };

    let before = service.lookup_count();
    let status = lifecycle.wait_for_conversion(&doc, &poll).await;
    assert_eq!(status, RemoteDocumentStatus::Done);
    assert_eq!(service.lookup_count() - before, 4);
}

#[tokio::test]
async fn wait_for_conversion_gives_up_after_max_attempts() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(1);
    lifecycle.upload(&mut doc).await.unwrap();

    let poll = PollConfig {
        interval_ms: 1,
        max_attempts: 3,
        backoff: true,
        max_interval_ms: 4,
    };
    let before = service.lookup_count();
    let status = lifecycle.wait_for_conversion(&doc, &poll).await;
    assert_eq!(status, RemoteDocumentStatus::Processing);
    assert_eq!(service.lookup_count() - before, 3);

    let unconverted = Document::pdf(2);
    assert_eq!(
        lifecycle.wait_for_conversion(&unconverted, &poll).await,
        RemoteDocumentStatus::Unknown
    );
}

// ── Thumbnails, validation, embed ────────────────────────────────────────────

#[tokio::test]
async fn thumbnail_prefers_remote_then_fallback() {
    let (service, lifecycle) = setup();
    let mut doc = Document::pdf(1);
    assert_eq!(
        lifecycle.thumbnail_url(&doc).await.as_deref(),
        Some("/images/document.png")
    );

    lifecycle.upload(&mut doc).await.unwrap();
    service.set_thumbnail("doc_1", "https://cdn.example/thumb/doc_1.jpg");
    assert_eq!(
        lifecycle.thumbnail_url(&doc).await.as_deref(),
        Some("https://cdn.example/thumb/doc_1.jpg")
    );
}

#[tokio::test]
async fn validate_reports_missing_pieces() {
    let (_service, lifecycle) = setup();

    let doc = Document {
        content_type: Some("application/zip".into()),
        ..Document::pdf(1)
    };
    assert_eq!(
        lifecycle.validate(&doc),
        vec![
            ValidationIssue::MissingRef,
            ValidationIssue::UnsupportedContentType("application/zip".into()),
        ]
    );

    let doc = Document::pdf(1).with_ref("doc_1", "key");
    assert!(lifecycle.validate(&doc).is_empty());

    // A half-set ref does not count as a ref.
    let doc = Document {
        ipaper_id: Some("doc_1".into()),
        ..Document::pdf(1)
    };
    assert_eq!(lifecycle.validate(&doc), vec![ValidationIssue::MissingRef]);
}

#[tokio::test]
async fn embed_code_needs_a_ref() {
    let (_service, lifecycle) = setup();
    let options = EmbedOptions::new().with("height", 100).with("bogus", 1);

    assert!(lifecycle.embed_code(&Document::pdf(1), &options).is_none());

    let doc = Document::pdf(1).with_ref("12345", "key-abc");
    let html = lifecycle.embed_code(&doc, &options).unwrap();
    assert!(html.contains("getDoc(12345, 'key-abc')"));
    assert!(html.contains("addParam('height', '100')"));
    assert!(!html.contains("bogus"));
}

// ── Multi-attribute records ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Article {
    id: u64,
    manuscript_content_type: Option<String>,
    manuscript_ref: Option<RemoteDocumentRef>,
    cover_content_type: Option<String>,
    cover_ref: Option<RemoteDocumentRef>,
    saves: usize,
}

#[async_trait]
impl Record for Article {
    fn record_id(&self) -> String {
        format!("article#{}", self.id)
    }

    async fn persist(&mut self) -> Result<(), BoxError> {
        self.saves += 1;
        Ok(())
    }
}

fn article_registry() -> AttributeRegistry<Article> {
    let mut registry = AttributeRegistry::new();
    registry
        .register(
            "manuscript",
            AttributeAccessors::new(
                |a: &Article| a.manuscript_content_type.clone(),
                |a: &Article| StorageDescriptor::local(format!("/srv/articles/{}/manuscript.docx", a.id)),
                |a: &Article| a.manuscript_ref.clone(),
                |a: &mut Article, r| a.manuscript_ref = r,
            ),
        )
        .unwrap()
        .register(
            "cover",
            AttributeAccessors::new(
                |a: &Article| a.cover_content_type.clone(),
                |a: &Article| StorageDescriptor::local(format!("/srv/articles/{}/cover.png", a.id)),
                |a: &Article| a.cover_ref.clone(),
                |a: &mut Article, r| a.cover_ref = r,
            ),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn model_fans_hooks_out_over_attributes() {
    let service = InMemoryService::new();
    let sessions = sessions_with(&service, config(AccessLevel::Private));
    let model = ConvertibleModel::from_registry(sessions, &article_registry()).unwrap();

    let mut article = Article {
        id: 4,
        manuscript_content_type: Some(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document".into(),
        ),
        cover_content_type: Some("image/webp".into()),
        ..Default::default()
    };

    let outcomes = model.after_save(&mut article).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, "manuscript");
    assert!(outcomes[0].1.is_uploaded());
    assert_eq!(
        outcomes[1],
        (
            "cover".to_string(),
            UploadOutcome::Skipped {
                reason: SkipReason::UnsupportedContentType
            }
        )
    );
    assert!(article.manuscript_ref.is_some());
    assert!(article.cover_ref.is_none());
    assert_eq!(article.saves, 1);
    assert_eq!(service.upload_count(), 1);

    let html = model
        .embed_code(&article, "manuscript", &EmbedOptions::new())
        .unwrap()
        .unwrap();
    assert!(html.contains("getDoc('doc_1', 'key-1')"));
    assert!(model.embed_code(&article, "cover", &EmbedOptions::new()).unwrap().is_none());

    let destroyed = model.before_destroy(&mut article).await;
    assert_eq!(destroyed[0], ("manuscript".to_string(), DestroyOutcome::Destroyed));
    assert_eq!(destroyed[1], ("cover".to_string(), DestroyOutcome::NotConverted));
    assert!(article.manuscript_ref.is_none());
}

#[tokio::test]
async fn unregistered_attribute_fails_at_setup() {
    let service = InMemoryService::new();
    let sessions = sessions_with(&service, config(AccessLevel::Private));
    let registry = article_registry();

    assert!(matches!(
        registry.adapter("appendix"),
        Err(IpaperError::UnregisteredAttribute { .. })
    ));

    let model = ConvertibleModel::from_registry(sessions.clone(), &registry).unwrap();
    assert!(matches!(
        model.lifecycle("appendix"),
        Err(IpaperError::UnregisteredAttribute { .. })
    ));

    let empty: AttributeRegistry<Article> = AttributeRegistry::new();
    assert!(ConvertibleModel::from_registry(sessions, &empty).is_err());
}

#[tokio::test]
async fn single_attachment_model_uses_single_adapter() {
    let service = InMemoryService::new();
    let model: ConvertibleModel<Document> =
        ConvertibleModel::single(sessions_with(&service, config(AccessLevel::Private)));

    let mut doc = Document::pdf(1);
    let outcomes = model.after_save(&mut doc).await.unwrap();
    assert_eq!(outcomes[0].0, "attachment");
    assert!(doc.ipaper_id.is_some());

    let outcomes = model.before_destroy(&mut doc).await;
    assert_eq!(outcomes[0].1, DestroyOutcome::Destroyed);
}
