//! Attachment adapters: one capability set over different attachment layouts.
//!
//! The lifecycle never touches a record's fields directly. It asks an
//! [`AttachmentAdapter`] for the content type, the storage location, the
//! thumbnail fallback, and the ref fields. Two adapters exist:
//!
//! * [`SingleAttachmentAdapter`] — the record owns exactly one attachment and
//!   implements [`SingleAttachment`] to expose it.
//! * [`MultiAttributeAdapter`] — the record owns several named attachment
//!   attributes (`cover`, `manuscript`, …). Each attribute is registered once
//!   in an [`AttributeRegistry`] with explicit accessor functions; asking for
//!   an adapter for an unregistered name fails at setup time.
//!
//! The adapter is picked when the lifecycle is built, not per call.

use crate::config::{AccessLevel, StorageMode};
use crate::document::RemoteDocumentRef;
use crate::error::IpaperError;
use crate::path::{self, ResolvedPath, StorageDescriptor};
use crate::remote::RemoteDocument;
use async_trait::async_trait;
use std::fmt;

/// Error type records may return from [`Record::persist`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The business record that owns attachments and their refs.
#[async_trait]
pub trait Record: Send + Sync {
    /// Identifier used in logs and error messages, e.g. `document#42`.
    fn record_id(&self) -> String;

    /// Explicit public/private choice for this record. `None` uses the
    /// configured default.
    fn access_override(&self) -> Option<AccessLevel> {
        None
    }

    /// Owner id forwarded to the service with uploads.
    fn owner_id(&self) -> Option<String> {
        None
    }

    /// Write the record back to its store after its ref changed.
    async fn persist(&mut self) -> Result<(), BoxError>;
}

/// A record with exactly one attachment.
pub trait SingleAttachment: Record {
    fn content_type(&self) -> Option<String>;

    fn storage(&self) -> StorageDescriptor;

    /// Local thumbnail used when the remote document has none.
    fn fallback_thumbnail_url(&self) -> Option<String> {
        None
    }

    fn remote_ref(&self) -> Option<RemoteDocumentRef>;

    fn set_remote_ref(&mut self, value: Option<RemoteDocumentRef>);
}

/// An attachment as it stands for one upload attempt.
#[derive(Debug)]
pub struct AttachmentDescriptor {
    pub content_type: String,
    pub path: ResolvedPath,
}

impl AttachmentDescriptor {
    pub fn is_remote_storage(&self) -> bool {
        self.path.is_remote()
    }
}

/// Uniform access to one attachment slot of a record type `R`.
#[async_trait]
pub trait AttachmentAdapter<R: Record>: Send + Sync {
    /// Slot name for logs: `attachment` or the attribute name.
    fn name(&self) -> &str;

    fn content_type(&self, record: &R) -> Option<String>;

    fn storage(&self, record: &R) -> StorageDescriptor;

    fn fallback_thumbnail(&self, record: &R) -> Option<String>;

    fn remote_ref(&self, record: &R) -> Option<RemoteDocumentRef>;

    fn set_remote_ref(&self, record: &mut R, value: Option<RemoteDocumentRef>);

    /// Resolve the attachment's upload location.
    ///
    /// `mode` is the configured storage mode. It applies unless the
    /// attachment's own descriptor already names a non-local mode.
    async fn file_path(&self, record: &R, mode: StorageMode) -> Result<ResolvedPath, IpaperError> {
        let storage = self.storage(record);
        let storage = if storage.mode == StorageMode::Local {
            storage.with_mode(mode)
        } else {
            storage
        };
        path::resolve(&storage).await
    }

    /// Thumbnail for the slot: the remote one when available, else the fallback.
    fn thumbnail_url(&self, record: &R, remote: Option<&RemoteDocument>) -> Option<String> {
        remote
            .and_then(|doc| doc.thumbnail_url.clone())
            .or_else(|| self.fallback_thumbnail(record))
    }

    /// Content type plus resolved path, or `None` when there is no content type.
    async fn describe(
        &self,
        record: &R,
        mode: StorageMode,
    ) -> Result<Option<AttachmentDescriptor>, IpaperError> {
        let Some(content_type) = self.content_type(record) else {
            return Ok(None);
        };
        let path = self.file_path(record, mode).await?;
        Ok(Some(AttachmentDescriptor { content_type, path }))
    }
}

// ── Single attachment ────────────────────────────────────────────────────

/// Adapter for records implementing [`SingleAttachment`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleAttachmentAdapter;

impl<R: SingleAttachment> AttachmentAdapter<R> for SingleAttachmentAdapter {
    fn name(&self) -> &str {
        "attachment"
    }

    fn content_type(&self, record: &R) -> Option<String> {
        record.content_type()
    }

    fn storage(&self, record: &R) -> StorageDescriptor {
        record.storage()
    }

    fn fallback_thumbnail(&self, record: &R) -> Option<String> {
        record.fallback_thumbnail_url()
    }

    fn remote_ref(&self, record: &R) -> Option<RemoteDocumentRef> {
        record.remote_ref()
    }

    fn set_remote_ref(&self, record: &mut R, value: Option<RemoteDocumentRef>) {
        record.set_remote_ref(value);
    }
}

// ── Multiple attributes ──────────────────────────────────────────────────

/// Explicit accessors for one named attachment attribute of `R`.
pub struct AttributeAccessors<R> {
    pub content_type: fn(&R) -> Option<String>,
    pub storage: fn(&R) -> StorageDescriptor,
    pub thumbnail: Option<fn(&R) -> Option<String>>,
    pub get_ref: fn(&R) -> Option<RemoteDocumentRef>,
    pub set_ref: fn(&mut R, Option<RemoteDocumentRef>),
}

impl<R> AttributeAccessors<R> {
    pub fn new(
        content_type: fn(&R) -> Option<String>,
        storage: fn(&R) -> StorageDescriptor,
        get_ref: fn(&R) -> Option<RemoteDocumentRef>,
        set_ref: fn(&mut R, Option<RemoteDocumentRef>),
    ) -> Self {
        Self {
            content_type,
            storage,
            thumbnail: None,
            get_ref,
            set_ref,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: fn(&R) -> Option<String>) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }
}

impl<R> Clone for AttributeAccessors<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for AttributeAccessors<R> {}

impl<R> fmt::Debug for AttributeAccessors<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeAccessors")
            .field("thumbnail", &self.thumbnail.is_some())
            .finish_non_exhaustive()
    }
}

/// Ordered set of attachment attributes registered for a record type.
pub struct AttributeRegistry<R> {
    entries: Vec<(String, AttributeAccessors<R>)>,
}

impl<R> Default for AttributeRegistry<R> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<R> fmt::Debug for AttributeRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}

impl<R: Record> AttributeRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an attribute. Names must be unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        accessors: AttributeAccessors<R>,
    ) -> Result<&mut Self, IpaperError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(IpaperError::DuplicateAttribute { name });
        }
        self.entries.push((name, accessors));
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adapter for a registered attribute.
    ///
    /// # Errors
    /// [`IpaperError::UnregisteredAttribute`] if `name` was never registered.
    pub fn adapter(&self, name: &str) -> Result<MultiAttributeAdapter<R>, IpaperError> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(n, accessors)| MultiAttributeAdapter {
                attribute: n.clone(),
                accessors: *accessors,
            })
            .ok_or_else(|| IpaperError::UnregisteredAttribute {
                name: name.to_string(),
            })
    }

    /// Adapters for every registered attribute, in registration order.
    pub fn adapters(&self) -> Vec<MultiAttributeAdapter<R>> {
        self.entries
            .iter()
            .map(|(n, accessors)| MultiAttributeAdapter {
                attribute: n.clone(),
                accessors: *accessors,
            })
            .collect()
    }
}

/// Adapter for one registered attribute of a multi-attachment record.
pub struct MultiAttributeAdapter<R> {
    attribute: String,
    accessors: AttributeAccessors<R>,
}

impl<R> fmt::Debug for MultiAttributeAdapter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiAttributeAdapter")
            .field("attribute", &self.attribute)
            .finish()
    }
}

impl<R> Clone for MultiAttributeAdapter<R> {
    fn clone(&self) -> Self {
        Self {
            attribute: self.attribute.clone(),
            accessors: self.accessors,
        }
    }
}

impl<R: Record> AttachmentAdapter<R> for MultiAttributeAdapter<R> {
    fn name(&self) -> &str {
        &self.attribute
    }

    fn content_type(&self, record: &R) -> Option<String> {
        (self.accessors.content_type)(record)
    }

    fn storage(&self, record: &R) -> StorageDescriptor {
        (self.accessors.storage)(record)
    }

    fn fallback_thumbnail(&self, record: &R) -> Option<String> {
        self.accessors.thumbnail.and_then(|f| f(record))
    }

    fn remote_ref(&self, record: &R) -> Option<RemoteDocumentRef> {
        (self.accessors.get_ref)(record)
    }

    fn set_remote_ref(&self, record: &mut R, value: Option<RemoteDocumentRef>) {
        (self.accessors.set_ref)(record, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Article {
        cover_content_type: Option<String>,
        cover_url: Option<String>,
        cover_ref: Option<RemoteDocumentRef>,
        body_content_type: Option<String>,
        body_ref: Option<RemoteDocumentRef>,
    }

    #[async_trait]
    impl Record for Article {
        fn record_id(&self) -> String {
            "article#1".into()
        }

        async fn persist(&mut self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn registry() -> AttributeRegistry<Article> {
        let mut registry = AttributeRegistry::new();
        registry
            .register(
                "cover",
                AttributeAccessors::new(
                    |a: &Article| a.cover_content_type.clone(),
                    |a: &Article| {
                        StorageDescriptor::local("/srv/covers/c.png")
                            .with_url(a.cover_url.clone().unwrap_or_default())
                    },
                    |a: &Article| a.cover_ref.clone(),
                    |a: &mut Article, r| a.cover_ref = r,
                )
                .with_thumbnail(|_| Some("/thumbs/cover.png".into())),
            )
            .unwrap()
            .register(
                "body",
                AttributeAccessors::new(
                    |a: &Article| a.body_content_type.clone(),
                    |_| StorageDescriptor::local("/srv/bodies/b.pdf"),
                    |a: &Article| a.body_ref.clone(),
                    |a: &mut Article, r| a.body_ref = r,
                ),
            )
            .unwrap();
        registry
    }

    #[test]
    fn registry_keeps_order_and_rejects_duplicates() {
        let mut registry = registry();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["cover", "body"]);

        let err = registry
            .register(
                "cover",
                AttributeAccessors::new(|_| None, |_| StorageDescriptor::local("/x"), |_| None, |_, _| {}),
            )
            .err()
            .unwrap();
        assert!(matches!(err, IpaperError::DuplicateAttribute { .. }));
    }

    #[test]
    fn unregistered_attribute_fails_at_setup() {
        let err = registry().adapter("appendix").unwrap_err();
        assert!(matches!(err, IpaperError::UnregisteredAttribute { ref name } if name == "appendix"));
    }

    #[test]
    fn multi_adapter_reads_its_own_attribute() {
        let registry = registry();
        let cover = registry.adapter("cover").unwrap();
        let body = registry.adapter("body").unwrap();

        let mut article = Article {
            cover_content_type: Some("image/png".into()),
            body_content_type: Some("application/pdf".into()),
            ..Default::default()
        };

        assert_eq!(cover.name(), "cover");
        assert_eq!(cover.content_type(&article).as_deref(), Some("image/png"));
        assert_eq!(body.content_type(&article).as_deref(), Some("application/pdf"));

        body.set_remote_ref(&mut article, RemoteDocumentRef::new("7", "k"));
        assert!(body.remote_ref(&article).is_some());
        assert!(cover.remote_ref(&article).is_none());
    }

    #[test]
    fn thumbnail_prefers_remote() {
        let registry = registry();
        let cover = registry.adapter("cover").unwrap();
        let article = Article::default();

        assert_eq!(cover.thumbnail_url(&article, None).as_deref(), Some("/thumbs/cover.png"));

        let doc = RemoteDocument {
            doc_id: "1".into(),
            conversion_status: "DONE".into(),
            thumbnail_url: Some("https://cdn.example/t.jpg".into()),
        };
        assert_eq!(
            cover.thumbnail_url(&article, Some(&doc)).as_deref(),
            Some("https://cdn.example/t.jpg")
        );

        let body = registry.adapter("body").unwrap();
        assert!(body.thumbnail_url(&article, None).is_none());
    }

    #[tokio::test]
    async fn describe_resolves_through_path_rules() {
        let registry = registry();
        let cover = registry.adapter("cover").unwrap();
        let article = Article {
            cover_content_type: Some("image/png".into()),
            cover_url: Some("https://bucket.s3.amazonaws.com/c.png?123".into()),
            ..Default::default()
        };

        let descriptor = cover
            .describe(&article, StorageMode::Local)
            .await
            .unwrap()
            .unwrap();
        assert!(descriptor.is_remote_storage());
        assert_eq!(descriptor.path.location(), "https://bucket.s3.amazonaws.com/c.png");

        let none = registry
            .adapter("body")
            .unwrap()
            .describe(&Article::default(), StorageMode::Local)
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
