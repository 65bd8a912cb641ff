//! Remote document identity and status as seen from the owning record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Content types the remote service can convert.
pub const SUPPORTED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/pjpeg",
    "image/jpg",
    "image/gif",
    "image/png",
    "image/x-png",
    "application/msword",
    "application/mspowerpoint",
    "application/vnd.ms-powerpoint",
    "application/excel",
    "application/vnd.ms-excel",
    "application/postscript",
    "text/plain",
    "application/rtf",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.presentation",
    "application/vnd.sun.xml.writer",
    "application/vnd.sun.xml.impress",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// Whether the service can convert `content_type`.
///
/// Parameters such as `; charset=utf-8` are ignored, as is case.
pub fn is_supported_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    SUPPORTED_CONTENT_TYPES.contains(&essence.as_str())
}

/// The pair of identifiers tying a record to its converted document.
///
/// Both values are always present together; there is no way to build a
/// half-set ref. Deserialization goes through the same checks as [`new`].
///
/// [`new`]: RemoteDocumentRef::new
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRemoteDocumentRef")]
pub struct RemoteDocumentRef {
    remote_id: String,
    access_key: String,
}

#[derive(Deserialize)]
struct RawRemoteDocumentRef {
    remote_id: String,
    access_key: String,
}

impl TryFrom<RawRemoteDocumentRef> for RemoteDocumentRef {
    type Error = &'static str;

    fn try_from(raw: RawRemoteDocumentRef) -> Result<Self, Self::Error> {
        Self::new(raw.remote_id, raw.access_key)
            .ok_or("remote_id and access_key must both be non-blank")
    }
}

impl RemoteDocumentRef {
    /// Build a ref from raw values. Both are trimmed; `None` if either is blank.
    pub fn new(remote_id: impl AsRef<str>, access_key: impl AsRef<str>) -> Option<Self> {
        let remote_id = remote_id.as_ref().trim();
        let access_key = access_key.as_ref().trim();
        if remote_id.is_empty() || access_key.is_empty() {
            return None;
        }
        Some(Self {
            remote_id: remote_id.to_string(),
            access_key: access_key.to_string(),
        })
    }

    /// Rebuild a ref from two nullable persisted columns.
    pub fn from_fields(remote_id: Option<&str>, access_key: Option<&str>) -> Option<Self> {
        Self::new(remote_id?, access_key?)
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }
}

/// Conversion status of a remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteDocumentStatus {
    Processing,
    /// Converted and viewable. The service's `DISPLAYABLE` also maps here.
    Done,
    Error,
    /// No ref, document not found, or lookup failed.
    Unknown,
}

impl RemoteDocumentStatus {
    /// Map the service's raw status string.
    ///
    /// Anything starting with `DISPLAYABLE` or ending with `DONE` counts as
    /// done, so suffixed or prefixed variants of those states still map.
    pub fn from_remote(raw: &str) -> Self {
        let raw = raw.trim().to_ascii_uppercase();
        match raw.as_str() {
            "PROCESSING" => Self::Processing,
            "ERROR" => Self::Error,
            s if s.starts_with("DISPLAYABLE") || s.ends_with("DONE") => Self::Done,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Conversion has finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::Processing | Self::Unknown)
    }

    /// The converted document can be displayed.
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for RemoteDocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
