//! Path resolution: turn an attachment's storage description into the one
//! location the upload call should use.
//!
//! ## Rules, in priority order
//!
//! 1. **Hosted** — the attachment has a public URL on S3-style object
//!    storage or a CloudFront-style CDN (or the config says storage is S3).
//!    The service fetches it itself; we only strip the cache-busting query
//!    string frameworks append (`report.pdf?1271234567`).
//! 2. **Pending** — the file has not reached its final location yet (still
//!    in an upload staging area under a random name). We copy it into a
//!    fresh temporary directory under its intended final name, so the
//!    converted document gets a sensible title. The copy lives inside a
//!    [`TempDir`] owned by [`ResolvedPath::Staged`]; it is removed when the
//!    value is dropped, whichever way the caller leaves the scope.
//! 3. **Local** — the fully-qualified path on disk.

use crate::config::StorageMode;
use crate::error::IpaperError;
use crate::remote::UploadSource;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

static RE_OBJECT_STORAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://([A-Za-z0-9.-]+\.)?s3([.-][A-Za-z0-9-]+)*\.amazonaws\.com(\.cn)?(/|$)")
        .unwrap()
});

static RE_CDN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[A-Za-z0-9-]+\.cloudfront\.net(/|$)").unwrap());

/// A file sitting in a staging area, not yet moved to its final location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub staged_path: PathBuf,
    /// Name the file will have once committed, e.g. `annual-report.pdf`.
    pub file_name: String,
}

/// Everything path resolution needs to know about where an attachment lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDescriptor {
    /// Public URL, when the storage backend exposes one.
    pub url: Option<String>,
    /// Final on-disk location for locally stored files.
    pub local_path: PathBuf,
    /// Set while the file is still staged.
    pub pending: Option<PendingFile>,
    pub mode: StorageMode,
}

impl StorageDescriptor {
    /// A committed file on the local filesystem.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            url: None,
            local_path: path.into(),
            pending: None,
            mode: StorageMode::Local,
        }
    }

    /// A file reachable at `url` (S3, CDN, or a plain public URL).
    pub fn hosted(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            local_path: PathBuf::new(),
            pending: None,
            mode: StorageMode::Local,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_pending(mut self, staged_path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        self.pending = Some(PendingFile {
            staged_path: staged_path.into(),
            file_name: file_name.into(),
        });
        self
    }

    pub fn with_mode(mut self, mode: StorageMode) -> Self {
        self.mode = mode;
        self
    }

    /// The URL to hand over as-is under rule 1, if rule 1 applies.
    fn hosted_url(&self) -> Option<&str> {
        let url = self.url.as_deref()?;
        if is_amazon_hosted(url) || (self.mode == StorageMode::S3 && is_url(url)) {
            Some(url)
        } else {
            None
        }
    }
}

/// The resolved upload location.
#[derive(Debug)]
pub enum ResolvedPath {
    /// Hosted file; the URL with its cache string removed.
    Remote(String),
    /// Committed local file.
    Local(PathBuf),
    /// Temporary copy of a pending file. Deleted when this value is dropped.
    Staged { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedPath {
    /// The location as a string, unescaped.
    pub fn location(&self) -> String {
        match self {
            ResolvedPath::Remote(url) => url.clone(),
            ResolvedPath::Local(path) | ResolvedPath::Staged { path, .. } => {
                path.display().to_string()
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ResolvedPath::Remote(_))
    }

    /// What to pass to the remote upload call.
    ///
    /// URLs are escaped for the transport. Local files are read from disk by
    /// the client, so their paths stay raw.
    pub fn to_upload_source(&self) -> UploadSource {
        match self {
            ResolvedPath::Remote(url) => UploadSource::Url(escape(url)),
            ResolvedPath::Local(path) | ResolvedPath::Staged { path, .. } => UploadSource::File {
                path: path.clone(),
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "attachment".to_string()),
            },
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Whether `url` points at S3-style object storage or a CloudFront-style CDN.
pub fn is_amazon_hosted(url: &str) -> bool {
    RE_OBJECT_STORAGE.is_match(url) || RE_CDN.is_match(url)
}

/// Remove everything from the last `?` onward.
pub fn strip_cache_string(url: &str) -> &str {
    match url.rfind('?') {
        Some(pos) => &url[..pos],
        None => url,
    }
}

/// Percent-encode `path` for the upload transport.
///
/// Each `/`-separated segment is encoded on its own, so separators survive,
/// and a leading `scheme://authority` is kept verbatim. Spaces become `%20`;
/// reserved and non-ASCII characters become their UTF-8 percent escapes.
/// Segments that are already percent-encoded are decoded first, so escaping
/// an escaped path returns it unchanged.
pub fn escape(path: &str) -> String {
    let (prefix, rest) = split_authority(path);
    let encoded: Vec<String> = rest.split('/').map(escape_segment).collect();
    format!("{}{}", prefix, encoded.join("/"))
}

fn escape_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => urlencoding::encode(&decoded).into_owned(),
        Err(_) => urlencoding::encode(segment).into_owned(),
    }
}

fn split_authority(s: &str) -> (&str, &str) {
    match s.find("://") {
        Some(idx) => {
            let after = idx + 3;
            match s[after..].find('/') {
                Some(slash) => s.split_at(after + slash),
                None => (s, ""),
            }
        }
        None => ("", s),
    }
}

/// Resolve a storage descriptor to its upload location.
///
/// # Errors
/// [`IpaperError::TempCopy`] if a pending file cannot be copied.
pub async fn resolve(descriptor: &StorageDescriptor) -> Result<ResolvedPath, IpaperError> {
    if let Some(url) = descriptor.hosted_url() {
        let url = strip_cache_string(url).to_string();
        debug!("Resolved hosted attachment: {}", url);
        return Ok(ResolvedPath::Remote(url));
    }

    if let Some(pending) = &descriptor.pending {
        return stage_copy(pending).await;
    }

    debug!("Resolved local attachment: {}", descriptor.local_path.display());
    Ok(ResolvedPath::Local(descriptor.local_path.clone()))
}

async fn stage_copy(pending: &PendingFile) -> Result<ResolvedPath, IpaperError> {
    let temp_err = |source| IpaperError::TempCopy {
        path: pending.staged_path.clone(),
        source,
    };

    let temp_dir = TempDir::new().map_err(temp_err)?;
    // Keep only the final component so a hostile name cannot escape the dir.
    let name = Path::new(&pending.file_name)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "attachment".into());
    let path = temp_dir.path().join(name);

    tokio::fs::copy(&pending.staged_path, &path)
        .await
        .map_err(temp_err)?;

    debug!(
        "Staged {} as {}",
        pending.staged_path.display(),
        path.display()
    );
    Ok(ResolvedPath::Staged {
        path,
        _temp_dir: temp_dir,
    })
}
