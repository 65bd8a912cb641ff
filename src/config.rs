//! Service configuration: credentials and behavioural options for the remote
//! iPaper service.
//!
//! The config resource is a TOML file at a well-known, root-relative path
//! (`config/ipaper.toml`), overridable with `IPAPER_CONFIG`:
//!
//! ```toml
//! key      = "api-key"
//! secret   = "api-secret"
//! user     = "account"
//! password = "account-password"
//! access   = "private"   # optional: public | private (default private)
//! storage  = "s3"        # optional: local | s3 | anything else (default local)
//! ```
//!
//! [`ConfigStore`] reads it once and hands out the same [`ServiceConfig`] for
//! the rest of the process. Editing the file afterwards has no effect.

use crate::error::ConfigError;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Root-relative location of the config resource.
pub const DEFAULT_CONFIG_PATH: &str = "config/ipaper.toml";

/// Environment variable that overrides the config resource location.
pub const CONFIG_PATH_ENV: &str = "IPAPER_CONFIG";

/// Default HTTP timeout for remote calls, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Visibility of a converted document on the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Public,
    #[default]
    Private,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Private => "private",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(AccessLevel::Public),
            "private" => Ok(AccessLevel::Private),
            other => Err(ConfigError::InvalidValue {
                key: "access",
                value: other.to_string(),
            }),
        }
    }
}

/// Where the host application keeps its attachments.
///
/// `S3` makes path resolution prefer the attachment's public URL even when it
/// does not match a known object-storage host (custom S3 endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Local,
    S3,
    Other,
}

impl StorageMode {
    /// Lenient parse: unrecognised values map to [`StorageMode::Other`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "local" | "file_system" | "filesystem" => StorageMode::Local,
            "s3" => StorageMode::S3,
            _ => StorageMode::Other,
        }
    }
}

/// Credentials handed to [`crate::remote::RemoteService::login`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable service configuration, loaded once per process.
///
/// Built via [`ServiceConfig::builder()`] or read from disk by [`ConfigStore`].
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// API key identifying the integrating application.
    pub key: String,

    /// API secret used to sign requests. Never logged.
    pub secret: String,

    /// Account the documents are uploaded under.
    pub username: String,

    /// Account password. Never logged.
    pub password: String,

    /// Access level for records that do not choose one. Default: private.
    pub default_access: AccessLevel,

    /// Attachment storage backend hint. Default: local.
    pub storage_mode: StorageMode,

    /// API base URL. If None, the HTTP client uses its built-in default.
    pub endpoint: Option<String>,

    /// Per-request HTTP timeout in seconds. Default: 120.
    pub timeout_secs: u64,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("default_access", &self.default_access)
            .field("storage_mode", &self.storage_mode)
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Login credentials derived from this config.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            key: self.key.clone(),
            secret: self.secret.clone(),
            user: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Parse a config resource from TOML text.
    ///
    /// `path` is only used for error messages.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut builder = ServiceConfig::builder();
        builder.key = raw.key;
        builder.secret = raw.secret;
        builder.username = raw.user;
        builder.password = raw.password;
        builder.endpoint = raw.endpoint;
        if let Some(secs) = raw.timeout_secs {
            builder = builder.timeout_secs(secs);
        }
        if let Some(access) = raw.access {
            builder.default_access = Some(access.parse()?);
        }
        if let Some(storage) = raw.storage {
            builder.storage_mode = Some(StorageMode::parse(&storage));
        }
        builder.build()
    }
}

/// On-disk shape of the config resource. Everything optional so that
/// missing keys produce [`ConfigError::MissingKey`] rather than a parse error.
#[derive(Debug, Deserialize)]
struct RawConfig {
    key: Option<String>,
    secret: Option<String>,
    #[serde(alias = "username")]
    user: Option<String>,
    password: Option<String>,
    access: Option<String>,
    storage: Option<String>,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    key: Option<String>,
    secret: Option<String>,
    username: Option<String>,
    password: Option<String>,
    default_access: Option<AccessLevel>,
    storage_mode: Option<StorageMode>,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
}

impl ServiceConfigBuilder {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn username(mut self, user: impl Into<String>) -> Self {
        self.username = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn default_access(mut self, access: AccessLevel) -> Self {
        self.default_access = Some(access);
        self
    }

    pub fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = Some(mode);
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs.max(1));
        self
    }

    /// Build the configuration. Every string is trimmed; blank required
    /// values are reported as missing.
    pub fn build(self) -> Result<ServiceConfig, ConfigError> {
        Ok(ServiceConfig {
            key: required("key", self.key)?,
            secret: required("secret", self.secret)?,
            username: required("user", self.username)?,
            password: required("password", self.password)?,
            default_access: self.default_access.unwrap_or_default(),
            storage_mode: self.storage_mode.unwrap_or_default(),
            endpoint: self
                .endpoint
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingKey { key })
}

// ── ConfigStore ──────────────────────────────────────────────────────────

/// Load-once cache for the service config.
///
/// Concurrent first calls to [`ConfigStore::load`] are serialised; the file is
/// read at most once per store and the result shared through an `Arc`.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    cached: OnceCell<Arc<ServiceConfig>>,
}

impl ConfigStore {
    /// Store reading the config resource at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: OnceCell::new(),
        }
    }

    /// Store reading `<root>/config/ipaper.toml`.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(DEFAULT_CONFIG_PATH))
    }

    /// Store reading `$IPAPER_CONFIG`, else `./config/ipaper.toml`.
    pub fn from_env() -> Self {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(p) if !p.trim().is_empty() => Self::new(p.trim()),
            _ => Self::new(DEFAULT_CONFIG_PATH),
        }
    }

    /// Store that is already loaded with `config`; never touches the disk.
    pub fn from_config(config: ServiceConfig) -> Self {
        Self {
            path: PathBuf::new(),
            cached: OnceCell::with_value(Arc::new(config)),
        }
    }

    /// Location of the config resource.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the config, reading it on first use.
    ///
    /// # Errors
    /// [`ConfigError`] if the resource is absent, unreadable, malformed, or
    /// missing a required key. A failed load is not cached, so a later call
    /// retries the read.
    pub fn load(&self) -> Result<Arc<ServiceConfig>, ConfigError> {
        self.cached
            .get_or_try_init(|| read_config(&self.path).map(Arc::new))
            .map(Arc::clone)
    }
}

fn read_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config = ServiceConfig::from_toml_str(&text, path)?;
    info!("Loaded iPaper config from {}", path.display());
    debug!("iPaper config: {:?}", config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
key      = "  the-key  "
secret   = "the-secret"
user     = "someone "
password = " hunter2"
access   = "public"
storage  = "s3"
"#;

    fn write_config(dir: &tempfile::TempDir, text: &str) -> PathBuf {
        let path = dir.path().join(DEFAULT_CONFIG_PATH);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_and_trims_values() {
        let cfg = ServiceConfig::from_toml_str(VALID, Path::new("x.toml")).unwrap();
        assert_eq!(cfg.key, "the-key");
        assert_eq!(cfg.username, "someone");
        assert_eq!(cfg.password, "hunter2");
        assert_eq!(cfg.default_access, AccessLevel::Public);
        assert_eq!(cfg.storage_mode, StorageMode::S3);
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let text = "key='k'\nsecret='s'\nuser='u'\npassword='p'\ntimeout_secs=0\n";
        let cfg = ServiceConfig::from_toml_str(text, Path::new("x.toml")).unwrap();
        assert_eq!(cfg.timeout_secs, 1);
    }

    #[test]
    fn defaults_to_private_local() {
        let text = "key='k'\nsecret='s'\nusername='u'\npassword='p'\n";
        let cfg = ServiceConfig::from_toml_str(text, Path::new("x.toml")).unwrap();
        assert_eq!(cfg.default_access, AccessLevel::Private);
        assert_eq!(cfg.storage_mode, StorageMode::Local);
    }

    #[test]
    fn missing_required_key() {
        let text = "key='k'\nsecret='s'\nuser='u'\n";
        let err = ServiceConfig::from_toml_str(text, Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "password" }));
    }

    #[test]
    fn blank_required_key_counts_as_missing() {
        let text = "key='   '\nsecret='s'\nuser='u'\npassword='p'\n";
        let err = ServiceConfig::from_toml_str(text, Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "key" }));
    }

    #[test]
    fn invalid_access_level() {
        let text = "key='k'\nsecret='s'\nuser='u'\npassword='p'\naccess='secret'\n";
        let err = ServiceConfig::from_toml_str(text, Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "access", .. }));
    }

    #[test]
    fn malformed_toml() {
        let err = ServiceConfig::from_toml_str("key = [", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unknown_storage_is_other() {
        assert_eq!(StorageMode::parse("gcs"), StorageMode::Other);
        assert_eq!(StorageMode::parse(" S3 "), StorageMode::S3);
        assert_eq!(StorageMode::parse(""), StorageMode::Local);
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = ServiceConfig::from_toml_str(VALID, Path::new("x.toml")).unwrap();
        let dbg = format!("{cfg:?} {:?}", cfg.credentials());
        assert!(!dbg.contains("the-secret"));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("the-key"));
    }

    #[test]
    fn store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::from_root(dir.path());
        assert!(matches!(store.load(), Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn store_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, VALID);
        let store = ConfigStore::from_root(dir.path());

        let first = store.load().unwrap();
        // Rewriting the resource has no effect on an already-loaded store.
        std::fs::write(&path, "garbage = [").unwrap();
        let second = store.load().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn store_from_config_skips_disk() {
        let cfg = ServiceConfig::builder()
            .key("k")
            .secret("s")
            .username("u")
            .password("p")
            .build()
            .unwrap();
        let store = ConfigStore::from_config(cfg.clone());
        assert_eq!(*store.load().unwrap(), cfg);
    }
}
