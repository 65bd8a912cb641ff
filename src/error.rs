//! Error types for the edgequake-ipaper library.
//!
//! Three error types reflect three distinct layers:
//!
//! * [`ConfigError`] — **Setup**: the service config resource is missing,
//!   unreadable, or incomplete. Nothing can talk to the remote service until
//!   this is fixed, so it surfaces the first time anything needs the config.
//!
//! * [`RemoteError`] — **Transport**: what a [`crate::remote::RemoteSession`]
//!   implementation reports when a call could not be completed. A missing
//!   document is *not* a `RemoteError`; lookups return `Ok(None)` for that.
//!
//! * [`IpaperError`] — **Lifecycle**: what the caller of an upload, destroy,
//!   or setup step sees. Remote failures are folded into the variant that
//!   names the operation that failed (`Auth`, `Upload`).
//!
//! Ineligibility (unsupported content type, already converted) is not an
//! error at all: uploads simply skip. Remote deletion failures are logged and
//! reported through [`crate::lifecycle::DestroyOutcome`], never raised.

use std::path::PathBuf;
use thiserror::Error;

/// Errors loading the service config resource.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config resource does not exist.
    #[error("iPaper config not found at '{path}'\nCreate it or point IPAPER_CONFIG at an existing file.")]
    NotFound { path: PathBuf },

    /// The config resource exists but could not be read.
    #[error("Failed to read iPaper config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config resource is not valid TOML.
    #[error("Failed to parse iPaper config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required key is absent or blank.
    #[error("iPaper config is missing required key '{key}'")]
    MissingKey { key: &'static str },

    /// A key holds a value outside its accepted set.
    #[error("Invalid value '{value}' for iPaper config key '{key}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Failures reported by a remote service implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request never produced a response (DNS, TLS, timeout, …).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with an explicit failure.
    #[error("Remote API error {code}: {message}")]
    Api { code: i64, message: String },

    /// The service answered, but not in a shape we understand.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Reading a local file for upload failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// All errors surfaced to callers of the conversion lifecycle.
#[derive(Debug, Error)]
pub enum IpaperError {
    // ── Setup errors ──────────────────────────────────────────────────────
    /// The service config could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A lifecycle was requested for an attribute that was never registered.
    #[error("Attachment attribute '{name}' is not registered for iPaper conversion")]
    UnregisteredAttribute { name: String },

    /// The same attribute was registered twice.
    #[error("Attachment attribute '{name}' is already registered")]
    DuplicateAttribute { name: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Remote errors ─────────────────────────────────────────────────────
    /// Logging in to the remote service failed.
    #[error("Authentication with the iPaper service failed: {detail}")]
    Auth { detail: String },

    /// Uploading an attachment failed or returned nothing usable.
    ///
    /// The record's ref fields are left untouched, so it stays eligible.
    #[error("Upload of record '{record}' failed: {detail}")]
    Upload { record: String, detail: String },

    // ── Local errors ──────────────────────────────────────────────────────
    /// Staging a temporary copy of a pending attachment failed.
    #[error("Failed to stage temporary copy of '{path}': {source}")]
    TempCopy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The owning record could not persist its new ref.
    #[error("Failed to persist record '{record}': {detail}")]
    Persist { record: String, detail: String },
}
