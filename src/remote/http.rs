//! HTTP client for the remote iPaper service.
//!
//! Every call is a `POST` to a single endpoint carrying a `method` name and
//! its parameters, signed with the API secret. Responses are a JSON envelope:
//!
//! ```text
//! {"stat": "ok",   ...method-specific fields...}
//! {"stat": "fail", "code": 612, "message": "Document not found"}
//! ```
//!
//! ## Signing
//!
//! `api_sig = hex(sha256(secret ++ k1 ++ v1 ++ k2 ++ v2 ...))` over all
//! parameters sorted by key. The secret itself never goes over the wire.
//!
//! ## Uploads
//!
//! Local files go up as multipart (`docs.upload`). URLs are handed to the
//! service to fetch (`docs.uploadFromUrl`), so files already on S3 or a CDN
//! never pass through this process.

use super::{
    RemoteDocument, RemoteService, RemoteSession, UploadReceipt, UploadRequest, UploadSource,
};
use crate::config::{Credentials, ServiceConfig};
use crate::error::RemoteError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// API endpoint used when the config does not name one.
pub const DEFAULT_ENDPOINT: &str = "https://api.scribd.com/api";

/// Service error code meaning "no such document".
pub const NOT_FOUND_CODE: i64 = 612;

/// [`RemoteService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpService {
    /// Create a client for `endpoint` with a per-request timeout.
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Create a client using the endpoint and timeout from `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, RemoteError> {
        let endpoint = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        Self::new(endpoint, config.timeout_secs)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteService for HttpService {
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn RemoteSession>, RemoteError> {
        let api = ApiClient {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            key: credentials.key.clone(),
            secret: credentials.secret.clone(),
        };

        let body = api
            .call(
                "user.login",
                vec![
                    ("username".into(), credentials.user.clone()),
                    ("password".into(), credentials.password.clone()),
                ],
                None,
            )
            .await?;

        let session_key = field_str(&body, "session_key")
            .ok_or_else(|| RemoteError::Malformed("login response has no session_key".into()))?;
        debug!("Logged in to {} as {}", api.endpoint, credentials.user);

        Ok(Arc::new(HttpSession { api, session_key }))
    }
}

/// Authenticated session over HTTP.
#[derive(Debug)]
pub struct HttpSession {
    api: ApiClient,
    session_key: String,
}

impl HttpSession {
    fn params(&self, extra: Vec<(String, String)>) -> Vec<(String, String)> {
        let mut params = extra;
        params.push(("session_key".into(), self.session_key.clone()));
        params
    }
}

#[async_trait]
impl RemoteSession for HttpSession {
    async fn upload(&self, request: UploadRequest) -> Result<Option<UploadReceipt>, RemoteError> {
        let mut extra = vec![("access".to_string(), request.access.as_str().to_string())];
        if let Some(owner) = request.owner_id {
            extra.push(("my_user_id".into(), owner));
        }

        let body = match request.source {
            UploadSource::Url(url) => {
                extra.push(("url".into(), url));
                self.api
                    .call("docs.uploadFromUrl", self.params(extra), None)
                    .await?
            }
            UploadSource::File { path, file_name } => {
                let bytes = tokio::fs::read(&path).await?;
                let part = Part::bytes(bytes).file_name(file_name);
                self.api.call("docs.upload", self.params(extra), Some(part)).await?
            }
        };

        match (field_str(&body, "doc_id"), field_str(&body, "access_key")) {
            (Some(doc_id), Some(access_key)) => Ok(Some(UploadReceipt { doc_id, access_key })),
            _ => Ok(None),
        }
    }

    async fn find_document(&self, doc_id: &str) -> Result<Option<RemoteDocument>, RemoteError> {
        let id = vec![("doc_id".to_string(), doc_id.to_string())];

        let settings = match self.api.call("docs.getSettings", self.params(id.clone()), None).await {
            Ok(body) => body,
            Err(RemoteError::Api { code, .. }) if is_not_found(code) => return Ok(None),
            Err(e) => return Err(e),
        };

        let status = match self
            .api
            .call("docs.getConversionStatus", self.params(id), None)
            .await
        {
            Ok(body) => body,
            Err(RemoteError::Api { code, .. }) if is_not_found(code) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(RemoteDocument {
            doc_id: doc_id.to_string(),
            conversion_status: field_str(&status, "conversion_status").unwrap_or_default(),
            thumbnail_url: field_str(&settings, "thumbnail_url").filter(|u| !u.is_empty()),
        }))
    }

    async fn destroy_document(&self, document: &RemoteDocument) -> Result<bool, RemoteError> {
        let params = self.params(vec![("doc_id".into(), document.doc_id.clone())]);
        match self.api.call("docs.delete", params, None).await {
            Ok(_) => Ok(true),
            Err(RemoteError::Api { code, message }) => {
                warn!("docs.delete {} refused ({}): {}", document.doc_id, code, message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

// ── Request plumbing ─────────────────────────────────────────────────────

#[derive(Clone)]
struct ApiClient {
    client: reqwest::Client,
    endpoint: String,
    key: String,
    secret: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("endpoint", &self.endpoint)
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl ApiClient {
    async fn call(
        &self,
        method: &str,
        params: Vec<(String, String)>,
        file: Option<Part>,
    ) -> Result<Map<String, Value>, RemoteError> {
        let mut params = params;
        params.push(("method".into(), method.to_string()));
        params.push(("api_key".into(), self.key.clone()));
        let sig = sign(&self.secret, &params);
        params.push(("api_sig".into(), sig));

        debug!("POST {} method={}", self.endpoint, method);
        let request = self.client.post(&self.endpoint);
        let request = match file {
            Some(part) => {
                let form = params
                    .into_iter()
                    .fold(Form::new(), |form, (k, v)| form.text(k, v))
                    .part("file", part);
                request.multipart(form)
            }
            None => request.form(&params),
        };

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        parse_envelope(status, &text)
    }
}

/// Compute the request signature over `params` sorted by key.
fn sign(secret: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    for (k, v) in sorted {
        hasher.update(k.as_bytes());
        hasher.update(v.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct Envelope {
    stat: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    body: Map<String, Value>,
}

fn parse_envelope(status: StatusCode, text: &str) -> Result<Map<String, Value>, RemoteError> {
    if status == StatusCode::NOT_FOUND {
        return Err(RemoteError::Api {
            code: 404,
            message: "not found".into(),
        });
    }

    let envelope: Envelope = serde_json::from_str(text).map_err(|e| {
        RemoteError::Malformed(format!("HTTP {}: {} (body: {:.120})", status, e, text))
    })?;

    if envelope.stat.eq_ignore_ascii_case("ok") {
        Ok(envelope.body)
    } else {
        Err(RemoteError::Api {
            code: envelope.code.unwrap_or(i64::from(status.as_u16())),
            message: envelope.message.unwrap_or_else(|| "unknown error".into()),
        })
    }
}

fn is_not_found(code: i64) -> bool {
    code == NOT_FOUND_CODE || code == 404
}

/// Read a field as a trimmed string, accepting JSON strings and numbers.
fn field_str(body: &Map<String, Value>, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
