//! Process-wide authenticated session.
//!
//! [`SessionManager`] logs in the first time a session is needed and keeps
//! the handle for the life of the process. Concurrent first callers wait on
//! the same login, so authentication happens at most once per successful
//! session. A failed login is not cached: the error goes back to the caller
//! whose operation triggered it, and the next call tries again.

use crate::config::{ConfigStore, ServiceConfig};
use crate::error::IpaperError;
use crate::remote::{RemoteService, RemoteSession};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Lazily-authenticated, memoised session to the remote service.
pub struct SessionManager {
    config: Arc<ConfigStore>,
    service: Arc<dyn RemoteService>,
    session: OnceCell<Arc<dyn RemoteSession>>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("authenticated", &self.session.initialized())
            .finish()
    }
}

impl SessionManager {
    pub fn new(config: Arc<ConfigStore>, service: Arc<dyn RemoteService>) -> Self {
        Self {
            config,
            service,
            session: OnceCell::new(),
        }
    }

    /// The service config, loading it if needed.
    pub fn config(&self) -> Result<Arc<ServiceConfig>, IpaperError> {
        Ok(self.config.load()?)
    }

    /// Whether a session has already been established.
    pub fn is_authenticated(&self) -> bool {
        self.session.initialized()
    }

    /// Return the session, logging in on first use.
    ///
    /// # Errors
    /// * [`IpaperError::Config`] — the config resource could not be loaded.
    /// * [`IpaperError::Auth`] — the service rejected the credentials or
    ///   could not be reached.
    pub async fn session(&self) -> Result<Arc<dyn RemoteSession>, IpaperError> {
        let session = self.session.get_or_try_init(|| self.login()).await?;
        Ok(Arc::clone(session))
    }

    async fn login(&self) -> Result<Arc<dyn RemoteSession>, IpaperError> {
        let config = self.config.load()?;
        let credentials = config.credentials();
        match self.service.login(&credentials).await {
            Ok(session) => {
                info!("Authenticated with iPaper service as {}", credentials.user);
                Ok(session)
            }
            Err(e) => {
                warn!("iPaper login failed for {}: {}", credentials.user, e);
                Err(IpaperError::Auth {
                    detail: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::InMemoryService;

    fn manager(service: &InMemoryService) -> SessionManager {
        let cfg = ServiceConfig::builder()
            .key("k")
            .secret("s")
            .username("u")
            .password("p")
            .build()
            .unwrap();
        SessionManager::new(
            Arc::new(ConfigStore::from_config(cfg)),
            Arc::new(service.clone()),
        )
    }

    #[tokio::test]
    async fn logs_in_once() {
        let service = InMemoryService::new();
        let manager = manager(&service);
        assert!(!manager.is_authenticated());

        manager.session().await.unwrap();
        manager.session().await.unwrap();
        assert_eq!(service.login_count(), 1);
        assert!(manager.is_authenticated());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_logs_in_once() {
        let service = InMemoryService::new();
        let manager = Arc::new(manager(&service));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let m = Arc::clone(&manager);
                tokio::spawn(async move { m.session().await.map(|_| ()) })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(service.login_count(), 1);
    }

    #[tokio::test]
    async fn failed_login_is_auth_error_and_not_cached() {
        let service = InMemoryService::new();
        service.fail_logins(true);
        let manager = manager(&service);

        let err = manager.session().await.err().unwrap();
        assert!(matches!(err, IpaperError::Auth { .. }), "got: {err}");
        assert!(!manager.is_authenticated());

        service.fail_logins(false);
        manager.session().await.unwrap();
        assert_eq!(service.login_count(), 2);
    }

    #[tokio::test]
    async fn missing_config_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(
            Arc::new(ConfigStore::from_root(dir.path())),
            Arc::new(InMemoryService::new()),
        );
        let err = manager.session().await.err().unwrap();
        assert!(matches!(err, IpaperError::Config(_)));
    }
}
