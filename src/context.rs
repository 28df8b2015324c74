use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{SessionConfig, SettingsStore};
use crate::notify::UnauthorizedChannel;

/// Shared state constructed once at startup and handed to the API client,
/// the relay server and every view.
#[derive(Clone)]
pub struct AppContext {
    settings: Arc<dyn SettingsStore>,
    unauthorized: UnauthorizedChannel,
}

impl AppContext {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            unauthorized: UnauthorizedChannel::new(),
        }
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    pub fn unauthorized(&self) -> &UnauthorizedChannel {
        &self.unauthorized
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig::load(self.settings.as_ref())
    }

    /// Reads the session off the async runtime; the file store may block on
    /// its lock.
    pub async fn load_session(&self) -> SessionConfig {
        let settings = Arc::clone(&self.settings);
        match tokio::task::spawn_blocking(move || SessionConfig::load(settings.as_ref())).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "settings read task failed; using defaults");
                SessionConfig::default()
            }
        }
    }

    pub fn save_session(&self, session: &SessionConfig) -> Result<()> {
        session.save(self.settings.as_ref())
    }

    pub async fn save_session_async(&self, session: SessionConfig) -> Result<()> {
        let settings = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || session.save(settings.as_ref()))
            .await
            .context("settings write task failed")?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::AppContext;
    use crate::config::{MemoryStore, SessionConfig, TOKEN_KEY};

    #[tokio::test]
    async fn session_is_read_fresh_from_the_store() {
        let store = Arc::new(MemoryStore::new());
        let context = AppContext::new(store.clone());
        assert_eq!(context.load_session().await.token, None);

        crate::config::SettingsStore::set(store.as_ref(), TOKEN_KEY, "fresh").expect("set token");
        assert_eq!(context.load_session().await.token.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn saved_session_round_trips() {
        let context = AppContext::new(Arc::new(MemoryStore::new()));
        let session = SessionConfig {
            base_url: "http://backend:8080".to_string(),
            tenant_id: Some("tenant-9".to_string()),
            ..Default::default()
        };
        context
            .save_session_async(session.clone())
            .await
            .expect("save session");
        assert_eq!(context.session(), session);
    }
}
