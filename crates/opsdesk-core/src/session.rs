//! Session/identity: the locally held authenticated actor.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::config::CoreConfig;
use crate::error::{call_with_timeout, CoreError, Result};
use crate::models::User;
use crate::store::DataStore;

#[derive(Default)]
struct SessionState {
    current: Option<User>,
    /// "Remember me" keeps the identifying handle only, never the secret.
    remembered_email: Option<String>,
}

pub struct Session {
    store: Arc<dyn DataStore>,
    config: CoreConfig,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(store: Arc<dyn DataStore>, config: CoreConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Authenticate and establish the session. Bad credentials yield the
    /// uniform [`CoreError::Auth`] with no hint about which field was wrong.
    pub async fn login(&self, email: &str, password: &str, remember: bool) -> Result<User> {
        let limit = self.config.call_timeout;
        let user = call_with_timeout(limit, self.store.authenticate(email, password))
            .await?
            .ok_or(CoreError::Auth)?;
        call_with_timeout(limit, self.store.set_online(user.id, true)).await?;

        let mut state = self.state.lock();
        state.remembered_email = remember.then(|| email.to_string());
        state.current = Some(user.clone());
        drop(state);

        info!(user = %user.id, "session established");
        Ok(user)
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.lock().current.clone()
    }

    pub fn require_user(&self) -> Result<User> {
        self.current_user().ok_or(CoreError::NoSession)
    }

    pub fn remembered_email(&self) -> Option<String> {
        self.state.lock().remembered_email.clone()
    }

    /// End the session. The offline write is best-effort: teardown proceeds
    /// even when the store cannot be reached.
    pub async fn logout(&self) {
        let user = self.state.lock().current.take();
        if let Some(user) = user {
            let _ =
                call_with_timeout(self.config.call_timeout, self.store.set_online(user.id, false))
                    .await;
            info!(user = %user.id, "session ended");
        }
    }
}
