use std::sync::Arc;

use crate::guard::{Decision, LOGIN_PATH, RouteGuard, RouteTable};
use crate::login::{self, Credentials, LoginError, LoginOutcome};
use crate::navigation::{MenuItem, menu_for};
use crate::provider::IdentityProvider;
use crate::session::{EventPump, SessionStore};

/// Console-level settings shared by the context and the HTTP layer.
#[derive(Debug, Clone)]
pub struct ConsoleSettings {
    pub(crate) login_path: String,
    pub(crate) auth_path: String,
    pub(crate) dev_login_enabled: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            login_path: LOGIN_PATH.into(),
            auth_path: "/api/auth".into(),
            dev_login_enabled: false,
        }
    }
}

impl ConsoleSettings {
    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.auth_path = path.into();
        self
    }

    /// Accept the built-in demo accounts when the provider rejects a login.
    #[must_use]
    pub fn with_dev_login_enabled(mut self, enabled: bool) -> Self {
        self.dev_login_enabled = enabled;
        self
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn auth_path(&self) -> &str {
        &self.auth_path
    }

    #[must_use]
    pub fn dev_login_enabled(&self) -> bool {
        self.dev_login_enabled
    }
}

/// Everything a console screen needs: provider, session store and guard.
///
/// Cheap to clone; hand one to each page or handler instead of reaching
/// for global state.
pub struct SessionContext<P> {
    provider: Arc<P>,
    store: Arc<SessionStore>,
    guard: RouteGuard,
    settings: ConsoleSettings,
}

// Manual Clone: avoid derive adding a `P: Clone` bound.
impl<P> Clone for SessionContext<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            store: self.store.clone(),
            guard: self.guard.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<P: IdentityProvider> SessionContext<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self::from_parts(Arc::new(provider), Arc::new(SessionStore::new()))
    }

    /// Builds a context around an existing provider and store.
    #[must_use]
    pub fn from_parts(provider: Arc<P>, store: Arc<SessionStore>) -> Self {
        Self {
            provider,
            store,
            guard: RouteGuard::console(),
            settings: ConsoleSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ConsoleSettings) -> Self {
        self.guard = self.guard.with_login_path(settings.login_path.clone());
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_route_table(mut self, table: RouteTable) -> Self {
        self.guard = RouteGuard::new(table).with_login_path(self.settings.login_path.clone());
        self
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    #[must_use]
    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    /// Subscribes the store to provider events and resolves the initial
    /// session. Keep the pump alive for the application's lifetime.
    pub async fn start(&self) -> EventPump {
        self.store.start(&*self.provider).await
    }

    /// # Errors
    ///
    /// See [`login::sign_in`].
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<LoginOutcome, LoginError> {
        login::sign_in(
            &*self.provider,
            &self.store,
            credentials,
            self.settings.dev_login_enabled,
        )
        .await
    }

    pub async fn sign_out(&self) {
        self.store.logout(&*self.provider).await;
    }

    #[must_use]
    pub fn decide(&self, path: &str) -> Decision {
        self.guard.decide(&self.store.snapshot(), path)
    }

    /// Sidebar entries for the signed-in role, empty when anonymous.
    #[must_use]
    pub fn menu(&self) -> &'static [MenuItem] {
        self.store.snapshot().role().map(menu_for).unwrap_or_default()
    }
}
