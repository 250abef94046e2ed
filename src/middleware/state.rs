use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use ulid::Ulid;

use super::cookies::CookieSettings;
use crate::context::{ConsoleSettings, SessionContext};
use crate::guard::{RouteGuard, RouteTable};
use crate::provider::IdentityProvider;
use crate::session::{EventPump, SessionState};

struct ClientSession<P> {
    context: SessionContext<P>,
    _pump: EventPump,
}

/// Per-client console sessions for the HTTP layer.
///
/// Each signed-in browser owns its own provider, [`SessionStore`] and event
/// pump, found through a private session cookie. A request without a known
/// cookie is anonymous, whoever else is signed in.
///
/// [`SessionStore`]: crate::SessionStore
pub struct ClientSessions<P> {
    provider_factory: Arc<dyn Fn() -> P + Send + Sync>,
    settings: ConsoleSettings,
    guard: RouteGuard,
    cookies: CookieSettings,
    clients: Arc<Mutex<HashMap<String, ClientSession<P>>>>,
}

// Manual Clone: avoid derive adding a `P: Clone` bound.
impl<P> Clone for ClientSessions<P> {
    fn clone(&self) -> Self {
        Self {
            provider_factory: self.provider_factory.clone(),
            settings: self.settings.clone(),
            guard: self.guard.clone(),
            cookies: self.cookies.clone(),
            clients: self.clients.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<P> FromRef<ClientSessions<P>> for Key {
    fn from_ref(sessions: &ClientSessions<P>) -> Self {
        sessions.cookies.key.clone()
    }
}

impl<P: IdentityProvider> ClientSessions<P> {
    /// `provider_factory` builds a fresh provider for every client login.
    #[must_use]
    pub fn new(provider_factory: impl Fn() -> P + Send + Sync + 'static) -> Self {
        Self {
            provider_factory: Arc::new(provider_factory),
            settings: ConsoleSettings::default(),
            guard: RouteGuard::console(),
            cookies: CookieSettings::default(),
            clients: Arc::new(Mutex::new(HashMap::new())),
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
    pub fn with_cookies(mut self, cookies: CookieSettings) -> Self {
        self.cookies = cookies;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    #[must_use]
    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieSettings {
        &self.cookies
    }

    /// Number of live client sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_clients().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True for the login/logout endpoints, which bypass the route guard.
    pub(super) fn is_auth_path(&self, path: &str) -> bool {
        let auth_path = self.settings.auth_path.trim_end_matches('/');
        path.strip_prefix(auth_path)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// A fresh, unregistered context for one client.
    pub(super) fn new_context(&self) -> SessionContext<P> {
        SessionContext::new((self.provider_factory)())
            .with_settings(self.settings.clone())
            .with_route_table(self.guard.table().clone())
    }

    /// Registers a client context and returns its session id.
    pub(super) fn insert(&self, context: SessionContext<P>, pump: EventPump) -> String {
        let session_id = Ulid::new().to_string();
        self.lock_clients().insert(
            session_id.clone(),
            ClientSession {
                context,
                _pump: pump,
            },
        );
        session_id
    }

    /// Looks up a client's context.
    ///
    /// A context the provider has since signed out (for example after a
    /// failed refresh) is dropped and reported as missing.
    pub(super) fn find(&self, session_id: &str) -> Option<SessionContext<P>> {
        let mut clients = self.lock_clients();
        let context = clients.get(session_id)?.context.clone();
        if context.store().state() == SessionState::Anonymous {
            tracing::debug!(session_id, "Dropping signed-out client session");
            clients.remove(session_id);
            return None;
        }
        Some(context)
    }

    pub(super) fn remove(&self, session_id: &str) -> Option<SessionContext<P>> {
        self.lock_clients()
            .remove(session_id)
            .map(|client| client.context)
    }

    fn lock_clients(&self) -> MutexGuard<'_, HashMap<String, ClientSession<P>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
