//! In-memory identity provider for tests and local demos.
//!
//! ```rust,ignore
//! let provider = MockIdentityProvider::new()
//!     .with_account("dana@acme.io", "pw", Some("Dana"), Some("ENGINEER"));
//!
//! // Hold the initial session query open to sequence it against events
//! let gate = provider.gate_session_queries();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, Semaphore, broadcast};

use super::{
    AuthEvent, AuthEventKind, EVENT_CHANNEL_CAPACITY, IdentityProvider, ProviderSession,
    ProviderUser, Subscription,
};
use crate::error::Error;
use crate::login::Credentials;
use crate::types::AccessToken;

struct MockAccount {
    password: String,
    user: ProviderUser,
}

#[derive(Default)]
struct Failures {
    get_session: Option<String>,
    sign_in: Option<String>,
    sign_out: Option<String>,
}

/// Handle that holds `get_session` calls until released.
#[derive(Clone)]
pub struct SessionGate {
    started: Arc<Notify>,
    permits: Arc<Semaphore>,
}

impl SessionGate {
    /// Resolves once a session query has reached the gate.
    pub async fn query_started(&self) {
        self.started.notified().await;
    }

    /// Lets one held query complete.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }
}

pub struct MockIdentityProvider {
    accounts: Mutex<HashMap<String, MockAccount>>,
    current: Mutex<Option<ProviderSession>>,
    failures: Mutex<Failures>,
    gate: Mutex<Option<SessionGate>>,
    events: broadcast::Sender<AuthEvent>,
    issued: AtomicUsize,
    sign_out_calls: AtomicUsize,
    revoked: Mutex<Vec<AccessToken>>,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            failures: Mutex::new(Failures::default()),
            gate: Mutex::new(None),
            events,
            issued: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            revoked: Mutex::new(Vec::new()),
        }
    }

    /// Registers an account. `role` is stored verbatim in user metadata.
    #[must_use]
    pub fn with_account(
        self,
        email: &str,
        password: &str,
        name: Option<&str>,
        role: Option<&str>,
    ) -> Self {
        let mut user = ProviderUser::new(format!("user-{email}")).with_email(email);
        if let Some(name) = name {
            user = user.with_name(name);
        }
        if let Some(role) = role {
            user = user.with_role(role);
        }
        lock(&self.accounts).insert(
            email.to_owned(),
            MockAccount {
                password: password.to_owned(),
                user,
            },
        );
        self
    }

    /// Starts with a persisted session, as if restored from storage.
    #[must_use]
    pub fn with_session(self, session: ProviderSession) -> Self {
        *lock(&self.current) = Some(session);
        self
    }

    /// Makes `get_session` fail with a transport error.
    #[must_use]
    pub fn fail_get_session(self, detail: &str) -> Self {
        lock(&self.failures).get_session = Some(detail.to_owned());
        self
    }

    /// Makes `sign_in_with_password` fail with a transport error.
    #[must_use]
    pub fn fail_sign_in(self, detail: &str) -> Self {
        lock(&self.failures).sign_in = Some(detail.to_owned());
        self
    }

    /// Makes `sign_out` report failure (the session is still cleared).
    #[must_use]
    pub fn fail_sign_out(self, detail: &str) -> Self {
        lock(&self.failures).sign_out = Some(detail.to_owned());
        self
    }

    /// Holds subsequent `get_session` calls until [`SessionGate::release`].
    ///
    /// The query reads the provider's session before waiting, so a held
    /// query returns whatever was current when it was issued.
    #[must_use]
    pub fn gate_session_queries(&self) -> SessionGate {
        let gate = SessionGate {
            started: Arc::new(Notify::new()),
            permits: Arc::new(Semaphore::new(0)),
        };
        *lock(&self.gate) = Some(gate.clone());
        gate
    }

    /// Pushes an event to every subscriber, updating the held session.
    pub fn emit(&self, event: AuthEvent) {
        *lock(&self.current) = event.session.clone();
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn current_session(&self) -> Option<ProviderSession> {
        lock(&self.current).clone()
    }

    #[must_use]
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// Access tokens passed to `revoke_session`, oldest first.
    #[must_use]
    pub fn revoked_tokens(&self) -> Vec<AccessToken> {
        lock(&self.revoked).clone()
    }

    fn transport_error(operation: &'static str, detail: &str) -> Error {
        Error::Provider {
            operation,
            status: None,
            detail: detail.to_owned(),
        }
    }
}

impl IdentityProvider for MockIdentityProvider {
    async fn get_session(&self) -> Result<Option<ProviderSession>, Error> {
        let session = self.current_session();
        let gate = lock(&self.gate).clone();

        if let Some(gate) = gate {
            gate.started.notify_one();
            if let Ok(permit) = gate.permits.acquire().await {
                permit.forget();
            }
        }

        if let Some(detail) = lock(&self.failures).get_session.clone() {
            return Err(Self::transport_error("session query", &detail));
        }
        Ok(session)
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.events.subscribe())
    }

    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderSession, Error> {
        if let Some(detail) = lock(&self.failures).sign_in.clone() {
            return Err(Self::transport_error("password sign-in", &detail));
        }

        let user = lock(&self.accounts)
            .get(credentials.email())
            .filter(|a| a.password == credentials.password())
            .map(|a| a.user.clone())
            .ok_or_else(|| Error::Provider {
                operation: "password sign-in",
                status: Some(400),
                detail: "Invalid login credentials".into(),
            })?;

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let session = ProviderSession::new(format!("mock-access-{n}"), user)
            .with_refresh_token(format!("mock-refresh-{n}"));
        self.emit(AuthEvent::new(AuthEventKind::SignedIn, Some(session.clone())));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.emit(AuthEvent::signed_out());

        match lock(&self.failures).sign_out.clone() {
            Some(detail) => Err(Self::transport_error("sign-out", &detail)),
            None => Ok(()),
        }
    }

    async fn revoke_session(&self, session: &ProviderSession) -> Result<(), Error> {
        let mut current = lock(&self.current);
        if current
            .as_ref()
            .is_some_and(|c| c.access_token == session.access_token)
        {
            *current = None;
        }
        lock(&self.revoked).push(session.access_token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoke_forgets_only_matching_session() {
        let held = ProviderSession::new("held", ProviderUser::new("1"));
        let provider = MockIdentityProvider::new().with_session(held.clone());

        provider
            .revoke_session(&ProviderSession::new("other", ProviderUser::new("2")))
            .await
            .unwrap();
        assert_eq!(provider.current_session(), Some(held.clone()));

        provider.revoke_session(&held).await.unwrap();
        assert_eq!(provider.current_session(), None);
        assert_eq!(
            provider.revoked_tokens(),
            vec![AccessToken::new("other"), AccessToken::new("held")]
        );
    }

    #[tokio::test]
    async fn sign_in_emits_signed_in() {
        let provider =
            MockIdentityProvider::new().with_account("a@b.co", "pw", None, Some("ADMIN"));
        let mut sub = provider.subscribe();

        let session = provider
            .sign_in_with_password(&Credentials::new("a@b.co", "pw").unwrap())
            .await
            .unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedIn);
        assert_eq!(event.session, Some(session.clone()));
        assert_eq!(provider.get_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn sign_out_emits_signed_out_and_clears() {
        let provider = MockIdentityProvider::new()
            .with_session(ProviderSession::new("t", ProviderUser::new("1")));
        let mut sub = provider.subscribe();

        provider.sign_out().await.unwrap();

        assert_eq!(sub.recv().await.unwrap().kind, AuthEventKind::SignedOut);
        assert_eq!(provider.get_session().await.unwrap(), None);
        assert_eq!(provider.sign_out_calls(), 1);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_with_status() {
        let provider = MockIdentityProvider::new().with_account("a@b.co", "pw", None, None);

        let err = provider
            .sign_in_with_password(&Credentials::new("a@b.co", "nope").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider { status: Some(400), .. }));
    }
}
