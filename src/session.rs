//! Console session state, reconciled against the identity provider.
//!
//! [`SessionStore`] is the single writer-side handle. It is written by
//! [`bootstrap`](SessionStore::bootstrap), [`login`](SessionStore::login),
//! [`logout`](SessionStore::logout) and provider events, and read through
//! [`snapshot`](SessionStore::snapshot) or [`changes`](SessionStore::changes).
//! Every read observes a whole [`Session`]; writes replace it atomically.
//!
//! Each write bumps an internal epoch. A bootstrap query remembers the epoch
//! it started at and its result is dropped if anything else wrote in the
//! meantime, so a slow initial query can never resurrect a session the user
//! already logged out of.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::provider::{AuthEvent, IdentityProvider, ProviderSession};
use crate::types::{AccessToken, Role, UserIdentity};

/// Token and identity of a signed-in user. Always set and cleared together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    token: AccessToken,
    user: UserIdentity,
}

impl Authenticated {
    #[must_use]
    pub fn new(token: AccessToken, user: UserIdentity) -> Self {
        Self { token, user }
    }

    #[must_use]
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    #[must_use]
    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.user.role
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    auth: Option<Authenticated>,
    loading: bool,
}

impl Session {
    /// Initial state: nothing known yet.
    #[must_use]
    pub fn bootstrapping() -> Self {
        Self {
            auth: None,
            loading: true,
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            auth: None,
            loading: false,
        }
    }

    #[must_use]
    pub fn authenticated(token: AccessToken, user: UserIdentity) -> Self {
        Self {
            auth: Some(Authenticated::new(token, user)),
            loading: false,
        }
    }

    #[must_use]
    pub fn auth(&self) -> Option<&Authenticated> {
        self.auth.as_ref()
    }

    #[must_use]
    pub fn token(&self) -> Option<&AccessToken> {
        self.auth.as_ref().map(Authenticated::token)
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserIdentity> {
        self.auth.as_ref().map(Authenticated::user)
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.auth.as_ref().map(Authenticated::role)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match (&self.auth, self.loading) {
            (_, true) => SessionState::Bootstrapping,
            (None, false) => SessionState::Anonymous,
            (Some(auth), false) => SessionState::Authenticated(auth.role()),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::bootstrapping()
    }
}

/// Coarse lifecycle of the console session.
///
/// `Bootstrapping` is left exactly once and never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Bootstrapping,
    Anonymous,
    Authenticated(Role),
}

#[derive(Debug, Clone)]
struct StoreState {
    session: Session,
    epoch: u64,
}

/// Process-wide session holder. Share it behind an `Arc`.
#[derive(Debug)]
pub struct SessionStore {
    state: watch::Sender<StoreState>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(StoreState {
            session: Session::bootstrapping(),
            epoch: 0,
        });
        Self { state }
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().session.clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().session.state()
    }

    /// Watch handle notified after every write.
    #[must_use]
    pub fn changes(&self) -> SessionChanges {
        SessionChanges {
            rx: self.state.subscribe(),
        }
    }

    fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    /// Subscribes to provider events, then resolves the initial session.
    ///
    /// Subscribing first means no transition that happens while the initial
    /// query is in flight is missed.
    pub async fn start<P: IdentityProvider>(self: &Arc<Self>, provider: &P) -> EventPump {
        let pump = self.subscribe_to_provider_events(provider);
        self.bootstrap(provider).await;
        pump
    }

    /// Resolves the initial session from the provider and leaves the
    /// loading state.
    ///
    /// Failures are logged and treated as "no session". The result is
    /// discarded if another write landed while the query was in flight.
    pub async fn bootstrap<P: IdentityProvider>(&self, provider: &P) {
        let started = self.epoch();

        let resolved = match provider.get_session().await {
            Ok(Some(session)) => match authenticate(&session, None) {
                Ok(auth) => Some(auth),
                Err(e) => {
                    tracing::warn!(error = %e, "Stored session has no usable identity, starting anonymous");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Session bootstrap failed, starting anonymous");
                None
            }
        };

        self.resolve_bootstrap(started, resolved);
    }

    fn resolve_bootstrap(&self, started: u64, resolved: Option<Authenticated>) {
        self.state.send_if_modified(|state| {
            let stale = state.epoch != started;
            if stale {
                tracing::debug!("Discarding bootstrap result superseded by a newer write");
            } else {
                tracing::debug!(authenticated = resolved.is_some(), "Session bootstrap resolved");
                state.session.auth = resolved;
                state.epoch += 1;
            }
            let was_loading = std::mem::replace(&mut state.session.loading, false);
            !stale || was_loading
        });
    }

    /// Registers with the provider and applies every pushed event until the
    /// returned pump is dropped.
    pub fn subscribe_to_provider_events<P: IdentityProvider>(
        self: &Arc<Self>,
        provider: &P,
    ) -> EventPump {
        let mut subscription = provider.subscribe();
        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                store.apply_event(event);
            }
            tracing::debug!("Provider event stream closed");
        });
        EventPump { task }
    }

    /// Applies one provider event: a session replaces token and user, no
    /// session clears both.
    ///
    /// A session whose identity cannot be decoded clears the store only when
    /// it belongs to the signed-in user (a refresh or profile update that
    /// lost its role). One for any other account is ignored.
    pub fn apply_event(&self, event: AuthEvent) {
        let kind = event.kind;
        let applied = self.state.send_if_modified(|state| {
            let next = match event.session {
                Some(session) => match authenticate(&session, state.session.auth.as_ref()) {
                    Ok(auth) => Some(auth),
                    Err(e) if is_same_user(&session, state.session.user()) => {
                        tracing::warn!(?kind, error = %e, "Provider session lost its console identity, clearing");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(?kind, error = %e, "Ignoring provider session without a console identity");
                        return false;
                    }
                },
                None => None,
            };
            state.session.auth = next;
            state.session.loading = false;
            state.epoch += 1;
            true
        });
        if applied {
            tracing::debug!(?kind, "Applied provider auth event");
        }
    }

    /// Records a session obtained from a successful credential check.
    pub fn login(&self, token: AccessToken, user: UserIdentity) {
        tracing::info!(email = %user.email, role = %user.role, "Console login");
        self.state.send_modify(|state| {
            state.session.auth = Some(Authenticated::new(token, user));
            state.epoch += 1;
        });
    }

    /// Clears the local session, then asks the provider to sign out.
    ///
    /// The local clear comes first on purpose: guard decisions made while
    /// the provider call is in flight already see the user as signed out,
    /// and a late bootstrap result is dropped by the epoch bump. The end
    /// state is the same as calling the provider first. A failing provider
    /// call is only logged.
    pub async fn logout<P: IdentityProvider>(&self, provider: &P) {
        self.state.send_modify(|state| {
            state.session.auth = None;
            state.epoch += 1;
        });
        tracing::info!("Console logout");

        if let Err(e) = provider.sign_out().await {
            tracing::warn!(error = %e, "Provider sign-out failed, local session already cleared");
        }
    }
}

/// Maps a provider session to the console's view of it.
///
/// When `previous` is the same user (a token refresh), its login time is kept.
pub(crate) fn authenticate(
    session: &ProviderSession,
    previous: Option<&Authenticated>,
) -> Result<Authenticated, Error> {
    let login_time = previous
        .filter(|p| session.user.email.as_deref() == Some(p.user.email.as_str()))
        .map_or_else(OffsetDateTime::now_utc, |p| p.user.login_time);
    let user = UserIdentity::from_provider_user(&session.user, login_time)?;
    Ok(Authenticated::new(session.access_token.clone(), user))
}

fn is_same_user(session: &ProviderSession, current: Option<&UserIdentity>) -> bool {
    current.is_some_and(|user| session.user.email.as_deref() == Some(user.email.as_str()))
}

/// Receiver side of the store's change notifications.
#[derive(Debug, Clone)]
pub struct SessionChanges {
    rx: watch::Receiver<StoreState>,
}

impl SessionChanges {
    #[must_use]
    pub fn current(&self) -> Session {
        self.rx.borrow().session.clone()
    }

    /// Waits for the next write. `None` once the store is dropped.
    pub async fn changed(&mut self) -> Option<Session> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().session.clone())
    }

    /// Waits until the bootstrap window is over.
    pub async fn resolved(&mut self) -> Session {
        let resolved = match self.rx.wait_for(|state| !state.session.loading).await {
            Ok(state) => Some(state.session.clone()),
            Err(_) => None,
        };
        resolved.unwrap_or_else(|| self.current())
    }
}

/// Background task feeding provider events into the store.
///
/// Dropping it unregisters from the provider.
#[derive(Debug)]
pub struct EventPump {
    task: JoinHandle<()>,
}

impl EventPump {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.task.abort();
    }
}
