//! Identity provider seam.
//!
//! The session store never talks to Supabase directly. It consumes an
//! [`IdentityProvider`]: an initial session query, a push stream of
//! session changes, password sign-in and sign-out.

pub mod mock;
#[cfg(feature = "supabase")]
pub mod supabase;

use std::future::Future;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;

use crate::error::Error;
use crate::login::Credentials;
use crate::types::AccessToken;

/// Session payload as issued by the provider (GoTrue JSON shape).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderSession {
    pub access_token: AccessToken,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: ProviderUser,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl ProviderSession {
    #[must_use]
    pub fn new(access_token: impl Into<String>, user: ProviderUser) -> Self {
        Self {
            access_token: AccessToken::new(access_token),
            token_type: default_token_type(),
            expires_in: None,
            expires_at: None,
            refresh_token: None,
            user,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_expires_at(mut self, at: OffsetDateTime) -> Self {
        self.expires_at = Some(at.unix_timestamp());
        self
    }

    /// Fills `expires_at` from `expires_in` when the provider only sent the latter.
    pub(crate) fn stamp_expiry(&mut self, now: OffsetDateTime) {
        if self.expires_at.is_none() {
            if let Some(secs) = self.expires_in {
                self.expires_at = Some((now + Duration::seconds(secs)).unix_timestamp());
            }
        }
    }

    /// True when the token expires within `margin` of `now`.
    /// Sessions without an expiry never expire locally.
    #[must_use]
    pub fn expires_within(&self, now: OffsetDateTime, margin: Duration) -> bool {
        self.expires_at
            .is_some_and(|at| at <= (now + margin).unix_timestamp())
    }
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("access_token", &self.access_token)
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl ProviderUser {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.user_metadata.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.user_metadata.role = Some(role.into());
        self
    }
}

/// Console-relevant keys of the provider's free-form user metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A session transition pushed by the provider.
///
/// Every event carries the full session (or `None`), so applying an event
/// never depends on earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<ProviderSession>,
}

impl AuthEvent {
    #[must_use]
    pub fn new(kind: AuthEventKind, session: Option<ProviderSession>) -> Self {
        Self { kind, session }
    }

    #[must_use]
    pub fn signed_in(session: ProviderSession) -> Self {
        Self::new(AuthEventKind::SignedIn, Some(session))
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::new(AuthEventKind::SignedOut, None)
    }
}

/// Registration on a provider's event stream. Dropping it unregisters.
#[derive(Debug)]
pub struct Subscription {
    events: broadcast::Receiver<AuthEvent>,
}

impl Subscription {
    #[must_use]
    pub fn new(events: broadcast::Receiver<AuthEvent>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the provider is gone.
    ///
    /// A lagging subscriber skips ahead: events are full snapshots, so the
    /// next one delivered supersedes whatever was dropped.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth event subscriber lagged, dropping stale events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Capacity of provider event channels.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 16;

/// External authentication service backing the console session.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Current session, if the provider holds one (persisted or refreshed).
    fn get_session(
        &self,
    ) -> impl Future<Output = Result<Option<ProviderSession>, Error>> + Send;

    /// Register for session-change events.
    fn subscribe(&self) -> Subscription;

    /// Credential check. On success the provider also emits `SignedIn`.
    fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<ProviderSession, Error>> + Send;

    /// End the provider session. The provider also emits `SignedOut`.
    fn sign_out(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Revoke one specific session without emitting an event.
    ///
    /// If it is the session the provider currently holds, the provider
    /// forgets it.
    fn revoke_session(
        &self,
        session: &ProviderSession,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}
