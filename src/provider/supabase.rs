use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;
use url::Url;

use super::{
    AuthEvent, AuthEventKind, EVENT_CHANNEL_CAPACITY, IdentityProvider, ProviderSession,
    ProviderUser, Subscription,
};
use crate::error::Error;
use crate::login::Credentials;
use crate::types::AccessToken;

/// Supabase Auth (GoTrue) configuration.
///
/// Required fields are constructor parameters, so there are no runtime "missing field" errors.
///
/// ```rust,ignore
/// use prosupport_session::SupabaseConfig;
///
/// let config = SupabaseConfig::new("https://abcd.supabase.co".parse()?, "anon-key");
/// // Optional overrides via chaining:
/// let config = config.with_refresh_margin(time::Duration::seconds(30));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SupabaseConfig {
    pub(crate) project_url: Url,
    pub(crate) anon_key: String,
    pub(crate) auth_path: String,
    pub(crate) refresh_margin: Duration,
}

impl SupabaseConfig {
    #[must_use]
    pub fn new(project_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            project_url,
            anon_key: anon_key.into(),
            auth_path: "/auth/v1".into(),
            refresh_margin: Duration::seconds(60),
        }
    }

    /// Override the GoTrue mount point (default: `/auth/v1`).
    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.auth_path = path.into();
        self
    }

    /// Refresh sessions expiring within this window (default: 60 s).
    #[must_use]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    #[must_use]
    pub fn project_url(&self) -> &Url {
        &self.project_url
    }

    #[must_use]
    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    #[must_use]
    pub fn auth_path(&self) -> &str {
        &self.auth_path
    }

    #[must_use]
    pub fn refresh_margin(&self) -> Duration {
        self.refresh_margin
    }

    fn endpoint(&self, tail: &str) -> Result<Url, Error> {
        let url = format!(
            "{}/{}/{}",
            self.project_url.as_str().trim_end_matches('/'),
            self.auth_path.trim_matches('/'),
            tail
        );
        url.parse()
            .map_err(|e| Error::Config(format!("invalid auth endpoint {url}: {e}")))
    }
}

/// Supabase Auth client holding the current session.
///
/// Every session change is broadcast to subscribers.
pub struct SupabaseClient {
    config: SupabaseConfig,
    http: reqwest::Client,
    current: Mutex<Option<ProviderSession>>,
    events: broadcast::Sender<AuthEvent>,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

impl SupabaseClient {
    #[must_use]
    pub fn new(config: SupabaseConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            http: reqwest::Client::new(),
            current: Mutex::new(None),
            events,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Seeds a previously persisted session.
    pub fn restore_session(&self, session: ProviderSession) {
        self.set_current(Some(session.clone()));
        self.emit(AuthEventKind::InitialSession, Some(session));
    }

    /// Session currently held, without refreshing.
    #[must_use]
    pub fn current_session(&self) -> Option<ProviderSession> {
        self.lock_current().clone()
    }

    /// Exchange the held refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] if no refresh token is held or GoTrue
    /// refuses it, [`Error::Http`] on network failure.
    pub async fn refresh_session(&self) -> Result<ProviderSession, Error> {
        let refresh_token = self
            .current_session()
            .and_then(|s| s.refresh_token)
            .ok_or_else(|| Error::Provider {
                operation: "token refresh",
                status: None,
                detail: "no refresh token".into(),
            })?;

        let response = self
            .token_request("refresh_token")?
            .json(&RefreshGrant {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;

        let session = Self::read_session(response, "token refresh").await?;
        self.set_current(Some(session.clone()));
        self.emit(AuthEventKind::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    /// Fetch the user behind an access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Provider`] if the user endpoint returns an error.
    pub async fn get_user(&self, access_token: &AccessToken) -> Result<ProviderUser, Error> {
        let response = self
            .http
            .get(self.config.endpoint("user")?)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token.as_str())
            .send()
            .await?;

        let response = Self::ensure_success(response, "user request").await?;
        response.json::<ProviderUser>().await.map_err(Into::into)
    }

    fn token_request(&self, grant_type: &str) -> Result<reqwest::RequestBuilder, Error> {
        let mut url = self.config.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        Ok(self
            .http
            .post(url)
            .header("apikey", &self.config.anon_key))
    }

    fn logout_request(&self, access_token: &AccessToken) -> Result<reqwest::RequestBuilder, Error> {
        Ok(self
            .http
            .post(self.config.endpoint("logout")?)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token.as_str()))
    }

    async fn read_session(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<ProviderSession, Error> {
        let response = Self::ensure_success(response, operation).await?;
        let mut session = response.json::<ProviderSession>().await?;
        session.stamp_expiry(OffsetDateTime::now_utc());
        Ok(session)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Provider {
            operation,
            status: Some(status),
            detail: error_detail(&body),
        })
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<ProviderSession>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_current(&self, session: Option<ProviderSession>) {
        *self.lock_current() = session;
    }

    fn emit(&self, kind: AuthEventKind, session: Option<ProviderSession>) {
        // Err only means nobody is subscribed
        let _ = self.events.send(AuthEvent::new(kind, session));
    }

    fn drop_session(&self) {
        self.set_current(None);
        self.emit(AuthEventKind::SignedOut, None);
    }
}

impl IdentityProvider for SupabaseClient {
    async fn get_session(&self) -> Result<Option<ProviderSession>, Error> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !session.expires_within(OffsetDateTime::now_utc(), self.config.refresh_margin) {
            return Ok(Some(session));
        }
        if session.refresh_token.is_none() {
            tracing::info!("Held session expired without refresh token");
            self.drop_session();
            return Ok(None);
        }

        match self.refresh_session().await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed, signing out");
                self.drop_session();
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.events.subscribe())
    }

    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderSession, Error> {
        let response = self
            .token_request("password")?
            .json(&PasswordGrant {
                email: credentials.email(),
                password: credentials.password(),
            })
            .send()
            .await?;

        let session = Self::read_session(response, "password sign-in").await?;
        self.set_current(Some(session.clone()));
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Clears the held session and revokes it server-side.
    ///
    /// The local session is gone even when the revoke call fails.
    async fn sign_out(&self) -> Result<(), Error> {
        let held = self.lock_current().take();
        let Some(session) = held else {
            self.emit(AuthEventKind::SignedOut, None);
            return Ok(());
        };
        self.emit(AuthEventKind::SignedOut, None);

        let response = self.logout_request(&session.access_token)?.send().await?;
        Self::ensure_success(response, "sign-out").await.map(drop)
    }

    async fn revoke_session(&self, session: &ProviderSession) -> Result<(), Error> {
        {
            let mut current = self.lock_current();
            if current
                .as_ref()
                .is_some_and(|held| held.access_token == session.access_token)
            {
                *current = None;
            }
        }

        let response = self.logout_request(&session.access_token)?.send().await?;
        Self::ensure_success(response, "session revoke").await.map(drop)
    }
}

/// Pulls the human-readable message out of a GoTrue error body.
pub(crate) fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["msg", "error_description", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| body.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SupabaseConfig {
        SupabaseConfig::new("https://abcd.supabase.co".parse().unwrap(), "anon-key")
    }

    fn session(expires_at: Option<OffsetDateTime>, refresh: Option<&str>) -> ProviderSession {
        let mut session = ProviderSession::new(
            "access",
            ProviderUser::new("1").with_email("a@b.co").with_role("ADMIN"),
        );
        if let Some(at) = expires_at {
            session = session.with_expires_at(at);
        }
        if let Some(r) = refresh {
            session = session.with_refresh_token(r);
        }
        session
    }

    #[test]
    fn test_endpoints() {
        let config = test_config();
        assert_eq!(
            config.endpoint("token").unwrap().as_str(),
            "https://abcd.supabase.co/auth/v1/token"
        );

        let config = SupabaseConfig::new("http://localhost:54321/".parse().unwrap(), "k")
            .with_auth_path("/gotrue/");
        assert_eq!(
            config.endpoint("logout").unwrap().as_str(),
            "http://localhost:54321/gotrue/logout"
        );
    }

    #[test]
    fn test_password_request_shape() {
        let client = SupabaseClient::new(test_config());
        let request = client.token_request("password").unwrap().build().unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.url().as_str(),
            "https://abcd.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(request.headers()["apikey"], "anon-key");
    }

    #[test]
    fn test_logout_request_is_bearer() {
        let client = SupabaseClient::new(test_config());
        let request = client
            .logout_request(&AccessToken::new("tok"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.headers()["authorization"], "Bearer tok");
    }

    #[test]
    fn test_error_detail_prefers_gotrue_message() {
        assert_eq!(
            error_detail(r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(
            error_detail(r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#),
            "Refresh Token Not Found"
        );
        assert_eq!(error_detail("Bad Gateway"), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_restore_and_get_fresh_session() {
        let client = SupabaseClient::new(test_config());
        let mut sub = client.subscribe();
        let fresh = session(Some(OffsetDateTime::now_utc() + Duration::hours(1)), Some("r"));

        client.restore_session(fresh.clone());

        assert_eq!(sub.recv().await.unwrap().kind, AuthEventKind::InitialSession);
        assert_eq!(client.get_session().await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn test_expired_session_without_refresh_token_signs_out() {
        let client = SupabaseClient::new(test_config());
        client.restore_session(session(Some(OffsetDateTime::now_utc() - Duration::minutes(5)), None));
        let mut sub = client.subscribe();

        assert_eq!(client.get_session().await.unwrap(), None);
        assert_eq!(sub.recv().await.unwrap().kind, AuthEventKind::SignedOut);
        assert!(client.current_session().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_is_local() {
        let client = SupabaseClient::new(test_config());
        let mut sub = client.subscribe();

        client.sign_out().await.unwrap();

        assert_eq!(sub.recv().await.unwrap().kind, AuthEventKind::SignedOut);
    }
}
