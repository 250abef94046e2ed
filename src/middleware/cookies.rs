use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use time::Duration;

/// Session cookie settings for the HTTP layer.
#[derive(Clone)]
pub struct CookieSettings {
    pub(crate) key: Key,
    pub(crate) name: String,
    pub(crate) ttl_days: i64,
    pub(crate) secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            key: Key::generate(),
            name: "__prosupport_session".into(),
            ttl_days: 30,
            secure: true,
        }
    }
}

impl std::fmt::Debug for CookieSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSettings")
            .field("name", &self.name)
            .field("ttl_days", &self.ttl_days)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl CookieSettings {
    /// Encryption key for the private session cookie.
    ///
    /// Defaults to a random key, which invalidates every cookie on restart.
    #[must_use]
    pub fn with_key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.ttl_days = days;
        self
    }

    /// Set to `false` for plain-HTTP local development.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ttl_days(&self) -> i64 {
        self.ttl_days
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }
}

/// Create session cookie.
pub(super) fn session_cookie(settings: &CookieSettings, session_id: &str) -> Cookie<'static> {
    Cookie::build((settings.name.clone(), session_id.to_owned()))
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::days(settings.ttl_days))
        .build()
}

/// Create removal cookie for session.
pub(super) fn clear_session_cookie(settings: &CookieSettings) -> Cookie<'static> {
    Cookie::build((settings.name.clone(), ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Get the session id from cookies.
pub(super) fn session_id(jar: &PrivateCookieJar, settings: &CookieSettings) -> Option<String> {
    jar.get(&settings.name).map(|c| c.value().to_owned())
}
