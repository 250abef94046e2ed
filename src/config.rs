use std::sync::Arc;

#[cfg(feature = "axum")]
use axum_extra::extract::cookie::Key;
use url::Url;

use crate::api::{ApiClient, DEFAULT_API_BASE_URL};
use crate::context::{ConsoleSettings, SessionContext};
use crate::error::Error;
#[cfg(feature = "axum")]
use crate::middleware::{ClientSessions, CookieSettings};
use crate::provider::supabase::{SupabaseClient, SupabaseConfig};

/// Console configuration.
///
/// Required field (`supabase`) is a constructor parameter.
///
/// Use [`from_env()`](ConsoleConfig::from_env) for convention-based setup,
/// or [`new()`](ConsoleConfig::new) with `with_*` methods for full control.
#[derive(Clone)]
pub struct ConsoleConfig {
    pub(crate) supabase: SupabaseConfig,
    pub(crate) api_base_url: Url,
    pub(crate) settings: ConsoleSettings,
    pub(crate) cookie_secret: Option<String>,
}

impl std::fmt::Debug for ConsoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleConfig")
            .field("supabase", &self.supabase)
            .field("api_base_url", &self.api_base_url)
            .field("settings", &self.settings)
            .field("cookie_secret", &self.cookie_secret.as_ref().map(|_| ".."))
            .finish()
    }
}

impl ConsoleConfig {
    /// Create config with the required Supabase settings.
    ///
    /// All optional fields use sensible defaults. Override with `with_*` methods.
    #[must_use]
    pub fn new(supabase: SupabaseConfig) -> Self {
        Self {
            supabase,
            api_base_url: DEFAULT_API_BASE_URL
                .parse()
                .expect("valid default URL"),
            settings: ConsoleSettings::default(),
            cookie_secret: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SUPABASE_URL`: Supabase project URL
    /// - `SUPABASE_ANON_KEY`: public anon key sent as `apikey`
    ///
    /// # Optional env vars
    /// - `SUPABASE_AUTH_PATH`: GoTrue mount point (default `/auth/v1`)
    /// - `API_BASE_URL`: REST backend (default `http://localhost:8000`)
    /// - `CONSOLE_LOGIN_PATH`: login page path (default `/login`)
    /// - `CONSOLE_AUTH_PATH`: prefix of the login/logout endpoints (default `/api/auth`)
    /// - `DEV_AUTH`: Set to `"1"` or `"true"` to accept the built-in demo accounts
    ///   and disable secure cookies
    /// - `COOKIE_KEY`: session cookie key, at least 64 bytes (random per process if unset)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or URLs are invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let project_url: Url = var("SUPABASE_URL")
            .ok_or_else(|| Error::Config("SUPABASE_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("SUPABASE_URL: {e}")))?;
        let anon_key = var("SUPABASE_ANON_KEY")
            .ok_or_else(|| Error::Config("SUPABASE_ANON_KEY is required".into()))?;

        let mut supabase = SupabaseConfig::new(project_url, anon_key);
        if let Some(path) = var("SUPABASE_AUTH_PATH") {
            supabase = supabase.with_auth_path(path);
        }

        let mut config = Self::new(supabase);

        if let Some(url_str) = var("API_BASE_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("API_BASE_URL: {e}")))?;
            config = config.with_api_base_url(url);
        }

        let mut settings = ConsoleSettings::default();
        if let Some(path) = var("CONSOLE_LOGIN_PATH") {
            settings = settings.with_login_path(path);
        }
        if let Some(path) = var("CONSOLE_AUTH_PATH") {
            settings = settings.with_auth_path(path);
        }
        let dev_auth = matches!(var("DEV_AUTH").as_deref(), Some("1" | "true"));
        if dev_auth {
            tracing::warn!("DEV_AUTH enabled: demo accounts accepted on failed sign-in");
        }

        config.cookie_secret = var("COOKIE_KEY");

        Ok(config.with_settings(settings.with_dev_login_enabled(dev_auth)))
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = url;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ConsoleSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn supabase(&self) -> &SupabaseConfig {
        &self.supabase
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    #[must_use]
    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    /// Builds the session context backed by Supabase.
    #[must_use]
    pub fn into_context(self) -> SessionContext<SupabaseClient> {
        SessionContext::new(SupabaseClient::new(self.supabase)).with_settings(self.settings)
    }

    /// Per-client sessions for the Axum layer, one Supabase client per login.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `COOKIE_KEY` is shorter than 64 bytes.
    #[cfg(feature = "axum")]
    pub fn client_sessions(&self) -> Result<ClientSessions<SupabaseClient>, Error> {
        let mut cookies =
            CookieSettings::default().with_secure(!self.settings.dev_login_enabled());
        if let Some(secret) = &self.cookie_secret {
            let key = Key::try_from(secret.as_bytes())
                .map_err(|_| Error::Config("COOKIE_KEY must be at least 64 bytes".into()))?;
            cookies = cookies.with_key(key);
        }

        let supabase = self.supabase.clone();
        let http = reqwest::Client::new();
        Ok(ClientSessions::new(move || {
            SupabaseClient::new(supabase.clone()).with_http_client(http.clone())
        })
        .with_settings(self.settings.clone())
        .with_cookies(cookies))
    }

    /// Backend client sharing the context's session store.
    #[must_use]
    pub fn api_client(&self, context: &SessionContext<SupabaseClient>) -> ApiClient {
        ApiClient::new(self.api_base_url.clone(), Arc::clone(context.store()))
    }
}
