//! Authenticated JSON client for the console's REST backend.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::provider::supabase::error_detail;
use crate::session::SessionStore;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Sends backend requests with the current session's bearer token.
///
/// The token is read from the store on every request, so refreshes and
/// sign-outs apply immediately.
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    store: Arc<SessionStore>,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: Url, store: Arc<SessionStore>) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
            store,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// # Errors
    ///
    /// [`Error::Unauthorized`] on 401, [`Error::Backend`] on other non-2xx
    /// statuses, [`Error::Http`] on network or decode failure.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let response = self.request(Method::GET, path)?.send().await?;
        Self::ensure_success(response).await?.json().await.map_err(Into::into)
    }

    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::POST, path)?.json(body).send().await?;
        Self::ensure_success(response).await?.json().await.map_err(Into::into)
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, Error> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("invalid API path {path}: {e}")))?;

        let builder = self.http.request(method, url);
        Ok(match self.store.snapshot().token() {
            Some(token) => builder.bearer_auth(token.as_str()),
            None => builder,
        })
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::error!(url = %response.url(), "Session expired. Please log in again.");
            return Err(Error::Unauthorized);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Backend {
            status: status.as_u16(),
            detail: error_detail(&body),
        })
    }
}
