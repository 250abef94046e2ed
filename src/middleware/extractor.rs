use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::AuthError;
use crate::guard::{Page, RouteParams};
use crate::session::Authenticated;
use crate::types::{AccessToken, UserIdentity};

/// Signed-in user and matched page, placed on the request by the route guard.
///
/// Use as an Axum extractor in page handlers. Returns `401 Unauthorized`
/// if the request did not pass through the guard as an authenticated render.
///
/// # Example
///
/// ```rust,ignore
/// async fn ticket(current: CurrentUser) -> impl IntoResponse {
///     let id = current.params.get("id").unwrap_or_default();
///     format!("{} viewing ticket {id}", current.user.name)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub token: AccessToken,
    pub user: UserIdentity,
    pub page: Page,
    pub params: RouteParams,
}

impl CurrentUser {
    pub(super) fn new(auth: &Authenticated, page: Page, params: RouteParams) -> Self {
        Self {
            token: auth.token().clone(),
            user: auth.user().clone(),
            page,
            params,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}
