use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::PrivateCookieJar;

use super::cookies;
use super::extractor::CurrentUser;
use super::state::ClientSessions;
use crate::guard::Decision;
use crate::provider::IdentityProvider;
use crate::session::Session;

/// Body served while the session is still bootstrapping.
pub const LOADING_PLACEHOLDER: &str = "Synchronizing Core...";

/// Axum middleware applying the route guard to every request.
///
/// The decision is made against the caller's own session, found through the
/// session cookie; requests without one are anonymous. The login/logout
/// endpoints pass through untouched.
///
/// Mount with `axum::middleware::from_fn_with_state(sessions, route_guard::<P>)`,
/// or use [`console_router`](super::console_router).
pub async fn route_guard<P: IdentityProvider>(
    State(sessions): State<ClientSessions<P>>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if sessions.is_auth_path(request.uri().path()) {
        return next.run(request).await;
    }

    let session = cookies::session_id(&jar, sessions.cookies())
        .and_then(|id| sessions.find(&id))
        .map_or_else(Session::anonymous, |context| context.store().snapshot());

    match sessions.guard().decide(&session, request.uri().path()) {
        Decision::Loading => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "1")],
            LOADING_PLACEHOLDER,
        )
            .into_response(),
        Decision::Redirect(to) => Redirect::to(&to).into_response(),
        Decision::NoMatch => StatusCode::NOT_FOUND.into_response(),
        Decision::RenderLogin => next.run(request).await,
        Decision::Render { page, params } => {
            if let Some(auth) = session.auth() {
                request
                    .extensions_mut()
                    .insert(CurrentUser::new(auth, page, params));
            }
            next.run(request).await
        }
    }
}
