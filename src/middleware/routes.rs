use axum::extract::State;
use axum::middleware::from_fn_with_state;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Form, Router};
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;

use super::cookies;
use super::error::AuthError;
use super::guard::route_guard;
use super::state::ClientSessions;
use crate::login::{Credentials, LoginError};
use crate::provider::IdentityProvider;

/// Create the console's login/logout router.
///
/// Mounts `POST {auth_path}/login` and `GET|POST {auth_path}/logout`.
pub fn auth_routes<P: IdentityProvider>(sessions: ClientSessions<P>) -> Router {
    let auth_path = sessions.settings().auth_path().to_owned();

    Router::new()
        .route(&format!("{auth_path}/login"), post(login::<P>))
        .route(
            &format!("{auth_path}/logout"),
            get(logout::<P>).post(logout::<P>),
        )
        .with_state(sessions)
}

/// Adds the auth routes to the console's page routes and puts the whole
/// router behind the route guard.
///
/// The guard also covers paths `pages` has no handler for, so `/` and
/// unknown paths still redirect or answer `404` per the caller's role.
pub fn console_router<P: IdentityProvider>(pages: Router, sessions: ClientSessions<P>) -> Router {
    pages
        .merge(auth_routes(sessions.clone()))
        .layer(from_fn_with_state(sessions, route_guard::<P>))
}

// ── Login ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login<P: IdentityProvider>(
    State(sessions): State<ClientSessions<P>>,
    jar: PrivateCookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(PrivateCookieJar, Redirect), AuthError> {
    let login_failed = |error: LoginError| AuthError::Login {
        login_path: sessions.settings().login_path().to_owned(),
        error,
    };

    let credentials = Credentials::new(form.email, form.password).map_err(login_failed)?;

    // A failed attempt drops this context, leaving any existing session alone
    let context = sessions.new_context();
    let pump = context.start().await;
    let outcome = context.sign_in(&credentials).await.map_err(|e| {
        tracing::warn!(email = %credentials.email(), error = %e, "Console login failed");
        login_failed(e)
    })?;

    if let Some(previous) =
        cookies::session_id(&jar, sessions.cookies()).and_then(|id| sessions.remove(&id))
    {
        previous.sign_out().await;
    }

    let session_id = sessions.insert(context, pump);
    tracing::info!(
        session_id = %session_id,
        email = %credentials.email(),
        role = %outcome.role,
        "Console login successful"
    );

    let jar = jar.add(cookies::session_cookie(sessions.cookies(), &session_id));
    Ok((jar, Redirect::to(outcome.redirect)))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<P: IdentityProvider>(
    State(sessions): State<ClientSessions<P>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    if let Some(context) =
        cookies::session_id(&jar, sessions.cookies()).and_then(|id| sessions.remove(&id))
    {
        context.sign_out().await;
    }

    let clear_cookie = cookies::clear_session_cookie(sessions.cookies());
    (
        jar.remove(clear_cookie),
        Redirect::to(sessions.settings().login_path()),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::{IntoResponse, Response};
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::{CurrentUser, LOADING_PLACEHOLDER};
    use crate::provider::mock::MockIdentityProvider;

    type Sessions = ClientSessions<MockIdentityProvider>;

    fn sessions() -> Sessions {
        ClientSessions::new(|| {
            MockIdentityProvider::new()
                .with_account("root@acme.io", "pw", Some("Root"), Some("ADMIN"))
                .with_account("cust@acme.io", "pw", Some("Cust"), Some("CUSTOMER"))
                .with_account("norole@acme.io", "pw", None, None)
        })
    }

    fn app(sessions: Sessions) -> Router {
        let pages = Router::new()
            .route("/login", get(|| async { "login page" }))
            .route(
                "/admin",
                get(|current: CurrentUser| async move { format!("hello {}", current.user.name) }),
            )
            .route(
                "/admin/users",
                get(|current: CurrentUser| async move { format!("users for {}", current.user.email) }),
            )
            .route(
                "/tickets/{id}",
                get(|current: CurrentUser| async move {
                    current.params.get("id").unwrap_or_default().to_owned()
                }),
            )
            .route("/customer/tickets", get(|| async { "my tickets" }));
        console_router(pages, sessions)
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn login_request(body: &'static str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    /// `name=value` pair of the response's session cookie.
    fn set_cookie(response: &Response) -> Option<String> {
        response
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_owned())
    }

    fn cookie_for(sessions: &Sessions, session_id: &str) -> String {
        let jar = PrivateCookieJar::new(sessions.cookies().key.clone())
            .add(cookies::session_cookie(sessions.cookies(), session_id));
        set_cookie(&jar.into_response()).unwrap()
    }

    async fn sign_in(app: &Router, body: &'static str) -> String {
        let response = app.clone().oneshot(login_request(body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        set_cookie(&response).expect("session cookie")
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_bootstrapping_client_gets_placeholder() {
        let sessions = sessions();
        let context = sessions.new_context();
        let pump = context
            .store()
            .subscribe_to_provider_events(&**context.provider());
        let id = sessions.insert(context, pump);
        let cookie = cookie_for(&sessions, &id);

        let response = app(sessions)
            .oneshot(get_request("/admin", Some(&cookie)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
        assert_eq!(body_text(response).await, LOADING_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_anonymous_redirected_to_login() {
        let app = app(sessions());

        let response = app
            .clone()
            .oneshot(get_request("/customer/tickets", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");

        let response = app.oneshot(get_request("/login", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "login page");
    }

    #[tokio::test]
    async fn test_login_then_render_with_current_user() {
        let app = app(sessions());

        let response = app
            .clone()
            .oneshot(login_request("email=root%40acme.io&password=pw", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/admin");
        let cookie = set_cookie(&response).unwrap();

        let response = app
            .clone()
            .oneshot(get_request("/admin", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "hello Root");

        let response = app
            .clone()
            .oneshot(get_request("/tickets/T-42", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "T-42");

        // Signed in, the login page bounces to the role's home.
        let response = app
            .oneshot(get_request("/login", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(location(&response), "/admin");
    }

    #[tokio::test]
    async fn test_root_redirects_to_role_home() {
        let app = app(sessions());
        let cookie = sign_in(&app, "email=cust%40acme.io&password=pw").await;

        let response = app
            .clone()
            .oneshot(get_request("/", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/customer");

        // Not a page handler in the router, still decided by the guard
        let response = app
            .oneshot(get_request("/engineer/tickets", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cookieless_client_does_not_share_session() {
        let app = app(sessions());
        let _admin = sign_in(&app, "email=root%40acme.io&password=pw").await;

        let response = app
            .clone()
            .oneshot(get_request("/admin/users", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");

        let response = app.oneshot(get_request("/", None)).await.unwrap();
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn test_forged_cookie_is_anonymous() {
        let app = app(sessions());
        let _admin = sign_in(&app, "email=root%40acme.io&password=pw").await;

        let response = app
            .oneshot(get_request("/admin", Some("__prosupport_session=not-encrypted")))
            .await
            .unwrap();
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn test_rejected_login_redirects_with_error() {
        let sessions = sessions();
        let app = app(sessions.clone());

        let response = app
            .clone()
            .oneshot(login_request("email=root%40acme.io&password=nope", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "/login?error=Invalid%20login%20credentials"
        );
        assert!(set_cookie(&response).is_none());

        let response = app
            .oneshot(login_request("password=pw", None))
            .await
            .unwrap();
        assert_eq!(location(&response), "/login?error=Email%20is%20required");
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_role_less_login_keeps_existing_session() {
        let sessions = sessions();
        let app = app(sessions.clone());
        let cookie = sign_in(&app, "email=root%40acme.io&password=pw").await;

        let response = app
            .clone()
            .oneshot(login_request("email=norole%40acme.io&password=pw", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(
            location(&response),
            "/login?error=Your%20account%20has%20no%20console%20role%20assigned."
        );

        let response = app
            .oneshot(get_request("/admin", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "hello Root");
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_relogin_replaces_client_session() {
        let sessions = sessions();
        let app = app(sessions.clone());
        let first = sign_in(&app, "email=root%40acme.io&password=pw").await;

        let response = app
            .clone()
            .oneshot(login_request("email=cust%40acme.io&password=pw", Some(&first)))
            .await
            .unwrap();
        assert_eq!(location(&response), "/customer");
        assert_eq!(sessions.len(), 1);

        let response = app
            .oneshot(get_request("/admin", Some(&first)))
            .await
            .unwrap();
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn test_cross_role_page_is_not_found() {
        let app = app(sessions());
        let cookie = sign_in(&app, "email=cust%40acme.io&password=pw").await;

        let response = app
            .oneshot(get_request("/admin", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_logout_clears_only_callers_session() {
        let sessions = sessions();
        let app = app(sessions.clone());
        let admin = sign_in(&app, "email=root%40acme.io&password=pw").await;
        let customer = sign_in(&app, "email=cust%40acme.io&password=pw").await;
        assert_eq!(sessions.len(), 2);

        // Without a cookie, logout touches nobody
        let response = app
            .clone()
            .oneshot(get_request("/api/auth/logout", None))
            .await
            .unwrap();
        assert_eq!(location(&response), "/login");
        assert_eq!(sessions.len(), 2);

        let response = app
            .clone()
            .oneshot(get_request("/api/auth/logout", Some(&customer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
        assert_eq!(sessions.len(), 1);

        let response = app
            .clone()
            .oneshot(get_request("/customer/tickets", Some(&customer)))
            .await
            .unwrap();
        assert_eq!(location(&response), "/login");

        let response = app
            .oneshot(get_request("/admin", Some(&admin)))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "hello Root");
    }

    #[tokio::test]
    async fn test_extractor_rejects_unguarded_request() {
        let app = Router::new().route(
            "/me",
            get(|current: CurrentUser| async move { current.user.email }),
        );

        let response = app.oneshot(get_request("/me", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
