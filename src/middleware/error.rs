use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use crate::login::LoginError;

/// Authentication errors for the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No signed-in user on a request that needs one.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Login form submission failed; sent back to the login page.
    #[error("Login failed: {error}")]
    Login {
        login_path: String,
        error: LoginError,
    },
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()).into_response(),
            Self::Login { login_path, error } => {
                let encoded = urlencoding::encode(&error.to_string()).into_owned();
                Redirect::to(&format!("{login_path}?error={encoded}")).into_response()
            }
        }
    }
}
