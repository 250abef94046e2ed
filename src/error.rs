#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{operation} failed: {detail}")]
    Provider {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[cfg(feature = "supabase")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid role: {0:?}")]
    InvalidRole(String),
    #[error("missing claim: {0}")]
    MissingClaim(&'static str),
    #[error("backend returned {status}: {detail}")]
    Backend { status: u16, detail: String },
    #[error("session expired")]
    Unauthorized,
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Message suitable for the login form's error banner.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider { detail, .. } if !detail.is_empty() => detail.clone(),
            Self::InvalidRole(_) | Self::MissingClaim(_) => {
                "Your account has no console role assigned.".into()
            }
            _ => "An unexpected error occurred. Please try again.".into(),
        }
    }
}
