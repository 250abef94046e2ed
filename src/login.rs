//! Password sign-in: form validation, provider call, store update.

use time::OffsetDateTime;

use crate::error::Error;
use crate::provider::IdentityProvider;
use crate::session::{SessionStore, authenticate};
use crate::types::{AccessToken, Role, UserIdentity};

/// Login failures, phrased for the login form's error banner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("Email is required")]
    EmailRequired,
    #[error("Enter a valid email address")]
    InvalidEmail,
    #[error("Password is required")]
    PasswordRequired,
    /// The provider refused the credentials; carries its message.
    #[error("{0}")]
    Rejected(String),
    #[error("An unexpected error occurred. Please try again.")]
    Unexpected,
}

impl LoginError {
    /// True for errors attached to a single form field rather than the banner.
    #[must_use]
    pub fn is_field_error(&self) -> bool {
        matches!(
            self,
            Self::EmailRequired | Self::InvalidEmail | Self::PasswordRequired
        )
    }
}

impl From<Error> for LoginError {
    fn from(e: Error) -> Self {
        match e {
            Error::Provider {
                status: Some(_), ..
            }
            | Error::InvalidRole(_)
            | Error::MissingClaim(_) => Self::Rejected(e.user_message()),
            _ => Self::Unexpected,
        }
    }
}

/// Validated email and password pair.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// # Errors
    ///
    /// Returns the first failing field check, email before password.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Result<Self, LoginError> {
        let email = email.into();
        let password = password.into();

        if email.is_empty() {
            return Err(LoginError::EmailRequired);
        }
        if !is_valid_email(&email) {
            return Err(LoginError::InvalidEmail);
        }
        if password.is_empty() {
            return Err(LoginError::PasswordRequired);
        }

        Ok(Self { email, password })
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Checks the `local@domain.tld` shape the login form accepts.
///
/// - No whitespace anywhere
/// - Exactly one `@` with a non-empty local part
/// - A `.` inside the domain with characters on both sides
#[must_use]
pub fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Built-in accounts accepted when dev login is enabled and the provider
/// rejects the credentials.
#[derive(Debug, Clone, Copy)]
pub struct DevAccount {
    pub email: &'static str,
    pub password: &'static str,
    pub name: &'static str,
    pub role: Role,
    pub token: &'static str,
}

pub const DEV_ACCOUNTS: &[DevAccount] = &[
    DevAccount {
        email: "admin@example.com",
        password: "admin123",
        name: "Admin User",
        role: Role::Admin,
        token: "mock-admin-token",
    },
    DevAccount {
        email: "engineer@example.com",
        password: "engineer123",
        name: "Technical Engineer",
        role: Role::Engineer,
        token: "mock-engineer-token",
    },
];

fn find_dev_account(credentials: &Credentials) -> Option<&'static DevAccount> {
    DEV_ACCOUNTS
        .iter()
        .find(|a| a.email == credentials.email && a.password == credentials.password)
}

/// Where a successful login lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct LoginOutcome {
    pub role: Role,
    pub redirect: &'static str,
}

impl LoginOutcome {
    fn for_role(role: Role) -> Self {
        Self {
            role,
            redirect: role.home(),
        }
    }
}

/// Signs in with the provider and records the session locally.
///
/// The local write happens right away rather than waiting for the
/// provider's `SignedIn` event; both carry the same session, so whichever
/// lands second is a no-op in effect.
///
/// # Errors
///
/// Returns [`LoginError::Rejected`] with the provider's message when the
/// credentials are refused (or the account has no console role) and
/// [`LoginError::Unexpected`] for transport failures. The store is left
/// untouched on error. A provider session for an account without a console
/// role is revoked before returning.
pub async fn sign_in<P: IdentityProvider>(
    provider: &P,
    store: &SessionStore,
    credentials: &Credentials,
    dev_login_enabled: bool,
) -> Result<LoginOutcome, LoginError> {
    let provider_error = match provider.sign_in_with_password(credentials).await {
        Ok(session) => {
            let auth = match authenticate(&session, None) {
                Ok(auth) => auth,
                Err(e) => {
                    tracing::warn!(error = %e, "Signed-in account has no console identity, revoking");
                    if let Err(revoke) = provider.revoke_session(&session).await {
                        tracing::warn!(error = %revoke, "Revoking rejected session failed");
                    }
                    return Err(e.into());
                }
            };
            let role = auth.user().role;
            store.login(auth.token().clone(), auth.user().clone());
            return Ok(LoginOutcome::for_role(role));
        }
        Err(e) => e,
    };

    if dev_login_enabled {
        if let Some(account) = find_dev_account(credentials) {
            tracing::warn!(email = %account.email, "Provider rejected sign-in, using dev account");
            store.login(
                AccessToken::new(account.token),
                UserIdentity::new(
                    account.name,
                    account.email,
                    account.role,
                    OffsetDateTime::now_utc(),
                ),
            );
            return Ok(LoginOutcome::for_role(account.role));
        }
    }

    match &provider_error {
        Error::Provider {
            status: Some(_), ..
        } => tracing::info!(error = %provider_error, "Sign-in rejected"),
        _ => tracing::error!(error = %provider_error, "Sign-in failed"),
    }
    Err(provider_error.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::provider::mock::MockIdentityProvider;
    use crate::session::SessionState;

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials::new(email, password).unwrap()
    }

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("dana@acme.io"));
        assert!(is_valid_email("ops.lead+oncall@mail.acme.co.uk"));
        assert!(is_valid_email("a@b.c"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email("dana"));
        assert!(!is_valid_email("@acme.io"));
        assert!(!is_valid_email("dana@acme"));
        assert!(!is_valid_email("dana@.io"));
        assert!(!is_valid_email("dana@acme."));
        assert!(!is_valid_email("da na@acme.io"));
        assert!(!is_valid_email("dana@ac@me.io"));
    }

    #[test]
    fn test_credentials_field_order() {
        assert_eq!(Credentials::new("", "").unwrap_err(), LoginError::EmailRequired);
        assert_eq!(Credentials::new("nope", "").unwrap_err(), LoginError::InvalidEmail);
        assert_eq!(
            Credentials::new("dana@acme.io", "").unwrap_err(),
            LoginError::PasswordRequired
        );
        assert!(LoginError::PasswordRequired.is_field_error());
        assert!(!LoginError::Unexpected.is_field_error());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let debug = format!("{:?}", creds("dana@acme.io", "hunter22"));
        assert!(debug.contains("dana@acme.io"));
        assert!(!debug.contains("hunter22"));
    }

    #[tokio::test]
    async fn test_sign_in_records_session_and_routes_by_role() {
        let provider = MockIdentityProvider::new().with_account(
            "dana@acme.io",
            "pw",
            Some("Dana"),
            Some("ENGINEER"),
        );
        let store = SessionStore::new();

        let outcome = sign_in(&provider, &store, &creds("dana@acme.io", "pw"), false)
            .await
            .unwrap();

        assert_eq!(outcome.role, Role::Engineer);
        assert_eq!(outcome.redirect, "/engineer");
        let session = store.snapshot();
        assert_eq!(session.user().unwrap().name, "Dana");
        assert!(session.token().is_some());
    }

    #[tokio::test]
    async fn test_sign_in_name_defaults_to_email_local_part() {
        let provider =
            MockIdentityProvider::new().with_account("ops@acme.io", "pw", None, Some("ADMIN"));
        let store = SessionStore::new();

        let outcome = sign_in(&provider, &store, &creds("ops@acme.io", "pw"), false)
            .await
            .unwrap();

        assert_eq!(outcome.redirect, "/admin");
        assert_eq!(store.snapshot().user().unwrap().name, "ops");
    }

    #[tokio::test]
    async fn test_rejected_sign_in_leaves_store_unchanged() {
        let provider =
            MockIdentityProvider::new().with_account("dana@acme.io", "pw", None, Some("ADMIN"));
        let store = SessionStore::new();
        let before = store.snapshot();

        let err = sign_in(&provider, &store, &creds("dana@acme.io", "wrong"), false)
            .await
            .unwrap_err();

        assert_eq!(err, LoginError::Rejected("Invalid login credentials".into()));
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_account_without_role_is_rejected() {
        let provider = MockIdentityProvider::new().with_account("dana@acme.io", "pw", None, None);
        let store = SessionStore::new();

        let err = sign_in(&provider, &store, &creds("dana@acme.io", "pw"), false)
            .await
            .unwrap_err();

        assert!(matches!(err, LoginError::Rejected(_)));
        assert!(store.snapshot().token().is_none());
    }

    #[tokio::test]
    async fn test_role_less_sign_in_keeps_current_session() {
        let provider = MockIdentityProvider::new()
            .with_account("root@acme.io", "pw", Some("Root"), Some("ADMIN"))
            .with_account("norole@acme.io", "pw", None, None);
        let store = Arc::new(SessionStore::new());
        let _pump = store.start(&provider).await;

        sign_in(&provider, &store, &creds("root@acme.io", "pw"), false)
            .await
            .unwrap();
        let before = store.snapshot();

        let err = sign_in(&provider, &store, &creds("norole@acme.io", "pw"), false)
            .await
            .unwrap_err();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            err,
            LoginError::Rejected("Your account has no console role assigned.".into())
        );
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.state(), SessionState::Authenticated(Role::Admin));
        assert!(provider.current_session().is_none());
        assert_eq!(provider.revoked_tokens().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_unexpected() {
        let provider = MockIdentityProvider::new()
            .with_account("dana@acme.io", "pw", None, Some("ADMIN"))
            .fail_sign_in("connection refused");
        let store = SessionStore::new();

        let err = sign_in(&provider, &store, &creds("dana@acme.io", "pw"), false)
            .await
            .unwrap_err();

        assert_eq!(err, LoginError::Unexpected);
    }

    #[tokio::test]
    async fn test_dev_account_fallback_only_when_enabled() {
        let provider = MockIdentityProvider::new();
        let store = SessionStore::new();
        let demo = creds("engineer@example.com", "engineer123");

        assert!(sign_in(&provider, &store, &demo, false).await.is_err());
        assert_eq!(store.snapshot().state(), SessionState::Bootstrapping);

        let outcome = sign_in(&provider, &store, &demo, true).await.unwrap();
        assert_eq!(outcome.redirect, "/engineer");
        let session = store.snapshot();
        assert_eq!(session.token().unwrap().as_str(), "mock-engineer-token");
        assert_eq!(session.user().unwrap().name, "Technical Engineer");
    }

    #[tokio::test]
    async fn test_dev_fallback_requires_matching_password() {
        let provider = MockIdentityProvider::new();
        let store = SessionStore::new();

        let err = sign_in(&provider, &store, &creds("admin@example.com", "nope"), true)
            .await
            .unwrap_err();

        assert!(matches!(err, LoginError::Rejected(_)));
    }
}
