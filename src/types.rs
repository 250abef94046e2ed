use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;
use crate::provider::ProviderUser;

/// Opaque access token issued by the identity provider.
///
/// `Debug` never prints the token itself, so sessions can be logged freely.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Console authorization level.
///
/// Decoding is strict: an unknown or missing role is an error, never a
/// downgrade to [`Role::Customer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Engineer,
    Customer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Engineer, Role::Customer];

    /// Wire representation (`"SUPER_ADMIN"`, `"ADMIN"`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::Admin => "ADMIN",
            Self::Engineer => "ENGINEER",
            Self::Customer => "CUSTOMER",
        }
    }

    /// Human-readable label shown in the sidebar footer.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER ADMIN",
            Self::Admin => "ADMIN",
            Self::Engineer => "ENGINEER",
            Self::Customer => "CUSTOMER",
        }
    }

    /// Root of the route subtree this role lands on after login.
    ///
    /// `SuperAdmin` and `Admin` share the admin console.
    #[must_use]
    pub fn home(self) -> &'static str {
        match self {
            Self::SuperAdmin | Self::Admin => "/admin",
            Self::Engineer => "/engineer",
            Self::Customer => "/customer",
        }
    }

    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| Error::InvalidRole(s.to_owned()))
    }
}

impl TryFrom<&str> for Role {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// The signed-in user as the console sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub login_time: OffsetDateTime,
}

impl UserIdentity {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        login_time: OffsetDateTime,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role,
            login_time,
        }
    }

    /// Builds an identity from provider-supplied user data.
    ///
    /// `name` falls back to the local part of the email, then to `"User"`.
    /// `role` has no fallback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingClaim`] if the metadata carries no role and
    /// [`Error::InvalidRole`] if the role is not one of the console roles.
    pub fn from_provider_user(
        user: &ProviderUser,
        login_time: OffsetDateTime,
    ) -> Result<Self, Error> {
        let role: Role = user
            .user_metadata
            .role
            .as_deref()
            .ok_or(Error::MissingClaim("role"))?
            .parse()?;

        let email = user.email.clone().unwrap_or_default();
        let name = user
            .user_metadata
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| email_local_part(&email).map(str::to_owned))
            .unwrap_or_else(|| "User".to_owned());

        Ok(Self {
            name,
            email,
            role,
            login_time,
        })
    }
}

pub(crate) fn email_local_part(email: &str) -> Option<&str> {
    email.split('@').next().filter(|local| !local.is_empty())
}
