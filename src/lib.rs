#![doc = include_str!("../README.md")]

#[cfg(feature = "supabase")]
pub mod api;
#[cfg(feature = "supabase")]
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod login;
#[cfg(feature = "axum")]
pub mod middleware;
pub mod navigation;
pub mod provider;
pub mod session;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "supabase")]
pub use api::ApiClient;
#[cfg(feature = "supabase")]
pub use config::ConsoleConfig;
pub use context::{ConsoleSettings, SessionContext};
pub use error::Error;
pub use guard::{Decision, Page, RouteGuard, RouteParams, RouteTable};
pub use login::{Credentials, LoginError, LoginOutcome};
pub use navigation::{MenuItem, menu_for};
pub use provider::{AuthEvent, AuthEventKind, IdentityProvider, ProviderSession, ProviderUser};
#[cfg(feature = "supabase")]
pub use provider::supabase::{SupabaseClient, SupabaseConfig};
pub use session::{EventPump, Session, SessionChanges, SessionState, SessionStore};
pub use types::{AccessToken, Role, UserIdentity};
