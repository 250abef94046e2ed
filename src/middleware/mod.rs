//! Route guard and login endpoints for serving the console over Axum.
//!
//! Each browser gets its own console session, keyed by an encrypted session
//! cookie and held in [`ClientSessions`]. Every page request is checked
//! against the caller's session: bootstrapping sessions get a `503`
//! placeholder, signed-out visitors are sent to the login page, and pages
//! outside the user's role answer `404`. Rendered pages receive the
//! signed-in user through [`CurrentUser`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use prosupport_session::ConsoleConfig;
//! use prosupport_session::middleware::{CurrentUser, console_router};
//!
//! let sessions = ConsoleConfig::from_env()?.client_sessions()?;
//!
//! let pages = axum::Router::new()
//!     .route("/login", get(login_page))
//!     .route("/admin", get(admin_dashboard));
//!
//! let app = console_router(pages, sessions);
//! ```

mod cookies;
mod error;
mod extractor;
mod guard;
mod routes;
mod state;

pub use cookies::CookieSettings;
pub use error::AuthError;
pub use extractor::CurrentUser;
pub use guard::{LOADING_PLACEHOLDER, route_guard};
pub use routes::{auth_routes, console_router};
pub use state::ClientSessions;
