//! Route guard: maps the current session and a requested path to what the
//! console should do.
//!
//! The guard is stateless. Rules are evaluated in order and the first match
//! wins:
//!
//! 1. Still bootstrapping → [`Decision::Loading`]
//! 2. Anonymous, not on the login page → redirect to login
//! 3. Anonymous, on the login page → [`Decision::RenderLogin`]
//! 4. Signed in, on the login page → redirect to the role's home
//! 5. Signed in → `/` redirects home, a path in the role's route table
//!    renders, anything else is [`Decision::NoMatch`]

use std::collections::HashMap;

use crate::session::Session;
use crate::types::Role;

pub const LOGIN_PATH: &str = "/login";

/// Console screens reachable through the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    AdminDashboard,
    Users,
    Customers,
    Projects,
    Sites,
    AdminTickets,
    TicketDetail,
    BulkUpload,
    EngineerDashboard,
    EngineerTickets,
    CustomerDashboard,
    RaiseTicket,
    CustomerTickets,
}

/// A path pattern (`/tickets/:id`) bound to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pattern: String,
    page: Page,
}

impl Route {
    #[must_use]
    pub fn new(pattern: impl Into<String>, page: Page) -> Self {
        Self {
            pattern: pattern.into(),
            page,
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn page(&self) -> Page {
        self.page
    }

    /// Matches a normalized path, capturing `:name` segments.
    fn matches(&self, path: &str) -> Option<RouteParams> {
        let mut pattern = segments(&self.pattern);
        let mut actual = segments(path);
        let mut params = RouteParams::default();

        loop {
            match (pattern.next(), actual.next()) {
                (None, None) => return Some(params),
                (Some(p), Some(a)) => {
                    if let Some(name) = p.strip_prefix(':') {
                        params.0.push((name.to_owned(), a.to_owned()));
                    } else if p != a {
                        return None;
                    }
                }
                _ => return None,
            }
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Values captured from `:name` pattern segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(Vec<(String, String)>);

impl RouteParams {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ordered routes per role.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<Role, Vec<Route>>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the routes for `role`, replacing any previous ones.
    #[must_use]
    pub fn with_routes(mut self, role: Role, routes: Vec<Route>) -> Self {
        self.routes.insert(role, routes);
        self
    }

    /// The ProSupport console's routes.
    #[must_use]
    pub fn console() -> Self {
        let admin = vec![
            Route::new("/admin", Page::AdminDashboard),
            Route::new("/admin/users", Page::Users),
            Route::new("/admin/customers", Page::Customers),
            Route::new("/admin/projects", Page::Projects),
            Route::new("/admin/sites", Page::Sites),
            Route::new("/admin/tickets", Page::AdminTickets),
            Route::new("/tickets/:id", Page::TicketDetail),
            Route::new("/admin/bulk", Page::BulkUpload),
        ];
        let engineer = vec![
            Route::new("/engineer", Page::EngineerDashboard),
            Route::new("/engineer/tickets", Page::EngineerTickets),
        ];
        let customer = vec![
            Route::new("/customer", Page::CustomerDashboard),
            Route::new("/customer/create-ticket", Page::RaiseTicket),
            Route::new("/customer/tickets", Page::CustomerTickets),
        ];

        Self::new()
            .with_routes(Role::SuperAdmin, admin.clone())
            .with_routes(Role::Admin, admin)
            .with_routes(Role::Engineer, engineer)
            .with_routes(Role::Customer, customer)
    }

    #[must_use]
    pub fn routes(&self, role: Role) -> &[Route] {
        self.routes.get(&role).map(Vec::as_slice).unwrap_or_default()
    }

    /// First route of `role` matching `path`.
    #[must_use]
    pub fn resolve(&self, role: Role, path: &str) -> Option<(Page, RouteParams)> {
        let path = normalize_path(path);
        self.routes(role)
            .iter()
            .find_map(|route| route.matches(path).map(|params| (route.page, params)))
    }
}

/// Outcome of evaluating the guard for one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Session not resolved yet; show the placeholder.
    Loading,
    RenderLogin,
    Redirect(String),
    Render { page: Page, params: RouteParams },
    /// Signed in, but the path is not in the role's table.
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    table: RouteTable,
    login_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::console()
    }
}

impl RouteGuard {
    #[must_use]
    pub fn new(table: RouteTable) -> Self {
        Self {
            table,
            login_path: LOGIN_PATH.into(),
        }
    }

    #[must_use]
    pub fn console() -> Self {
        Self::new(RouteTable::console())
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    #[must_use]
    pub fn decide(&self, session: &Session, path: &str) -> Decision {
        if session.is_loading() {
            return Decision::Loading;
        }

        let path = normalize_path(path);
        let on_login = path == normalize_path(&self.login_path);

        let Some(role) = session.role() else {
            return if on_login {
                Decision::RenderLogin
            } else {
                Decision::Redirect(self.login_path.clone())
            };
        };

        if on_login || path == "/" {
            return Decision::Redirect(role.home().to_owned());
        }

        match self.table.resolve(role, path) {
            Some((page, params)) => Decision::Render { page, params },
            None => {
                tracing::debug!(%role, path, "No route for role");
                Decision::NoMatch
            }
        }
    }
}

/// Drops query and fragment and any trailing slash; empty becomes `/`.
#[must_use]
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}
