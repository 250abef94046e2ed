//! Sidebar menus per role.

use crate::guard::normalize_path;
use crate::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    pub name: &'static str,
    pub path: &'static str,
}

const fn item(name: &'static str, path: &'static str) -> MenuItem {
    MenuItem { name, path }
}

const ADMIN_MENU: &[MenuItem] = &[
    item("Dashboard", "/admin"),
    item("Users", "/admin/users"),
    item("Customers", "/admin/customers"),
    item("Projects", "/admin/projects"),
    item("Sites", "/admin/sites"),
    item("Tickets", "/admin/tickets"),
    item("Bulk Upload", "/admin/bulk"),
];

const ENGINEER_MENU: &[MenuItem] = &[
    item("Dashboard", "/engineer"),
    item("My Tickets", "/engineer/tickets"),
];

const CUSTOMER_MENU: &[MenuItem] = &[
    item("Dashboard", "/customer"),
    item("Raise Ticket", "/customer/create-ticket"),
    item("My Tickets", "/customer/tickets"),
];

#[must_use]
pub fn menu_for(role: Role) -> &'static [MenuItem] {
    match role {
        Role::SuperAdmin | Role::Admin => ADMIN_MENU,
        Role::Engineer => ENGINEER_MENU,
        Role::Customer => CUSTOMER_MENU,
    }
}

/// The menu entry highlighted for `path` (exact match only).
#[must_use]
pub fn active_item(role: Role, path: &str) -> Option<&'static MenuItem> {
    let path = normalize_path(path);
    menu_for(role).iter().find(|m| m.path == path)
}
