//! Route guard.
//!
//! Translates policy decisions into navigation outcomes: an unauthenticated
//! visitor goes to the login page, an authenticated one lacking the
//! capability goes to their own profile. Never an error page.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::policy::{AuthorizationPolicy, Decision};
use crate::session::SessionManager;
use crate::types::Capability;

pub const LOGIN_ROUTE: &str = "/login";
pub const DASHBOARD_ROUTE: &str = "/dashboard";
pub const HOME_ROUTE: &str = "/dashboard/home";
pub const PROFILE_ROUTE: &str = "/dashboard/usuario";

/// Children of `/dashboard`. `:`-prefixed segments match any value.
const DASHBOARD_ROUTES: &[(&str, Capability)] = &[
    ("home", Capability::ViewDashboard),
    ("usuario", Capability::ViewProfile),
    ("usuario-admin", Capability::ManageUsers),
    ("expedientes", Capability::ManageCases),
    ("expedientes/nuevo", Capability::ManageCases),
    ("expedientes/editar/:id", Capability::ManageCases),
    ("amparos", Capability::ManageAmparos),
    ("amparos/nuevo", Capability::ManageAmparos),
    ("amparos/editar/:id", Capability::ManageAmparos),
    ("promociones", Capability::ManagePromotions),
    ("promociones/nuevo", Capability::ManagePromotions),
    ("promociones/editar/:id", Capability::ManagePromotions),
    ("partes", Capability::ManageParties),
    ("partes/nuevo", Capability::ManageParties),
    ("partes/editar/:id", Capability::ManageParties),
    ("notificacion", Capability::ManageNotifications),
    ("notificacion/nuevo", Capability::ManageNotifications),
    ("notificacion/editar/:id", Capability::ManageNotifications),
    ("notificacion/ver/:id", Capability::ManageNotifications),
    ("firma-documentos", Capability::SignDocument),
];

/// Where a denied or unroutable navigation is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectTarget {
    Login,
    Dashboard,
    Home,
    Profile,
}

impl RedirectTarget {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Login => LOGIN_ROUTE,
            Self::Dashboard => DASHBOARD_ROUTE,
            Self::Home => HOME_ROUTE,
            Self::Profile => PROFILE_ROUTE,
        }
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardDecision {
    Allow,
    Redirect(RedirectTarget),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    fn from_policy(decision: Decision) -> Self {
        match decision {
            Decision::Allow => Self::Allow,
            Decision::DenyUnauthenticated => Self::Redirect(RedirectTarget::Login),
            Decision::DenyForbidden => Self::Redirect(RedirectTarget::Profile),
        }
    }
}

/// Resolved meaning of a route path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Reachable without a session.
    Public,
    /// Known route requiring a capability.
    Protected(Capability),
    /// Unknown child of `/dashboard`.
    UnknownDashboard,
    /// The empty path.
    Root,
    /// Anything else.
    Unknown,
}

/// Resolve a route path (query and fragment ignored).
pub fn resolve_route(path: &str) -> Route {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] => Route::Root,
        ["login"] => Route::Public,
        ["dashboard"] => Route::Protected(Capability::ViewDashboard),
        ["dashboard", rest @ ..] => DASHBOARD_ROUTES
            .iter()
            .find(|(pattern, _)| matches_pattern(pattern, rest))
            .map(|(_, capability)| Route::Protected(*capability))
            .unwrap_or(Route::UnknownDashboard),
        _ => Route::Unknown,
    }
}

/// Capability a known protected route requires.
pub fn capability_for_path(path: &str) -> Option<Capability> {
    match resolve_route(path) {
        Route::Protected(capability) => Some(capability),
        _ => None,
    }
}

fn matches_pattern(pattern: &str, segments: &[&str]) -> bool {
    let parts: Vec<&str> = pattern.split('/').collect();
    parts.len() == segments.len()
        && parts
            .iter()
            .zip(segments)
            .all(|(p, s)| p.starts_with(':') || p == s)
}

/// Guard evaluated before entering a protected view or action.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: Arc<SessionManager>,
    policy: AuthorizationPolicy,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            policy: AuthorizationPolicy,
        }
    }

    /// Decide whether the current session may enter a view requiring
    /// `capability`.
    pub fn guard(&self, capability: Capability) -> GuardDecision {
        let session = self.session.current_session();
        let decision =
            GuardDecision::from_policy(self.policy.decide(session.as_ref(), capability));

        if let GuardDecision::Redirect(target) = decision {
            debug!(capability = %capability, redirect = %target, "route guard redirect");
        }
        decision
    }

    /// Guard navigation to `path`.
    ///
    /// Unknown dashboard children send authenticated users home; any other
    /// unknown path goes to the dashboard. Both still require a session.
    pub fn guard_path(&self, path: &str) -> GuardDecision {
        match resolve_route(path) {
            Route::Public => GuardDecision::Allow,
            Route::Root => GuardDecision::Redirect(RedirectTarget::Login),
            Route::Protected(capability) => self.guard(capability),
            Route::UnknownDashboard => self.redirect_if_authenticated(RedirectTarget::Home),
            Route::Unknown => self.redirect_if_authenticated(RedirectTarget::Dashboard),
        }
    }

    fn redirect_if_authenticated(&self, target: RedirectTarget) -> GuardDecision {
        match self.guard(Capability::ViewDashboard) {
            GuardDecision::Allow => GuardDecision::Redirect(target),
            denied => denied,
        }
    }
}
