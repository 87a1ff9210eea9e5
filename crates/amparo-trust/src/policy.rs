//! Authorization policy: the single place where roles map to capabilities.
//!
//! Both the route guard and the signing workflow consult [`decide`]; no other
//! module compares role names.

use serde::Serialize;

use crate::types::{Capability, Role, Session};

/// Outcome of an authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    DenyUnauthenticated,
    DenyForbidden,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Capabilities withheld from the operator role.
const OPERATOR_EXCLUDED: &[Capability] = &[Capability::ManageUsers, Capability::SignDocument];

/// Decide whether `session` may use `capability`.
///
/// 1. No session, or a session not marked authenticated: `DenyUnauthenticated`.
/// 2. `Operador` asking for user management or document signing: `DenyForbidden`.
/// 3. Anything else: `Allow`.
pub fn decide(session: Option<&Session>, capability: Capability) -> Decision {
    let session = match session {
        Some(session) if session.authenticated => session,
        _ => return Decision::DenyUnauthenticated,
    };

    // Compared by name so `Role::Other("operador")` cannot slip past.
    let role = Role::from_name(session.principal.role.name());
    if role == Role::Operador && OPERATOR_EXCLUDED.contains(&capability) {
        return Decision::DenyForbidden;
    }

    Decision::Allow
}

/// Stateless handle over [`decide`] for injection into consumers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationPolicy;

impl AuthorizationPolicy {
    pub fn decide(&self, session: Option<&Session>, capability: Capability) -> Decision {
        decide(session, capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Principal;

    fn session(role: Role) -> Session {
        Session::new(Principal::new("1", "Test User", role, 1), "tok")
    }

    #[test]
    fn test_no_session_is_unauthenticated() {
        for capability in Capability::ALL {
            assert_eq!(decide(None, capability), Decision::DenyUnauthenticated);
        }
    }

    #[test]
    fn test_unauthenticated_flag_is_unauthenticated() {
        let mut s = session(Role::Administrador);
        s.authenticated = false;
        assert_eq!(
            decide(Some(&s), Capability::ViewDashboard),
            Decision::DenyUnauthenticated
        );
    }

    #[test]
    fn test_operator_cannot_sign_or_manage_users() {
        let s = session(Role::Operador);
        assert_eq!(
            decide(Some(&s), Capability::SignDocument),
            Decision::DenyForbidden
        );
        assert_eq!(
            decide(Some(&s), Capability::ManageUsers),
            Decision::DenyForbidden
        );
    }

    #[test]
    fn test_operator_keeps_everything_else() {
        let s = session(Role::Operador);
        for capability in Capability::ALL {
            if OPERATOR_EXCLUDED.contains(&capability) {
                continue;
            }
            assert_eq!(decide(Some(&s), capability), Decision::Allow, "{}", capability);
        }
    }

    #[test]
    fn test_administrator_allowed_everything() {
        let s = session(Role::Administrador);
        for capability in Capability::ALL {
            assert_eq!(decide(Some(&s), capability), Decision::Allow);
        }
    }

    #[test]
    fn test_role_match_ignores_case() {
        let s = session(Role::from_name("OPERADOR"));
        assert_eq!(
            decide(Some(&s), Capability::SignDocument),
            Decision::DenyForbidden
        );
    }

    #[test]
    fn test_operator_named_other_role_is_forbidden() {
        for name in ["Operador", " operador "] {
            let s = session(Role::Other(name.to_string()));
            assert_eq!(
                decide(Some(&s), Capability::SignDocument),
                Decision::DenyForbidden,
                "{name}"
            );
            assert_eq!(
                decide(Some(&s), Capability::ManageUsers),
                Decision::DenyForbidden
            );
            assert_eq!(decide(Some(&s), Capability::ViewDashboard), Decision::Allow);
        }
    }

    #[test]
    fn test_other_roles_follow_default_allow() {
        let s = session(Role::from_name("Consulta"));
        assert_eq!(decide(Some(&s), Capability::SignDocument), Decision::Allow);
    }
}
