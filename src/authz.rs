// src/authz.rs

use crate::error::AuthError;
use crate::identity::Identity;
use std::collections::HashSet;

/// A non-empty ANY-of set of acceptable role names.
///
/// Emptiness is rejected at construction: an operation guarded by zero roles
/// is a configuration mistake, not an allow-all.
#[derive(Debug, Clone)]
pub struct RequiredRoles {
    roles: HashSet<String>,
}

impl RequiredRoles {
    pub fn any_of<I, S>(roles: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: HashSet<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "a required-role set must not be empty".to_string(),
            ));
        }
        Ok(Self { roles })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    /// The required names as a sorted list, for deny reasons and logs.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roles.iter().cloned().collect();
        names.sort();
        names
    }
}

/// Why an authorization decision came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    /// One of the required roles was held. Carries the matching role.
    RoleSatisfied(String),
    /// None of the required roles were held. Carries the attempted
    /// required-role set; it names the operation's requirement, not anything
    /// about the token, so it is safe to log and to surface.
    RolesMissing { required: Vec<String> },
}

/// The outcome of checking an identity against a required-role set.
/// Request-scoped; not persisted.
#[derive(Debug, Clone)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

/// Decides access: allow iff the identity holds at least one required role.
///
/// There is no admin bypass and no role hierarchy; exactly the intersection
/// rule, nothing else.
pub fn authorize(identity: &Identity, required: &RequiredRoles) -> AuthorizationDecision {
    match required.iter().find(|role| identity.has_role(role)) {
        Some(role) => AuthorizationDecision {
            allowed: true,
            reason: DecisionReason::RoleSatisfied(role.to_string()),
        },
        None => AuthorizationDecision {
            allowed: false,
            reason: DecisionReason::RolesMissing {
                required: required.to_sorted_vec(),
            },
        },
    }
}

/// A reusable guard for one protected operation.
///
/// Construct once with the operation's required roles, then run
/// [`check`](RoleGuard::check) against each authenticated identity. The
/// guard consumes and returns the identity so it composes as a pipeline
/// stage between authentication and the operation itself.
#[derive(Debug, Clone)]
pub struct RoleGuard {
    required: RequiredRoles,
}

impl RoleGuard {
    pub fn new<I, S>(roles: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            required: RequiredRoles::any_of(roles)?,
        })
    }

    pub fn required(&self) -> &RequiredRoles {
        &self.required
    }

    /// Passes the identity through if it holds one of the required roles,
    /// otherwise returns [`AuthError::Forbidden`] carrying the requirement.
    pub fn check(&self, identity: Identity) -> Result<Identity, AuthError> {
        let decision = authorize(&identity, &self.required);
        if decision.allowed {
            Ok(identity)
        } else {
            Err(AuthError::Forbidden {
                required: self.required.to_sorted_vec(),
            })
        }
    }
}
