//! Caller identity supplied by the external identity service.
//!
//! Sessions and credentials are issued elsewhere; this module only verifies
//! the bearer token and turns its claims into an [`AuthorizationContext`].

pub mod jwt;

use serde::{Deserialize, Serialize};

pub use jwt::{Claims, JwtVerifier};

/// Role of an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Operates across all schools; bypasses ownership scope checks
    SystemAdmin,
    SchoolAdmin,
    Teacher,
    Staff,
}

impl Role {
    pub fn is_system_admin(&self) -> bool {
        matches!(self, Role::SystemAdmin)
    }
}

/// Who is asking, built fresh for every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    pub user_id: String,
    pub role: Role,
    /// Owning organization (school id) the caller belongs to
    pub scope: Option<String>,
}

impl AuthorizationContext {
    pub fn new(user_id: impl Into<String>, role: Role, scope: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            scope,
        }
    }

    /// Whether the caller may read a resource owned by `owner_scope`
    pub fn can_access(&self, owner_scope: Option<&str>) -> bool {
        if self.role.is_system_admin() {
            return true;
        }

        match (self.scope.as_deref(), owner_scope) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }
}
