//! Caller identity and role, as seen by the lifecycle.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Analyst,
    /// Lab administrators and technical directors; may approve directly.
    Administrator,
}

impl Role {
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Administrator)
    }
}

/// Answers who is acting and whether they hold a privileged role.
///
/// Injected into [`SeedLab`](crate::SeedLab) rather than read from ambient
/// state, so each request can be served with its own authority.
pub trait RoleAuthority: Send + Sync {
    fn current_actor(&self) -> String;

    fn current_actor_has_privileged_role(&self) -> bool;
}

/// A fixed actor with a fixed role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoleAuthority {
    actor: String,
    role: Role,
}

impl StaticRoleAuthority {
    pub fn new(actor: impl Into<String>, role: Role) -> Self {
        Self {
            actor: actor.into(),
            role,
        }
    }

    pub fn analyst(actor: impl Into<String>) -> Self {
        Self::new(actor, Role::Analyst)
    }

    pub fn administrator(actor: impl Into<String>) -> Self {
        Self::new(actor, Role::Administrator)
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl RoleAuthority for StaticRoleAuthority {
    fn current_actor(&self) -> String {
        self.actor.clone()
    }

    fn current_actor_has_privileged_role(&self) -> bool {
        self.role.is_privileged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_administrators_are_privileged() {
        assert!(!StaticRoleAuthority::analyst("ana").current_actor_has_privileged_role());
        assert!(StaticRoleAuthority::administrator("dir").current_actor_has_privileged_role());
        assert_eq!(StaticRoleAuthority::analyst("ana").current_actor(), "ana");
    }
}
