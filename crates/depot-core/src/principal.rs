//! # Caller Principals
//!
//! The identity provider is an external collaborator; this module only
//! fixes the shape of what it hands us: a user id and one of four roles.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::identity::{TellerId, UserId};

/// Roles recognised by the custody service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access, including the audited forced-return override.
    Admin,
    /// Creates deployments, dispatches them and finalizes returns.
    Declarator,
    /// Read access to deployments and dashboards.
    Supervisor,
    /// Field staff; acknowledges and completes their own assignments.
    Teller,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Declarator => "declarator",
            Self::Supervisor => "supervisor",
            Self::Teller => "teller",
        }
    }

    /// Parse a role name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "declarator" => Some(Self::Declarator),
            "supervisor" => Some(Self::Supervisor),
            "teller" => Some(Self::Teller),
            _ => None,
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
        }
    }

    /// Admins and declarators manage the deployment lifecycle.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Declarator)
    }

    /// Everyone except tellers may read any deployment.
    pub fn can_read_all(&self) -> bool {
        !matches!(self.role, Role::Teller)
    }

    /// Whether this caller is the teller `teller`.
    pub fn is_teller(&self, teller: &TellerId) -> bool {
        self.role == Role::Teller && self.user_id.as_str() == teller.as_str()
    }
}
