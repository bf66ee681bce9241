//! # Identifier Newtypes
//!
//! Newtype wrappers for every identifier in the custody domain. These
//! prevent accidental identifier confusion: a `TellerId` cannot be passed
//! where an `AssetId` is expected.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::AssetKind;
use crate::error::ValidationError;

/// Unique identifier for a deployment (an equipment loan record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[schema(value_type = String, format = Uuid)]
pub struct DeploymentId(pub Uuid);

/// Identifier of a physical asset, unique per deployment, kind and sequence.
///
/// Format: `{first 8 hex chars of the deployment id}-{KIND}-{seq:03}`,
/// e.g. `3f2a9c1e-PRN-001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[schema(value_type = String)]
pub struct AssetId(pub String);

/// Identifier of a field teller, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[schema(value_type = String)]
pub struct TellerId(pub String);

/// Identifier of any authenticated user (admin, declarator, supervisor, teller).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[schema(value_type = String)]
pub struct UserId(pub String);

impl DeploymentId {
    /// Generate a new random deployment identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The first eight hex characters, used as the asset id prefix.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for DeploymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for DeploymentId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidIdentifier(s.to_string()))
    }
}

impl AssetId {
    /// Compose the asset id for the `seq`-th asset of `kind` in a deployment.
    pub fn compose(deployment: &DeploymentId, kind: AssetKind, seq: usize) -> Self {
        Self(format!("{}-{}-{:03}", deployment.short(), kind.code(), seq))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TellerId {
    /// Create a teller id, rejecting blank values.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty("tellerId"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl UserId {
    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// View this user as a teller id (tellers authenticate with their teller id).
    pub fn as_teller(&self) -> TellerId {
        TellerId(self.0.clone())
    }
}

impl From<&str> for TellerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for TellerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
