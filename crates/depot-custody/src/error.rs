//! # Custody Errors
//!
//! One error type for every custody operation. Each variant has a stable
//! `code()` used on the wire and a `kind()` used as bulk failure reasons.

use thiserror::Error;

use depot_core::{AssetId, DeploymentId, ValidationError};
use depot_state::{AssetError, AssetStatus, DeploymentError};

use crate::export::ExportError;
use crate::token::TokenError;

/// Errors returned by the custody services.
#[derive(Error, Debug)]
pub enum CustodyError {
    /// Malformed input, rejected before any mutation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The identity token could not be decoded.
    #[error("malformed identity token: {0}")]
    MalformedToken(#[from] TokenError),

    #[error("deployment {0} not found")]
    NotFound(DeploymentId),

    /// No asset matches the token's deployment and asset id.
    #[error("unknown asset {0}")]
    UnknownAsset(String),

    /// The token's seed does not match the asset's registered seed.
    #[error("identity token does not match asset {0}")]
    SeedMismatch(AssetId),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("asset {asset_id} already settled as {status}")]
    AlreadyReturned {
        asset_id: AssetId,
        status: AssetStatus,
    },

    #[error("{0}")]
    InvalidState(String),

    #[error("asset id {0} already exists")]
    DuplicateAssetId(AssetId),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CustodyError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::MalformedToken(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnknownAsset(_) => "UNKNOWN_ASSET",
            Self::SeedMismatch(_) => "SEED_MISMATCH",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::PreconditionFailed(_) => "PRECONDITION_FAILED",
            Self::AlreadyReturned { .. } => "ALREADY_RETURNED",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::DuplicateAssetId(_) => "DUPLICATE_ASSET_ID",
            Self::Export(_) => "EXPORT_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Error kind name, as reported per item by bulk operations.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::MalformedToken(_) => "MalformedToken",
            Self::NotFound(_) => "NotFound",
            Self::UnknownAsset(_) => "UnknownAsset",
            Self::SeedMismatch(_) => "SeedMismatch",
            Self::Forbidden(_) => "Forbidden",
            Self::InvalidTransition(_) => "InvalidTransition",
            Self::PreconditionFailed(_) => "PreconditionFailed",
            Self::AlreadyReturned { .. } => "AlreadyReturned",
            Self::InvalidState(_) => "InvalidState",
            Self::DuplicateAssetId(_) => "DuplicateAssetId",
            Self::Export(_) => "ExportError",
            Self::Internal(_) => "Internal",
        }
    }

    pub(crate) fn forbidden(action: &str) -> Self {
        Self::Forbidden(format!("not permitted to {action}"))
    }
}

impl From<AssetError> for CustodyError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::AlreadyReturned { asset_id, status } => {
                Self::AlreadyReturned { asset_id, status }
            }
            other @ AssetError::InvalidState { .. } => Self::InvalidState(other.to_string()),
        }
    }
}

impl From<DeploymentError> for CustodyError {
    fn from(err: DeploymentError) -> Self {
        match err {
            DeploymentError::InvalidTransition { .. } | DeploymentError::TerminalState { .. } => {
                Self::InvalidTransition(err.to_string())
            }
            DeploymentError::UnknownTeller(_) => Self::Forbidden(err.to_string()),
            DeploymentError::NotAcknowledged(_) | DeploymentError::IncompleteTellers { .. } => {
                Self::PreconditionFailed(err.to_string())
            }
            DeploymentError::Validation(e) => Self::Validation(e),
            DeploymentError::Asset(e) => e.into(),
        }
    }
}
