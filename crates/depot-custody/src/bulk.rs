//! # Bulk Operations
//!
//! Applies one deployment operation to many ids. Each id is its own
//! all-or-nothing conditional write; a failure on one id never rolls back
//! or blocks the others. The result lists what succeeded and why the rest
//! failed.

use std::collections::HashSet;

use serde::Serialize;
use utoipa::ToSchema;

use depot_core::{DeploymentId, Principal, ReturnCondition, ValidationError};
use depot_state::DeploymentStatus;

use crate::access;
use crate::error::CustodyError;
use crate::manager::{DeploymentManager, ReturnRequest};

/// One id that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub id: DeploymentId,
    /// Error kind, e.g. `InvalidTransition`.
    pub reason: String,
    pub message: String,
}

/// Per-id results of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub succeeded: Vec<DeploymentId>,
    pub failed: Vec<BatchFailure>,
}

/// Best-effort batch executor over the deployment manager.
#[derive(Debug, Clone)]
pub struct BulkExecutor {
    manager: DeploymentManager,
}

impl BulkExecutor {
    pub fn new(manager: DeploymentManager) -> Self {
        Self { manager }
    }

    /// Return every id with the same condition.
    pub fn bulk_return(
        &self,
        principal: &Principal,
        ids: &[DeploymentId],
        condition: ReturnCondition,
    ) -> Result<BatchOutcome, CustodyError> {
        self.run(principal, "return", ids, |id| {
            self.manager
                .mark_returned(
                    principal,
                    id,
                    ReturnRequest {
                        condition,
                        notes: None,
                    },
                )
                .map(drop)
        })
    }

    /// Move every id to `status`.
    pub fn bulk_update_status(
        &self,
        principal: &Principal,
        ids: &[DeploymentId],
        status: DeploymentStatus,
    ) -> Result<BatchOutcome, CustodyError> {
        self.run(principal, "update_status", ids, |id| {
            self.manager.transition(principal, id, status).map(drop)
        })
    }

    fn run(
        &self,
        principal: &Principal,
        op: &'static str,
        ids: &[DeploymentId],
        mut apply: impl FnMut(DeploymentId) -> Result<(), CustodyError>,
    ) -> Result<BatchOutcome, CustodyError> {
        access::require_staff(principal, "run bulk operations")?;
        if ids.is_empty() {
            return Err(ValidationError::Empty("deploymentIds").into());
        }
        let mut seen = HashSet::with_capacity(ids.len());
        let mut outcome = BatchOutcome::default();
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            match apply(id) {
                Ok(()) => outcome.succeeded.push(id),
                Err(e) => outcome.failed.push(BatchFailure {
                    id,
                    reason: e.kind().to_string(),
                    message: e.to_string(),
                }),
            }
        }

        metrics::counter!("depot_bulk_items_total", "op" => op, "outcome" => "succeeded")
            .increment(outcome.succeeded.len() as u64);
        metrics::counter!("depot_bulk_items_total", "op" => op, "outcome" => "failed")
            .increment(outcome.failed.len() as u64);
        tracing::info!(
            op,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "bulk operation finished"
        );
        Ok(outcome)
    }
}
