//! # API Route Modules
//!
//! - `deployments` — deployment lifecycle, listing, dashboard statistics,
//!   exports and bulk operations.
//! - `assets` — asset registration, QR identity tokens, scan and manual
//!   returns.
//!
//! Every mutation commits to the in-memory store first; the helpers here
//! then write the committed document through when a
//! [`WriteThrough`](crate::db::WriteThrough) is configured. A failed write
//! never turns a committed mutation into an error response.

pub mod assets;
pub mod deployments;

use depot_core::Timestamp;
use depot_custody::{BatchFailure, BatchOutcome, DeploymentView};
use depot_state::Deployment;

use crate::state::AppState;

/// Per-item reason for a batch entry that committed but was not written
/// through.
pub(crate) const PERSIST_FAILED: &str = "PersistFailed";

/// Attach the clock-derived fields to a deployment for a response.
pub(crate) fn view(deployment: Deployment) -> DeploymentView {
    DeploymentView::at(deployment, Timestamp::now())
}

/// Write a committed deployment through to the database.
///
/// The in-memory commit stands either way. A failed write is logged and
/// counted; the upsert of the deployment's next commit rewrites the whole
/// row. Returns `false` only when the write failed.
pub(crate) async fn persist(state: &AppState, deployment: &Deployment) -> bool {
    let Some(write_through) = &state.write_through else {
        return true;
    };
    match write_through.save(deployment).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(
                deployment_id = %deployment.id,
                version = deployment.version,
                "stored deployment is already newer; write-through skipped"
            );
            true
        }
        Err(e) => {
            tracing::error!(
                deployment_id = %deployment.id,
                version = deployment.version,
                error = %e,
                "failed to persist deployment to database"
            );
            metrics::counter!("depot_write_through_failures_total").increment(1);
            false
        }
    }
}

/// Write through every succeeded id of a batch. Ids whose write fails move
/// to `failed` with reason `PersistFailed`.
pub(crate) async fn persist_batch(state: &AppState, outcome: BatchOutcome) -> BatchOutcome {
    if state.write_through.is_none() {
        return outcome;
    }
    let BatchOutcome {
        succeeded,
        mut failed,
    } = outcome;
    let mut persisted = Vec::with_capacity(succeeded.len());
    for id in succeeded {
        if let Some(deployment) = state.custody.store.get(id.as_uuid()) {
            if !persist(state, &deployment).await {
                failed.push(BatchFailure {
                    id,
                    reason: PERSIST_FAILED.to_string(),
                    message: "committed in memory but not written to the database".to_string(),
                });
                continue;
            }
        }
        persisted.push(id);
    }
    BatchOutcome {
        succeeded: persisted,
        failed,
    }
}
