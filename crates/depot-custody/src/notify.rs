//! # Notifications
//!
//! Fire-and-forget side channel, invoked after a mutation commits. A
//! notifier cannot fail the operation that triggered it.

use parking_lot::Mutex;

use depot_core::{AssetId, DeploymentId};
use depot_state::AssetStatus;

/// Something operators may want to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustodyEvent {
    /// The last outstanding teller marked their part complete.
    AllTellersComplete { deployment_id: DeploymentId },
    /// A deployment reached `returned`.
    DeploymentReturned {
        deployment_id: DeploymentId,
        forced: bool,
    },
    /// A scan or manual return settled an asset.
    AssetSettled {
        deployment_id: DeploymentId,
        asset_id: AssetId,
        status: AssetStatus,
        all_assets_settled: bool,
    },
    /// A deployment went past its expected return date.
    Overdue {
        deployment_id: DeploymentId,
        days_overdue: i64,
    },
}

/// Receives custody events after commit.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: CustodyEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: CustodyEvent) {
        match event {
            CustodyEvent::AllTellersComplete { deployment_id } => {
                tracing::info!(deployment_id = %deployment_id, "all tellers complete");
            }
            CustodyEvent::DeploymentReturned {
                deployment_id,
                forced,
            } => {
                tracing::info!(deployment_id = %deployment_id, forced, "deployment returned");
            }
            CustodyEvent::AssetSettled {
                deployment_id,
                asset_id,
                status,
                all_assets_settled,
            } => {
                tracing::info!(
                    deployment_id = %deployment_id,
                    asset_id = %asset_id,
                    status = %status,
                    all_assets_settled,
                    "asset settled"
                );
            }
            CustodyEvent::Overdue {
                deployment_id,
                days_overdue,
            } => {
                tracing::warn!(deployment_id = %deployment_id, days_overdue, "deployment overdue");
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<CustodyEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<CustodyEvent> {
        self.events.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: CustodyEvent) {
        self.events.lock().push(event);
    }
}
