//! # depot-custody — Custody Services
//!
//! The services behind the depot API. All of them share one
//! [`Store<Deployment>`](store::Store), the system of record; each entity
//! mutation is a single conditional write against it.
//!
//! ## Components
//!
//! - **Asset Registry** (`registry.rs`, `token.rs`): asset ids, QR identity
//!   tokens and token resolution.
//! - **Deployment Manager** (`manager.rs`): the deployment lifecycle with
//!   role-based authorization.
//! - **Scan Protocol Handler** (`scan.rs`): scan-based asset returns.
//! - **Query & Filter Engine** (`query.rs`): filtering, sorting, paging and
//!   dashboard statistics.
//! - **Bulk Operation Executor** (`bulk.rs`): best-effort batches.
//! - **Export Engine** (`export.rs`): CSV and tab-separated exports.
//! - **Notifications** (`notify.rs`): post-commit side channel.

mod access;
pub mod bulk;
pub mod error;
pub mod export;
pub mod manager;
pub mod notify;
pub mod query;
pub mod registry;
pub mod scan;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use depot_state::Deployment;

pub use bulk::{BatchFailure, BatchOutcome, BulkExecutor};
pub use error::CustodyError;
pub use export::{ExportError, ExportFile, ExportFormat};
pub use manager::{CreateDeployment, DeploymentManager, ReturnRequest};
pub use notify::{CustodyEvent, Notifier, RecordingNotifier, TracingNotifier};
pub use query::{
    DeploymentQuery, DeploymentStats, DeploymentView, QueryResult, SortField, SortOrder,
};
pub use registry::AssetRegistry;
pub use scan::{ScanHandler, ScanOutcome};
pub use store::{Store, Versioned};
pub use token::{IdentityToken, TokenError};

/// Every custody service, wired to one store and one notifier.
#[derive(Clone)]
pub struct Custody {
    pub store: Store<Deployment>,
    pub deployments: DeploymentManager,
    pub registry: AssetRegistry,
    pub scanner: ScanHandler,
    pub bulk: BulkExecutor,
}

impl Custody {
    pub fn new(store: Store<Deployment>, notifier: Arc<dyn Notifier>) -> Self {
        let deployments = DeploymentManager::new(store.clone(), Arc::clone(&notifier));
        Self {
            registry: AssetRegistry::new(store.clone()),
            scanner: ScanHandler::new(store.clone(), notifier),
            bulk: BulkExecutor::new(deployments.clone()),
            deployments,
            store,
        }
    }
}

impl Default for Custody {
    fn default() -> Self {
        Self::new(Store::new(), Arc::new(TracingNotifier))
    }
}
