//! Shared fixtures for the crate's unit tests.

use std::sync::Arc;

use depot_core::{Principal, Role, Timestamp};
use depot_state::{Deployment, TellerSlot};

use crate::manager::{CreateDeployment, DeploymentManager};
use crate::notify::TracingNotifier;
use crate::registry::AssetRegistry;
use crate::store::Store;

pub(crate) fn admin() -> Principal {
    Principal::new("admin-1", Role::Admin)
}

pub(crate) fn declarator() -> Principal {
    Principal::new("decl-1", Role::Declarator)
}

/// A declarator who did not create the `create_basic` deployment.
pub(crate) fn other_declarator() -> Principal {
    Principal::new("decl-2", Role::Declarator)
}

pub(crate) fn supervisor() -> Principal {
    Principal::new("sup-1", Role::Supervisor)
}

pub(crate) fn teller(id: &str) -> Principal {
    Principal::new(id, Role::Teller)
}

pub(crate) fn make_manager() -> (DeploymentManager, AssetRegistry) {
    let store = Store::new();
    (
        DeploymentManager::new(store.clone(), Arc::new(TracingNotifier)),
        AssetRegistry::new(store),
    )
}

/// A preparing deployment assigned to T1 and T2, due in a week.
pub(crate) fn create_basic(manager: &DeploymentManager) -> Deployment {
    manager
        .create(
            &declarator(),
            CreateDeployment {
                item_name: "Receipt printers".into(),
                expected_return_date: Some(Timestamp::now().plus_days(7)),
                tellers: vec![
                    TellerSlot {
                        teller_id: "T1".into(),
                        teller_name: "Teller One".into(),
                    },
                    TellerSlot {
                        teller_id: "T2".into(),
                        teller_name: "Teller Two".into(),
                    },
                ],
                ..Default::default()
            },
        )
        .unwrap()
}
