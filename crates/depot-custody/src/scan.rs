//! # Scan Protocol
//!
//! Settles one asset from its scanned QR token. The token is the
//! capability, so any authenticated caller may scan. Staff can also settle
//! an asset by id when its sticker is unreadable.
//!
//! Token verification and the asset's status check are repeated inside the
//! conditional write. Of two racing scans of the same sticker, exactly one
//! settles the asset and the other fails `AlreadyReturned`. A scan never
//! moves the deployment's status; it only reports whether every asset of
//! the deployment is now settled.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use depot_core::{AssetId, DeploymentId, Principal, ReturnCondition, Timestamp};
use depot_state::{AssetItem, Deployment};

use crate::access;
use crate::error::CustodyError;
use crate::notify::{CustodyEvent, Notifier};
use crate::registry::verify_token;
use crate::store::Store;
use crate::token::IdentityToken;

/// Result of a successful scan.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub asset: AssetItem,
    pub deployment_id: DeploymentId,
    /// Every asset of the deployment is in a terminal status.
    pub all_assets_settled: bool,
    /// Assets of the deployment not yet settled.
    pub outstanding: usize,
}

/// Handles scan-based returns.
#[derive(Clone)]
pub struct ScanHandler {
    store: Store<Deployment>,
    notifier: Arc<dyn Notifier>,
}

impl ScanHandler {
    pub fn new(store: Store<Deployment>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Settle the asset named by `token` with `condition`.
    pub fn scan_return(
        &self,
        principal: &Principal,
        token: &str,
        condition: ReturnCondition,
        damage_notes: &str,
    ) -> Result<ScanOutcome, CustodyError> {
        let decoded = IdentityToken::decode(token).map_err(CustodyError::from);
        let result = decoded.and_then(|token| {
            let missing = CustodyError::UnknownAsset(token.asset_id.to_string());
            self.settle(
                principal,
                token.deployment_id,
                |deployment| Ok(verify_token(deployment, &token)?.asset_id.clone()),
                missing,
                condition,
                damage_notes,
                "scan",
            )
        });
        record("scan", &result);
        result
    }

    /// Settle one asset by id, for stickers that cannot be scanned.
    ///
    /// Staff only, and limited to the owning declarator or an admin. A
    /// second return of the same asset fails `AlreadyReturned` exactly like
    /// a second scan.
    pub fn return_asset(
        &self,
        principal: &Principal,
        deployment_id: DeploymentId,
        asset_id: &str,
        condition: ReturnCondition,
        damage_notes: &str,
    ) -> Result<ScanOutcome, CustodyError> {
        let result = access::require_staff(principal, "return assets").and_then(|()| {
            self.settle(
                principal,
                deployment_id,
                |deployment| {
                    access::require_owner_or_admin(principal, deployment, "return assets")?;
                    deployment
                        .asset(asset_id)
                        .map(|a| a.asset_id.clone())
                        .ok_or_else(|| CustodyError::UnknownAsset(asset_id.to_string()))
                },
                CustodyError::NotFound(deployment_id),
                condition,
                damage_notes,
                "manual",
            )
        });
        record("manual", &result);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        principal: &Principal,
        deployment_id: DeploymentId,
        locate: impl FnOnce(&Deployment) -> Result<AssetId, CustodyError>,
        missing: CustodyError,
        condition: ReturnCondition,
        damage_notes: &str,
        method: &'static str,
    ) -> Result<ScanOutcome, CustodyError> {
        let now = Timestamp::now();

        let (asset, committed) = self
            .store
            .try_update(deployment_id.as_uuid(), |deployment| {
                let asset_id = locate(&*deployment)?;
                let asset = deployment
                    .asset_mut(asset_id.as_str())
                    .ok_or_else(|| CustodyError::UnknownAsset(asset_id.to_string()))?;
                asset.scan_return(principal.user_id.clone(), condition, damage_notes, now)?;
                Ok::<_, CustodyError>(asset.clone())
            })
            .ok_or(missing)??;

        let all_assets_settled = committed.all_assets_settled();
        let outstanding = committed.assets.len() - committed.assets_settled();
        tracing::info!(
            deployment_id = %deployment_id,
            asset_id = %asset.asset_id,
            status = %asset.status,
            returned_by = %principal.user_id,
            method,
            outstanding,
            "asset settled"
        );
        self.notifier.notify(CustodyEvent::AssetSettled {
            deployment_id,
            asset_id: asset.asset_id.clone(),
            status: asset.status,
            all_assets_settled,
        });
        Ok(ScanOutcome {
            asset,
            deployment_id,
            all_assets_settled,
            outstanding,
        })
    }
}

fn record(method: &'static str, result: &Result<ScanOutcome, CustodyError>) {
    let outcome = match result {
        Ok(_) => "settled",
        Err(e) => e.code(),
    };
    metrics::counter!("depot_asset_scans_total", "method" => method, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TracingNotifier;
    use crate::testing::{admin, create_basic, declarator, other_declarator, teller};
    use crate::token::generate_seed;
    use crate::Custody;
    use depot_core::AssetKind;
    use depot_state::{AssetStatus, DeploymentStatus, NewAsset};

    struct Fixture {
        custody: Custody,
        deployment: Deployment,
    }

    fn make_fixture(asset_count: usize, dispatch: bool) -> Fixture {
        let custody = Custody::new(Store::new(), Arc::new(TracingNotifier));
        let deployment = create_basic(&custody.deployments);
        let items = (0..asset_count)
            .map(|i| NewAsset {
                kind: AssetKind::Tablet,
                label: format!("Tablet {i}"),
                serial_number: String::new(),
                quantity: 1,
            })
            .collect();
        custody
            .registry
            .register_assets(&admin(), deployment.id, items)
            .unwrap();
        let deployment = if dispatch {
            custody.deployments.mark_deployed(&admin(), deployment.id).unwrap()
        } else {
            custody.deployments.get(&admin(), deployment.id).unwrap()
        };
        Fixture {
            custody,
            deployment,
        }
    }

    fn token_for(fx: &Fixture, index: usize) -> String {
        fx.custody
            .registry
            .generate_identity_token(
                &admin(),
                fx.deployment.id,
                fx.deployment.assets[index].asset_id.as_str(),
            )
            .unwrap()
    }

    #[test]
    fn scan_settles_asset_without_moving_deployment() {
        let fx = make_fixture(2, true);
        let outcome = fx.custody
            .scanner
            .scan_return(&teller("T1"), &token_for(&fx, 0), ReturnCondition::Good, "")
            .unwrap();
        assert_eq!(outcome.asset.status, AssetStatus::Returned);
        assert_eq!(outcome.asset.scanned_by.as_ref().unwrap().as_str(), "T1");
        assert!(!outcome.all_assets_settled);
        assert_eq!(outcome.outstanding, 1);
        let current = fx.custody.deployments.get(&admin(), fx.deployment.id).unwrap();
        assert_eq!(current.status, DeploymentStatus::Deployed);
    }

    #[test]
    fn last_scan_reports_all_settled() {
        let fx = make_fixture(2, true);
        fx.custody
            .scanner
            .scan_return(&teller("T1"), &token_for(&fx, 0), ReturnCondition::Good, "")
            .unwrap();
        let outcome = fx.custody
            .scanner
            .scan_return(&teller("T2"), &token_for(&fx, 1), ReturnCondition::Damaged, "screen")
            .unwrap();
        assert!(outcome.all_assets_settled);
        assert_eq!(outcome.asset.status, AssetStatus::Damaged);
        assert_eq!(outcome.asset.damage_notes, "screen");
    }

    #[test]
    fn second_scan_fails_and_keeps_first_result() {
        let fx = make_fixture(1, true);
        let token = token_for(&fx, 0);
        fx.custody
            .scanner
            .scan_return(&teller("T1"), &token, ReturnCondition::Lost, "")
            .unwrap();
        let err = fx.custody
            .scanner
            .scan_return(&teller("T1"), &token, ReturnCondition::Good, "")
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_RETURNED");
        let asset = fx.custody.registry.lookup_by_token(&token).unwrap();
        assert_eq!(asset.status, AssetStatus::Lost);
        assert_eq!(asset.condition, Some(ReturnCondition::Lost));
    }

    #[test]
    fn scanning_before_dispatch_is_invalid_state() {
        let fx = make_fixture(1, false);
        let err = fx.custody
            .scanner
            .scan_return(&teller("T1"), &token_for(&fx, 0), ReturnCondition::Good, "")
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[test]
    fn forged_and_malformed_tokens() {
        let fx = make_fixture(1, true);
        let forged = IdentityToken::new(
            fx.deployment.id,
            fx.deployment.assets[0].asset_id.clone(),
            generate_seed(),
        )
        .encode();
        assert_eq!(
            fx.custody.scanner
                .scan_return(&teller("T1"), &forged, ReturnCondition::Good, "")
                .unwrap_err()
                .code(),
            "SEED_MISMATCH"
        );
        assert_eq!(
            fx.custody.scanner
                .scan_return(&teller("T1"), "not-a-token", ReturnCondition::Good, "")
                .unwrap_err()
                .code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn manual_return_settles_by_asset_id() {
        let fx = make_fixture(2, true);
        let asset_id = fx.deployment.assets[1].asset_id.clone();
        let outcome = fx.custody
            .scanner
            .return_asset(
                &declarator(),
                fx.deployment.id,
                asset_id.as_str(),
                ReturnCondition::Damaged,
                "sticker torn",
            )
            .unwrap();
        assert_eq!(outcome.asset.asset_id, asset_id);
        assert_eq!(outcome.asset.status, AssetStatus::Damaged);
        assert_eq!(outcome.asset.scanned_by.as_ref().unwrap().as_str(), "decl-1");
        assert_eq!(outcome.outstanding, 1);

        let err = fx.custody
            .scanner
            .return_asset(&admin(), fx.deployment.id, asset_id.as_str(), ReturnCondition::Good, "")
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_RETURNED");
        let current = fx.custody.deployments.get(&admin(), fx.deployment.id).unwrap();
        assert_eq!(current.asset(asset_id.as_str()).unwrap().status, AssetStatus::Damaged);
    }

    #[test]
    fn manual_and_scanned_returns_share_the_duplicate_guard() {
        let fx = make_fixture(1, true);
        let token = token_for(&fx, 0);
        fx.custody
            .scanner
            .scan_return(&teller("T1"), &token, ReturnCondition::Good, "")
            .unwrap();
        let err = fx.custody
            .scanner
            .return_asset(
                &admin(),
                fx.deployment.id,
                fx.deployment.assets[0].asset_id.as_str(),
                ReturnCondition::Lost,
                "",
            )
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_RETURNED");
    }

    #[test]
    fn manual_return_is_for_the_owner_or_an_admin() {
        let fx = make_fixture(1, true);
        let asset_id = fx.deployment.assets[0].asset_id.as_str();
        for principal in [teller("T1"), other_declarator()] {
            let err = fx.custody
                .scanner
                .return_asset(&principal, fx.deployment.id, asset_id, ReturnCondition::Good, "")
                .unwrap_err();
            assert_eq!(err.code(), "FORBIDDEN");
        }
        let err = fx.custody
            .scanner
            .return_asset(&admin(), fx.deployment.id, "NOPE-PRN-001", ReturnCondition::Good, "")
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_ASSET");
        let err = fx.custody
            .scanner
            .return_asset(&admin(), DeploymentId::new(), asset_id, ReturnCondition::Good, "")
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn racing_scans_of_one_token_have_exactly_one_winner() {
        let fx = make_fixture(1, true);
        let token = token_for(&fx, 0);
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let scanner = fx.custody.scanner.clone();
                let token = token.clone();
                std::thread::spawn(move || {
                    scanner.scan_return(
                        &teller(&format!("T{i}")),
                        &token,
                        ReturnCondition::Good,
                        "",
                    )
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.code() == "ALREADY_RETURNED"));
    }
}
