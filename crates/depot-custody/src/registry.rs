//! # Asset Registry
//!
//! Issues asset ids and QR identity tokens, and resolves scanned tokens back
//! to the asset they were printed for.
//!
//! Asset ids are `{deployment prefix}-{KIND}-{seq:03}` where `seq` counts the
//! deployment's assets of that kind, so ids are unique per deployment, kind
//! and sequence. Assets are stored inside their owning deployment; the
//! registry never keeps a second copy.

use depot_core::{AssetId, AssetKind, DeploymentId, Principal, Timestamp};
use depot_state::{AssetItem, Deployment, NewAsset};

use crate::access;
use crate::error::CustodyError;
use crate::store::Store;
use crate::token::{generate_seed, seeds_match, IdentityToken};

/// Asset registration and token resolution.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    store: Store<Deployment>,
}

impl AssetRegistry {
    pub fn new(store: Store<Deployment>) -> Self {
        Self { store }
    }

    /// Register `items` on an existing deployment.
    ///
    /// The new assets are brought up to the deployment's custody stage:
    /// assigned while preparing, deployed once dispatched.
    pub fn register_assets(
        &self,
        principal: &Principal,
        deployment_id: DeploymentId,
        items: Vec<NewAsset>,
    ) -> Result<(Vec<AssetItem>, Deployment), CustodyError> {
        access::require_staff(principal, "register assets")?;
        if items.is_empty() {
            return Err(depot_core::ValidationError::Empty("items").into());
        }
        let now = Timestamp::now();
        let (ids, committed) = self
            .store
            .try_update(deployment_id.as_uuid(), |deployment| {
                access::require_owner_or_admin(principal, deployment, "register assets")?;
                let minted = mint_assets(deployment, items, now)?;
                let ids: Vec<AssetId> = minted.iter().map(|a| a.asset_id.clone()).collect();
                deployment.attach_assets(minted, now)?;
                Ok::<_, CustodyError>(ids)
            })
            .ok_or(CustodyError::NotFound(deployment_id))??;

        tracing::info!(
            deployment_id = %deployment_id,
            count = ids.len(),
            actor = %principal.user_id,
            "assets registered"
        );
        let registered = committed
            .assets
            .iter()
            .filter(|a| ids.contains(&a.asset_id))
            .cloned()
            .collect();
        Ok((registered, committed))
    }

    /// Produce the printable token for one asset.
    pub fn generate_identity_token(
        &self,
        principal: &Principal,
        deployment_id: DeploymentId,
        asset_id: &str,
    ) -> Result<String, CustodyError> {
        access::require_staff(principal, "issue identity tokens")?;
        let deployment = self
            .store
            .get(deployment_id.as_uuid())
            .ok_or(CustodyError::NotFound(deployment_id))?;
        access::require_owner_or_admin(principal, &deployment, "issue identity tokens")?;
        let asset = deployment
            .asset(asset_id)
            .ok_or_else(|| CustodyError::UnknownAsset(asset_id.to_string()))?;
        Ok(IdentityToken::new(deployment.id, asset.asset_id.clone(), asset.seed.clone()).encode())
    }

    /// Resolve a scanned token to its asset.
    pub fn lookup_by_token(&self, token: &str) -> Result<AssetItem, CustodyError> {
        let token = IdentityToken::decode(token)?;
        let deployment = self
            .store
            .get(token.deployment_id.as_uuid())
            .ok_or_else(|| CustodyError::UnknownAsset(token.asset_id.to_string()))?;
        verify_token(&deployment, &token).cloned()
    }

    /// The deployment's assets in registration order.
    pub fn list_assets(
        &self,
        principal: &Principal,
        deployment_id: DeploymentId,
    ) -> Result<Vec<AssetItem>, CustodyError> {
        let deployment = self
            .store
            .get(deployment_id.as_uuid())
            .ok_or(CustodyError::NotFound(deployment_id))?;
        access::require_read(principal, &deployment)?;
        Ok(deployment.assets)
    }
}

/// Find the asset a token names inside `deployment` and check its seed.
pub(crate) fn verify_token<'a>(
    deployment: &'a Deployment,
    token: &IdentityToken,
) -> Result<&'a AssetItem, CustodyError> {
    let asset = deployment
        .asset(token.asset_id.as_str())
        .ok_or_else(|| CustodyError::UnknownAsset(token.asset_id.to_string()))?;
    if !seeds_match(&asset.seed, &token.seed) {
        tracing::warn!(asset_id = %asset.asset_id, "identity token seed mismatch");
        return Err(CustodyError::SeedMismatch(asset.asset_id.clone()));
    }
    Ok(asset)
}

/// Build registered assets for `deployment` with fresh ids and seeds.
pub(crate) fn mint_assets(
    deployment: &Deployment,
    items: Vec<NewAsset>,
    now: Timestamp,
) -> Result<Vec<AssetItem>, CustodyError> {
    let mut minted: Vec<AssetItem> = Vec::with_capacity(items.len());
    for item in items {
        let seq = next_sequence(deployment, &minted, item.kind);
        let asset_id = AssetId::compose(&deployment.id, item.kind, seq);
        let taken = deployment.asset(asset_id.as_str()).is_some()
            || minted.iter().any(|a| a.asset_id == asset_id);
        if taken {
            return Err(CustodyError::DuplicateAssetId(asset_id));
        }
        minted.push(AssetItem::register(
            asset_id,
            deployment.id,
            item,
            generate_seed(),
            now,
        ));
    }
    Ok(minted)
}

fn next_sequence(deployment: &Deployment, pending: &[AssetItem], kind: AssetKind) -> usize {
    let existing = deployment.assets.iter().filter(|a| a.kind == kind).count();
    let staged = pending.iter().filter(|a| a.kind == kind).count();
    existing + staged + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, create_basic, declarator, make_manager, other_declarator, teller};
    use depot_state::AssetStatus;

    fn printer(label: &str) -> NewAsset {
        NewAsset {
            kind: AssetKind::Printer,
            label: label.into(),
            serial_number: String::new(),
            quantity: 1,
        }
    }

    #[test]
    fn registered_assets_get_sequential_ids_per_kind() {
        let (manager, registry) = make_manager();
        let dep = create_basic(&manager);
        let (assets, _) = registry
            .register_assets(
                &admin(),
                dep.id,
                vec![
                    printer("A"),
                    printer("B"),
                    NewAsset {
                        kind: AssetKind::Tablet,
                        ..NewAsset::default()
                    },
                ],
            )
            .unwrap();
        let prefix = dep.id.short();
        assert_eq!(assets[0].asset_id.as_str(), format!("{prefix}-PRN-001"));
        assert_eq!(assets[1].asset_id.as_str(), format!("{prefix}-PRN-002"));
        assert_eq!(assets[2].asset_id.as_str(), format!("{prefix}-TAB-001"));
        assert!(assets.iter().all(|a| a.status == AssetStatus::Assigned));

        let (more, _) = registry
            .register_assets(&admin(), dep.id, vec![printer("C")])
            .unwrap();
        assert_eq!(more[0].asset_id.as_str(), format!("{prefix}-PRN-003"));
    }

    #[test]
    fn assets_and_tokens_are_managed_by_the_owner() {
        let (manager, registry) = make_manager();
        let dep = create_basic(&manager);
        assert!(matches!(
            registry.register_assets(&other_declarator(), dep.id, vec![printer("A")]),
            Err(CustodyError::Forbidden(_))
        ));
        let (assets, _) = registry
            .register_assets(&declarator(), dep.id, vec![printer("A")])
            .unwrap();
        assert!(matches!(
            registry.generate_identity_token(
                &other_declarator(),
                dep.id,
                assets[0].asset_id.as_str()
            ),
            Err(CustodyError::Forbidden(_))
        ));
        assert!(registry
            .generate_identity_token(&declarator(), dep.id, assets[0].asset_id.as_str())
            .is_ok());
    }

    #[test]
    fn token_round_trips_to_the_registered_asset() {
        let (manager, registry) = make_manager();
        let dep = create_basic(&manager);
        let (assets, _) = registry
            .register_assets(&admin(), dep.id, vec![printer("A")])
            .unwrap();
        let token = registry
            .generate_identity_token(&admin(), dep.id, assets[0].asset_id.as_str())
            .unwrap();
        let found = registry.lookup_by_token(&token).unwrap();
        assert_eq!(found.asset_id, assets[0].asset_id);
    }

    #[test]
    fn forged_seed_is_rejected() {
        let (manager, registry) = make_manager();
        let dep = create_basic(&manager);
        let (assets, _) = registry
            .register_assets(&admin(), dep.id, vec![printer("A")])
            .unwrap();
        let forged = IdentityToken::new(dep.id, assets[0].asset_id.clone(), generate_seed()).encode();
        assert!(matches!(
            registry.lookup_by_token(&forged),
            Err(CustodyError::SeedMismatch(_))
        ));
    }

    #[test]
    fn unknown_asset_and_deployment() {
        let (manager, registry) = make_manager();
        let dep = create_basic(&manager);
        let missing_asset =
            IdentityToken::new(dep.id, AssetId("nope-PRN-001".into()), generate_seed()).encode();
        assert!(matches!(
            registry.lookup_by_token(&missing_asset),
            Err(CustodyError::UnknownAsset(_))
        ));
        let missing_dep = IdentityToken::new(
            DeploymentId::new(),
            AssetId("nope-PRN-001".into()),
            generate_seed(),
        )
        .encode();
        assert!(matches!(
            registry.lookup_by_token(&missing_dep),
            Err(CustodyError::UnknownAsset(_))
        ));
        assert!(matches!(
            registry.lookup_by_token("%%%"),
            Err(CustodyError::MalformedToken(_))
        ));
    }

    #[test]
    fn registration_requires_staff_and_items() {
        let (manager, registry) = make_manager();
        let dep = create_basic(&manager);
        assert!(matches!(
            registry.register_assets(&teller("T1"), dep.id, vec![printer("A")]),
            Err(CustodyError::Forbidden(_))
        ));
        assert!(matches!(
            registry.register_assets(&admin(), dep.id, Vec::new()),
            Err(CustodyError::Validation(_))
        ));
        assert!(matches!(
            registry.register_assets(&admin(), DeploymentId::new(), vec![printer("A")]),
            Err(CustodyError::NotFound(_))
        ));
    }

    #[test]
    fn assigned_teller_can_list_assets_but_others_cannot() {
        let (manager, registry) = make_manager();
        let dep = create_basic(&manager);
        registry
            .register_assets(&admin(), dep.id, vec![printer("A")])
            .unwrap();
        assert_eq!(registry.list_assets(&teller("T1"), dep.id).unwrap().len(), 1);
        assert!(registry.list_assets(&teller("T9"), dep.id).is_err());
    }
}
