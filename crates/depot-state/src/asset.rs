//! # Asset Custody State Machine
//!
//! Tracks one physical, QR-identified item independently of its owning
//! deployment's status.
//!
//! ## States
//!
//! ```text
//! Registered ──▶ Assigned ──▶ Deployed ──▶ Returned (terminal)
//!                                  │
//!                                  ├──▶ Lost     (terminal)
//!                                  └──▶ Damaged  (terminal)
//! ```
//!
//! Status only moves forward. A scan settles a `Deployed` asset; return
//! propagation from the deployment may settle an asset from any
//! non-terminal state, which is still a forward move.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use depot_core::{AssetId, AssetKind, DeploymentId, ReturnCondition, Timestamp, UserId};

// ─── Asset Status ────────────────────────────────────────────────────

/// Custody status of a single asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Identity issued; not yet bound to a dispatch.
    Registered,
    /// Bound to a deployment that has not left the depot.
    Assigned,
    /// In the field with a teller.
    Deployed,
    /// Back in the depot (terminal).
    Returned,
    /// Reported lost (terminal).
    Lost,
    /// Returned damaged (terminal).
    Damaged,
}

impl AssetStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Returned | Self::Lost | Self::Damaged)
    }

    /// Position along the forward-only custody path.
    fn rank(&self) -> u8 {
        match self {
            Self::Registered => 0,
            Self::Assigned => 1,
            Self::Deployed => 2,
            Self::Returned | Self::Lost | Self::Damaged => 3,
        }
    }

    /// The terminal status a return with `condition` lands in.
    pub fn settled_by(condition: ReturnCondition) -> Self {
        match condition {
            ReturnCondition::Damaged => Self::Damaged,
            ReturnCondition::Lost => Self::Lost,
            ReturnCondition::Excellent
            | ReturnCondition::Good
            | ReturnCondition::Fair
            | ReturnCondition::Poor => Self::Returned,
        }
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Assigned => "assigned",
            Self::Deployed => "deployed",
            Self::Returned => "returned",
            Self::Lost => "lost",
            Self::Damaged => "damaged",
        }
    }
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── QR Seed ─────────────────────────────────────────────────────────

/// Anti-forgery value bound to an asset at registration.
///
/// The seed is a capability: whoever holds the printed token can settle the
/// asset. `Debug` is redacted and the seed is never part of an asset's JSON
/// form; persistence stores seeds in a dedicated column.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QrSeed(String);

impl QrSeed {
    /// Wrap an already-generated seed value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw seed.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// An empty seed never matches anything.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for QrSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("QrSeed([REDACTED])")
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by asset custody transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The asset already reached a terminal status.
    #[error("asset {asset_id} already settled as {status}")]
    AlreadyReturned {
        asset_id: AssetId,
        status: AssetStatus,
    },

    /// The asset is not in a status the operation accepts.
    #[error("asset {asset_id} is {status}, expected {expected}")]
    InvalidState {
        asset_id: AssetId,
        status: AssetStatus,
        expected: &'static str,
    },
}

// ─── Asset Item ──────────────────────────────────────────────────────

/// Input for registering one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    #[serde(rename = "type", default)]
    pub kind: AssetKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// An individually QR-identified physical item.
///
/// `deployment_id` is a lookup key only: the owning deployment holds the
/// item and is the only place it is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetItem {
    pub asset_id: AssetId,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub label: String,
    pub serial_number: String,
    pub quantity: u32,
    pub status: AssetStatus,
    pub deployment_id: DeploymentId,
    pub registered_at: Timestamp,
    pub deployed_at: Option<Timestamp>,
    pub scanned_by: Option<UserId>,
    pub scanned_at: Option<Timestamp>,
    pub condition: Option<ReturnCondition>,
    pub damage_notes: String,
    #[serde(skip_serializing, default)]
    #[schema(ignore)]
    pub seed: QrSeed,
}

impl AssetItem {
    /// Create a freshly registered asset.
    pub fn register(
        asset_id: AssetId,
        deployment_id: DeploymentId,
        input: NewAsset,
        seed: QrSeed,
        now: Timestamp,
    ) -> Self {
        let label = if input.label.trim().is_empty() {
            "Unnamed".to_string()
        } else {
            input.label.trim().to_string()
        };
        Self {
            asset_id,
            kind: input.kind,
            label,
            serial_number: input.serial_number.trim().to_string(),
            quantity: input.quantity.max(1),
            status: AssetStatus::Registered,
            deployment_id,
            registered_at: now,
            deployed_at: None,
            scanned_by: None,
            scanned_at: None,
            condition: None,
            damage_notes: String::new(),
            seed,
        }
    }

    /// Bind to a deployment awaiting dispatch (REGISTERED → ASSIGNED).
    pub fn assign(&mut self) -> Result<(), AssetError> {
        self.advance(AssetStatus::Assigned, "registered")
    }

    /// Hand over to the field (ASSIGNED → DEPLOYED). Registered assets are
    /// assigned on the way.
    pub fn dispatch(&mut self, now: Timestamp) -> Result<(), AssetError> {
        if self.status == AssetStatus::Registered {
            self.assign()?;
        }
        self.advance(AssetStatus::Deployed, "assigned")?;
        self.deployed_at = Some(now);
        Ok(())
    }

    /// Settle a deployed asset from a scan.
    ///
    /// Terminal assets fail [`AssetError::AlreadyReturned`]; assets that
    /// never left the depot fail [`AssetError::InvalidState`].
    pub fn scan_return(
        &mut self,
        scanned_by: UserId,
        condition: ReturnCondition,
        damage_notes: &str,
        now: Timestamp,
    ) -> Result<AssetStatus, AssetError> {
        if self.status.is_terminal() {
            return Err(AssetError::AlreadyReturned {
                asset_id: self.asset_id.clone(),
                status: self.status,
            });
        }
        if self.status != AssetStatus::Deployed {
            return Err(AssetError::InvalidState {
                asset_id: self.asset_id.clone(),
                status: self.status,
                expected: "deployed",
            });
        }
        self.status = AssetStatus::settled_by(condition);
        self.condition = Some(condition);
        self.scanned_by = Some(scanned_by);
        self.scanned_at = Some(now);
        self.damage_notes = damage_notes.trim().to_string();
        Ok(self.status)
    }

    /// Settle from a deployment-level return. Returns `false` (and changes
    /// nothing) if the asset was already settled individually.
    pub fn settle(&mut self, condition: ReturnCondition) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = AssetStatus::settled_by(condition);
        self.condition = Some(condition);
        true
    }

    /// Whether this asset has reached a terminal status.
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }

    fn advance(&mut self, to: AssetStatus, expected: &'static str) -> Result<(), AssetError> {
        if self.status.is_terminal() {
            return Err(AssetError::AlreadyReturned {
                asset_id: self.asset_id.clone(),
                status: self.status,
            });
        }
        if to.rank() != self.status.rank() + 1 {
            return Err(AssetError::InvalidState {
                asset_id: self.asset_id.clone(),
                status: self.status,
                expected,
            });
        }
        self.status = to;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_asset() -> AssetItem {
        let dep = DeploymentId::new();
        AssetItem::register(
            AssetId::compose(&dep, AssetKind::Printer, 1),
            dep,
            NewAsset {
                kind: AssetKind::Printer,
                label: "Thermal printer".into(),
                serial_number: "SN-1".into(),
                quantity: 1,
            },
            QrSeed::new("abc123"),
            Timestamp::now(),
        )
    }

    fn make_deployed() -> AssetItem {
        let mut asset = make_asset();
        asset.dispatch(Timestamp::now()).unwrap();
        asset
    }

    #[test]
    fn registration_starts_registered() {
        let asset = make_asset();
        assert_eq!(asset.status, AssetStatus::Registered);
        assert!(asset.deployed_at.is_none());
    }

    #[test]
    fn blank_label_becomes_unnamed() {
        let dep = DeploymentId::new();
        let asset = AssetItem::register(
            AssetId::compose(&dep, AssetKind::Key, 1),
            dep,
            NewAsset::default(),
            QrSeed::new("s"),
            Timestamp::now(),
        );
        assert_eq!(asset.label, "Unnamed");
        assert_eq!(asset.quantity, 1);
    }

    #[test]
    fn dispatch_walks_through_assigned() {
        let mut asset = make_asset();
        asset.dispatch(Timestamp::now()).unwrap();
        assert_eq!(asset.status, AssetStatus::Deployed);
        assert!(asset.deployed_at.is_some());
    }

    #[test]
    fn assign_twice_is_rejected() {
        let mut asset = make_asset();
        asset.assign().unwrap();
        assert!(matches!(asset.assign(), Err(AssetError::InvalidState { .. })));
    }

    #[test]
    fn scan_settles_by_condition() {
        let mut good = make_deployed();
        assert_eq!(
            good.scan_return("T1".into(), ReturnCondition::Good, "", Timestamp::now()),
            Ok(AssetStatus::Returned)
        );
        let mut broken = make_deployed();
        assert_eq!(
            broken.scan_return("T1".into(), ReturnCondition::Damaged, " cracked ", Timestamp::now()),
            Ok(AssetStatus::Damaged)
        );
        assert_eq!(broken.damage_notes, "cracked");
        let mut gone = make_deployed();
        assert_eq!(
            gone.scan_return("T1".into(), ReturnCondition::Lost, "", Timestamp::now()),
            Ok(AssetStatus::Lost)
        );
    }

    #[test]
    fn second_scan_is_already_returned_and_changes_nothing() {
        let mut asset = make_deployed();
        asset
            .scan_return("T1".into(), ReturnCondition::Damaged, "dent", Timestamp::now())
            .unwrap();
        let before = asset.clone();
        let err = asset
            .scan_return("T2".into(), ReturnCondition::Good, "", Timestamp::now())
            .unwrap_err();
        assert!(matches!(err, AssetError::AlreadyReturned { status: AssetStatus::Damaged, .. }));
        assert_eq!(asset, before);
    }

    #[test]
    fn scanning_undispatched_asset_is_invalid_state() {
        let mut asset = make_asset();
        let err = asset
            .scan_return("T1".into(), ReturnCondition::Good, "", Timestamp::now())
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidState { status: AssetStatus::Registered, .. }));
    }

    #[test]
    fn settle_skips_already_scanned_assets() {
        let mut asset = make_deployed();
        asset
            .scan_return("T1".into(), ReturnCondition::Lost, "", Timestamp::now())
            .unwrap();
        assert!(!asset.settle(ReturnCondition::Good));
        assert_eq!(asset.status, AssetStatus::Lost);
        assert_eq!(asset.condition, Some(ReturnCondition::Lost));
    }

    #[test]
    fn seed_is_not_serialized_or_debug_printed() {
        let asset = make_asset();
        let json = serde_json::to_string(&asset).unwrap();
        assert!(!json.contains("abc123"));
        assert!(!format!("{asset:?}").contains("abc123"));
        let parsed: AssetItem = serde_json::from_str(&json).unwrap();
        assert!(parsed.seed.is_empty());
    }

    #[test]
    fn asset_json_uses_type_key() {
        let json = serde_json::to_value(make_asset()).unwrap();
        assert_eq!(json["type"], "printer");
        assert_eq!(json["status"], "registered");
    }
}
