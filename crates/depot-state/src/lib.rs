//! # depot-state — Custody State Machines
//!
//! The two lifecycles of the depot custody service, as plain data plus
//! checked transition methods. Nothing here performs I/O or reads the clock:
//! every transition takes the current time as an argument, so callers decide
//! when "now" is and tests are deterministic.
//!
//! ## State Machines
//!
//! - **Deployment** (`deployment.rs`): `Preparing → Deployed → InUse →
//!   PendingReturn → Returned`, with `Lost` and `Damaged` branches from every
//!   in-field status. Owns its teller assignments, completion records,
//!   assets and transition log.
//!
//! - **Asset** (`asset.rs`): `Registered → Assigned → Deployed →
//!   Returned | Lost | Damaged`, forward-only, settled by a scan or by the
//!   owning deployment's return.
//!
//! ## Design
//!
//! A transition either succeeds completely or returns an error and leaves
//! the aggregate untouched. Callers that need atomicity across a store apply
//! transitions to a working copy and commit only on success.

pub mod asset;
pub mod deployment;

pub use asset::{AssetError, AssetItem, AssetStatus, NewAsset, QrSeed};
pub use deployment::{
    CompletionRecord, Deployment, DeploymentDraft, DeploymentError, DeploymentStatus,
    DetailsUpdate, ReturnStatus, TellerAssignment, TellerSlot, TransitionEvidence,
    TransitionRecord, DUE_SOON_DAYS,
};
