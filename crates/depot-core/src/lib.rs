//! # depot-core — Foundational Types for the Depot Custody Service
//!
//! The leaf of the workspace dependency graph. Defines the type-system
//! primitives every other crate builds on; depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `DeploymentId`, `AssetId`,
//!    `TellerId`, `UserId`. You cannot pass a teller where an asset is
//!    expected.
//!
//! 2. **Closed enums for every categorical field.** Asset kinds, priorities,
//!    return conditions and item types are exhaustive `match` targets; there
//!    are no free-text category strings.
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] is always UTC with seconds
//!    precision, so ordering and overdue comparisons are unambiguous.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `depot-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod domain;
pub mod error;
pub mod identity;
pub mod principal;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use domain::{AssetKind, DeploymentItemType, Priority, ReturnCondition};
pub use error::ValidationError;
pub use identity::{AssetId, DeploymentId, TellerId, UserId};
pub use principal::{Principal, Role};
pub use temporal::Timestamp;
