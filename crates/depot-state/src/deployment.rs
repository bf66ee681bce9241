//! # Deployment Lifecycle State Machine
//!
//! Models an equipment loan from preparation in the depot through dispatch,
//! field use and return, with terminal branches for loss and damage.
//!
//! ## States
//!
//! ```text
//! Preparing ──▶ Deployed ──▶ InUse ──▶ PendingReturn ──▶ Returned (terminal)
//!                  │           │             │
//!                  └───────────┴─────────────┴──▶ Lost    (terminal)
//!                                                 Damaged (terminal)
//! ```
//!
//! `Deployed`, `InUse` and `PendingReturn` may all move directly to any of
//! the three terminal states. Preparing is never re-entered.
//!
//! ## Teller Tracking
//!
//! Each assigned teller acknowledges receipt and later marks their part
//! complete. `all_tellers_complete()` is always computed from the completion
//! records; it is never stored. A normal return requires it; the audited
//! forced return does not.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use depot_core::{
    DeploymentId, DeploymentItemType, Priority, ReturnCondition, TellerId, Timestamp, UserId,
    ValidationError,
};

use crate::asset::{AssetError, AssetItem};

/// Deployments due within this many days report `due_soon`.
pub const DUE_SOON_DAYS: i64 = 3;

// ─── Deployment Status ───────────────────────────────────────────────

/// The lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Being assembled in the depot.
    Preparing,
    /// Handed over to the tellers.
    Deployed,
    /// Tellers confirmed it is in active use.
    InUse,
    /// Return has been requested.
    PendingReturn,
    /// Back in the depot (terminal).
    Returned,
    /// Reported lost (terminal).
    Lost,
    /// Came back damaged (terminal).
    Damaged,
}

impl DeploymentStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [DeploymentStatus; 7] = [
        Self::Preparing,
        Self::Deployed,
        Self::InUse,
        Self::PendingReturn,
        Self::Returned,
        Self::Lost,
        Self::Damaged,
    ];

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Returned | Self::Lost | Self::Damaged)
    }

    /// Whether the equipment is currently out in the field.
    pub fn is_in_field(&self) -> bool {
        matches!(self, Self::Deployed | Self::InUse | Self::PendingReturn)
    }

    /// The transition table. Anything not listed here is rejected.
    pub fn can_transition_to(&self, to: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        match (self, to) {
            (Preparing, Deployed) => true,
            (Deployed, InUse) => true,
            (InUse, PendingReturn) => true,
            (Deployed | InUse | PendingReturn, Returned | Lost | Damaged) => true,
            _ => false,
        }
    }

    /// Statuses reachable in one step from this one.
    pub fn valid_transitions(&self) -> Vec<DeploymentStatus> {
        Self::ALL
            .into_iter()
            .filter(|to| self.can_transition_to(*to))
            .collect()
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Deployed => "deployed",
            Self::InUse => "in_use",
            Self::PendingReturn => "pending_return",
            Self::Returned => "returned",
            Self::Lost => "lost",
            Self::Damaged => "damaged",
        }
    }

    /// Parse a wire name.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "deployment status",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Due-date classification computed at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    NotDue,
    DueSoon,
    Overdue,
    Returned,
}

// ─── Errors ──────────────────────────────────────────────────────────

fn allowed_from(status: &DeploymentStatus) -> String {
    let targets = status.valid_transitions();
    if targets.is_empty() {
        return "none".to_string();
    }
    targets
        .iter()
        .map(DeploymentStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during deployment lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeploymentError {
    /// Attempted transition is not on an edge of the transition table.
    #[error(
        "invalid deployment transition: {from} -> {to} (allowed from {from}: {})",
        allowed_from(.from)
    )]
    InvalidTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    /// The deployment is in a terminal state and can no longer be changed.
    #[error("deployment is in terminal state {status}")]
    TerminalState { status: DeploymentStatus },

    /// The teller is not assigned to this deployment.
    #[error("teller {0} is not assigned to this deployment")]
    UnknownTeller(TellerId),

    /// The teller has to acknowledge receipt before completing.
    #[error("teller {0} has not acknowledged receipt")]
    NotAcknowledged(TellerId),

    /// A normal return needs every teller to be complete.
    #[error("{} teller(s) not yet complete", .pending.len())]
    IncompleteTellers { pending: Vec<TellerId> },

    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An asset rejected the change.
    #[error(transparent)]
    Asset(#[from] AssetError),
}

// ─── Records ─────────────────────────────────────────────────────────

/// A teller assigned to a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TellerAssignment {
    pub teller_id: TellerId,
    pub teller_name: String,
    pub received_at: Timestamp,
    pub acknowledged: bool,
    pub acknowledged_at: Option<Timestamp>,
}

/// A teller's completion status for a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub teller_id: TellerId,
    pub teller_name: String,
    pub is_complete: bool,
    pub notes: String,
    pub verified_at: Option<Timestamp>,
}

/// Who is performing a transition and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvidence {
    pub actor: UserId,
    pub reason: String,
}

impl TransitionEvidence {
    pub fn new(actor: UserId, reason: impl Into<String>) -> Self {
        Self {
            actor,
            reason: reason.into(),
        }
    }
}

/// Record of a deployment status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: DeploymentStatus,
    pub to: DeploymentStatus,
    pub timestamp: Timestamp,
    pub actor: UserId,
    pub reason: String,
    /// Set when the completeness precondition was overridden.
    pub forced: bool,
}

// ─── Inputs ──────────────────────────────────────────────────────────

/// A teller to assign at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TellerSlot {
    pub teller_id: String,
    #[serde(default)]
    pub teller_name: String,
}

/// Validated-on-create description of a new deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDraft {
    pub item_type: DeploymentItemType,
    pub item_name: String,
    pub item_description: String,
    pub quantity: u32,
    pub priority: Priority,
    pub expected_return_date: Timestamp,
    pub notes: String,
    pub tellers: Vec<TellerSlot>,
}

/// Editable, non-status fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetailsUpdate {
    pub item_description: Option<String>,
    pub quantity: Option<u32>,
    pub expected_return_date: Option<Timestamp>,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
}

// ─── Deployment ──────────────────────────────────────────────────────

/// An equipment loan and everything needed to audit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: DeploymentId,
    pub item_type: DeploymentItemType,
    pub item_name: String,
    pub item_description: String,
    pub quantity: u32,
    pub priority: Priority,
    pub status: DeploymentStatus,
    pub declarator_id: UserId,
    pub created_at: Timestamp,
    pub deployed_at: Option<Timestamp>,
    pub expected_return_date: Timestamp,
    pub actual_return_date: Option<Timestamp>,
    pub return_condition: Option<ReturnCondition>,
    pub completed_at: Option<Timestamp>,
    pub notes: String,
    pub assets: Vec<AssetItem>,
    pub assigned_tellers: Vec<TellerAssignment>,
    pub teller_completeness: Vec<CompletionRecord>,
    pub transitions: Vec<TransitionRecord>,
    /// Bumped on every committed mutation; the storage compare-and-set key.
    pub version: u64,
}

impl Deployment {
    /// Create a deployment in `Preparing`.
    ///
    /// `asset_count` is the number of assets that will be registered in the
    /// same write; a deployment needs either assets or an item name.
    pub fn create(
        id: DeploymentId,
        draft: DeploymentDraft,
        declarator: UserId,
        asset_count: usize,
        now: Timestamp,
    ) -> Result<Self, DeploymentError> {
        let item_name = draft.item_name.trim().to_string();
        if item_name.is_empty() && asset_count == 0 {
            return Err(ValidationError::Empty("itemName or assets").into());
        }
        if draft.quantity == 0 {
            return Err(ValidationError::invalid("quantity", "must be at least 1").into());
        }
        if draft.expected_return_date < now {
            return Err(ValidationError::invalid(
                "expectedReturnDate",
                "must not be before the creation time",
            )
            .into());
        }
        if draft.tellers.is_empty() {
            return Err(ValidationError::Empty("assignedTellers").into());
        }

        let mut assigned_tellers: Vec<TellerAssignment> = Vec::with_capacity(draft.tellers.len());
        for slot in draft.tellers {
            let teller_id = TellerId::parse(&slot.teller_id)?;
            if assigned_tellers.iter().any(|t| t.teller_id == teller_id) {
                return Err(ValidationError::invalid(
                    "assignedTellers",
                    format!("teller {teller_id} is listed twice"),
                )
                .into());
            }
            let teller_name = match slot.teller_name.trim() {
                "" => teller_id.to_string(),
                name => name.to_string(),
            };
            assigned_tellers.push(TellerAssignment {
                teller_id,
                teller_name,
                received_at: now,
                acknowledged: false,
                acknowledged_at: None,
            });
        }
        let teller_completeness = assigned_tellers
            .iter()
            .map(|t| CompletionRecord {
                teller_id: t.teller_id.clone(),
                teller_name: t.teller_name.clone(),
                is_complete: false,
                notes: String::new(),
                verified_at: None,
            })
            .collect();

        Ok(Self {
            id,
            item_type: draft.item_type,
            item_name,
            item_description: draft.item_description.trim().to_string(),
            quantity: draft.quantity,
            priority: draft.priority,
            status: DeploymentStatus::Preparing,
            declarator_id: declarator,
            created_at: now,
            deployed_at: None,
            expected_return_date: draft.expected_return_date,
            actual_return_date: None,
            return_condition: None,
            completed_at: None,
            notes: draft.notes.trim().to_string(),
            assets: Vec::new(),
            assigned_tellers,
            teller_completeness,
            transitions: Vec::new(),
            version: 0,
        })
    }

    // ── Status transitions ───────────────────────────────────────────

    /// Dispatch (PREPARING → DEPLOYED). Every attached asset goes to the field.
    pub fn mark_deployed(
        &mut self,
        evidence: &TransitionEvidence,
        now: Timestamp,
    ) -> Result<(), DeploymentError> {
        self.require_edge(DeploymentStatus::Deployed)?;
        let mut assets = self.assets.clone();
        for asset in assets.iter_mut().filter(|a| !a.is_settled()) {
            asset.dispatch(now)?;
        }
        self.assets = assets;
        self.deployed_at = Some(now);
        self.do_transition(DeploymentStatus::Deployed, evidence, false, now);
        Ok(())
    }

    /// Confirm active use (DEPLOYED → IN_USE).
    pub fn mark_in_use(
        &mut self,
        evidence: &TransitionEvidence,
        now: Timestamp,
    ) -> Result<(), DeploymentError> {
        self.require_edge(DeploymentStatus::InUse)?;
        self.do_transition(DeploymentStatus::InUse, evidence, false, now);
        Ok(())
    }

    /// Ask for the equipment back (IN_USE → PENDING_RETURN).
    pub fn request_return(
        &mut self,
        evidence: &TransitionEvidence,
        now: Timestamp,
    ) -> Result<(), DeploymentError> {
        self.require_edge(DeploymentStatus::PendingReturn)?;
        self.do_transition(DeploymentStatus::PendingReturn, evidence, false, now);
        Ok(())
    }

    /// Finalize a normal return. Requires every teller to be complete.
    pub fn mark_returned(
        &mut self,
        condition: ReturnCondition,
        return_notes: Option<&str>,
        evidence: &TransitionEvidence,
        now: Timestamp,
    ) -> Result<(), DeploymentError> {
        self.require_edge(DeploymentStatus::Returned)?;
        let pending = self.pending_tellers();
        if !pending.is_empty() {
            return Err(DeploymentError::IncompleteTellers { pending });
        }
        self.finish_return(condition, return_notes, evidence, false, now);
        Ok(())
    }

    /// Finalize a return without the completeness precondition.
    ///
    /// The transition record carries `forced = true` and the reason.
    pub fn force_return(
        &mut self,
        condition: ReturnCondition,
        return_notes: Option<&str>,
        evidence: &TransitionEvidence,
        now: Timestamp,
    ) -> Result<(), DeploymentError> {
        if evidence.reason.trim().is_empty() {
            return Err(ValidationError::Empty("reason").into());
        }
        self.require_edge(DeploymentStatus::Returned)?;
        self.finish_return(condition, return_notes, evidence, true, now);
        Ok(())
    }

    /// Report the deployment lost. Unsettled assets are settled as lost.
    pub fn mark_lost(
        &mut self,
        evidence: &TransitionEvidence,
        now: Timestamp,
    ) -> Result<(), DeploymentError> {
        self.require_edge(DeploymentStatus::Lost)?;
        self.settle_assets(ReturnCondition::Lost);
        self.return_condition = Some(ReturnCondition::Lost);
        self.do_transition(DeploymentStatus::Lost, evidence, false, now);
        Ok(())
    }

    /// Report the deployment damaged. Unsettled assets are settled as damaged.
    pub fn mark_damaged(
        &mut self,
        evidence: &TransitionEvidence,
        now: Timestamp,
    ) -> Result<(), DeploymentError> {
        self.require_edge(DeploymentStatus::Damaged)?;
        self.settle_assets(ReturnCondition::Damaged);
        self.return_condition = Some(ReturnCondition::Damaged);
        self.do_transition(DeploymentStatus::Damaged, evidence, false, now);
        Ok(())
    }

    /// Move to `target` through the operation that owns that edge.
    ///
    /// `Returned` uses a `good` condition and the completeness precondition.
    pub fn transition_to(
        &mut self,
        target: DeploymentStatus,
        evidence: &TransitionEvidence,
        now: Timestamp,
    ) -> Result<(), DeploymentError> {
        match target {
            DeploymentStatus::Preparing => Err(DeploymentError::InvalidTransition {
                from: self.status,
                to: target,
            }),
            DeploymentStatus::Deployed => self.mark_deployed(evidence, now),
            DeploymentStatus::InUse => self.mark_in_use(evidence, now),
            DeploymentStatus::PendingReturn => self.request_return(evidence, now),
            DeploymentStatus::Returned => {
                self.mark_returned(ReturnCondition::Good, None, evidence, now)
            }
            DeploymentStatus::Lost => self.mark_lost(evidence, now),
            DeploymentStatus::Damaged => self.mark_damaged(evidence, now),
        }
    }

    // ── Teller tracking ──────────────────────────────────────────────

    /// Record a teller's acknowledgment of receipt.
    ///
    /// Returns `false` when the teller had already acknowledged; nothing
    /// changes in that case.
    pub fn acknowledge(
        &mut self,
        teller: &TellerId,
        now: Timestamp,
    ) -> Result<bool, DeploymentError> {
        self.require_not_terminal()?;
        let assignment = self
            .assigned_tellers
            .iter_mut()
            .find(|t| &t.teller_id == teller)
            .ok_or_else(|| DeploymentError::UnknownTeller(teller.clone()))?;
        if assignment.acknowledged {
            return Ok(false);
        }
        assignment.acknowledged = true;
        assignment.acknowledged_at = Some(now);
        Ok(true)
    }

    /// Record that a teller has finished with the deployment.
    ///
    /// Returns `true` if this call made every teller complete for the first
    /// time.
    pub fn mark_complete(
        &mut self,
        teller: &TellerId,
        notes: &str,
        now: Timestamp,
    ) -> Result<bool, DeploymentError> {
        self.require_not_terminal()?;
        let assignment = self
            .assigned_tellers
            .iter()
            .find(|t| &t.teller_id == teller)
            .ok_or_else(|| DeploymentError::UnknownTeller(teller.clone()))?;
        if !assignment.acknowledged {
            return Err(DeploymentError::NotAcknowledged(teller.clone()));
        }
        let teller_name = assignment.teller_name.clone();

        let record = CompletionRecord {
            teller_id: teller.clone(),
            teller_name,
            is_complete: true,
            notes: notes.trim().to_string(),
            verified_at: Some(now),
        };
        match self
            .teller_completeness
            .iter_mut()
            .find(|r| &r.teller_id == teller)
        {
            Some(existing) => *existing = record,
            None => self.teller_completeness.push(record),
        }

        if self.completed_at.is_none() && self.all_tellers_complete() {
            self.completed_at = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    /// Conjunction of every completion record. Never stored.
    pub fn all_tellers_complete(&self) -> bool {
        self.assigned_tellers.iter().all(|t| {
            self.teller_completeness
                .iter()
                .any(|r| r.teller_id == t.teller_id && r.is_complete)
        })
    }

    /// Tellers whose completion is still outstanding, in assignment order.
    pub fn pending_tellers(&self) -> Vec<TellerId> {
        self.assigned_tellers
            .iter()
            .filter(|t| {
                !self
                    .teller_completeness
                    .iter()
                    .any(|r| r.teller_id == t.teller_id && r.is_complete)
            })
            .map(|t| t.teller_id.clone())
            .collect()
    }

    /// `(complete, total)` teller counts.
    pub fn completion_counts(&self) -> (usize, usize) {
        let total = self.assigned_tellers.len();
        (total - self.pending_tellers().len(), total)
    }

    pub fn is_assigned(&self, teller: &TellerId) -> bool {
        self.assigned_tellers.iter().any(|t| &t.teller_id == teller)
    }

    // ── Assets ───────────────────────────────────────────────────────

    /// Attach freshly registered assets, bringing them up to the
    /// deployment's current custody stage.
    pub fn attach_assets(
        &mut self,
        items: Vec<AssetItem>,
        now: Timestamp,
    ) -> Result<(), DeploymentError> {
        if items.is_empty() {
            return Err(ValidationError::Empty("assets").into());
        }
        if self.status.is_terminal() {
            return Err(DeploymentError::InvalidTransition {
                from: self.status,
                to: self.status,
            });
        }
        let mut staged = Vec::with_capacity(items.len());
        for mut item in items {
            if self.status.is_in_field() {
                item.dispatch(now)?;
            } else {
                item.assign()?;
            }
            staged.push(item);
        }
        self.assets.extend(staged);
        Ok(())
    }

    pub fn asset(&self, asset_id: &str) -> Option<&AssetItem> {
        self.assets.iter().find(|a| a.asset_id.as_str() == asset_id)
    }

    pub fn asset_mut(&mut self, asset_id: &str) -> Option<&mut AssetItem> {
        self.assets
            .iter_mut()
            .find(|a| a.asset_id.as_str() == asset_id)
    }

    /// Number of assets that reached a terminal status.
    pub fn assets_settled(&self) -> usize {
        self.assets.iter().filter(|a| a.is_settled()).count()
    }

    /// Whether every asset reached a terminal status. Vacuously true with
    /// no assets.
    pub fn all_assets_settled(&self) -> bool {
        self.assets.iter().all(|a| a.is_settled())
    }

    // ── Details ──────────────────────────────────────────────────────

    /// Edit non-status fields.
    pub fn update_details(&mut self, update: DetailsUpdate) -> Result<(), DeploymentError> {
        self.require_not_terminal()?;
        if update.quantity == Some(0) {
            return Err(ValidationError::invalid("quantity", "must be at least 1").into());
        }
        if let Some(date) = update.expected_return_date {
            if date < self.created_at {
                return Err(ValidationError::invalid(
                    "expectedReturnDate",
                    "must not be before the creation time",
                )
                .into());
            }
            self.expected_return_date = date;
        }
        if let Some(description) = update.item_description {
            self.item_description = description.trim().to_string();
        }
        if let Some(quantity) = update.quantity {
            self.quantity = quantity;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(notes) = update.notes {
            self.notes = notes.trim().to_string();
        }
        Ok(())
    }

    // ── Due dates ────────────────────────────────────────────────────

    /// Past the expected return date and not returned.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status != DeploymentStatus::Returned && now > self.expected_return_date
    }

    /// Whole days past due; zero unless overdue.
    pub fn days_overdue(&self, now: Timestamp) -> i64 {
        if self.is_overdue(now) {
            now.whole_days_since(&self.expected_return_date)
        } else {
            0
        }
    }

    /// Whole days until the expected return date (negative once past it).
    pub fn days_until_due(&self, now: Timestamp) -> i64 {
        self.expected_return_date.whole_days_since(&now)
    }

    pub fn return_status(&self, now: Timestamp) -> ReturnStatus {
        if self.status == DeploymentStatus::Returned {
            ReturnStatus::Returned
        } else if self.is_overdue(now) {
            ReturnStatus::Overdue
        } else if self.days_until_due(now) <= DUE_SOON_DAYS {
            ReturnStatus::DueSoon
        } else {
            ReturnStatus::NotDue
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn require_not_terminal(&self) -> Result<(), DeploymentError> {
        if self.status.is_terminal() {
            return Err(DeploymentError::TerminalState {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Validate that `to` is on an edge out of the current status.
    fn require_edge(&self, to: DeploymentStatus) -> Result<(), DeploymentError> {
        if !self.status.can_transition_to(to) {
            return Err(DeploymentError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn finish_return(
        &mut self,
        condition: ReturnCondition,
        return_notes: Option<&str>,
        evidence: &TransitionEvidence,
        forced: bool,
        now: Timestamp,
    ) {
        self.settle_assets(condition);
        self.return_condition = Some(condition);
        self.actual_return_date = Some(now);
        if let Some(text) = return_notes.map(str::trim).filter(|t| !t.is_empty()) {
            self.append_note(&format!("Return notes: {text}"));
        }
        self.do_transition(DeploymentStatus::Returned, evidence, forced, now);
    }

    fn settle_assets(&mut self, condition: ReturnCondition) {
        for asset in &mut self.assets {
            asset.settle(condition);
        }
    }

    fn append_note(&mut self, line: &str) {
        if self.notes.is_empty() {
            self.notes = line.to_string();
        } else {
            self.notes = format!("{}\n\n{line}", self.notes);
        }
    }

    /// Record a status transition.
    fn do_transition(
        &mut self,
        to: DeploymentStatus,
        evidence: &TransitionEvidence,
        forced: bool,
        now: Timestamp,
    ) {
        self.transitions.push(TransitionRecord {
            from: self.status,
            to,
            timestamp: now,
            actor: evidence.actor.clone(),
            reason: evidence.reason.clone(),
            forced,
        });
        self.status = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetStatus, NewAsset, QrSeed};
    use depot_core::{AssetId, AssetKind};

    fn t0() -> Timestamp {
        Timestamp::parse("2026-03-01T09:00:00Z").unwrap()
    }

    fn evidence(reason: &str) -> TransitionEvidence {
        TransitionEvidence::new(UserId::from("decl-1"), reason)
    }

    fn make_draft(tellers: &[&str]) -> DeploymentDraft {
        DeploymentDraft {
            item_type: DeploymentItemType::Equipment,
            item_name: "Receipt printers".into(),
            item_description: String::new(),
            quantity: 2,
            priority: Priority::High,
            expected_return_date: t0().plus_days(7),
            notes: String::new(),
            tellers: tellers
                .iter()
                .map(|id| TellerSlot {
                    teller_id: id.to_string(),
                    teller_name: format!("Teller {id}"),
                })
                .collect(),
        }
    }

    fn make_deployment() -> Deployment {
        Deployment::create(
            DeploymentId::new(),
            make_draft(&["T1", "T2"]),
            UserId::from("decl-1"),
            0,
            t0(),
        )
        .unwrap()
    }

    fn make_asset(dep: &Deployment, seq: usize) -> AssetItem {
        AssetItem::register(
            AssetId::compose(&dep.id, AssetKind::Printer, seq),
            dep.id,
            NewAsset {
                kind: AssetKind::Printer,
                label: format!("Printer {seq}"),
                serial_number: String::new(),
                quantity: 1,
            },
            QrSeed::new(format!("seed-{seq}")),
            t0(),
        )
    }

    fn make_deployed() -> Deployment {
        let mut dep = make_deployment();
        let assets = vec![make_asset(&dep, 1), make_asset(&dep, 2)];
        dep.attach_assets(assets, t0()).unwrap();
        dep.mark_deployed(&evidence("dispatch"), t0()).unwrap();
        dep
    }

    fn complete_all(dep: &mut Deployment) {
        for teller in ["T1", "T2"] {
            let id = TellerId::from(teller);
            dep.acknowledge(&id, t0()).unwrap();
            dep.mark_complete(&id, "ok", t0()).unwrap();
        }
    }

    #[test]
    fn test_create_starts_preparing_with_open_completion_records() {
        let dep = make_deployment();
        assert_eq!(dep.status, DeploymentStatus::Preparing);
        assert_eq!(dep.teller_completeness.len(), 2);
        assert!(!dep.all_tellers_complete());
        assert!(dep.transitions.is_empty());
        assert_eq!(dep.assigned_tellers[0].received_at, t0());
    }

    #[test]
    fn test_create_requires_a_teller() {
        let err = Deployment::create(
            DeploymentId::new(),
            make_draft(&[]),
            UserId::from("d"),
            0,
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, DeploymentError::Validation(ValidationError::Empty(_))));
    }

    #[test]
    fn test_create_rejects_duplicate_and_blank_tellers() {
        assert!(Deployment::create(
            DeploymentId::new(),
            make_draft(&["T1", "T1"]),
            UserId::from("d"),
            0,
            t0()
        )
        .is_err());
        assert!(Deployment::create(
            DeploymentId::new(),
            make_draft(&["  "]),
            UserId::from("d"),
            0,
            t0()
        )
        .is_err());
    }

    #[test]
    fn test_create_needs_item_name_or_assets() {
        let mut draft = make_draft(&["T1"]);
        draft.item_name = "  ".into();
        assert!(Deployment::create(DeploymentId::new(), draft.clone(), "d".into(), 0, t0()).is_err());
        assert!(Deployment::create(DeploymentId::new(), draft, "d".into(), 1, t0()).is_ok());
    }

    #[test]
    fn test_create_rejects_return_date_before_creation() {
        let mut draft = make_draft(&["T1"]);
        draft.expected_return_date = t0().plus_days(-1);
        assert!(Deployment::create(DeploymentId::new(), draft, "d".into(), 0, t0()).is_err());
    }

    #[test]
    fn test_blank_teller_name_falls_back_to_id() {
        let mut draft = make_draft(&["T9"]);
        draft.tellers[0].teller_name = String::new();
        let dep = Deployment::create(DeploymentId::new(), draft, "d".into(), 0, t0()).unwrap();
        assert_eq!(dep.assigned_tellers[0].teller_name, "T9");
    }

    #[test]
    fn test_attach_assets_while_preparing_assigns_them() {
        let mut dep = make_deployment();
        let asset = make_asset(&dep, 1);
        dep.attach_assets(vec![asset], t0()).unwrap();
        assert_eq!(dep.assets[0].status, AssetStatus::Assigned);
    }

    #[test]
    fn test_attach_assets_after_dispatch_deploys_them() {
        let mut dep = make_deployed();
        let asset = make_asset(&dep, 3);
        dep.attach_assets(vec![asset], t0()).unwrap();
        assert_eq!(dep.assets[2].status, AssetStatus::Deployed);
    }

    #[test]
    fn test_attach_assets_rejects_empty_and_terminal() {
        let mut dep = make_deployed();
        assert!(matches!(
            dep.attach_assets(Vec::new(), t0()),
            Err(DeploymentError::Validation(_))
        ));
        dep.mark_lost(&evidence("gone"), t0()).unwrap();
        let asset = make_asset(&dep, 9);
        assert!(matches!(
            dep.attach_assets(vec![asset], t0()),
            Err(DeploymentError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_mark_deployed_dispatches_assets() {
        let dep = make_deployed();
        assert_eq!(dep.status, DeploymentStatus::Deployed);
        assert_eq!(dep.deployed_at, Some(t0()));
        assert!(dep.assets.iter().all(|a| a.status == AssetStatus::Deployed));
        assert_eq!(dep.transitions.len(), 1);
        assert_eq!(dep.transitions[0].from, DeploymentStatus::Preparing);
        assert!(!dep.transitions[0].forced);
    }

    #[test]
    fn test_mark_deployed_twice_is_invalid() {
        let mut dep = make_deployed();
        let before = dep.clone();
        let err = dep.mark_deployed(&evidence("again"), t0()).unwrap_err();
        assert!(matches!(err, DeploymentError::InvalidTransition { .. }));
        assert_eq!(dep, before);
    }

    #[test]
    fn test_full_lifecycle_through_return() {
        let mut dep = make_deployed();
        dep.mark_in_use(&evidence("in use"), t0()).unwrap();
        dep.request_return(&evidence("shift over"), t0()).unwrap();
        complete_all(&mut dep);
        let later = t0().plus_days(2);
        dep.mark_returned(ReturnCondition::Good, Some("all fine"), &evidence("back"), later)
            .unwrap();
        assert_eq!(dep.status, DeploymentStatus::Returned);
        assert_eq!(dep.actual_return_date, Some(later));
        assert_eq!(dep.return_condition, Some(ReturnCondition::Good));
        assert!(dep.notes.ends_with("Return notes: all fine"));
        assert!(dep.assets.iter().all(|a| a.status == AssetStatus::Returned));
        assert_eq!(dep.transitions.len(), 4);
    }

    #[test]
    fn test_return_requires_all_tellers_complete() {
        let mut dep = make_deployed();
        let t1 = TellerId::from("T1");
        dep.acknowledge(&t1, t0()).unwrap();
        dep.mark_complete(&t1, "done", t0()).unwrap();
        let before = dep.clone();
        let err = dep
            .mark_returned(ReturnCondition::Good, None, &evidence("back"), t0())
            .unwrap_err();
        assert_eq!(
            err,
            DeploymentError::IncompleteTellers {
                pending: vec![TellerId::from("T2")]
            }
        );
        assert_eq!(dep, before);
    }

    #[test]
    fn test_return_from_preparing_is_invalid_transition() {
        let mut dep = make_deployment();
        let err = dep
            .mark_returned(ReturnCondition::Good, None, &evidence("x"), t0())
            .unwrap_err();
        assert!(matches!(err, DeploymentError::InvalidTransition { .. }));
    }

    #[test]
    fn test_return_propagation_skips_scanned_assets() {
        let mut dep = make_deployed();
        let first = dep.assets[0].asset_id.clone();
        dep.asset_mut(first.as_str())
            .unwrap()
            .scan_return("T1".into(), ReturnCondition::Damaged, "cracked", t0())
            .unwrap();
        complete_all(&mut dep);
        dep.mark_returned(ReturnCondition::Excellent, None, &evidence("back"), t0())
            .unwrap();
        assert_eq!(dep.assets[0].status, AssetStatus::Damaged);
        assert_eq!(dep.assets[0].condition, Some(ReturnCondition::Damaged));
        assert_eq!(dep.assets[1].status, AssetStatus::Returned);
        assert_eq!(dep.assets[1].condition, Some(ReturnCondition::Excellent));
    }

    #[test]
    fn test_force_return_skips_completeness_and_is_marked() {
        let mut dep = make_deployed();
        let admin = TransitionEvidence::new(UserId::from("admin-1"), "teller unreachable");
        dep.force_return(ReturnCondition::Fair, None, &admin, t0()).unwrap();
        assert_eq!(dep.status, DeploymentStatus::Returned);
        let record = dep.transitions.last().unwrap();
        assert!(record.forced);
        assert_eq!(record.actor.as_str(), "admin-1");
        assert_eq!(record.reason, "teller unreachable");
    }

    #[test]
    fn test_force_return_requires_reason() {
        let mut dep = make_deployed();
        let err = dep
            .force_return(ReturnCondition::Good, None, &evidence("  "), t0())
            .unwrap_err();
        assert!(matches!(err, DeploymentError::Validation(_)));
        assert_eq!(dep.status, DeploymentStatus::Deployed);
    }

    #[test]
    fn test_lost_and_damaged_branches() {
        let mut lost = make_deployed();
        lost.mark_lost(&evidence("stolen"), t0()).unwrap();
        assert_eq!(lost.status, DeploymentStatus::Lost);
        assert!(lost.assets.iter().all(|a| a.status == AssetStatus::Lost));

        let mut damaged = make_deployed();
        damaged.mark_in_use(&evidence("use"), t0()).unwrap();
        damaged.mark_damaged(&evidence("flood"), t0()).unwrap();
        assert_eq!(damaged.status, DeploymentStatus::Damaged);
        assert!(damaged.assets.iter().all(|a| a.status == AssetStatus::Damaged));
    }

    #[test]
    fn test_cannot_lose_from_preparing() {
        let mut dep = make_deployment();
        assert!(dep.mark_lost(&evidence("x"), t0()).is_err());
    }

    #[test]
    fn test_transition_to_preparing_is_never_valid() {
        for status in DeploymentStatus::ALL {
            assert!(!status.can_transition_to(DeploymentStatus::Preparing));
        }
        let mut dep = make_deployed();
        assert!(dep
            .transition_to(DeploymentStatus::Preparing, &evidence("x"), t0())
            .is_err());
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let mut dep = make_deployed();
        let t1 = TellerId::from("T1");
        assert!(dep.acknowledge(&t1, t0()).unwrap());
        let after_first = dep.clone();
        assert!(!dep.acknowledge(&t1, t0().plus_days(1)).unwrap());
        assert_eq!(dep, after_first);
    }

    #[test]
    fn test_acknowledge_unknown_teller() {
        let mut dep = make_deployed();
        assert!(matches!(
            dep.acknowledge(&TellerId::from("T9"), t0()),
            Err(DeploymentError::UnknownTeller(_))
        ));
    }

    #[test]
    fn test_complete_requires_acknowledgment() {
        let mut dep = make_deployed();
        let err = dep
            .mark_complete(&TellerId::from("T1"), "done", t0())
            .unwrap_err();
        assert!(matches!(err, DeploymentError::NotAcknowledged(_)));
    }

    #[test]
    fn test_completed_at_is_set_once() {
        let mut dep = make_deployed();
        let t1 = TellerId::from("T1");
        let t2 = TellerId::from("T2");
        dep.acknowledge(&t1, t0()).unwrap();
        dep.acknowledge(&t2, t0()).unwrap();
        assert!(!dep.mark_complete(&t1, "a", t0()).unwrap());
        assert!(dep.mark_complete(&t2, "b", t0().plus_days(1)).unwrap());
        assert_eq!(dep.completed_at, Some(t0().plus_days(1)));
        // Re-completing updates notes but never moves completedAt.
        assert!(!dep.mark_complete(&t2, "b2", t0().plus_days(2)).unwrap());
        assert_eq!(dep.completed_at, Some(t0().plus_days(1)));
        assert_eq!(dep.completion_counts(), (2, 2));
    }

    #[test]
    fn test_teller_actions_rejected_on_terminal() {
        let mut dep = make_deployed();
        dep.mark_lost(&evidence("gone"), t0()).unwrap();
        assert!(matches!(
            dep.acknowledge(&TellerId::from("T1"), t0()),
            Err(DeploymentError::TerminalState { .. })
        ));
    }

    #[test]
    fn test_update_details_never_touches_status() {
        let mut dep = make_deployed();
        dep.update_details(DetailsUpdate {
            priority: Some(Priority::Urgent),
            quantity: Some(5),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(dep.priority, Priority::Urgent);
        assert_eq!(dep.quantity, 5);
        assert_eq!(dep.status, DeploymentStatus::Deployed);
    }

    #[test]
    fn test_update_details_validation() {
        let mut dep = make_deployed();
        assert!(dep
            .update_details(DetailsUpdate {
                quantity: Some(0),
                ..Default::default()
            })
            .is_err());
        assert!(dep
            .update_details(DetailsUpdate {
                expected_return_date: Some(t0().plus_days(-3)),
                ..Default::default()
            })
            .is_err());
        dep.mark_lost(&evidence("gone"), t0()).unwrap();
        assert!(dep.update_details(DetailsUpdate::default()).is_err());
    }

    #[test]
    fn test_invalid_transition_names_allowed_targets() {
        let err = DeploymentError::InvalidTransition {
            from: DeploymentStatus::Preparing,
            to: DeploymentStatus::Returned,
        };
        assert_eq!(
            err.to_string(),
            "invalid deployment transition: preparing -> returned (allowed from preparing: deployed)"
        );
        let err = DeploymentError::InvalidTransition {
            from: DeploymentStatus::Lost,
            to: DeploymentStatus::Deployed,
        };
        assert!(err.to_string().ends_with("(allowed from lost: none)"));
    }

    #[test]
    fn test_overdue_partial_day_floors() {
        let dep = make_deployed();
        assert_eq!(dep.expected_return_date.to_iso8601(), "2026-03-08T09:00:00Z");
        let evening = Timestamp::parse("2026-03-08T21:00:00Z").unwrap();
        assert!(dep.is_overdue(evening));
        assert_eq!(dep.days_until_due(evening), -1);
        assert_eq!(dep.days_overdue(evening), 0);
        assert_eq!(dep.return_status(evening), ReturnStatus::Overdue);

        let morning = Timestamp::parse("2026-03-07T21:00:00Z").unwrap();
        assert!(!dep.is_overdue(morning));
        assert_eq!(dep.days_until_due(morning), 0);
    }

    #[test]
    fn test_overdue_is_derived_from_clock() {
        let dep = make_deployed();
        let due = dep.expected_return_date;
        assert!(!dep.is_overdue(due));
        assert!(dep.is_overdue(due.plus_days(2)));
        assert_eq!(dep.days_overdue(due.plus_days(2)), 2);
        assert_eq!(dep.return_status(due.plus_days(2)), ReturnStatus::Overdue);
        assert_eq!(dep.return_status(due.plus_days(-2)), ReturnStatus::DueSoon);
        assert_eq!(dep.return_status(due.plus_days(-5)), ReturnStatus::NotDue);
    }

    #[test]
    fn test_returned_is_never_overdue() {
        let mut dep = make_deployed();
        complete_all(&mut dep);
        dep.mark_returned(ReturnCondition::Good, None, &evidence("back"), t0())
            .unwrap();
        let far = dep.expected_return_date.plus_days(30);
        assert!(!dep.is_overdue(far));
        assert_eq!(dep.return_status(far), ReturnStatus::Returned);
    }

    #[test]
    fn test_status_wire_names_round_trip() {
        for status in DeploymentStatus::ALL {
            assert_eq!(DeploymentStatus::parse(status.as_str()).unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!(DeploymentStatus::parse("archived").is_err());
    }

    #[test]
    fn test_deployment_serialization_is_camel_case() {
        let json = serde_json::to_value(make_deployed()).unwrap();
        assert!(json.get("expectedReturnDate").is_some());
        assert!(json.get("assignedTellers").is_some());
        assert_eq!(json["status"], "deployed");
        let restored: Deployment = serde_json::from_value(json).unwrap();
        assert_eq!(restored.status, DeploymentStatus::Deployed);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_status() -> impl Strategy<Value = DeploymentStatus> {
            (0usize..DeploymentStatus::ALL.len()).prop_map(|i| DeploymentStatus::ALL[i])
        }

        proptest! {
            #[test]
            fn status_only_moves_along_table_edges(
                targets in proptest::collection::vec(arb_status(), 1..12),
                complete in any::<bool>(),
            ) {
                let mut dep = make_deployed();
                if complete {
                    complete_all(&mut dep);
                }
                for target in targets {
                    let before = dep.clone();
                    match dep.transition_to(target, &evidence("prop"), t0()) {
                        Ok(()) => {
                            prop_assert!(before.status.can_transition_to(target));
                            prop_assert_eq!(dep.status, target);
                            prop_assert_eq!(dep.transitions.len(), before.transitions.len() + 1);
                        }
                        Err(_) => prop_assert_eq!(&dep, &before),
                    }
                }
            }

            #[test]
            fn terminal_statuses_have_no_exits(status in arb_status()) {
                if status.is_terminal() {
                    prop_assert!(status.valid_transitions().is_empty());
                }
            }
        }
    }
}
