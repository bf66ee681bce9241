//! # Deployment Manager
//!
//! Owns the deployment lifecycle. Every operation authorizes the caller,
//! then applies one transition to the stored deployment through a single
//! conditional write ([`Store::try_update`]): either the whole change
//! commits with a bumped version, or the error is returned and nothing
//! changed. Notifications go out after commit.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use depot_core::{
    DeploymentId, DeploymentItemType, Principal, Priority, ReturnCondition, TellerId, Timestamp,
    ValidationError,
};
use depot_state::{
    Deployment, DeploymentDraft, DeploymentStatus, DetailsUpdate, NewAsset, TellerSlot,
    TransitionEvidence,
};

use crate::access;
use crate::error::CustodyError;
use crate::notify::{CustodyEvent, Notifier};
use crate::registry::mint_assets;
use crate::store::Store;

/// Everything needed to open a deployment.
#[derive(Debug, Clone, Default)]
pub struct CreateDeployment {
    pub item_type: DeploymentItemType,
    pub item_name: String,
    pub item_description: String,
    pub quantity: Option<u32>,
    pub priority: Priority,
    pub expected_return_date: Option<Timestamp>,
    pub notes: String,
    pub tellers: Vec<TellerSlot>,
    pub assets: Vec<NewAsset>,
}

/// Parameters of a return.
#[derive(Debug, Clone, Default)]
pub struct ReturnRequest {
    pub condition: ReturnCondition,
    pub notes: Option<String>,
}

/// Deployment lifecycle operations over the shared store.
#[derive(Clone)]
pub struct DeploymentManager {
    store: Store<Deployment>,
    notifier: Arc<dyn Notifier>,
    /// Due date each deployment had when its overdue event went out.
    overdue_notified: Arc<Mutex<HashMap<DeploymentId, Timestamp>>>,
}

impl std::fmt::Debug for DeploymentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentManager")
            .field("deployments", &self.store.len())
            .finish()
    }
}

impl DeploymentManager {
    pub fn new(store: Store<Deployment>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            overdue_notified: Arc::default(),
        }
    }

    /// Open a deployment in `preparing`, registering any supplied assets in
    /// the same write.
    pub fn create(
        &self,
        principal: &Principal,
        request: CreateDeployment,
    ) -> Result<Deployment, CustodyError> {
        access::require_staff(principal, "create deployments")?;
        let now = Timestamp::now();
        let expected_return_date = request
            .expected_return_date
            .ok_or(ValidationError::Empty("expectedReturnDate"))?;
        let asset_count = request.assets.len();
        let mut item_name = request.item_name.trim().to_string();
        if item_name.is_empty() {
            item_name = request
                .assets
                .iter()
                .map(|a| a.label.trim())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
        }
        let draft = DeploymentDraft {
            item_type: request.item_type,
            item_name,
            item_description: request.item_description,
            quantity: request.quantity.unwrap_or(1),
            priority: request.priority,
            expected_return_date,
            notes: request.notes,
            tellers: request.tellers,
        };

        let mut deployment = Deployment::create(
            DeploymentId::new(),
            draft,
            principal.user_id.clone(),
            asset_count,
            now,
        )?;
        if !request.assets.is_empty() {
            let minted = mint_assets(&deployment, request.assets, now)?;
            deployment.attach_assets(minted, now)?;
        }
        self.store.insert(*deployment.id.as_uuid(), deployment.clone());

        tracing::info!(
            deployment_id = %deployment.id,
            actor = %principal.user_id,
            tellers = deployment.assigned_tellers.len(),
            assets = deployment.assets.len(),
            "deployment created"
        );
        metrics::counter!("depot_deployments_created_total").increment(1);
        Ok(deployment)
    }

    /// Fetch one deployment the caller may read.
    pub fn get(&self, principal: &Principal, id: DeploymentId) -> Result<Deployment, CustodyError> {
        let deployment = self.load(id)?;
        access::require_read(principal, &deployment)?;
        Ok(deployment)
    }

    /// Every deployment the caller may read.
    pub fn visible_to(&self, principal: &Principal) -> Vec<Deployment> {
        self.store
            .list()
            .into_iter()
            .filter(|d| access::can_read(principal, d))
            .collect()
    }

    /// Deployments assigned to `teller`, newest first. Tellers may only ask
    /// about themselves.
    pub fn list_for_teller(
        &self,
        principal: &Principal,
        teller: &TellerId,
    ) -> Result<Vec<Deployment>, CustodyError> {
        if !principal.can_read_all() && !principal.is_teller(teller) {
            return Err(CustodyError::forbidden("list another teller's deployments"));
        }
        let mut assigned: Vec<Deployment> = self
            .store
            .list()
            .into_iter()
            .filter(|d| d.is_assigned(teller))
            .collect();
        assigned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(assigned)
    }

    /// Every stored deployment, unfiltered.
    pub fn all(&self) -> Vec<Deployment> {
        self.store.list()
    }

    /// Edit non-status fields.
    pub fn update_details(
        &self,
        principal: &Principal,
        id: DeploymentId,
        update: DetailsUpdate,
    ) -> Result<Deployment, CustodyError> {
        access::require_staff(principal, "edit deployments")?;
        let (_, committed) = self.mutate(id, |d| {
            access::require_owner_or_admin(principal, d, "edit deployments")?;
            d.update_details(update).map_err(Into::into)
        })?;
        tracing::info!(deployment_id = %id, actor = %principal.user_id, "deployment details updated");
        Ok(committed)
    }

    /// PREPARING → DEPLOYED.
    pub fn mark_deployed(
        &self,
        principal: &Principal,
        id: DeploymentId,
    ) -> Result<Deployment, CustodyError> {
        self.staff_transition(principal, id, DeploymentStatus::Deployed, "dispatched")
    }

    /// DEPLOYED → IN_USE.
    pub fn mark_in_use(
        &self,
        principal: &Principal,
        id: DeploymentId,
    ) -> Result<Deployment, CustodyError> {
        self.staff_transition(principal, id, DeploymentStatus::InUse, "in use")
    }

    /// IN_USE → PENDING_RETURN.
    pub fn request_return(
        &self,
        principal: &Principal,
        id: DeploymentId,
    ) -> Result<Deployment, CustodyError> {
        self.staff_transition(principal, id, DeploymentStatus::PendingReturn, "return requested")
    }

    pub fn mark_lost(
        &self,
        principal: &Principal,
        id: DeploymentId,
        reason: &str,
    ) -> Result<Deployment, CustodyError> {
        self.staff_transition(principal, id, DeploymentStatus::Lost, reason)
    }

    pub fn mark_damaged(
        &self,
        principal: &Principal,
        id: DeploymentId,
        reason: &str,
    ) -> Result<Deployment, CustodyError> {
        self.staff_transition(principal, id, DeploymentStatus::Damaged, reason)
    }

    /// Move to `target` through the operation owning that edge. A return
    /// reached this way uses condition `good`.
    pub fn transition(
        &self,
        principal: &Principal,
        id: DeploymentId,
        target: DeploymentStatus,
    ) -> Result<Deployment, CustodyError> {
        let reason = format!("status set to {target}");
        self.staff_transition(principal, id, target, &reason)
    }

    /// Normal return. Requires every teller to be complete.
    pub fn mark_returned(
        &self,
        principal: &Principal,
        id: DeploymentId,
        request: ReturnRequest,
    ) -> Result<Deployment, CustodyError> {
        access::require_staff(principal, "return deployments")?;
        let evidence = TransitionEvidence::new(principal.user_id.clone(), "returned");
        let now = Timestamp::now();
        let (_, committed) = self.mutate(id, |d| {
            access::require_owner_or_admin(principal, d, "return deployments")?;
            d.mark_returned(request.condition, request.notes.as_deref(), &evidence, now)
                .map_err(Into::into)
        })?;
        self.after_return(principal, &committed, false);
        Ok(committed)
    }

    /// Audited override: return without the completeness precondition.
    pub fn force_return(
        &self,
        principal: &Principal,
        id: DeploymentId,
        request: ReturnRequest,
        reason: &str,
    ) -> Result<Deployment, CustodyError> {
        access::require_admin(principal, "force a return")?;
        let evidence = TransitionEvidence::new(principal.user_id.clone(), reason.trim());
        let now = Timestamp::now();
        let (_, committed) = self.mutate(id, |d| {
            d.force_return(request.condition, request.notes.as_deref(), &evidence, now)
                .map_err(Into::into)
        })?;
        tracing::warn!(
            deployment_id = %id,
            actor = %principal.user_id,
            reason = %evidence.reason,
            pending_tellers = committed.pending_tellers().len(),
            "forced return"
        );
        self.after_return(principal, &committed, true);
        Ok(committed)
    }

    /// The calling teller acknowledges receipt. Idempotent.
    pub fn acknowledge(
        &self,
        principal: &Principal,
        id: DeploymentId,
    ) -> Result<Deployment, CustodyError> {
        let teller = Self::calling_teller(principal, "acknowledge deployments")?;
        let now = Timestamp::now();
        let (changed, committed) = self.mutate(id, |d| {
            if !d.is_assigned(&teller) {
                return Err(CustodyError::forbidden("acknowledge a deployment not assigned to you"));
            }
            Ok(d.acknowledge(&teller, now)?)
        })?;
        if changed {
            tracing::info!(deployment_id = %id, teller_id = %teller, "teller acknowledged");
        }
        Ok(committed)
    }

    /// The calling teller marks their part complete.
    pub fn mark_complete(
        &self,
        principal: &Principal,
        id: DeploymentId,
        notes: &str,
    ) -> Result<Deployment, CustodyError> {
        let teller = Self::calling_teller(principal, "complete deployments")?;
        let now = Timestamp::now();
        let (all_complete, committed) = self.mutate(id, |d| {
            if !d.is_assigned(&teller) {
                return Err(CustodyError::forbidden("complete a deployment not assigned to you"));
            }
            Ok(d.mark_complete(&teller, notes, now)?)
        })?;
        tracing::info!(deployment_id = %id, teller_id = %teller, "teller complete");
        if all_complete {
            self.notifier
                .notify(CustodyEvent::AllTellersComplete { deployment_id: id });
        }
        Ok(committed)
    }

    /// Emit [`CustodyEvent::Overdue`] for deployments that are overdue at
    /// `now`, once per deployment and due date. A deployment that stops
    /// being overdue, e.g. because its due date moved, is re-armed. Returns
    /// the ids notified by this call.
    pub fn flag_overdue(&self, now: Timestamp) -> Vec<DeploymentId> {
        let overdue: Vec<Deployment> = self
            .store
            .list()
            .into_iter()
            .filter(|d| d.is_overdue(now))
            .collect();
        metrics::gauge!("depot_deployments_overdue").set(overdue.len() as f64);

        let mut fresh = Vec::new();
        {
            let mut notified = self.overdue_notified.lock();
            notified.retain(|id, _| overdue.iter().any(|d| d.id == *id));
            for d in &overdue {
                if notified.insert(d.id, d.expected_return_date) != Some(d.expected_return_date) {
                    fresh.push((d.id, d.days_overdue(now)));
                }
            }
        }
        for &(deployment_id, days_overdue) in &fresh {
            self.notifier.notify(CustodyEvent::Overdue {
                deployment_id,
                days_overdue,
            });
        }
        fresh.into_iter().map(|(id, _)| id).collect()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn staff_transition(
        &self,
        principal: &Principal,
        id: DeploymentId,
        target: DeploymentStatus,
        reason: &str,
    ) -> Result<Deployment, CustodyError> {
        access::require_staff(principal, "change deployment status")?;
        let evidence = TransitionEvidence::new(principal.user_id.clone(), reason);
        let now = Timestamp::now();
        let (from, committed) = self.mutate(id, |d| {
            access::require_owner_or_admin(principal, d, "change deployment status")?;
            let from = d.status;
            d.transition_to(target, &evidence, now)?;
            Ok(from)
        })?;
        tracing::info!(
            deployment_id = %id,
            from = %from,
            to = %committed.status,
            actor = %principal.user_id,
            "deployment transition"
        );
        if target == DeploymentStatus::Returned {
            self.after_return(principal, &committed, false);
        } else {
            metrics::counter!("depot_deployment_transitions_total", "to" => target.as_str())
                .increment(1);
        }
        Ok(committed)
    }

    fn after_return(&self, principal: &Principal, committed: &Deployment, forced: bool) {
        tracing::info!(
            deployment_id = %committed.id,
            actor = %principal.user_id,
            condition = ?committed.return_condition,
            forced,
            "deployment returned"
        );
        metrics::counter!("depot_deployment_transitions_total", "to" => "returned").increment(1);
        self.notifier.notify(CustodyEvent::DeploymentReturned {
            deployment_id: committed.id,
            forced,
        });
    }

    fn calling_teller(principal: &Principal, action: &str) -> Result<TellerId, CustodyError> {
        if principal.role != depot_core::Role::Teller {
            return Err(CustodyError::forbidden(action));
        }
        Ok(principal.user_id.as_teller())
    }

    fn load(&self, id: DeploymentId) -> Result<Deployment, CustodyError> {
        self.store
            .get(id.as_uuid())
            .ok_or(CustodyError::NotFound(id))
    }

    /// One conditional write against the stored deployment.
    fn mutate<R>(
        &self,
        id: DeploymentId,
        f: impl FnOnce(&mut Deployment) -> Result<R, CustodyError>,
    ) -> Result<(R, Deployment), CustodyError> {
        self.store
            .try_update(id.as_uuid(), f)
            .ok_or(CustodyError::NotFound(id))?
    }
}
