//! Role checks shared by the custody services.

use depot_core::{Principal, Role};
use depot_state::Deployment;

use crate::error::CustodyError;

/// Admins and declarators manage the lifecycle.
pub(crate) fn require_staff(principal: &Principal, action: &str) -> Result<(), CustodyError> {
    if principal.is_staff() {
        Ok(())
    } else {
        tracing::warn!(user_id = %principal.user_id, role = principal.role.as_str(), action, "forbidden");
        Err(CustodyError::forbidden(action))
    }
}

pub(crate) fn require_admin(principal: &Principal, action: &str) -> Result<(), CustodyError> {
    if principal.role == Role::Admin {
        Ok(())
    } else {
        tracing::warn!(user_id = %principal.user_id, role = principal.role.as_str(), action, "forbidden");
        Err(CustodyError::forbidden(action))
    }
}

/// Admins act on any deployment; a declarator only on the ones they created.
pub(crate) fn require_owner_or_admin(
    principal: &Principal,
    deployment: &Deployment,
    action: &str,
) -> Result<(), CustodyError> {
    match principal.role {
        Role::Admin => Ok(()),
        Role::Declarator if deployment.declarator_id == principal.user_id => Ok(()),
        _ => {
            tracing::warn!(
                user_id = %principal.user_id,
                role = principal.role.as_str(),
                deployment_id = %deployment.id,
                action,
                "forbidden: not the owning declarator"
            );
            Err(CustodyError::forbidden(action))
        }
    }
}

/// Whether `principal` may see `deployment`.
pub(crate) fn can_read(principal: &Principal, deployment: &Deployment) -> bool {
    principal.can_read_all()
        || (principal.role == Role::Teller && deployment.is_assigned(&principal.user_id.as_teller()))
}

pub(crate) fn require_read(principal: &Principal, deployment: &Deployment) -> Result<(), CustodyError> {
    if can_read(principal, deployment) {
        Ok(())
    } else {
        Err(CustodyError::forbidden("read this deployment"))
    }
}
