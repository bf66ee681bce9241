//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI document for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Depot Custody API",
        version = "0.1.0",
        description = "Equipment deployments to field tellers: lifecycle, asset registration, QR scan returns, dashboards, bulk operations and exports.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Deployments
        crate::routes::deployments::create_deployment,
        crate::routes::deployments::list_deployments,
        crate::routes::deployments::deployment_stats,
        crate::routes::deployments::assigned_deployments,
        crate::routes::deployments::get_deployment,
        crate::routes::deployments::update_deployment,
        crate::routes::deployments::deploy_deployment,
        crate::routes::deployments::update_status,
        crate::routes::deployments::acknowledge_deployment,
        crate::routes::deployments::complete_deployment,
        crate::routes::deployments::return_deployment,
        crate::routes::deployments::force_return_deployment,
        crate::routes::deployments::bulk_return,
        crate::routes::deployments::bulk_update_status,
        // Assets
        crate::routes::assets::register_assets,
        crate::routes::assets::list_assets,
        crate::routes::assets::asset_token,
        crate::routes::assets::scan_asset,
        crate::routes::assets::return_asset,
    ),
    components(schemas(
        // Domain records
        depot_state::Deployment,
        depot_state::DeploymentStatus,
        depot_state::AssetItem,
        depot_state::AssetStatus,
        depot_state::NewAsset,
        depot_state::TellerSlot,
        depot_state::TellerAssignment,
        depot_state::CompletionRecord,
        depot_state::TransitionRecord,
        depot_state::DetailsUpdate,
        depot_state::ReturnStatus,
        depot_core::Priority,
        depot_core::ReturnCondition,
        depot_core::AssetKind,
        depot_core::DeploymentItemType,
        // Query & results
        depot_custody::DeploymentView,
        depot_custody::DeploymentStats,
        depot_custody::QueryResult,
        depot_custody::ScanOutcome,
        depot_custody::BatchOutcome,
        depot_custody::BatchFailure,
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // Request DTOs
        crate::routes::deployments::CreateDeploymentRequest,
        crate::routes::deployments::StatusUpdateRequest,
        crate::routes::deployments::CompleteRequest,
        crate::routes::deployments::ReturnDeploymentRequest,
        crate::routes::deployments::ForceReturnRequest,
        crate::routes::deployments::BulkReturnRequest,
        crate::routes::deployments::BulkStatusRequest,
        crate::routes::assets::RegisterAssetsRequest,
        crate::routes::assets::ScanRequest,
        crate::routes::assets::ReturnAssetRequest,
        crate::routes::assets::QrTokenResponse,
    )),
    tags(
        (name = "deployments", description = "Deployment lifecycle, listings and bulk operations"),
        (name = "assets", description = "Asset registration, identity tokens and scan returns"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/v1/deployments",
            "/v1/deployments/stats",
            "/v1/deployments/teller/assigned",
            "/v1/deployments/{id}",
            "/v1/deployments/{id}/force-return",
            "/v1/deployments/{id}/assets/{asset_id}/qr",
            "/v1/deployments/assets/scan",
            "/v1/deployments/{id}/assets/{asset_id}/return",
            "/v1/deployments/bulk-return",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
