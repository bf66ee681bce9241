//! # Asset & Scan API
//!
//! - **POST `/v1/deployments/{id}/assets`** — register assets on a deployment
//! - **GET `/v1/deployments/{id}/assets`** — list a deployment's assets
//! - **GET `/v1/deployments/{id}/assets/{asset_id}/qr`** — the printable identity token
//! - **POST `/v1/deployments/assets/scan`** — settle an asset from its scanned token
//! - **POST `/v1/deployments/{id}/assets/{asset_id}/return`** — settle an asset by id
//!
//! Rendering the token as a QR image is left to the client.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use depot_core::{DeploymentId, ReturnCondition};
use depot_custody::ScanOutcome;
use depot_state::{AssetItem, NewAsset};

use super::persist;
use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::{deployment_id, extract_json, extract_validated_json, Validate};
use crate::state::AppState;

/// Request to register assets.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAssetsRequest {
    pub items: Vec<NewAsset>,
}

impl Validate for RegisterAssetsRequest {
    fn validate(&self) -> Result<(), String> {
        if self.items.is_empty() {
            return Err("items must not be empty".to_string());
        }
        if self.items.len() > 500 {
            return Err("at most 500 items may be registered at once".to_string());
        }
        if self.items.iter().any(|item| item.quantity == 0) {
            return Err("item quantity must be positive".to_string());
        }
        Ok(())
    }
}

/// A scanned return.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub token: String,
    #[serde(default)]
    pub condition: ReturnCondition,
    #[serde(default)]
    pub damage_notes: String,
}

impl Validate for ScanRequest {
    fn validate(&self) -> Result<(), String> {
        if self.token.trim().is_empty() {
            return Err("token must not be empty".to_string());
        }
        Ok(())
    }
}

/// A manual return, for an asset whose sticker cannot be scanned.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnAssetRequest {
    #[serde(default)]
    pub condition: ReturnCondition,
    #[serde(default)]
    pub damage_notes: String,
}

/// The identity token to print on an asset's sticker.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QrTokenResponse {
    pub deployment_id: DeploymentId,
    pub asset_id: String,
    pub token: String,
}

/// Construct the assets router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/deployments/assets/scan", post(scan_asset))
        .route(
            "/v1/deployments/{id}/assets",
            get(list_assets).post(register_assets),
        )
        .route("/v1/deployments/{id}/assets/{asset_id}/qr", get(asset_token))
        .route(
            "/v1/deployments/{id}/assets/{asset_id}/return",
            post(return_asset),
        )
}

/// POST /v1/deployments/{id}/assets — Register assets.
#[utoipa::path(
    post,
    path = "/v1/deployments/{id}/assets",
    params(("id" = String, Path, description = "Deployment UUID")),
    request_body = RegisterAssetsRequest,
    responses(
        (status = 201, description = "Assets registered", body = [AssetItem]),
        (status = 404, description = "Deployment not found"),
        (status = 409, description = "Deployment is terminal"),
    ),
    tag = "assets"
)]
async fn register_assets(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    body: Result<Json<RegisterAssetsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<AssetItem>>), AppError> {
    let id = deployment_id(&id)?;
    let req = extract_validated_json(body)?;
    let (registered, committed) = state
        .custody
        .registry
        .register_assets(&principal, id, req.items)?;
    persist(&state, &committed).await;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// GET /v1/deployments/{id}/assets — List assets in registration order.
#[utoipa::path(
    get,
    path = "/v1/deployments/{id}/assets",
    params(("id" = String, Path, description = "Deployment UUID")),
    responses(
        (status = 200, description = "Assets", body = [AssetItem]),
        (status = 404, description = "Deployment not found"),
    ),
    tag = "assets"
)]
async fn list_assets(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<AssetItem>>, AppError> {
    let id = deployment_id(&id)?;
    Ok(Json(state.custody.registry.list_assets(&principal, id)?))
}

/// GET /v1/deployments/{id}/assets/{asset_id}/qr — Issue the identity token.
#[utoipa::path(
    get,
    path = "/v1/deployments/{id}/assets/{asset_id}/qr",
    params(
        ("id" = String, Path, description = "Deployment UUID"),
        ("asset_id" = String, Path, description = "Asset id"),
    ),
    responses(
        (status = 200, description = "Token issued", body = QrTokenResponse),
        (status = 403, description = "Caller may not issue tokens"),
        (status = 404, description = "Unknown deployment or asset"),
    ),
    tag = "assets"
)]
async fn asset_token(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((id, asset_id)): Path<(String, String)>,
) -> Result<Json<QrTokenResponse>, AppError> {
    let id = deployment_id(&id)?;
    let token = state
        .custody
        .registry
        .generate_identity_token(&principal, id, &asset_id)?;
    Ok(Json(QrTokenResponse {
        deployment_id: id,
        asset_id,
        token,
    }))
}

/// POST /v1/deployments/assets/scan — Settle an asset from its token.
#[utoipa::path(
    post,
    path = "/v1/deployments/assets/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Asset settled", body = ScanOutcome),
        (status = 403, description = "Token does not match the asset"),
        (status = 404, description = "Unknown asset"),
        (status = 409, description = "Asset already settled or not yet dispatched"),
        (status = 422, description = "Malformed token"),
    ),
    tag = "assets"
)]
async fn scan_asset(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanOutcome>, AppError> {
    let req = extract_validated_json(body)?;
    let outcome = state.custody.scanner.scan_return(
        &principal,
        req.token.trim(),
        req.condition,
        &req.damage_notes,
    )?;
    persist_outcome(&state, &outcome).await;
    Ok(Json(outcome))
}

/// POST /v1/deployments/{id}/assets/{asset_id}/return — Settle an asset by id.
#[utoipa::path(
    post,
    path = "/v1/deployments/{id}/assets/{asset_id}/return",
    params(
        ("id" = String, Path, description = "Deployment UUID"),
        ("asset_id" = String, Path, description = "Asset id"),
    ),
    request_body = ReturnAssetRequest,
    responses(
        (status = 200, description = "Asset settled", body = ScanOutcome),
        (status = 403, description = "Caller may not return this deployment's assets"),
        (status = 404, description = "Unknown deployment or asset"),
        (status = 409, description = "Asset already settled or not yet dispatched"),
    ),
    tag = "assets"
)]
async fn return_asset(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((id, asset_id)): Path<(String, String)>,
    body: Result<Json<ReturnAssetRequest>, JsonRejection>,
) -> Result<Json<ScanOutcome>, AppError> {
    let id = deployment_id(&id)?;
    let req = extract_json(body)?;
    let outcome = state.custody.scanner.return_asset(
        &principal,
        id,
        &asset_id,
        req.condition,
        &req.damage_notes,
    )?;
    persist_outcome(&state, &outcome).await;
    Ok(Json(outcome))
}

async fn persist_outcome(state: &AppState, outcome: &ScanOutcome) {
    if let Some(deployment) = state.custody.store.get(outcome.deployment_id.as_uuid()) {
        persist(state, &deployment).await;
    }
}
