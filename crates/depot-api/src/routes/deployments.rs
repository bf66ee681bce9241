//! # Deployment Lifecycle API
//!
//! - **POST `/v1/deployments`** — open a deployment in `preparing`
//! - **GET `/v1/deployments`** — filtered, sorted, paged listing with stats;
//!   `?export=csv|table` downloads the same filtered set as a file
//! - **GET `/v1/deployments/stats`** — dashboard counters
//! - **GET `/v1/deployments/teller/assigned`** — the calling teller's deployments
//! - **GET/PUT `/v1/deployments/{id}`** — read one, edit details
//! - **POST `/v1/deployments/{id}/deploy|status|acknowledge|complete|return|force-return`**
//! - **POST `/v1/deployments/bulk-return|bulk-update-status`** — best-effort batches

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use depot_core::{
    DeploymentId, DeploymentItemType, Priority, ReturnCondition, TellerId, Timestamp, UserId,
};
use depot_custody::query::{self, DeploymentQuery, DeploymentStats, QueryResult};
use depot_custody::{
    export, BatchOutcome, CreateDeployment, CustodyError, DeploymentView, ExportFormat,
    ReturnRequest, SortField, SortOrder,
};
use depot_state::{DeploymentStatus, DetailsUpdate, NewAsset, TellerSlot};

use super::{persist, persist_batch, view};
use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::{deployment_id, extract_json, extract_validated_json, Validate};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Request to open a deployment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentRequest {
    #[serde(default)]
    pub item_type: DeploymentItemType,
    /// Defaults to the labels of `assets` when blank.
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub item_description: String,
    pub quantity: Option<u32>,
    #[serde(default)]
    pub priority: Priority,
    /// `YYYY-MM-DD` (end of that day) or an RFC 3339 timestamp.
    #[serde(default)]
    pub expected_return_date: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tellers: Vec<TellerSlot>,
    /// Teller ids without display names; merged with `tellers`.
    #[serde(default)]
    pub assigned_teller_ids: Vec<String>,
    #[serde(default)]
    pub assets: Vec<NewAsset>,
}

impl Validate for CreateDeploymentRequest {
    fn validate(&self) -> Result<(), String> {
        if self.item_name.len() > 200 {
            return Err("itemName must not exceed 200 characters".to_string());
        }
        if self.notes.len() > 4000 {
            return Err("notes must not exceed 4000 characters".to_string());
        }
        if self.tellers.is_empty() && self.assigned_teller_ids.is_empty() {
            return Err("at least one teller must be assigned".to_string());
        }
        if self.expected_return_date.trim().is_empty() {
            return Err("expectedReturnDate is required".to_string());
        }
        Ok(())
    }
}

impl CreateDeploymentRequest {
    fn into_command(self) -> Result<CreateDeployment, AppError> {
        let expected_return_date =
            Timestamp::parse_date_or_datetime(&self.expected_return_date, true)?;
        let mut tellers = self.tellers;
        tellers.extend(self.assigned_teller_ids.into_iter().map(|id| TellerSlot {
            teller_id: id,
            teller_name: String::new(),
        }));
        Ok(CreateDeployment {
            item_type: self.item_type,
            item_name: self.item_name,
            item_description: self.item_description,
            quantity: self.quantity,
            priority: self.priority,
            expected_return_date: Some(expected_return_date),
            notes: self.notes,
            tellers,
            assets: self.assets,
        })
    }
}

/// Explicit status change.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: DeploymentStatus,
    /// Recorded in the transition log for `lost` and `damaged`.
    pub reason: Option<String>,
}

/// A teller's completion report.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(default)]
    pub notes: String,
}

/// Normal return.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnDeploymentRequest {
    #[serde(default)]
    pub return_condition: ReturnCondition,
    pub notes: Option<String>,
}

/// Admin override of the completeness precondition.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForceReturnRequest {
    #[serde(default)]
    pub return_condition: ReturnCondition,
    pub notes: Option<String>,
    /// Audit reason, required.
    #[serde(default)]
    pub reason: String,
}

impl Validate for ForceReturnRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("reason must not be empty".to_string());
        }
        Ok(())
    }
}

/// Return several deployments with one condition.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkReturnRequest {
    pub deployment_ids: Vec<DeploymentId>,
    #[serde(default)]
    pub return_condition: ReturnCondition,
}

/// Move several deployments to one status.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    pub deployment_ids: Vec<DeploymentId>,
    pub status: DeploymentStatus,
}

/// Listing query string. Values arrive as strings and are parsed into a
/// [`DeploymentQuery`]; blank values count as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub teller_id: Option<String>,
    pub declarator_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub overdue: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    /// `csv` or `table`; switches the response to a file download.
    pub export: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number(field: &str, raw: &str) -> Result<usize, AppError> {
    raw.parse::<usize>()
        .map_err(|_| AppError::Validation(format!("{field} must be a non-negative integer")))
}

impl ListParams {
    fn to_query(&self) -> Result<DeploymentQuery, AppError> {
        let overdue = match present(&self.overdue) {
            None => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "overdue must be true or false, got '{other}'"
                )))
            }
        };
        Ok(DeploymentQuery {
            search: present(&self.search).map(String::from),
            status: present(&self.status).map(DeploymentStatus::parse).transpose()?,
            priority: present(&self.priority)
                .map(str::parse::<Priority>)
                .transpose()?,
            teller_id: present(&self.teller_id).map(TellerId::from),
            declarator_id: present(&self.declarator_id).map(UserId::from),
            date_from: present(&self.date_from)
                .map(|s| Timestamp::parse_date_or_datetime(s, false))
                .transpose()?,
            date_to: present(&self.date_to)
                .map(|s| Timestamp::parse_date_or_datetime(s, true))
                .transpose()?,
            overdue,
            sort_by: match present(&self.sort_by) {
                None => SortField::default(),
                Some(s) => SortField::parse(s)
                    .ok_or_else(|| AppError::Validation(format!("unknown sortBy '{s}'")))?,
            },
            sort_order: match present(&self.sort_order) {
                None => SortOrder::default(),
                Some(s) => SortOrder::parse(s)
                    .ok_or_else(|| AppError::Validation(format!("unknown sortOrder '{s}'")))?,
            },
            page: present(&self.page)
                .map(|s| parse_number("page", s))
                .transpose()?,
            limit: present(&self.limit)
                .map(|s| parse_number("limit", s))
                .transpose()?,
        })
    }

    fn export_format(&self) -> Result<Option<ExportFormat>, AppError> {
        present(&self.export)
            .map(|s| {
                ExportFormat::parse(s).ok_or_else(|| {
                    AppError::Validation(format!("unknown export format '{s}', expected csv or table"))
                })
            })
            .transpose()
    }
}

/// Query string of the teller listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedParams {
    /// Defaults to the caller. Only non-teller roles may ask about others.
    pub teller_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Construct the deployments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/deployments",
            get(list_deployments).post(create_deployment),
        )
        .route("/v1/deployments/stats", get(deployment_stats))
        .route("/v1/deployments/teller/assigned", get(assigned_deployments))
        .route("/v1/deployments/bulk-return", post(bulk_return))
        .route("/v1/deployments/bulk-update-status", post(bulk_update_status))
        .route(
            "/v1/deployments/{id}",
            get(get_deployment).put(update_deployment),
        )
        .route("/v1/deployments/{id}/deploy", post(deploy_deployment))
        .route("/v1/deployments/{id}/status", post(update_status))
        .route("/v1/deployments/{id}/acknowledge", post(acknowledge_deployment))
        .route("/v1/deployments/{id}/complete", post(complete_deployment))
        .route("/v1/deployments/{id}/return", post(return_deployment))
        .route("/v1/deployments/{id}/force-return", post(force_return_deployment))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/deployments — Open a deployment.
#[utoipa::path(
    post,
    path = "/v1/deployments",
    request_body = CreateDeploymentRequest,
    responses(
        (status = 201, description = "Deployment created", body = DeploymentView),
        (status = 403, description = "Caller may not create deployments"),
        (status = 422, description = "Validation failed"),
    ),
    tag = "deployments"
)]
async fn create_deployment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<CreateDeploymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DeploymentView>), AppError> {
    let req = extract_validated_json(body)?;
    let created = state
        .custody
        .deployments
        .create(&principal, req.into_command()?)?;
    persist(&state, &created).await;
    Ok((StatusCode::CREATED, Json(view(created))))
}

/// GET /v1/deployments — List, or export with `?export=`.
#[utoipa::path(
    get,
    path = "/v1/deployments",
    params(
        ("search" = Option<String>, Query, description = "Case-insensitive text search"),
        ("status" = Option<String>, Query, description = "Deployment status"),
        ("priority" = Option<String>, Query, description = "Priority"),
        ("tellerId" = Option<String>, Query, description = "Assigned teller"),
        ("declaratorId" = Option<String>, Query, description = "Creating user"),
        ("dateFrom" = Option<String>, Query, description = "createdAt lower bound"),
        ("dateTo" = Option<String>, Query, description = "createdAt upper bound"),
        ("overdue" = Option<bool>, Query, description = "Overdue filter"),
        ("sortBy" = Option<String>, Query, description = "createdAt | expectedReturnDate | itemName | priority"),
        ("sortOrder" = Option<String>, Query, description = "asc | desc"),
        ("page" = Option<usize>, Query, description = "1-based page"),
        ("limit" = Option<usize>, Query, description = "Page size"),
        ("export" = Option<String>, Query, description = "csv | table"),
    ),
    responses(
        (status = 200, description = "One page of deployments", body = QueryResult),
        (status = 422, description = "Invalid filter"),
    ),
    tag = "deployments"
)]
async fn list_deployments(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Query(params): Query<ListParams>,
) -> Result<Response, AppError> {
    let filters = params.to_query()?;
    let visible = state.custody.deployments.visible_to(&principal);
    let now = Timestamp::now();

    if let Some(format) = params.export_format()? {
        let file = export::export(visible, &filters, format, now).map_err(CustodyError::from)?;
        let disposition = format!("attachment; filename=\"{}\"", file.filename);
        return Ok((
            [
                (header::CONTENT_TYPE, file.content_type.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            file.bytes,
        )
            .into_response());
    }

    Ok(Json(query::list(visible, &filters, now)).into_response())
}

/// GET /v1/deployments/stats — Dashboard counters over every visible deployment.
#[utoipa::path(
    get,
    path = "/v1/deployments/stats",
    responses((status = 200, description = "Dashboard statistics", body = DeploymentStats)),
    tag = "deployments"
)]
async fn deployment_stats(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Json<DeploymentStats> {
    let now = Timestamp::now();
    state.custody.deployments.flag_overdue(now);
    let visible = state.custody.deployments.visible_to(&principal);
    Json(query::compute_stats(&visible, now))
}

/// GET /v1/deployments/teller/assigned — Deployments assigned to a teller.
#[utoipa::path(
    get,
    path = "/v1/deployments/teller/assigned",
    params(("tellerId" = Option<String>, Query, description = "Defaults to the caller")),
    responses(
        (status = 200, description = "Assigned deployments, newest first", body = [DeploymentView]),
        (status = 403, description = "Tellers may only list their own"),
    ),
    tag = "deployments"
)]
async fn assigned_deployments(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Query(params): Query<AssignedParams>,
) -> Result<Json<Vec<DeploymentView>>, AppError> {
    let teller = present(&params.teller_id)
        .map(TellerId::from)
        .unwrap_or_else(|| principal.user_id.as_teller());
    let assigned = state
        .custody
        .deployments
        .list_for_teller(&principal, &teller)?;
    Ok(Json(assigned.into_iter().map(view).collect()))
}

/// GET /v1/deployments/{id} — Fetch one deployment.
#[utoipa::path(
    get,
    path = "/v1/deployments/{id}",
    params(("id" = String, Path, description = "Deployment UUID")),
    responses(
        (status = 200, description = "Deployment found", body = DeploymentView),
        (status = 404, description = "Deployment not found"),
    ),
    tag = "deployments"
)]
async fn get_deployment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<DeploymentView>, AppError> {
    let id = deployment_id(&id)?;
    let deployment = state.custody.deployments.get(&principal, id)?;
    Ok(Json(view(deployment)))
}

/// PUT /v1/deployments/{id} — Edit non-status fields.
#[utoipa::path(
    put,
    path = "/v1/deployments/{id}",
    params(("id" = String, Path, description = "Deployment UUID")),
    request_body = DetailsUpdate,
    responses(
        (status = 200, description = "Deployment updated", body = DeploymentView),
        (status = 403, description = "Only the owning declarator or an admin may edit"),
        (status = 404, description = "Deployment not found"),
        (status = 409, description = "Deployment is terminal"),
    ),
    tag = "deployments"
)]
async fn update_deployment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    body: Result<Json<DetailsUpdate>, JsonRejection>,
) -> Result<Json<DeploymentView>, AppError> {
    let id = deployment_id(&id)?;
    let update = extract_json(body)?;
    let updated = state
        .custody
        .deployments
        .update_details(&principal, id, update)?;
    persist(&state, &updated).await;
    Ok(Json(view(updated)))
}

/// POST /v1/deployments/{id}/deploy — Dispatch a prepared deployment.
#[utoipa::path(
    post,
    path = "/v1/deployments/{id}/deploy",
    params(("id" = String, Path, description = "Deployment UUID")),
    responses(
        (status = 200, description = "Deployment dispatched", body = DeploymentView),
        (status = 409, description = "Not in preparing"),
    ),
    tag = "deployments"
)]
async fn deploy_deployment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<DeploymentView>, AppError> {
    let id = deployment_id(&id)?;
    let deployed = state.custody.deployments.mark_deployed(&principal, id)?;
    persist(&state, &deployed).await;
    Ok(Json(view(deployed)))
}

/// POST /v1/deployments/{id}/status — Move to an explicit status.
#[utoipa::path(
    post,
    path = "/v1/deployments/{id}/status",
    params(("id" = String, Path, description = "Deployment UUID")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status changed", body = DeploymentView),
        (status = 409, description = "Illegal transition or incomplete tellers"),
    ),
    tag = "deployments"
)]
async fn update_status(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<DeploymentView>, AppError> {
    let id = deployment_id(&id)?;
    let req = extract_json(body)?;
    let manager = &state.custody.deployments;
    let reason = req.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let updated = match (req.status, reason) {
        (DeploymentStatus::Lost, Some(reason)) => manager.mark_lost(&principal, id, reason)?,
        (DeploymentStatus::Damaged, Some(reason)) => {
            manager.mark_damaged(&principal, id, reason)?
        }
        (status, _) => manager.transition(&principal, id, status)?,
    };
    persist(&state, &updated).await;
    Ok(Json(view(updated)))
}

/// POST /v1/deployments/{id}/acknowledge — The calling teller confirms receipt.
#[utoipa::path(
    post,
    path = "/v1/deployments/{id}/acknowledge",
    params(("id" = String, Path, description = "Deployment UUID")),
    responses(
        (status = 200, description = "Receipt acknowledged", body = DeploymentView),
        (status = 403, description = "Caller is not an assigned teller"),
    ),
    tag = "deployments"
)]
async fn acknowledge_deployment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<DeploymentView>, AppError> {
    let id = deployment_id(&id)?;
    let updated = state.custody.deployments.acknowledge(&principal, id)?;
    persist(&state, &updated).await;
    Ok(Json(view(updated)))
}

/// POST /v1/deployments/{id}/complete — The calling teller reports completion.
#[utoipa::path(
    post,
    path = "/v1/deployments/{id}/complete",
    params(("id" = String, Path, description = "Deployment UUID")),
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Completion recorded", body = DeploymentView),
        (status = 403, description = "Caller is not an assigned teller"),
        (status = 409, description = "Receipt not acknowledged yet"),
    ),
    tag = "deployments"
)]
async fn complete_deployment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    body: Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<DeploymentView>, AppError> {
    let id = deployment_id(&id)?;
    let req = extract_json(body)?;
    let updated = state
        .custody
        .deployments
        .mark_complete(&principal, id, &req.notes)?;
    persist(&state, &updated).await;
    Ok(Json(view(updated)))
}

/// POST /v1/deployments/{id}/return — Return with every teller complete.
#[utoipa::path(
    post,
    path = "/v1/deployments/{id}/return",
    params(("id" = String, Path, description = "Deployment UUID")),
    request_body = ReturnDeploymentRequest,
    responses(
        (status = 200, description = "Deployment returned", body = DeploymentView),
        (status = 409, description = "Illegal transition or incomplete tellers"),
    ),
    tag = "deployments"
)]
async fn return_deployment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    body: Result<Json<ReturnDeploymentRequest>, JsonRejection>,
) -> Result<Json<DeploymentView>, AppError> {
    let id = deployment_id(&id)?;
    let req = extract_json(body)?;
    let returned = state.custody.deployments.mark_returned(
        &principal,
        id,
        ReturnRequest {
            condition: req.return_condition,
            notes: req.notes,
        },
    )?;
    persist(&state, &returned).await;
    Ok(Json(view(returned)))
}

/// POST /v1/deployments/{id}/force-return — Admin return without completeness.
#[utoipa::path(
    post,
    path = "/v1/deployments/{id}/force-return",
    params(("id" = String, Path, description = "Deployment UUID")),
    request_body = ForceReturnRequest,
    responses(
        (status = 200, description = "Deployment returned", body = DeploymentView),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Illegal transition"),
    ),
    tag = "deployments"
)]
async fn force_return_deployment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    body: Result<Json<ForceReturnRequest>, JsonRejection>,
) -> Result<Json<DeploymentView>, AppError> {
    let id = deployment_id(&id)?;
    let req = extract_validated_json(body)?;
    let returned = state.custody.deployments.force_return(
        &principal,
        id,
        ReturnRequest {
            condition: req.return_condition,
            notes: req.notes,
        },
        &req.reason,
    )?;
    persist(&state, &returned).await;
    Ok(Json(view(returned)))
}

/// POST /v1/deployments/bulk-return — Return many deployments.
#[utoipa::path(
    post,
    path = "/v1/deployments/bulk-return",
    request_body = BulkReturnRequest,
    responses(
        (status = 200, description = "Per-id results", body = BatchOutcome),
        (status = 403, description = "Caller may not run bulk operations"),
        (status = 422, description = "Empty id list"),
    ),
    tag = "deployments"
)]
async fn bulk_return(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<BulkReturnRequest>, JsonRejection>,
) -> Result<Json<BatchOutcome>, AppError> {
    let req = extract_json(body)?;
    let outcome =
        state
            .custody
            .bulk
            .bulk_return(&principal, &req.deployment_ids, req.return_condition)?;
    Ok(Json(persist_batch(&state, outcome).await))
}

/// POST /v1/deployments/bulk-update-status — Move many deployments to one status.
#[utoipa::path(
    post,
    path = "/v1/deployments/bulk-update-status",
    request_body = BulkStatusRequest,
    responses(
        (status = 200, description = "Per-id results", body = BatchOutcome),
        (status = 403, description = "Caller may not run bulk operations"),
        (status = 422, description = "Empty id list"),
    ),
    tag = "deployments"
)]
async fn bulk_update_status(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<BulkStatusRequest>, JsonRejection>,
) -> Result<Json<BatchOutcome>, AppError> {
    let req = extract_json(body)?;
    let outcome =
        state
            .custody
            .bulk
            .bulk_update_status(&principal, &req.deployment_ids, req.status)?;
    Ok(Json(persist_batch(&state, outcome).await))
}
