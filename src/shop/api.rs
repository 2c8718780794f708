use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::branding::Branding;
use super::checklist::{self, ChecklistAction, ChecklistItem};
use super::db::{ChecklistColumn, DbHandle};
use super::export::{self, ExportOptions};
use super::listing::{BuildQuery, OrderQuery};
use super::models::*;
use super::wizard::{self, IntakeForm, OrderDraft, WizardStep};
use super::ws::{WsMessage, broadcast_message};
use crate::config::IntakeSection;
use crate::errors::{FieldError, ShopError};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    /// Keys accepted in `x-api-key`; empty leaves `/api` open.
    pub api_keys: Vec<String>,
    pub intake: IntakeSection,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateWorkshopRequest {
    pub name: String,
    pub slug: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateEmployeeRequest {
    pub name: String,
    pub role: Option<EmployeeRole>,
    pub email: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct EmployeeListQuery {
    pub active_only: bool,
}

/// Wizard payload plus an optional control template for the end check.
#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(flatten)]
    pub draft: OrderDraft,
    pub control_template_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct ValidateQuery {
    pub step: Option<WizardStep>,
}

#[derive(Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub step: Option<WizardStep>,
    pub next: Option<WizardStep>,
    pub previous: Option<WizardStep>,
    pub errors: Vec<FieldError>,
}

#[derive(Deserialize)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct BuildStatusRequest {
    pub status: BuildStatus,
}

#[derive(Deserialize)]
pub struct ReplaceChecklistRequest {
    pub items: Vec<ChecklistItem>,
}

#[derive(Deserialize)]
pub struct EndControlRequest {
    pub reviewer_id: Option<i64>,
    #[serde(default)]
    pub reviewer_name: String,
    pub passed: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct PrintQuery {
    pub auto_print: bool,
}

#[derive(Deserialize)]
pub struct CreateBuildRequest {
    #[serde(flatten)]
    pub build: NewBuild,
    /// Seeds the assembly checklist when none is given.
    pub template_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub kind: TemplateKind,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct TemplateListQuery {
    pub kind: Option<TemplateKind>,
}

#[derive(Deserialize)]
pub struct MoveTaskRequest {
    pub column: TaskColumn,
    pub position: i32,
}

#[derive(Deserialize)]
pub struct MovePageRequest {
    pub parent_id: Option<i64>,
    pub position: i32,
}

#[derive(Deserialize)]
pub struct FeedbackStatusRequest {
    pub status: FeedbackStatus,
}

/// What a customer gets back after submitting the intake form.
#[derive(Serialize, Deserialize)]
pub struct IntakeReceipt {
    pub order_number: String,
    pub tracking_code: String,
    pub status: OrderStatus,
}

/// The public view of an order, looked up by tracking code.
#[derive(Serialize, Deserialize)]
pub struct IntakeStatus {
    pub order_number: String,
    pub status: OrderStatus,
    pub bike: String,
    pub due_date: Option<String>,
    pub ready_for_pickup: bool,
    pub updated_at: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Validation(Vec<FieldError>),
    Conflict(String),
    Unauthorized(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({"error": msg})),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg})),
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": "Validation failed", "fields": fields}),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!({"error": msg})),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, serde_json::json!({"error": msg})),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": msg}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let Some(shop) = err.downcast_ref::<ShopError>() else {
            tracing::error!(error = ?err, "Unhandled error in request");
            return ApiError::Internal(err.to_string());
        };
        match shop {
            ShopError::NotFound { .. } | ShopError::WorkshopSlugNotFound { .. } => {
                ApiError::NotFound(shop.to_string())
            }
            ShopError::Validation(fields) => ApiError::Validation(fields.clone()),
            ShopError::InvalidTransition { .. }
            | ShopError::CycleDetected { .. }
            | ShopError::ChecklistIncomplete { .. }
            | ShopError::Conflict(_) => ApiError::Conflict(shop.to_string()),
            ShopError::NotAFolder { .. } | ShopError::Checklist(_) => {
                ApiError::BadRequest(shop.to_string())
            }
            ShopError::LockPoisoned | ShopError::Database(_) | ShopError::Other(_) => {
                tracing::error!(error = ?err, "Internal error in request");
                ApiError::Internal(shop.to_string())
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/workshops", get(list_workshops).post(create_workshop))
        .route("/api/workshops/{wid}", get(get_workshop))
        .route(
            "/api/workshops/{wid}/branding",
            get(get_branding).put(update_branding),
        )
        .route(
            "/api/workshops/{wid}/employees",
            get(list_employees).post(create_employee),
        )
        .route(
            "/api/workshops/{wid}/employees/{id}",
            patch(update_employee).delete(deactivate_employee),
        )
        .route(
            "/api/workshops/{wid}/orders",
            get(list_orders).post(create_order),
        )
        .route("/api/workshops/{wid}/orders/validate", post(validate_order_draft))
        .route(
            "/api/workshops/{wid}/orders/{id}",
            get(get_order).patch(update_order).delete(delete_order),
        )
        .route("/api/workshops/{wid}/orders/{id}/status", patch(set_order_status))
        .route(
            "/api/workshops/{wid}/orders/{id}/checklist",
            post(order_checklist_action).put(replace_order_checklist),
        )
        .route(
            "/api/workshops/{wid}/orders/{id}/control-checklist",
            post(order_control_action).put(replace_order_control),
        )
        .route("/api/workshops/{wid}/orders/{id}/end-control", post(record_end_control))
        .route("/api/workshops/{wid}/orders/{id}/print", get(print_order))
        .route(
            "/api/workshops/{wid}/builds",
            get(list_builds).post(create_build),
        )
        .route(
            "/api/workshops/{wid}/builds/{id}",
            get(get_build).patch(update_build).delete(delete_build),
        )
        .route("/api/workshops/{wid}/builds/{id}/status", patch(set_build_status))
        .route(
            "/api/workshops/{wid}/builds/{id}/checklist",
            post(build_checklist_action).put(replace_build_checklist),
        )
        .route(
            "/api/workshops/{wid}/builds/{id}/control-checklist",
            post(build_control_action).put(replace_build_control),
        )
        .route("/api/workshops/{wid}/builds/{id}/print", get(print_build))
        .route(
            "/api/workshops/{wid}/templates",
            get(list_templates).post(create_template),
        )
        .route(
            "/api/workshops/{wid}/templates/{id}",
            get(get_template).patch(update_template).delete(delete_template),
        )
        .route("/api/workshops/{wid}/tasks/board", get(get_board))
        .route("/api/workshops/{wid}/tasks", post(create_task))
        .route(
            "/api/workshops/{wid}/tasks/{id}",
            patch(update_task).delete(delete_task),
        )
        .route("/api/workshops/{wid}/tasks/{id}/move", patch(move_task))
        .route(
            "/api/workshops/{wid}/notebook",
            get(get_notebook).post(create_page),
        )
        .route(
            "/api/workshops/{wid}/notebook/{id}",
            get(get_page).patch(update_page).delete(delete_page),
        )
        .route("/api/workshops/{wid}/notebook/{id}/move", patch(move_page))
        .route(
            "/api/workshops/{wid}/feedback",
            get(list_feedback).post(create_feedback),
        )
        .route("/api/workshops/{wid}/feedback/summary", get(feedback_summary))
        .route(
            "/api/workshops/{wid}/feedback/{id}",
            patch(set_feedback_status).delete(delete_feedback),
        )
        .route("/intake/{slug}", post(submit_intake))
        .route("/intake/{slug}/status/{tracking_code}", get(intake_status))
        .route("/health", get(health_check))
}

fn deleted_or_not_found(deleted: bool, entity: &'static str, id: i64) -> Result<StatusCode, ApiError> {
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(ShopError::not_found(entity, id).to_string()))
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

// Workshops

async fn list_workshops(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let workshops = state.db.call(|db| db.list_workshops()).await?;
    Ok(Json(workshops))
}

async fn create_workshop(
    State(state): State<SharedState>,
    Json(req): Json<CreateWorkshopRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let workshop = state
        .db
        .call(move |db| db.create_workshop(&req.name, req.slug.as_deref()))
        .await?;
    tracing::info!(workshop_id = workshop.id, slug = %workshop.slug, "Workshop created");
    broadcast_message(
        &state.ws_tx,
        &WsMessage::WorkshopCreated {
            workshop_id: workshop.id,
            workshop: workshop.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(workshop)))
}

async fn get_workshop(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let workshop = state.db.call(move |db| db.require_workshop(wid)).await?;
    Ok(Json(workshop))
}

async fn get_branding(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let branding = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            db.get_branding(wid)
        })
        .await?;
    Ok(Json(branding))
}

async fn update_branding(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Json(branding): Json<Branding>,
) -> Result<impl IntoResponse, ApiError> {
    let branding = state
        .db
        .call(move |db| db.save_branding(wid, &branding))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::BrandingUpdated {
            workshop_id: wid,
            branding: branding.clone(),
        },
    );
    Ok(Json(branding))
}

// Employees

async fn list_employees(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Query(query): Query<EmployeeListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let employees = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            db.list_employees(wid, query.active_only)
        })
        .await?;
    Ok(Json(employees))
}

async fn create_employee(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Json(req): Json<CreateEmployeeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let employee = state
        .db
        .call(move |db| {
            db.create_employee(
                wid,
                &req.name,
                req.role.unwrap_or(EmployeeRole::Mechanic),
                req.email.as_deref(),
            )
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::EmployeeSaved {
            workshop_id: wid,
            employee: employee.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn update_employee(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(patch): Json<EmployeePatch>,
) -> Result<impl IntoResponse, ApiError> {
    let employee = state
        .db
        .call(move |db| db.update_employee(wid, id, &patch))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::EmployeeSaved {
            workshop_id: wid,
            employee: employee.clone(),
        },
    );
    Ok(Json(employee))
}

/// Employees are never removed, since orders and controls reference them.
async fn deactivate_employee(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let employee = state
        .db
        .call(move |db| db.deactivate_employee(wid, id))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::EmployeeSaved {
            workshop_id: wid,
            employee: employee.clone(),
        },
    );
    Ok(Json(employee))
}

// Orders

async fn list_orders(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Query(query): Query<OrderQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            db.list_orders(wid)
        })
        .await?;
    Ok(Json(query.apply(orders)))
}

async fn validate_order_draft(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Query(query): Query<ValidateQuery>,
    Json(draft): Json<OrderDraft>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.call(move |db| db.require_workshop(wid)).await?;
    let errors = match query.step {
        Some(step) => wizard::validate_step(step, &draft),
        None => wizard::validate_all(&draft),
    };
    let valid = errors.is_empty();
    Ok(Json(ValidationReport {
        valid,
        step: query.step,
        next: query.step.and_then(|s| if valid { s.next() } else { None }),
        previous: query.step.and_then(|s| s.previous()),
        errors,
    }))
}

async fn create_order(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            let template_items = match req.draft.template_id {
                Some(tid) => db.require_template(wid, tid)?.items,
                None => Vec::new(),
            };
            let control_items = match req.control_template_id {
                Some(tid) => db.require_template(wid, tid)?.items,
                None => Vec::new(),
            };
            let new_order = wizard::into_new_order(&req.draft, &template_items, &control_items)
                .map_err(ShopError::Validation)?;
            db.create_order(wid, &new_order, OrderSource::Staff)
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::OrderCreated {
            workshop_id: wid,
            order: order.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.db.call(move |db| db.get_order_detail(wid, id)).await?;
    Ok(Json(detail))
}

async fn update_order(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(patch): Json<OrderPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .db
        .call(move |db| db.update_order(wid, id, &patch))
        .await?;
    broadcast_order(&state, &order);
    Ok(Json(order))
}

async fn delete_order(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_order(wid, id)).await?;
    let status = deleted_or_not_found(deleted, "Order", id)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::OrderDeleted {
            workshop_id: wid,
            order_id: id,
        },
    );
    Ok(status)
}

async fn set_order_status(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<OrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .db
        .call(move |db| db.set_order_status(wid, id, req.status))
        .await?;
    broadcast_order(&state, &order);
    Ok(Json(order))
}

async fn apply_order_action(
    state: &SharedState,
    wid: i64,
    id: i64,
    column: ChecklistColumn,
    action: ChecklistAction,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .db
        .call(move |db| db.apply_order_checklist_action(wid, id, column, action))
        .await?;
    broadcast_order(state, &order);
    Ok(Json(order))
}

async fn replace_order_items(
    state: &SharedState,
    wid: i64,
    id: i64,
    column: ChecklistColumn,
    items: Vec<ChecklistItem>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .db
        .call(move |db| db.save_order_checklist(wid, id, column, &items))
        .await?;
    broadcast_order(state, &order);
    Ok(Json(order))
}

async fn order_checklist_action(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(action): Json<ChecklistAction>,
) -> Result<impl IntoResponse, ApiError> {
    apply_order_action(&state, wid, id, ChecklistColumn::Service, action).await
}

async fn replace_order_checklist(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<ReplaceChecklistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    replace_order_items(&state, wid, id, ChecklistColumn::Service, req.items).await
}

async fn order_control_action(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(action): Json<ChecklistAction>,
) -> Result<impl IntoResponse, ApiError> {
    apply_order_action(&state, wid, id, ChecklistColumn::Control, action).await
}

async fn replace_order_control(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<ReplaceChecklistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    replace_order_items(&state, wid, id, ChecklistColumn::Control, req.items).await
}

async fn record_end_control(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<EndControlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .db
        .call(move |db| {
            db.record_end_control(
                wid,
                id,
                req.reviewer_id,
                &req.reviewer_name,
                req.passed,
                &req.notes,
            )
        })
        .await?;
    broadcast_order(&state, &order);
    Ok(Json(order))
}

async fn print_order(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Query(query): Query<PrintQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let html = state
        .db
        .call(move |db| {
            let workshop = db.require_workshop(wid)?;
            let order = db.require_order(wid, id)?;
            let branding = db.get_branding(wid)?;
            Ok(export::render_work_order(
                &workshop,
                &order,
                &branding,
                ExportOptions {
                    auto_print: query.auto_print,
                },
            ))
        })
        .await?;
    Ok(Html(html))
}

fn broadcast_order(state: &SharedState, order: &Order) {
    broadcast_message(
        &state.ws_tx,
        &WsMessage::OrderUpdated {
            workshop_id: order.workshop_id,
            order: order.clone(),
        },
    );
}

// Builds

async fn list_builds(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Query(query): Query<BuildQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let builds = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            db.list_builds(wid)
        })
        .await?;
    Ok(Json(query.apply(builds)))
}

async fn create_build(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Json(req): Json<CreateBuildRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let build = state
        .db
        .call(move |db| {
            let mut new_build = req.build;
            if let Some(tid) = req.template_id
                && new_build.checklist.is_empty()
            {
                new_build.checklist = checklist::from_template(&db.require_template(wid, tid)?);
            }
            db.create_build(wid, &new_build)
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::BuildCreated {
            workshop_id: wid,
            build: build.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(build)))
}

async fn get_build(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let build = state.db.call(move |db| db.require_build(wid, id)).await?;
    Ok(Json(build))
}

async fn update_build(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(patch): Json<BuildPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let build = state
        .db
        .call(move |db| db.update_build(wid, id, &patch))
        .await?;
    broadcast_build(&state, &build);
    Ok(Json(build))
}

async fn delete_build(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_build(wid, id)).await?;
    let status = deleted_or_not_found(deleted, "BikeBuild", id)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::BuildDeleted {
            workshop_id: wid,
            build_id: id,
        },
    );
    Ok(status)
}

async fn set_build_status(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<BuildStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let build = state
        .db
        .call(move |db| db.set_build_status(wid, id, req.status))
        .await?;
    broadcast_build(&state, &build);
    Ok(Json(build))
}

async fn apply_build_action(
    state: &SharedState,
    wid: i64,
    id: i64,
    column: ChecklistColumn,
    action: ChecklistAction,
) -> Result<Json<BikeBuild>, ApiError> {
    let build = state
        .db
        .call(move |db| db.apply_build_checklist_action(wid, id, column, action))
        .await?;
    broadcast_build(state, &build);
    Ok(Json(build))
}

async fn replace_build_items(
    state: &SharedState,
    wid: i64,
    id: i64,
    column: ChecklistColumn,
    items: Vec<ChecklistItem>,
) -> Result<Json<BikeBuild>, ApiError> {
    let build = state
        .db
        .call(move |db| db.save_build_checklist(wid, id, column, &items))
        .await?;
    broadcast_build(state, &build);
    Ok(Json(build))
}

async fn build_checklist_action(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(action): Json<ChecklistAction>,
) -> Result<impl IntoResponse, ApiError> {
    apply_build_action(&state, wid, id, ChecklistColumn::Service, action).await
}

async fn replace_build_checklist(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<ReplaceChecklistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    replace_build_items(&state, wid, id, ChecklistColumn::Service, req.items).await
}

async fn build_control_action(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(action): Json<ChecklistAction>,
) -> Result<impl IntoResponse, ApiError> {
    apply_build_action(&state, wid, id, ChecklistColumn::Control, action).await
}

async fn replace_build_control(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<ReplaceChecklistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    replace_build_items(&state, wid, id, ChecklistColumn::Control, req.items).await
}

async fn print_build(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Query(query): Query<PrintQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let html = state
        .db
        .call(move |db| {
            let workshop = db.require_workshop(wid)?;
            let build = db.require_build(wid, id)?;
            let branding = db.get_branding(wid)?;
            Ok(export::render_build_sheet(
                &workshop,
                &build,
                &branding,
                ExportOptions {
                    auto_print: query.auto_print,
                },
            ))
        })
        .await?;
    Ok(Html(html))
}

fn broadcast_build(state: &SharedState, build: &BikeBuild) {
    broadcast_message(
        &state.ws_tx,
        &WsMessage::BuildUpdated {
            workshop_id: build.workshop_id,
            build: build.clone(),
        },
    );
}

// Templates

async fn list_templates(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Query(query): Query<TemplateListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let templates = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            db.list_templates(wid, query.kind)
        })
        .await?;
    Ok(Json(templates))
}

async fn create_template(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state
        .db
        .call(move |db| db.create_template(wid, &req.name, req.kind, &req.items))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TemplateSaved {
            workshop_id: wid,
            template: template.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(template)))
}

async fn get_template(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state.db.call(move |db| db.require_template(wid, id)).await?;
    Ok(Json(template))
}

async fn update_template(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(patch): Json<TemplatePatch>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state
        .db
        .call(move |db| db.update_template(wid, id, &patch))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TemplateSaved {
            workshop_id: wid,
            template: template.clone(),
        },
    );
    Ok(Json(template))
}

async fn delete_template(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_template(wid, id)).await?;
    let status = deleted_or_not_found(deleted, "ChecklistTemplate", id)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TemplateDeleted {
            workshop_id: wid,
            template_id: id,
        },
    );
    Ok(status)
}

// Tasks

async fn get_board(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let board = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            db.get_board(wid)
        })
        .await?;
    Ok(Json(board))
}

async fn create_task(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Json(req): Json<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.db.call(move |db| db.create_task(wid, &req)).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TaskCreated {
            workshop_id: wid,
            task: task.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(patch): Json<TaskPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .db
        .call(move |db| db.update_task(wid, id, &patch))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TaskUpdated {
            workshop_id: wid,
            task: task.clone(),
        },
    );
    Ok(Json(task))
}

async fn move_task(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<MoveTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (from_column, task) = state
        .db
        .call(move |db| {
            let before = db.require_task(wid, id)?;
            let task = db.move_task(wid, id, req.column, req.position)?;
            Ok((before.status, task))
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TaskMoved {
            workshop_id: wid,
            task_id: id,
            from_column,
            to_column: task.status,
            position: task.position,
        },
    );
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_task(wid, id)).await?;
    let status = deleted_or_not_found(deleted, "Task", id)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::TaskDeleted {
            workshop_id: wid,
            task_id: id,
        },
    );
    Ok(status)
}

// Notebook

async fn get_notebook(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tree = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            db.notebook_tree(wid)
        })
        .await?;
    Ok(Json(tree))
}

async fn create_page(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Json(req): Json<NewPage>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.db.call(move |db| db.create_page(wid, &req)).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::PageSaved {
            workshop_id: wid,
            page: page.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(page)))
}

async fn get_page(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.db.call(move |db| db.require_page(wid, id)).await?;
    Ok(Json(page))
}

async fn update_page(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(patch): Json<PagePatch>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .db
        .call(move |db| db.update_page(wid, id, &patch))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::PageSaved {
            workshop_id: wid,
            page: page.clone(),
        },
    );
    Ok(Json(page))
}

async fn move_page(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<MovePageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .db
        .call(move |db| db.move_page(wid, id, req.parent_id, req.position))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::PageMoved {
            workshop_id: wid,
            page_id: id,
            parent_id: page.parent_id,
            position: page.position,
        },
    );
    Ok(Json(page))
}

async fn delete_page(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.db.call(move |db| db.delete_page(wid, id)).await?;
    let Some(removed_ids) = removed else {
        return Err(ApiError::NotFound(ShopError::not_found("NotebookPage", id).to_string()));
    };
    broadcast_message(
        &state.ws_tx,
        &WsMessage::PageDeleted {
            workshop_id: wid,
            page_id: id,
            removed_ids,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

// Feedback

async fn list_feedback(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let feedback = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            db.list_feedback(wid)
        })
        .await?;
    Ok(Json(feedback))
}

async fn create_feedback(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
    Json(req): Json<NewFeedback>,
) -> Result<impl IntoResponse, ApiError> {
    let feedback = state.db.call(move |db| db.create_feedback(wid, &req)).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::FeedbackCreated {
            workshop_id: wid,
            feedback: feedback.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(feedback)))
}

async fn feedback_summary(
    State(state): State<SharedState>,
    Path(wid): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .db
        .call(move |db| {
            db.require_workshop(wid)?;
            db.feedback_summary(wid)
        })
        .await?;
    Ok(Json(summary))
}

async fn set_feedback_status(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
    Json(req): Json<FeedbackStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let feedback = state
        .db
        .call(move |db| db.set_feedback_status(wid, id, req.status))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::FeedbackUpdated {
            workshop_id: wid,
            feedback: feedback.clone(),
        },
    );
    Ok(Json(feedback))
}

async fn delete_feedback(
    State(state): State<SharedState>,
    Path((wid, id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_feedback(wid, id)).await?;
    let status = deleted_or_not_found(deleted, "Feedback", id)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::FeedbackDeleted {
            workshop_id: wid,
            feedback_id: id,
        },
    );
    Ok(status)
}

// Public intake

async fn submit_intake(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Json(form): Json<IntakeForm>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.intake.enabled {
        return Err(ApiError::NotFound("Online intake is disabled".into()));
    }
    let default_template = state.intake.default_template.clone();
    let order = state
        .db
        .call(move |db| {
            let workshop = db
                .get_workshop_by_slug(&slug)?
                .ok_or(ShopError::WorkshopSlugNotFound { slug })?;
            let checklist = match &default_template {
                Some(name) => db
                    .get_template_by_name(workshop.id, name)?
                    .map(|t| checklist::from_template(&t))
                    .unwrap_or_default(),
                None => Vec::new(),
            };
            let new_order = form
                .into_new_order(checklist)
                .map_err(ShopError::Validation)?;
            db.create_order(workshop.id, &new_order, OrderSource::Intake)
        })
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Intake submission rejected"))?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::OrderCreated {
            workshop_id: order.workshop_id,
            order: order.clone(),
        },
    );
    Ok((
        StatusCode::CREATED,
        Json(IntakeReceipt {
            order_number: order.order_number,
            tracking_code: order.tracking_code,
            status: order.status,
        }),
    ))
}

async fn intake_status(
    State(state): State<SharedState>,
    Path((slug, tracking_code)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .db
        .call(move |db| {
            let workshop = db
                .get_workshop_by_slug(&slug)?
                .ok_or(ShopError::WorkshopSlugNotFound { slug })?;
            db.get_order_by_tracking_code(workshop.id, &tracking_code)
        })
        .await?
        .ok_or_else(|| ApiError::NotFound("No order with that tracking code".into()))?;
    Ok(Json(IntakeStatus {
        bike: format!("{} {}", order.bike_brand, order.bike_model)
            .trim()
            .to_string(),
        ready_for_pickup: order.status == OrderStatus::Completed,
        order_number: order.order_number,
        status: order.status,
        due_date: order.due_date,
        updated_at: order.updated_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shop::db::ShopDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_state(intake: IntakeSection) -> SharedState {
        let db = ShopDb::new_in_memory().unwrap();
        let (ws_tx, _) = broadcast::channel(16);
        Arc::new(AppState {
            db: DbHandle::new(db),
            ws_tx,
            api_keys: Vec::new(),
            intake,
        })
    }

    fn test_app() -> Router {
        api_router().with_state(test_state(IntakeSection::default()))
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn create_workshop(app: &Router, name: &str) -> Workshop {
        let resp = app
            .clone()
            .oneshot(json_request("POST", "/api/workshops", json!({"name": name})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp.into_body()).await
    }

    async fn create_order(app: &Router, wid: i64) -> Order {
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/workshops/{}/orders", wid),
                json!({
                    "customer_name": "Ada",
                    "customer_email": "ada@example.com",
                    "bike_brand": "Gazelle",
                    "bike_model": "Orange",
                    "description": "Brakes squeak",
                    "estimated_price": "49,50",
                    "checklist": ["Check brakes"]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp.into_body()).await
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_create_and_list_workshops() {
        let app = test_app();
        let workshop = create_workshop(&app, "Spokes & Sons").await;
        assert_eq!(workshop.slug, "spokes-sons");

        let resp = app.oneshot(get_request("/api/workshops")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let workshops: Vec<Workshop> = body_json(resp.into_body()).await;
        assert_eq!(workshops.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_workshop_is_404() {
        let app = test_app();
        let resp = app
            .oneshot(get_request("/api/workshops/999/orders"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = body_json(resp.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_create_order_from_draft() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let order = create_order(&app, wid).await;
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.source, OrderSource::Staff);
        assert_eq!(order.estimated_price, Some(49.5));
        assert_eq!(order.checklist.len(), 1);

        let resp = app
            .oneshot(get_request(&format!("/api/workshops/{}/orders/{}", wid, order.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let detail: Value = body_json(resp.into_body()).await;
        assert_eq!(detail["order_number"], order.order_number);
        assert_eq!(detail["progress"]["total"], 1);
    }

    #[tokio::test]
    async fn test_create_order_validation_fields() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let resp = app
            .oneshot(json_request(
                "POST",
                &format!("/api/workshops/{}/orders", wid),
                json!({"customer_email": "not-an-email"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = body_json(resp.into_body()).await;
        let fields = body["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["field"] == "customer_name"));
        assert!(fields.iter().any(|f| f["field"] == "customer_email"));
    }

    #[tokio::test]
    async fn test_validate_unknown_workshop_is_not_found() {
        let app = test_app();
        let resp = app
            .oneshot(json_request(
                "POST",
                "/api/workshops/999/orders/validate?step=customer",
                json!({"customer_name": "Ada", "customer_phone": "0612345678"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_checklist_with_both_flags_does_not_break_server() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let order = create_order(&app, wid).await;
        for path in ["checklist", "control-checklist"] {
            let resp = app
                .clone()
                .oneshot(json_request(
                    "PUT",
                    &format!("/api/workshops/{}/orders/{}/{}", wid, order.id, path),
                    json!({"items": [{"text": "a", "completed": true, "skipped": true}]}),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let saved: Order = body_json(resp.into_body()).await;
            let items = if path == "checklist" {
                saved.checklist
            } else {
                saved.control_checklist
            };
            assert!(items[0].completed);
            assert!(!items[0].skipped);
        }

        let resp = app
            .clone()
            .oneshot(get_request(&format!("/api/workshops/{}/orders/{}", wid, order.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let detail: Value = body_json(resp.into_body()).await;
        assert_eq!(detail["progress"]["remaining"], 0);
        assert_eq!(detail["control_progress"]["finished"], true);

        let resp = app.oneshot(get_request("/api/workshops")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_patch_null_clears_order_fields() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let order = create_order(&app, wid).await;
        let uri = format!("/api/workshops/{}/orders/{}", wid, order.id);

        let resp = app
            .clone()
            .oneshot(json_request("PATCH", &uri, json!({"due_date": "2030-01-01"})))
            .await
            .unwrap();
        let updated: Order = body_json(resp.into_body()).await;
        assert_eq!(updated.due_date.as_deref(), Some("2030-01-01"));

        let resp = app
            .clone()
            .oneshot(json_request("PATCH", &uri, json!({"due_date": null})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cleared: Order = body_json(resp.into_body()).await;
        assert_eq!(cleared.due_date, None);
        assert_eq!(cleared.customer_email.as_deref(), Some("ada@example.com"));

        let resp = app
            .oneshot(json_request("PATCH", &uri, json!({"due_date": "next week"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validate_step_endpoint() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/workshops/{}/orders/validate?step=customer", wid),
                json!({"customer_name": "Ada", "customer_phone": "0612345678"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let report: ValidationReport = body_json(resp.into_body()).await;
        assert!(report.valid);
        assert_eq!(report.next, Some(WizardStep::Bike));
        assert!(report.previous.is_none());

        let resp = app
            .oneshot(json_request(
                "POST",
                &format!("/api/workshops/{}/orders/validate?step=bike", wid),
                json!({}),
            ))
            .await
            .unwrap();
        let report: ValidationReport = body_json(resp.into_body()).await;
        assert!(!report.valid);
        assert!(report.next.is_none());
        assert_eq!(report.previous, Some(WizardStep::Customer));
    }

    #[tokio::test]
    async fn test_orders_are_isolated_per_workshop() {
        let app = test_app();
        let a = create_workshop(&app, "Alpha").await.id;
        let b = create_workshop(&app, "Beta").await.id;
        let order = create_order(&app, a).await;

        let resp = app
            .clone()
            .oneshot(get_request(&format!("/api/workshops/{}/orders/{}", b, order.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(get_request(&format!("/api/workshops/{}/orders", b)))
            .await
            .unwrap();
        let orders: Vec<Order> = body_json(resp.into_body()).await;
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_with_filter() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        create_order(&app, wid).await;
        let resp = app
            .clone()
            .oneshot(get_request(&format!(
                "/api/workshops/{}/orders?search=gazelle&status=new",
                wid
            )))
            .await
            .unwrap();
        let orders: Vec<Order> = body_json(resp.into_body()).await;
        assert_eq!(orders.len(), 1);

        let resp = app
            .oneshot(get_request(&format!(
                "/api/workshops/{}/orders?status=completed",
                wid
            )))
            .await
            .unwrap();
        let orders: Vec<Order> = body_json(resp.into_body()).await;
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_status_transition_is_409() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let order = create_order(&app, wid).await;
        let resp = app
            .oneshot(json_request(
                "PATCH",
                &format!("/api/workshops/{}/orders/{}/status", wid, order.id),
                json!({"status": "picked_up"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_checklist_and_end_control_flow() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let order = create_order(&app, wid).await;
        let base = format!("/api/workshops/{}/orders/{}", wid, order.id);

        for status in ["in_progress", "in_control"] {
            let resp = app
                .clone()
                .oneshot(json_request(
                    "PATCH",
                    &format!("{}/status", base),
                    json!({"status": status}),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("{}/control-checklist", base),
                json!({"items": [{"text": "Test ride"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // Open control item blocks a pass.
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("{}/end-control", base),
                json!({"reviewer_name": "Mia", "passed": true}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("{}/control-checklist", base),
                json!({"action": "complete", "index": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(json_request(
                "POST",
                &format!("{}/end-control", base),
                json!({"reviewer_name": "Mia", "passed": true, "notes": "Rides well"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let done: Order = body_json(resp.into_body()).await;
        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.end_control.unwrap().reviewer_name, "Mia");
    }

    #[tokio::test]
    async fn test_checklist_index_out_of_range_is_400() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let order = create_order(&app, wid).await;
        let resp = app
            .oneshot(json_request(
                "POST",
                &format!("/api/workshops/{}/orders/{}/checklist", wid, order.id),
                json!({"action": "skip", "index": 7}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_order_twice() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let order = create_order(&app, wid).await;
        let uri = format!("/api/workshops/{}/orders/{}", wid, order.id);
        let req = || Request::builder().method("DELETE").uri(&uri).body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let resp = app.oneshot(req()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_print_order_returns_html() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let order = create_order(&app, wid).await;
        let resp = app
            .oneshot(get_request(&format!(
                "/api/workshops/{}/orders/{}/print?auto_print=true",
                wid, order.id
            )))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/html"));
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains(&order.order_number));
        assert!(html.contains("window.print()"));
    }

    #[tokio::test]
    async fn test_build_from_template_and_status() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/workshops/{}/templates", wid),
                json!({"name": "Road build", "kind": "build", "items": ["Fit bar tape", "True wheels"]}),
            ))
            .await
            .unwrap();
        let template: ChecklistTemplate = body_json(resp.into_body()).await;

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/workshops/{}/builds", wid),
                json!({"brand": "Koga", "model": "Kimera", "template_id": template.id}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let build: BikeBuild = body_json(resp.into_body()).await;
        assert_eq!(build.checklist.len(), 2);
        assert_eq!(build.status, BuildStatus::Planned);

        let resp = app
            .oneshot(json_request(
                "PATCH",
                &format!("/api/workshops/{}/builds/{}/status", wid, build.id),
                json!({"status": "assembling"}),
            ))
            .await
            .unwrap();
        let build: BikeBuild = body_json(resp.into_body()).await;
        assert_eq!(build.status, BuildStatus::Assembling);
    }

    #[tokio::test]
    async fn test_duplicate_template_is_409() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let uri = format!("/api/workshops/{}/templates", wid);
        let body = json!({"name": "Basic", "kind": "service"});
        let resp = app.clone().oneshot(json_request("POST", &uri, body.clone())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let resp = app.oneshot(json_request("POST", &uri, body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_task_board_move() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let mut ids = Vec::new();
        for title in ["One", "Two"] {
            let resp = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    &format!("/api/workshops/{}/tasks", wid),
                    json!({"title": title}),
                ))
                .await
                .unwrap();
            let task: ShopTask = body_json(resp.into_body()).await;
            ids.push(task.id);
        }

        let resp = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/api/workshops/{}/tasks/{}/move", wid, ids[1]),
                json!({"column": "done", "position": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(get_request(&format!("/api/workshops/{}/tasks/board", wid)))
            .await
            .unwrap();
        let board: TaskBoard = body_json(resp.into_body()).await;
        assert_eq!(board.columns.len(), 3);
        assert_eq!(board.columns[0].tasks.len(), 1);
        assert_eq!(board.columns[0].tasks[0].position, 0);
        assert_eq!(board.columns[2].tasks[0].id, ids[1]);
    }

    #[tokio::test]
    async fn test_notebook_rejects_cycles_and_non_folders() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let uri = format!("/api/workshops/{}/notebook", wid);

        let resp = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"title": "Manuals", "is_folder": true})))
            .await
            .unwrap();
        let folder: NotebookPage = body_json(resp.into_body()).await;
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &uri,
                json!({"title": "Shimano", "is_folder": true, "parent_id": folder.id}),
            ))
            .await
            .unwrap();
        let child: NotebookPage = body_json(resp.into_body()).await;
        let resp = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"title": "Note"})))
            .await
            .unwrap();
        let note: NotebookPage = body_json(resp.into_body()).await;

        let resp = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("{}/{}/move", uri, folder.id),
                json!({"parent_id": child.id, "position": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                &uri,
                json!({"title": "Under a note", "parent_id": note.id}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.oneshot(get_request(&uri)).await.unwrap();
        let tree: Vec<Value> = body_json(resp.into_body()).await;
        assert_eq!(tree.len(), 2);
    }

    #[tokio::test]
    async fn test_feedback_summary() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let uri = format!("/api/workshops/{}/feedback", wid);
        for (kind, rating) in [("praise", 5), ("complaint", 2)] {
            let resp = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    &uri,
                    json!({"kind": kind, "rating": rating, "message": "Thanks"}),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }
        let resp = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"kind": "bug", "rating": 9, "message": "x"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(get_request(&format!("{}/summary", uri)))
            .await
            .unwrap();
        let summary: FeedbackSummary = body_json(resp.into_body()).await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.open, 2);
        assert_eq!(summary.average_rating, Some(3.5));
    }

    #[tokio::test]
    async fn test_branding_roundtrip_and_validation() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let uri = format!("/api/workshops/{}/branding", wid);
        let resp = app
            .clone()
            .oneshot(json_request("PUT", &uri, json!({"primary_color": "#112233"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = app
            .clone()
            .oneshot(json_request("PUT", &uri, json!({"primary_color": "blue"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = app.oneshot(get_request(&uri)).await.unwrap();
        let branding: Branding = body_json(resp.into_body()).await;
        assert_eq!(branding.primary_color, "#112233");
    }

    #[tokio::test]
    async fn test_employee_deactivate_keeps_row() {
        let app = test_app();
        let wid = create_workshop(&app, "Spokes").await.id;
        let uri = format!("/api/workshops/{}/employees", wid);
        let resp = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"name": "Mia", "role": "manager"})))
            .await
            .unwrap();
        let employee: Employee = body_json(resp.into_body()).await;
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("{}/{}", uri, employee.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let employee: Employee = body_json(resp.into_body()).await;
        assert!(!employee.active);

        let resp = app
            .oneshot(get_request(&format!("{}?active_only=true", uri)))
            .await
            .unwrap();
        let active: Vec<Employee> = body_json(resp.into_body()).await;
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_intake_submission_and_status() {
        let state = test_state(IntakeSection {
            enabled: true,
            default_template: Some("Intake".into()),
        });
        let app = api_router().with_state(state.clone());
        let wid = create_workshop(&app, "Spokes").await.id;
        state
            .db
            .call(move |db| {
                db.create_template(wid, "Intake", TemplateKind::Service, &["Inspect".to_string()])
            })
            .await
            .unwrap();
        let mut rx = state.ws_tx.subscribe();

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/intake/spokes",
                json!({
                    "name": "Bo",
                    "phone": "0612345678",
                    "bike_brand": "Batavus",
                    "bike_model": "Dinsdag",
                    "description": "Flat tyre"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let receipt: IntakeReceipt = body_json(resp.into_body()).await;
        assert_eq!(receipt.status, OrderStatus::New);
        assert_eq!(receipt.tracking_code.len(), 12);

        let event: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(event["type"], "OrderCreated");
        assert_eq!(event["data"]["order"]["source"], "intake");
        assert_eq!(event["data"]["order"]["checklist"][0]["text"], "Inspect");

        let resp = app
            .oneshot(get_request(&format!(
                "/intake/spokes/status/{}",
                receipt.tracking_code.to_lowercase()
            )))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let status: IntakeStatus = body_json(resp.into_body()).await;
        assert_eq!(status.order_number, receipt.order_number);
        assert_eq!(status.bike, "Batavus Dinsdag");
        assert!(!status.ready_for_pickup);
    }

    #[tokio::test]
    async fn test_intake_unknown_slug_and_disabled() {
        let app = test_app();
        let form = json!({"name": "Bo", "email": "bo@example.com", "bike_brand": "X", "description": "Y"});
        let resp = app
            .oneshot(json_request("POST", "/intake/nowhere", form.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let app = api_router().with_state(test_state(IntakeSection {
            enabled: false,
            default_template: None,
        }));
        create_workshop(&app, "Spokes").await;
        let resp = app
            .oneshot(json_request("POST", "/intake/spokes", form))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_intake_status_unknown_code() {
        let app = test_app();
        create_workshop(&app, "Spokes").await;
        let resp = app
            .oneshot(get_request("/intake/spokes/status/DEADBEEF0000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_api_error_mapping() {
        let err: ApiError = anyhow::Error::from(ShopError::not_found("Order", 1)).into();
        assert!(matches!(err, ApiError::NotFound(_)));
        let err: ApiError = anyhow::Error::from(ShopError::NotAFolder { id: 3 }).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
        let err: ApiError = anyhow::Error::from(ShopError::ChecklistIncomplete { remaining: 2 }).into();
        assert!(matches!(err, ApiError::Conflict(_)));
        let err: ApiError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
