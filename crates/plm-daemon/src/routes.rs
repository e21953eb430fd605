//! Axum router and all HTTP handlers for plm-daemon (§6).
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly. Handlers are thin: every one
//! reads the relevant snapshot out of `AppState` and delegates to
//! `plm-ingestion`, converting its `PlmError` into the matching HTTP status.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use plm_ingestion::PlmError;
use plm_reconcile::RecalculateScopeRequest;
use plm_schemas::NewSettlement;

use crate::{
    api_types::{
        ApprovalActionRequest, ApprovalActionResponse, BulkApprovalActionRequest,
        BulkApprovalActionResponse, ErrorResponse, HealthResponse, IngestSettlementRequest,
        IngestSettlementResponse, RecalculateScopeRequestBody, RecalculateScopeResponse,
        SettlementViewResponse,
    },
    state::AppState,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/settlements", post(ingest_settlement))
        .route("/v1/settlements/:business_id", get(query_settlement))
        .route(
            "/v1/settlements/:business_id/versions/:version/request-release",
            post(request_release),
        )
        .route(
            "/v1/settlements/:business_id/versions/:version/authorize",
            post(authorize),
        )
        .route("/v1/settlements/bulk/request-release", post(request_release_bulk))
        .route("/v1/settlements/bulk/authorize", post(authorize_bulk))
        .route("/v1/recalculate-scope", post(recalculate_scope))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/settlements — IngestSettlement
// ---------------------------------------------------------------------------

pub(crate) async fn ingest_settlement(
    State(st): State<Arc<AppState>>,
    Json(body): Json<IngestSettlementRequest>,
) -> Response {
    let s = NewSettlement {
        business_id: body.business_id,
        version: body.version,
        pts: body.pts,
        processing_entity: body.processing_entity,
        counterparty_id: body.counterparty_id,
        value_date: body.value_date,
        currency: body.currency,
        amount: body.amount,
        direction: body.direction,
        settlement_type: body.settlement_type,
        business_status: body.business_status,
    };

    let rate_book = st.rate_book.read().await.clone();
    let rule_book = st.rule_book.read().await.clone();

    match plm_ingestion::ingest_settlement(&st.pool, &s, &st.config, &rate_book, &rule_book).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(IngestSettlementResponse {
                ref_id: outcome.ref_id,
                duplicate: outcome.duplicate,
            }),
        )
            .into_response(),
        Err(err) => plm_error_response(err),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/settlements/:business_id — QuerySettlement
// ---------------------------------------------------------------------------

pub(crate) async fn query_settlement(
    State(st): State<Arc<AppState>>,
    Path(business_id): Path<String>,
) -> Response {
    let limit_book = st.limit_book.read().await.clone();
    match plm_ingestion::query_settlement(&st.pool, &business_id, &limit_book).await {
        Ok(Some(view)) => (StatusCode::OK, Json(SettlementViewResponse::from(view))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no settlement found for business_id {business_id}"),
                business_id: Some(business_id),
                version: None,
            }),
        )
            .into_response(),
        Err(err) => plm_error_response(err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/settlements/:business_id/versions/:version/request-release
// ---------------------------------------------------------------------------

pub(crate) async fn request_release(
    State(st): State<Arc<AppState>>,
    Path((business_id, version)): Path<(String, i32)>,
    Json(body): Json<ApprovalActionRequest>,
) -> Response {
    let limit_book = st.limit_book.read().await.clone();
    match plm_ingestion::request_release(&st.pool, &business_id, version, &body.user_id, &body.comment, &limit_book)
        .await
    {
        Ok(derived_status) => (StatusCode::OK, Json(ApprovalActionResponse { derived_status })).into_response(),
        Err(err) => plm_error_response(err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/settlements/:business_id/versions/:version/authorize
// ---------------------------------------------------------------------------

pub(crate) async fn authorize(
    State(st): State<Arc<AppState>>,
    Path((business_id, version)): Path<(String, i32)>,
    Json(body): Json<ApprovalActionRequest>,
) -> Response {
    match plm_ingestion::authorise(&st.pool, &business_id, version, &body.user_id, &body.comment).await {
        Ok(derived_status) => (StatusCode::OK, Json(ApprovalActionResponse { derived_status })).into_response(),
        Err(err) => plm_error_response(err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/settlements/bulk/request-release
// ---------------------------------------------------------------------------

pub(crate) async fn request_release_bulk(
    State(st): State<Arc<AppState>>,
    Json(body): Json<BulkApprovalActionRequest>,
) -> Response {
    let limit_book = st.limit_book.read().await.clone();
    let items: Vec<(String, i32)> = body.items.into_iter().map(|i| (i.business_id, i.version)).collect();
    match plm_ingestion::request_release_bulk(&st.pool, &items, &body.user_id, &body.comment, &limit_book).await {
        Ok(derived_statuses) => (StatusCode::OK, Json(BulkApprovalActionResponse { derived_statuses })).into_response(),
        Err(err) => plm_error_response(err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/settlements/bulk/authorize
// ---------------------------------------------------------------------------

pub(crate) async fn authorize_bulk(
    State(st): State<Arc<AppState>>,
    Json(body): Json<BulkApprovalActionRequest>,
) -> Response {
    let items: Vec<(String, i32)> = body.items.into_iter().map(|i| (i.business_id, i.version)).collect();
    match plm_ingestion::authorise_bulk(&st.pool, &items, &body.user_id, &body.comment).await {
        Ok(derived_statuses) => (StatusCode::OK, Json(BulkApprovalActionResponse { derived_statuses })).into_response(),
        Err(err) => plm_error_response(err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/recalculate-scope
// ---------------------------------------------------------------------------

/// `RecalculateScope` "requires elevated privilege" (§6): the handler accepts
/// it only with `Authorization: Bearer <token>` matching the configured
/// `recalculate_scope_token`. A deployment that leaves the token unset has no
/// way to authorize the route at all, so every request is refused rather than
/// defaulting to open.
fn authorize_elevated(st: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = st.config.recalculate_scope_token.as_deref() else {
        return Err(unauthorized("recalculate-scope is not configured with an elevated-privilege token"));
    };

    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(unauthorized("missing or invalid bearer token for an elevated-privilege operation")),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
            business_id: None,
            version: None,
        }),
    )
        .into_response()
}

pub(crate) async fn recalculate_scope(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RecalculateScopeRequestBody>,
) -> Response {
    if let Err(resp) = authorize_elevated(&st, &headers) {
        return resp;
    }

    let request = RecalculateScopeRequest {
        pts: body.pts,
        processing_entity: body.processing_entity,
        counterparty_id: body.counterparty_id,
        value_date_from: body.value_date_from,
        value_date_to: body.value_date_to,
    };
    let rate_book = st.rate_book.read().await.clone();
    let rule_book = st.rule_book.read().await.clone();

    match plm_ingestion::recalculate_scope(&st.pool, &request, &body.user_id, &body.reason, &rate_book, &rule_book)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(RecalculateScopeResponse {
                groups_recomputed: outcome.groups_recomputed,
            }),
        )
            .into_response(),
        Err(err) => plm_error_response(err),
    }
}

// ---------------------------------------------------------------------------
// PlmError -> HTTP response (§7 Rust realization)
// ---------------------------------------------------------------------------

fn plm_error_response(err: PlmError) -> Response {
    let status = match &err {
        PlmError::Validation { .. } => StatusCode::BAD_REQUEST,
        PlmError::Duplicate { .. } => StatusCode::OK,
        PlmError::MissingRate { .. } | PlmError::TransientStorage { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PlmError::ApprovalViolation { .. } => StatusCode::CONFLICT,
        PlmError::Fatal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let business_id = err.business_id().map(str::to_string);
    tracing::error!(
        business_id = business_id.as_deref().unwrap_or("-"),
        stage = err.stage().unwrap_or("-"),
        "{err}"
    );

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            business_id,
            version: None,
        }),
    )
        .into_response()
}
