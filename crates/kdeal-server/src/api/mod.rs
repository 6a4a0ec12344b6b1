mod catalog;
mod products;
mod sync;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use kdeal_core::AppConfig;
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    guard_admin, request_id, AdminGate, AdminGuard, AdminQuota, RequestId, REQUEST_ID_HEADER,
};
use crate::pipeline::LiveRuns;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub live_runs: LiveRuns,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "bad_gateway" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Clamp a `limit` query value to `1..=max`, defaulting to `default`.
pub(super) fn normalize_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

pub(super) fn map_db_error(request_id: String, error: &kdeal_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

fn catalog_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/products", get(products::list_products))
        .route("/api/v1/products/{slug}", get(products::get_product))
        .route(
            "/api/v1/products/{slug}/variants",
            get(products::list_product_variants),
        )
        .route("/api/v1/deals/top", get(catalog::list_top_deals))
        .route("/api/v1/deals/featured", get(catalog::list_featured_deals))
        .route("/api/v1/categories", get(catalog::list_categories))
        .route("/api/v1/stats", get(catalog::get_stats))
}

fn admin_router(guard: AdminGuard) -> Router<AppState> {
    Router::new()
        .route("/api/v1/sync/commands", post(sync::run_command))
        .route(
            "/api/v1/sync/runs",
            get(sync::list_runs).post(sync::start_run),
        )
        .route("/api/v1/sync/runs/{id}", get(sync::get_run))
        .route("/api/v1/sync/runs/{id}/cancel", post(sync::cancel_run))
        .route("/api/v1/sync/runs/{id}/resume", post(sync::resume_run))
        .layer(axum::middleware::from_fn_with_state(guard, guard_admin))
}

pub fn build_app(state: AppState, gate: AdminGate, quota: AdminQuota) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .merge(catalog_router());

    Router::new()
        .merge(public_routes)
        .merge(admin_router(AdminGuard { gate, quota }))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match kdeal_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_admin_quota() -> AdminQuota {
    AdminQuota::new(120, Duration::from_secs(60))
}
