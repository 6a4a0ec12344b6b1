use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, products::ProductItem, ApiError, ApiResponse, AppState};

const DEFAULT_DEALS: i64 = 12;
const MAX_DEALS: i64 = 50;

#[derive(Debug, Serialize)]
pub(super) struct CategoryItem {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    icon: Option<String>,
    product_count: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct CatalogStats {
    active_products: i64,
    featured_products: i64,
    linked_variants: i64,
    merchants: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct DealsQuery {
    pub limit: Option<i64>,
}

pub(super) async fn list_top_deals(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<DealsQuery>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let limit = normalize_limit(query.limit, DEFAULT_DEALS, MAX_DEALS);
    let rows = kdeal_db::list_top_deals(&state.pool, limit)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(ProductItem::from).collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// Featured rail, shuffled so neighbouring cards vary.
pub(super) async fn list_featured_deals(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<DealsQuery>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let limit = normalize_limit(query.limit, DEFAULT_DEALS, MAX_DEALS);
    let rows = kdeal_db::list_featured_deals(&state.pool, limit)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = kdeal_core::diversity_shuffle(rows)
        .into_iter()
        .map(ProductItem::from)
        .collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<CategoryItem>>>, ApiError> {
    let rows = kdeal_db::list_categories_with_counts(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| CategoryItem {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            icon: row.icon,
            product_count: row.product_count,
        })
        .collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn get_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<CatalogStats>>, ApiError> {
    let row = kdeal_db::product_stats(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = CatalogStats {
        active_products: row.active_products,
        featured_products: row.featured_products,
        linked_variants: row.linked_variants,
        merchants: row.merchants,
    };
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{category_id, open_gate, product, seeded_state};
    use crate::api::{build_app, default_admin_quota};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use kdeal_core::CategorySlug;
    use tower::ServiceExt;

    async fn get_json(state: crate::api::AppState, uri: &str) -> serde_json::Value {
        let response = build_app(state, open_gate(), default_admin_quota())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn top_deals_are_ordered_by_discount(pool: sqlx::PgPool) {
        let state = seeded_state(pool).await;
        let reizen = category_id(&state.pool, CategorySlug::Reizen).await;
        let rows = vec![
            product("A", CategorySlug::Reizen, reizen, 15),
            product("B", CategorySlug::Reizen, reizen, 70),
            product("C", CategorySlug::Reizen, reizen, 40),
        ];
        kdeal_db::upsert_products(&state.pool, &rows)
            .await
            .expect("upsert");

        let json = get_json(state, "/api/v1/deals/top?limit=2").await;
        let discounts: Vec<i64> = json["data"]
            .as_array()
            .expect("deals")
            .iter()
            .map(|d| d["discount_percentage"].as_i64().expect("discount"))
            .collect();
        assert_eq!(discounts, vec![70, 40]);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn categories_report_active_counts(pool: sqlx::PgPool) {
        let state = seeded_state(pool).await;
        let mode = category_id(&state.pool, CategorySlug::Mode).await;
        kdeal_db::upsert_products(
            &state.pool,
            &[
                product("A", CategorySlug::Mode, mode, 10),
                product("B", CategorySlug::Mode, mode, 60),
            ],
        )
        .await
        .expect("upsert");

        let json = get_json(state, "/api/v1/categories").await;
        let categories = json["data"].as_array().expect("categories");
        assert_eq!(categories.len(), CategorySlug::ALL.len());
        let mode_entry = categories
            .iter()
            .find(|c| c["slug"] == "mode")
            .expect("mode category");
        assert_eq!(mode_entry["product_count"], 2);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn stats_count_featured_products(pool: sqlx::PgPool) {
        let state = seeded_state(pool).await;
        let mode = category_id(&state.pool, CategorySlug::Mode).await;
        kdeal_db::upsert_products(
            &state.pool,
            &[
                product("A", CategorySlug::Mode, mode, 10),
                product("B", CategorySlug::Mode, mode, 60),
            ],
        )
        .await
        .expect("upsert");

        let json = get_json(state, "/api/v1/stats").await;
        assert_eq!(json["data"]["active_products"], 2);
        assert_eq!(json["data"]["featured_products"], 1);
        assert_eq!(json["data"]["merchants"], 1);
    }
}
