use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use kdeal_db::{ProductListFilters, ProductRow, ProductSort};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

const DEFAULT_PAGE_SIZE: i64 = 24;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    id: Uuid,
    slug: String,
    title: String,
    original_title: String,
    description: Option<String>,
    seo_description: String,
    image_url: Option<String>,
    original_price: Option<Decimal>,
    sale_price: Decimal,
    discount_percentage: Option<i32>,
    currency: String,
    affiliate_link: Option<String>,
    product_url: Option<String>,
    brand: Option<String>,
    merchant_id: Option<String>,
    merchant_name: Option<String>,
    category: String,
    parent_product_id: Option<Uuid>,
    variant_value: Option<String>,
    availability: String,
    is_featured: bool,
    last_synced_at: DateTime<Utc>,
}

impl From<ProductRow> for ProductItem {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.seo_title,
            original_title: row.original_title,
            description: row.description,
            seo_description: row.seo_description,
            image_url: row.image_url,
            original_price: row.original_price,
            sale_price: row.sale_price,
            discount_percentage: row.discount_percentage,
            currency: row.currency,
            affiliate_link: row.affiliate_link,
            product_url: row.product_url,
            brand: row.brand,
            merchant_id: row.merchant_id,
            merchant_name: row.merchant_name,
            category: row.category_slug,
            parent_product_id: row.parent_product_id,
            variant_value: row.variant_value,
            availability: row.availability,
            is_featured: row.is_featured,
            last_synced_at: row.last_synced_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ProductPage {
    items: Vec<ProductItem>,
    page: i64,
    limit: i64,
    total: i64,
    has_more: bool,
    shuffled: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct VariantGroup {
    parent: ProductItem,
    variants: Vec<ProductItem>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    /// Comma-separated merchant ids.
    pub merchant: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_discount: Option<i32>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub include_variants: bool,
}

/// Row offset of `page`. A shuffled page reorders only its own `limit`
/// rows, so paging through visits every row exactly once.
fn page_offset(page: i64, limit: i64) -> i64 {
    (page - 1).saturating_mul(limit)
}

fn parse_merchants(raw: Option<&str>) -> Option<Vec<String>> {
    let ids: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<ProductPage>>, ApiError> {
    let sort = query
        .sort
        .as_deref()
        .map(str::parse::<ProductSort>)
        .transpose()
        .map_err(|message| ApiError::new(req_id.0.clone(), "bad_request", message))?;
    if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
        if min > max {
            return Err(ApiError::new(
                req_id.0,
                "bad_request",
                "min_price must not exceed max_price",
            ));
        }
    }

    let page = query.page.unwrap_or(1).max(1);
    let limit = normalize_limit(query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let shuffle = sort.is_none() && query.category.is_none();
    let merchants = parse_merchants(query.merchant.as_deref());

    let filters = ProductListFilters {
        search: query.search.as_deref(),
        category_slug: query.category.as_deref(),
        merchant_ids: merchants.as_deref(),
        min_price: query.min_price,
        max_price: query.max_price,
        min_discount: query.min_discount,
        include_variants: query.include_variants,
        sort: sort.unwrap_or_default(),
        limit,
        offset: page_offset(page, limit),
    };

    let total = kdeal_db::count_products(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let mut rows = kdeal_db::list_products(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if shuffle {
        rows = kdeal_core::diversity_shuffle(rows);
    }

    let data = ProductPage {
        has_more: page.saturating_mul(limit) < total,
        items: rows.into_iter().map(ProductItem::from).collect(),
        page,
        limit,
        total,
        shuffled: shuffle,
    };

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

async fn active_product_by_slug(
    state: &AppState,
    req_id: &RequestId,
    slug: &str,
) -> Result<ProductRow, ApiError> {
    let row = kdeal_db::get_product_by_slug(&state.pool, slug)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    match row {
        Some(row) if row.is_active => Ok(row),
        _ => Err(ApiError::new(
            req_id.0.clone(),
            "not_found",
            format!("product '{slug}' not found"),
        )),
    }
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let row = active_product_by_slug(&state, &req_id, &slug).await?;
    Ok(Json(ApiResponse::new(ProductItem::from(row), req_id.0)))
}

/// The size group a product belongs to. Asking for a variant's slug returns
/// its parent's group.
pub(super) async fn list_product_variants(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<VariantGroup>>, ApiError> {
    let row = active_product_by_slug(&state, &req_id, &slug).await?;

    let parent = match row.parent_product_id {
        None => row,
        Some(parent_id) => kdeal_db::get_product_by_id(&state.pool, parent_id)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?
            .unwrap_or(row),
    };

    let variants = kdeal_db::list_product_variants(&state.pool, parent.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = VariantGroup {
        parent: ProductItem::from(parent),
        variants: variants.into_iter().map(ProductItem::from).collect(),
    };
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

#[cfg(test)]
#[path = "products_test.rs"]
mod tests;
