//! Database operations for the `products` catalog table.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use kdeal_core::{DiversityKeys, NormalizedProduct};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Shared projection for [`ProductRow`]; every catalog read joins the
/// category so the slug is available to the shuffler and the API.
const PRODUCT_SELECT: &str = "SELECT \
         p.id, p.awin_product_id, p.slug, p.original_title, p.seo_title, p.description, \
         p.seo_description, p.image_url, p.original_price, p.sale_price, \
         p.discount_percentage, p.currency, p.product_url, p.affiliate_link, p.brand, \
         p.merchant_id, p.merchant_name, p.merchant_category, p.category_id, \
         c.slug AS category_slug, p.parent_product_id, p.variant_value, p.availability, \
         p.is_featured, p.is_active, p.last_synced_at, p.created_at, p.updated_at \
     FROM products p \
     JOIN categories c ON c.id = p.category_id";

/// A row from the `products` table, with its category slug.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub awin_product_id: String,
    pub slug: String,
    pub original_title: String,
    pub seo_title: String,
    pub description: Option<String>,
    pub seo_description: String,
    pub image_url: Option<String>,
    pub original_price: Option<Decimal>,
    pub sale_price: Decimal,
    pub discount_percentage: Option<i32>,
    pub currency: String,
    pub product_url: Option<String>,
    pub affiliate_link: Option<String>,
    pub brand: Option<String>,
    pub merchant_id: Option<String>,
    pub merchant_name: Option<String>,
    pub merchant_category: Option<String>,
    pub category_id: Uuid,
    pub category_slug: String,
    pub parent_product_id: Option<Uuid>,
    pub variant_value: Option<String>,
    pub availability: String,
    pub is_featured: bool,
    pub is_active: bool,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiversityKeys for ProductRow {
    fn category_key(&self) -> Option<&str> {
        Some(&self.category_slug)
    }

    fn brand_key(&self) -> Option<&str> {
        self.brand.as_deref().or(self.merchant_name.as_deref())
    }
}

/// Persisted variant candidate read back by the linker.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UnlinkedVariantRow {
    pub id: Uuid,
    pub original_title: String,
    pub brand: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts for the storefront header.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct ProductStatsRow {
    pub active_products: i64,
    pub featured_products: i64,
    pub linked_variants: i64,
    pub merchants: i64,
}

/// Inserted vs. updated rows for one upsert call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub added: u64,
    pub updated: u64,
}

/// Catalog ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceLow,
    PriceHigh,
    Discount,
}

impl ProductSort {
    fn order_by(self) -> &'static str {
        match self {
            ProductSort::Newest => "p.created_at DESC, p.id",
            ProductSort::PriceLow => "p.sale_price ASC NULLS LAST, p.id",
            ProductSort::PriceHigh => "p.sale_price DESC NULLS LAST, p.id",
            ProductSort::Discount => "p.discount_percentage DESC NULLS LAST, p.id",
        }
    }
}

impl std::str::FromStr for ProductSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(ProductSort::Newest),
            "price_low" => Ok(ProductSort::PriceLow),
            "price_high" => Ok(ProductSort::PriceHigh),
            "discount" => Ok(ProductSort::Discount),
            other => Err(format!(
                "unknown sort '{other}'; expected newest, price_low, price_high or discount"
            )),
        }
    }
}

/// Input filters for the storefront listing. Only active rows are returned.
///
/// Unless `include_variants` is set, both linked variants and size rows are
/// hidden so each product appears once.
#[derive(Debug, Clone, Default)]
pub struct ProductListFilters<'a> {
    /// Case-insensitive substring over SEO title, description and brand.
    pub search: Option<&'a str>,
    pub category_slug: Option<&'a str>,
    pub merchant_ids: Option<&'a [String]>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_discount: Option<i32>,
    pub include_variants: bool,
    pub sort: ProductSort,
    pub limit: i64,
    pub offset: i64,
}

const LIST_PREDICATES: &str = "p.is_active \
       AND ($1::TEXT IS NULL OR p.seo_title ILIKE $1 OR p.description ILIKE $1 OR p.brand ILIKE $1) \
       AND ($2::TEXT IS NULL OR c.slug = $2) \
       AND ($3::TEXT[] IS NULL OR p.merchant_id = ANY($3)) \
       AND ($4::NUMERIC IS NULL OR p.sale_price >= $4) \
       AND ($5::NUMERIC IS NULL OR p.sale_price <= $5) \
       AND ($6::INTEGER IS NULL OR p.discount_percentage >= $6) \
       AND ($7 OR (p.parent_product_id IS NULL AND p.variant_value IS NULL))";

fn search_pattern(search: Option<&str>) -> Option<String> {
    let term = search?.trim();
    if term.is_empty() {
        return None;
    }
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
}

/// Upsert a batch of normalized products keyed by `awin_product_id`.
///
/// Uses a single `INSERT … SELECT * FROM UNNEST(…) ON CONFLICT` so the whole
/// batch is one round-trip. Identity columns (`slug`, `created_at`) and the
/// variant linkage are left untouched on update; everything the feed owns is
/// refreshed and the row is re-activated.
///
/// Postgres rejects a statement that touches one row twice, so when the
/// batch repeats an id only its last occurrence is written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails; nothing from the batch
/// is written in that case.
pub async fn upsert_products(
    pool: &PgPool,
    products: &[NormalizedProduct],
) -> Result<UpsertCounts, DbError> {
    let mut seen = HashSet::with_capacity(products.len());
    let mut batch: Vec<&NormalizedProduct> = products
        .iter()
        .rev()
        .filter(|p| seen.insert(p.awin_product_id.as_str()))
        .collect();
    batch.reverse();

    if batch.is_empty() {
        return Ok(UpsertCounts::default());
    }

    let n = batch.len();
    let mut awin_ids: Vec<&str> = Vec::with_capacity(n);
    let mut slugs: Vec<&str> = Vec::with_capacity(n);
    let mut titles: Vec<&str> = Vec::with_capacity(n);
    let mut seo_titles: Vec<&str> = Vec::with_capacity(n);
    let mut descriptions: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut seo_descriptions: Vec<&str> = Vec::with_capacity(n);
    let mut image_urls: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut original_prices: Vec<Option<Decimal>> = Vec::with_capacity(n);
    let mut sale_prices: Vec<Decimal> = Vec::with_capacity(n);
    let mut discounts: Vec<Option<i32>> = Vec::with_capacity(n);
    let mut currencies: Vec<&str> = Vec::with_capacity(n);
    let mut product_urls: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut affiliate_links: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut brands: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut merchant_ids: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut merchant_names: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut merchant_categories: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut category_ids: Vec<Uuid> = Vec::with_capacity(n);
    let mut variant_values: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut availabilities: Vec<&str> = Vec::with_capacity(n);
    let mut featured: Vec<bool> = Vec::with_capacity(n);
    let mut active: Vec<bool> = Vec::with_capacity(n);
    let mut synced_at: Vec<DateTime<Utc>> = Vec::with_capacity(n);

    for p in batch {
        awin_ids.push(&p.awin_product_id);
        slugs.push(&p.slug);
        titles.push(&p.original_title);
        seo_titles.push(&p.seo_title);
        descriptions.push(p.description.as_deref());
        seo_descriptions.push(&p.seo_description);
        image_urls.push(p.image_url.as_deref());
        original_prices.push(p.original_price);
        sale_prices.push(p.sale_price);
        discounts.push(p.discount_percentage);
        currencies.push(&p.currency);
        product_urls.push(p.product_url.as_deref());
        affiliate_links.push(p.affiliate_link.as_deref());
        brands.push(p.brand.as_deref());
        merchant_ids.push(p.merchant_id.as_deref());
        merchant_names.push(p.merchant_name.as_deref());
        merchant_categories.push(p.merchant_category.as_deref());
        category_ids.push(p.category_id);
        variant_values.push(p.variant_value.as_deref());
        availabilities.push(p.availability.as_str());
        featured.push(p.is_featured);
        active.push(p.is_active);
        synced_at.push(p.last_synced_at);
    }

    let rows: Vec<bool> = sqlx::query_scalar::<_, bool>(
        "INSERT INTO products \
             (awin_product_id, slug, original_title, seo_title, description, seo_description, \
              image_url, original_price, sale_price, discount_percentage, currency, \
              product_url, affiliate_link, brand, merchant_id, merchant_name, \
              merchant_category, category_id, variant_value, availability, is_featured, \
              is_active, last_synced_at) \
         SELECT * FROM UNNEST(\
              $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[], \
              $7::text[], $8::numeric[], $9::numeric[], $10::int4[], $11::text[], \
              $12::text[], $13::text[], $14::text[], $15::text[], $16::text[], \
              $17::text[], $18::uuid[], $19::text[], $20::text[], $21::bool[], \
              $22::bool[], $23::timestamptz[]) \
         ON CONFLICT (awin_product_id) DO UPDATE SET \
             original_title      = EXCLUDED.original_title, \
             seo_title           = EXCLUDED.seo_title, \
             description         = EXCLUDED.description, \
             seo_description     = EXCLUDED.seo_description, \
             image_url           = EXCLUDED.image_url, \
             original_price      = EXCLUDED.original_price, \
             sale_price          = EXCLUDED.sale_price, \
             discount_percentage = EXCLUDED.discount_percentage, \
             currency            = EXCLUDED.currency, \
             product_url         = EXCLUDED.product_url, \
             affiliate_link      = EXCLUDED.affiliate_link, \
             brand               = EXCLUDED.brand, \
             merchant_id         = EXCLUDED.merchant_id, \
             merchant_name       = EXCLUDED.merchant_name, \
             merchant_category   = EXCLUDED.merchant_category, \
             category_id         = EXCLUDED.category_id, \
             variant_value       = EXCLUDED.variant_value, \
             availability        = EXCLUDED.availability, \
             is_featured         = EXCLUDED.is_featured, \
             is_active           = EXCLUDED.is_active, \
             last_synced_at      = EXCLUDED.last_synced_at, \
             updated_at          = NOW() \
         RETURNING (xmax = 0) AS is_new",
    )
    .bind(&awin_ids)
    .bind(&slugs)
    .bind(&titles)
    .bind(&seo_titles)
    .bind(&descriptions)
    .bind(&seo_descriptions)
    .bind(&image_urls)
    .bind(&original_prices)
    .bind(&sale_prices)
    .bind(&discounts)
    .bind(&currencies)
    .bind(&product_urls)
    .bind(&affiliate_links)
    .bind(&brands)
    .bind(&merchant_ids)
    .bind(&merchant_names)
    .bind(&merchant_categories)
    .bind(&category_ids)
    .bind(&variant_values)
    .bind(&availabilities)
    .bind(&featured)
    .bind(&active)
    .bind(&synced_at)
    .fetch_all(pool)
    .await?;

    let added = rows.iter().filter(|&&is_new| is_new).count() as u64;
    let updated = rows.len() as u64 - added;

    Ok(UpsertCounts { added, updated })
}

/// Returns one page of active storefront products.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    filters: &ProductListFilters<'_>,
) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!(
        "{PRODUCT_SELECT} WHERE {LIST_PREDICATES} ORDER BY {} LIMIT $8 OFFSET $9",
        filters.sort.order_by()
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(search_pattern(filters.search))
        .bind(filters.category_slug)
        .bind(filters.merchant_ids)
        .bind(filters.min_price)
        .bind(filters.max_price)
        .bind(filters.min_discount)
        .bind(filters.include_variants)
        .bind(filters.limit)
        .bind(filters.offset)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Total rows matching `filters`, ignoring `sort`, `limit` and `offset`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_products(
    pool: &PgPool,
    filters: &ProductListFilters<'_>,
) -> Result<i64, DbError> {
    let sql = format!(
        "SELECT COUNT(*) FROM products p JOIN categories c ON c.id = p.category_id \
         WHERE {LIST_PREDICATES}"
    );
    let total = sqlx::query_scalar::<_, i64>(&sql)
        .bind(search_pattern(filters.search))
        .bind(filters.category_slug)
        .bind(filters.merchant_ids)
        .bind(filters.min_price)
        .bind(filters.max_price)
        .bind(filters.min_discount)
        .bind(filters.include_variants)
        .fetch_one(pool)
        .await?;

    Ok(total)
}

/// Returns a product by slug regardless of its active flag.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_slug(pool: &PgPool, slug: &str) -> Result<Option<ProductRow>, DbError> {
    let sql = format!("{PRODUCT_SELECT} WHERE p.slug = $1");
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(slug)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Returns a product by id regardless of its active flag.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ProductRow>, DbError> {
    let sql = format!("{PRODUCT_SELECT} WHERE p.id = $1");
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Returns the active size variants linked to `parent_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_product_variants(
    pool: &PgPool,
    parent_id: Uuid,
) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!(
        "{PRODUCT_SELECT} WHERE p.parent_product_id = $1 AND p.is_active \
         ORDER BY p.variant_value, p.id"
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(parent_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns active, non-variant products with the largest discount first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_top_deals(pool: &PgPool, limit: i64) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!(
        "{PRODUCT_SELECT} \
         WHERE p.is_active AND p.parent_product_id IS NULL \
           AND p.discount_percentage IS NOT NULL \
         ORDER BY p.discount_percentage DESC, p.sale_price ASC, p.id \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns active featured products, largest discount first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_featured_deals(pool: &PgPool, limit: i64) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!(
        "{PRODUCT_SELECT} \
         WHERE p.is_active AND p.is_featured AND p.parent_product_id IS NULL \
         ORDER BY p.discount_percentage DESC NULLS LAST, p.updated_at DESC, p.id \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns rows with a size value and no parent, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_unlinked_variants(pool: &PgPool) -> Result<Vec<UnlinkedVariantRow>, DbError> {
    let rows = sqlx::query_as::<_, UnlinkedVariantRow>(
        "SELECT id, original_title, brand, created_at \
         FROM products \
         WHERE variant_value IS NOT NULL AND parent_product_id IS NULL \
         ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Point `child_id` at `parent_id`.
///
/// Returns `false` when the child is already linked (or is the parent), so
/// repeated linking never rewrites an existing link.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_parent_product(
    pool: &PgPool,
    child_id: Uuid,
    parent_id: Uuid,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE products \
         SET parent_product_id = $2, updated_at = NOW() \
         WHERE id = $1 AND id <> $2 AND parent_product_id IS NULL",
    )
    .bind(child_id)
    .bind(parent_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark active products not seen since `synced_before` as inactive.
///
/// Returns the number of rows deactivated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn deactivate_missing_products(
    pool: &PgPool,
    synced_before: DateTime<Utc>,
) -> Result<u64, DbError> {
    let rows_affected = sqlx::query(
        "UPDATE products \
         SET is_active = FALSE, updated_at = NOW() \
         WHERE is_active AND last_synced_at < $1",
    )
    .bind(synced_before)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected)
}

/// Returns storefront counters.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn product_stats(pool: &PgPool) -> Result<ProductStatsRow, DbError> {
    let row = sqlx::query_as::<_, ProductStatsRow>(
        "SELECT \
             COUNT(*) FILTER (WHERE is_active AND parent_product_id IS NULL) AS active_products, \
             COUNT(*) FILTER (WHERE is_active AND is_featured AND parent_product_id IS NULL) \
                 AS featured_products, \
             COUNT(*) FILTER (WHERE is_active AND parent_product_id IS NOT NULL) \
                 AS linked_variants, \
             COUNT(DISTINCT merchant_id) FILTER (WHERE is_active) AS merchants \
         FROM products",
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_escapes_like_wildcards() {
        assert_eq!(search_pattern(Some("50%_off")).as_deref(), Some("%50\\%\\_off%"));
        assert_eq!(search_pattern(Some("  ")), None);
        assert_eq!(search_pattern(None), None);
    }

    #[test]
    fn sort_parses_query_values() {
        assert_eq!("price_low".parse::<ProductSort>(), Ok(ProductSort::PriceLow));
        assert_eq!("discount".parse::<ProductSort>(), Ok(ProductSort::Discount));
        assert!("random".parse::<ProductSort>().is_err());
    }

    #[test]
    fn every_sort_breaks_ties_by_id() {
        for sort in [
            ProductSort::Newest,
            ProductSort::PriceLow,
            ProductSort::PriceHigh,
            ProductSort::Discount,
        ] {
            assert!(sort.order_by().ends_with("p.id"));
        }
    }
}
