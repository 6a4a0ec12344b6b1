//! Database operations for the `categories` taxonomy table.

use chrono::{DateTime, Utc};
use kdeal_core::{CategoryConfig, CategorySlug};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category with the number of active storefront products in it.
///
/// Variants linked to a parent are not counted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryWithCountRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub product_count: i64,
}

/// Upsert the taxonomy from config, keyed by slug.
///
/// File order becomes `sort_order`. All upserts run inside a single
/// transaction; if any fails the whole seed is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_categories(pool: &PgPool, categories: &[CategoryConfig]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for (position, category) in categories.iter().enumerate() {
        let sort_order = i32::try_from(position).unwrap_or(i32::MAX);
        sqlx::query(
            "INSERT INTO categories (name, slug, description, icon, sort_order) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 icon = EXCLUDED.icon, \
                 sort_order = EXCLUDED.sort_order, \
                 updated_at = NOW()",
        )
        .bind(&category.name)
        .bind(category.slug.as_str())
        .bind(&category.description)
        .bind(&category.icon)
        .bind(sort_order)
        .execute(&mut *tx)
        .await?;
        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}

/// Returns all categories in display order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, slug, description, icon, sort_order, created_at, updated_at \
         FROM categories \
         ORDER BY sort_order, slug",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns all categories in display order with active product counts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories_with_counts(
    pool: &PgPool,
) -> Result<Vec<CategoryWithCountRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryWithCountRow>(
        "SELECT c.id, c.name, c.slug, c.description, c.icon, \
                COUNT(p.id) AS product_count \
         FROM categories c \
         LEFT JOIN products p \
                ON p.category_id = c.id \
               AND p.is_active \
               AND p.parent_product_id IS NULL \
         GROUP BY c.id \
         ORDER BY c.sort_order, c.slug",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a single category by slug, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category_by_slug(pool: &PgPool, slug: &str) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, slug, description, icon, sort_order, created_at, updated_at \
         FROM categories \
         WHERE slug = $1",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the `(slug, id)` pairs the normalizer resolves categories against.
///
/// Rows whose slug is not part of the fixed taxonomy are ignored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_category_ids(pool: &PgPool) -> Result<Vec<(CategorySlug, Uuid)>, DbError> {
    let rows = sqlx::query_as::<_, (String, Uuid)>("SELECT slug, id FROM categories")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(slug, id)| slug.parse::<CategorySlug>().ok().map(|s| (s, id)))
        .collect())
}
