//! Live integration tests for kdeal-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/kdeal-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{Duration, Utc};
use kdeal_core::{
    Availability, CategoryConfig, CategorySlug, NormalizedProduct, SyncKind,
};
use kdeal_db::{
    cancel_sync_run, complete_sync_run, count_products, create_sync_run,
    deactivate_missing_products, fail_sync_run, get_active_sync_run, get_product_by_slug,
    get_sync_run, get_sync_settings, is_cancel_requested, list_categories_with_counts,
    list_product_variants, list_products, list_sync_runs, list_top_deals, list_unlinked_variants,
    load_category_ids, product_stats, record_last_sync, request_sync_run_cancel, seed_categories,
    set_parent_product, update_sync_run_progress, update_sync_settings, upsert_products, DbError,
    ProductListFilters, ProductSort, SyncRunProgress,
};
use rust_decimal::Decimal;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn category_configs() -> Vec<CategoryConfig> {
    CategorySlug::ALL
        .into_iter()
        .map(|slug| CategoryConfig {
            name: format!("Categorie {slug}"),
            slug,
            description: None,
            icon: None,
        })
        .collect()
}

/// Seed the taxonomy and return the id for `slug`.
async fn seed(pool: &sqlx::PgPool, slug: CategorySlug) -> Uuid {
    seed_categories(pool, &category_configs())
        .await
        .expect("seed_categories failed");
    load_category_ids(pool)
        .await
        .expect("load_category_ids failed")
        .into_iter()
        .find_map(|(s, id)| (s == slug).then_some(id))
        .unwrap_or_else(|| panic!("category '{slug}' missing after seed"))
}

fn product(awin_id: &str, title: &str, category_id: Uuid) -> NormalizedProduct {
    NormalizedProduct {
        awin_product_id: awin_id.to_string(),
        slug: format!("{}-{awin_id}", title.to_lowercase().replace(' ', "-")),
        original_title: title.to_string(),
        seo_title: title.to_string(),
        description: Some("Omschrijving".to_string()),
        seo_description: title.to_string(),
        image_url: None,
        original_price: Some(Decimal::new(10000, 2)),
        sale_price: Decimal::new(5000, 2),
        discount_percentage: Some(50),
        currency: "EUR".to_string(),
        product_url: None,
        affiliate_link: Some(format!("https://www.awin1.com/pclick.php?p={awin_id}")),
        brand: Some("Merk".to_string()),
        merchant_id: Some("1".to_string()),
        merchant_name: Some("Winkel".to_string()),
        merchant_category: None,
        category_slug: CategorySlug::HuisTuin,
        category_id,
        variant_value: None,
        availability: Availability::InStock,
        is_featured: true,
        is_active: true,
        last_synced_at: Utc::now(),
    }
}

fn page(limit: i64) -> ProductListFilters<'static> {
    ProductListFilters {
        limit,
        ..ProductListFilters::default()
    }
}

// ---------------------------------------------------------------------------
// Section 1: Categories
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn seed_categories_is_idempotent(pool: sqlx::PgPool) {
    let first = seed_categories(&pool, &category_configs()).await.unwrap();
    let second = seed_categories(&pool, &category_configs()).await.unwrap();
    assert_eq!(first, 10);
    assert_eq!(second, 10);

    let ids = load_category_ids(&pool).await.unwrap();
    assert_eq!(ids.len(), 10);

    let listed = list_categories_with_counts(&pool).await.unwrap();
    assert_eq!(listed.first().map(|c| c.slug.as_str()), Some("elektronica"));
    assert_eq!(listed.last().map(|c| c.slug.as_str()), Some("overig"));
    assert!(listed.iter().all(|c| c.product_count == 0));
}

// ---------------------------------------------------------------------------
// Section 2: Product upserts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_counts_inserts_then_updates_in_place(pool: sqlx::PgPool) {
    let cat = seed(&pool, CategorySlug::HuisTuin).await;
    let batch = vec![product("P1", "Airfryer", cat), product("P2", "Lamp", cat)];

    let first = upsert_products(&pool, &batch).await.unwrap();
    assert_eq!((first.added, first.updated), (2, 0));
    let before = get_product_by_slug(&pool, "airfryer-P1").await.unwrap().unwrap();

    let mut changed = batch.clone();
    changed[0].sale_price = Decimal::new(4000, 2);
    changed[0].slug = "different-slug".to_string();
    let second = upsert_products(&pool, &changed).await.unwrap();
    assert_eq!((second.added, second.updated), (0, 2));

    let after = get_product_by_slug(&pool, "airfryer-P1")
        .await
        .unwrap()
        .expect("slug is an identity column and must not change");
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.sale_price, Decimal::new(4000, 2));
    assert_eq!(after.category_slug, "huis-tuin");
}

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_keeps_last_occurrence_of_repeated_id(pool: sqlx::PgPool) {
    let cat = seed(&pool, CategorySlug::HuisTuin).await;
    let mut newer = product("P1", "Airfryer", cat);
    newer.sale_price = Decimal::new(1234, 2);
    let batch = vec![product("P1", "Airfryer", cat), newer];

    let counts = upsert_products(&pool, &batch).await.unwrap();
    assert_eq!((counts.added, counts.updated), (1, 0));

    let row = get_product_by_slug(&pool, "airfryer-P1").await.unwrap().unwrap();
    assert_eq!(row.sale_price, Decimal::new(1234, 2));
}

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_of_empty_batch_is_a_no_op(pool: sqlx::PgPool) {
    let counts = upsert_products(&pool, &[]).await.unwrap();
    assert_eq!((counts.added, counts.updated), (0, 0));
}

// ---------------------------------------------------------------------------
// Section 3: Catalog reads
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn listing_filters_and_hides_size_rows(pool: sqlx::PgPool) {
    let cat = seed(&pool, CategorySlug::HuisTuin).await;
    let mut cheap = product("P1", "Lamp", cat);
    cheap.sale_price = Decimal::new(999, 2);
    cheap.discount_percentage = Some(10);
    let pricey = product("P2", "Airfryer", cat);
    let mut sized = product("P3", "Jurk Maat M", cat);
    sized.variant_value = Some("M".to_string());
    upsert_products(&pool, &[cheap, pricey, sized]).await.unwrap();

    let all = list_products(&pool, &page(10)).await.unwrap();
    assert_eq!(all.len(), 2, "size rows are hidden from the storefront");
    assert_eq!(count_products(&pool, &page(10)).await.unwrap(), 2);

    let by_price = list_products(
        &pool,
        &ProductListFilters {
            sort: ProductSort::PriceLow,
            ..page(10)
        },
    )
    .await
    .unwrap();
    assert_eq!(by_price[0].awin_product_id, "P1");

    let discounted = list_products(
        &pool,
        &ProductListFilters {
            min_discount: Some(40),
            ..page(10)
        },
    )
    .await
    .unwrap();
    assert_eq!(discounted.len(), 1);
    assert_eq!(discounted[0].awin_product_id, "P2");

    let searched = list_products(
        &pool,
        &ProductListFilters {
            search: Some("airfr"),
            ..page(10)
        },
    )
    .await
    .unwrap();
    assert_eq!(searched.len(), 1);

    let other_category = list_products(
        &pool,
        &ProductListFilters {
            category_slug: Some("mode"),
            ..page(10)
        },
    )
    .await
    .unwrap();
    assert!(other_category.is_empty());

    let with_variants = list_products(
        &pool,
        &ProductListFilters {
            include_variants: true,
            ..page(10)
        },
    )
    .await
    .unwrap();
    assert_eq!(with_variants.len(), 3);

    let top = list_top_deals(&pool, 1).await.unwrap();
    assert_eq!(top[0].discount_percentage, Some(50));
}

// ---------------------------------------------------------------------------
// Section 4: Variant linkage and reconciliation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn parent_link_is_set_once(pool: sqlx::PgPool) {
    let cat = seed(&pool, CategorySlug::Mode).await;
    let mut small = product("P1", "Hoodie Maat S", cat);
    small.variant_value = Some("S".to_string());
    let mut large = product("P2", "Hoodie Maat L", cat);
    large.variant_value = Some("L".to_string());
    upsert_products(&pool, &[small]).await.unwrap();
    upsert_products(&pool, &[large]).await.unwrap();

    let unlinked = list_unlinked_variants(&pool).await.unwrap();
    assert_eq!(unlinked.len(), 2);
    let (parent, child) = (unlinked[0].id, unlinked[1].id);

    assert!(set_parent_product(&pool, child, parent).await.unwrap());
    assert!(!set_parent_product(&pool, child, parent).await.unwrap());
    assert!(!set_parent_product(&pool, parent, parent).await.unwrap());

    let variants = list_product_variants(&pool, parent).await.unwrap();
    assert_eq!(variants.len(), 1);
    assert_eq!(variants[0].id, child);

    let remaining = list_unlinked_variants(&pool).await.unwrap();
    assert_eq!(remaining.len(), 1, "only the parent is left unlinked");

    let stats = product_stats(&pool).await.unwrap();
    assert_eq!(stats.linked_variants, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_products_are_deactivated(pool: sqlx::PgPool) {
    let cat = seed(&pool, CategorySlug::HuisTuin).await;
    let mut stale = product("OLD", "Oude Lamp", cat);
    stale.last_synced_at = Utc::now() - Duration::days(2);
    let fresh = product("NEW", "Nieuwe Lamp", cat);
    upsert_products(&pool, &[stale, fresh]).await.unwrap();

    let removed = deactivate_missing_products(&pool, Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let stale_row = get_product_by_slug(&pool, "oude-lamp-OLD").await.unwrap().unwrap();
    assert!(!stale_row.is_active);
    assert_eq!(list_products(&pool, &page(10)).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Section 5: Sync run lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_lifecycle_started_to_completed(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, SyncKind::Manual, "full").await.unwrap();
    assert_eq!(run.status, "started");
    assert!(get_active_sync_run(&pool).await.unwrap().is_some());

    let progress = SyncRunProgress {
        stage: "upserting batch 1 of 2".to_string(),
        total_products: 200,
        processed_products: 100,
        current_batch: 1,
        total_batches: 2,
        products_added: 100,
        estimated_remaining: Some("~5 sec".to_string()),
        ..SyncRunProgress::default()
    };
    update_sync_run_progress(&pool, run.id, &progress).await.unwrap();

    // A stale snapshot must not move counters backwards.
    let stale = SyncRunProgress {
        processed_products: 50,
        ..progress.clone()
    };
    update_sync_run_progress(&pool, run.id, &stale).await.unwrap();

    complete_sync_run(&pool, run.id, 3).await.unwrap();

    let done = get_sync_run(&pool, run.id).await.unwrap().unwrap();
    assert_eq!(done.status, "completed");
    assert_eq!(done.processed_products, 100);
    assert_eq!(done.products_removed, 3);
    assert!(done.completed_at.is_some());
    assert!(done.estimated_remaining.is_none());

    let again = complete_sync_run(&pool, run.id, 0).await;
    assert!(matches!(
        again,
        Err(DbError::InvalidSyncRunTransition { expected_status: "started", .. })
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn only_one_run_may_be_started(pool: sqlx::PgPool) {
    let first = create_sync_run(&pool, SyncKind::Manual, "full").await.unwrap();
    let second = create_sync_run(&pool, SyncKind::Scheduled, "full").await;
    assert!(matches!(second, Err(DbError::SyncRunInProgress)));

    fail_sync_run(&pool, first.id, "feed returned 401").await.unwrap();
    let failed = get_sync_run(&pool, first.id).await.unwrap().unwrap();
    assert_eq!(failed.error_message.as_deref(), Some("feed returned 401"));

    create_sync_run(&pool, SyncKind::Scheduled, "full")
        .await
        .expect("a run can start once the previous one is finalized");
    assert_eq!(list_sync_runs(&pool, 10).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancel_flag_then_cancel(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, SyncKind::Manual, "full").await.unwrap();
    assert!(!is_cancel_requested(&pool, run.id).await.unwrap());

    request_sync_run_cancel(&pool, run.id).await.unwrap();
    assert!(is_cancel_requested(&pool, run.id).await.unwrap());

    cancel_sync_run(&pool, run.id).await.unwrap();
    let cancelled = get_sync_run(&pool, run.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, "cancelled");

    assert!(request_sync_run_cancel(&pool, run.id).await.is_err());
    assert!(is_cancel_requested(&pool, Uuid::new_v4()).await.unwrap());
}

// ---------------------------------------------------------------------------
// Section 6: Settings
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn settings_row_is_seeded_and_editable(pool: sqlx::PgPool) {
    let initial = get_sync_settings(&pool).await.unwrap();
    assert!(initial.feed_url.is_none());
    assert!(initial.sync_enabled);

    let updated = update_sync_settings(
        &pool,
        Some("https://productdata.awin.com/datafeed/download/apikey/k"),
        None,
        false,
    )
    .await
    .unwrap();
    assert!(!updated.sync_enabled);

    let at = Utc::now();
    record_last_sync(&pool, at).await.unwrap();
    let row = get_sync_settings(&pool).await.unwrap();
    assert!(row.last_sync_at.is_some());
    assert!(row.feed_url.is_some());
}
