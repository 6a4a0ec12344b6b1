//! Offline unit tests for kdeal-db pool configuration and row types.
//! These tests do not require a live database connection.

use kdeal_core::{AppConfig, DiversityKeys, Environment, SelectionPolicyKind};
use kdeal_db::{PoolConfig, ProductRow, SyncRunProgress, SyncRunRow};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        categories_path: PathBuf::from("./config/categories.yaml"),
        api_keys: vec!["key".to_string()],
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        feed_url: None,
        feed_request_timeout_secs: 120,
        feed_user_agent: "ua".to_string(),
        feed_max_retries: 2,
        feed_retry_backoff_base_secs: 5,
        seo_title_template: None,
        sync_policy: SelectionPolicyKind::FullPass,
        sync_sample_size: 5000,
        sync_batch_size: 100,
        sync_chunk_size: 5000,
        sync_max_parse_rows: None,
        sync_progress_every: 1,
        sync_deactivate_missing: true,
        sync_cron: None,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: confirm that [`SyncRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn sync_run_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = SyncRunRow {
        id: Uuid::new_v4(),
        kind: "manual".to_string(),
        policy: "full".to_string(),
        status: "started".to_string(),
        stage: "idle".to_string(),
        total_products: 0,
        processed_products: 0,
        current_batch: 0,
        total_batches: 0,
        products_added: 0,
        products_updated: 0,
        products_removed: 0,
        failed_batches: 0,
        estimated_remaining: None,
        next_chunk_index: Some(0),
        cancel_requested: false,
        error_message: None,
        started_at: Utc::now(),
        completed_at: None,
    };

    assert_eq!(row.status, "started");
    assert!(row.completed_at.is_none());
    assert_eq!(row.next_chunk_index, Some(0));
}

#[test]
fn default_progress_is_all_zero() {
    let progress = SyncRunProgress::default();
    assert_eq!(progress.processed_products, 0);
    assert!(progress.estimated_remaining.is_none());
}

/// [`ProductRow`] feeds the shuffler: category comes from the joined slug
/// and the advertiser key falls back from brand to merchant.
#[test]
fn product_row_diversity_keys_fall_back_to_merchant() {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    let mut row = ProductRow {
        id: Uuid::new_v4(),
        awin_product_id: "P1".to_string(),
        slug: "lamp-p1".to_string(),
        original_title: "Lamp".to_string(),
        seo_title: "Lamp".to_string(),
        description: None,
        seo_description: "Lamp".to_string(),
        image_url: None,
        original_price: None,
        sale_price: Decimal::new(1999, 2),
        discount_percentage: None,
        currency: "EUR".to_string(),
        product_url: None,
        affiliate_link: None,
        brand: None,
        merchant_id: Some("7788".to_string()),
        merchant_name: Some("Coolblue".to_string()),
        merchant_category: None,
        category_id: Uuid::new_v4(),
        category_slug: "huis-tuin".to_string(),
        parent_product_id: None,
        variant_value: None,
        availability: "in_stock".to_string(),
        is_featured: false,
        is_active: true,
        last_synced_at: Utc::now(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    assert_eq!(row.category_key(), Some("huis-tuin"));
    assert_eq!(row.brand_key(), Some("Coolblue"));

    row.brand = Some("Philips".to_string());
    assert_eq!(row.brand_key(), Some("Philips"));
}
