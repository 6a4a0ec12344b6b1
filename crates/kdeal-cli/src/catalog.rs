//! Read-only catalog inspection.

use clap::Subcommand;
use kdeal_core::{AppConfig, DiversityKeys};
use kdeal_db::ProductListFilters;

use crate::connect;

/// Sub-commands available under `catalog`.
#[derive(Debug, Subcommand)]
pub enum CatalogCommands {
    /// Show how the storefront shuffle reorders one page of products
    ShufflePreview {
        /// Restrict to one category slug
        #[arg(long)]
        category: Option<String>,
        /// Rows shown on the page
        #[arg(long, default_value = "24")]
        limit: i64,
        /// Page number, 1-based
        #[arg(long, default_value = "1")]
        page: i64,
    },
}

/// Adjacent pairs sharing a category and sharing an advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AdjacentRepeats {
    category: usize,
    brand: usize,
}

fn adjacent_repeats<T: DiversityKeys>(items: &[T]) -> AdjacentRepeats {
    let mut repeats = AdjacentRepeats {
        category: 0,
        brand: 0,
    };
    for pair in items.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.category_key().is_some() && a.category_key() == b.category_key() {
            repeats.category += 1;
        }
        if a.brand_key().is_some() && a.brand_key() == b.brand_key() {
            repeats.brand += 1;
        }
    }
    repeats
}

pub(crate) async fn run_catalog(config: &AppConfig, command: CatalogCommands) -> anyhow::Result<()> {
    match command {
        CatalogCommands::ShufflePreview {
            category,
            limit,
            page,
        } => run_shuffle_preview(config, category.as_deref(), limit, page).await,
    }
}

async fn run_shuffle_preview(
    config: &AppConfig,
    category: Option<&str>,
    limit: i64,
    page: i64,
) -> anyhow::Result<()> {
    let limit = limit.clamp(1, 100);
    let pool = connect(config).await?;
    let filters = ProductListFilters {
        category_slug: category,
        limit,
        offset: (page.max(1) - 1).saturating_mul(limit),
        ..ProductListFilters::default()
    };
    let before = kdeal_db::list_products(&pool, &filters).await?;
    if before.is_empty() {
        println!("no active products match");
        return Ok(());
    }

    let after = kdeal_core::diversity_shuffle(before.clone());

    let repeats_before = adjacent_repeats(&before);
    let repeats_after = adjacent_repeats(&after);
    println!(
        "adjacent repeats on a page of {}: category {} -> {}, advertiser {} -> {}",
        after.len(),
        repeats_before.category,
        repeats_after.category,
        repeats_before.brand,
        repeats_after.brand
    );
    for row in &after {
        println!(
            "  {:<18} {:<24} {:>4}%  {}",
            row.category_slug,
            row.brand_key().unwrap_or("-"),
            row.discount_percentage.unwrap_or(0),
            row.seo_title
        );
    }
    Ok(())
}
