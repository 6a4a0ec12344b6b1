use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CategorySlug;

/// Awin datafeed column names read by the normalizer.
pub mod columns {
    pub const AW_PRODUCT_ID: &str = "aw_product_id";
    pub const PRODUCT_NAME: &str = "product_name";
    pub const DESCRIPTION: &str = "description";
    pub const MERCHANT_ID: &str = "merchant_id";
    pub const MERCHANT_NAME: &str = "merchant_name";
    pub const AW_DEEP_LINK: &str = "aw_deep_link";
    pub const MERCHANT_DEEP_LINK: &str = "merchant_deep_link";
    pub const AW_IMAGE_URL: &str = "aw_image_url";
    pub const MERCHANT_IMAGE_URL: &str = "merchant_image_url";
    /// Live price.
    pub const SEARCH_PRICE: &str = "search_price";
    /// Reference ("van") price.
    pub const RRP_PRICE: &str = "rrp_price";
    /// Older feeds carry the reference price here instead of `rrp_price`.
    pub const STORE_PRICE: &str = "store_price";
    pub const CURRENCY: &str = "currency";
    pub const MERCHANT_CATEGORY: &str = "merchant_category";
    pub const CATEGORY_NAME: &str = "category_name";
    pub const BRAND_NAME: &str = "brand_name";
    pub const IN_STOCK: &str = "in_stock";
}

/// One CSV data line keyed by header name. Values are untyped strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawFeedRow(HashMap<String, String>);

impl RawFeedRow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    /// Returns the value for `column`, treating blank cells as absent.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// A row is usable only when it carries both the external id and a title.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        self.get(columns::AW_PRODUCT_ID).is_some() && self.get(columns::PRODUCT_NAME).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, String>> for RawFeedRow {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawFeedRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    OutOfStock,
}

impl Availability {
    /// Awin marks stocked items with `in_stock = "1"`; everything else is out.
    #[must_use]
    pub fn from_feed_flag(flag: Option<&str>) -> Self {
        match flag.map(str::trim) {
            Some("1") => Availability::InStock,
            _ => Availability::OutOfStock,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Availability::InStock => "in_stock",
            Availability::OutOfStock => "out_of_stock",
        }
    }
}

/// A feed row mapped onto the catalog schema, ready to be upserted by
/// `awin_product_id`.
///
/// Parent linkage is not part of this record: it is assigned after all rows
/// of a run are persisted, by reading them back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedProduct {
    pub awin_product_id: String,
    pub slug: String,
    pub original_title: String,
    /// At most 150 characters.
    pub seo_title: String,
    /// At most 5000 characters.
    pub description: Option<String>,
    /// At most 160 characters.
    pub seo_description: String,
    pub image_url: Option<String>,
    /// `None` unless the feed carried a positive reference price.
    pub original_price: Option<Decimal>,
    pub sale_price: Decimal,
    /// `None` when there is no saving.
    pub discount_percentage: Option<i32>,
    pub currency: String,
    pub product_url: Option<String>,
    pub affiliate_link: Option<String>,
    pub brand: Option<String>,
    pub merchant_id: Option<String>,
    pub merchant_name: Option<String>,
    pub merchant_category: Option<String>,
    pub category_slug: CategorySlug,
    pub category_id: Uuid,
    /// Size code lifted from a trailing "Maat ..." title suffix.
    pub variant_value: Option<String>,
    pub availability: Availability,
    pub is_featured: bool,
    pub is_active: bool,
    pub last_synced_at: DateTime<Utc>,
}

impl NormalizedProduct {
    /// Discount threshold at which a product is promoted to the featured rail.
    pub const FEATURED_DISCOUNT: i32 = 50;

    /// Discount as a plain number, with "no saving" reported as zero.
    #[must_use]
    pub fn discount_or_zero(&self) -> i32 {
        self.discount_percentage.unwrap_or(0)
    }
}
