//! Normalization from raw feed rows to [`kdeal_core::NormalizedProduct`].
//!
//! Category matching lives in [`crate::classify`] and size parsing in
//! [`crate::variant`]; this module derives the remaining catalog fields.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use kdeal_core::{columns, Availability, CategorySlug, NormalizedProduct, RawFeedRow};
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::classify::classify_category;
use crate::error::FeedError;
use crate::variant::split_variant;

const SLUG_MAX_CHARS: usize = 80;
const SLUG_ID_PREFIX_CHARS: usize = 8;
const SEO_TITLE_MAX_CHARS: usize = 150;
const SEO_DESCRIPTION_MAX_CHARS: usize = 160;
const DESCRIPTION_MAX_CHARS: usize = 5000;
const DEFAULT_CURRENCY: &str = "EUR";

static LEFTOVER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\w+\]").expect("valid regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static LEADING_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-\s*").expect("valid regex"));
static TRAILING_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*$").expect("valid regex"));

/// Category slug to category row id, as loaded from the store.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex(HashMap<CategorySlug, Uuid>);

impl CategoryIndex {
    /// Resolve `slug`, falling back to the `overig` row when `slug` has none.
    #[must_use]
    pub fn resolve(&self, slug: CategorySlug) -> Option<(CategorySlug, Uuid)> {
        self.0
            .get(&slug)
            .map(|id| (slug, *id))
            .or_else(|| {
                self.0
                    .get(&CategorySlug::FALLBACK)
                    .map(|id| (CategorySlug::FALLBACK, *id))
            })
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

impl FromIterator<(CategorySlug, Uuid)> for CategoryIndex {
    fn from_iter<I: IntoIterator<Item = (CategorySlug, Uuid)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Inputs shared by every row of one sync run.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub categories: &'a CategoryIndex,
    pub seo_title_template: &'a str,
    pub synced_at: DateTime<Utc>,
}

/// Normalizes a raw feed row into a [`NormalizedProduct`].
///
/// # Errors
///
/// Returns [`FeedError::Normalization`] if the row has no id or title, or if
/// the category index holds neither the matched slug nor the fallback.
pub fn normalize_row(
    row: &RawFeedRow,
    ctx: &NormalizeContext<'_>,
) -> Result<NormalizedProduct, FeedError> {
    let awin_product_id = row
        .get(columns::AW_PRODUCT_ID)
        .map(str::trim)
        .ok_or_else(|| FeedError::Normalization {
            awin_product_id: String::new(),
            reason: "missing aw_product_id".into(),
        })?
        .to_owned();
    let title = row
        .get(columns::PRODUCT_NAME)
        .map(str::trim)
        .ok_or_else(|| FeedError::Normalization {
            awin_product_id: awin_product_id.clone(),
            reason: "missing product_name".into(),
        })?;

    let merchant_name = row.get(columns::MERCHANT_NAME).map(str::to_owned);
    let brand = row.get(columns::BRAND_NAME).map(str::to_owned);
    let merchant_category = row.get(columns::MERCHANT_CATEGORY);

    let sale_price = parse_price(row.get(columns::SEARCH_PRICE)).unwrap_or(Decimal::ZERO);
    let original_price = parse_price(row.get(columns::RRP_PRICE))
        .or_else(|| parse_price(row.get(columns::STORE_PRICE)))
        .filter(|p| *p > Decimal::ZERO);
    let discount = calculate_discount(original_price, sale_price);

    let slug_hint = classify_category(merchant_category, row.get(columns::CATEGORY_NAME));
    let (category_slug, category_id) =
        ctx.categories
            .resolve(slug_hint)
            .ok_or_else(|| FeedError::Normalization {
                awin_product_id: awin_product_id.clone(),
                reason: format!("no category row for '{slug_hint}' or the fallback"),
            })?;

    let description = row
        .get(columns::DESCRIPTION)
        .map(|d| truncate_chars(d.trim(), DESCRIPTION_MAX_CHARS).to_owned());
    let title_brand = brand.as_deref().or(merchant_name.as_deref()).unwrap_or("");
    let seo_title = generate_seo_title(
        ctx.seo_title_template,
        title_brand,
        title,
        discount,
        merchant_name.as_deref().unwrap_or(""),
    );
    let seo_description = generate_seo_description(title, description.as_deref(), discount);
    let (_, variant_value) = split_variant(title);

    Ok(NormalizedProduct {
        slug: generate_slug(title, &awin_product_id),
        original_title: title.to_owned(),
        seo_title,
        description,
        seo_description,
        image_url: row
            .get(columns::AW_IMAGE_URL)
            .or_else(|| row.get(columns::MERCHANT_IMAGE_URL))
            .map(str::to_owned),
        original_price,
        sale_price,
        discount_percentage: (discount > 0).then_some(discount),
        currency: row
            .get(columns::CURRENCY)
            .unwrap_or(DEFAULT_CURRENCY)
            .to_owned(),
        product_url: row.get(columns::MERCHANT_DEEP_LINK).map(str::to_owned),
        affiliate_link: row.get(columns::AW_DEEP_LINK).map(str::to_owned),
        brand,
        merchant_id: row.get(columns::MERCHANT_ID).map(str::to_owned),
        merchant_name,
        merchant_category: merchant_category.map(str::to_owned),
        category_slug,
        category_id,
        variant_value: variant_value.map(str::to_owned),
        availability: Availability::from_feed_flag(row.get(columns::IN_STOCK)),
        is_featured: discount >= NormalizedProduct::FEATURED_DISCOUNT,
        is_active: true,
        last_synced_at: ctx.synced_at,
        awin_product_id,
    })
}

/// Build the URL slug: the title reduced to `[a-z0-9-]`, at most 80
/// characters, suffixed with the first 8 characters of the external id.
///
/// Ids longer than the prefix are appended again in full, so two products
/// share a slug only if they share an id.
#[must_use]
pub fn generate_slug(title: &str, awin_product_id: &str) -> String {
    let title_part = slugify(title);
    let title_part = truncate_chars(&title_part, SLUG_MAX_CHARS).trim_end_matches('-');
    let id = slugify(awin_product_id);
    let id_prefix = truncate_chars(&id, SLUG_ID_PREFIX_CHARS);

    let mut slug = String::with_capacity(title_part.len() + id.len() * 2 + 2);
    if !title_part.is_empty() {
        slug.push_str(title_part);
        slug.push('-');
    }
    slug.push_str(id_prefix);
    if id.len() > id_prefix.len() {
        slug.push('-');
        slug.push_str(&id);
    }
    slug
}

/// Lower-case, keep `[a-z0-9]`, and turn whitespace and hyphen runs into a
/// single `-`. Leading separators are dropped.
fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else if c == '-' || c.is_whitespace() {
            pending_dash = true;
        }
    }
    out
}

/// Whole-percent saving of `sale` against `original`.
///
/// Zero whenever there is no positive reference price strictly above the
/// sale price. Otherwise the ratio rounded half away from zero, so a saving
/// under half a percent reads as 0.
#[must_use]
pub fn calculate_discount(original: Option<Decimal>, sale: Decimal) -> i32 {
    let Some(original) = original else {
        return 0;
    };
    if original <= Decimal::ZERO || original <= sale {
        return 0;
    }
    if sale <= Decimal::ZERO {
        return 100;
    }
    let percent = ((original - sale) / original * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    percent.to_i32().unwrap_or(0)
}

/// Fill the SEO title template.
///
/// Recognised tokens are `[brand]`, `[title]`, `[discount]` and `[merchant]`.
/// Unknown tokens are removed, whitespace is collapsed, and a dangling
/// leading or trailing ` - ` is stripped before truncating to 150 characters.
#[must_use]
pub fn generate_seo_title(
    template: &str,
    brand: &str,
    title: &str,
    discount: i32,
    merchant: &str,
) -> String {
    let filled = template
        .replace("[brand]", brand)
        .replace("[title]", title)
        .replace("[discount]", &discount.to_string())
        .replace("[merchant]", merchant);
    let cleaned = LEFTOVER_TOKEN.replace_all(&filled, "");
    let cleaned = WHITESPACE_RUN.replace_all(&cleaned, " ");
    let cleaned = LEADING_DASH.replace(&cleaned, "");
    let cleaned = TRAILING_DASH.replace(&cleaned, "");
    truncate_chars(cleaned.trim(), SEO_TITLE_MAX_CHARS).to_owned()
}

/// Meta description: the feed description (or the title when there is
/// none), prefixed with the saving when there is one.
#[must_use]
pub fn generate_seo_description(title: &str, description: Option<&str>, discount: i32) -> String {
    let body = description.filter(|d| !d.is_empty()).unwrap_or(title);
    let text = if discount > 0 {
        format!("Bespaar {discount}% op {title}. {body}")
    } else {
        body.to_owned()
    };
    truncate_chars(&text, SEO_DESCRIPTION_MAX_CHARS).to_owned()
}

/// The longest prefix of `s` with at most `max` characters.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> &str {
    s.char_indices().nth(max).map_or(s, |(idx, _)| &s[..idx])
}

fn parse_price(raw: Option<&str>) -> Option<Decimal> {
    Decimal::from_str(raw?.trim())
        .ok()
        .filter(|p| *p >= Decimal::ZERO)
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
