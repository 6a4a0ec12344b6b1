use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// The fixed storefront taxonomy.
///
/// Declaration order is the classification priority: when category text
/// matches more than one keyword group, the earliest slug wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategorySlug {
    #[serde(rename = "elektronica")]
    Elektronica,
    #[serde(rename = "mode")]
    Mode,
    #[serde(rename = "huis-tuin")]
    HuisTuin,
    #[serde(rename = "sport-vrije-tijd")]
    SportVrijeTijd,
    #[serde(rename = "beauty-gezondheid")]
    BeautyGezondheid,
    #[serde(rename = "speelgoed-games")]
    SpeelgoedGames,
    #[serde(rename = "eten-drinken")]
    EtenDrinken,
    #[serde(rename = "auto-motor")]
    AutoMotor,
    #[serde(rename = "reizen")]
    Reizen,
    #[serde(rename = "overig")]
    Overig,
}

impl CategorySlug {
    /// Every slug in classification priority order, `Overig` last.
    pub const ALL: [CategorySlug; 10] = [
        CategorySlug::Elektronica,
        CategorySlug::Mode,
        CategorySlug::HuisTuin,
        CategorySlug::SportVrijeTijd,
        CategorySlug::BeautyGezondheid,
        CategorySlug::SpeelgoedGames,
        CategorySlug::EtenDrinken,
        CategorySlug::AutoMotor,
        CategorySlug::Reizen,
        CategorySlug::Overig,
    ];

    /// The slug for products no keyword group claims.
    pub const FALLBACK: CategorySlug = CategorySlug::Overig;

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CategorySlug::Elektronica => "elektronica",
            CategorySlug::Mode => "mode",
            CategorySlug::HuisTuin => "huis-tuin",
            CategorySlug::SportVrijeTijd => "sport-vrije-tijd",
            CategorySlug::BeautyGezondheid => "beauty-gezondheid",
            CategorySlug::SpeelgoedGames => "speelgoed-games",
            CategorySlug::EtenDrinken => "eten-drinken",
            CategorySlug::AutoMotor => "auto-motor",
            CategorySlug::Reizen => "reizen",
            CategorySlug::Overig => "overig",
        }
    }
}

impl std::fmt::Display for CategorySlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CategorySlug {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategorySlug::ALL
            .into_iter()
            .find(|slug| slug.as_str() == s)
            .ok_or_else(|| format!("unknown category slug '{s}'"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub slug: CategorySlug,
    pub description: Option<String>,
    /// Icon identifier used by the storefront navigation.
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoriesFile {
    pub categories: Vec<CategoryConfig>,
}

/// Load and validate the category seed file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_categories(path: &Path) -> Result<CategoriesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CategoriesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let categories_file: CategoriesFile = serde_yaml::from_str(&content)?;

    validate_categories(&categories_file)?;

    Ok(categories_file)
}

fn validate_categories(categories_file: &CategoriesFile) -> Result<(), ConfigError> {
    let mut seen_slugs = HashSet::new();

    for category in &categories_file.categories {
        if category.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "category '{}' must have a non-empty name",
                category.slug
            )));
        }

        if !seen_slugs.insert(category.slug) {
            return Err(ConfigError::Validation(format!(
                "duplicate category slug: '{}'",
                category.slug
            )));
        }
    }

    // Classification never leaves a product unresolved, so the fallback row
    // has to exist.
    if !seen_slugs.contains(&CategorySlug::FALLBACK) {
        return Err(ConfigError::Validation(format!(
            "fallback category '{}' is missing",
            CategorySlug::FALLBACK
        )));
    }

    Ok(())
}

#[cfg(test)]
#[path = "categories_test.rs"]
mod tests;
