use std::path::Path;

use super::*;

fn category(name: &str, slug: CategorySlug) -> CategoryConfig {
    CategoryConfig {
        name: name.to_string(),
        slug,
        description: None,
        icon: None,
    }
}

#[test]
fn slug_round_trips_through_from_str() {
    for slug in CategorySlug::ALL {
        assert_eq!(slug.as_str().parse::<CategorySlug>().unwrap(), slug);
    }
}

#[test]
fn unknown_slug_is_rejected() {
    let err = "gadgets".parse::<CategorySlug>().unwrap_err();
    assert!(err.contains("gadgets"));
}

#[test]
fn fallback_is_last_in_priority_order() {
    assert_eq!(CategorySlug::ALL.last(), Some(&CategorySlug::FALLBACK));
}

#[test]
fn slug_serializes_as_kebab_text() {
    let json = serde_json::to_string(&CategorySlug::SportVrijeTijd).unwrap();
    assert_eq!(json, "\"sport-vrije-tijd\"");
}

#[test]
fn validate_rejects_duplicate_slug() {
    let file = CategoriesFile {
        categories: vec![
            category("Mode", CategorySlug::Mode),
            category("Kleding", CategorySlug::Mode),
            category("Overig", CategorySlug::Overig),
        ],
    };
    let err = validate_categories(&file).unwrap_err();
    assert!(err.to_string().contains("duplicate category slug: 'mode'"));
}

#[test]
fn validate_rejects_empty_name() {
    let file = CategoriesFile {
        categories: vec![
            category("  ", CategorySlug::Reizen),
            category("Overig", CategorySlug::Overig),
        ],
    };
    let err = validate_categories(&file).unwrap_err();
    assert!(err.to_string().contains("non-empty name"));
}

#[test]
fn validate_requires_fallback_category() {
    let file = CategoriesFile {
        categories: vec![category("Elektronica", CategorySlug::Elektronica)],
    };
    let err = validate_categories(&file).unwrap_err();
    assert!(err.to_string().contains("fallback category 'overig'"));
}

#[test]
fn load_categories_reads_repo_seed_file() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/categories.yaml");
    let file = load_categories(&path).expect("seed file should be valid");
    assert_eq!(file.categories.len(), CategorySlug::ALL.len());
    for slug in CategorySlug::ALL {
        assert!(
            file.categories.iter().any(|c| c.slug == slug),
            "seed file is missing '{slug}'"
        );
    }
}

#[test]
fn load_categories_reports_missing_file() {
    let err = load_categories(Path::new("/nonexistent/categories.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::CategoriesFileIo { .. }));
}
