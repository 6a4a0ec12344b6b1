//! Keyword classification of feed category text onto the storefront taxonomy.

use std::sync::LazyLock;

use kdeal_core::CategorySlug;
use regex::Regex;

/// Keyword groups in priority order. The first group that matches wins, so
/// "sport shoes" lands in `mode` before `sport-vrije-tijd` is considered.
static CATEGORY_PATTERNS: LazyLock<Vec<(CategorySlug, Regex)>> = LazyLock::new(|| {
    [
        (
            CategorySlug::Elektronica,
            r"electronic|elektronica|computer|laptop|tablet|smartphone|telefoon|phone|audio|koptelefoon|camera|\btv\b|televisie|monitor|printer|wearable|smartwatch|gadget|smart home",
        ),
        (
            CategorySlug::Mode,
            r"fashion|\bmode\b|cloth|kleding|shoe|schoen|sneaker|jurk|dress|shirt|broek|jeans|jacket|\bjas\b|lingerie|ondergoed|accessoire|sieraden|jewel|\btas\b|tassen|\bbags?\b|horloge",
        ),
        (
            CategorySlug::HuisTuin,
            r"\bhome\b|huis|wonen|garden|tuin|furniture|meubel|kitchen|keuken|badkamer|bathroom|decor|verlichting|lighting|\bdiy\b|klussen|gereedschap|\btools?\b|beddengoed|bedding",
        ),
        (
            CategorySlug::SportVrijeTijd,
            r"sport|fitness|outdoor|camping|fiets|\bbikes?\b|cycling|hardlopen|running|yoga|zwem|swim|voetbal|football|tennis|golf|hobby",
        ),
        (
            CategorySlug::BeautyGezondheid,
            r"beauty|health|gezondheid|cosmetic|make-?up|parfum|perfume|fragrance|skincare|huidverzorging|verzorging|\bhaar\b|\bhair\b|vitamine|supplement",
        ),
        (
            CategorySlug::SpeelgoedGames,
            r"\btoys?\b|speelgoed|\bgames?\b|gaming|\bspel\b|spellen|puzzel|puzzle|lego|console|playstation|xbox|nintendo",
        ),
        (
            CategorySlug::EtenDrinken,
            r"\bfood\b|\beten\b|drink|drank|groceries|boodschappen|\bwijn\b|\bwine\b|\bbier\b|\bbeer\b|koffie|coffee|\bthee\b|\btea\b|snoep|candy|chocola",
        ),
        (
            CategorySlug::AutoMotor,
            r"automotive|\bauto\b|\bcars?\b|motor|banden|\btyres?\b|\btires?\b|onderdelen",
        ),
        (
            CategorySlug::Reizen,
            r"travel|\breis\b|reizen|holiday|vakantie|flight|vlucht|hotel|koffer|luggage",
        ),
    ]
    .into_iter()
    .map(|(slug, pattern)| (slug, Regex::new(pattern).expect("valid regex")))
    .collect()
});

/// Classify a product from its merchant category and Awin category name.
///
/// Both fields are joined and lower-cased before matching. Unmatched or
/// missing text resolves to [`CategorySlug::FALLBACK`].
#[must_use]
pub fn classify_category(merchant_category: Option<&str>, category_name: Option<&str>) -> CategorySlug {
    let text = format!(
        "{} {}",
        merchant_category.unwrap_or_default(),
        category_name.unwrap_or_default()
    )
    .to_lowercase();

    if text.trim().is_empty() {
        return CategorySlug::FALLBACK;
    }

    CATEGORY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&text))
        .map_or(CategorySlug::FALLBACK, |(slug, _)| *slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn electronics_and_computers_is_elektronica() {
        for _ in 0..3 {
            assert_eq!(
                classify_category(Some("Electronics & Computers"), None),
                CategorySlug::Elektronica
            );
        }
    }

    #[test]
    fn gibberish_is_overig() {
        assert_eq!(
            classify_category(Some("qwxz vbnm"), Some("zzyzx")),
            CategorySlug::Overig
        );
        assert_eq!(classify_category(None, None), CategorySlug::Overig);
    }

    #[test]
    fn fashion_beats_sport_for_sport_shoes() {
        assert_eq!(
            classify_category(Some("Sport Shoes"), None),
            CategorySlug::Mode
        );
    }

    #[test]
    fn category_name_is_considered_alongside_merchant_category() {
        assert_eq!(
            classify_category(Some("Aanbiedingen"), Some("Tuinmeubelen")),
            CategorySlug::HuisTuin
        );
    }

    #[test]
    fn dutch_keywords_are_recognised() {
        assert_eq!(
            classify_category(Some("Speelgoed > Bouwstenen"), None),
            CategorySlug::SpeelgoedGames
        );
        assert_eq!(
            classify_category(Some("Wijn & Bier"), None),
            CategorySlug::EtenDrinken
        );
        assert_eq!(
            classify_category(Some("Vakantie Turkije"), None),
            CategorySlug::Reizen
        );
        assert_eq!(
            classify_category(Some("Autobanden"), None),
            CategorySlug::AutoMotor
        );
    }

    #[test]
    fn every_group_but_fallback_has_a_pattern() {
        let covered: Vec<CategorySlug> = CATEGORY_PATTERNS.iter().map(|(s, _)| *s).collect();
        assert_eq!(covered, CategorySlug::ALL[..CategorySlug::ALL.len() - 1]);
    }
}
