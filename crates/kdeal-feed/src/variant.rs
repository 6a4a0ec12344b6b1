//! Size-variant extraction from product titles.
//!
//! Awin fashion merchants publish one row per size with the size appended
//! to the title, e.g. `"Bikini Zwart - Maat string S, top M"`.

use std::sync::LazyLock;

use regex::Regex;

static SIZE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[-,]?\s*\bmaat\s+((?:string\s+)?[xsml]+(?:\s*,\s*top\s+[xsml]+)?)\s*$")
        .expect("valid regex")
});

/// Split `title` into its base title and the trailing size code, if any.
///
/// A title that would be left empty by stripping is returned whole.
#[must_use]
pub fn split_variant(title: &str) -> (&str, Option<&str>) {
    let Some(caps) = SIZE_SUFFIX.captures(title) else {
        return (title.trim(), None);
    };
    let (Some(suffix), Some(size)) = (caps.get(0), caps.get(1)) else {
        return (title.trim(), None);
    };
    let base = title[..suffix.start()].trim();
    if base.is_empty() {
        return (title.trim(), None);
    }
    (base, Some(size.as_str().trim()))
}

/// The title with any trailing size suffix removed.
#[must_use]
pub fn base_title(title: &str) -> &str {
    split_variant(title).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_size_suffix_is_extracted() {
        assert_eq!(
            split_variant("Zomerjurk Bloemen Maat M"),
            ("Zomerjurk Bloemen", Some("M"))
        );
    }

    #[test]
    fn hyphen_separated_suffix_is_extracted() {
        assert_eq!(
            split_variant("Sportlegging Zwart - maat XL"),
            ("Sportlegging Zwart", Some("XL"))
        );
    }

    #[test]
    fn string_and_top_sizes_are_kept_together() {
        assert_eq!(
            split_variant("Bikini Tropical, Maat string S, top M"),
            ("Bikini Tropical", Some("string S, top M"))
        );
    }

    #[test]
    fn titles_without_suffix_have_no_variant() {
        assert_eq!(split_variant("Draadloze Koptelefoon"), ("Draadloze Koptelefoon", None));
        // Numeric sizes are not size-letter codes.
        assert_eq!(split_variant("Sneakers Maat 42"), ("Sneakers Maat 42", None));
        // The suffix must end the title.
        assert_eq!(
            split_variant("Maat M Shirt Blauw"),
            ("Maat M Shirt Blauw", None)
        );
    }

    #[test]
    fn bare_size_title_is_not_split() {
        assert_eq!(split_variant("Maat S"), ("Maat S", None));
    }

    #[test]
    fn base_title_matches_across_sizes() {
        assert_eq!(base_title("Hoodie Grijs Maat S"), base_title("Hoodie Grijs Maat XXL"));
    }
}
