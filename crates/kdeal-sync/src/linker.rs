//! Parent/variant linking over already-persisted rows.
//!
//! Runs once per sync, after every batch is committed: sizes of one product
//! arrive as separate feed rows, possibly in different batches.

use std::collections::HashMap;

use kdeal_feed::base_title;
use uuid::Uuid;

use crate::store::{CatalogStore, VariantCandidate};
use crate::SyncError;

/// Grouping key: lower-cased `brand-base title`, with a missing brand as "".
#[must_use]
pub fn group_key(original_title: &str, brand: Option<&str>) -> String {
    format!("{}-{}", brand.unwrap_or(""), base_title(original_title)).to_lowercase()
}

/// Pair each candidate with the first candidate of its group.
///
/// The first member in input order becomes the parent and is never linked
/// itself; single-member groups produce nothing.
#[must_use]
pub fn plan_links(candidates: &[VariantCandidate]) -> Vec<(Uuid, Uuid)> {
    let mut parents: HashMap<String, Uuid> = HashMap::new();
    let mut links = Vec::new();

    for candidate in candidates {
        let key = group_key(&candidate.original_title, candidate.brand.as_deref());
        match parents.get(&key) {
            Some(&parent) => links.push((candidate.id, parent)),
            None => {
                parents.insert(key, candidate.id);
            }
        }
    }
    links
}

/// Link unparented size variants to their group parent.
///
/// Returns the number of links created. Running it again over the same
/// state creates none.
///
/// # Errors
///
/// Returns [`SyncError`] if the store cannot be read or updated.
pub async fn link_variants<S: CatalogStore + ?Sized>(store: &S) -> Result<usize, SyncError> {
    let candidates = store.unlinked_variants().await?;
    let planned = plan_links(&candidates);
    let mut linked = 0usize;

    for (child, parent) in &planned {
        if store.link_variant(*child, *parent).await? {
            linked += 1;
        }
    }

    tracing::info!(
        candidates = candidates.len(),
        planned = planned.len(),
        linked,
        "variant linking finished"
    );
    Ok(linked)
}
