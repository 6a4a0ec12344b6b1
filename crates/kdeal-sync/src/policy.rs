//! Row-selection strategies.
//!
//! A full pass walks every feed window and is the only policy that may
//! deactivate products missing from the feed. The two sampling policies cap
//! a run at `limit` rows and differ in which rows they keep.

use kdeal_core::{NormalizedProduct, SelectionPolicyKind};
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Every row, in feed windows of `chunk_size` lines.
    FullPass { chunk_size: usize },
    /// The `limit` rows with the largest discount; ties keep feed order.
    TopDiscount { limit: usize },
    /// A uniform random subset of `limit` rows, for merchant and category
    /// variety.
    RandomSample { limit: usize },
}

impl SelectionPolicy {
    #[must_use]
    pub fn new(kind: SelectionPolicyKind, chunk_size: usize, sample_size: usize) -> Self {
        match kind {
            SelectionPolicyKind::FullPass => SelectionPolicy::FullPass {
                chunk_size: chunk_size.max(1),
            },
            SelectionPolicyKind::TopDiscount => SelectionPolicy::TopDiscount { limit: sample_size },
            SelectionPolicyKind::RandomSample => {
                SelectionPolicy::RandomSample { limit: sample_size }
            }
        }
    }

    #[must_use]
    pub fn kind(self) -> SelectionPolicyKind {
        match self {
            SelectionPolicy::FullPass { .. } => SelectionPolicyKind::FullPass,
            SelectionPolicy::TopDiscount { .. } => SelectionPolicyKind::TopDiscount,
            SelectionPolicy::RandomSample { .. } => SelectionPolicyKind::RandomSample,
        }
    }

    /// Whether the run sees the whole feed, so absence means removal.
    #[must_use]
    pub fn sees_whole_feed(self) -> bool {
        matches!(self, SelectionPolicy::FullPass { .. })
    }

    /// Apply the policy to a run's normalized rows. A full pass keeps all.
    #[must_use]
    pub fn select<R: Rng + ?Sized>(
        self,
        mut products: Vec<NormalizedProduct>,
        rng: &mut R,
    ) -> Vec<NormalizedProduct> {
        match self {
            SelectionPolicy::FullPass { .. } => products,
            SelectionPolicy::TopDiscount { limit } => {
                // Stable sort: equal discounts stay in feed order.
                products.sort_by_key(|p| std::cmp::Reverse(p.discount_or_zero()));
                products.truncate(limit);
                products
            }
            SelectionPolicy::RandomSample { limit } => {
                if products.len() > limit {
                    let (picked, _) = products.partial_shuffle(rng, limit);
                    picked.to_vec()
                } else {
                    products
                }
            }
        }
    }
}
