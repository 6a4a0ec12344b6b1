//! Display-time reordering that keeps neighbouring grid cells from sharing a
//! category or an advertiser.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

/// The two attributes the shuffler tries not to repeat between neighbours.
pub trait DiversityKeys {
    fn category_key(&self) -> Option<&str>;
    /// Brand, or the advertiser when the brand is unknown.
    fn brand_key(&self) -> Option<&str>;
}

/// Reorder `items` using thread-local randomness. See [`diversity_shuffle_with`].
#[must_use]
pub fn diversity_shuffle<T: DiversityKeys>(items: Vec<T>) -> Vec<T> {
    diversity_shuffle_with(items, &mut rand::rng())
}

/// Return a permutation of `items` biased against adjacent repeats.
///
/// Items are grouped by category and each group is shuffled. Output is then
/// built greedily from the fullest groups, preferring, in order:
///
/// 1. a different category and a different brand than the previous item
/// 2. a different category
/// 3. a different brand
/// 4. anything left
///
/// A single dominant category therefore still yields same-category runs
/// once the other groups are exhausted.
pub fn diversity_shuffle_with<T, R>(items: Vec<T>, rng: &mut R) -> Vec<T>
where
    T: DiversityKeys,
    R: Rng + ?Sized,
{
    if items.len() <= 1 {
        return items;
    }

    let total = items.len();
    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut slots: HashMap<Option<String>, usize> = HashMap::new();
    for item in items {
        let key = item.category_key().map(ToOwned::to_owned);
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(item);
    }

    for group in &mut groups {
        group.shuffle(rng);
    }
    // Group order breaks ties between equally full groups.
    groups.shuffle(rng);

    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        let Some((slot, pos)) = next_pick(&groups, out.last()) else {
            break;
        };
        out.push(groups[slot].remove(pos));
    }
    out
}

fn next_pick<T: DiversityKeys>(groups: &[Vec<T>], last: Option<&T>) -> Option<(usize, usize)> {
    let mut order: Vec<usize> = (0..groups.len())
        .filter(|&g| !groups[g].is_empty())
        .collect();
    order.sort_by_key(|&g| std::cmp::Reverse(groups[g].len()));

    let first = *order.first()?;
    let Some(last) = last else {
        return Some((first, 0));
    };

    let last_category = last.category_key();
    let last_brand = last.brand_key();
    let other_brand =
        |group: &[T]| group.iter().position(|item| item.brand_key() != last_brand);

    let other_categories: Vec<usize> = order
        .iter()
        .copied()
        .filter(|&g| groups[g][0].category_key() != last_category)
        .collect();

    for &g in &other_categories {
        if let Some(pos) = other_brand(&groups[g]) {
            return Some((g, pos));
        }
    }
    if let Some(&g) = other_categories.first() {
        return Some((g, 0));
    }
    for &g in &order {
        if let Some(pos) = other_brand(&groups[g]) {
            return Some((g, pos));
        }
    }
    Some((first, 0))
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Item {
        id: u32,
        category: &'static str,
        brand: &'static str,
    }

    impl DiversityKeys for Item {
        fn category_key(&self) -> Option<&str> {
            Some(self.category)
        }

        fn brand_key(&self) -> Option<&str> {
            Some(self.brand)
        }
    }

    fn catalog(categories: &[&'static str], per_category: u32) -> Vec<Item> {
        let brands = ["acme", "globex", "initech"];
        let mut items = Vec::new();
        let mut id = 0;
        for &category in categories {
            for n in 0..per_category {
                items.push(Item {
                    id,
                    category,
                    brand: brands[n as usize % brands.len()],
                });
                id += 1;
            }
        }
        items
    }

    fn category_repeats(items: &[Item]) -> usize {
        items
            .windows(2)
            .filter(|w| w[0].category == w[1].category)
            .count()
    }

    fn sorted_ids(items: &[Item]) -> Vec<u32> {
        let mut ids: Vec<u32> = items.iter().map(|i| i.id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn empty_and_single_inputs_are_returned_unchanged() {
        let empty: Vec<Item> = Vec::new();
        assert!(diversity_shuffle(empty).is_empty());

        let one = catalog(&["mode"], 1);
        assert_eq!(diversity_shuffle(one.clone()), one);
    }

    #[test]
    fn output_is_a_permutation_of_input() {
        let mut rng = StdRng::seed_from_u64(7);
        let input = catalog(&["mode", "reizen", "overig", "elektronica"], 5);
        for _ in 0..50 {
            let output = diversity_shuffle_with(input.clone(), &mut rng);
            assert_eq!(output.len(), input.len());
            assert_eq!(sorted_ids(&output), sorted_ids(&input));
        }
    }

    #[test]
    fn balanced_categories_never_repeat_adjacently() {
        let input = catalog(&["mode", "reizen", "overig"], 3);
        for _ in 0..100 {
            let output = diversity_shuffle(input.clone());
            assert_eq!(category_repeats(&output), 0, "{output:?}");
        }
    }

    #[test]
    fn single_category_falls_back_to_brand_alternation() {
        let input: Vec<Item> = (0..8)
            .map(|id| Item {
                id,
                category: "mode",
                brand: if id % 2 == 0 { "acme" } else { "globex" },
            })
            .collect();
        for _ in 0..50 {
            let output = diversity_shuffle(input.clone());
            assert_eq!(category_repeats(&output), output.len() - 1);
            assert!(
                output.windows(2).all(|w| w[0].brand != w[1].brand),
                "{output:?}"
            );
        }
    }

    #[test]
    fn adjacency_rate_beats_uniform_shuffle() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut input = catalog(&["mode", "reizen", "overig", "huis-tuin"], 6);
        input.extend(catalog(&["mode"], 6).into_iter().map(|mut i| {
            i.id += 1000;
            i
        }));

        let trials = 400;
        let pairs = (input.len() - 1) * trials;
        let mut diverse = 0;
        let mut uniform = 0;
        for _ in 0..trials {
            diverse += category_repeats(&diversity_shuffle_with(input.clone(), &mut rng));
            let mut shuffled = input.clone();
            shuffled.shuffle(&mut rng);
            uniform += category_repeats(&shuffled);
        }

        #[allow(clippy::cast_precision_loss)]
        let (diverse_rate, uniform_rate) =
            (diverse as f64 / pairs as f64, uniform as f64 / pairs as f64);
        assert!(
            diverse_rate <= uniform_rate,
            "diverse {diverse_rate:.3} vs uniform {uniform_rate:.3}"
        );
    }
}
