//! Representative chunk sampling under a request budget.

use rand::Rng;

/// Select at most `target` chunks covering the start, middle, and end of a document.
///
/// When `chunks` fits the budget it is returned unchanged. Otherwise exactly `target` chunks are
/// kept in their original order: the first and last `target / 4`, plus a uniformly random subset
/// of the middle span filling the remaining quota. Pass a seeded generator for reproducible picks.
pub fn sample<T, R>(chunks: Vec<T>, target: usize, rng: &mut R) -> Vec<T>
where
    R: Rng + ?Sized,
{
    let total = chunks.len();
    if total <= target {
        return chunks;
    }

    let edge = target / 4;
    let middle_len = total - 2 * edge;
    let middle_quota = target - 2 * edge;

    let mut keep = vec![false; total];
    keep[..edge].fill(true);
    keep[total - edge..].fill(true);
    for index in rand::seq::index::sample(rng, middle_len, middle_quota) {
        keep[edge + index] = true;
    }

    chunks
        .into_iter()
        .zip(keep)
        .filter_map(|(chunk, kept)| kept.then_some(chunk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn returns_small_inputs_unchanged() {
        let chunks = vec!["a", "b", "c"];
        assert_eq!(sample(chunks.clone(), 10, &mut rng(1)), chunks);
        assert_eq!(sample(chunks.clone(), 3, &mut rng(1)), chunks);
    }

    #[test]
    fn empty_input_yields_empty_sample() {
        let chunks: Vec<&str> = Vec::new();
        assert!(sample(chunks, 20, &mut rng(1)).is_empty());
    }

    #[test]
    fn selects_exactly_target_in_original_order() {
        let chunks: Vec<usize> = (0..100).collect();
        for seed in 0..20 {
            let picked = sample(chunks.clone(), 20, &mut rng(seed));
            assert_eq!(picked.len(), 20);
            assert!(picked.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn always_covers_head_and_tail() {
        let chunks: Vec<usize> = (0..50).collect();
        let picked = sample(chunks, 12, &mut rng(7));

        assert_eq!(&picked[..3], &[0, 1, 2]);
        assert_eq!(&picked[9..], &[47, 48, 49]);
        assert!(picked[3..9].iter().all(|index| (3..47).contains(index)));
    }

    #[test]
    fn seeded_generators_are_reproducible() {
        let chunks: Vec<usize> = (0..40).collect();
        let first = sample(chunks.clone(), 10, &mut rng(99));
        let second = sample(chunks, 10, &mut rng(99));
        assert_eq!(first, second);
    }

    #[test]
    fn small_targets_draw_only_from_the_middle() {
        let chunks: Vec<usize> = (0..10).collect();
        let picked = sample(chunks, 3, &mut rng(3));
        assert_eq!(picked.len(), 3);
        assert!(picked.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
