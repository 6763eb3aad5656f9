use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Number of samples per class index.
pub(crate) fn class_counts(labels: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &label in labels {
        counts[label] += 1;
    }
    counts
}

/// Sorted label vocabulary and the class index of every input label.
pub(crate) fn build_vocabulary(labels: &[&str]) -> (Vec<String>, Vec<usize>) {
    let vocabulary: BTreeMap<&str, usize> = labels
        .iter()
        .copied()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, label)| (label, i))
        .collect();
    let indices = labels.iter().map(|l| vocabulary[l]).collect();
    (vocabulary.keys().map(|l| l.to_string()).collect(), indices)
}

/// Test rows for a dataset of `n` samples, rounding up like the usual holdout split.
/// Keeps at least one training row.
pub(crate) fn holdout_size(n: usize, test_fraction: f64) -> usize {
    if n < 2 {
        return 0;
    }
    ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1)
}

/// Shuffled split; returns `(train, test)` row indices.
pub(crate) fn shuffled_split(n: usize, test_fraction: f64, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let test = indices.split_off(n - holdout_size(n, test_fraction));
    (indices, test)
}

/// Per-class shuffled split that keeps class proportions in both halves.
/// Every class must have at least two samples.
pub(crate) fn stratified_split(
    labels: &[usize],
    n_classes: usize,
    test_fraction: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        by_class[label].push(i);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for mut members in by_class.into_iter().filter(|m| !m.is_empty()) {
        members.shuffle(rng);
        let take = ((members.len() as f64 * test_fraction).round() as usize).clamp(1, members.len() - 1);
        let held = members.split_off(members.len() - take);
        train.extend(members);
        test.extend(held);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_vocabulary_is_sorted() {
        let (vocab, idx) = build_vocabulary(&["b", "a", "b", "c"]);
        assert_eq!(vocab, vec!["a", "b", "c"]);
        assert_eq!(idx, vec![1, 0, 1, 2]);
    }

    #[test]
    fn test_holdout_size() {
        assert_eq!(holdout_size(30, 0.2), 6);
        assert_eq!(holdout_size(11, 0.2), 3);
        assert_eq!(holdout_size(2, 0.2), 1);
        assert_eq!(holdout_size(1, 0.2), 0);
    }

    #[test]
    fn test_stratified_split_keeps_every_class_on_both_sides() {
        let labels = [0, 0, 0, 0, 1, 1, 1, 1, 2, 2];
        let mut rng = StdRng::seed_from_u64(42);
        let (train, test) = stratified_split(&labels, 3, 0.25, &mut rng);
        assert_eq!(train.len() + test.len(), labels.len());
        for class in 0..3 {
            assert!(train.iter().any(|&i| labels[i] == class));
            assert!(test.iter().any(|&i| labels[i] == class));
        }
    }

    #[test]
    fn test_shuffled_split_partitions_rows() {
        let mut rng = StdRng::seed_from_u64(42);
        let (mut train, test) = shuffled_split(10, 0.2, &mut rng);
        assert_eq!(test.len(), 2);
        train.extend(test);
        train.sort_unstable();
        assert_eq!(train, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_class_counts() {
        assert_eq!(class_counts(&[0, 2, 2], 3), vec![1, 0, 2]);
    }
}
