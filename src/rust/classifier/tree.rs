use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Splits that do not lower weighted impurity by at least this much are ignored.
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Node {
    /// Class probabilities of the training samples that reached this leaf
    Leaf { distribution: Vec<f64> },
    /// `x[feature] <= threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub max_features: usize,
}

/// Training data shared by every tree of a forest.
pub(crate) struct TrainingView<'a> {
    pub features: &'a Array2<f64>,
    pub labels: &'a [usize],
    pub class_weights: &'a [f64],
    pub n_classes: usize,
}

/// A CART classification tree grown on Gini impurity. Nodes live in a flat
/// arena with the root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DecisionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// Grows a tree over `samples`. Repeated indices (bootstrap draws) count once per occurrence.
    pub fn fit(data: &TrainingView<'_>, samples: &[usize], params: &TreeParams, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, samples, 0, params, rng);
        tree
    }

    pub fn predict_proba(&self, x: ArrayView1<'_, f64>) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Checks the arena is well formed: children stored after their parent and
    /// in range, leaves sized for `n_classes`, split features below `n_features`.
    ///
    /// Children always follow their parent in the arena, so a split pointing at
    /// itself or backwards would loop forever in `predict_proba`.
    pub fn is_consistent(&self, n_classes: usize, n_features: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(index, node)| match node {
                Node::Leaf { distribution } => distribution.len() == n_classes,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < n_features
                        && threshold.is_finite()
                        && *left > index
                        && *right > index
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }

    fn grow(
        &mut self,
        data: &TrainingView<'_>,
        samples: &[usize],
        depth: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> usize {
        let counts = weighted_counts(data, samples);
        let total: f64 = counts.iter().sum();

        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            distribution: normalize(&counts, total),
        });

        let reached_depth = params.max_depth.map_or(false, |max| depth >= max);
        if reached_depth || samples.len() < params.min_samples_split || is_pure(&counts) {
            return node_id;
        }

        let parent_impurity = gini(&counts, total) * total;
        let Some(split) = best_split(data, samples, parent_impurity, params.max_features, rng) else {
            return node_id;
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| data.features[[i, split.feature]] <= split.threshold);
        if left_samples.is_empty() || right_samples.is_empty() {
            return node_id;
        }

        let left = self.grow(data, &left_samples, depth + 1, params, rng);
        let right = self.grow(data, &right_samples, depth + 1, params, rng);
        self.nodes[node_id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_id
    }
}

/// Searches a random subset of `max_features` columns first, then the rest
/// if the subset holds no useful split.
fn best_split(
    data: &TrainingView<'_>,
    samples: &[usize],
    parent_impurity: f64,
    max_features: usize,
    rng: &mut StdRng,
) -> Option<SplitCandidate> {
    let mut features: Vec<usize> = (0..data.features.ncols()).collect();
    features.shuffle(rng);
    let max_features = max_features.clamp(1, features.len());

    let (first, rest) = features.split_at(max_features);
    search_features(data, samples, parent_impurity, first)
        .or_else(|| search_features(data, samples, parent_impurity, rest))
}

fn search_features(
    data: &TrainingView<'_>,
    samples: &[usize],
    parent_impurity: f64,
    features: &[usize],
) -> Option<SplitCandidate> {
    let mut best: Option<SplitCandidate> = None;

    for &feature in features {
        let mut sorted: Vec<(f64, usize)> = samples
            .iter()
            .map(|&i| (data.features[[i, feature]], data.labels[i]))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left = vec![0.0; data.n_classes];
        let mut right = vec![0.0; data.n_classes];
        for &(_, label) in &sorted {
            right[label] += data.class_weights[label];
        }

        for pair in 0..sorted.len().saturating_sub(1) {
            let (value, label) = sorted[pair];
            let weight = data.class_weights[label];
            left[label] += weight;
            right[label] -= weight;

            let next_value = sorted[pair + 1].0;
            if next_value <= value {
                continue;
            }

            let left_total: f64 = left.iter().sum();
            let right_total: f64 = right.iter().sum();
            let impurity = gini(&left, left_total) * left_total + gini(&right, right_total) * right_total;

            let improves_parent = impurity < parent_impurity - MIN_IMPURITY_DECREASE;
            let beats_best = best.as_ref().map_or(true, |b| impurity < b.impurity - MIN_IMPURITY_DECREASE);
            if improves_parent && beats_best {
                let mut threshold = value + (next_value - value) / 2.0;
                if threshold >= next_value {
                    threshold = value;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }

    best
}

fn weighted_counts(data: &TrainingView<'_>, samples: &[usize]) -> Vec<f64> {
    let mut counts = vec![0.0; data.n_classes];
    for &i in samples {
        let label = data.labels[i];
        counts[label] += data.class_weights[label];
    }
    counts
}

fn normalize(counts: &[f64], total: f64) -> Vec<f64> {
    if total > 0.0 {
        counts.iter().map(|c| c / total).collect()
    } else {
        vec![0.0; counts.len()]
    }
}

fn is_pure(counts: &[f64]) -> bool {
    counts.iter().filter(|&&c| c > 0.0).count() <= 1
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}
