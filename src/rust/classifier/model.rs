use std::time::{SystemTime, UNIX_EPOCH};

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::tree::{DecisionTree, TrainingView, TreeParams};

/// Version of the artifact layout itself, independent of the feature schema.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Hyper-parameters for growing a forest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// A bagged ensemble of Gini trees with class-balanced sample weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits the forest on `features` (one row per sample) and class indices `labels`.
    ///
    /// Class weights follow the "balanced" heuristic: `n_samples / (n_classes * count)`.
    pub fn fit(features: &Array2<f64>, labels: &[usize], n_classes: usize, params: &ForestParams) -> Self {
        let n_samples = features.nrows();
        let n_features = features.ncols();

        let mut counts = vec![0usize; n_classes];
        for &label in labels {
            counts[label] += 1;
        }
        let present = counts.iter().filter(|&&c| c > 0).count().max(1);
        let class_weights: Vec<f64> = counts
            .iter()
            .map(|&c| if c == 0 { 0.0 } else { n_samples as f64 / (present * c) as f64 })
            .collect();

        let data = TrainingView {
            features,
            labels,
            class_weights: &class_weights,
            n_classes,
        };
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split.max(2),
            max_features: ((n_features as f64).sqrt().floor() as usize).max(1),
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let all_samples: Vec<usize> = (0..n_samples).collect();
        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let samples: Vec<usize> = if params.bootstrap && n_samples > 0 {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    all_samples.clone()
                };
                DecisionTree::fit(&data, &samples, &tree_params, &mut rng)
            })
            .collect();

        Self {
            n_classes,
            n_features,
            trees,
        }
    }

    /// Mean of the per-tree leaf distributions.
    pub fn predict_proba(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut proba = Array1::zeros(self.n_classes);
        for tree in &self.trees {
            for (p, leaf) in proba.iter_mut().zip(tree.predict_proba(x)) {
                *p += leaf;
            }
        }
        if !self.trees.is_empty() {
            proba /= self.trees.len() as f64;
        }
        proba
    }

    /// Index and probability of the most likely class. Ties go to the lower index.
    pub fn predict(&self, x: ArrayView1<'_, f64>) -> (usize, f64) {
        Self::best_class(&self.predict_proba(x))
    }

    /// Argmax over a probability vector from [`RandomForest::predict_proba`].
    /// Ties go to the lower index.
    pub fn best_class(proba: &Array1<f64>) -> (usize, f64) {
        let mut best = (0, f64::NEG_INFINITY);
        for (i, &p) in proba.iter().enumerate() {
            if p > best.1 {
                best = (i, p);
            }
        }
        best
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(DecisionTree::depth).max().unwrap_or(0)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.trees.is_empty() {
            return Err(EngineError::PersistenceError("Forest has no trees".into()));
        }
        if let Some(i) = self
            .trees
            .iter()
            .position(|t| !t.is_consistent(self.n_classes, self.n_features))
        {
            return Err(EngineError::PersistenceError(format!("Tree {} is malformed", i)));
        }
        Ok(())
    }
}

/// Facts about the run that produced an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub train_samples: usize,
    pub holdout_samples: usize,
    pub seed: u64,
    pub stratified: bool,
    /// Unix seconds
    pub created_at: u64,
}

impl TrainingMetadata {
    pub fn now(train_samples: usize, holdout_samples: usize, seed: u64, stratified: bool) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            train_samples,
            holdout_samples,
            seed,
            stratified,
            created_at,
        }
    }
}

/// A trained weakness classifier: forest parameters, label vocabulary and
/// the feature schema it was fitted against. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub format_version: u32,
    pub schema_version: String,
    pub feature_names: Vec<String>,
    pub categories: Vec<String>,
    pub labels: Vec<String>,
    pub forest: RandomForest,
    pub metadata: TrainingMetadata,
}

impl TrainedModel {
    /// Structural checks run after deserialization.
    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(EngineError::PersistenceError(format!(
                "Unsupported artifact format {} (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        if self.labels.len() < 2 || self.labels.len() != self.forest.n_classes() {
            return Err(EngineError::PersistenceError(format!(
                "Label vocabulary has {} entries but the forest knows {} classes",
                self.labels.len(),
                self.forest.n_classes()
            )));
        }
        if self.feature_names.len() != self.forest.n_features() {
            return Err(EngineError::PersistenceError(format!(
                "Artifact lists {} features but the forest was fitted on {}",
                self.feature_names.len(),
                self.forest.n_features()
            )));
        }
        self.forest.validate()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_forest() -> RandomForest {
        let features = array![
            [0.0, 10.0],
            [0.1, 11.0],
            [0.2, 9.0],
            [0.9, 10.0],
            [1.0, 12.0],
            [0.8, 11.0]
        ];
        let labels = [0, 0, 0, 1, 1, 1];
        RandomForest::fit(&features, &labels, 2, &ForestParams::default())
    }

    #[test]
    fn test_forest_fits_separable_data() {
        let forest = toy_forest();
        assert_eq!(forest.n_trees(), 50);
        assert_eq!(forest.predict(array![0.05, 10.0].view()).0, 0);
        assert_eq!(forest.predict(array![0.95, 10.0].view()).0, 1);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let forest = toy_forest();
        let proba = forest.predict_proba(array![0.5, 10.5].view());
        assert!((proba.sum() - 1.0).abs() < 1e-9);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_best_class_prefers_lower_index_on_ties() {
        assert_eq!(RandomForest::best_class(&array![0.4, 0.4, 0.2]), (0, 0.4));
        assert_eq!(RandomForest::best_class(&array![0.1, 0.3, 0.6]), (2, 0.6));
    }

    #[test]
    fn test_same_seed_same_forest() {
        assert_eq!(toy_forest(), toy_forest());
    }

    #[test]
    fn test_self_referencing_split_is_rejected() {
        let mut json = serde_json::to_value(toy_forest()).unwrap();
        let split = json["trees"]
            .as_array()
            .unwrap()
            .iter()
            .position(|tree| tree["nodes"][0]["kind"] == "split")
            .unwrap();
        json["trees"][split]["nodes"][0]["left"] = serde_json::json!(0);
        let forest: RandomForest = serde_json::from_value(json).unwrap();

        let err = forest.validate().unwrap_err();
        let expected = format!("Tree {} is malformed", split);
        assert!(matches!(err, EngineError::PersistenceError(ref msg) if *msg == expected));
    }

    #[test]
    fn test_forest_survives_json_round_trip() {
        let forest = toy_forest();
        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        assert_eq!(forest, restored);
    }
}
