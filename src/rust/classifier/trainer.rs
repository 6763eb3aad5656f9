use std::path::Path;

use log::{info, warn};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::classifier::predict_with;
use super::error::EngineError;
use super::features::{FeatureEncoder, FEATURE_VECTOR_SIZE};
use super::model::{ForestParams, RandomForest, TrainedModel, TrainingMetadata, ARTIFACT_FORMAT_VERSION};
use super::utils::{build_vocabulary, class_counts, shuffled_split, stratified_split};
use crate::artifact;
use crate::config::TrainerConfig;
use crate::store::PerformanceRecord;

/// Non-fatal conditions observed during a training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingWarning {
    /// Some class was too small for a stratified holdout; a plain shuffled split was used.
    StratificationSkipped {
        label: String,
        samples: usize,
        required: usize,
    },
    /// The holdout split came out empty, so no metrics could be computed.
    EmptyHoldout,
    /// Labels seen only in the holdout; the model can never predict them.
    UnseenInTraining { labels: Vec<String> },
}

impl std::fmt::Display for TrainingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingWarning::StratificationSkipped {
                label,
                samples,
                required,
            } => write!(
                f,
                "topic '{}' has {} samples (< {}); used a non-stratified holdout",
                label, samples, required
            ),
            TrainingWarning::EmptyHoldout => write!(f, "holdout split is empty; no metrics computed"),
            TrainingWarning::UnseenInTraining { labels } => {
                write!(f, "topics only present in the holdout: {}", labels.join(", "))
            }
        }
    }
}

/// Precision, recall and f1 for one label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// One evaluated example and what the model said about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedExample {
    pub partner_id: String,
    pub product_type: String,
    pub attempts: u32,
    pub successes: u32,
    pub expected: String,
    pub predicted: String,
    pub confidence: f32,
}

/// Metrics from running a model over labelled records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    pub examples: Vec<EvaluatedExample>,
    pub warnings: Vec<TrainingWarning>,
}

impl EvaluationReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Text table in the familiar "classification report" layout.
    pub fn classification_report(&self) -> String {
        let width = self
            .per_class
            .iter()
            .map(|m| m.label.len())
            .max()
            .unwrap_or(0)
            .max("accuracy".len());
        let mut out = format!(
            "{:>width$}  {:>9}  {:>9}  {:>9}  {:>7}\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for m in &self.per_class {
            out.push_str(&format!(
                "{:>width$}  {:>9.2}  {:>9.2}  {:>9.2}  {:>7}\n",
                m.label, m.precision, m.recall, m.f1, m.support
            ));
        }
        out.push_str(&format!(
            "\n{:>width$}  {:>9}  {:>9}  {:>9.2}  {:>7}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.examples.len()
        ));
        out
    }
}

/// A trained model together with its holdout evaluation.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub report: EvaluationReport,
}

/// Offline pipeline: encode records, split, fit a forest, evaluate on the holdout.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use microcoach::{InMemoryPerformanceStore, Trainer};
///
/// let store = InMemoryPerformanceStore::from_csv_path("data/gps_performance.csv")?;
/// let outcome = Trainer::builder()
///     .with_trees(100)
///     .with_seed(7)
///     .build()?
///     .train_and_save(store.records(), "models/weakness_classifier.json")?;
/// println!("{}", outcome.report.classification_report());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
    encoder: FeatureEncoder,
}

impl Trainer {
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::new()
    }

    pub fn new(config: TrainerConfig) -> Result<Self, EngineError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            encoder: FeatureEncoder::new(),
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Fits a model on `records` and evaluates it on a holdout split.
    ///
    /// # Errors
    /// - `DataError` if there are no records, fewer than the configured minimum,
    ///   or only one distinct weak topic
    pub fn train(&self, records: &[PerformanceRecord]) -> Result<TrainingOutcome, EngineError> {
        Self::validate_dataset(records, self.config.min_rows)?;

        let topics: Vec<&str> = records.iter().map(|r| r.last_weak_topic.as_str()).collect();
        let (labels, targets) = build_vocabulary(&topics);
        let counts = class_counts(&targets, labels.len());
        for (label, count) in labels.iter().zip(&counts) {
            info!("  {}: {} samples", label, count);
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut warnings = Vec::new();
        let required = self.config.stratify_splits;
        let smallest = counts
            .iter()
            .enumerate()
            .min_by_key(|&(_, count)| *count)
            .map(|(i, count)| (i, *count))
            .unwrap_or((0, 0));

        let stratified = smallest.1 >= required;
        let (train_rows, test_rows) = if stratified {
            stratified_split(&targets, labels.len(), self.config.test_size, &mut rng)
        } else {
            warn!(
                "Class '{}' has {} samples (need {}); using an unstratified holdout split",
                labels[smallest.0], smallest.1, required
            );
            warnings.push(TrainingWarning::StratificationSkipped {
                label: labels[smallest.0].clone(),
                samples: smallest.1,
                required,
            });
            shuffled_split(records.len(), self.config.test_size, &mut rng)
        };

        let features = self.encoder.encode_batch(records);
        let train_x = select_rows(&features, &train_rows);
        let train_y: Vec<usize> = train_rows.iter().map(|&i| targets[i]).collect();

        info!("Training model with {} samples...", train_rows.len());
        let forest = RandomForest::fit(&train_x, &train_y, labels.len(), &self.forest_params());

        let model = TrainedModel {
            format_version: ARTIFACT_FORMAT_VERSION,
            schema_version: self.encoder.schema_version().to_string(),
            feature_names: self.encoder.feature_names(),
            categories: self.encoder.categories(),
            labels: labels.clone(),
            forest,
            metadata: TrainingMetadata::now(train_rows.len(), test_rows.len(), self.config.seed, stratified),
        };

        let holdout: Vec<PerformanceRecord> = test_rows.iter().map(|&i| records[i].clone()).collect();
        let mut report = self.evaluate(&model, &holdout)?;

        let train_counts = class_counts(&train_y, labels.len());
        let unseen: Vec<String> = labels
            .iter()
            .zip(&train_counts)
            .filter(|(_, count)| **count == 0)
            .map(|(l, _)| l.clone())
            .collect();
        if !unseen.is_empty() {
            warn!("Labels absent from the training split: {:?}", unseen);
            warnings.push(TrainingWarning::UnseenInTraining { labels: unseen });
        }
        warnings.append(&mut report.warnings);
        report.warnings = warnings;

        info!("Holdout accuracy: {:.3} on {} samples", report.accuracy, holdout.len());
        Ok(TrainingOutcome { model, report })
    }

    /// Runs `model` over labelled `holdout` records.
    ///
    /// Labels the model does not know count as misses. An empty holdout
    /// yields a report with an `EmptyHoldout` warning rather than an error.
    ///
    /// # Errors
    /// - `PredictionError` if the model cannot score an encoded record
    pub fn evaluate(&self, model: &TrainedModel, holdout: &[PerformanceRecord]) -> Result<EvaluationReport, EngineError> {
        let mut examples = Vec::with_capacity(holdout.len());
        for record in holdout {
            let prediction = predict_with(model, &self.encoder.encode_record(record))?;
            examples.push(EvaluatedExample {
                partner_id: record.partner_id.clone(),
                product_type: record.product_type.clone(),
                attempts: record.attempts,
                successes: record.successes,
                expected: record.last_weak_topic.clone(),
                predicted: prediction.topic,
                confidence: prediction.confidence,
            });
        }

        let mut warnings = Vec::new();
        if examples.is_empty() {
            warn!("Holdout split is empty; skipping metrics");
            warnings.push(TrainingWarning::EmptyHoldout);
        }

        let correct = examples.iter().filter(|e| e.expected == e.predicted).count();
        let accuracy = if examples.is_empty() {
            0.0
        } else {
            correct as f64 / examples.len() as f64
        };

        let per_class = model
            .labels
            .iter()
            .map(|label| class_metrics(label, &examples))
            .collect();

        Ok(EvaluationReport {
            accuracy,
            per_class,
            examples,
            warnings,
        })
    }

    /// Trains and persists in one step. Nothing is written if training fails.
    ///
    /// # Errors
    /// - `DataError` from [`Trainer::train`]
    /// - `PersistenceError` if the artifact cannot be written
    pub fn train_and_save<P: AsRef<Path>>(
        &self,
        records: &[PerformanceRecord],
        path: P,
    ) -> Result<TrainingOutcome, EngineError> {
        let outcome = self.train(records)?;
        artifact::save_model(&outcome.model, path)?;
        Ok(outcome)
    }

    fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.config.n_trees,
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            bootstrap: self.config.bootstrap,
            seed: self.config.seed,
        }
    }

    fn validate_dataset(records: &[PerformanceRecord], min_rows: usize) -> Result<(), EngineError> {
        if records.is_empty() {
            return Err(EngineError::DataError("Training data is empty".into()));
        }
        if records.len() < min_rows {
            return Err(EngineError::DataError(format!(
                "Not enough valid data rows ({}) for training (minimum {})",
                records.len(),
                min_rows
            )));
        }
        let first = &records[0].last_weak_topic;
        if records.iter().all(|r| &r.last_weak_topic == first) {
            return Err(EngineError::DataError(format!(
                "Training data has a single weak topic ('{}'); the classifier cannot discriminate",
                first
            )));
        }
        Ok(())
    }

    fn validate_config(config: &TrainerConfig) -> Result<(), EngineError> {
        if config.n_trees == 0 {
            return Err(EngineError::ValidationError("Forest needs at least one tree".into()));
        }
        if !(config.test_size > 0.0 && config.test_size < 1.0) {
            return Err(EngineError::ValidationError(format!(
                "Holdout fraction must be between 0 and 1, got {}",
                config.test_size
            )));
        }
        if config.max_depth == Some(0) {
            return Err(EngineError::ValidationError("Max depth must be positive".into()));
        }
        if config.stratify_splits < 2 {
            return Err(EngineError::ValidationError(format!(
                "Stratification needs at least 2 splits, got {}",
                config.stratify_splits
            )));
        }
        Ok(())
    }
}

fn select_rows(features: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    let mut selected = Array2::zeros((rows.len(), FEATURE_VECTOR_SIZE));
    for (out, &row) in rows.iter().enumerate() {
        selected.row_mut(out).assign(&features.row(row));
    }
    selected
}

fn class_metrics(label: &str, examples: &[EvaluatedExample]) -> ClassMetrics {
    let tp = examples.iter().filter(|e| e.expected == label && e.predicted == label).count();
    let predicted = examples.iter().filter(|e| e.predicted == label).count();
    let support = examples.iter().filter(|e| e.expected == label).count();

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, predicted);
    let recall = ratio(tp, support);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    ClassMetrics {
        label: label.to_string(),
        precision,
        recall,
        f1,
        support,
    }
}

/// A builder for configuring a [`Trainer`] with a fluent interface.
#[derive(Debug, Clone, Default)]
pub struct TrainerBuilder {
    config: TrainerConfig,
}

impl TrainerBuilder {
    pub fn new() -> Self {
        Self {
            config: TrainerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TrainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_trees(mut self, n_trees: usize) -> Self {
        self.config.n_trees = n_trees;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = Some(max_depth);
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.config.test_size = test_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_min_rows(mut self, min_rows: usize) -> Self {
        self.config.min_rows = min_rows;
        self
    }

    pub fn with_stratify_splits(mut self, splits: usize) -> Self {
        self.config.stratify_splits = splits;
        self
    }

    pub fn without_bootstrap(mut self) -> Self {
        self.config.bootstrap = false;
        self
    }

    /// # Errors
    /// - `ValidationError` if any setting is out of range
    pub fn build(self) -> Result<Trainer, EngineError> {
        Trainer::new(self.config)
    }
}
