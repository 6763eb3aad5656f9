use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use super::error::EngineError;
use super::features::{FeatureVector, FEATURE_VECTOR_SIZE};
use super::model::{RandomForest, TrainedModel};
use crate::artifact;

/// Outcome of a single weak-topic prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub topic: String,
    /// Share of the forest's probability mass on `topic`, in `[0, 1]`. Advisory only.
    pub confidence: f32,
    pub scores: HashMap<String, f32>,
}

/// Anything that can map a feature vector to a weak topic.
///
/// The resolver only depends on this trait, so tests can inject fixed or
/// failing predictors.
pub trait WeaknessPredictor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, EngineError>;
}

/// The serving wrapper around a persisted [`TrainedModel`].
///
/// # Thread Safety
///
/// The model is held behind an `Arc` and never mutated after load, so one
/// `Classifier` can be shared across every request thread:
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use microcoach::{Classifier, FeatureEncoder, WeaknessPredictor, FEATURE_SCHEMA_VERSION};
/// use std::sync::Arc;
/// use std::thread;
///
/// let classifier = Arc::new(Classifier::load("models/weakness_classifier.json", FEATURE_SCHEMA_VERSION)?);
/// let features = FeatureEncoder::new().encode("loan", 10, 2);
///
/// let shared = Arc::clone(&classifier);
/// thread::spawn(move || {
///     let prediction = shared.predict(&features).unwrap();
///     println!("{} ({:.2})", prediction.topic, prediction.confidence);
/// });
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Classifier {
    model_path: PathBuf,
    model: Arc<TrainedModel>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl Classifier {
    /// Loads an artifact and checks it was trained against `expected_schema`.
    ///
    /// # Errors
    /// - `ModelNotFound` if the artifact is absent
    /// - `SchemaMismatch` if the artifact's feature schema differs from `expected_schema`
    /// - `ChecksumMismatch` / `PersistenceError` if the artifact is damaged
    pub fn load<P: AsRef<Path>>(path: P, expected_schema: &str) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let model = artifact::load_model(path)?;
        let classifier = Self::from_model(model, expected_schema)?;
        let classifier = Self {
            model_path: path.to_path_buf(),
            ..classifier
        };
        info!(
            "Loaded weakness classifier from {:?} ({} labels, schema {})",
            path,
            classifier.model.labels.len(),
            classifier.model.schema_version
        );
        Ok(classifier)
    }

    /// Wraps an in-memory model, applying the same schema check as [`Classifier::load`].
    pub fn from_model(model: TrainedModel, expected_schema: &str) -> Result<Self, EngineError> {
        if model.schema_version != expected_schema {
            return Err(EngineError::SchemaMismatch {
                expected: expected_schema.to_string(),
                found: model.schema_version,
            });
        }
        Ok(Self {
            model_path: PathBuf::new(),
            model: Arc::new(model),
        })
    }

    /// Returns information about the loaded model
    pub fn info(&self) -> super::ClassifierInfo {
        super::ClassifierInfo {
            model_path: self.model_path.display().to_string(),
            schema_version: self.model.schema_version.clone(),
            labels: self.model.labels.clone(),
            feature_names: self.model.feature_names.clone(),
            num_trees: self.model.forest.n_trees(),
            max_tree_depth: self.model.forest.max_depth(),
            train_samples: self.model.metadata.train_samples,
            created_at: self.model.metadata.created_at,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.model.labels
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }
}

impl WeaknessPredictor for Classifier {
    /// Predicts the weak topic for an encoded record.
    ///
    /// # Errors
    /// - `PredictionError` if the vector width differs from the model's or holds non-finite values
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, EngineError> {
        predict_with(&self.model, features)
    }
}

pub(crate) fn predict_with(model: &TrainedModel, features: &FeatureVector) -> Result<Prediction, EngineError> {
    let expected = model.forest.n_features();
    if features.len() != expected || features.len() != FEATURE_VECTOR_SIZE {
        return Err(EngineError::PredictionError(format!(
            "Expected {} features, got {}",
            expected,
            features.len()
        )));
    }
    if features.as_array().iter().any(|v| !v.is_finite()) {
        return Err(EngineError::PredictionError("Feature vector holds non-finite values".into()));
    }

    let proba = model.forest.predict_proba(features.as_array().view());
    let (best, confidence) = RandomForest::best_class(&proba);
    let topic = model
        .label(best)
        .ok_or_else(|| EngineError::PredictionError(format!("Class index {} has no label", best)))?
        .to_string();

    let scores = model
        .labels
        .iter()
        .zip(proba.iter())
        .map(|(label, &p)| (label.clone(), p as f32))
        .collect();

    Ok(Prediction {
        topic,
        confidence: confidence.clamp(0.0, 1.0) as f32,
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::features::{FeatureEncoder, FEATURE_SCHEMA_VERSION};
    use crate::classifier::trainer::Trainer;
    use crate::store::PerformanceRecord;

    fn records() -> Vec<PerformanceRecord> {
        let mut records = Vec::new();
        for i in 0..6 {
            records.push(PerformanceRecord::new(format!("L{}", i), "loan", 10 + i, 1 + i % 2, "emi_calculation").unwrap());
            records.push(PerformanceRecord::new(format!("I{}", i), "insurance", 10 + i, 8 + i % 2, "insurance_claim_process").unwrap());
        }
        records
    }

    fn trained() -> TrainedModel {
        Trainer::builder().with_trees(10).build().unwrap().train(&records()).unwrap().model
    }

    #[test]
    fn test_schema_mismatch_is_refused() {
        let err = Classifier::from_model(trained(), "product-ordinal/v0").unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_predict_returns_known_label_with_bounded_confidence() {
        let classifier = Classifier::from_model(trained(), FEATURE_SCHEMA_VERSION).unwrap();
        let prediction = classifier
            .predict(&FeatureEncoder::new().encode("insurance", 12, 9))
            .unwrap();
        assert_eq!(prediction.topic, "insurance_claim_process");
        assert!((0.0..=1.0).contains(&prediction.confidence));
        assert_eq!(prediction.scores.len(), 2);
    }

    #[test]
    fn test_confidence_is_the_winning_score() {
        let model = trained();
        let features = FeatureEncoder::new().encode("loan", 11, 1);
        let prediction = predict_with(&model, &features).unwrap();

        let (best, proba) = model.forest.predict(features.as_array().view());
        assert_eq!(model.label(best), Some(prediction.topic.as_str()));
        assert_eq!(prediction.confidence, proba as f32);
        assert_eq!(prediction.scores[&prediction.topic], prediction.confidence);
    }

    #[test]
    fn test_wrong_width_is_prediction_error() {
        let classifier = Classifier::from_model(trained(), FEATURE_SCHEMA_VERSION).unwrap();
        let err = classifier.predict(&FeatureVector::from_values(vec![1.0, 2.0])).unwrap_err();
        assert!(matches!(err, EngineError::PredictionError(_)));
    }

    #[test]
    fn test_info() {
        let classifier = Classifier::from_model(trained(), FEATURE_SCHEMA_VERSION).unwrap();
        let info = classifier.info();
        assert_eq!(info.num_trees, 10);
        assert_eq!(info.labels.len(), 2);
        assert_eq!(info.schema_version, FEATURE_SCHEMA_VERSION);
    }
}
