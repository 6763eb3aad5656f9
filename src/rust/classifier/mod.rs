pub mod classifier;
pub mod error;
pub mod features;
pub mod model;
pub mod trainer;
mod tree;
mod utils;

pub use classifier::{Classifier, Prediction, WeaknessPredictor};
pub use error::EngineError;
pub use features::{FeatureEncoder, FeatureVector, ProductType, FEATURE_SCHEMA_VERSION};
pub use model::{ForestParams, RandomForest, TrainedModel, TrainingMetadata};
pub use trainer::{EvaluationReport, Trainer, TrainerBuilder, TrainingOutcome, TrainingWarning};

/// Information about a loaded weakness classifier
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ClassifierInfo {
    /// Path the artifact was loaded from; empty for in-memory models
    pub model_path: String,
    /// Feature schema the model was trained against
    pub schema_version: String,
    /// Topic labels, in class-index order
    pub labels: Vec<String>,
    /// Names of the input features
    pub feature_names: Vec<String>,
    /// Number of trees in the forest
    pub num_trees: usize,
    /// Depth of the deepest tree
    pub max_tree_depth: usize,
    /// Rows the model was fit on
    pub train_samples: usize,
    /// Seconds since the Unix epoch
    pub created_at: u64,
}
