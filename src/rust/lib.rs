//! Predicts a sales partner's weakest topic on a product line from their
//! historical performance and maps it to a micro-training recommendation.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use microcoach::{
//!     Classifier, ContentCatalog, Engine, InMemoryPerformanceStore, PerformanceRecord,
//!     Trainer, FEATURE_SCHEMA_VERSION,
//! };
//! use std::sync::Arc;
//!
//! let mut records = Vec::new();
//! for i in 0..12u32 {
//!     let (product, topic) = if i % 2 == 0 {
//!         ("loan", "emi_calculation")
//!     } else {
//!         ("insurance", "insurance_claim_process")
//!     };
//!     records.push(PerformanceRecord::new(format!("GP{:03}", i), product, 10, i % 5, topic)?);
//! }
//!
//! let outcome = Trainer::builder().with_trees(10).build()?.train(&records)?;
//! println!("{}", outcome.report.classification_report());
//!
//! let classifier = Classifier::from_model(outcome.model, FEATURE_SCHEMA_VERSION)?;
//! let engine = Engine::new(
//!     Arc::new(InMemoryPerformanceStore::from_records(records)),
//!     Arc::new(ContentCatalog::builtin()),
//!     Some(classifier),
//!     None,
//! )?;
//!
//! let resolution = engine.recommend("GP000", "loan")?;
//! println!("{} via {}", resolution.recommendation.video, resolution.source.as_str());
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! An [`Engine`] only reads shared state after start-up and can be shared across threads using `Arc`:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use microcoach::{ContentCatalog, Engine, InMemoryPerformanceStore, RecommendRequest};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let engine = Arc::new(Engine::new(
//!     Arc::new(InMemoryPerformanceStore::default()),
//!     Arc::new(ContentCatalog::builtin()),
//!     None,
//!     None,
//! )?);
//!
//! let mut handles = vec![];
//! for i in 0..3 {
//!     let engine = Arc::clone(&engine);
//!     handles.push(thread::spawn(move || {
//!         engine.handle(&RecommendRequest::new(format!("GP{}", i), "loan")).unwrap();
//!     }));
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod resolver;
pub mod store;

pub use catalog::{ContentCatalog, Recommendation, DEFAULT_TOPIC_KEY};
pub use classifier::{
    Classifier, ClassifierInfo, EngineError, EvaluationReport, FeatureEncoder, FeatureVector, Prediction,
    ProductType, TrainedModel, Trainer, TrainerBuilder, TrainingOutcome, TrainingWarning, WeaknessPredictor,
    FEATURE_SCHEMA_VERSION,
};
pub use config::{EngineConfig, TrainerConfig};
pub use engine::{Engine, ErrorResponse, RecommendRequest, RecommendResponse};
pub use resolver::{RecommendationResolver, RecommendationSource, Resolution, ResolutionStrategy};
pub use store::{InMemoryPerformanceStore, PerformanceRecord, PerformanceStore};

pub fn init_logger() {
    env_logger::init();
}
