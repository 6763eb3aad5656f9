use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::{ContentCatalog, Recommendation};
use crate::classifier::{Classifier, ClassifierInfo, EngineError, WeaknessPredictor};
use crate::config::EngineConfig;
use crate::resolver::{RecommendationResolver, Resolution};
use crate::store::{InMemoryPerformanceStore, PerformanceStore};

/// Inbound recommendation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendRequest {
    #[serde(alias = "gp_id")]
    pub partner_id: String,
    pub product_type: String,
}

impl RecommendRequest {
    pub fn new(partner_id: impl Into<String>, product_type: impl Into<String>) -> Self {
        Self {
            partner_id: partner_id.into(),
            product_type: product_type.into(),
        }
    }
}

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub video: String,
    pub tip: String,
    pub next_step: String,
}

impl From<Recommendation> for RecommendResponse {
    fn from(recommendation: Recommendation) -> Self {
        Self {
            video: recommendation.video,
            tip: recommendation.tip,
            next_step: recommendation.next_step,
        }
    }
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<EngineError> for ErrorResponse {
    fn from(error: EngineError) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// A serving process: store snapshot, catalog and, when available, a classifier.
///
/// Everything is loaded once; requests only read shared state, so an `Engine`
/// can be wrapped in an `Arc` and used from any number of threads.
pub struct Engine {
    resolver: RecommendationResolver,
    classifier_info: Option<ClassifierInfo>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Engine>();
    }
};

impl Engine {
    /// Performs process start-up from `config`.
    ///
    /// No classifier failure is fatal: a missing, mismatched, tampered or
    /// undecodable artifact is logged and the engine serves product-type
    /// fallbacks only.
    ///
    /// # Errors
    /// - `DataError` if the performance dataset cannot be read
    /// - `ValidationError` if the catalog file is invalid
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let store = InMemoryPerformanceStore::from_csv_path(&config.data_path)?;
        info!(
            "Loaded {} performance records for {} partners",
            store.len(),
            store.partner_count()
        );

        let catalog = match &config.catalog_path {
            Some(path) => ContentCatalog::from_json_file(path)?,
            None => ContentCatalog::builtin(),
        };

        let classifier = match Classifier::load(&config.model_path, &config.feature_schema_version) {
            Ok(classifier) => Some(classifier),
            Err(e) if e.is_model_unavailable() => {
                warn!("Classifier unavailable, serving fallbacks only: {}", e);
                None
            }
            Err(e) => {
                error!("Classifier artifact unreadable, serving fallbacks only: {}", e);
                None
            }
        };

        Self::new(Arc::new(store), Arc::new(catalog), classifier, config.min_confidence)
    }

    /// Builds an engine from already-loaded parts.
    ///
    /// # Errors
    /// - `ValidationError` if `min_confidence` is outside `[0, 1]`
    pub fn new(
        store: Arc<dyn PerformanceStore>,
        catalog: Arc<ContentCatalog>,
        classifier: Option<Classifier>,
        min_confidence: Option<f32>,
    ) -> Result<Self, EngineError> {
        let classifier_info = classifier.as_ref().map(Classifier::info);
        if let Some(info) = &classifier_info {
            let missing = catalog.missing_topics(&info.labels);
            if !missing.is_empty() {
                warn!("Catalog has no entry for topics {:?}; they will get the default entry", missing);
            }
        }

        let mut builder = RecommendationResolver::builder(store, catalog)
            .with_optional_classifier(classifier.map(|c| Arc::new(c) as Arc<dyn WeaknessPredictor>));
        if let Some(threshold) = min_confidence {
            builder = builder.with_min_confidence(threshold);
        }

        Ok(Self {
            resolver: builder.build()?,
            classifier_info,
        })
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier_info.is_some()
    }

    pub fn classifier_info(&self) -> Option<&ClassifierInfo> {
        self.classifier_info.as_ref()
    }

    pub fn resolver(&self) -> &RecommendationResolver {
        &self.resolver
    }

    /// Resolves with full provenance.
    pub fn recommend(&self, partner_id: &str, product_type: &str) -> Result<Resolution, EngineError> {
        self.resolver.resolve(partner_id, product_type)
    }

    /// Request boundary: a malformed request is the only error outcome.
    pub fn handle(&self, request: &RecommendRequest) -> Result<RecommendResponse, ErrorResponse> {
        let resolution = self
            .recommend(&request.partner_id, &request.product_type)
            .map_err(ErrorResponse::from)?;
        Ok(resolution.recommendation.into())
    }
}
