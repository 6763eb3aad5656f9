use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::catalog::{ContentCatalog, Recommendation};
use crate::classifier::features::{normalize_product_type, FeatureEncoder};
use crate::classifier::{EngineError, WeaknessPredictor};
use crate::store::PerformanceStore;

/// Which path produced the topic that was looked up in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// The classifier predicted the weak topic
    Model,
    /// No history for the partner on this product; keyed by product type
    NoRecord,
    /// No classifier was loaded at start-up; keyed by product type
    ModelUnavailable,
    /// The classifier failed on this request; keyed by product type
    PredictionFailed,
    /// The prediction fell under the configured confidence floor; keyed by product type
    LowConfidence,
}

impl RecommendationSource {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, RecommendationSource::Model)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationSource::Model => "model",
            RecommendationSource::NoRecord => "no_record",
            RecommendationSource::ModelUnavailable => "model_unavailable",
            RecommendationSource::PredictionFailed => "prediction_failed",
            RecommendationSource::LowConfidence => "low_confidence",
        }
    }
}

/// A recommendation plus how it was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub recommendation: Recommendation,
    pub source: RecommendationSource,
    /// The topic key that was looked up
    pub topic: String,
    /// False when the topic had no catalog entry and the default entry was returned
    pub matched_topic: bool,
    /// Classifier confidence whenever a prediction was made, including one
    /// rejected by the confidence floor
    pub confidence: Option<f32>,
}

impl Resolution {
    pub fn used_default_content(&self) -> bool {
        !self.matched_topic
    }
}

/// A normalized `(partner, product)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub partner_id: String,
    pub product_type: String,
}

impl ResolveRequest {
    /// # Errors
    /// - `ValidationError` if either field is empty or whitespace
    pub fn new(partner_id: &str, product_type: &str) -> Result<Self, EngineError> {
        let partner_id = partner_id.trim();
        let product_type = normalize_product_type(product_type);
        if partner_id.is_empty() || product_type.is_empty() {
            return Err(EngineError::ValidationError(
                "Missing 'partner_id' or 'product_type' in request".into(),
            ));
        }
        Ok(Self {
            partner_id: partner_id.to_string(),
            product_type,
        })
    }
}

/// What a strategy concluded for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Use this topic
    Topic {
        topic: String,
        source: RecommendationSource,
        confidence: Option<f32>,
    },
    /// No decision; the reason is handed to the next strategy. `confidence`
    /// keeps the score of a prediction that was made but not used.
    Pass {
        reason: RecommendationSource,
        confidence: Option<f32>,
    },
}

impl Decision {
    pub fn pass(reason: RecommendationSource) -> Self {
        Decision::Pass {
            reason,
            confidence: None,
        }
    }
}

/// One link of the resolution chain.
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `declined` is the reason the previous strategy passed, if any.
    fn decide(&self, request: &ResolveRequest, declined: Option<RecommendationSource>) -> Decision;
}

/// History lookup followed by classifier inference.
pub struct ModelStrategy {
    store: Arc<dyn PerformanceStore>,
    classifier: Option<Arc<dyn WeaknessPredictor>>,
    encoder: FeatureEncoder,
    min_confidence: Option<f32>,
}

impl ModelStrategy {
    pub fn new(
        store: Arc<dyn PerformanceStore>,
        classifier: Option<Arc<dyn WeaknessPredictor>>,
        min_confidence: Option<f32>,
    ) -> Self {
        Self {
            store,
            classifier,
            encoder: FeatureEncoder::new(),
            min_confidence,
        }
    }
}

impl ResolutionStrategy for ModelStrategy {
    fn name(&self) -> &'static str {
        "model"
    }

    fn decide(&self, request: &ResolveRequest, _declined: Option<RecommendationSource>) -> Decision {
        let Some(record) = self.store.latest_record(&request.partner_id, &request.product_type) else {
            return Decision::pass(RecommendationSource::NoRecord);
        };
        let Some(classifier) = &self.classifier else {
            return Decision::pass(RecommendationSource::ModelUnavailable);
        };

        let features = self.encoder.encode_record(&record);
        match classifier.predict(&features) {
            Ok(prediction) => {
                debug!(
                    "Predicted weak topic for {} ({}): {} ({:.2})",
                    request.partner_id, request.product_type, prediction.topic, prediction.confidence
                );
                if let Some(floor) = self.min_confidence {
                    if prediction.confidence < floor {
                        return Decision::Pass {
                            reason: RecommendationSource::LowConfidence,
                            confidence: Some(prediction.confidence),
                        };
                    }
                }
                Decision::Topic {
                    topic: prediction.topic,
                    source: RecommendationSource::Model,
                    confidence: Some(prediction.confidence),
                }
            }
            Err(e) => {
                warn!(
                    "Prediction failed for {} ({}): {}",
                    request.partner_id, request.product_type, e
                );
                Decision::pass(RecommendationSource::PredictionFailed)
            }
        }
    }
}

/// Terminal strategy: key the catalog by the raw product type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductTypeStrategy;

impl ResolutionStrategy for ProductTypeStrategy {
    fn name(&self) -> &'static str {
        "product_type"
    }

    fn decide(&self, request: &ResolveRequest, declined: Option<RecommendationSource>) -> Decision {
        Decision::Topic {
            topic: request.product_type.clone(),
            source: declined.unwrap_or(RecommendationSource::ModelUnavailable),
            confidence: None,
        }
    }
}

/// Resolves `(partner, product)` pairs to recommendations through an ordered
/// chain of strategies, then the content catalog.
///
/// Every well-formed request ends in a [`Resolution`]: if the chain yields no
/// topic, or the topic is not in the catalog, the catalog's default entry is used.
pub struct RecommendationResolver {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
    catalog: Arc<ContentCatalog>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<RecommendationResolver>();
    }
};

impl RecommendationResolver {
    pub fn builder(store: Arc<dyn PerformanceStore>, catalog: Arc<ContentCatalog>) -> ResolverBuilder {
        ResolverBuilder::new(store, catalog)
    }

    /// Uses a custom strategy chain, tried in order.
    pub fn from_strategies(strategies: Vec<Box<dyn ResolutionStrategy>>, catalog: Arc<ContentCatalog>) -> Self {
        Self { strategies, catalog }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    /// Resolves a recommendation for the partner on the product line.
    ///
    /// # Errors
    /// - `ValidationError` if either argument is empty; nothing else fails
    pub fn resolve(&self, partner_id: &str, product_type: &str) -> Result<Resolution, EngineError> {
        let request = ResolveRequest::new(partner_id, product_type)?;
        Ok(self.resolve_request(&request))
    }

    pub fn resolve_request(&self, request: &ResolveRequest) -> Resolution {
        let mut declined = None;
        let mut declined_confidence = None;
        let mut chosen = None;
        for strategy in &self.strategies {
            match strategy.decide(request, declined) {
                Decision::Topic {
                    topic,
                    source,
                    confidence,
                } => {
                    debug!("Strategy '{}' chose topic '{}'", strategy.name(), topic);
                    chosen = Some((topic, source, confidence));
                    break;
                }
                Decision::Pass { reason, confidence } => {
                    debug!("Strategy '{}' passed: {}", strategy.name(), reason.as_str());
                    declined = Some(reason);
                    declined_confidence = confidence.or(declined_confidence);
                }
            }
        }

        let (topic, source, confidence) = chosen.unwrap_or_else(|| {
            (
                request.product_type.clone(),
                declined.unwrap_or(RecommendationSource::ModelUnavailable),
                None,
            )
        });
        let confidence = confidence.or(declined_confidence);
        if source.is_fallback() {
            warn!(
                "Falling back to product type '{}' for {} ({})",
                request.product_type,
                request.partner_id,
                source.as_str()
            );
        }

        let (recommendation, matched_topic) = self.catalog.resolve(&topic);
        if !matched_topic {
            warn!("Topic '{}' has no catalog entry; using the default entry", topic);
        }

        Resolution {
            recommendation: recommendation.clone(),
            source,
            topic,
            matched_topic,
            confidence,
        }
    }
}

/// Assembles the default chain: model prediction, then product type.
pub struct ResolverBuilder {
    store: Arc<dyn PerformanceStore>,
    catalog: Arc<ContentCatalog>,
    classifier: Option<Arc<dyn WeaknessPredictor>>,
    min_confidence: Option<f32>,
}

impl ResolverBuilder {
    pub fn new(store: Arc<dyn PerformanceStore>, catalog: Arc<ContentCatalog>) -> Self {
        Self {
            store,
            catalog,
            classifier: None,
            min_confidence: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn WeaknessPredictor>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets the classifier only when one is available.
    pub fn with_optional_classifier(mut self, classifier: Option<Arc<dyn WeaknessPredictor>>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Predictions with confidence below `threshold` fall back to the product type.
    pub fn with_min_confidence(mut self, threshold: f32) -> Self {
        self.min_confidence = Some(threshold);
        self
    }

    /// # Errors
    /// - `ValidationError` if the confidence threshold is outside `[0, 1]`
    pub fn build(self) -> Result<RecommendationResolver, EngineError> {
        if let Some(threshold) = self.min_confidence {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(EngineError::ValidationError(format!(
                    "Confidence threshold must be within [0, 1], got {}",
                    threshold
                )));
            }
        }
        let strategies: Vec<Box<dyn ResolutionStrategy>> = vec![
            Box::new(ModelStrategy::new(self.store, self.classifier, self.min_confidence)),
            Box::new(ProductTypeStrategy),
        ];
        Ok(RecommendationResolver::from_strategies(strategies, self.catalog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{FeatureVector, Prediction};
    use crate::store::{InMemoryPerformanceStore, PerformanceRecord};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPredictor {
        topic: &'static str,
        confidence: f32,
        calls: AtomicUsize,
    }

    impl FixedPredictor {
        fn new(topic: &'static str, confidence: f32) -> Arc<Self> {
            Arc::new(Self {
                topic,
                confidence,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl WeaknessPredictor for FixedPredictor {
        fn predict(&self, _features: &FeatureVector) -> Result<Prediction, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Prediction {
                topic: self.topic.to_string(),
                confidence: self.confidence,
                scores: HashMap::new(),
            })
        }
    }

    struct FailingPredictor;

    impl WeaknessPredictor for FailingPredictor {
        fn predict(&self, _features: &FeatureVector) -> Result<Prediction, EngineError> {
            Err(EngineError::PredictionError("model exploded".into()))
        }
    }

    fn store() -> Arc<dyn PerformanceStore> {
        Arc::new(InMemoryPerformanceStore::from_records(vec![
            PerformanceRecord::new("GP001", "loan", 10, 2, "emi_calculation").unwrap(),
        ]))
    }

    fn catalog() -> Arc<ContentCatalog> {
        Arc::new(ContentCatalog::builtin())
    }

    #[test]
    fn test_model_path() {
        let predictor = FixedPredictor::new("emi_calculation", 0.9);
        let resolver = RecommendationResolver::builder(store(), catalog())
            .with_classifier(predictor.clone())
            .build()
            .unwrap();

        let resolution = resolver.resolve("GP001", "Loan").unwrap();
        assert_eq!(resolution.source, RecommendationSource::Model);
        assert_eq!(resolution.topic, "emi_calculation");
        assert!(resolution.matched_topic);
        assert_eq!(resolution.confidence, Some(0.9));
        assert_eq!(predictor.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_record_never_calls_classifier() {
        let predictor = FixedPredictor::new("emi_calculation", 0.9);
        let resolver = RecommendationResolver::builder(store(), catalog())
            .with_classifier(predictor.clone())
            .build()
            .unwrap();

        let resolution = resolver.resolve("GP_UNKNOWN", "insurance").unwrap();
        assert_eq!(resolution.source, RecommendationSource::NoRecord);
        assert_eq!(resolution.topic, "insurance");
        assert_eq!(&resolution.recommendation, catalog().lookup("insurance").unwrap());
        assert_eq!(predictor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_model_unavailable() {
        let resolver = RecommendationResolver::builder(store(), catalog()).build().unwrap();
        let resolution = resolver.resolve("GP001", "loan").unwrap();
        assert_eq!(resolution.source, RecommendationSource::ModelUnavailable);
        assert_eq!(resolution.topic, "loan");
        assert_eq!(resolution.confidence, None);
    }

    #[test]
    fn test_prediction_failure_falls_back() {
        let resolver = RecommendationResolver::builder(store(), catalog())
            .with_classifier(Arc::new(FailingPredictor))
            .build()
            .unwrap();
        let resolution = resolver.resolve("GP001", "loan").unwrap();
        assert_eq!(resolution.source, RecommendationSource::PredictionFailed);
        assert_eq!(&resolution.recommendation, catalog().lookup("loan").unwrap());
    }

    #[test]
    fn test_unknown_topic_uses_default_entry() {
        let resolver = RecommendationResolver::builder(store(), catalog())
            .with_classifier(FixedPredictor::new("kyc_documentation", 0.8))
            .build()
            .unwrap();
        let resolution = resolver.resolve("GP001", "loan").unwrap();
        assert_eq!(resolution.source, RecommendationSource::Model);
        assert!(resolution.used_default_content());
        assert_eq!(&resolution.recommendation, catalog().default_entry());
    }

    #[test]
    fn test_confidence_floor() {
        let resolver = RecommendationResolver::builder(store(), catalog())
            .with_classifier(FixedPredictor::new("emi_calculation", 0.3))
            .with_min_confidence(0.5)
            .build()
            .unwrap();
        let resolution = resolver.resolve("GP001", "loan").unwrap();
        assert_eq!(resolution.source, RecommendationSource::LowConfidence);
        assert_eq!(resolution.topic, "loan");
        assert_eq!(resolution.confidence, Some(0.3));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result = RecommendationResolver::builder(store(), catalog())
            .with_min_confidence(1.5)
            .build();
        assert!(matches!(result, Err(EngineError::ValidationError(_))));
    }

    #[test]
    fn test_malformed_request() {
        let resolver = RecommendationResolver::builder(store(), catalog()).build().unwrap();
        assert!(matches!(resolver.resolve("", "loan"), Err(EngineError::ValidationError(_))));
        assert!(matches!(resolver.resolve("GP001", "  "), Err(EngineError::ValidationError(_))));
    }

    #[test]
    fn test_empty_chain_still_resolves() {
        let resolver = RecommendationResolver::from_strategies(Vec::new(), catalog());
        let resolution = resolver.resolve("GP001", "mutual_fund").unwrap();
        assert!(resolution.used_default_content());
        assert_eq!(resolution.source, RecommendationSource::ModelUnavailable);
    }

    #[test]
    fn test_default_chain_order() {
        let resolver = RecommendationResolver::builder(store(), catalog()).build().unwrap();
        assert_eq!(resolver.strategy_names(), vec!["model", "product_type"]);
    }
}
