use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::classifier::EngineError;

/// Key of the catalog's fallback entry. Topic labels are snake_case words,
/// so a double-underscore sentinel cannot collide with one.
pub const DEFAULT_TOPIC_KEY: &str = "__default__";

/// A micro-training action for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub video: String,
    pub tip: String,
    pub next_step: String,
}

impl Recommendation {
    pub fn new(video: impl Into<String>, tip: impl Into<String>, next_step: impl Into<String>) -> Self {
        Self {
            video: video.into(),
            tip: tip.into(),
            next_step: next_step.into(),
        }
    }
}

/// Static mapping from topic key to coaching content, plus a default entry.
///
/// Built once at start-up and shared read-only afterwards; there is no way
/// to mutate a catalog after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentCatalog {
    entries: HashMap<String, Recommendation>,
    default: Recommendation,
}

impl ContentCatalog {
    /// Creates a catalog from explicit entries. Keys are matched exactly.
    ///
    /// # Errors
    /// - `ValidationError` if an entry uses the default sentinel as its key
    /// - `ValidationError` if any entry has an empty field
    pub fn new(
        entries: impl IntoIterator<Item = (String, Recommendation)>,
        default: Recommendation,
    ) -> Result<Self, EngineError> {
        let mut map = HashMap::new();
        for (topic, recommendation) in entries {
            if topic == DEFAULT_TOPIC_KEY {
                return Err(EngineError::ValidationError(format!(
                    "'{}' is reserved for the default entry",
                    DEFAULT_TOPIC_KEY
                )));
            }
            Self::validate_entry(&topic, &recommendation)?;
            map.insert(topic, recommendation);
        }
        Self::validate_entry(DEFAULT_TOPIC_KEY, &default)?;
        Ok(Self { entries: map, default })
    }

    /// Loads a catalog from a JSON object of `topic -> {video, tip, next_step}`.
    /// The object must contain a `__default__` entry.
    ///
    /// # Errors
    /// - `ValidationError` if the file is unreadable, malformed or lacks a default entry
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::ValidationError(format!("Failed to read catalog {:?}: {}", path, e)))?;
        let catalog = Self::from_json_str(&text)?;
        info!("Loaded content catalog from {:?} ({} topics)", path, catalog.len());
        Ok(catalog)
    }

    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        let mut entries: HashMap<String, Recommendation> = serde_json::from_str(text)
            .map_err(|e| EngineError::ValidationError(format!("Malformed catalog: {}", e)))?;
        let default = entries.remove(DEFAULT_TOPIC_KEY).ok_or_else(|| {
            EngineError::ValidationError(format!("Catalog has no '{}' entry", DEFAULT_TOPIC_KEY))
        })?;
        Self::new(entries, default)
    }

    /// Coaching content shipped with the crate: one entry per known weak
    /// topic, one per product line and the generic default.
    pub fn builtin() -> Self {
        let entry = |topic: &str, video: &str, tip: &str, next_step: &str| {
            (
                topic.to_string(),
                Recommendation::new(format!("https://www.youtube.com/watch?v={}", video), tip, next_step),
            )
        };
        let entries = vec![
            entry(
                "emi_calculation",
                "emi_calculation_video",
                "Walk customers through EMI figures with a worked example before quoting a rate.",
                "Calculate the EMI for three sample loan amounts and tenures.",
            ),
            entry(
                "loan_closing_technique",
                "loan_closing_video",
                "Master the art of closing loan deals with these proven techniques.",
                "Practice these closing questions with a colleague.",
            ),
            entry(
                "loan_application_process",
                "loan_application_video",
                "Guide clients smoothly through the loan application process.",
                "Create a checklist for the loan application steps.",
            ),
            entry(
                "loan_eligibility_criteria",
                "loan_eligibility_video",
                "Understand and explain loan eligibility criteria accurately.",
                "Review the eligibility criteria for three different loan products.",
            ),
            entry(
                "loan_negotiation_skills",
                "loan_negotiation_video",
                "Improve your negotiation skills for loan terms and conditions.",
                "Identify three negotiation points for a loan scenario.",
            ),
            entry(
                "insurance_objection_handling",
                "insurance_objection_video",
                "Learn to effectively handle common objections when selling insurance.",
                "Role-play an objection scenario for an insurance product.",
            ),
            entry(
                "insurance_policy_comparison",
                "insurance_compare_video",
                "Help clients compare insurance policies to find the best fit.",
                "Compare two similar insurance policies and highlight differences.",
            ),
            entry(
                "insurance_product_knowledge",
                "insurance_knowledge_video",
                "Deepen your understanding of our insurance product details.",
                "Study the product brochure for a new insurance policy.",
            ),
            entry(
                "insurance_claim_process",
                "insurance_claim_video",
                "Assist clients efficiently through the insurance claim process.",
                "Outline the steps for a typical insurance claim.",
            ),
            entry(
                "credit_card_benefits_explaining",
                "cc_benefits_video",
                "Clearly articulate the unique benefits of our credit card offers.",
                "List 3 key benefits for each credit card you offer.",
            ),
            entry(
                "credit_card_sales_pitch",
                "cc_pitch_video",
                "Craft a compelling sales pitch for credit cards.",
                "Record yourself delivering a credit card sales pitch.",
            ),
            entry(
                "loan",
                "loan_basics_video",
                "Lead with the customer's goal, then match it to the right loan product.",
                "Shadow a top partner on their next loan conversation.",
            ),
            entry(
                "insurance",
                "insurance_basics_video",
                "Frame insurance around the risks your customer already worries about.",
                "Write down the three most common risks your customers mention.",
            ),
            entry(
                "credit_card",
                "cc_basics_video",
                "Match the card to the customer's spending pattern, not the other way round.",
                "Map your last five customers to the card that best fits their spending.",
            ),
        ];
        let default = Recommendation::new(
            "https://www.youtube.com/watch?v=dummy_generic_video",
            "Always listen to your customer's needs first.",
            "Practice active listening in your next conversation.",
        );

        // The literal entries above are non-empty and never use the sentinel key.
        Self {
            entries: entries.into_iter().collect(),
            default,
        }
    }

    /// Exact-match lookup. `None` means the caller should use [`ContentCatalog::default_entry`].
    pub fn lookup(&self, topic: &str) -> Option<&Recommendation> {
        self.entries.get(topic)
    }

    pub fn default_entry(&self) -> &Recommendation {
        &self.default
    }

    /// Looks `topic` up, falling back to the default entry. The flag tells whether the topic matched.
    pub fn resolve(&self, topic: &str) -> (&Recommendation, bool) {
        match self.lookup(topic) {
            Some(recommendation) => (recommendation, true),
            None => (&self.default, false),
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    /// Labels from `labels` that have no catalog entry, in input order.
    pub fn missing_topics<'a>(&self, labels: &'a [String]) -> Vec<&'a str> {
        labels
            .iter()
            .filter(|label| !self.contains(label))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate_entry(topic: &str, recommendation: &Recommendation) -> Result<(), EngineError> {
        if topic.is_empty() {
            return Err(EngineError::ValidationError("Catalog topic cannot be empty".into()));
        }
        let fields = [
            ("video", &recommendation.video),
            ("tip", &recommendation.tip),
            ("next_step", &recommendation.next_step),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(EngineError::ValidationError(format!(
                "Catalog entry '{}' has an empty {}",
                topic, name
            )));
        }
        Ok(())
    }
}

impl Default for ContentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_product_types_and_default() {
        let catalog = ContentCatalog::builtin();
        for key in ["loan", "insurance", "credit_card", "emi_calculation"] {
            assert!(catalog.contains(key), "missing {}", key);
        }
        assert!(!catalog.contains(DEFAULT_TOPIC_KEY));
        assert!(catalog.default_entry().video.contains("generic"));
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let catalog = ContentCatalog::builtin();
        let (rec, matched) = catalog.resolve("underwater_basket_weaving");
        assert!(!matched);
        assert_eq!(rec, catalog.default_entry());

        let (rec, matched) = catalog.resolve("emi_calculation");
        assert!(matched);
        assert!(rec.video.contains("emi_calculation"));
    }

    #[test]
    fn test_json_catalog() {
        let json = r#"{
            "__default__": {"video": "https://v/default", "tip": "t", "next_step": "n"},
            "emi_calculation": {"video": "https://v/emi", "tip": "t", "next_step": "n"}
        }"#;
        let catalog = ContentCatalog::from_json_str(json).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.default_entry().video, "https://v/default");
        assert_eq!(catalog.lookup("emi_calculation").unwrap().video, "https://v/emi");
    }

    #[test]
    fn test_json_catalog_requires_default() {
        let json = r#"{"loan": {"video": "v", "tip": "t", "next_step": "n"}}"#;
        assert!(matches!(
            ContentCatalog::from_json_str(json),
            Err(EngineError::ValidationError(_))
        ));
    }

    #[test]
    fn test_sentinel_and_empty_fields_rejected() {
        let rec = Recommendation::new("v", "t", "n");
        assert!(ContentCatalog::new(vec![(DEFAULT_TOPIC_KEY.to_string(), rec.clone())], rec.clone()).is_err());
        assert!(ContentCatalog::new(vec![("loan".to_string(), Recommendation::new("v", " ", "n"))], rec).is_err());
    }

    #[test]
    fn test_missing_topics() {
        let catalog = ContentCatalog::builtin();
        let labels = vec!["emi_calculation".to_string(), "kyc_documentation".to_string()];
        assert_eq!(catalog.missing_topics(&labels), vec!["kyc_documentation"]);
    }
}
