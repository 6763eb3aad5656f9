use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::store::PerformanceRecord;

/// Tag stored in every trained artifact. Bump it whenever the category
/// universe, the field order or the numeric scaling below changes.
pub const FEATURE_SCHEMA_VERSION: &str = "product-onehot-counts/v1";

/// Width of every encoded feature vector.
pub const FEATURE_VECTOR_SIZE: usize = 7;

/// Column names in encoding order.
pub const FEATURE_NAMES: [&str; FEATURE_VECTOR_SIZE] = [
    "product_type=loan",
    "product_type=insurance",
    "product_type=credit_card",
    "product_type=other",
    "attempts",
    "successes",
    "success_rate",
];

/// Product lines known to the encoder. Anything else lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Loan,
    Insurance,
    CreditCard,
    Other,
}

impl ProductType {
    /// The category universe, in one-hot column order.
    pub const ALL: [ProductType; 4] = [
        ProductType::Loan,
        ProductType::Insurance,
        ProductType::CreditCard,
        ProductType::Other,
    ];

    /// Maps a raw product type string onto the category universe.
    /// Matching ignores case and surrounding whitespace; unknown values map to `Other`.
    pub fn parse(raw: &str) -> Self {
        match normalize_product_type(raw).as_str() {
            "loan" => ProductType::Loan,
            "insurance" => ProductType::Insurance,
            "credit_card" => ProductType::CreditCard,
            _ => ProductType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Loan => "loan",
            ProductType::Insurance => "insurance",
            ProductType::CreditCard => "credit_card",
            ProductType::Other => "other",
        }
    }

    fn column(&self) -> usize {
        match self {
            ProductType::Loan => 0,
            ProductType::Insurance => 1,
            ProductType::CreditCard => 2,
            ProductType::Other => 3,
        }
    }
}

/// Lowercases and trims a product type so the store, the encoder and the
/// catalog all agree on one spelling.
pub fn normalize_product_type(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A fixed-width numeric encoding of one performance record.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Array1<f64>);

impl FeatureVector {
    /// Wraps raw values. Used by callers that already hold encoded data,
    /// such as a persisted holdout set.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self(Array1::from(values))
    }

    pub fn as_array(&self) -> &Array1<f64> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }
}

/// Turns performance figures into feature vectors.
///
/// The encoder is stateless, so the trainer and the resolver always share
/// the same category ordering and scaling. Compatibility with a persisted
/// model is checked through [`FEATURE_SCHEMA_VERSION`].
///
/// Layout: one-hot product type (4 columns), raw attempts, raw successes,
/// success rate in `[0, 1]` (0 when there were no attempts).
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn schema_version(&self) -> &'static str {
        FEATURE_SCHEMA_VERSION
    }

    pub fn feature_names(&self) -> Vec<String> {
        FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
    }

    pub fn categories(&self) -> Vec<String> {
        ProductType::ALL.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Encodes one observation.
    ///
    /// `successes` is expected to be at most `attempts`; larger values are
    /// clamped so the success rate stays within `[0, 1]`.
    pub fn encode(&self, product_type: &str, attempts: u32, successes: u32) -> FeatureVector {
        let mut values = Array1::zeros(FEATURE_VECTOR_SIZE);
        values[ProductType::parse(product_type).column()] = 1.0;

        let successes = successes.min(attempts);
        values[4] = f64::from(attempts);
        values[5] = f64::from(successes);
        values[6] = if attempts == 0 {
            0.0
        } else {
            f64::from(successes) / f64::from(attempts)
        };

        FeatureVector(values)
    }

    pub fn encode_record(&self, record: &PerformanceRecord) -> FeatureVector {
        self.encode(&record.product_type, record.attempts, record.successes)
    }

    /// Encodes many records into a `(records, FEATURE_VECTOR_SIZE)` matrix.
    pub fn encode_batch(&self, records: &[PerformanceRecord]) -> Array2<f64> {
        let mut matrix = Array2::zeros((records.len(), FEATURE_VECTOR_SIZE));
        for (i, record) in records.iter().enumerate() {
            matrix.row_mut(i).assign(self.encode_record(record).as_array());
        }
        matrix
    }
}
