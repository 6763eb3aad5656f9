use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::classifier::features::normalize_product_type;
use crate::classifier::EngineError;

/// One historical performance observation for a partner on a product line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub partner_id: String,
    /// Lowercased product type, e.g. `loan` or `credit_card`
    pub product_type: String,
    pub attempts: u32,
    pub successes: u32,
    pub last_weak_topic: String,
    /// Unix seconds. Used to pick the most recent record when a partner has several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<i64>,
}

impl PerformanceRecord {
    /// Creates a validated record.
    ///
    /// # Errors
    /// - `DataError` if the partner id, product type or topic is empty
    /// - `DataError` if `successes` exceeds `attempts`
    pub fn new(
        partner_id: impl Into<String>,
        product_type: &str,
        attempts: u32,
        successes: u32,
        last_weak_topic: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let record = Self {
            partner_id: partner_id.into().trim().to_string(),
            product_type: normalize_product_type(product_type),
            attempts,
            successes,
            last_weak_topic: last_weak_topic.into().trim().to_string(),
            recorded_at: None,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn with_recorded_at(mut self, recorded_at: i64) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.partner_id.is_empty() {
            return Err(EngineError::DataError("Partner id cannot be empty".into()));
        }
        if self.product_type.is_empty() {
            return Err(EngineError::DataError(format!(
                "Product type cannot be empty (partner '{}')",
                self.partner_id
            )));
        }
        if self.last_weak_topic.is_empty() {
            return Err(EngineError::DataError(format!(
                "Weak topic cannot be empty (partner '{}')",
                self.partner_id
            )));
        }
        if self.successes > self.attempts {
            return Err(EngineError::DataError(format!(
                "Partner '{}' has {} successes out of {} attempts on '{}'",
                self.partner_id, self.successes, self.attempts, self.product_type
            )));
        }
        Ok(())
    }
}

/// Read-only access to historical performance records.
pub trait PerformanceStore: Send + Sync {
    /// Returns every record for the pair, in dataset order. May be empty.
    fn get_records(&self, partner_id: &str, product_type: &str) -> Vec<PerformanceRecord>;

    /// Returns the record used for feature encoding.
    ///
    /// Policy: the record with the greatest `recorded_at` wins; records without
    /// a timestamp rank below timestamped ones, and ties go to the later row.
    fn latest_record(&self, partner_id: &str, product_type: &str) -> Option<PerformanceRecord> {
        select_latest(self.get_records(partner_id, product_type))
    }
}

pub(crate) fn select_latest(records: Vec<PerformanceRecord>) -> Option<PerformanceRecord> {
    records
        .into_iter()
        .enumerate()
        .max_by_key(|(i, r)| (r.recorded_at, *i))
        .map(|(_, r)| r)
}

/// Cell spellings treated as missing, compared case-insensitively.
const MISSING_MARKERS: [&str; 8] = ["", "nan", "-nan", "na", "n/a", "#n/a", "null", "none"];

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    MISSING_MARKERS.iter().any(|marker| cell.eq_ignore_ascii_case(marker))
}

/// A CSV row before validation. Missing or unparseable cells become `None`
/// and the row is dropped; an unparseable `recorded_at` only loses the timestamp.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "partner_id")]
    gp_id: Option<String>,
    product_type: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    attempts: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    successes: Option<u32>,
    last_weak_topic: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    recorded_at: Option<i64>,
}

impl CsvRow {
    fn into_record(self) -> Option<Result<PerformanceRecord, EngineError>> {
        let gp_id = self.gp_id.filter(|s| !is_missing(s))?;
        let product_type = self.product_type.filter(|s| !is_missing(s))?;
        let topic = self.last_weak_topic.filter(|s| !is_missing(s))?;
        let attempts = self.attempts?;
        let successes = self.successes?;

        let recorded_at = self.recorded_at;
        Some(
            PerformanceRecord::new(gp_id, &product_type, attempts, successes, topic).map(|record| {
                match recorded_at {
                    Some(ts) => record.with_recorded_at(ts),
                    None => record,
                }
            }),
        )
    }
}

/// An immutable snapshot of the performance dataset held in memory.
///
/// Cloning is cheap; every clone shares the same snapshot, so concurrent
/// readers always see a consistent view.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPerformanceStore {
    records: Arc<Vec<PerformanceRecord>>,
    index: Arc<HashMap<(String, String), Vec<usize>>>,
}

impl InMemoryPerformanceStore {
    pub fn from_records(records: Vec<PerformanceRecord>) -> Self {
        let mut index: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            index
                .entry((record.partner_id.clone(), record.product_type.clone()))
                .or_default()
                .push(i);
        }
        Self {
            records: Arc::new(records),
            index: Arc::new(index),
        }
    }

    /// Loads a snapshot from a CSV file with a header row.
    ///
    /// Expected columns: `gp_id` (or `partner_id`), `product_type`, `attempts`,
    /// `successes`, `last_weak_topic` and optionally `recorded_at`.
    ///
    /// # Errors
    /// - `DataError` if the file cannot be opened or parsed
    /// - `DataError` if a complete row has more successes than attempts
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        info!("Loading performance data from {:?}", path);
        let file = File::open(path).map_err(|e| {
            EngineError::DataError(format!("Failed to open dataset {:?}: {}", path, e))
        })?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, EngineError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        let mut dropped = 0usize;
        for (line, row) in csv_reader.deserialize::<CsvRow>().enumerate() {
            match row?.into_record() {
                Some(record) => records.push(record?),
                None => {
                    debug!("Dropping incomplete row {}", line + 2);
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            warn!("Dropped {} incomplete rows from performance data", dropped);
        }
        info!("Loaded {} performance records", records.len());
        Ok(Self::from_records(records))
    }

    pub fn records(&self) -> &[PerformanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct partners in the snapshot.
    pub fn partner_count(&self) -> usize {
        let mut partners: Vec<&str> = self.records.iter().map(|r| r.partner_id.as_str()).collect();
        partners.sort_unstable();
        partners.dedup();
        partners.len()
    }
}

impl PerformanceStore for InMemoryPerformanceStore {
    fn get_records(&self, partner_id: &str, product_type: &str) -> Vec<PerformanceRecord> {
        let key = (partner_id.trim().to_string(), normalize_product_type(product_type));
        self.index
            .get(&key)
            .map(|rows| rows.iter().map(|&i| self.records[i].clone()).collect())
            .unwrap_or_default()
    }
}
