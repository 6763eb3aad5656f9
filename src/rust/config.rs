use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dirs;
use log;

use crate::classifier::features::FEATURE_SCHEMA_VERSION;
use crate::classifier::EngineError;

/// File name of the trained artifact inside the models directory.
pub const DEFAULT_MODEL_FILENAME: &str = "weakness_classifier.json";

/// File name of the performance dataset inside the data directory.
pub const DEFAULT_DATA_FILENAME: &str = "gps_performance.csv";

/// Settings for an offline training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerConfig {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub bootstrap: bool,
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Minimum samples every class needs for a stratified holdout
    pub stratify_splits: usize,
    /// Datasets smaller than this are refused
    pub min_rows: usize,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
            test_size: 0.2,
            stratify_splits: 2,
            min_rows: 10,
            seed: 42,
        }
    }
}

/// Everything a serving process or a training run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub model_path: PathBuf,
    pub data_path: PathBuf,
    /// JSON catalog; the built-in catalog is used when unset
    pub catalog_path: Option<PathBuf>,
    /// Feature schema the loaded model must have been trained against
    pub feature_schema_version: String,
    /// Predictions below this confidence fall back to the product type. Off when unset.
    pub min_confidence: Option<f32>,
    pub trainer: TrainerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let home = EngineConfig::get_default_home_dir();
        Self {
            model_path: home.join("models").join(DEFAULT_MODEL_FILENAME),
            data_path: home.join("data").join(DEFAULT_DATA_FILENAME),
            catalog_path: None,
            feature_schema_version: FEATURE_SCHEMA_VERSION.to_string(),
            min_confidence: None,
            trainer: TrainerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Returns the default base directory for models and data
    pub fn get_default_home_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("MICROCOACH_HOME") {
            return PathBuf::from(path);
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("microcoach");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".microcoach");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("microcoach")
    }

    /// Builds a configuration from `MICROCOACH_*` environment variables,
    /// loading a `.env` file first when one is present.
    ///
    /// Recognised variables: `MICROCOACH_MODEL_PATH`, `MICROCOACH_DATA_PATH`,
    /// `MICROCOACH_CATALOG_PATH`, `MICROCOACH_SCHEMA_VERSION`,
    /// `MICROCOACH_MIN_CONFIDENCE`, `MICROCOACH_TREES`, `MICROCOACH_MAX_DEPTH`,
    /// `MICROCOACH_TEST_SIZE`, `MICROCOACH_SEED`.
    ///
    /// # Errors
    /// - `ValidationError` if a numeric variable cannot be parsed
    pub fn from_env() -> Result<Self, EngineError> {
        match dotenvy::dotenv() {
            Ok(path) => log::info!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => log::debug!("No .env file found; using process environment"),
            Err(e) => log::warn!("Ignoring unreadable .env file: {}", e),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("MICROCOACH_MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("MICROCOACH_DATA_PATH") {
            config.data_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("MICROCOACH_CATALOG_PATH") {
            config.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(version) = lookup("MICROCOACH_SCHEMA_VERSION") {
            config.feature_schema_version = version;
        }
        config.min_confidence = parse_var(&lookup, "MICROCOACH_MIN_CONFIDENCE")?;
        if let Some(threshold) = config.min_confidence {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(EngineError::ValidationError(format!(
                    "MICROCOACH_MIN_CONFIDENCE must be within [0, 1], got {}",
                    threshold
                )));
            }
        }

        if let Some(n_trees) = parse_var(&lookup, "MICROCOACH_TREES")? {
            config.trainer.n_trees = n_trees;
        }
        if let Some(max_depth) = parse_var(&lookup, "MICROCOACH_MAX_DEPTH")? {
            config.trainer.max_depth = Some(max_depth);
        }
        if let Some(test_size) = parse_var(&lookup, "MICROCOACH_TEST_SIZE")? {
            config.trainer.test_size = test_size;
        }
        if let Some(seed) = parse_var(&lookup, "MICROCOACH_SEED")? {
            config.trainer.seed = seed;
        }

        Ok(config)
    }

    pub fn with_model_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.model_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_data_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_catalog_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.catalog_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_min_confidence(mut self, threshold: f32) -> Self {
        self.min_confidence = Some(threshold);
        self
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, EngineError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| EngineError::ValidationError(format!("{} has invalid value '{}': {}", key, raw, e))),
    }
}
