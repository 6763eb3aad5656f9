use env_logger::{Builder, Env};
use microcoach::{
    artifact, ContentCatalog, Engine, EngineConfig, EngineError, InMemoryPerformanceStore, RecommendRequest,
    RecommendationSource, Trainer,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

// Initialize test logger
fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn")).try_init();
}

/// Thirty partners across three product lines. Low loan success rates mean
/// EMI trouble, high ones mean closing trouble.
fn performance_csv() -> String {
    let mut csv = String::from("gp_id,product_type,attempts,successes,last_weak_topic\n");
    let rows: [(u32, &str, u32, u32, &str); 30] = [
        (1, "loan", 10, 2, "emi_calculation"),
        (2, "loan", 11, 1, "emi_calculation"),
        (3, "loan", 12, 3, "emi_calculation"),
        (4, "loan", 10, 0, "emi_calculation"),
        (5, "loan", 11, 2, "emi_calculation"),
        (6, "loan", 12, 1, "emi_calculation"),
        (7, "loan", 10, 3, "emi_calculation"),
        (8, "loan", 11, 0, "emi_calculation"),
        (9, "loan", 10, 9, "loan_closing_technique"),
        (10, "loan", 11, 8, "loan_closing_technique"),
        (11, "loan", 12, 10, "loan_closing_technique"),
        (12, "loan", 10, 8, "loan_closing_technique"),
        (13, "loan", 11, 11, "loan_closing_technique"),
        (14, "loan", 12, 9, "loan_closing_technique"),
        (15, "loan", 10, 10, "loan_closing_technique"),
        (16, "loan", 11, 9, "loan_closing_technique"),
        (17, "insurance", 8, 3, "insurance_claim_process"),
        (18, "insurance", 9, 4, "insurance_claim_process"),
        (19, "insurance", 7, 2, "insurance_claim_process"),
        (20, "insurance", 8, 5, "insurance_claim_process"),
        (21, "insurance", 9, 3, "insurance_claim_process"),
        (22, "insurance", 7, 4, "insurance_claim_process"),
        (23, "insurance", 8, 2, "insurance_claim_process"),
        (24, "credit_card", 15, 6, "credit_card_sales_pitch"),
        (25, "credit_card", 14, 7, "credit_card_sales_pitch"),
        (26, "credit_card", 16, 5, "credit_card_sales_pitch"),
        (27, "credit_card", 15, 8, "credit_card_sales_pitch"),
        (28, "credit_card", 14, 6, "credit_card_sales_pitch"),
        (29, "credit_card", 16, 7, "credit_card_sales_pitch"),
        (30, "credit_card", 15, 5, "credit_card_sales_pitch"),
    ];
    for (id, product, attempts, successes, topic) in rows {
        csv.push_str(&format!("GP{:03},{},{},{},{}\n", id, product, attempts, successes, topic));
    }
    csv
}

fn write_dataset(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("gps_performance.csv");
    fs::write(&path, performance_csv()).unwrap();
    path
}

fn config_for(dir: &TempDir) -> EngineConfig {
    EngineConfig::default()
        .with_data_path(write_dataset(dir.path()))
        .with_model_path(dir.path().join("models").join("weakness_classifier.json"))
}

fn train(config: &EngineConfig) {
    let store = InMemoryPerformanceStore::from_csv_path(&config.data_path).unwrap();
    assert_eq!(store.partner_count(), 30);
    Trainer::builder()
        .with_trees(50)
        .build()
        .unwrap()
        .train_and_save(store.records(), &config.model_path)
        .unwrap();
}

#[test]
fn test_end_to_end_recommendation() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = TempDir::new()?;
    let config = config_for(&dir);
    train(&config);

    let engine = Engine::from_config(&config)?;
    assert!(engine.has_classifier());

    let resolution = engine.recommend("GP001", "loan")?;
    assert_eq!(resolution.source, RecommendationSource::Model);
    assert_eq!(resolution.topic, "emi_calculation");
    let catalog = ContentCatalog::builtin();
    assert_eq!(&resolution.recommendation, catalog.lookup("emi_calculation").unwrap());

    let response = engine.handle(&RecommendRequest::new("GP_UNKNOWN", "insurance")).unwrap();
    assert_eq!(response.video, catalog.lookup("insurance").unwrap().video);

    let resolution = engine.recommend("GP_UNKNOWN", "insurance")?;
    assert_eq!(resolution.source, RecommendationSource::NoRecord);
    Ok(())
}

#[test]
fn test_missing_model_serves_fallbacks() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = TempDir::new()?;
    let config = config_for(&dir);

    let engine = Engine::from_config(&config)?;
    assert!(!engine.has_classifier());

    let resolution = engine.recommend("GP001", "loan")?;
    assert_eq!(resolution.source, RecommendationSource::ModelUnavailable);
    assert_eq!(&resolution.recommendation, ContentCatalog::builtin().lookup("loan").unwrap());
    Ok(())
}

#[test]
fn test_tampered_model_serves_fallbacks() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = TempDir::new()?;
    let config = config_for(&dir);
    train(&config);

    let text = fs::read_to_string(&config.model_path)?;
    let tampered = text.replacen("emi_calculation", "emi_calculatiom", 1);
    assert_ne!(text, tampered);
    fs::write(&config.model_path, tampered)?;
    assert!(!artifact::verify_model(&config.model_path)?);

    let engine = Engine::from_config(&config)?;
    assert!(!engine.has_classifier());
    assert_eq!(
        engine.recommend("GP001", "loan")?.source,
        RecommendationSource::ModelUnavailable
    );
    Ok(())
}

#[test]
fn test_undecodable_model_serves_fallbacks() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = TempDir::new()?;
    let config = config_for(&dir);
    fs::create_dir_all(dir.path().join("models"))?;
    fs::write(&config.model_path, r#"{"truncated": "#)?;

    let engine = Engine::from_config(&config)?;
    assert!(!engine.has_classifier());
    assert_eq!(
        engine.recommend("GP001", "loan")?.source,
        RecommendationSource::ModelUnavailable
    );
    Ok(())
}

#[test]
fn test_schema_mismatch_serves_fallbacks() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = TempDir::new()?;
    let mut config = config_for(&dir);
    train(&config);

    config.feature_schema_version = "product-onehot-counts/v2".to_string();
    let engine = Engine::from_config(&config)?;
    assert!(!engine.has_classifier());
    Ok(())
}

#[test]
fn test_single_label_dataset_writes_no_artifact() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = TempDir::new()?;
    let data = dir.path().join("single.csv");
    let mut csv = String::from("gp_id,product_type,attempts,successes,last_weak_topic\n");
    for i in 0..12 {
        csv.push_str(&format!("GP{:03},loan,10,{},emi_calculation\n", i, i % 5));
    }
    fs::write(&data, csv)?;
    let model_path = dir.path().join("model.json");

    let store = InMemoryPerformanceStore::from_csv_path(&data)?;
    let result = Trainer::builder().build()?.train_and_save(store.records(), &model_path);
    assert!(matches!(result, Err(EngineError::DataError(_))));
    assert!(!model_path.exists());
    Ok(())
}

#[test]
fn test_custom_catalog_file() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = TempDir::new()?;
    let catalog_path = dir.path().join("catalog.json");
    fs::write(
        &catalog_path,
        r#"{
            "__default__": {"video": "https://v/default", "tip": "Listen first.", "next_step": "Ask one more question."},
            "loan": {"video": "https://v/loan", "tip": "Know the rates.", "next_step": "Quote three loans."}
        }"#,
    )?;
    let config = config_for(&dir).with_catalog_path(&catalog_path);

    let engine = Engine::from_config(&config)?;
    assert_eq!(engine.recommend("GP001", "loan")?.recommendation.video, "https://v/loan");
    let unknown = engine.recommend("GP001", "credit_card")?;
    assert!(unknown.used_default_content());
    assert_eq!(unknown.recommendation.video, "https://v/default");
    Ok(())
}

#[test]
fn test_concurrent_requests() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = TempDir::new()?;
    let config = config_for(&dir);
    train(&config);
    let engine = Arc::new(Engine::from_config(&config)?);
    let expected = engine.recommend("GP001", "loan")?;

    let mut handles = vec![];
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        let expected = expected.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..25 {
                let resolution = engine.recommend("GP001", "loan").unwrap();
                assert_eq!(resolution, expected);
                let partner = format!("GP{:03}", 17 + i % 7);
                assert_eq!(
                    engine.recommend(&partner, "insurance").unwrap().source,
                    RecommendationSource::Model
                );
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    Ok(())
}
