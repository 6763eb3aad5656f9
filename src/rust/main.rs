use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use microcoach::{artifact, Classifier, Engine, EngineConfig, InMemoryPerformanceStore, Trainer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train the weakness classifier and save the artifact
    Train {
        /// Performance dataset (CSV)
        #[arg(long)]
        data: Option<PathBuf>,
        /// Where to write the trained artifact
        #[arg(long)]
        model_out: Option<PathBuf>,
        /// Number of trees in the forest
        #[arg(long)]
        trees: Option<usize>,
        /// Random seed for the split and the forest
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Recommend a micro-training for a partner
    Recommend {
        /// Partner id, e.g. GP001
        #[arg(long)]
        partner: String,
        /// Product line, e.g. loan
        #[arg(long)]
        product: String,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a summary of a trained artifact
    Info {
        /// Artifact to inspect
        #[arg(long)]
        model: Option<PathBuf>,
    },
}

fn train(
    mut config: EngineConfig,
    data: Option<PathBuf>,
    model_out: Option<PathBuf>,
    trees: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    if let Some(data) = data {
        config = config.with_data_path(data);
    }
    if let Some(model_out) = model_out {
        config = config.with_model_path(model_out);
    }
    if let Some(trees) = trees {
        config.trainer.n_trees = trees;
    }
    if let Some(seed) = seed {
        config.trainer.seed = seed;
    }

    let start_time = Instant::now();
    let store = InMemoryPerformanceStore::from_csv_path(&config.data_path)
        .with_context(|| format!("loading {:?}", config.data_path))?;
    let trainer = Trainer::new(config.trainer.clone())?;
    let outcome = trainer.train_and_save(store.records(), &config.model_path)?;

    for warning in &outcome.report.warnings {
        println!("warning: {}", warning);
    }
    println!("{}", outcome.report.classification_report());
    println!("Model saved to {}", config.model_path.display());
    info!("Training finished in {:?}", start_time.elapsed());
    Ok(())
}

fn recommend(config: EngineConfig, partner: &str, product: &str, json: bool) -> Result<()> {
    let engine = Engine::from_config(&config)?;
    let resolution = engine.recommend(partner, product)?;

    if json {
        let response = microcoach::RecommendResponse::from(resolution.recommendation);
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("Topic:     {} ({})", resolution.topic, resolution.source.as_str());
        if let Some(confidence) = resolution.confidence {
            println!("Confidence: {:.2}", confidence);
        }
        println!("Video:     {}", resolution.recommendation.video);
        println!("Tip:       {}", resolution.recommendation.tip);
        println!("Next step: {}", resolution.recommendation.next_step);
    }
    Ok(())
}

fn show_info(config: EngineConfig, model: Option<PathBuf>) -> Result<()> {
    let path = model.unwrap_or(config.model_path);
    if !artifact::verify_model(&path)? {
        bail!("No intact artifact at {}", path.display());
    }
    let classifier = Classifier::load(&path, &config.feature_schema_version)?;
    let info = classifier.info();

    println!("Model:          {}", info.model_path);
    println!("Checksum:       ok");
    println!("Feature schema: {}", info.schema_version);
    println!("Features:       {}", info.feature_names.join(", "));
    println!("Topics:         {}", info.labels.join(", "));
    println!("Trees:          {} (max depth {})", info.num_trees, info.max_tree_depth);
    println!("Train samples:  {}", info.train_samples);
    println!("Created at:     {}", info.created_at);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = EngineConfig::from_env()?;

    match args.command {
        Command::Train {
            data,
            model_out,
            trees,
            seed,
        } => train(config, data, model_out, trees, seed),
        Command::Recommend { partner, product, json } => recommend(config, &partner, &product, json),
        Command::Info { model } => show_info(config, model),
    }
}
