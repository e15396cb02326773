use log::info;
use std::env;

use string_pluck_features::{DatasetBuilder, PipelineConfig, Result};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();

    if args.len() > 2 {
        println!("Usage:");
        println!("  {} [config.json]", args[0]);
        return Ok(());
    }

    let config = match args.get(1) {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    info!(
        "Scanning {} for pluck recordings ({} strings x {} samples)",
        config.base_dir.display(),
        config.string_count,
        config.samples_per_string
    );

    let dataset = DatasetBuilder::new(config.clone()).build()?;

    println!("Feature matrix shapes:");
    println!("X_fft: {:?}", dataset.linear.shape());
    println!("X_mel: {:?}", dataset.mel.shape());
    println!("y_labels: {:?}", dataset.labels.shape());

    dataset.save(&config.output_dir)?;
    println!("Saved: X_fft.npy, X_mel.npy, y_labels.npy");

    Ok(())
}
