pub mod audio_processor;
pub mod config;
pub mod dataset_builder;
pub mod feature_extractor;
pub mod npy_io;

pub use audio_processor::AudioProcessor;
pub use config::PipelineConfig;
pub use dataset_builder::{Dataset, DatasetBuilder};
pub use feature_extractor::SpectrumExtractor;

pub type Result<T> = anyhow::Result<T>;
