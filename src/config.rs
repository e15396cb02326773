use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;

/// Every tunable of the feature pipeline in one place.
///
/// All fields have defaults matching the recording campaign this tool was
/// built for (22050 Hz plucks named `corda{n}_{m}.wav`), so a config file
/// only needs the keys it wants to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target sample rate; sources at other rates are resampled on load.
    pub sample_rate: u32,
    /// STFT window size in samples.
    pub n_fft: usize,
    /// Samples advanced between successive analysis windows.
    pub hop_length: usize,
    /// Number of Mel filters.
    pub n_mels: usize,
    /// Silence threshold: frames this many dB below the loudest frame are
    /// trimmed from the signal's edges.
    pub top_db: f32,
    /// Directory holding the input WAV files.
    pub base_dir: PathBuf,
    /// Directory the `.npy` outputs are written to.
    pub output_dir: PathBuf,
    /// Number of physical strings, labels `1..=string_count`.
    pub string_count: u32,
    /// Recorded plucks per string.
    pub samples_per_string: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 40,
            top_db: 40.0,
            base_dir: PathBuf::from("cordas_amostras"),
            output_dir: PathBuf::from("."),
            string_count: 6,
            samples_per_string: 30,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; absent keys fall back to the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Expected recordings in enumeration order: string 1 sample 1 through
    /// string `string_count` sample `samples_per_string`, each paired with
    /// its string label.
    pub fn expected_files(&self) -> Vec<(i64, PathBuf)> {
        let mut files =
            Vec::with_capacity((self.string_count * self.samples_per_string) as usize);
        for n in 1..=self.string_count {
            for m in 1..=self.samples_per_string {
                let filename = format!("corda{}_{}.wav", n, m);
                files.push((n as i64, self.base_dir.join(filename)));
            }
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recording_campaign() {
        let config = PipelineConfig::default();
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.n_fft, 2048);
        assert_eq!(config.hop_length, 512);
        assert_eq!(config.n_mels, 40);
        assert_eq!(config.top_db, 40.0);
        assert_eq!(config.string_count, 6);
        assert_eq!(config.samples_per_string, 30);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"n_mels": 20, "base_dir": "/tmp/plucks"}"#).unwrap();
        assert_eq!(config.n_mels, 20);
        assert_eq!(config.base_dir, PathBuf::from("/tmp/plucks"));
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.string_count, 6);
    }

    #[test]
    fn expected_files_follow_naming_scheme_in_order() {
        let config = PipelineConfig {
            string_count: 2,
            samples_per_string: 3,
            base_dir: PathBuf::from("d"),
            ..PipelineConfig::default()
        };
        let files = config.expected_files();
        assert_eq!(files.len(), 6);
        assert_eq!(files[0], (1, PathBuf::from("d/corda1_1.wav")));
        assert_eq!(files[2], (1, PathBuf::from("d/corda1_3.wav")));
        assert_eq!(files[3], (2, PathBuf::from("d/corda2_1.wav")));
        assert_eq!(files[5], (2, PathBuf::from("d/corda2_3.wav")));
    }
}
