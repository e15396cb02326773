use anyhow::Context;
use log::{info, warn};
use ndarray::{Array1, Array2};
use std::path::Path;

use crate::{npy_io, AudioProcessor, PipelineConfig, Result, SpectrumExtractor};

/// Finished feature matrices, row-aligned across all three arrays: row `i`
/// of `linear`, `mel` and `labels` comes from the same recording.
pub struct Dataset {
    /// Averaged linear spectra, shape `(found, n_fft/2 + 1)`.
    pub linear: Array2<f32>,
    /// Averaged Mel spectra, shape `(found, n_mels)`.
    pub mel: Array2<f32>,
    /// String index per recording, shape `(found,)`.
    pub labels: Array1<i64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Write the three arrays as `X_fft.npy`, `X_mel.npy` and
    /// `y_labels.npy` under `dir`. Zero-row arrays are written too.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        npy_io::write_f32_2d(dir.join("X_fft.npy"), &self.linear)?;
        npy_io::write_f32_2d(dir.join("X_mel.npy"), &self.mel)?;
        npy_io::write_i64_1d(dir.join("y_labels.npy"), &self.labels)?;
        Ok(())
    }
}

/// Accumulates per-recording feature vectors over the expected file set.
pub struct DatasetBuilder {
    config: PipelineConfig,
    audio_processor: AudioProcessor,
    extractor: SpectrumExtractor,
    linear_rows: Vec<Array1<f32>>,
    mel_rows: Vec<Array1<f32>>,
    labels: Vec<i64>,
}

impl DatasetBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        let audio_processor = AudioProcessor::new(config.sample_rate);
        let extractor = SpectrumExtractor::new(
            config.sample_rate as f32,
            config.n_fft,
            config.hop_length,
            config.n_mels,
        );

        Self {
            config,
            audio_processor,
            extractor,
            linear_rows: Vec::new(),
            mel_rows: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Visit every expected recording in enumeration order. Absent files
    /// are skipped with a warning; decode failures on present files abort
    /// the run. Consumes the builder and returns the frozen dataset.
    pub fn build(mut self) -> Result<Dataset> {
        for (label, path) in self.config.expected_files() {
            if !path.is_file() {
                warn!("File not found, skipping: {}", path.display());
                continue;
            }
            self.process_file(label, &path)?;
        }
        self.finalize()
    }

    fn process_file(&mut self, label: i64, path: &Path) -> Result<()> {
        info!("Processing {} ...", path.display());

        let (audio, _sr) = self
            .audio_processor
            .load_clean(path, self.config.top_db)
            .with_context(|| format!("Failed to load {}", path.display()))?;

        let (_freqs, linear_db) = self.extractor.linear_spectrum(&audio)?;
        let (_centers, mel_db) = self.extractor.mel_spectrum(&audio)?;

        self.linear_rows.push(linear_db);
        self.mel_rows.push(mel_db);
        self.labels.push(label);

        Ok(())
    }

    fn finalize(self) -> Result<Dataset> {
        let linear = stack_rows(self.linear_rows, self.config.n_fft / 2 + 1)?;
        let mel = stack_rows(self.mel_rows, self.config.n_mels)?;
        let labels = Array1::from(self.labels);
        Ok(Dataset {
            linear,
            mel,
            labels,
        })
    }
}

fn stack_rows(rows: Vec<Array1<f32>>, width: usize) -> Result<Array2<f32>> {
    let n_rows = rows.len();
    let mut flat = Vec::with_capacity(n_rows * width);
    for row in &rows {
        flat.extend(row.iter().copied());
    }
    Ok(Array2::from_shape_vec((n_rows, width), flat)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_rows_preserves_row_order() {
        let rows = vec![
            Array1::from(vec![1.0f32, 2.0]),
            Array1::from(vec![3.0, 4.0]),
        ];
        let stacked = stack_rows(rows, 2).unwrap();
        assert_eq!(stacked.dim(), (2, 2));
        assert_eq!(stacked[[1, 0]], 3.0);
    }

    #[test]
    fn stack_rows_handles_empty_input() {
        let stacked = stack_rows(Vec::new(), 5).unwrap();
        assert_eq!(stacked.dim(), (0, 5));
    }
}
