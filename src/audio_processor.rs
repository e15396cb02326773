use hound::WavReader;
use std::path::Path;

use crate::Result;

/// Additive term keeping peak normalization defined for all-silent clips.
const NORM_EPSILON: f32 = 1e-9;

/// Frame length for the silence-detection energy frames.
const TRIM_FRAME_LENGTH: usize = 2048;
/// Hop between successive silence-detection frames.
const TRIM_HOP_LENGTH: usize = 512;

pub struct AudioProcessor {
    target_sample_rate: u32,
}

impl AudioProcessor {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Decode a WAV file to mono f32 samples at the target rate.
    ///
    /// Resampling happens here, before any trimming or normalization.
    pub fn load_audio_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<f32>> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        let audio_data = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| anyhow::anyhow!("Failed to read float samples: {}", e))?,
            hound::SampleFormat::Int => {
                // full-scale divisor for the stored bit depth
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|sample| sample as f32 / scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(|e| anyhow::anyhow!("Failed to read int samples: {}", e))?
            }
        };

        let mut processed_audio = audio_data;

        if spec.channels > 1 {
            processed_audio = self.downmix_to_mono(&processed_audio, spec.channels as usize);
        }

        if spec.sample_rate != self.target_sample_rate {
            processed_audio =
                self.resample(&processed_audio, spec.sample_rate, self.target_sample_rate);
        }

        Ok(processed_audio)
    }

    /// Load a pluck recording and prepare it for feature extraction:
    /// decode and resample, cut edge silence, peak-normalize. Returns the
    /// cleaned signal together with its sample rate.
    pub fn load_clean<P: AsRef<Path>>(&self, path: P, top_db: f32) -> Result<(Vec<f32>, u32)> {
        let audio = self.load_audio_file(path)?;
        let trimmed = self.trim_silence(&audio, top_db);
        let normalized = self.normalize(&trimmed);
        Ok((normalized, self.target_sample_rate))
    }

    /// Cut leading and trailing spans whose frame RMS lies more than
    /// `top_db` below the loudest frame. Interior silence is untouched.
    pub fn trim_silence(&self, audio: &[f32], top_db: f32) -> Vec<f32> {
        if audio.is_empty() {
            return Vec::new();
        }

        let frame_length = TRIM_FRAME_LENGTH.min(audio.len());
        let rms: Vec<f32> = (0..audio.len())
            .step_by(TRIM_HOP_LENGTH)
            .map(|start| {
                let end = (start + frame_length).min(audio.len());
                let frame = &audio[start..end];
                let energy: f32 = frame.iter().map(|&x| x * x).sum();
                (energy / frame.len() as f32).sqrt()
            })
            .collect();

        let peak = rms.iter().cloned().fold(0.0f32, f32::max);
        if peak <= 0.0 {
            // all-zero clip: no frame rises above any threshold
            return audio.to_vec();
        }

        let threshold = peak * 10.0f32.powf(-top_db / 20.0);
        let first = rms.iter().position(|&r| r > threshold);
        let last = rms.iter().rposition(|&r| r > threshold);

        match (first, last) {
            (Some(first), Some(last)) => {
                let start = first * TRIM_HOP_LENGTH;
                let end = (last * TRIM_HOP_LENGTH + frame_length).min(audio.len());
                audio[start..end].to_vec()
            }
            _ => audio.to_vec(),
        }
    }

    /// Scale so the loudest sample sits at ±1; amplitudes land in
    /// approximately `[-1, 1]`.
    pub fn normalize(&self, audio: &[f32]) -> Vec<f32> {
        let max_abs = audio.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        let scale = max_abs + NORM_EPSILON;
        audio.iter().map(|&x| x / scale).collect()
    }

    fn downmix_to_mono(&self, interleaved: &[f32], channels: usize) -> Vec<f32> {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    fn resample(&self, audio: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
        if audio.is_empty() {
            return Vec::new();
        }

        // Linear interpolation; plenty for isolated pluck recordings.
        let ratio = to_rate as f32 / from_rate as f32;
        let new_length = (audio.len() as f32 * ratio) as usize;
        let mut resampled = Vec::with_capacity(new_length);

        for i in 0..new_length {
            let src_index = i as f32 / ratio;
            let src_index_floor = src_index.floor() as usize;
            let src_index_ceil = (src_index_floor + 1).min(audio.len() - 1);
            let fraction = src_index - src_index_floor as f32;

            let sample = if src_index_floor < audio.len() {
                audio[src_index_floor] * (1.0 - fraction) + audio[src_index_ceil] * fraction
            } else {
                0.0
            };

            resampled.push(sample);
        }

        resampled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> AudioProcessor {
        AudioProcessor::new(8000)
    }

    #[test]
    fn normalize_bounds_peak_at_one() {
        let audio = vec![0.1, -0.5, 0.25];
        let normalized = processor().normalize(&audio);
        let max_abs = normalized.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        assert!(max_abs <= 1.0);
        assert!(max_abs > 0.99);
    }

    #[test]
    fn normalize_handles_all_zero_input() {
        let normalized = processor().normalize(&[0.0; 100]);
        assert!(normalized.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn trim_removes_edge_silence_only() {
        let mut audio = vec![0.0f32; 4096];
        audio.extend(std::iter::repeat(0.9).take(4096));
        // interior dip stays
        audio.extend(std::iter::repeat(0.0).take(1024));
        audio.extend(std::iter::repeat(0.9).take(4096));
        audio.extend(std::iter::repeat(0.0).take(4096));

        let trimmed = processor().trim_silence(&audio, 40.0);
        assert!(trimmed.len() < audio.len());
        // the loud span and its interior dip must survive
        assert!(trimmed.len() >= 4096 + 1024 + 4096);
        assert!(trimmed.iter().any(|&x| x == 0.9));
    }

    #[test]
    fn trim_keeps_all_zero_signal_whole() {
        let audio = vec![0.0f32; 5000];
        let trimmed = processor().trim_silence(&audio, 40.0);
        assert_eq!(trimmed.len(), audio.len());
    }

    #[test]
    fn downmix_averages_channels() {
        let interleaved = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mono = processor().downmix_to_mono(&interleaved, 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn resample_halves_length_for_half_rate() {
        let audio = vec![0.25f32; 16000];
        let resampled = processor().resample(&audio, 16000, 8000);
        assert_eq!(resampled.len(), 8000);
    }
}
