use ndarray::{Array1, Array2, Axis};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::Result;

/// Power floor applied before taking logs.
const AMIN: f32 = 1e-10;
/// Dynamic range kept below the per-sample peak, in dB.
const TOP_DB_RANGE: f32 = 80.0;

/// Summarizes a signal into time-averaged spectral feature vectors.
///
/// Both outputs are referenced to the sample's own averaged-power maximum,
/// so the loudest bin of every vector sits at exactly 0 dB and values are
/// comparable within one sample only.
pub struct SpectrumExtractor {
    sample_rate: f32,
    n_fft: usize,
    hop_length: usize,
    n_mels: usize,
}

impl SpectrumExtractor {
    pub fn new(sample_rate: f32, n_fft: usize, hop_length: usize, n_mels: usize) -> Self {
        Self {
            sample_rate,
            n_fft,
            hop_length,
            n_mels,
        }
    }

    /// Time-averaged linear power spectrum in dB, with bin center
    /// frequencies linearly spaced from 0 to Nyquist. Both vectors have
    /// length `n_fft/2 + 1`.
    pub fn linear_spectrum(&self, audio: &[f32]) -> Result<(Array1<f32>, Array1<f32>)> {
        let spectrogram = self.compute_spectrogram(audio)?;
        let mean_power = spectrogram
            .mean_axis(Axis(1))
            .ok_or_else(|| anyhow::anyhow!("Spectrogram has no time frames"))?;

        let mut db = mean_power.to_vec();
        power_to_db(&mut db);

        let n_bins = self.n_fft / 2 + 1;
        let freqs = Array1::linspace(0.0, self.sample_rate / 2.0, n_bins);

        Ok((freqs, Array1::from(db)))
    }

    /// Time-averaged Mel power spectrum in dB, with the center frequency of
    /// each filter. Both vectors have length `n_mels`.
    pub fn mel_spectrum(&self, audio: &[f32]) -> Result<(Array1<f32>, Array1<f32>)> {
        let spectrogram = self.compute_spectrogram(audio)?;
        let mel_spectrogram = self.mel_filterbank().dot(&spectrogram);
        let mean_power = mel_spectrogram
            .mean_axis(Axis(1))
            .ok_or_else(|| anyhow::anyhow!("Mel spectrogram has no time frames"))?;

        let mut db = mean_power.to_vec();
        power_to_db(&mut db);

        Ok((self.mel_center_frequencies(), Array1::from(db)))
    }

    /// Hann-windowed STFT power spectrogram, shape `(n_fft/2 + 1, frames)`.
    /// Signals shorter than one window are zero-padded to a single frame.
    fn compute_spectrogram(&self, audio: &[f32]) -> Result<Array2<f32>> {
        let padded: Vec<f32>;
        let audio: &[f32] = if audio.len() < self.n_fft {
            let mut buf = vec![0.0; self.n_fft];
            buf[..audio.len()].copy_from_slice(audio);
            padded = buf;
            &padded
        } else {
            audio
        };

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(self.n_fft);

        let n_frames = (audio.len() - self.n_fft) / self.hop_length + 1;
        let mut spectrogram = Array2::zeros((self.n_fft / 2 + 1, n_frames));

        for (frame_idx, frame_start) in (0..=audio.len() - self.n_fft)
            .step_by(self.hop_length)
            .enumerate()
        {
            if frame_idx >= n_frames {
                break;
            }

            // Apply Hann window
            let mut windowed: Vec<Complex<f32>> = audio[frame_start..frame_start + self.n_fft]
                .iter()
                .enumerate()
                .map(|(i, &sample)| {
                    let window = 0.5
                        * (1.0
                            - (2.0 * std::f32::consts::PI * i as f32 / (self.n_fft - 1) as f32)
                                .cos());
                    Complex::new(sample * window, 0.0)
                })
                .collect();

            fft.process(&mut windowed);

            for (i, &bin) in windowed.iter().take(self.n_fft / 2 + 1).enumerate() {
                spectrogram[[i, frame_idx]] = bin.norm_sqr();
            }
        }

        Ok(spectrogram)
    }

    /// Filter edges: `n_mels + 2` points equally spaced on the Mel scale
    /// between 0 Hz and Nyquist, converted back to Hz.
    fn mel_edge_frequencies(&self) -> Vec<f32> {
        let mel_low = hz_to_mel(0.0);
        let mel_high = hz_to_mel(self.sample_rate / 2.0);
        (0..self.n_mels + 2)
            .map(|i| {
                let mel = mel_low + (mel_high - mel_low) * i as f32 / (self.n_mels + 1) as f32;
                mel_to_hz(mel)
            })
            .collect()
    }

    /// Triangular filters evaluated at the true bin frequencies
    /// `k * sr / n_fft`, shape `(n_mels, n_fft/2 + 1)`.
    fn mel_filterbank(&self) -> Array2<f32> {
        let n_freqs = self.n_fft / 2 + 1;
        let edges = self.mel_edge_frequencies();
        let mut filters = Array2::zeros((self.n_mels, n_freqs));

        for m in 0..self.n_mels {
            let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
            for k in 0..n_freqs {
                let freq = k as f32 * self.sample_rate / self.n_fft as f32;
                filters[[m, k]] = if freq >= left && freq <= center {
                    (freq - left) / (center - left)
                } else if freq > center && freq < right {
                    (right - freq) / (right - center)
                } else {
                    0.0
                };
            }
        }

        filters
    }

    /// Center frequency of each Mel filter, in Hz.
    pub fn mel_center_frequencies(&self) -> Array1<f32> {
        let edges = self.mel_edge_frequencies();
        edges[1..=self.n_mels].iter().copied().collect()
    }
}

/// `10 * log10(power / reference)` with the vector's own maximum as the
/// reference, powers floored at `AMIN` and the result clamped to
/// `TOP_DB_RANGE` below the peak.
fn power_to_db(power: &mut [f32]) {
    let reference = power.iter().cloned().fold(AMIN, f32::max);
    let ref_db = 10.0 * reference.log10();
    for value in power.iter_mut() {
        *value = (10.0 * value.max(AMIN).log10() - ref_db).max(-TOP_DB_RANGE);
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> SpectrumExtractor {
        SpectrumExtractor::new(8000.0, 512, 128, 12)
    }

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn linear_spectrum_has_fixed_length_and_zero_peak() {
        let audio = sine(440.0, 8000.0, 8000);
        let (freqs, db) = extractor().linear_spectrum(&audio).unwrap();

        assert_eq!(db.len(), 512 / 2 + 1);
        assert_eq!(freqs.len(), db.len());
        let max = db.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(max.abs() < 1e-6);
    }

    #[test]
    fn linear_spectrum_peaks_at_tone_frequency() {
        let audio = sine(1000.0, 8000.0, 8000);
        let (freqs, db) = extractor().linear_spectrum(&audio).unwrap();

        let peak_bin = db
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        // bin spacing is sr/n_fft = 15.625 Hz
        assert!((freqs[peak_bin] - 1000.0).abs() < 32.0);
    }

    #[test]
    fn frequency_axis_spans_zero_to_nyquist() {
        let audio = sine(440.0, 8000.0, 2048);
        let (freqs, _) = extractor().linear_spectrum(&audio).unwrap();
        assert_eq!(freqs[0], 0.0);
        assert!((freqs[freqs.len() - 1] - 4000.0).abs() < 1e-3);
    }

    #[test]
    fn mel_spectrum_has_fixed_length_and_zero_peak() {
        let audio = sine(440.0, 8000.0, 8000);
        let (centers, db) = extractor().mel_spectrum(&audio).unwrap();

        assert_eq!(db.len(), 12);
        assert_eq!(centers.len(), 12);
        let max = db.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(max.abs() < 1e-6);
    }

    #[test]
    fn mel_centers_are_increasing_within_nyquist() {
        let centers = extractor().mel_center_frequencies();
        for pair in centers.to_vec().windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(centers[0] > 0.0);
        assert!(centers[centers.len() - 1] < 4000.0);
    }

    #[test]
    fn short_signal_is_padded_to_one_frame() {
        let audio = sine(440.0, 8000.0, 100);
        let (_, db) = extractor().linear_spectrum(&audio).unwrap();
        assert_eq!(db.len(), 512 / 2 + 1);
        assert!(db.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn all_zero_signal_yields_finite_vector() {
        let audio = vec![0.0f32; 4000];
        let (_, db) = extractor().linear_spectrum(&audio).unwrap();
        assert!(db.iter().all(|v| v.is_finite()));
        let (_, mel_db) = extractor().mel_spectrum(&audio).unwrap();
        assert!(mel_db.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn filterbank_rows_cover_some_bins() {
        let filters = extractor().mel_filterbank();
        assert_eq!(filters.dim(), (12, 257));
        for row in filters.rows() {
            assert!(row.iter().any(|&w| w > 0.0));
        }
    }
}
