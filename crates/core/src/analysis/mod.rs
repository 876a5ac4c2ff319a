use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{DetectorConfig, Result, TrainerError};

/// Bottom of the dB range mapped onto the byte scale.
const MIN_DB: f32 = -100.0;
/// Top of the dB range; magnitudes at or above this read as 255.
const MAX_DB: f32 = -30.0;

/// Reduces capture windows to a single scalar on a 0-255 scale.
///
/// The pipeline is Hann window -> real FFT -> per-bin magnitude -> per-bin
/// exponential smoothing -> dB conversion mapped onto [0, 255] -> mean
/// across the analysed bins. The byte scale is the reference frame the
/// detector thresholds are tuned in, so the empirical constants in
/// [`DetectorConfig`] keep their meaning.
pub struct SpectralEnergy {
    size: usize,
    smoothing: f32,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
    window: Vec<f32>,
}

impl SpectralEnergy {
    pub fn new(config: &DetectorConfig) -> Self {
        let size = config.fft_size;
        let mut planner = RealFftPlanner::new();
        let plan = planner.plan_fft_forward(size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        Self {
            size,
            smoothing: config.smoothing,
            plan,
            input,
            spectrum,
            scratch,
            smoothed: vec![0.0; size / 2],
            window: vec![0.0; size],
        }
    }

    /// Number of frequency bins averaged into the scalar.
    pub fn bin_count(&self) -> usize {
        self.size / 2
    }

    /// Shifts newly captured samples into the rolling analysis window. Only
    /// the newest `fft_size` samples are retained; a cold window stays
    /// zero-padded until enough audio has arrived.
    pub fn extend(&mut self, samples: &[f32]) {
        let keep = samples.len().min(self.size);
        if keep == 0 {
            return;
        }
        let tail = &samples[samples.len() - keep..];
        if keep == self.size {
            self.window.copy_from_slice(tail);
        } else {
            self.window.copy_within(keep.., 0);
            let start = self.size - keep;
            self.window[start..].copy_from_slice(tail);
        }
    }

    /// Reduces the current window to one energy scalar.
    pub fn sample(&mut self) -> Result<f32> {
        let len = self.size;
        for (index, value) in self.window.iter().enumerate() {
            self.input[index] = *value * hann_value(index, len);
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .map_err(TrainerError::backend)?;

        let norm = 1.0 / len as f32;
        let bins = self.bin_count();
        let mut sum = 0.0;
        for (index, bin) in self.spectrum.iter().take(bins).enumerate() {
            let magnitude = bin.norm() * norm;
            let smoothed =
                self.smoothing * self.smoothed[index] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[index] = smoothed;
            sum += byte_scale(smoothed);
        }

        Ok(sum / bins as f32)
    }
}

impl fmt::Debug for SpectralEnergy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralEnergy")
            .field("size", &self.size)
            .field("smoothing", &self.smoothing)
            .finish()
    }
}

/// Maps a linear magnitude onto the 0-255 byte scale via decibels.
fn byte_scale(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * magnitude.log10();
    ((db - MIN_DB) / (MAX_DB - MIN_DB) * 255.0).clamp(0.0, 255.0)
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> SpectralEnergy {
        SpectralEnergy::new(&DetectorConfig::default())
    }

    /// Deterministic full-scale noise, flat enough to light up every bin.
    fn noise(len: usize, amplitude: f32) -> Vec<f32> {
        let mut state: u32 = 0x2545_f491;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(48_271).wrapping_add(11);
                let unit = (state >> 8) as f32 / (1 << 24) as f32;
                (unit * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    #[test]
    fn silence_reads_zero() {
        let mut energy = build();
        let samples = vec![0.0; 256];
        energy.extend(&samples);
        assert_eq!(energy.sample().unwrap(), 0.0);
    }

    #[test]
    fn loud_noise_exceeds_the_trigger_threshold() {
        let mut energy = build();
        let config = DetectorConfig::default();

        let mut value = 0.0;
        for _ in 0..8 {
            energy.extend(&noise(256, 1.0));
            value = energy.sample().unwrap();
        }
        assert!(value > config.upper_threshold, "energy {value} too low");
    }

    #[test]
    fn faint_noise_stays_below_the_reset_threshold() {
        let mut energy = build();
        let config = DetectorConfig::default();

        let mut value = f32::MAX;
        for _ in 0..8 {
            energy.extend(&noise(256, 1e-4));
            value = energy.sample().unwrap();
        }
        assert!(value < config.lower_threshold, "energy {value} too high");
    }

    #[test]
    fn smoothing_ramps_towards_steady_state() {
        let mut energy = build();
        let block = noise(256, 1.0);

        energy.extend(&block);
        let first = energy.sample().unwrap();
        let mut last = first;
        for _ in 0..12 {
            energy.extend(&block);
            last = energy.sample().unwrap();
        }
        assert!(first > 0.0);
        assert!(last >= first);
    }

    #[test]
    fn energy_is_bounded_by_the_byte_scale() {
        let mut energy = build();
        for _ in 0..4 {
            energy.extend(&noise(256, 1.0));
            let value = energy.sample().unwrap();
            assert!((0.0..=255.0).contains(&value));
        }
    }

    #[test]
    fn partial_blocks_shift_into_the_window() {
        let mut energy = build();
        // Two half windows of loud noise fill the window completely.
        energy.extend(&noise(128, 1.0));
        energy.extend(&noise(128, 1.0));
        let loud = energy.sample().unwrap();
        assert!(loud > 0.0);
    }
}
