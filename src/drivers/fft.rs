use std::f64::consts::PI;
use rustfft::{num_complex::Complex64, FftPlanner};
use crate::types::FrequencyBand;
/// Shortest Welch segment used when the signal allows it.
pub const MIN_SEGMENT_LEN: usize = 128;
/// One-sided power spectral density of a single channel.
#[derive(Clone, Debug, Default)]
pub struct PowerSpectrum {
    pub frequencies_hz: Vec<f64>,
    pub density: Vec<f64>, // power per Hz, one value per bin
}
impl PowerSpectrum {
    /// Trapezoidal integral of the density over the bins inside `band`.
    pub fn band_power(&self, band: FrequencyBand) -> f64 {
        let bins: Vec<(f64, f64)> = self
            .frequencies_hz
            .iter()
            .copied()
            .zip(self.density.iter().copied())
            .filter(|(f, _)| band.contains(*f))
            .collect();
        bins.windows(2)
            .map(|pair| {
                let (f0, p0) = pair[0];
                let (f1, p1) = pair[1];
                0.5 * (p0 + p1) * (f1 - f0)
            })
            .sum()
    }
}
/// Welch estimator with a periodic Hann window and 50% overlap.
pub struct SpectrumBuilder {
    segment_len: usize,
}
impl SpectrumBuilder {
    pub fn with_size(segment_len: usize) -> Self {
        Self { segment_len }
    }
    /// Segment length `min(max(128, fs), n)`.
    pub fn for_signal(sample_rate_hz: f64, signal_len: usize) -> Self {
        let preferred = (sample_rate_hz.max(0.0) as usize).max(MIN_SEGMENT_LEN);
        Self::with_size(preferred.min(signal_len))
    }
    pub fn segment_len(&self) -> usize {
        self.segment_len
    }
    pub fn compute(&self, signal: &[f64], sample_rate_hz: f64) -> PowerSpectrum {
        let nperseg = self.segment_len.min(signal.len());
        if nperseg == 0 || !(sample_rate_hz > 0.0) {
            return PowerSpectrum::default();
        }
        let window = hann(nperseg);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let bins = nperseg / 2 + 1;
        let frequencies_hz: Vec<f64> = (0..bins)
            .map(|k| k as f64 * sample_rate_hz / nperseg as f64)
            .collect();
        if window_power <= 0.0 {
            return PowerSpectrum {
                density: vec![0.0; bins],
                frequencies_hz,
            };
        }
        let step = (nperseg - nperseg / 2).max(1);
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(nperseg);
        let mut accum = vec![0.0f64; bins];
        let mut segments = 0usize;
        let mut buffer = vec![Complex64::new(0.0, 0.0); nperseg];
        for start in (0..=signal.len() - nperseg).step_by(step) {
            let segment = &signal[start..start + nperseg];
            let mean = segment.iter().sum::<f64>() / nperseg as f64;
            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&window) {
                *slot = Complex64::new((x - mean) * w, 0.0);
            }
            fft.process(&mut buffer);
            for (acc, c) in accum.iter_mut().zip(&buffer) {
                *acc += c.norm_sqr();
            }
            segments += 1;
        }
        let scale = 1.0 / (sample_rate_hz * window_power * segments as f64);
        // Nyquist bin is not mirrored for even segment lengths
        let doubled_end = if nperseg % 2 == 0 { bins - 1 } else { bins };
        let density = accum
            .iter()
            .enumerate()
            .map(|(k, &p)| {
                let one_sided = if k > 0 && k < doubled_end { 2.0 } else { 1.0 };
                p * scale * one_sided
            })
            .collect();
        PowerSpectrum {
            frequencies_hz,
            density,
        }
    }
}
/// Power of `signal` inside `band`, from a Welch PSD estimate.
pub fn bandpower(signal: &[f64], sample_rate_hz: f64, band: FrequencyBand) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    SpectrumBuilder::for_signal(sample_rate_hz, signal.len())
        .compute(signal, sample_rate_hz)
        .band_power(band)
}
fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}
