use std::f64::consts::PI;
use log::warn;
/// Quality factor of the mains notch.
pub const NOTCH_Q: f64 = 30.0;
/// Order of each Butterworth edge of the bandpass.
pub const BANDPASS_ORDER: usize = 4;
#[derive(Clone, Copy, Debug, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}
impl BiquadCoeffs {
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}
#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}
impl BiquadState {
    /// State a section settles into after a long run of constant input `x`.
    fn steady(coeffs: &BiquadCoeffs, x: f64) -> Self {
        let y = coeffs.dc_gain() * x;
        Self {
            z1: y - coeffs.b0 * x,
            z2: coeffs.b2 * x - coeffs.a2 * y,
        }
    }
}
/// Cascade of second-order sections applied in order.
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    sections: Vec<BiquadCoeffs>,
}
impl FilterChain {
    /// IIR notch at `freq_hz` (same response as `iirnotch(w0, q)`).
    pub fn notch(sample_rate_hz: f64, freq_hz: f64, q: f64) -> Self {
        Self {
            sections: vec![notch(freq_hz, sample_rate_hz, q)],
        }
    }
    /// Butterworth high-pass at `low_hz` followed by Butterworth low-pass at `high_hz`,
    /// each of `order` (even).
    pub fn butterworth_bandpass(sample_rate_hz: f64, low_hz: f64, high_hz: f64, order: usize) -> Self {
        let qs = butterworth_qs(order);
        let mut sections = Vec::with_capacity(qs.len() * 2);
        sections.extend(qs.iter().map(|&q| highpass(low_hz, sample_rate_hz, q)));
        sections.extend(qs.iter().map(|&q| lowpass(high_hz, sample_rate_hz, q)));
        Self { sections }
    }
    /// Edge padding used by [`FilterChain::filtfilt`]; inputs must be longer than this.
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }
    fn run(&self, signal: &mut [f64]) {
        let Some(&first) = signal.first() else {
            return;
        };
        let mut input = first;
        let mut states: Vec<BiquadState> = self
            .sections
            .iter()
            .map(|c| {
                let state = BiquadState::steady(c, input);
                input *= c.dc_gain();
                state
            })
            .collect();
        for sample in signal.iter_mut() {
            let mut value = *sample;
            for (c, state) in self.sections.iter().zip(states.iter_mut()) {
                // Transposed direct form II
                let y = c.b0 * value + state.z1;
                state.z1 = c.b1 * value - c.a1 * y + state.z2;
                state.z2 = c.b2 * value - c.a2 * y;
                value = y;
            }
            *sample = value;
        }
    }
    /// Forward-backward filtering with odd extension at both edges.
    ///
    /// Returns `None` when the signal is not longer than [`FilterChain::pad_len`].
    pub fn filtfilt(&self, signal: &[f64]) -> Option<Vec<f64>> {
        let pad = self.pad_len();
        let n = signal.len();
        if n <= pad {
            return None;
        }
        let first = signal[0];
        let last = signal[n - 1];
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        ext.extend_from_slice(signal);
        ext.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
        self.run(&mut ext);
        ext.reverse();
        self.run(&mut ext);
        ext.reverse();
        Some(ext[pad..pad + n].to_vec())
    }
}
/// Zero-phase notch + bandpass conditioning, built once and shared across channels.
#[derive(Clone, Debug, Default)]
pub struct FilterPipeline {
    notch: Option<FilterChain>,
    bandpass: Option<FilterChain>,
}
impl FilterPipeline {
    /// Invalid stages (cutoff outside `(0, fs/2)` or `low >= high`) are disabled with a warning.
    pub fn new(sample_rate_hz: f64, notch_hz: Option<f64>, bandpass_hz: Option<(f64, f64)>) -> Self {
        let nyquist = sample_rate_hz * 0.5;
        let in_range = |f: f64| f > 0.0 && f < nyquist;
        let notch = match notch_hz {
            Some(f) if in_range(f) => Some(FilterChain::notch(sample_rate_hz, f, NOTCH_Q)),
            Some(f) => {
                warn!("notch {f} Hz outside (0, {nyquist}) Hz, notch stage disabled");
                None
            }
            None => None,
        };
        let bandpass = match bandpass_hz {
            Some((lo, hi)) if in_range(lo) && in_range(hi) && lo < hi => Some(
                FilterChain::butterworth_bandpass(sample_rate_hz, lo, hi, BANDPASS_ORDER),
            ),
            Some((lo, hi)) => {
                warn!("bandpass [{lo}, {hi}] Hz invalid for fs {sample_rate_hz} Hz, bandpass stage disabled");
                None
            }
            None => None,
        };
        Self { notch, bandpass }
    }
    pub fn has_notch(&self) -> bool {
        self.notch.is_some()
    }
    pub fn has_bandpass(&self) -> bool {
        self.bandpass.is_some()
    }
    /// Filters one channel; output has the input's length.
    pub fn process(&self, raw: &[f64]) -> Vec<f64> {
        let mut signal = raw.to_vec();
        for stage in [&self.notch, &self.bandpass].into_iter().flatten() {
            if let Some(filtered) = stage.filtfilt(&signal) {
                signal = filtered;
            }
        }
        signal
    }
}
/// Q of each biquad in an even-order Butterworth cascade.
fn butterworth_qs(order: usize) -> Vec<f64> {
    let pairs = (order / 2).max(1);
    let n = (pairs * 2) as f64;
    (0..pairs)
        .map(|k| {
            let theta = PI * (2 * k + 1) as f64 / (2.0 * n);
            1.0 / (2.0 * theta.sin())
        })
        .collect()
}
fn lowpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}
fn highpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 + cos_w0) * 0.5;
    let b1 = -(1.0 + cos_w0);
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}
fn notch(center_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * center_hz / sample_rate_hz;
    let bandwidth = w0 / q;
    let beta = (bandwidth / 2.0).tan();
    let cos_w0 = w0.cos();
    normalize(1.0, -2.0 * cos_w0, 1.0, 1.0 + beta, -2.0 * cos_w0, 1.0 - beta)
}
fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> BiquadCoeffs {
    let a0_inv = 1.0 / a0;
    BiquadCoeffs {
        b0: b0 * a0_inv,
        b1: b1 * a0_inv,
        b2: b2 * a0_inv,
        a1: a1 * a0_inv,
        a2: a2 * a0_inv,
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn sine(freq_hz: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq_hz * i as f64 / fs).sin())
            .collect()
    }
    fn rms(signal: &[f64]) -> f64 {
        (signal.iter().map(|v| v * v).sum::<f64>() / signal.len() as f64).sqrt()
    }
    #[test]
    fn butterworth_fourth_order_qs() {
        let qs = butterworth_qs(4);
        assert!((qs[0] - 1.306_562_964_876_376_5).abs() < 1e-9);
        assert!((qs[1] - 0.541_196_100_146_197).abs() < 1e-9);
    }
    #[test]
    fn empty_input_is_a_no_op() {
        let pipeline = FilterPipeline::new(250.0, Some(50.0), Some((1.0, 40.0)));
        assert!(pipeline.process(&[]).is_empty());
    }
    #[test]
    fn output_keeps_input_length() {
        let pipeline = FilterPipeline::new(250.0, Some(50.0), Some((1.0, 40.0)));
        for n in [1, 5, 9, 10, 27, 28, 250] {
            assert_eq!(pipeline.process(&vec![1.0; n]).len(), n);
        }
    }
    #[test]
    fn short_input_passes_through() {
        let pipeline = FilterPipeline::new(250.0, Some(50.0), Some((1.0, 40.0)));
        let raw = vec![3.0, -1.0, 4.0, 1.0, -5.0];
        assert_eq!(pipeline.process(&raw), raw);
    }
    #[test]
    fn invalid_stages_are_disabled() {
        let pipeline = FilterPipeline::new(250.0, Some(130.0), Some((40.0, 1.0)));
        assert!(!pipeline.has_notch());
        assert!(!pipeline.has_bandpass());
        let raw = sine(10.0, 250.0, 500);
        assert_eq!(pipeline.process(&raw), raw);
        let pipeline = FilterPipeline::new(250.0, Some(0.0), Some((0.0, 40.0)));
        assert!(!pipeline.has_notch());
        assert!(!pipeline.has_bandpass());
    }
    #[test]
    fn notch_rejects_mains() {
        let chain = FilterChain::notch(250.0, 50.0, NOTCH_Q);
        let out = chain.filtfilt(&sine(50.0, 250.0, 1000)).unwrap();
        assert!(rms(&out[250..750]) < 0.05);
    }
    #[test]
    fn notch_leaves_alpha_alone() {
        let chain = FilterChain::notch(250.0, 50.0, NOTCH_Q);
        let raw = sine(10.0, 250.0, 1000);
        let out = chain.filtfilt(&raw).unwrap();
        assert!((rms(&out[250..750]) - rms(&raw[250..750])).abs() < 0.01);
    }
    #[test]
    fn bandpass_keeps_passband_and_removes_dc() {
        let pipeline = FilterPipeline::new(250.0, None, Some((1.0, 40.0)));
        let raw: Vec<f64> = sine(10.0, 250.0, 2500).iter().map(|v| v + 100.0).collect();
        let out = pipeline.process(&raw);
        let mid = &out[1000..1500];
        let mean = mid.iter().sum::<f64>() / mid.len() as f64;
        assert!(mean.abs() < 1.0);
        assert!((rms(mid) - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.05);
    }
    #[test]
    fn bandpass_attenuates_above_high_edge() {
        let pipeline = FilterPipeline::new(250.0, None, Some((1.0, 40.0)));
        // long enough for the 1 Hz high-pass edge transients to die out
        let out = pipeline.process(&sine(100.0, 250.0, 2500));
        assert!(rms(&out[1000..1500]) < 0.01);
    }
    #[test]
    fn steady_state_start_has_no_step_transient() {
        let chain = FilterChain::butterworth_bandpass(250.0, 1.0, 40.0, 4);
        let mut constant = vec![5.0; 64];
        chain.run(&mut constant);
        // high-pass sections have zero dc gain
        assert!(constant.iter().all(|v| v.abs() < 1e-9));
    }
}
