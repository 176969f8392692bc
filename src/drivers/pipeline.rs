use crate::drivers::error::FlystickError;
use crate::drivers::fft::bandpower;
use crate::drivers::filter::FilterPipeline;
use crate::drivers::source::SampleBlock;
use crate::types::{ChannelRole, ALPHA_BAND, BETA_BAND, MU_BAND};
/// Band powers of one analysis window, taken after filtering.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandPowers {
    pub c3_mu: f64,
    pub c3_beta: f64,
    pub c4_mu: f64,
    pub c4_beta: f64,
    pub cz_mu: f64,
    pub cz_beta: f64,
    pub oz_alpha: f64,
}
impl BandPowers {
    pub fn c3_motor(&self) -> f64 {
        self.c3_mu + self.c3_beta
    }
    pub fn c4_motor(&self) -> f64 {
        self.c4_mu + self.c4_beta
    }
    pub fn cz_total(&self) -> f64 {
        self.cz_mu + self.cz_beta
    }
    pub fn is_finite(&self) -> bool {
        [
            self.c3_mu,
            self.c3_beta,
            self.c4_mu,
            self.c4_beta,
            self.cz_mu,
            self.cz_beta,
            self.oz_alpha,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}
/// Per-window feature extraction: filter each channel, then integrate the bands.
pub struct FeaturePipeline {
    filters: FilterPipeline,
    sample_rate_hz: f64,
    window_samples: usize,
}
impl FeaturePipeline {
    pub fn new(filters: FilterPipeline, sample_rate_hz: f64, window_samples: usize) -> Self {
        Self {
            filters,
            sample_rate_hz,
            window_samples,
        }
    }
    pub fn window_samples(&self) -> usize {
        self.window_samples
    }
    fn filtered(&self, block: &SampleBlock, role: ChannelRole) -> Vec<f64> {
        self.filters.process(&block.channel(role))
    }
    /// Fails without side effects when the block is short or sampled at another rate.
    pub fn extract(&self, block: &SampleBlock) -> Result<BandPowers, FlystickError> {
        if (block.sample_rate_hz() - self.sample_rate_hz).abs() > f64::EPSILON {
            return Err(FlystickError::SampleRateMismatch {
                expected: self.sample_rate_hz,
                actual: block.sample_rate_hz(),
            });
        }
        block.ensure_complete(self.window_samples)?;
        let window = block.tail(self.window_samples);
        let fs = self.sample_rate_hz;
        let c3 = self.filtered(&window, ChannelRole::C3);
        let c4 = self.filtered(&window, ChannelRole::C4);
        let cz = self.filtered(&window, ChannelRole::Cz);
        let oz = self.filtered(&window, ChannelRole::Oz);
        Ok(BandPowers {
            c3_mu: bandpower(&c3, fs, MU_BAND),
            c3_beta: bandpower(&c3, fs, BETA_BAND),
            c4_mu: bandpower(&c4, fs, MU_BAND),
            c4_beta: bandpower(&c4, fs, BETA_BAND),
            cz_mu: bandpower(&cz, fs, MU_BAND),
            cz_beta: bandpower(&cz, fs, BETA_BAND),
            oz_alpha: bandpower(&oz, fs, ALPHA_BAND),
        })
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    fn tone(freq_hz: f64, amplitude: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq_hz * i as f64 / 250.0).sin())
            .collect()
    }
    fn pipeline() -> FeaturePipeline {
        FeaturePipeline::new(
            FilterPipeline::new(250.0, Some(50.0), Some((1.0, 40.0))),
            250.0,
            500,
        )
    }
    #[test]
    fn short_block_is_rejected() {
        let block = SampleBlock::from_rows(250.0, vec![vec![0.0; 499]; 4]).unwrap();
        assert!(matches!(
            pipeline().extract(&block),
            Err(FlystickError::InsufficientData {
                required: 500,
                available: 499
            })
        ));
    }
    #[test]
    fn foreign_sample_rate_is_rejected() {
        let block = SampleBlock::from_rows(200.0, vec![vec![0.0; 600]; 4]).unwrap();
        assert!(matches!(
            pipeline().extract(&block),
            Err(FlystickError::SampleRateMismatch { .. })
        ));
    }
    #[test]
    fn silent_block_has_zero_power() {
        let block = SampleBlock::from_rows(250.0, vec![vec![0.0; 500]; 4]).unwrap();
        let powers = pipeline().extract(&block).unwrap();
        assert_eq!(powers, BandPowers::default());
    }
    #[test]
    fn powers_follow_channel_roles() {
        let rows = vec![
            tone(10.0, 5.0, 500),  // C3
            tone(10.0, 20.0, 500), // C4
            tone(20.0, 10.0, 500), // Cz
            tone(10.0, 1.0, 500),  // Oz
        ];
        let block = SampleBlock::from_rows(250.0, rows).unwrap();
        let powers = pipeline().extract(&block).unwrap();
        assert!(powers.is_finite());
        assert!(powers.c4_motor() > powers.c3_motor());
        assert!(powers.cz_beta > powers.cz_mu);
        assert!(powers.oz_alpha > 0.0 && powers.oz_alpha < powers.c3_mu);
    }
    #[test]
    fn extra_samples_use_the_newest_window() {
        let mut rows = vec![vec![0.0; 1000]; 4];
        for row in rows.iter_mut() {
            row[..500].copy_from_slice(&tone(10.0, 50.0, 500));
        }
        let block = SampleBlock::from_rows(250.0, rows).unwrap();
        let powers = pipeline().extract(&block).unwrap();
        assert_eq!(powers.oz_alpha, 0.0);
    }
}
