// src/calibration.rs
use crate::brain_utils::median;
use crate::drivers::BandPowers;
use crate::types::Baseline;
use log::warn;

/// 少于这个窗口数时基线视为不稳定
pub const MIN_STABLE_WINDOWS: usize = 3;

/// Collects resting-state band powers and reduces them to a [`Baseline`].
#[derive(Debug, Default)]
pub struct BaselineCalibrator {
    cz_total: Vec<f64>,
    cz_mu: Vec<f64>,
    cz_beta: Vec<f64>,
    oz_alpha: Vec<f64>,
    skipped: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationReport {
    pub baseline: Baseline,
    pub accepted_windows: usize,
    pub skipped_windows: usize,
}

impl CalibrationReport {
    /// True when the placeholder had to stand in for at least one metric.
    pub fn is_degenerate(&self) -> bool {
        self.accepted_windows == 0
    }
}

impl BaselineCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, powers: &BandPowers) {
        if !powers.is_finite() {
            self.skipped += 1;
            return;
        }
        self.cz_total.push(powers.cz_total());
        self.cz_mu.push(powers.cz_mu);
        self.cz_beta.push(powers.cz_beta);
        self.oz_alpha.push(powers.oz_alpha);
    }

    /// Records a window that was too short to use.
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn accepted(&self) -> usize {
        self.cz_total.len()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> CalibrationReport {
        let reduce = |name: &str, values: &[f64]| match median(values) {
            Some(v) => {
                if v <= 0.0 {
                    warn!("baseline {name} is {v:.6}, features for it will saturate");
                }
                v
            }
            None => {
                warn!("no calibration samples for {name}, using placeholder baseline 1.0");
                1.0
            }
        };
        let baseline = Baseline {
            cz_total: reduce("Cz mu+beta", &self.cz_total),
            cz_mu: reduce("Cz mu", &self.cz_mu),
            cz_beta: reduce("Cz beta", &self.cz_beta),
            oz_alpha: reduce("Oz alpha", &self.oz_alpha),
        };
        let accepted = self.accepted();
        if accepted > 0 && accepted < MIN_STABLE_WINDOWS {
            warn!("baseline built from only {accepted} window(s), it may be unreliable");
        }
        CalibrationReport {
            baseline,
            accepted_windows: accepted,
            skipped_windows: self.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powers(cz_mu: f64, cz_beta: f64, oz_alpha: f64) -> BandPowers {
        BandPowers {
            cz_mu,
            cz_beta,
            oz_alpha,
            ..BandPowers::default()
        }
    }

    #[test]
    fn empty_calibration_falls_back_to_placeholder() {
        let mut calibrator = BaselineCalibrator::new();
        calibrator.skip();
        let report = calibrator.finish();
        assert!(report.is_degenerate());
        assert_eq!(report.baseline, Baseline::PLACEHOLDER);
        assert_eq!(report.skipped_windows, 1);
    }

    #[test]
    fn identical_windows_reduce_to_that_value() {
        let mut calibrator = BaselineCalibrator::new();
        for _ in 0..7 {
            calibrator.push(&powers(2.0, 0.5, 9.0));
        }
        let report = calibrator.finish();
        assert_eq!(report.accepted_windows, 7);
        assert_eq!(report.baseline.cz_total, 2.5);
        assert_eq!(report.baseline.cz_mu, 2.0);
        assert_eq!(report.baseline.cz_beta, 0.5);
        assert_eq!(report.baseline.oz_alpha, 9.0);
    }

    #[test]
    fn median_ignores_an_artifact_window() {
        let mut calibrator = BaselineCalibrator::new();
        calibrator.push(&powers(1.0, 1.0, 1.0));
        calibrator.push(&powers(500.0, 500.0, 500.0));
        calibrator.push(&powers(1.2, 1.0, 1.1));
        let report = calibrator.finish();
        assert_eq!(report.baseline.cz_mu, 1.2);
        assert_eq!(report.baseline.oz_alpha, 1.1);
    }

    #[test]
    fn non_finite_windows_are_not_accepted() {
        let mut calibrator = BaselineCalibrator::new();
        calibrator.push(&powers(f64::NAN, 1.0, 1.0));
        assert_eq!(calibrator.accepted(), 0);
        assert_eq!(calibrator.skipped(), 1);
    }
}
