// src/brain_utils.rs

/// 指数加权移动平均 (EWMA)，每个控制轴一个实例
#[derive(Clone, Debug)]
pub struct Ewma {
    alpha: f64,
    state: Option<f64>,
}

impl Ewma {
    /// `alpha` is clamped into `[0, 1]`; 1 passes input through, values near 0 damp hardest.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.state
    }

    /// 第一次调用直接返回输入 (冷启动)
    pub fn step(&mut self, x: f64) -> f64 {
        let y = match self.state {
            Some(prev) if prev.is_finite() => self.alpha * x + (1.0 - self.alpha) * prev,
            _ => x,
        };
        self.state = Some(y);
        y
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Median of `values`; `None` when empty. NaNs sort last.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) * 0.5)
    } else {
        Some(sorted[mid])
    }
}

/// 死区: 小于阈值的值归零；阈值 >= 1 时整轴关闭
pub fn apply_dead_band(value: f64, dead_band: f64) -> f64 {
    if dead_band >= 1.0 || value.abs() < dead_band {
        0.0
    } else {
        value
    }
}

/// Clamps into `[-1, 1]`; NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_output_equals_first_input() {
        for alpha in [0.0, 0.3, 1.0] {
            let mut ewma = Ewma::new(alpha);
            assert_eq!(ewma.step(4.25), 4.25);
        }
    }

    #[test]
    fn alpha_one_is_pass_through() {
        let mut ewma = Ewma::new(1.0);
        ewma.step(1.0);
        assert_eq!(ewma.step(-3.0), -3.0);
    }

    #[test]
    fn alpha_zero_holds_first_value() {
        let mut ewma = Ewma::new(0.0);
        ewma.step(2.0);
        assert_eq!(ewma.step(100.0), 2.0);
    }

    #[test]
    fn converges_to_constant_without_overshoot() {
        let mut ewma = Ewma::new(0.3);
        let inputs = [5.0, -1.0, 2.0, 2.0, 2.0];
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        let mut y = 0.0;
        for &x in inputs.iter().chain(std::iter::repeat(&2.0).take(200)) {
            lo = lo.min(x);
            hi = hi.max(x);
            y = ewma.step(x);
            assert!(y >= lo - 1e-12 && y <= hi + 1e-12);
        }
        assert!((y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn reset_restores_cold_start() {
        let mut ewma = Ewma::new(0.5);
        ewma.step(10.0);
        ewma.reset();
        assert_eq!(ewma.value(), None);
        assert_eq!(ewma.step(-1.0), -1.0);
    }

    #[test]
    fn median_odd_even_and_identical() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[0.7; 9]), Some(0.7));
    }

    #[test]
    fn dead_band_zeroes_small_values_only() {
        assert_eq!(apply_dead_band(0.04, 0.05), 0.0);
        assert_eq!(apply_dead_band(-0.04, 0.05), 0.0);
        assert_eq!(apply_dead_band(0.05, 0.05), 0.05);
        assert_eq!(apply_dead_band(-0.6, 0.05), -0.6);
        assert_eq!(apply_dead_band(0.3, 0.0), 0.3);
    }

    #[test]
    fn saturated_dead_band_disables_axis() {
        assert_eq!(apply_dead_band(1.0, 1.0), 0.0);
        assert_eq!(apply_dead_band(-1.0, 1.5), 0.0);
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_unit(3.0), 1.0);
        assert_eq!(clamp_unit(-7.5), -1.0);
        assert_eq!(clamp_unit(0.25), 0.25);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(f64::INFINITY), 1.0);
    }

    #[test]
    fn overflowed_state_restarts_from_input() {
        let mut ewma = Ewma::new(0.5);
        assert_eq!(ewma.step(f64::INFINITY), f64::INFINITY);
        assert_eq!(ewma.step(2.0), 2.0);
    }
}
