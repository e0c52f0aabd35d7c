// src/filter.rs - Single-axis Kalman filter used for each gaze axis

pub const DEFAULT_PROCESS_NOISE: f64 = 0.01;
pub const DEFAULT_MEASUREMENT_NOISE: f64 = 0.1;

/// Scalar Kalman filter with a constant-position model.
///
/// One instance per axis; instances never share state.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarFilter {
    estimate: f64,
    uncertainty: f64,
    process_noise: f64,
    measurement_noise: f64,
}

impl Default for ScalarFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalarFilter {
    pub fn new() -> Self {
        Self::with_noise(DEFAULT_PROCESS_NOISE, DEFAULT_MEASUREMENT_NOISE)
    }

    pub fn with_noise(process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            estimate: 0.0,
            uncertainty: 1.0,
            process_noise: process_noise.max(0.0),
            measurement_noise: measurement_noise.max(0.0),
        }
    }

    pub fn update(&mut self, measurement: f64) -> f64 {
        // Predict
        let predicted = self.uncertainty + self.process_noise;

        // Correct. A zero denominator only happens with zero noise and zero
        // uncertainty, in which case the measurement is taken as-is.
        let denom = predicted + self.measurement_noise;
        let gain = if denom > 0.0 { predicted / denom } else { 1.0 };

        self.estimate += gain * (measurement - self.estimate);
        self.uncertainty = ((1.0 - gain) * predicted).max(0.0);
        self.estimate
    }

    pub fn reset(&mut self) {
        self.estimate = 0.0;
        self.uncertainty = 1.0;
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn uncertainty(&self) -> f64 {
        self.uncertainty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let f = ScalarFilter::new();
        assert_eq!(f.estimate(), 0.0);
        assert_eq!(f.uncertainty(), 1.0);
    }

    #[test]
    fn test_first_update_matches_recurrence() {
        let mut f = ScalarFilter::new();
        let out = f.update(1.0);
        let predicted = 1.0 + 0.01;
        let gain = predicted / (predicted + 0.1);
        assert!((out - gain).abs() < 1e-12);
        assert!((f.uncertainty() - (1.0 - gain) * predicted).abs() < 1e-12);
    }

    #[test]
    fn test_uncertainty_non_increasing_without_process_noise() {
        let mut f = ScalarFilter::with_noise(0.0, 0.1);
        let measurements = [0.3, 0.9, -2.0, 0.5, 0.5, 10.0, 0.0, 0.42];
        let mut prev = f.uncertainty();
        for m in measurements {
            f.update(m);
            assert!(f.uncertainty() <= prev);
            assert!(f.uncertainty() >= 0.0);
            prev = f.uncertainty();
        }
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut f = ScalarFilter::new();
        for i in 0..40 {
            f.update(i as f64 * 0.1);
        }
        f.reset();
        assert_eq!(f, ScalarFilter::new());
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut f = ScalarFilter::new();
        let mut out = 0.0;
        for _ in 0..50 {
            out = f.update(0.3);
        }
        assert!((out - 0.3).abs() < 1e-3, "estimate {out}");
    }
}
