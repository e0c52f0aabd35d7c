// src/tracking.rs - Gaze sample → screen point pipeline
use crate::calibration::{CalibrationProfile, Direction};
use crate::config::PipelineConstants;
use crate::filter::ScalarFilter;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

const METRICS_WINDOW: usize = 30;

/// Normalized eye-center estimate for one video frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SmoothingState {
    pub offset: Vector2<f64>,
    pub prev: Option<ScreenPoint>,
}

#[derive(Clone, Debug)]
pub struct PerformanceMetrics {
    pub avg_processing_time: f32,
    pub samples_per_second: f32,
    pub clamp_rate: f32,
    frame_times: VecDeque<f32>,
    clamp_flags: VecDeque<bool>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            avg_processing_time: 0.0,
            samples_per_second: 0.0,
            clamp_rate: 0.0,
            frame_times: VecDeque::with_capacity(METRICS_WINDOW),
            clamp_flags: VecDeque::with_capacity(METRICS_WINDOW),
        }
    }

    fn record(&mut self, elapsed: f32, clamped: bool) {
        self.frame_times.push_front(elapsed);
        self.clamp_flags.push_front(clamped);
        if self.frame_times.len() > METRICS_WINDOW {
            self.frame_times.pop_back();
            self.clamp_flags.pop_back();
        }

        self.avg_processing_time =
            self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;
        self.samples_per_second = if self.avg_processing_time > 0.0 {
            1.0 / self.avg_processing_time
        } else {
            0.0
        };
        self.clamp_rate = self.clamp_flags.iter().filter(|c| **c).count() as f32
            / self.clamp_flags.len() as f32;
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GazeSignalProcessor {
    filter_x: ScalarFilter,
    filter_y: ScalarFilter,
    calibration: Option<CalibrationProfile>,
    overall_scale: f64,
    smoothing: SmoothingState,
    alpha: f64,
    clamp_fraction: f64,
    width: f64,
    height: f64,
    last_filtered: Option<GazeSample>,
    last_step_clamped: bool,
    metrics: PerformanceMetrics,
}

impl GazeSignalProcessor {
    pub fn new(width: f64, height: f64) -> Self {
        Self::with_constants(width, height, &PipelineConstants::default())
    }

    pub fn with_constants(width: f64, height: f64, constants: &PipelineConstants) -> Self {
        Self {
            filter_x: ScalarFilter::new(),
            filter_y: ScalarFilter::new(),
            calibration: None,
            overall_scale: constants.default_overall_scale,
            smoothing: SmoothingState::default(),
            alpha: constants.ema_alpha,
            clamp_fraction: constants.step_clamp_fraction,
            width,
            height,
            last_filtered: None,
            last_step_clamped: false,
            metrics: PerformanceMetrics::new(),
        }
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// Install a calibration profile. Its `overall_scale` becomes the base
    /// that directional multipliers apply on top of; a later
    /// `set_overall_scale` overrides it.
    pub fn set_calibration(&mut self, profile: CalibrationProfile) {
        self.overall_scale = profile.overall_scale;
        self.calibration = Some(profile);
    }

    pub fn calibration(&self) -> Option<&CalibrationProfile> {
        self.calibration.as_ref()
    }

    pub fn set_overall_scale(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.overall_scale = factor;
        }
    }

    pub fn overall_scale(&self) -> f64 {
        self.overall_scale
    }

    pub fn reset_filters(&mut self) {
        self.filter_x.reset();
        self.filter_y.reset();
        self.smoothing = SmoothingState::default();
        self.last_filtered = None;
        self.last_step_clamped = false;
    }

    pub fn last_filtered(&self) -> Option<GazeSample> {
        self.last_filtered
    }

    pub fn last_step_clamped(&self) -> bool {
        self.last_step_clamped
    }

    pub fn last_point(&self) -> Option<ScreenPoint> {
        self.smoothing.prev
    }

    pub fn process_sample(&mut self, raw: GazeSample) -> ScreenPoint {
        // 1. per-axis filtering
        let fx = self.filter_x.update(raw.x);
        let fy = self.filter_y.update(raw.y);
        self.last_filtered = Some(GazeSample { x: fx, y: fy });

        // 2. offsets from frame center
        let offset = Vector2::new(fx - 0.5, fy - 0.5);

        // 3-4. directional scaling, hard switch at the center line
        let scaled = Vector2::new(
            offset.x * self.axis_scale(offset.x, Direction::Left, Direction::Right),
            offset.y * self.axis_scale(offset.y, Direction::Up, Direction::Down),
        );

        // 5. exponential smoothing
        self.smoothing.offset += (scaled - self.smoothing.offset) * self.alpha;
        let smoothed = self.smoothing.offset;

        // 6. screen mapping, X mirrored for the camera view
        let mut point = ScreenPoint {
            x: self.width / 2.0 - smoothed.x * self.width,
            y: self.height / 2.0 + smoothed.y * self.height,
        };

        // 7. step clamp
        self.last_step_clamped = false;
        if let Some(prev) = self.smoothing.prev {
            let (x, cx) = clamp_step(prev.x, point.x, self.clamp_fraction * self.width);
            let (y, cy) = clamp_step(prev.y, point.y, self.clamp_fraction * self.height);
            point = ScreenPoint { x, y };
            self.last_step_clamped = cx || cy;
        }

        // 8. remember for the next frame
        self.smoothing.prev = Some(point);
        point
    }

    pub fn process_sample_with_metrics(&mut self, raw: GazeSample) -> (ScreenPoint, PerformanceMetrics) {
        let start = Instant::now();
        let point = self.process_sample(raw);
        let elapsed = start.elapsed().as_secs_f32();
        self.metrics.record(elapsed, self.last_step_clamped);
        (point, self.metrics.clone())
    }

    fn axis_scale(&self, offset: f64, negative: Direction, positive: Direction) -> f64 {
        let directional = self
            .calibration
            .as_ref()
            .and_then(|p| p.per_direction_scale)
            .map(|s| if offset < 0.0 { s.get(negative) } else { s.get(positive) })
            .unwrap_or(1.0);
        self.overall_scale * directional
    }
}

fn clamp_step(prev: f64, next: f64, max_step: f64) -> (f64, bool) {
    let delta = next - prev;
    if delta.abs() > max_step {
        (prev + delta.signum() * max_step, true)
    } else {
        (next, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::DirectionScales;
    use std::collections::BTreeMap;

    const W: f64 = 1000.0;
    const H: f64 = 600.0;

    #[test]
    fn test_center_gaze_stays_centered() {
        let mut p = GazeSignalProcessor::new(W, H);
        let mut last = ScreenPoint::default();
        for _ in 0..200 {
            last = p.process_sample(GazeSample { x: 0.5, y: 0.5 });
        }
        assert!((last.x - W / 2.0).abs() < 1.0);
        assert!((last.y - H / 2.0).abs() < 1.0);
    }

    #[test]
    fn test_x_axis_is_mirrored() {
        let mut p = GazeSignalProcessor::new(W, H);
        let mut last = ScreenPoint::default();
        for _ in 0..20 {
            last = p.process_sample(GazeSample { x: 0.0, y: 0.5 });
        }
        assert!(last.x > W / 2.0, "x = {}", last.x);
    }

    #[test]
    fn test_y_axis_not_mirrored() {
        let mut p = GazeSignalProcessor::new(W, H);
        let mut last = ScreenPoint::default();
        for _ in 0..20 {
            last = p.process_sample(GazeSample { x: 0.5, y: 0.9 });
        }
        assert!(last.y > H / 2.0);
    }

    #[test]
    fn test_step_clamp_bounds_consecutive_points() {
        let mut p = GazeSignalProcessor::new(W, H);
        let samples = [
            (0.5, 0.5), (0.0, 1.0), (1.0, 0.0), (0.2, 0.8), (0.9, 0.1),
            (0.5, 0.5), (0.0, 0.0), (1.0, 1.0), (0.3, 0.7), (0.7, 0.3),
        ];
        let mut prev: Option<ScreenPoint> = None;
        for _ in 0..5 {
            for (x, y) in samples {
                let point = p.process_sample(GazeSample { x, y });
                if let Some(prev) = prev {
                    assert!((point.x - prev.x).abs() <= 0.06 * W + 1e-9);
                    assert!((point.y - prev.y).abs() <= 0.06 * H + 1e-9);
                }
                prev = Some(point);
            }
        }
    }

    #[test]
    fn test_first_sample_after_reset_not_clamped() {
        let mut p = GazeSignalProcessor::new(W, H);
        p.set_overall_scale(50.0);
        let first = p.process_sample(GazeSample { x: 1.0, y: 1.0 });
        assert!(!p.last_step_clamped());
        // a large jump on the very first sample is allowed
        assert!((first.x - W / 2.0).abs() > 0.06 * W);

        p.process_sample(GazeSample { x: 0.0, y: 0.0 });
        assert!(p.last_step_clamped());

        p.reset_filters();
        assert!(p.last_point().is_none());
        p.process_sample(GazeSample { x: 1.0, y: 1.0 });
        assert!(!p.last_step_clamped());
    }

    #[test]
    fn test_filter_converges_on_steady_input() {
        let mut p = GazeSignalProcessor::new(W, H);
        for _ in 0..50 {
            p.process_sample(GazeSample { x: 0.3, y: 0.5 });
        }
        let f = p.last_filtered().unwrap();
        assert!((f.x - 0.3).abs() < 1e-3);
        assert!((f.y - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_directional_scale_hard_switch() {
        let scales = DirectionScales { left: 1.0, right: 2.0, up: 1.0, down: 1.2 };
        let profile = CalibrationProfile {
            per_direction_scale: Some(scales),
            per_direction_range: BTreeMap::new(),
            overall_scale: scales.mean(),
        };

        let mut p = GazeSignalProcessor::new(W, H);
        p.set_calibration(profile);
        assert!((p.overall_scale() - 1.3).abs() < 1e-9);
        assert!((p.axis_scale(-0.1, Direction::Left, Direction::Right) - 1.3).abs() < 1e-9);
        assert!((p.axis_scale(0.1, Direction::Left, Direction::Right) - 2.6).abs() < 1e-9);
        assert!((p.axis_scale(0.0, Direction::Left, Direction::Right) - 2.6).abs() < 1e-9);
        assert!((p.axis_scale(0.1, Direction::Up, Direction::Down) - 1.56).abs() < 1e-9);
    }

    #[test]
    fn test_calibrated_profile_base_from_ranges() {
        let ranges: BTreeMap<Direction, f64> = [
            (Direction::Left, 0.9),
            (Direction::Right, 0.3),
            (Direction::Up, 0.8),
            (Direction::Down, 0.7),
        ]
        .into_iter()
        .collect();
        let profile = crate::calibration::calibrate_from_ranges(&ranges, 0.8, 3.0);
        assert!((profile.overall_scale - 1.3).abs() < 1e-9);

        let mut p = GazeSignalProcessor::new(W, H);
        p.set_calibration(profile);
        assert!((p.axis_scale(-0.1, Direction::Left, Direction::Right) - 1.3).abs() < 1e-9);

        // user sensitivity still wins when set afterwards
        p.set_overall_scale(2.0);
        assert!((p.axis_scale(0.1, Direction::Left, Direction::Right) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_profile_without_directions_sets_base() {
        let mut p = GazeSignalProcessor::new(W, H);
        p.set_calibration(CalibrationProfile { overall_scale: 1.5, ..Default::default() });
        assert_eq!(p.overall_scale(), 1.5);
        assert_eq!(p.axis_scale(-0.2, Direction::Up, Direction::Down), 1.5);
    }

    #[test]
    fn test_invalid_overall_scale_ignored() {
        let mut p = GazeSignalProcessor::new(W, H);
        p.set_overall_scale(0.0);
        p.set_overall_scale(f64::NAN);
        assert_eq!(p.overall_scale(), 2.0);
    }

    #[test]
    fn test_metrics_track_clamps() {
        let mut p = GazeSignalProcessor::new(W, H);
        p.set_overall_scale(50.0);
        p.process_sample_with_metrics(GazeSample { x: 0.5, y: 0.5 });
        let (_, metrics) = p.process_sample_with_metrics(GazeSample { x: 1.0, y: 1.0 });
        assert!((metrics.clamp_rate - 0.5).abs() < 1e-6);
    }
}
