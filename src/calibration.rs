// src/calibration.rs - Guided per-direction calibration and profile persistence
use crate::config::PipelineConstants;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CALIBRATION_STORAGE_KEY: &str = "gaze_calibration";
pub const DEFAULT_OVERALL_SCALE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Left, Direction::Right, Direction::Up, Direction::Down];

    pub fn axis(&self) -> Axis {
        match self {
            Self::Left | Self::Right => Axis::X,
            Self::Up | Self::Down => Axis::Y,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    fn next(&self) -> Option<Direction> {
        match self {
            Self::Left => Some(Self::Right),
            Self::Right => Some(Self::Up),
            Self::Up => Some(Self::Down),
            Self::Down => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionScales {
    pub left: f64,
    pub right: f64,
    pub up: f64,
    pub down: f64,
}

impl DirectionScales {
    pub fn get(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Left => self.left,
            Direction::Right => self.right,
            Direction::Up => self.up,
            Direction::Down => self.down,
        }
    }

    pub fn mean(&self) -> f64 {
        (self.left + self.right + self.up + self.down) / 4.0
    }

    fn is_valid(&self) -> bool {
        Direction::ALL
            .iter()
            .all(|d| self.get(*d).is_finite() && self.get(*d) > 0.0)
    }
}

/// Result of one calibration run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub per_direction_scale: Option<DirectionScales>,
    #[serde(default)]
    pub per_direction_range: BTreeMap<Direction, f64>,
    pub overall_scale: f64,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self {
            per_direction_scale: None,
            per_direction_range: BTreeMap::new(),
            overall_scale: DEFAULT_OVERALL_SCALE,
        }
    }
}

impl CalibrationProfile {
    fn is_valid(&self) -> bool {
        self.overall_scale.is_finite()
            && self.overall_scale > 0.0
            && self.per_direction_scale.map_or(true, |s| s.is_valid())
    }
}

/// Boost for a direction whose observed cursor range fell short of `target`.
pub fn multiplier_for_range(range: f64, target: f64, max_boost: f64) -> f64 {
    if range >= target {
        1.0
    } else {
        (1.0 + (target - range) * 2.0).min(max_boost)
    }
}

pub fn calibrate_from_ranges(
    ranges: &BTreeMap<Direction, f64>,
    target: f64,
    max_boost: f64,
) -> CalibrationProfile {
    let scale = |d: Direction| {
        let range = ranges.get(&d).copied().unwrap_or(0.0);
        multiplier_for_range(range, target, max_boost)
    };
    let scales = DirectionScales {
        left: scale(Direction::Left),
        right: scale(Direction::Right),
        up: scale(Direction::Up),
        down: scale(Direction::Down),
    };

    CalibrationProfile {
        per_direction_scale: Some(scales),
        per_direction_range: ranges.clone(),
        overall_scale: scales.mean(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Idle,
    Collecting(Direction),
    Pausing(Direction),
    Complete,
}

#[derive(Debug, Clone)]
pub struct CalibrationTiming {
    pub collection_window: Duration,
    pub direction_pause: Duration,
    pub sample_interval: Duration,
    pub target_range: f64,
    pub max_boost: f64,
}

impl From<&PipelineConstants> for CalibrationTiming {
    fn from(c: &PipelineConstants) -> Self {
        Self {
            collection_window: c.collection_window,
            direction_pause: c.direction_pause,
            sample_interval: c.sample_interval,
            target_range: c.target_range,
            max_boost: c.max_boost,
        }
    }
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self::from(&PipelineConstants::default())
    }
}

/// Linear left → right → up → down collection run.
///
/// Driven by `poll` ticks rather than timers: a skipped or finished session
/// simply stops reacting, so nothing can fire after `skip()`.
pub struct CalibrationSession {
    phase: CalibrationPhase,
    phase_started: Option<Instant>,
    last_sample: Option<Instant>,
    samples: HashMap<Direction, Vec<f64>>,
    profile: Option<CalibrationProfile>,
    timing: CalibrationTiming,
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self::new(CalibrationTiming::default())
    }
}

impl CalibrationSession {
    pub fn new(timing: CalibrationTiming) -> Self {
        Self {
            phase: CalibrationPhase::Idle,
            phase_started: None,
            last_sample: None,
            samples: HashMap::new(),
            profile: None,
            timing,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            CalibrationPhase::Collecting(_) | CalibrationPhase::Pausing(_)
        )
    }

    pub fn start(&mut self, now: Instant) {
        info!("Calibration started");
        self.samples.clear();
        self.profile = None;
        self.last_sample = None;
        self.enter(CalibrationPhase::Collecting(Direction::Left), now);
    }

    /// Abort to `Complete` with the default profile.
    pub fn skip(&mut self) {
        info!("Calibration skipped, using default profile");
        self.samples.clear();
        self.phase = CalibrationPhase::Complete;
        self.phase_started = None;
        self.last_sample = None;
        self.profile = Some(CalibrationProfile::default());
    }

    pub fn profile(&self) -> Option<&CalibrationProfile> {
        match self.phase {
            CalibrationPhase::Complete => self.profile.as_ref(),
            _ => None,
        }
    }

    pub fn samples(&self, direction: Direction) -> &[f64] {
        self.samples.get(&direction).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn instruction(&self) -> &'static str {
        match self.phase {
            CalibrationPhase::Idle => "Press start to calibrate",
            CalibrationPhase::Collecting(Direction::Left) => "Look as far LEFT as you can",
            CalibrationPhase::Collecting(Direction::Right) => "Look as far RIGHT as you can",
            CalibrationPhase::Collecting(Direction::Up) => "Look as far UP as you can",
            CalibrationPhase::Collecting(Direction::Down) => "Look as far DOWN as you can",
            CalibrationPhase::Pausing(_) => "Relax, return to center",
            CalibrationPhase::Complete => "Calibration complete",
        }
    }

    /// Advance the session. `cursor` is the current cursor in normalized
    /// canvas coordinates. Returns the profile when this tick completed the run.
    pub fn poll(&mut self, now: Instant, cursor: Option<(f64, f64)>) -> Option<CalibrationProfile> {
        loop {
            let Some(started) = self.phase_started else {
                return None;
            };
            let elapsed = now.saturating_duration_since(started);

            match self.phase {
                CalibrationPhase::Collecting(direction) => {
                    if elapsed >= self.timing.collection_window {
                        debug!(
                            "Collected {} samples for {}",
                            self.samples(direction).len(),
                            direction.as_str()
                        );
                        let next_start = started + self.timing.collection_window;
                        if direction.next().is_some() {
                            self.enter(CalibrationPhase::Pausing(direction), next_start);
                            continue;
                        }
                        return Some(self.finish());
                    }

                    let due = self
                        .last_sample
                        .map_or(true, |t| now.saturating_duration_since(t) >= self.timing.sample_interval);
                    if let (true, Some((x, y))) = (due, cursor) {
                        let value = match direction.axis() {
                            Axis::X => x,
                            Axis::Y => y,
                        };
                        self.samples.entry(direction).or_default().push(value);
                        self.last_sample = Some(now);
                    }
                    return None;
                }
                CalibrationPhase::Pausing(direction) => {
                    if elapsed < self.timing.direction_pause {
                        return None;
                    }
                    let next_start = started + self.timing.direction_pause;
                    match direction.next() {
                        Some(next) => {
                            self.last_sample = None;
                            self.enter(CalibrationPhase::Collecting(next), next_start);
                        }
                        None => return Some(self.finish()),
                    }
                }
                CalibrationPhase::Idle | CalibrationPhase::Complete => return None,
            }
        }
    }

    fn enter(&mut self, phase: CalibrationPhase, at: Instant) {
        self.phase = phase;
        self.phase_started = Some(at);
    }

    fn finish(&mut self) -> CalibrationProfile {
        let ranges: BTreeMap<Direction, f64> = Direction::ALL
            .iter()
            .map(|d| {
                let values = self.samples(*d);
                let range = if values.is_empty() {
                    0.0
                } else {
                    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    max - min
                };
                (*d, range)
            })
            .collect();

        let profile = calibrate_from_ranges(&ranges, self.timing.target_range, self.timing.max_boost);
        info!(
            "Calibration complete: overall scale {:.2}, ranges {:?}",
            profile.overall_scale, ranges
        );

        self.phase = CalibrationPhase::Complete;
        self.phase_started = None;
        self.profile = Some(profile.clone());
        profile
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("calibration storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("calibration profile encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
}

pub trait CalibrationStore {
    fn save(&self, profile: &CalibrationProfile) -> Result<(), StoreError>;
    fn load(&self) -> Option<CalibrationProfile>;
}

/// Stores the profile as JSON under a fixed key in the user data directory.
pub struct JsonCalibrationStore {
    path: PathBuf,
}

impl JsonCalibrationStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir
                .as_ref()
                .join(format!("{}.json", CALIBRATION_STORAGE_KEY)),
        }
    }

    pub fn default_location() -> Option<Self> {
        crate::config::project_dirs().map(|dirs| Self::new(dirs.data_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationStore for JsonCalibrationStore {
    fn save(&self, profile: &CalibrationProfile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(profile)?;
        std::fs::write(&self.path, json)?;
        info!("Saved calibration profile to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Option<CalibrationProfile> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No saved calibration at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read calibration {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<CalibrationProfile>(&text) {
            Ok(profile) if profile.is_valid() => Some(profile),
            Ok(_) => {
                warn!("Ignoring calibration with non-positive scales");
                None
            }
            Err(e) => {
                warn!("Ignoring malformed calibration {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gaze_canvas_test_{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_multiplier_rules() {
        assert_eq!(multiplier_for_range(0.9, 0.8, 3.0), 1.0);
        assert_eq!(multiplier_for_range(0.8, 0.8, 3.0), 1.0);
        assert!((multiplier_for_range(0.3, 0.8, 3.0) - 2.0).abs() < 1e-12);
        assert_eq!(multiplier_for_range(0.0, 0.8, 3.0), 2.6);
        assert_eq!(multiplier_for_range(-1.0, 0.8, 3.0), 3.0);
    }

    #[test]
    fn test_profile_from_ranges() {
        let mut ranges = BTreeMap::new();
        ranges.insert(Direction::Left, 0.9);
        ranges.insert(Direction::Right, 0.3);
        ranges.insert(Direction::Up, 0.8);
        ranges.insert(Direction::Down, 0.7);
        let profile = calibrate_from_ranges(&ranges, 0.8, 3.0);
        let scales = profile.per_direction_scale.unwrap();
        assert_eq!(scales.left, 1.0);
        assert!((scales.right - 2.0).abs() < 1e-12);
        assert_eq!(scales.up, 1.0);
        assert!((scales.down - 1.2).abs() < 1e-12);
        assert!((profile.overall_scale - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_default_profile() {
        let p = CalibrationProfile::default();
        assert_eq!(p.overall_scale, 2.0);
        assert!(p.per_direction_scale.is_none());
    }

    #[test]
    fn test_phase_sequence() {
        let t0 = Instant::now();
        let mut session = CalibrationSession::default();
        assert_eq!(session.phase(), CalibrationPhase::Idle);
        session.start(t0);
        assert_eq!(session.phase(), CalibrationPhase::Collecting(Direction::Left));

        session.poll(t0 + ms(3000), Some((0.5, 0.5)));
        assert_eq!(session.phase(), CalibrationPhase::Pausing(Direction::Left));
        session.poll(t0 + ms(5000), Some((0.5, 0.5)));
        assert_eq!(session.phase(), CalibrationPhase::Collecting(Direction::Right));
        session.poll(t0 + ms(10000), None);
        assert_eq!(session.phase(), CalibrationPhase::Collecting(Direction::Up));
        assert!(session.profile().is_none());
        session.poll(t0 + ms(15000), None);
        assert_eq!(session.phase(), CalibrationPhase::Collecting(Direction::Down));
        let done = session.poll(t0 + ms(18000), None);
        assert!(done.is_some());
        assert_eq!(session.phase(), CalibrationPhase::Complete);
        assert!(session.profile().is_some());
    }

    #[test]
    fn test_sampling_rate_limited_to_interval() {
        let t0 = Instant::now();
        let mut session = CalibrationSession::default();
        session.start(t0);
        for step in 0..30 {
            session.poll(t0 + ms(step * 50), Some((0.1, 0.5)));
        }
        // 0..1450ms at 10 Hz
        assert_eq!(session.samples(Direction::Left).len(), 15);
    }

    #[test]
    fn test_collected_ranges_drive_profile() {
        let t0 = Instant::now();
        let mut session = CalibrationSession::default();
        session.start(t0);

        let mut t = 0u64;
        let mut drive = |session: &mut CalibrationSession, until: u64, cursor: (f64, f64)| {
            let mut last = None;
            while t <= until {
                if let Some(p) = session.poll(t0 + ms(t), Some(cursor)) {
                    last = Some(p);
                }
                t += 100;
            }
            last
        };

        // left spans x in [0.05, 0.95], right barely moves
        drive(&mut session, 1000, (0.05, 0.5));
        drive(&mut session, 2900, (0.95, 0.5));
        drive(&mut session, 4900, (0.5, 0.5));
        drive(&mut session, 6000, (0.4, 0.5));
        drive(&mut session, 7900, (0.7, 0.5));
        drive(&mut session, 9900, (0.5, 0.5));
        drive(&mut session, 12900, (0.5, 0.1));
        drive(&mut session, 14900, (0.5, 0.5));
        let profile = drive(&mut session, 18000, (0.5, 0.9)).expect("completed");

        let scales = profile.per_direction_scale.unwrap();
        assert_eq!(scales.left, 1.0);
        assert!((scales.right - 2.0).abs() < 1e-9);
        assert!((profile.per_direction_range[&Direction::Left] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_skip_yields_default_and_ignores_later_ticks() {
        let t0 = Instant::now();
        let mut session = CalibrationSession::default();
        session.start(t0);
        session.poll(t0 + ms(100), Some((0.2, 0.2)));
        session.skip();
        assert_eq!(session.phase(), CalibrationPhase::Complete);
        assert_eq!(session.profile(), Some(&CalibrationProfile::default()));

        assert!(session.poll(t0 + ms(60_000), Some((0.9, 0.9))).is_none());
        assert_eq!(session.profile(), Some(&CalibrationProfile::default()));
        assert!(session.samples(Direction::Left).is_empty());
    }

    #[test]
    fn test_store_round_trip_and_malformed() {
        let dir = scratch_dir();
        let store = JsonCalibrationStore::new(&dir);
        assert!(store.load().is_none());

        let mut ranges = BTreeMap::new();
        ranges.insert(Direction::Left, 0.5);
        let profile = calibrate_from_ranges(&ranges, 0.8, 3.0);
        store.save(&profile).unwrap();
        assert_eq!(store.load(), Some(profile));

        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_none());

        std::fs::write(store.path(), r#"{"per_direction_scale":null,"overall_scale":-1.0}"#).unwrap();
        assert!(store.load().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
