// src/config.rs - Command-line configuration and pipeline tunables
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "wss://localhost:6868";
pub const DEFAULT_STREAMS: &str = "com";

/// Tunables recognised by the gaze pipeline and the headset wiring.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConstants {
    pub intensity_threshold: f64,
    pub action_debounce: Duration,
    pub ema_alpha: f64,
    pub step_clamp_fraction: f64,
    pub collection_window: Duration,
    pub direction_pause: Duration,
    pub sample_interval: Duration,
    pub target_range: f64,
    pub max_boost: f64,
    pub default_overall_scale: f64,
}

impl Default for PipelineConstants {
    fn default() -> Self {
        Self {
            intensity_threshold: 0.5,
            action_debounce: Duration::from_millis(1000),
            ema_alpha: 0.25,
            step_clamp_fraction: 0.06,
            collection_window: Duration::from_millis(3000),
            direction_pause: Duration::from_millis(2000),
            sample_interval: Duration::from_millis(100),
            target_range: 0.8,
            max_boost: 3.0,
            default_overall_scale: 2.0,
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[command(about = "Draw on a canvas with gaze and headset commands", author, version)]
pub struct AppConfig {
    /// Headset service WebSocket endpoint
    #[arg(long, env = "GAZE_CANVAS_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Comma-separated stream names to subscribe to
    #[arg(long, env = "GAZE_CANVAS_STREAMS", default_value = DEFAULT_STREAMS, value_delimiter = ',')]
    pub streams: Vec<String>,

    /// Do not connect to the headset service
    #[arg(long = "no-headset", default_value_t = false)]
    pub no_headset: bool,

    /// JSON-lines gaze replay file; a simulated gaze path is used when omitted
    #[arg(long)]
    pub gaze_file: Option<PathBuf>,

    /// Gaze source frame rate
    #[arg(long, default_value_t = 30.0)]
    pub fps: f32,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 1200.0)]
    pub width: f64,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 800.0)]
    pub height: f64,

    /// Base sensitivity applied to gaze offsets
    #[arg(long = "overall-scale")]
    pub overall_scale: Option<f64>,

    /// Run the pipeline without a window and export the trace
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Seconds of simulated gaze to process in headless mode
    #[arg(long, default_value_t = 30.0)]
    pub duration: f64,

    /// Directory for trace exports
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn output_directory(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            directories::UserDirs::new()
                .and_then(|dirs| dirs.document_dir().map(|p| p.join("GazeCanvas")))
                .unwrap_or_else(|| PathBuf::from("./output"))
        })
    }

    /// Frame cap for a headless run of the simulated source.
    pub fn headless_frames(&self) -> usize {
        let secs = if self.duration.is_finite() { self.duration.max(0.0) } else { 0.0 };
        (secs / self.frame_interval().as_secs_f64()).round() as usize
    }

    pub fn frame_interval(&self) -> Duration {
        let fps = if self.fps.is_finite() && self.fps > 0.0 { self.fps } else { 30.0 };
        Duration::from_secs_f32(1.0 / fps)
    }
}

/// Per-user directory for persisted profile and credentials.
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "gazecanvas", "GazeCanvas")
}
