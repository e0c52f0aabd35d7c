// src/source.rs - Gaze sample sources: replay files and a simulated path
use crate::tracking::GazeSample;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, TrySendError};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// One camera frame: `None` when the tracker found no face.
pub type GazeFrame = Option<GazeSample>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("line {line}: {source}")]
    InvalidLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("gaze file has no frames")]
    Empty,
}

pub enum GazeSource {
    Replay(GazeFileReader),
    Simulated(SimulatedGaze),
}

/// JSON-lines replay: each line is `{"x":..,"y":..}` or `null`.
pub struct GazeFileReader {
    path: PathBuf,
    frames: Vec<GazeFrame>,
    current_frame: usize,
}

impl GazeFileReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read gaze file {}", path.display()))?;
        let frames = parse_frames(&text)
            .with_context(|| format!("Invalid gaze file {}", path.display()))?;
        info!("Loaded {} gaze frames from {}", frames.len(), path.display());

        Ok(Self {
            path,
            frames,
            current_frame: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn next_frame(&mut self) -> Option<GazeFrame> {
        let frame = self.frames.get(self.current_frame).copied()?;
        self.current_frame += 1;
        Some(frame)
    }
}

pub fn parse_frames(text: &str) -> Result<Vec<GazeFrame>, SourceError> {
    let mut frames = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let frame: GazeFrame = serde_json::from_str(line)
            .map_err(|source| SourceError::InvalidLine { line: i + 1, source })?;
        // Non-finite coordinates count as a lost face.
        frames.push(frame.filter(|s| s.x.is_finite() && s.y.is_finite()));
    }
    if frames.is_empty() {
        return Err(SourceError::Empty);
    }
    Ok(frames)
}

/// Smooth Lissajous gaze path with periodic face dropouts.
pub struct SimulatedGaze {
    sim_time: f64,
    dt: f64,
    frame: u64,
}

impl SimulatedGaze {
    pub fn new(fps: f32) -> Self {
        Self {
            sim_time: 0.0,
            dt: 1.0 / fps.max(1.0) as f64,
            frame: 0,
        }
    }

    pub fn next_frame(&mut self) -> GazeFrame {
        let t = self.sim_time;
        self.sim_time += self.dt;
        self.frame += 1;

        // drop the face for 5 frames out of every 300
        if self.frame % 300 >= 295 {
            return None;
        }
        Some(GazeSample {
            x: 0.5 + 0.18 * (t * 0.7).sin(),
            y: 0.5 + 0.12 * (t * 1.1).sin(),
        })
    }
}

impl GazeSource {
    pub fn next_frame(&mut self) -> Option<GazeFrame> {
        match self {
            GazeSource::Replay(reader) => reader.next_frame(),
            GazeSource::Simulated(sim) => Some(sim.next_frame()),
        }
    }

    /// Run the source on its own thread at `interval`. The channel holds a
    /// single frame; frames produced while the consumer is busy are dropped.
    pub fn spawn(mut self, interval: Duration) -> (Receiver<GazeFrame>, JoinHandle<()>) {
        let (tx, rx) = sync_channel(1);
        let handle = std::thread::spawn(move || {
            while let Some(frame) = self.next_frame() {
                match tx.try_send(frame) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => break,
                }
                std::thread::sleep(interval);
            }
            debug!("Gaze source finished");
        });
        (rx, handle)
    }
}
