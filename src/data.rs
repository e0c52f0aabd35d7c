// src/data.rs - Gaze trace recording, CSV export and HTML session report
use crate::tracking::{GazeSample, ScreenPoint};
use anyhow::Result;
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct TraceRecord {
    timestamp: f64,
    frame: u64,
    face_detected: bool,
    raw_x: Option<f64>,
    raw_y: Option<f64>,
    filtered_x: Option<f64>,
    filtered_y: Option<f64>,
    screen_x: Option<f64>,
    screen_y: Option<f64>,
    step_clamped: bool,
    drawing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceSample {
    pub timestamp: f64,
    pub raw: Option<GazeSample>,
    pub filtered: Option<GazeSample>,
    pub screen: Option<ScreenPoint>,
    pub step_clamped: bool,
    pub drawing: bool,
}

impl TraceSample {
    pub fn lost(timestamp: f64) -> Self {
        Self {
            timestamp,
            raw: None,
            filtered: None,
            screen: None,
            step_clamped: false,
            drawing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceSummary {
    pub total_frames: usize,
    pub lost_frames: usize,
    pub clamped_frames: usize,
    pub drawing_frames: usize,
    pub mean_step_px: f64,
}

pub struct TraceExporter {
    output_dir: PathBuf,
    session_name: String,
    samples: Vec<TraceSample>,
}

impl TraceExporter {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
            samples: Vec::new(),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn add_sample(&mut self, sample: TraceSample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn session_dir(&self) -> PathBuf {
        self.output_dir.join(&self.session_name)
    }

    pub fn export_csv(&self) -> Result<PathBuf> {
        let csv_path = self.session_dir().join("gaze_trace.csv");
        std::fs::create_dir_all(self.session_dir())?;

        let file = File::create(&csv_path)?;
        let mut writer = Writer::from_writer(file);
        for (frame, sample) in self.samples.iter().enumerate() {
            writer.serialize(Self::create_record(frame as u64, sample))?;
        }
        writer.flush()?;
        Ok(csv_path)
    }

    fn create_record(frame: u64, sample: &TraceSample) -> TraceRecord {
        TraceRecord {
            timestamp: sample.timestamp,
            frame,
            face_detected: sample.raw.is_some(),
            raw_x: sample.raw.map(|s| s.x),
            raw_y: sample.raw.map(|s| s.y),
            filtered_x: sample.filtered.map(|s| s.x),
            filtered_y: sample.filtered.map(|s| s.y),
            screen_x: sample.screen.map(|p| p.x),
            screen_y: sample.screen.map(|p| p.y),
            step_clamped: sample.step_clamped,
            drawing: sample.drawing,
        }
    }

    pub fn summary(&self) -> TraceSummary {
        let points: Vec<ScreenPoint> = self.samples.iter().filter_map(|s| s.screen).collect();
        let steps: Vec<f64> = points
            .windows(2)
            .map(|w| ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt())
            .collect();
        let mean_step_px = if steps.is_empty() {
            0.0
        } else {
            steps.iter().sum::<f64>() / steps.len() as f64
        };

        TraceSummary {
            total_frames: self.samples.len(),
            lost_frames: self.samples.iter().filter(|s| s.raw.is_none()).count(),
            clamped_frames: self.samples.iter().filter(|s| s.step_clamped).count(),
            drawing_frames: self.samples.iter().filter(|s| s.drawing).count(),
            mean_step_px,
        }
    }

    pub fn generate_report(&self, calibration_note: &str) -> Result<PathBuf> {
        let report_path = self.session_dir().join("report.html");
        std::fs::create_dir_all(self.session_dir())?;
        std::fs::write(&report_path, self.create_html_report(calibration_note))?;
        Ok(report_path)
    }

    fn create_html_report(&self, calibration_note: &str) -> String {
        let summary = self.summary();
        let pct = |n: usize| {
            if summary.total_frames == 0 {
                0.0
            } else {
                n as f64 / summary.total_frames as f64 * 100.0
            }
        };

        format!(r#"
<!DOCTYPE html>
<html>
<head>
    <title>Gaze Canvas Report - {}</title>
    <style>
        body {{ font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 40px; background: #f5f5f5; }}
        h1 {{ color: #333; }}
        .stats {{ background: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
        .stat-item {{ margin: 10px 0; }}
        .stat-label {{ font-weight: bold; color: #666; }}
        .stat-value {{ color: #4682EA; font-size: 1.2em; }}
    </style>
</head>
<body>
    <h1>Gaze Session Report</h1>
    <div class="stats">
        <h2>Session: {}</h2>
        <div class="stat-item">
            <span class="stat-label">Total Frames:</span>
            <span class="stat-value">{}</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Face Detection Rate:</span>
            <span class="stat-value">{:.1}%</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Step-Clamped Frames:</span>
            <span class="stat-value">{:.1}%</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Drawing Frames:</span>
            <span class="stat-value">{}</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Mean Cursor Step:</span>
            <span class="stat-value">{:.1} px</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Calibration:</span>
            <span class="stat-value">{}</span>
        </div>
    </div>
</body>
</html>
        "#,
            self.session_name,
            self.session_name,
            summary.total_frames,
            100.0 - pct(summary.lost_frames),
            pct(summary.clamped_frames),
            summary.drawing_frames,
            summary.mean_step_px,
            calibration_note,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64, x: f64, clamped: bool) -> TraceSample {
        TraceSample {
            timestamp: t,
            raw: Some(GazeSample { x: 0.5, y: 0.5 }),
            filtered: Some(GazeSample { x: 0.5, y: 0.5 }),
            screen: Some(ScreenPoint { x, y: 0.0 }),
            step_clamped: clamped,
            drawing: true,
        }
    }

    #[test]
    fn test_summary() {
        let mut exporter = TraceExporter::new(std::env::temp_dir(), Some("unit".into()));
        exporter.add_sample(sample(0.0, 0.0, false));
        exporter.add_sample(TraceSample::lost(0.033));
        exporter.add_sample(sample(0.066, 30.0, true));
        exporter.add_sample(sample(0.1, 40.0, false));

        let summary = exporter.summary();
        assert_eq!(summary.total_frames, 4);
        assert_eq!(summary.lost_frames, 1);
        assert_eq!(summary.clamped_frames, 1);
        assert_eq!(summary.drawing_frames, 3);
        assert!((summary.mean_step_px - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_export_writes_files() {
        let dir = std::env::temp_dir().join(format!("gaze_trace_{}", uuid::Uuid::new_v4()));
        let mut exporter = TraceExporter::new(&dir, None);
        exporter.add_sample(sample(0.0, 1.0, false));
        exporter.add_sample(TraceSample::lost(0.033));

        let csv_path = exporter.export_csv().unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("timestamp,frame,face_detected"));
        assert_eq!(text.lines().count(), 3);

        let report = exporter.generate_report("default").unwrap();
        assert!(std::fs::read_to_string(report).unwrap().contains("Gaze Session Report"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
