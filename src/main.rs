// src/main.rs
mod app;
mod calibration;
mod config;
mod credentials;
mod data;
mod device;
mod filter;
mod menu;
mod protocol;
mod source;
mod surface;
mod tracking;
mod transport;
mod ui;

use anyhow::Result;
use clap::Parser;
use eframe::egui;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::GazeCanvasApp;
use crate::calibration::{CalibrationSession, CalibrationTiming, JsonCalibrationStore};
use crate::config::{AppConfig, PipelineConstants};
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::data::TraceExporter;
use crate::device::{SessionConfig, SharedSessionInfo};
use crate::menu::CommandDebouncer;
use crate::protocol::CommandEvent;
use crate::source::{GazeFileReader, GazeSource, SimulatedGaze};
use crate::tracking::GazeSignalProcessor;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::parse();
    let constants = PipelineConstants::default();

    let source = match &config.gaze_file {
        Some(path) => GazeSource::Replay(GazeFileReader::new(path)?),
        None => GazeSource::Simulated(SimulatedGaze::new(config.fps)),
    };

    let mut app = build_app(&config, &constants);
    if let Some((commands, info)) = spawn_headset(&config, &constants) {
        app = app.with_commands(commands, info);
    }

    if config.headless {
        run_headless(app, source, &config);
        return Ok(());
    }

    let (gaze_rx, _source_thread) = source.spawn(config.frame_interval());
    let app = app.with_gaze_source(gaze_rx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.width as f32 + 260.0, config.height as f32 + 60.0])
            .with_min_inner_size([800.0, 600.0]),
        centered: true,
        ..Default::default()
    };

    let result = eframe::run_native(
        "Gaze Canvas",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(create_visuals());
            Box::new(app)
        }),
    );

    if let Err(e) = result {
        error!("Error running application: {:?}", e);
    }
    Ok(())
}

fn build_app(config: &AppConfig, constants: &PipelineConstants) -> GazeCanvasApp {
    let processor = GazeSignalProcessor::with_constants(config.width, config.height, constants);
    let calibration = CalibrationSession::new(CalibrationTiming::from(constants));
    let trace = TraceExporter::new(config.output_directory(), None);

    let mut app = GazeCanvasApp::new(processor, calibration, trace)
        .with_debouncer(CommandDebouncer::new(constants.action_debounce));
    match JsonCalibrationStore::default_location() {
        Some(store) => app = app.with_calibration_store(Box::new(store)),
        None => warn!("No data directory; calibration will not persist"),
    }
    app.with_overall_scale(config.overall_scale)
}

/// Start the headset session on its own thread with a current-thread runtime.
/// Returns `None` when the headset is disabled or no credentials are found.
fn spawn_headset(
    config: &AppConfig,
    constants: &PipelineConstants,
) -> Option<(mpsc::UnboundedReceiver<CommandEvent>, SharedSessionInfo)> {
    if config.no_headset {
        info!("Headset disabled");
        return None;
    }

    let Some(credentials) = FileCredentialStore::default_location().and_then(|s| s.get_credentials()) else {
        warn!("No headset credentials found; continuing with gaze only");
        return None;
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let info = SharedSessionInfo::default();
    let session_config = SessionConfig {
        streams: config.streams.clone(),
        intensity_threshold: constants.intensity_threshold,
    };
    let url = config.endpoint.clone();
    let thread_info = info.clone();

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to start headset runtime: {}", e);
                return;
            }
        };
        let final_info = runtime.block_on(device::connect_and_run(
            &url,
            credentials,
            session_config,
            tx,
            thread_info,
        ));
        info!("Headset session ended: {}", final_info.phase.as_str());
    });

    Some((rx, info))
}

/// Feed the source through the pipeline on a synthetic clock, then export.
fn run_headless(mut app: GazeCanvasApp, mut source: GazeSource, config: &AppConfig) {
    let limit = match source {
        GazeSource::Replay(ref reader) => reader.total_frames(),
        GazeSource::Simulated(_) => config.headless_frames(),
    };
    let interval = config.frame_interval();
    let start = Instant::now();

    let mut processed = 0;
    while processed < limit {
        let Some(frame) = source.next_frame() else {
            break;
        };
        let now = start + interval * processed as u32;
        app.handle_gaze_frame(frame, now);
        app.tick(now);
        processed += 1;
    }

    let summary = app.trace().summary();
    info!(
        "Processed {} frames ({} without a face, {} clamped)",
        summary.total_frames, summary.lost_frames, summary.clamped_frames
    );
    app.export_trace();
}

fn create_visuals() -> egui::Visuals {
    let mut visuals = egui::Visuals::dark();

    visuals.widgets.noninteractive.bg_fill = egui::Color32::from_rgb(30, 30, 35);
    visuals.widgets.inactive.bg_fill = egui::Color32::from_rgb(45, 45, 52);
    visuals.widgets.hovered.bg_fill = egui::Color32::from_rgb(55, 55, 65);
    visuals.widgets.active.bg_fill = egui::Color32::from_rgb(70, 130, 240);

    visuals.widgets.noninteractive.rounding = egui::Rounding::same(8.0);
    visuals.widgets.inactive.rounding = egui::Rounding::same(8.0);
    visuals.widgets.hovered.rounding = egui::Rounding::same(8.0);
    visuals.widgets.active.rounding = egui::Rounding::same(8.0);

    visuals.window_rounding = egui::Rounding::same(12.0);
    visuals.menu_rounding = egui::Rounding::same(8.0);

    visuals
}
