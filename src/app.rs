// src/app.rs - Wires gaze frames and headset commands into the canvas
use crate::calibration::{CalibrationProfile, CalibrationSession, CalibrationStore};
use crate::data::{TraceExporter, TraceSample};
use crate::device::{SessionInfo, SharedSessionInfo};
use crate::menu::{CommandDebouncer, CommandMenu, MentalCommand, MenuAction, MENU_SECTIONS};
use crate::protocol::CommandEvent;
use crate::source::GazeFrame;
use crate::surface::{DrawingSurface, StrokeCanvas};
use crate::tracking::{GazeSignalProcessor, PerformanceMetrics};
use crate::ui::{Theme, UIComponents};

use eframe::egui;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

pub struct GazeCanvasApp {
    // Core components
    processor: GazeSignalProcessor,
    canvas: StrokeCanvas,
    menu: CommandMenu,
    debouncer: CommandDebouncer,
    calibration: CalibrationSession,
    calibration_store: Option<Box<dyn CalibrationStore>>,

    // Inputs
    gaze_rx: Option<Receiver<GazeFrame>>,
    command_rx: Option<UnboundedReceiver<CommandEvent>>,
    session_info: Option<SharedSessionInfo>,

    // Recording
    trace: TraceExporter,
    started: Instant,
    metrics: Option<PerformanceMetrics>,

    // UI state
    ui_components: UIComponents,
    show_settings: bool,
}

impl GazeCanvasApp {
    pub fn new(
        processor: GazeSignalProcessor,
        calibration: CalibrationSession,
        trace: TraceExporter,
    ) -> Self {
        Self {
            processor,
            canvas: StrokeCanvas::new(),
            menu: CommandMenu::new(),
            debouncer: CommandDebouncer::default(),
            calibration,
            calibration_store: None,
            gaze_rx: None,
            command_rx: None,
            session_info: None,
            trace,
            started: Instant::now(),
            metrics: None,
            ui_components: UIComponents::new(Theme::default()),
            show_settings: false,
        }
    }

    pub fn with_debouncer(mut self, debouncer: CommandDebouncer) -> Self {
        self.debouncer = debouncer;
        self
    }

    pub fn with_calibration_store(mut self, store: Box<dyn CalibrationStore>) -> Self {
        if let Some(profile) = store.load() {
            info!("Loaded saved calibration (overall scale {:.2})", profile.overall_scale);
            self.processor.set_calibration(profile);
        }
        self.calibration_store = Some(store);
        self
    }

    /// Command-line base scale; applied after any stored profile.
    pub fn with_overall_scale(mut self, scale: Option<f64>) -> Self {
        if let Some(scale) = scale {
            self.processor.set_overall_scale(scale);
        }
        self
    }

    pub fn with_gaze_source(mut self, rx: Receiver<GazeFrame>) -> Self {
        self.gaze_rx = Some(rx);
        self
    }

    pub fn with_commands(mut self, rx: UnboundedReceiver<CommandEvent>, info: SharedSessionInfo) -> Self {
        self.command_rx = Some(rx);
        self.session_info = Some(info);
        self
    }

    pub fn canvas(&self) -> &StrokeCanvas {
        &self.canvas
    }

    pub fn menu(&self) -> &CommandMenu {
        &self.menu
    }

    pub fn processor(&self) -> &GazeSignalProcessor {
        &self.processor
    }

    pub fn calibration(&self) -> &CalibrationSession {
        &self.calibration
    }

    pub fn trace(&self) -> &TraceExporter {
        &self.trace
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session_info
            .as_ref()
            .map(|info| info.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    /// Feed one camera frame through the pipeline. Frames without a face do
    /// not touch the processor; its state holds until the next detection.
    pub fn handle_gaze_frame(&mut self, frame: GazeFrame, now: Instant) {
        let timestamp = now.saturating_duration_since(self.started).as_secs_f64();
        let Some(sample) = frame else {
            self.trace.add_sample(TraceSample::lost(timestamp));
            return;
        };

        let (point, metrics) = self.processor.process_sample_with_metrics(sample);
        self.canvas.draw(point.x, point.y);
        self.metrics = Some(metrics);

        self.trace.add_sample(TraceSample {
            timestamp,
            raw: Some(sample),
            filtered: self.processor.last_filtered(),
            screen: Some(point),
            step_clamped: self.processor.last_step_clamped(),
            drawing: self.canvas.is_drawing(),
        });
    }

    /// Debounce and route one headset command. Returns the action it ran.
    pub fn handle_command(&mut self, event: &CommandEvent, now: Instant) -> Option<MenuAction> {
        let Some(command) = MentalCommand::from_name(&event.name) else {
            debug!("Ignoring command {}", event.name);
            return None;
        };
        if !self.debouncer.accept(now) {
            debug!("Debounced command {}", event.name);
            return None;
        }

        let action = self.menu.handle(command)?;
        self.apply_action(action, now);
        Some(action)
    }

    pub fn apply_action(&mut self, action: MenuAction, now: Instant) {
        match action {
            MenuAction::StartDrawing => self.canvas.start_drawing(),
            MenuAction::StopDrawing => self.canvas.stop_drawing(),
            MenuAction::ToggleEraser => self.canvas.toggle_eraser(),
            MenuAction::Undo => self.canvas.undo(),
            MenuAction::Redo => self.canvas.redo(),
            MenuAction::ClearCanvas => self.canvas.clear_canvas(),
            MenuAction::Recalibrate => self.start_calibration(now),
            MenuAction::ResetGaze => self.processor.reset_filters(),
        }
    }

    /// Escape key: back to the top-level menu.
    pub fn clear_menu(&mut self) {
        self.menu.clear();
    }

    /// Collection runs on the uncalibrated mapping so the measured ranges
    /// are not already boosted by the previous profile.
    pub fn start_calibration(&mut self, now: Instant) {
        self.canvas.stop_drawing();
        self.processor.set_calibration(CalibrationProfile::default());
        self.calibration.start(now);
    }

    pub fn skip_calibration(&mut self) {
        if !self.calibration.is_active() {
            return;
        }
        self.calibration.skip();
        if let Some(profile) = self.calibration.profile() {
            self.processor.set_calibration(profile.clone());
        }
    }

    fn poll_calibration(&mut self, now: Instant) {
        if !self.calibration.is_active() {
            return;
        }
        let (width, height) = self.processor.size();
        let cursor = self
            .canvas
            .cursor()
            .filter(|_| width > 0.0 && height > 0.0)
            .map(|p| ((p.x / width).clamp(0.0, 1.0), (p.y / height).clamp(0.0, 1.0)));

        if let Some(profile) = self.calibration.poll(now, cursor) {
            self.processor.set_calibration(profile.clone());
            if let Some(store) = &self.calibration_store {
                if let Err(e) = store.save(&profile) {
                    warn!("Could not persist calibration: {}", e);
                }
            }
        }
    }

    /// Drain pending gaze frames and headset commands, then advance calibration.
    pub fn tick(&mut self, now: Instant) {
        if let Some(rx) = self.gaze_rx.take() {
            let mut keep = true;
            loop {
                match rx.try_recv() {
                    Ok(frame) => self.handle_gaze_frame(frame, now),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        info!("Gaze source ended");
                        keep = false;
                        break;
                    }
                }
            }
            if keep {
                self.gaze_rx = Some(rx);
            }
        }

        if let Some(mut rx) = self.command_rx.take() {
            while let Ok(event) = rx.try_recv() {
                self.handle_command(&event, now);
            }
            self.command_rx = Some(rx);
        }

        self.poll_calibration(now);
    }

    fn calibration_note(&self) -> String {
        match self.processor.calibration().and_then(|p| p.per_direction_scale) {
            Some(s) => format!(
                "L {:.2} / R {:.2} / U {:.2} / D {:.2}",
                s.left, s.right, s.up, s.down
            ),
            None => format!("none (scale {:.2})", self.processor.overall_scale()),
        }
    }

    pub fn export_trace(&self) {
        if self.trace.is_empty() {
            return;
        }
        match self.trace.export_csv() {
            Ok(path) => info!("Trace exported to {}", path.display()),
            Err(e) => warn!("Trace export failed: {}", e),
        }
        match self.trace.generate_report(&self.calibration_note()) {
            Ok(path) => info!("Report written to {}", path.display()),
            Err(e) => warn!("Report generation failed: {}", e),
        }
    }
}

impl eframe::App for GazeCanvasApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.tick(now);

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.clear_menu();
        }

        self.render_header(ctx);
        self.render_menu_panel(ctx);

        if self.show_settings {
            self.render_settings_window(ctx);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            let rect = self.ui_components.draw_canvas(ui, &self.canvas);
            let (w, h) = self.processor.size();
            if (rect.width() as f64 - w).abs() > 0.5 || (rect.height() as f64 - h).abs() > 0.5 {
                self.processor.resize(rect.width() as f64, rect.height() as f64);
            }
            if self.calibration.is_active() {
                self.ui_components
                    .draw_calibration_overlay(ui, rect, self.calibration.instruction());
            }
        });

        ctx.request_repaint();
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.export_trace();
    }
}

impl GazeCanvasApp {
    fn render_header(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.heading("Gaze Canvas");
                ui.separator();

                let status = self
                    .session_info()
                    .map(|info| info.phase.as_str().to_string())
                    .unwrap_or_else(|| "headset disabled".to_string());
                self.ui_components.draw_status_chip(ui, "Headset", &status);

                if let Some(metrics) = &self.metrics {
                    ui.label(format!(
                        "{:.0} µs/sample, clamp {:.0}%",
                        metrics.avg_processing_time * 1e6,
                        metrics.clamp_rate * 100.0
                    ));
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("⚙ Settings").clicked() {
                        self.show_settings = !self.show_settings;
                    }
                    if self.calibration.is_active() {
                        if ui.button("Skip calibration").clicked() {
                            self.skip_calibration();
                        }
                    } else if ui.button("Calibrate").clicked() {
                        self.start_calibration(Instant::now());
                    }
                });
            });
            ui.add_space(6.0);
        });
    }

    fn render_menu_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("menu").min_width(220.0).show(ctx, |ui| {
            ui.heading("Headset Menu");
            ui.add_space(8.0);
            for (i, section) in MENU_SECTIONS.iter().enumerate() {
                self.ui_components
                    .draw_menu_section(ui, i, section, self.menu.selected() == Some(i));
            }
            ui.add_space(8.0);
            ui.label("Esc returns to the top level");
            ui.separator();

            let state = if self.canvas.is_eraser() { "eraser" } else { "pen" };
            let drawing = if self.canvas.is_drawing() { "drawing" } else { "idle" };
            ui.label(format!("Tool: {}, {}", state, drawing));
            ui.label(format!("Strokes: {}", self.canvas.strokes().len()));

            ui.horizontal(|ui| {
                if ui.button("Undo").clicked() {
                    self.canvas.undo();
                }
                if ui.button("Redo").clicked() {
                    self.canvas.redo();
                }
                if ui.button("Clear").clicked() {
                    self.canvas.clear_canvas();
                }
            });
        });
    }

    fn render_settings_window(&mut self, ctx: &egui::Context) {
        let mut scale = self.processor.overall_scale();
        egui::Window::new("Settings")
            .open(&mut self.show_settings)
            .resizable(false)
            .default_size([320.0, 200.0])
            .show(ctx, |ui| {
                ui.heading("Gaze Settings");
                ui.label("Overall sensitivity:");
                ui.add(egui::Slider::new(&mut scale, 0.5..=5.0).step_by(0.1));
            });
        if (scale - self.processor.overall_scale()).abs() > f64::EPSILON {
            self.processor.set_overall_scale(scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{DirectionScales, StoreError};
    use crate::tracking::GazeSample;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct MemoryStore {
        profile: Arc<Mutex<Option<CalibrationProfile>>>,
        saves: Arc<Mutex<usize>>,
    }

    impl CalibrationStore for MemoryStore {
        fn save(&self, profile: &CalibrationProfile) -> Result<(), StoreError> {
            *self.profile.lock().unwrap() = Some(profile.clone());
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }

        fn load(&self) -> Option<CalibrationProfile> {
            self.profile.lock().unwrap().clone()
        }
    }

    fn boosted_profile() -> CalibrationProfile {
        let scales = DirectionScales { left: 1.0, right: 2.0, up: 1.0, down: 1.2 };
        CalibrationProfile {
            per_direction_scale: Some(scales),
            per_direction_range: Default::default(),
            overall_scale: scales.mean(),
        }
    }

    fn app() -> GazeCanvasApp {
        GazeCanvasApp::new(
            GazeSignalProcessor::new(1000.0, 600.0),
            CalibrationSession::default(),
            TraceExporter::new(std::env::temp_dir(), Some("app_test".into())),
        )
    }

    fn cmd(name: &str) -> CommandEvent {
        CommandEvent { name: name.into(), intensity: 0.9 }
    }

    #[test]
    fn test_commands_select_and_execute() {
        let mut app = app();
        let t0 = Instant::now();
        assert_eq!(app.handle_command(&cmd("push"), t0), None);
        assert_eq!(app.menu().selected(), Some(0));

        let action = app.handle_command(&cmd("push"), t0 + Duration::from_millis(1100));
        assert_eq!(action, Some(MenuAction::StartDrawing));
        assert!(app.canvas().is_drawing());
    }

    #[test]
    fn test_debounce_drops_close_commands() {
        let mut app = app();
        let t0 = Instant::now();
        app.handle_command(&cmd("pull"), t0);
        assert_eq!(app.handle_command(&cmd("lift"), t0 + Duration::from_millis(400)), None);
        assert_eq!(app.menu().selected(), Some(1));
        assert_eq!(
            app.handle_command(&cmd("lift"), t0 + Duration::from_millis(1100)),
            Some(MenuAction::ClearCanvas)
        );
        assert_eq!(app.menu().selected(), Some(1));

        app.clear_menu();
        assert_eq!(app.menu().selected(), None);
    }

    #[test]
    fn test_unknown_command_does_not_consume_window() {
        let mut app = app();
        let t0 = Instant::now();
        app.handle_command(&cmd("neutral"), t0);
        app.handle_command(&cmd("push"), t0 + Duration::from_millis(10));
        assert_eq!(app.menu().selected(), Some(0));
    }

    #[test]
    fn test_gaze_frames_draw_when_enabled() {
        let mut app = app();
        let t0 = Instant::now();
        app.apply_action(MenuAction::StartDrawing, t0);
        for _ in 0..10 {
            app.handle_gaze_frame(Some(GazeSample { x: 0.4, y: 0.6 }), t0);
        }
        app.handle_gaze_frame(None, t0);
        app.apply_action(MenuAction::StopDrawing, t0);

        assert_eq!(app.canvas().strokes().len(), 1);
        assert_eq!(app.canvas().strokes()[0].points.len(), 10);
        assert_eq!(app.trace().summary().lost_frames, 1);
    }

    #[test]
    fn test_lost_face_holds_processor_state() {
        let mut app = app();
        let t0 = Instant::now();
        app.handle_gaze_frame(Some(GazeSample { x: 0.3, y: 0.3 }), t0);
        let before = app.processor().last_point();
        app.handle_gaze_frame(None, t0);
        assert_eq!(app.processor().last_point(), before);
    }

    #[test]
    fn test_reset_gaze_action() {
        let mut app = app();
        let t0 = Instant::now();
        app.handle_gaze_frame(Some(GazeSample { x: 0.3, y: 0.3 }), t0);
        app.apply_action(MenuAction::ResetGaze, t0);
        assert!(app.processor().last_point().is_none());
    }

    #[test]
    fn test_skip_calibration_installs_default() {
        let mut app = app();
        let t0 = Instant::now();
        app.apply_action(MenuAction::Recalibrate, t0);
        assert!(app.calibration().is_active());
        app.skip_calibration();
        assert!(!app.calibration().is_active());
        assert_eq!(app.processor().calibration(), Some(&CalibrationProfile::default()));
    }

    #[test]
    fn test_tick_drains_channels() {
        let (gaze_tx, gaze_rx) = std::sync::mpsc::sync_channel(4);
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
        let info = SharedSessionInfo::default();
        let mut app = app().with_gaze_source(gaze_rx).with_commands(cmd_rx, info);

        gaze_tx.send(Some(GazeSample { x: 0.5, y: 0.5 })).unwrap();
        gaze_tx.send(None).unwrap();
        cmd_tx.send(cmd("lift")).unwrap();
        app.tick(Instant::now());

        assert_eq!(app.trace().len(), 2);
        assert_eq!(app.menu().selected(), Some(2));
        assert!(app.canvas().cursor().is_some());
    }

    #[test]
    fn test_stored_profile_installed_at_startup() {
        let store = MemoryStore::default();
        *store.profile.lock().unwrap() = Some(boosted_profile());

        let app = app().with_calibration_store(Box::new(store.clone()));
        assert_eq!(app.processor().calibration(), Some(&boosted_profile()));
        assert!((app.processor().overall_scale() - 1.3).abs() < 1e-9);

        let app = app.with_overall_scale(Some(2.5));
        assert_eq!(app.processor().overall_scale(), 2.5);
    }

    #[test]
    fn test_recalibration_starts_uncalibrated() {
        let store = MemoryStore::default();
        *store.profile.lock().unwrap() = Some(boosted_profile());
        let mut app = app().with_calibration_store(Box::new(store));

        app.apply_action(MenuAction::Recalibrate, Instant::now());
        assert_eq!(app.processor().calibration(), Some(&CalibrationProfile::default()));
        assert_eq!(app.processor().overall_scale(), 2.0);
    }

    #[test]
    fn test_completed_calibration_is_saved_and_installed() {
        let store = MemoryStore::default();
        let mut app = app().with_calibration_store(Box::new(store.clone()));
        let t0 = Instant::now();
        app.start_calibration(t0);

        for i in 0..=370u32 {
            let now = t0 + Duration::from_millis(50) * i;
            let phase = i as f64 * 0.3;
            let sample = GazeSample { x: 0.5 + 0.3 * phase.sin(), y: 0.5 + 0.3 * phase.cos() };
            app.handle_gaze_frame(Some(sample), now);
            app.tick(now);
        }

        assert!(!app.calibration().is_active());
        assert_eq!(*store.saves.lock().unwrap(), 1);
        let saved = store.load().expect("profile saved");
        assert!(saved.per_direction_scale.is_some());
        assert_eq!(app.processor().calibration(), Some(&saved));
        assert_eq!(app.processor().overall_scale(), saved.overall_scale);
    }
}
