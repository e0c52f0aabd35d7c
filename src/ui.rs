// src/ui.rs - Canvas, menu and status painting
use crate::menu::MenuSection;
use crate::surface::{Stroke as CanvasStroke, StrokeCanvas};
use crate::tracking::ScreenPoint;
use eframe::egui::{self, Color32, Pos2, Rect, Stroke, Vec2};

#[derive(Debug, Clone)]
pub struct Theme {
    pub primary: Color32,
    pub secondary: Color32,
    pub surface: Color32,
    pub error: Color32,
    pub warning: Color32,
    pub success: Color32,
    pub text_primary: Color32,
    pub text_secondary: Color32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: Color32::from_rgb(70, 130, 240),
            secondary: Color32::from_rgb(255, 152, 0),
            surface: Color32::from_rgb(30, 30, 35),
            error: Color32::from_rgb(244, 67, 54),
            warning: Color32::from_rgb(255, 152, 0),
            success: Color32::from_rgb(76, 175, 80),
            text_primary: Color32::WHITE,
            text_secondary: Color32::from_rgb(200, 200, 200),
        }
    }
}

const PEN_WIDTH: f32 = 3.0;
const ERASER_WIDTH: f32 = 18.0;

pub struct UIComponents {
    pub theme: Theme,
}

impl UIComponents {
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }

    /// Paint the strokes and the gaze cursor, filling the remaining space.
    /// Returns the canvas rect so the caller can track its size.
    pub fn draw_canvas(&self, ui: &mut egui::Ui, canvas: &StrokeCanvas) -> Rect {
        let (response, painter) =
            ui.allocate_painter(ui.available_size(), egui::Sense::hover());
        let rect = response.rect;
        painter.rect_filled(rect, 8.0, self.theme.surface);

        let origin = rect.min.to_vec2();
        for stroke in canvas.strokes().iter().chain(canvas.current_stroke()) {
            self.draw_stroke(&painter, stroke, origin);
        }

        if let Some(cursor) = canvas.cursor() {
            let center = to_pos(cursor, origin);
            let color = if canvas.is_eraser() {
                self.theme.warning
            } else if canvas.is_drawing() {
                self.theme.success
            } else {
                self.theme.primary
            };
            let radius = if canvas.is_eraser() { ERASER_WIDTH / 2.0 } else { 6.0 };
            painter.circle_stroke(center, radius + 2.0, Stroke::new(2.0, color));
            painter.circle_filled(center, 2.0, color);
        }

        rect
    }

    fn draw_stroke(&self, painter: &egui::Painter, stroke: &CanvasStroke, origin: Vec2) {
        let (width, color) = if stroke.eraser {
            (ERASER_WIDTH, self.theme.surface)
        } else {
            (PEN_WIDTH, self.theme.text_primary)
        };
        let points: Vec<Pos2> = stroke.points.iter().map(|p| to_pos(*p, origin)).collect();
        match points.as_slice() {
            [] => {}
            [single] => painter.circle_filled(*single, width / 2.0, color),
            _ => {
                painter.add(egui::Shape::line(points, Stroke::new(width, color)));
            }
        }
    }

    pub fn draw_menu_section(
        &self,
        ui: &mut egui::Ui,
        index: usize,
        section: &MenuSection,
        selected: bool,
    ) {
        let commands = ["push", "pull", "lift"];
        let fill = if selected { self.theme.primary } else { self.theme.surface };

        egui::Frame::none()
            .fill(fill)
            .rounding(8.0)
            .inner_margin(egui::Margin::same(8.0))
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.label(
                    egui::RichText::new(format!("{}  {}", commands[index], section.title))
                        .strong()
                        .color(self.theme.text_primary),
                );
                if selected {
                    for (command, action) in commands.iter().zip(section.actions) {
                        ui.label(
                            egui::RichText::new(format!("  {} → {}", command, action.label()))
                                .color(self.theme.text_primary),
                        );
                    }
                }
            });
        ui.add_space(4.0);
    }

    pub fn draw_status_chip(&self, ui: &mut egui::Ui, label: &str, status: &str) {
        let color = match status {
            "subscribed" => self.theme.success,
            "failed" | "no headset found" | "closed" => self.theme.error,
            "headset disabled" | "idle" => self.theme.text_secondary,
            _ => self.theme.warning,
        };
        ui.horizontal(|ui| {
            let (rect, _) = ui.allocate_exact_size(Vec2::splat(12.0), egui::Sense::hover());
            ui.painter().circle_filled(rect.center(), 5.0, color);
            ui.label(format!("{}: {}", label, status));
        });
    }

    pub fn draw_calibration_overlay(&self, ui: &mut egui::Ui, rect: Rect, instruction: &str) {
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 8.0, Color32::from_black_alpha(140));
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            instruction,
            egui::FontId::proportional(32.0),
            self.theme.secondary,
        );
    }
}

fn to_pos(point: ScreenPoint, origin: Vec2) -> Pos2 {
    Pos2::new(point.x as f32, point.y as f32) + origin
}
