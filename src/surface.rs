// src/surface.rs - Drawing surface contract and in-memory stroke canvas
use crate::tracking::ScreenPoint;

pub trait DrawingSurface {
    fn draw(&mut self, x: f64, y: f64);
    fn start_drawing(&mut self);
    fn stop_drawing(&mut self);
    fn toggle_eraser(&mut self);
    fn clear_canvas(&mut self);
    fn undo(&mut self);
    fn redo(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub points: Vec<ScreenPoint>,
    pub eraser: bool,
}

/// Everything the canvas can undo: a finished stroke or a whole clear.
#[derive(Debug, Clone)]
enum Edit {
    Stroke(Stroke),
    Clear(Vec<Stroke>),
}

#[derive(Debug, Default)]
pub struct StrokeCanvas {
    strokes: Vec<Stroke>,
    current: Option<Stroke>,
    undo_stack: Vec<Edit>,
    redo_stack: Vec<Edit>,
    drawing: bool,
    eraser: bool,
    cursor: Option<ScreenPoint>,
}

impl StrokeCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn current_stroke(&self) -> Option<&Stroke> {
        self.current.as_ref()
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn is_eraser(&self) -> bool {
        self.eraser
    }

    pub fn cursor(&self) -> Option<ScreenPoint> {
        self.cursor
    }

    fn finish_stroke(&mut self) {
        if let Some(stroke) = self.current.take() {
            if !stroke.points.is_empty() {
                self.strokes.push(stroke.clone());
                self.undo_stack.push(Edit::Stroke(stroke));
                self.redo_stack.clear();
            }
        }
    }
}

impl DrawingSurface for StrokeCanvas {
    fn draw(&mut self, x: f64, y: f64) {
        let point = ScreenPoint { x, y };
        self.cursor = Some(point);
        if !self.drawing {
            return;
        }
        let eraser = self.eraser;
        self.current
            .get_or_insert_with(|| Stroke { points: Vec::new(), eraser })
            .points
            .push(point);
    }

    fn start_drawing(&mut self) {
        self.drawing = true;
    }

    fn stop_drawing(&mut self) {
        self.drawing = false;
        self.finish_stroke();
    }

    fn toggle_eraser(&mut self) {
        // A stroke never mixes pen and eraser.
        self.finish_stroke();
        self.eraser = !self.eraser;
    }

    fn clear_canvas(&mut self) {
        self.finish_stroke();
        if self.strokes.is_empty() {
            return;
        }
        let cleared = std::mem::take(&mut self.strokes);
        self.undo_stack.push(Edit::Clear(cleared));
        self.redo_stack.clear();
    }

    fn undo(&mut self) {
        self.finish_stroke();
        match self.undo_stack.pop() {
            Some(Edit::Stroke(stroke)) => {
                self.strokes.pop();
                self.redo_stack.push(Edit::Stroke(stroke));
            }
            Some(Edit::Clear(cleared)) => {
                self.strokes = cleared.clone();
                self.redo_stack.push(Edit::Clear(cleared));
            }
            None => {}
        }
    }

    fn redo(&mut self) {
        match self.redo_stack.pop() {
            Some(Edit::Stroke(stroke)) => {
                self.strokes.push(stroke.clone());
                self.undo_stack.push(Edit::Stroke(stroke));
            }
            Some(Edit::Clear(cleared)) => {
                self.strokes.clear();
                self.undo_stack.push(Edit::Clear(cleared));
            }
            None => {}
        }
    }
}
