use glam::Vec2;

/// Pointer state accumulated between frames for the orbit camera.
#[derive(Debug, Default)]
pub struct InputState {
    dragging: bool,
    cursor: Option<Vec2>,
    drag: Vec2,
    wheel: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_drag_button(&mut self, pressed: bool) {
        self.dragging = pressed;
    }

    pub fn set_mouse_position(&mut self, position: Vec2) {
        if let Some(previous) = self.cursor {
            if self.dragging {
                self.drag += position - previous;
            }
        }
        self.cursor = Some(position);
    }

    pub fn cursor_left(&mut self) {
        self.cursor = None;
    }

    pub fn add_wheel(&mut self, lines: f32) {
        self.wheel += lines;
    }

    /// Returns and resets the drag and wheel totals since the last call.
    pub fn take_deltas(&mut self) -> (Vec2, f32) {
        let deltas = (self.drag, self.wheel);
        self.drag = Vec2::ZERO;
        self.wheel = 0.0;
        deltas
    }
}
