//! Pointer and touch input.
//!
//! [`PointerInput`] turns raw window events into a [`PointerSample`]: a
//! position in normalized device coordinates relative to the render surface
//! and a pressed flag. The event loop feeds it as events arrive; the frame
//! step reads one sample per frame.
//!
//! ```ignore
//! input.handle_event(&event);      // from the event loop, any number of times
//! let sample = input.sample();     // once per frame
//! ```

use glam::Vec2;
use winit::event::{ElementState, MouseButton, TouchPhase, WindowEvent};

/// Pointer state read once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerSample {
    /// Position in [-1, 1]²; x to the right, y up.
    pub position: Vec2,
    /// Whether a mouse button or touch is down.
    pub pressed: bool,
}

impl PointerSample {
    pub fn new(position: Vec2, pressed: bool) -> Self {
        Self { position, pressed }
    }
}

/// Tracks pointer and touch events for one render surface.
#[derive(Debug)]
pub struct PointerInput {
    position: Vec2,
    pressed: bool,
    // Surface size in physical pixels.
    surface_size: (u32, u32),
    // Offset of the surface's top-left corner within the event coordinate space.
    surface_offset: Vec2,
}

impl Default for PointerInput {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerInput {
    /// Create a new input tracker.
    pub fn new() -> Self {
        Self {
            position: Vec2::ZERO,
            pressed: false,
            surface_size: (800, 600),
            surface_offset: Vec2::ZERO,
        }
    }

    /// Current sample.
    pub fn sample(&self) -> PointerSample {
        PointerSample {
            position: self.position,
            pressed: self.pressed,
        }
    }

    /// Update the surface size used for normalization.
    pub fn set_surface_size(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
    }

    /// Set where the surface sits in event coordinates.
    pub fn set_surface_offset(&mut self, offset: Vec2) {
        self.surface_offset = offset;
    }

    /// Convert a raw event position in pixels to normalized device coordinates.
    ///
    /// Returns `None` while the surface has no area.
    pub fn to_ndc(&self, x: f32, y: f32) -> Option<Vec2> {
        let (w, h) = self.surface_size;
        if w == 0 || h == 0 {
            return None;
        }
        let local = Vec2::new(x, y) - self.surface_offset;
        Some(Vec2::new(
            (local.x / w as f32) * 2.0 - 1.0,
            (1.0 - local.y / h as f32) * 2.0 - 1.0,
        ))
    }

    fn move_to(&mut self, x: f64, y: f64) {
        if let Some(ndc) = self.to_ndc(x as f32, y as f32) {
            self.position = ndc;
        }
    }

    /// Process a winit window event.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.move_to(position.x, position.y);
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if *button == MouseButton::Left {
                    self.pressed = *state == ElementState::Pressed;
                }
            }

            WindowEvent::Touch(touch) => {
                match touch.phase {
                    TouchPhase::Started => self.pressed = true,
                    TouchPhase::Ended | TouchPhase::Cancelled => self.pressed = false,
                    TouchPhase::Moved => {}
                }
                self.move_to(touch.location.x, touch.location.y);
            }

            WindowEvent::Resized(size) => {
                self.set_surface_size(size.width, size.height);
            }

            _ => {}
        }
    }
}
