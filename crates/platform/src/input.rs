//! Keyboard and mouse state for camera control.
//!
//! WASD walks and strafes; dragging with the left button held looks around.

use std::collections::HashSet;

use glam::Vec2;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Input accumulated between two frames.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    /// Buttons pressed since the last [`begin_frame`](Self::begin_frame).
    just_pressed_buttons: HashSet<MouseButton>,
    /// `None` until the first cursor event.
    mouse_position: Option<Vec2>,
    mouse_delta: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state. Call after the frame consumed the input.
    pub fn begin_frame(&mut self) {
        self.just_pressed_buttons.clear();
        self.mouse_delta = Vec2::ZERO;
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        self.pressed_keys.insert(key);
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        if self.pressed_buttons.insert(button) {
            self.just_pressed_buttons.insert(button);
        }
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Accumulates cursor movement; several events may arrive per frame.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if let Some(previous) = self.mouse_position {
            self.mouse_delta += position - previous;
        }
        self.mouse_position = Some(position);
    }

    /// Drops all held keys and buttons, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.pressed_keys.clear();
        self.pressed_buttons.clear();
        self.just_pressed_buttons.clear();
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// `(forward, right)` in -1..=1 from WASD.
    pub fn movement_axes(&self) -> (f32, f32) {
        let axis = |positive: KeyCode, negative: KeyCode| {
            match (self.is_key_pressed(positive), self.is_key_pressed(negative)) {
                (true, false) => 1.0,
                (false, true) => -1.0,
                _ => 0.0,
            }
        };
        (axis(KeyCode::KeyW, KeyCode::KeyS), axis(KeyCode::KeyD, KeyCode::KeyA))
    }

    /// Cursor movement in pixels while the left button is dragged.
    ///
    /// The frame the button goes down yields zero so the movement before the
    /// press does not turn the camera.
    pub fn look_delta(&self) -> Vec2 {
        if self.is_mouse_pressed(MouseButton::Left) && !self.just_pressed_buttons.contains(&MouseButton::Left) {
            self.mouse_delta
        } else {
            Vec2::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_axes() {
        let mut input = InputState::new();
        assert_eq!(input.movement_axes(), (0.0, 0.0));

        input.on_key_pressed(KeyCode::KeyW);
        input.on_key_pressed(KeyCode::KeyA);
        assert_eq!(input.movement_axes(), (1.0, -1.0));

        input.on_key_pressed(KeyCode::KeyS);
        assert_eq!(input.movement_axes(), (0.0, -1.0));

        input.on_key_released(KeyCode::KeyW);
        assert_eq!(input.movement_axes(), (-1.0, -1.0));
    }

    #[test]
    fn test_mouse_delta_accumulates_within_a_frame() {
        let mut input = InputState::new();
        input.on_mouse_moved(10.0, 10.0);
        assert_eq!(input.mouse_delta(), Vec2::ZERO);

        input.on_mouse_moved(14.0, 9.0);
        input.on_mouse_moved(20.0, 12.0);
        assert_eq!(input.mouse_delta(), Vec2::new(10.0, 2.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }

    #[test]
    fn test_look_requires_left_drag() {
        let mut input = InputState::new();
        input.on_mouse_moved(0.0, 0.0);
        input.on_mouse_moved(5.0, 0.0);
        assert_eq!(input.look_delta(), Vec2::ZERO);

        input.on_mouse_pressed(MouseButton::Left);
        assert_eq!(input.look_delta(), Vec2::ZERO);

        input.begin_frame();
        input.on_mouse_moved(8.0, -2.0);
        assert_eq!(input.look_delta(), Vec2::new(3.0, -2.0));

        input.on_mouse_released(MouseButton::Left);
        assert_eq!(input.look_delta(), Vec2::ZERO);
    }

    #[test]
    fn test_release_all() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyD);
        input.on_mouse_pressed(MouseButton::Left);
        input.release_all();
        assert_eq!(input.movement_axes(), (0.0, 0.0));
        assert!(!input.is_mouse_pressed(MouseButton::Left));
    }
}
