//! Per-frame context handed to every system.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Number of skill hotkeys (1-4).
pub const SKILL_SLOTS: usize = 4;

/// Input sampled once per frame by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    /// Raw movement axis; not necessarily normalized.
    pub move_axis: Vec2,
    pub attack: bool,
    pub dash: bool,
    pub interact: bool,
    /// Skill hotkeys 1-4, pressed this frame.
    pub skills: [bool; SKILL_SLOTS],
    pub menu_up: bool,
    pub menu_down: bool,
    pub menu_confirm: bool,
    pub menu_back: bool,
    /// Cursor position in screen pixels, if the cursor is over the window.
    pub mouse_screen: Option<Vec2>,
}

/// Orthographic camera used to map the cursor into world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera2D {
    pub center: Vec2,
    /// Pixels per world unit.
    pub zoom: f32,
    pub viewport: Vec2,
}

impl Default for Camera2D {
    fn default() -> Self {
        Self {
            center: Vec2::ZERO,
            zoom: 32.0,
            viewport: Vec2::new(1280.0, 720.0),
        }
    }
}

impl Camera2D {
    /// Screen pixels (origin top-left, y down) to world units (y up).
    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        let offset = screen - self.viewport * 0.5;
        self.center + Vec2::new(offset.x, -offset.y) / self.zoom
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        let offset = (world - self.center) * self.zoom;
        Vec2::new(offset.x, -offset.y) + self.viewport * 0.5
    }
}

/// Everything a system may read about the current frame besides the world.
#[derive(Debug, Clone, Default)]
pub struct FrameContext {
    pub dt: f32,
    /// Simulated seconds since the session started.
    pub time: f64,
    pub input: InputState,
    pub camera: Camera2D,
    /// Cursor in world units, derived from `input.mouse_screen` and `camera`.
    pub mouse_world: Option<Vec2>,
}

impl FrameContext {
    pub fn new(dt: f32, time: f64, input: InputState, camera: Camera2D) -> Self {
        let mouse_world = input.mouse_screen.map(|s| camera.screen_to_world(s));
        Self {
            dt,
            time,
            input,
            camera,
            mouse_world,
        }
    }

    /// A context with no input, for tests and headless stepping.
    pub fn idle(dt: f32) -> Self {
        Self::new(dt, 0.0, InputState::default(), Camera2D::default())
    }
}
