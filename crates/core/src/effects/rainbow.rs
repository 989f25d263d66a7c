use std::sync::Arc;
use std::time::Instant;

use crate::color::{hue_to_rgb, Rgb};
use crate::coords::{Axis, CoordinateSpace};

pub const DEFAULT_FREQUENCY: f32 = 1.0;

/// Vertical rainbow that scrolls down the tree. Purely clock driven.
#[derive(Debug, Clone)]
pub struct RainbowCycle {
    coords: Arc<CoordinateSpace>,
    start: Instant,
    /// Colour wheel revolutions per second.
    pub frequency: f32,
    pub(crate) speed: u8,
    pub(crate) frozen: bool,
}

impl RainbowCycle {
    pub fn new(coords: Arc<CoordinateSpace>, frequency: f32, now: Instant) -> Self {
        Self {
            coords,
            start: now,
            frequency,
            speed: super::DEFAULT_SPEED,
            frozen: false,
        }
    }

    pub fn hue_at(&self, z: i32, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.start).as_secs_f32();
        (self.coords.normalize(Axis::Z, z) - elapsed * self.frequency).rem_euclid(1.0)
    }

    pub fn draw(&mut self, frame: &mut [Rgb], now: Instant) {
        for (pixel, point) in frame.iter_mut().zip(self.coords.points()) {
            *pixel = hue_to_rgb(self.hue_at(point[2], now));
        }
    }

    /// Maps 0–100 onto 0.1–2.0 revolutions per second.
    pub fn set_speed(&mut self, speed: u8) {
        self.speed = speed;
        self.frequency = 0.1 + (speed as f32 / 100.0) * 1.9;
    }
}
