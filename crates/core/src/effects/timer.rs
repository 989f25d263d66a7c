//! Countdown timer effect.
//!
//! The tree fills with colour and drains from the top as time runs out,
//! shifting from green through yellow to red. A pulse travels down the lit
//! part every few seconds. Once the countdown reaches zero a rainbow wave
//! repeats until the timer is cancelled or replaced.
//!
//! Phases: `Idle -> Running <-> Paused`, `Running -> Completing` on expiry.
//! `Completing` only leaves through [`Timer::cancel`] or replacement.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::color::{hue_to_rgb, Rgb};
use crate::coords::{Axis, CoordinateSpace};
use crate::{Result, TreeError};

pub const DEFAULT_DURATION_SECS: u32 = 300;

/// Share of the total duration a pixel takes to fade once the fill drops
/// below it.
const FADE_FRACTION: f32 = 0.05;
const PULSE_TRAVEL_SECS: f32 = 1.5;
const PULSE_PERIOD_SECS: f32 = 2.5;
/// Pulse band half-width as a share of tree height.
const PULSE_WIDTH: f32 = 0.10;
const PULSE_DEPTH: f32 = 0.7;
const COMPLETION_RISE_SECS: f32 = 2.0;
const COMPLETION_CYCLE_SECS: f32 = 3.0;
const COMPLETION_HUE_BASE: f32 = 0.5;
const COMPLETION_HUE_SPAN: f32 = 0.83;
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

const HUE_GREEN: f32 = 0.33;
const HUE_YELLOW: f32 = 0.17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Completing,
}

/// Externally reported timer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Active,
    Paused,
}

/// Snapshot published on every transition and at least once per second while
/// the countdown runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    #[serde(rename = "remaining")]
    pub remaining_seconds: u32,
    #[serde(rename = "duration")]
    pub duration_seconds: u32,
    pub state: TimerStatus,
}

impl TimerState {
    pub fn idle(duration_seconds: u32) -> Self {
        Self {
            remaining_seconds: 0,
            duration_seconds,
            state: TimerStatus::Idle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Timer {
    coords: Arc<CoordinateSpace>,
    duration: u32,
    phase: TimerPhase,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    completed_at: Option<Instant>,
    pulse_origin: Instant,
    fade_started: Vec<Option<Instant>>,
    was_lit: Vec<bool>,
    last_report: Option<Instant>,
    report_pending: bool,
    pub(crate) speed: u8,
    pub(crate) frozen: bool,
}

impl Timer {
    pub fn new(coords: Arc<CoordinateSpace>, duration: u32, now: Instant) -> Self {
        let len = coords.len();
        Self {
            coords,
            duration,
            phase: TimerPhase::Idle,
            started_at: None,
            paused_at: None,
            completed_at: None,
            pulse_origin: now,
            fade_started: vec![None; len],
            was_lit: vec![false; len],
            last_report: None,
            report_pending: true,
            speed: super::DEFAULT_SPEED,
            frozen: false,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Restarts the countdown from the full duration, whatever the phase.
    pub fn start(&mut self, now: Instant) {
        self.phase = TimerPhase::Running;
        self.started_at = Some(now);
        self.paused_at = None;
        self.completed_at = None;
        self.fade_started.fill(None);
        self.was_lit.fill(false);
        self.frozen = false;
        self.mark_transition("start");
    }

    pub fn pause(&mut self, now: Instant) -> Result<()> {
        if self.phase != TimerPhase::Running {
            return Err(TreeError::invalid("timer is not running"));
        }
        self.phase = TimerPhase::Paused;
        self.paused_at = Some(now);
        self.frozen = true;
        self.mark_transition("pause");
        Ok(())
    }

    /// Continues a paused countdown. The paused interval is excluded from the
    /// elapsed time by shifting every clock forward by it.
    pub fn resume(&mut self, now: Instant) -> Result<()> {
        if self.phase != TimerPhase::Paused {
            return Err(TreeError::invalid("timer is not paused"));
        }
        let paused_for = self
            .paused_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        self.started_at = self.started_at.map(|at| at + paused_for);
        for fade in self.fade_started.iter_mut().flatten() {
            *fade += paused_for;
        }
        self.phase = TimerPhase::Running;
        self.paused_at = None;
        self.frozen = false;
        self.mark_transition("resume");
        Ok(())
    }

    /// Clears the clock and blanks `frame`. Valid from every phase.
    pub fn cancel(&mut self, frame: &mut [Rgb]) {
        self.phase = TimerPhase::Idle;
        self.started_at = None;
        self.paused_at = None;
        self.completed_at = None;
        self.fade_started.fill(None);
        self.was_lit.fill(false);
        self.frozen = true;
        frame.fill(Rgb::BLACK);
        self.mark_transition("cancel");
    }

    /// Changes the duration of a timer that has not been started.
    pub fn set_duration(&mut self, duration: u32) -> Result<()> {
        if duration == 0 {
            return Err(TreeError::invalid("timer duration must be at least 1 second"));
        }
        if self.phase != TimerPhase::Idle {
            return Err(TreeError::invalid(
                "timer duration can only change before the timer starts",
            ));
        }
        self.duration = duration;
        self.mark_transition("duration");
        Ok(())
    }

    /// Generic effect pause: stops the clock when running, otherwise just
    /// holds the current frame.
    pub fn freeze(&mut self, now: Instant) {
        if self.phase == TimerPhase::Running {
            let _ = self.pause(now);
        } else {
            self.frozen = true;
        }
    }

    /// Generic effect resume: restarts a paused clock, otherwise unfreezes.
    pub fn unfreeze(&mut self, now: Instant) {
        if self.phase == TimerPhase::Paused {
            let _ = self.resume(now);
        } else {
            self.frozen = false;
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        let total = Duration::from_secs(self.duration as u64);
        let elapsed = match (self.phase, self.started_at) {
            (TimerPhase::Running, Some(start)) => now.saturating_duration_since(start),
            (TimerPhase::Paused, Some(start)) => self
                .paused_at
                .unwrap_or(now)
                .saturating_duration_since(start),
            _ => return Duration::ZERO,
        };
        total.saturating_sub(elapsed)
    }

    pub fn state(&self, now: Instant) -> TimerState {
        let state = match self.phase {
            TimerPhase::Running => TimerStatus::Active,
            TimerPhase::Paused => TimerStatus::Paused,
            TimerPhase::Idle | TimerPhase::Completing => TimerStatus::Idle,
        };
        TimerState {
            remaining_seconds: self.remaining(now).as_secs_f32().ceil() as u32,
            duration_seconds: self.duration,
            state,
        }
    }

    /// Returns a state report when a transition happened since the last
    /// report, or when a running countdown has not reported for a second.
    pub fn poll_report(&mut self, now: Instant) -> Option<TimerState> {
        let due = self.phase == TimerPhase::Running
            && self
                .last_report
                .map_or(true, |at| now.saturating_duration_since(at) >= REPORT_INTERVAL);
        if !(self.report_pending || due) {
            return None;
        }
        self.report_pending = false;
        self.last_report = Some(now);
        Some(self.state(now))
    }

    pub fn draw(&mut self, frame: &mut [Rgb], now: Instant) {
        match self.phase {
            TimerPhase::Running => self.draw_countdown(frame, now),
            TimerPhase::Completing => self.draw_completion(frame, now),
            TimerPhase::Idle | TimerPhase::Paused => frame.fill(Rgb::BLACK),
        }
    }

    fn draw_countdown(&mut self, frame: &mut [Rgb], now: Instant) {
        let remaining = self.remaining(now);
        let progress = if self.duration == 0 {
            0.0
        } else {
            remaining.as_secs_f32() / self.duration as f32
        };

        let (bottom, top) = self.coords.bounds(Axis::Z);
        let height = (top - bottom) as f32;
        let fill_height = bottom as f32 + height * progress;
        let lit = hue_to_rgb(countdown_hue(progress));
        let fade_window = self.duration as f32 * FADE_FRACTION;
        let pulse_center = self.pulse_center(now, bottom as f32, height);

        let coords = Arc::clone(&self.coords);
        for (index, point) in coords.points().iter().enumerate() {
            let z = point[2] as f32;
            let fade = self.fade_brightness(index, z, fill_height, fade_window, now);
            let Some(pixel) = frame.get_mut(index) else {
                continue;
            };
            if fade <= 0.0 {
                *pixel = Rgb::BLACK;
                continue;
            }
            let pulse = if z <= fill_height {
                pulse_center
                    .map(|center| pulse_brightness(z, center, height * PULSE_WIDTH))
                    .unwrap_or(1.0)
            } else {
                1.0
            };
            *pixel = lit.scale(fade * pulse);
        }

        if remaining.is_zero() {
            self.phase = TimerPhase::Completing;
            self.completed_at = Some(now);
            self.mark_transition("complete");
        }
    }

    fn draw_completion(&mut self, frame: &mut [Rgb], now: Instant) {
        let since = self
            .completed_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        let cycle = since.as_secs_f32() % COMPLETION_CYCLE_SECS;
        let (bottom, top) = self.coords.bounds(Axis::Z);
        let wave = if cycle >= COMPLETION_RISE_SECS {
            f32::INFINITY
        } else {
            bottom as f32 + cycle * (top - bottom) as f32 / COMPLETION_RISE_SECS
        };

        for (pixel, point) in frame.iter_mut().zip(self.coords.points()) {
            *pixel = if point[2] as f32 <= wave {
                let height = self.coords.normalize(Axis::Z, point[2]);
                hue_to_rgb(COMPLETION_HUE_BASE + height * COMPLETION_HUE_SPAN)
            } else {
                Rgb::BLACK
            };
        }
    }

    /// 1.0 while a pixel is inside the fill; once the fill drops below a
    /// previously lit pixel it eases out over `window` seconds.
    fn fade_brightness(
        &mut self,
        index: usize,
        z: f32,
        fill_height: f32,
        window: f32,
        now: Instant,
    ) -> f32 {
        if z <= fill_height {
            self.was_lit[index] = true;
            self.fade_started[index] = None;
            return 1.0;
        }

        if self.was_lit[index] {
            self.was_lit[index] = false;
            self.fade_started[index].get_or_insert(now);
        }

        let Some(started) = self.fade_started[index] else {
            return 0.0;
        };
        let fading_for = now.saturating_duration_since(started).as_secs_f32();
        if window <= 0.0 || fading_for > window {
            self.fade_started[index] = None;
            return 0.0;
        }
        ((fading_for / window * PI).cos() + 1.0) / 2.0
    }

    /// Height of the downward pulse, or `None` while it dwells at the bottom.
    fn pulse_center(&self, now: Instant, bottom: f32, height: f32) -> Option<f32> {
        let t = now.saturating_duration_since(self.pulse_origin).as_secs_f32() % PULSE_PERIOD_SECS;
        if t > PULSE_TRAVEL_SECS {
            return None;
        }
        Some(bottom + height - t / PULSE_TRAVEL_SECS * height)
    }

    fn mark_transition(&mut self, event: &'static str) {
        self.report_pending = true;
        tracing::debug!(event, phase = ?self.phase, duration = self.duration, "timer transition");
    }
}

/// Green at full time, yellow at half, red from 20% down. Continuous at both
/// breakpoints.
pub fn countdown_hue(progress: f32) -> f32 {
    if progress > 0.5 {
        HUE_YELLOW + (progress - 0.5) * 2.0 * (HUE_GREEN - HUE_YELLOW)
    } else if progress > 0.2 {
        (progress - 0.2) / 0.3 * HUE_YELLOW
    } else {
        0.0
    }
}

fn pulse_brightness(z: f32, center: f32, width: f32) -> f32 {
    let distance = (z - center).abs();
    if width <= 0.0 || distance > width {
        return 1.0;
    }
    1.0 - (distance / width * PI / 2.0).cos() * PULSE_DEPTH
}
