//! The animation kinds the tree can run.
//!
//! Every kind shares the same frame contract: `draw` writes a colour for each
//! pixel, `after_draw` does per-tick bookkeeping, and `freeze`/`resume` hold
//! or release the animation. [`Effect`] dispatches to the kind-specific
//! implementation.

mod rainbow;
mod sweep;
mod timer;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::coords::CoordinateSpace;
use crate::{Result, TreeError};

pub use rainbow::RainbowCycle;
pub use sweep::Sweep;
pub use timer::{countdown_hue, Timer, TimerPhase, TimerState, TimerStatus, DEFAULT_DURATION_SECS};

/// Speed reported for an effect nobody has adjusted, and when no effect runs.
pub const DEFAULT_SPEED: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    RainbowCycle,
    Sweep,
    Timer,
}

impl EffectKind {
    /// Cycle order for `next_animation` and the advertised effect list.
    pub const ALL: [EffectKind; 3] = [EffectKind::RainbowCycle, EffectKind::Sweep, EffectKind::Timer];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::RainbowCycle => "rainbow_cycle",
            EffectKind::Sweep => "sweep",
            EffectKind::Timer => "timer",
        }
    }

    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|kind| kind.name().to_string()).collect()
    }

    /// The kind `offset` places away in the cycle, wrapping both ways.
    pub fn cycled(self, offset: i32) -> EffectKind {
        let len = Self::ALL.len() as i32;
        let index = Self::ALL.iter().position(|kind| *kind == self).unwrap_or(0) as i32;
        Self::ALL[(index + offset).rem_euclid(len) as usize]
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = TreeError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| TreeError::invalid(format!("unknown effect `{name}`")))
    }
}

/// Optional construction parameters. Fields that do not apply to the chosen
/// kind are ignored.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lag: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<Rgb>>,
}

impl EffectParams {
    pub fn validate(&self) -> Result<()> {
        if self.duration == Some(0) {
            return Err(TreeError::invalid("duration must be at least 1 second"));
        }
        if let Some(frequency) = self.frequency {
            if !frequency.is_finite() || frequency < 0.0 {
                return Err(TreeError::invalid(format!(
                    "frequency must be a non-negative number, got {frequency}"
                )));
            }
        }
        for (name, value) in [("lead", self.lead), ("lag", self.lag), ("step", self.step)] {
            if let Some(value) = value.filter(|v| *v > sweep::MAX_PARAM) {
                return Err(TreeError::invalid(format!(
                    "{name} must be at most {}, got {value}",
                    sweep::MAX_PARAM
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Effect {
    RainbowCycle(RainbowCycle),
    Sweep(Sweep),
    Timer(Timer),
}

impl Effect {
    /// Builds a fresh effect of `kind`. Missing parameters take their
    /// defaults; the timer duration falls back to `default_duration`.
    pub fn build(
        kind: EffectKind,
        coords: Arc<CoordinateSpace>,
        params: &EffectParams,
        default_duration: u32,
        now: Instant,
    ) -> Result<Self> {
        params.validate()?;
        let effect = match kind {
            EffectKind::RainbowCycle => Effect::RainbowCycle(RainbowCycle::new(
                coords,
                params.frequency.unwrap_or(rainbow::DEFAULT_FREQUENCY),
                now,
            )),
            EffectKind::Sweep => {
                let colors = match (&params.colors, params.color) {
                    (Some(colors), _) if !colors.is_empty() => colors.clone(),
                    (_, Some(color)) => vec![color],
                    _ => vec![sweep::DEFAULT_COLOR],
                };
                Effect::Sweep(Sweep::new(
                    coords,
                    &colors,
                    params.lead.unwrap_or(sweep::DEFAULT_LEAD),
                    params.lag.unwrap_or(sweep::DEFAULT_LAG),
                    params.step.unwrap_or(sweep::DEFAULT_STEP),
                ))
            }
            EffectKind::Timer => Effect::Timer(Timer::new(
                coords,
                params.duration.unwrap_or(default_duration),
                now,
            )),
        };
        Ok(effect)
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::RainbowCycle(_) => EffectKind::RainbowCycle,
            Effect::Sweep(_) => EffectKind::Sweep,
            Effect::Timer(_) => EffectKind::Timer,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn draw(&mut self, frame: &mut [Rgb], now: Instant) {
        match self {
            Effect::RainbowCycle(effect) => effect.draw(frame, now),
            Effect::Sweep(effect) => effect.draw(frame),
            Effect::Timer(effect) => effect.draw(frame, now),
        }
    }

    pub fn after_draw(&mut self) {
        if let Effect::Sweep(effect) = self {
            effect.after_draw();
        }
    }

    pub fn is_frozen(&self) -> bool {
        match self {
            Effect::RainbowCycle(effect) => effect.frozen,
            Effect::Sweep(effect) => effect.frozen,
            Effect::Timer(effect) => effect.frozen,
        }
    }

    /// Holds the current frame. Clocks keep running except for the timer,
    /// which stops its countdown.
    pub fn freeze(&mut self, now: Instant) {
        match self {
            Effect::RainbowCycle(effect) => effect.frozen = true,
            Effect::Sweep(effect) => effect.frozen = true,
            Effect::Timer(effect) => effect.freeze(now),
        }
    }

    pub fn resume(&mut self, now: Instant) {
        match self {
            Effect::RainbowCycle(effect) => effect.frozen = false,
            Effect::Sweep(effect) => effect.frozen = false,
            Effect::Timer(effect) => effect.unfreeze(now),
        }
    }

    pub fn reset(&mut self) {
        if let Effect::Sweep(effect) = self {
            effect.reset();
        }
    }

    pub fn speed(&self) -> u8 {
        match self {
            Effect::RainbowCycle(effect) => effect.speed,
            Effect::Sweep(effect) => effect.speed,
            Effect::Timer(effect) => effect.speed,
        }
    }

    pub fn set_speed(&mut self, speed: u8) {
        match self {
            Effect::RainbowCycle(effect) => effect.set_speed(speed),
            Effect::Sweep(effect) => effect.set_speed(speed),
            // the countdown has no visual speed
            Effect::Timer(effect) => effect.speed = speed,
        }
    }

    /// Current parameters, in the same shape they are accepted in.
    pub fn params(&self) -> EffectParams {
        match self {
            Effect::RainbowCycle(effect) => EffectParams {
                frequency: Some(effect.frequency),
                ..Default::default()
            },
            Effect::Sweep(effect) => {
                let colors = effect.colors();
                let (color, colors) = match colors.as_slice() {
                    [single] => (Some(*single), None),
                    _ => (None, Some(colors)),
                };
                EffectParams {
                    lead: Some(effect.lead()),
                    lag: Some(effect.lag()),
                    step: Some(effect.step()),
                    color,
                    colors,
                    ..Default::default()
                }
            }
            Effect::Timer(effect) => EffectParams {
                duration: Some(effect.duration()),
                ..Default::default()
            },
        }
    }

    pub fn as_timer(&self) -> Option<&Timer> {
        match self {
            Effect::Timer(timer) => Some(timer),
            _ => None,
        }
    }

    pub fn as_timer_mut(&mut self) -> Option<&mut Timer> {
        match self {
            Effect::Timer(timer) => Some(timer),
            _ => None,
        }
    }
}
