//! The single source of truth for what the tree shows.
//!
//! The controller owns the pixel buffer, the power/brightness state and the
//! active effect. Every control surface ends up calling one of its methods,
//! always from the render owner, so no frame is ever observed half drawn.

use std::sync::Arc;
use std::time::Instant;

use crate::color::Rgb;
use crate::coords::CoordinateSpace;
use crate::effects::{Effect, EffectKind, EffectParams, Timer, TimerState, DEFAULT_SPEED};
use crate::render::PixelBuffer;
use crate::state::{validate_speed, AnimationState, ColorMode, Power, StateUpdate, TreeState};
use crate::{Result, TreeConfig, TreeError};

/// Roughly how many pixels `state()` samples.
const STATE_SAMPLES: usize = 10;
/// Share of the sample, brightest first, that decides the perceived colour.
const PERCEIVED_QUANTILE: f32 = 0.75;

/// Values that outlive any single effect instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeContext {
    /// Duration for timers created without an explicit one. Last write wins.
    pub timer_duration: u32,
}

#[derive(Debug)]
pub struct Controller {
    coords: Arc<CoordinateSpace>,
    buffer: PixelBuffer,
    effect: Option<Effect>,
    restore_brightness: u8,
    context: TreeContext,
    pending_timer_report: Option<TimerState>,
}

impl Controller {
    /// Creates a controller and powers the tree on.
    pub fn new(coords: Arc<CoordinateSpace>, config: &TreeConfig) -> Self {
        let buffer = PixelBuffer::new(coords.len(), 0, config.brightness_ceiling);
        let mut controller = Self {
            coords,
            buffer,
            effect: None,
            restore_brightness: config.brightness,
            context: TreeContext {
                timer_duration: config.timer_duration,
            },
            pending_timer_report: None,
        };
        controller.on();
        controller
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn effect(&self) -> Option<&Effect> {
        self.effect.as_ref()
    }

    pub fn context(&self) -> TreeContext {
        self.context
    }

    pub fn is_on(&self) -> bool {
        self.buffer.brightness() > 0
    }

    /// Whether the scheduler has frames to draw.
    pub fn is_animating(&self) -> bool {
        self.effect.as_ref().is_some_and(|effect| !effect.is_frozen())
    }

    /// Restores the brightness recorded by `off`. A dark buffer gets a dim
    /// fill so a bare power-on is visible. Paused effects stay paused.
    pub fn on(&mut self) {
        if self.buffer.is_dark() {
            self.buffer.fill(Rgb::DIM_WHITE);
        }
        if self.buffer.brightness() == 0 {
            self.buffer.set_brightness(self.restore_brightness);
        }
    }

    /// Blanks the output while keeping buffer contents and effect position.
    pub fn off(&mut self, now: Instant) {
        if let Some(effect) = self.effect.as_mut() {
            effect.freeze(now);
        }
        if self.buffer.brightness() > 0 {
            self.restore_brightness = self.buffer.brightness();
        }
        self.buffer.set_brightness(0);
    }

    /// Flat fill. Direct colour and a running effect are mutually exclusive,
    /// so the effect is paused first.
    pub fn set_color(&mut self, color: Rgb, now: Instant) {
        self.pause(now);
        self.buffer.fill(color);
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        self.buffer.set_brightness(brightness);
    }

    /// Replaces the active effect. Nothing changes when the new effect cannot
    /// be built. Selecting the running sweep again without parameters restarts
    /// it from the first axis and keeps its parameters and speed.
    pub fn set_animation(
        &mut self,
        kind: EffectKind,
        params: &EffectParams,
        now: Instant,
    ) -> Result<()> {
        if kind == EffectKind::Sweep && *params == EffectParams::default() {
            if let Some(effect) = self.effect.as_mut().filter(|e| e.kind() == kind) {
                effect.reset();
                effect.resume(now);
                tracing::info!(effect = effect.name(), "effect restarted");
                return Ok(());
            }
        }

        let mut next = Effect::build(
            kind,
            self.coords.clone(),
            params,
            self.context.timer_duration,
            now,
        )?;

        if let Some(mut previous) = self.effect.take() {
            previous.freeze(now);
            if previous.as_timer().is_some() {
                self.pending_timer_report = Some(TimerState::idle(self.context.timer_duration));
            }
        }
        next.resume(now);
        tracing::info!(effect = next.name(), "effect selected");
        self.effect = Some(next);
        Ok(())
    }

    pub fn set_animation_by_name(
        &mut self,
        name: &str,
        params: &EffectParams,
        now: Instant,
    ) -> Result<()> {
        let kind = name.parse()?;
        self.set_animation(kind, params, now)
    }

    /// Steps `offset` places through the effect cycle, starting from the first
    /// kind when nothing runs.
    pub fn next_animation(&mut self, offset: i32, now: Instant) -> Result<()> {
        let kind = match &self.effect {
            Some(effect) => effect.kind().cycled(offset),
            None => EffectKind::ALL[0],
        };
        self.set_animation(kind, &EffectParams::default(), now)
    }

    pub fn set_speed(&mut self, speed: u8) -> Result<()> {
        validate_speed(speed)?;
        if let Some(effect) = self.effect.as_mut() {
            effect.set_speed(speed);
        }
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(effect) = self.effect.as_mut() {
            effect.freeze(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(effect) = self.effect.as_mut() {
            effect.resume(now);
        }
    }

    /// Starts (or restarts) the countdown, selecting the timer effect first if
    /// another effect is active.
    pub fn timer_start(&mut self, now: Instant) -> Result<TimerState> {
        if self.timer().is_none() {
            self.set_animation(EffectKind::Timer, &EffectParams::default(), now)?;
        }
        let timer = self.timer_mut()?;
        timer.start(now);
        Ok(timer.state(now))
    }

    pub fn timer_pause(&mut self, now: Instant) -> Result<TimerState> {
        let timer = self.timer_mut()?;
        timer.pause(now)?;
        Ok(timer.state(now))
    }

    pub fn timer_resume(&mut self, now: Instant) -> Result<TimerState> {
        let timer = self.timer_mut()?;
        timer.resume(now)?;
        Ok(timer.state(now))
    }

    pub fn timer_cancel(&mut self, now: Instant) -> Result<TimerState> {
        let Some(Effect::Timer(timer)) = self.effect.as_mut() else {
            return Err(TreeError::invalid("timer effect is not active"));
        };
        timer.cancel(self.buffer.pixels_mut());
        Ok(timer.state(now))
    }

    /// Sets the duration of an unstarted timer and the default for timers
    /// created later.
    pub fn timer_set_duration(&mut self, seconds: u32, now: Instant) -> Result<TimerState> {
        if seconds == 0 {
            return Err(TreeError::invalid("timer duration must be at least 1 second"));
        }
        if let Some(Effect::Timer(timer)) = self.effect.as_mut() {
            timer.set_duration(seconds)?;
        }
        self.context.timer_duration = seconds;
        Ok(self.timer_state(now))
    }

    pub fn timer_state(&self, now: Instant) -> TimerState {
        self.timer()
            .map(|timer| timer.state(now))
            .unwrap_or_else(|| TimerState::idle(self.context.timer_duration))
    }

    /// Timer report due for publishing, if any.
    pub fn take_timer_report(&mut self, now: Instant) -> Option<TimerState> {
        if let Some(report) = self.pending_timer_report.take() {
            return Some(report);
        }
        match self.effect.as_mut() {
            Some(Effect::Timer(timer)) => timer.poll_report(now),
            _ => None,
        }
    }

    /// Draws one frame. Returns whether anything was drawn.
    pub fn render(&mut self, now: Instant) -> bool {
        match self.effect.as_mut() {
            Some(effect) if !effect.is_frozen() => {
                effect.draw(self.buffer.pixels_mut(), now);
                effect.after_draw();
                true
            }
            _ => false,
        }
    }

    /// Applies a partial state. The whole update is validated before the
    /// first change.
    pub fn apply(&mut self, update: &StateUpdate, now: Instant) -> Result<()> {
        let kind = update.validate()?;

        if update.state == Some(Power::Off) {
            self.off(now);
            return Ok(());
        }
        if update.state == Some(Power::On) {
            self.on();
        }
        if let Some(brightness) = update.brightness {
            self.set_brightness(brightness);
        }
        if let Some(color) = update.color {
            self.set_color(color, now);
        }

        // params without an effect name rebuild the current effect
        let target = kind.or_else(|| match (&update.effect_params, &self.effect) {
            (Some(_), Some(current)) => Some(current.kind()),
            _ => None,
        });
        if let Some(kind) = target {
            let params = update.effect_params.clone().unwrap_or_default();
            self.set_animation(kind, &params, now)?;
        }

        if let Some(speed) = update.speed {
            self.set_speed(speed)?;
        }
        match update.animation_state {
            Some(AnimationState::Paused) => self.pause(now),
            Some(AnimationState::Running) => self.resume(now),
            None => {}
        }
        Ok(())
    }

    pub fn state(&self) -> TreeState {
        let pixels = self.buffer.pixels();
        let stride = (pixels.len() / STATE_SAMPLES).max(1);
        let sample: Vec<Rgb> = pixels.iter().step_by(stride).copied().collect();

        TreeState {
            state: if self.is_on() { Power::On } else { Power::Off },
            brightness: self.buffer.brightness(),
            color: perceived_color(&sample),
            color_mode: ColorMode::Rgb,
            effect: self.effect.as_ref().map(|effect| effect.name().to_string()),
            effect_params: self.effect.as_ref().map(Effect::params),
            speed: self.effect.as_ref().map_or(DEFAULT_SPEED, Effect::speed),
            animation_state: match &self.effect {
                Some(effect) if effect.is_frozen() => AnimationState::Paused,
                _ => AnimationState::Running,
            },
            available_effects: EffectKind::names(),
        }
    }

    fn timer(&self) -> Option<&Timer> {
        self.effect.as_ref().and_then(Effect::as_timer)
    }

    fn timer_mut(&mut self) -> Result<&mut Timer> {
        self.effect
            .as_mut()
            .and_then(Effect::as_timer_mut)
            .ok_or_else(|| TreeError::invalid("timer effect is not active"))
    }
}

/// Luma-weighted average of the brightest quarter of `pixels`: what colour the
/// tree appears to glow, rather than a flat mean dragged down by dark pixels.
pub fn perceived_color(pixels: &[Rgb]) -> Rgb {
    let mut weighted: Vec<(f32, Rgb)> = pixels.iter().map(|p| (p.luma(), *p)).collect();
    weighted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let threshold = (weighted.len() as f32 * PERCEIVED_QUANTILE) as usize;

    let (mut r, mut g, mut b, mut total) = (0.0_f32, 0.0_f32, 0.0_f32, 0.0_f32);
    for (luma, pixel) in &weighted[threshold.min(weighted.len())..] {
        r += pixel.r as f32 * luma;
        g += pixel.g as f32 * luma;
        b += pixel.b as f32 * luma;
        total += luma;
    }

    if total <= 0.0 {
        return Rgb::BLACK;
    }
    Rgb::new(
        (r / total).round() as u8,
        (g / total).round() as u8,
        (b / total).round() as u8,
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::effects::TimerPhase;
    use crate::effects::TimerStatus;

    fn controller() -> Controller {
        let coords = (0..100).map(|i| [i % 10, i / 10, i]).collect();
        let coords = Arc::new(CoordinateSpace::new(coords).unwrap());
        Controller::new(coords, &TreeConfig::default())
    }

    #[test]
    fn starts_on_with_dim_fill() {
        let tree = controller();
        assert!(tree.is_on());
        assert_eq!(tree.buffer().pixels()[0], Rgb::DIM_WHITE);
        let state = tree.state();
        assert_eq!(state.brightness, TreeConfig::default().brightness);
        assert_eq!(state.color, Rgb::DIM_WHITE);
        assert_eq!(state.effect, None);
        assert_eq!(state.speed, DEFAULT_SPEED);
    }

    #[test]
    fn on_off_on_is_idempotent_on_brightness() {
        let now = Instant::now();
        let mut tree = controller();
        tree.set_brightness(77);
        tree.on();
        assert_eq!(tree.state().brightness, 77);
        tree.off(now);
        assert_eq!(tree.state().state, Power::Off);
        assert_eq!(tree.state().brightness, 0);
        tree.off(now);
        tree.on();
        assert_eq!(tree.state().brightness, 77);
        assert_eq!(tree.state().color, Rgb::DIM_WHITE);
    }

    #[test]
    fn off_freezes_and_on_does_not_resume() {
        let now = Instant::now();
        let mut tree = controller();
        tree.set_animation(EffectKind::RainbowCycle, &EffectParams::default(), now)
            .unwrap();
        assert!(tree.is_animating());
        tree.off(now);
        assert!(!tree.is_animating());
        tree.on();
        assert!(!tree.is_animating());
        assert_eq!(tree.state().animation_state, AnimationState::Paused);
        tree.resume(now);
        assert!(tree.is_animating());
    }

    #[test]
    fn set_color_pauses_effect() {
        let now = Instant::now();
        let mut tree = controller();
        tree.set_animation(EffectKind::Sweep, &EffectParams::default(), now)
            .unwrap();
        let red = Rgb::new(255, 0, 0);
        tree.set_color(red, now);
        assert!(!tree.is_animating());
        assert!(!tree.render(now));
        assert_eq!(tree.state().color, red);
    }

    #[test]
    fn reselecting_sweep_restarts_in_place() {
        let now = Instant::now();
        let mut tree = controller();
        let params = EffectParams {
            lead: Some(3),
            step: Some(2),
            ..Default::default()
        };
        tree.set_animation(EffectKind::Sweep, &params, now).unwrap();
        tree.set_speed(70).unwrap();
        for _ in 0..5 {
            tree.render(now);
        }
        let Some(Effect::Sweep(sweep)) = tree.effect() else {
            panic!("expected sweep");
        };
        let moved = sweep.cursor();
        tree.pause(now);

        tree.set_animation(EffectKind::Sweep, &EffectParams::default(), now)
            .unwrap();
        let Some(Effect::Sweep(sweep)) = tree.effect() else {
            panic!("expected sweep");
        };
        assert_ne!(sweep.cursor(), moved);
        assert_eq!(sweep.lead(), 3);
        assert_eq!(tree.state().speed, 70);
        assert!(tree.is_animating());
    }

    #[test]
    fn unknown_effect_leaves_state_unchanged() {
        let now = Instant::now();
        let mut tree = controller();
        tree.set_animation(EffectKind::Sweep, &EffectParams::default(), now)
            .unwrap();
        let before = tree.state();

        assert!(tree
            .set_animation_by_name("fireworks", &EffectParams::default(), now)
            .is_err());
        let bad_params = EffectParams {
            duration: Some(0),
            ..Default::default()
        };
        assert!(tree.set_animation(EffectKind::Timer, &bad_params, now).is_err());

        assert_eq!(tree.state(), before);
        assert!(tree.is_animating());
    }

    #[test]
    fn speed_maps_onto_active_effect() {
        let now = Instant::now();
        let mut tree = controller();
        tree.set_speed(80).unwrap();
        assert_eq!(tree.state().speed, DEFAULT_SPEED);

        tree.set_animation(EffectKind::Sweep, &EffectParams::default(), now)
            .unwrap();
        tree.set_speed(100).unwrap();
        let params = tree.state().effect_params.unwrap();
        assert_eq!(params.step, Some(10));
        assert_eq!(params.lag, Some(120));
        assert_eq!(tree.state().speed, 100);
        assert!(tree.set_speed(101).is_err());
    }

    #[test]
    fn next_animation_cycles() {
        let now = Instant::now();
        let mut tree = controller();
        let mut seen = Vec::new();
        for _ in 0..4 {
            tree.next_animation(1, now).unwrap();
            seen.push(tree.state().effect.unwrap());
        }
        assert_eq!(seen, ["rainbow_cycle", "sweep", "timer", "rainbow_cycle"]);
    }

    #[test]
    fn perceived_color_of_black_sample_is_black() {
        assert_eq!(perceived_color(&[Rgb::BLACK; 10]), Rgb::BLACK);
        assert_eq!(perceived_color(&[]), Rgb::BLACK);
    }

    #[test]
    fn perceived_color_favours_brightest_quartile() {
        let mut sample = vec![Rgb::new(0, 0, 40); 6];
        sample.extend([Rgb::new(255, 0, 0), Rgb::new(255, 0, 0)]);
        assert_eq!(perceived_color(&sample), Rgb::new(255, 0, 0));
    }

    #[test]
    fn state_on_dark_tree_is_black() {
        let now = Instant::now();
        let mut tree = controller();
        tree.set_color(Rgb::BLACK, now);
        assert_eq!(tree.state().color, Rgb::BLACK);
    }

    #[test]
    fn timer_surface_without_timer() {
        let now = Instant::now();
        let mut tree = controller();
        assert_eq!(tree.timer_state(now), TimerState::idle(300));
        assert!(tree.timer_pause(now).is_err());
        assert!(tree.timer_cancel(now).is_err());

        tree.timer_set_duration(45, now).unwrap();
        assert_eq!(tree.context().timer_duration, 45);
        assert!(tree.timer_set_duration(0, now).is_err());

        let state = tree.timer_start(now).unwrap();
        assert_eq!(state.state, TimerStatus::Active);
        assert_eq!(state.duration_seconds, 45);
        assert_eq!(tree.state().effect.as_deref(), Some("timer"));
    }

    #[test]
    fn timer_cancel_blanks_and_reports_idle() {
        let now = Instant::now();
        let mut tree = controller();
        tree.timer_start(now).unwrap();
        tree.render(now + Duration::from_secs(1));
        assert!(!tree.buffer().is_dark());

        let state = tree.timer_cancel(now + Duration::from_secs(2)).unwrap();
        assert_eq!(state, TimerState::idle(300));
        assert!(tree.buffer().is_dark());
        assert!(!tree.is_animating());
    }

    #[test]
    fn replacing_timer_reports_idle() {
        let now = Instant::now();
        let mut tree = controller();
        tree.timer_start(now).unwrap();
        while tree.take_timer_report(now).is_some() {}

        tree.set_animation(EffectKind::Sweep, &EffectParams::default(), now)
            .unwrap();
        assert_eq!(tree.take_timer_report(now), Some(TimerState::idle(300)));
        assert_eq!(tree.take_timer_report(now), None);
    }

    #[test]
    fn pause_resume_timer_through_effect_contract() {
        let now = Instant::now();
        let mut tree = controller();
        tree.timer_start(now).unwrap();
        tree.pause(now + Duration::from_secs(5));
        assert_eq!(tree.timer_state(now + Duration::from_secs(50)).remaining_seconds, 295);
        tree.resume(now + Duration::from_secs(50));
        let timer = tree.effect().and_then(Effect::as_timer).unwrap();
        assert_eq!(timer.phase(), TimerPhase::Running);
        assert_eq!(tree.timer_state(now + Duration::from_secs(50)).remaining_seconds, 295);
    }

    #[test]
    fn apply_validates_before_mutating() {
        let now = Instant::now();
        let mut tree = controller();
        let before = tree.state();
        let update = StateUpdate {
            brightness: Some(10),
            color: Some(Rgb::new(1, 2, 3)),
            effect: Some("nope".into()),
            ..Default::default()
        };
        assert!(tree.apply(&update, now).is_err());
        assert_eq!(tree.state(), before);
    }

    #[test]
    fn apply_full_update() {
        let now = Instant::now();
        let mut tree = controller();
        let update = StateUpdate {
            state: Some(Power::On),
            brightness: Some(200),
            effect: Some("sweep".into()),
            speed: Some(0),
            animation_state: Some(AnimationState::Paused),
            ..Default::default()
        };
        tree.apply(&update, now).unwrap();
        let state = tree.state();
        assert_eq!(state.brightness, 200);
        assert_eq!(state.effect.as_deref(), Some("sweep"));
        assert_eq!(state.speed, 0);
        assert_eq!(state.animation_state, AnimationState::Paused);

        tree.apply(
            &StateUpdate {
                state: Some(Power::Off),
                brightness: Some(50),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        assert_eq!(tree.state().state, Power::Off);
    }

    #[test]
    fn params_without_effect_rebuild_current() {
        let now = Instant::now();
        let mut tree = controller();
        tree.set_animation(EffectKind::RainbowCycle, &EffectParams::default(), now)
            .unwrap();
        let update = StateUpdate {
            effect_params: Some(EffectParams {
                frequency: Some(0.5),
                ..Default::default()
            }),
            ..Default::default()
        };
        tree.apply(&update, now).unwrap();
        assert_eq!(tree.state().effect_params.unwrap().frequency, Some(0.5));
    }
}
