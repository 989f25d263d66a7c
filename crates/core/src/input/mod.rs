//! Rotary encoder bindings.

use std::time::Duration;

use crate::scheduler::{Operation, TreeHandle};
use crate::{Result, TreeError};

/// Brightness change per encoder detent.
pub const BRIGHTNESS_STEP: i16 = 8;
/// Speed change per encoder detent.
pub const SPEED_STEP: i16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderEvent {
    /// Net detents since the last read; positive is clockwise.
    Turn { encoder: Encoder, diff: i32 },
    Press { encoder: Encoder },
}

impl EncoderEvent {
    /// The operation an event requests, or `None` for a zero turn.
    pub fn operation(self) -> Option<Operation> {
        match self {
            EncoderEvent::Turn { diff: 0, .. } => None,
            EncoderEvent::Turn { encoder, diff } => Some(match encoder {
                Encoder::Left => Operation::NextAnimation(diff.signum()),
                Encoder::Center => Operation::AdjustBrightness(detents(diff, BRIGHTNESS_STEP)),
                Encoder::Right => Operation::AdjustSpeed(detents(diff, SPEED_STEP)),
            }),
            EncoderEvent::Press { encoder } => Some(match encoder {
                Encoder::Left => Operation::NextAnimation(1),
                Encoder::Center => Operation::TogglePower,
                Encoder::Right => Operation::TogglePause,
            }),
        }
    }
}

/// Hardware that reports encoder activity.
pub trait EncoderSource: Send {
    /// Events since the previous poll, oldest first.
    fn poll(&mut self) -> Result<Vec<EncoderEvent>>;
}

/// Source for builds without encoder hardware. Never reports anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEncoders;

impl EncoderSource for NoEncoders {
    fn poll(&mut self) -> Result<Vec<EncoderEvent>> {
        Ok(Vec::new())
    }
}

/// Polls `source` every `interval` and queues the resulting operations
/// without waiting for them. Returns once the scheduler has stopped.
pub async fn run_encoders<S: EncoderSource>(
    mut source: S,
    tree: TreeHandle,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::info!(interval_ms = interval.as_millis() as u64, "encoder polling started");

    loop {
        ticker.tick().await;
        let events = match source.poll() {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(%err, "encoder read failed");
                continue;
            }
        };
        for op in events.into_iter().filter_map(EncoderEvent::operation) {
            match tree.submit(op) {
                Ok(()) => {}
                Err(TreeError::EngineStopped) => {
                    tracing::info!("encoder polling stopped");
                    return;
                }
                Err(err) => tracing::warn!(%err, "dropping encoder input"),
            }
        }
    }
}

fn detents(diff: i32, step: i16) -> i16 {
    let limit = i32::from(i16::MAX / step);
    diff.clamp(-limit, limit) as i16 * step
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use super::*;
    use crate::render::CaptureSink;
    use crate::{Controller, CoordinateSpace, RenderConfig, Scheduler, TreeConfig};

    struct Scripted(VecDeque<Vec<EncoderEvent>>);

    impl EncoderSource for Scripted {
        fn poll(&mut self) -> Result<Vec<EncoderEvent>> {
            Ok(self.0.pop_front().unwrap_or_default())
        }
    }

    #[test]
    fn turns_scale_by_detent() {
        let turn = |encoder, diff| EncoderEvent::Turn { encoder, diff }.operation();
        assert_eq!(turn(Encoder::Center, 3), Some(Operation::AdjustBrightness(24)));
        assert_eq!(turn(Encoder::Center, -1), Some(Operation::AdjustBrightness(-8)));
        assert_eq!(turn(Encoder::Right, 2), Some(Operation::AdjustSpeed(10)));
        assert_eq!(turn(Encoder::Left, -4), Some(Operation::NextAnimation(-1)));
        assert_eq!(turn(Encoder::Right, 0), None);
        assert_eq!(
            turn(Encoder::Center, i32::MAX),
            Some(Operation::AdjustBrightness(i16::MAX / 8 * 8))
        );
    }

    #[test]
    fn presses_toggle() {
        let press = |encoder| EncoderEvent::Press { encoder }.operation();
        assert_eq!(press(Encoder::Left), Some(Operation::NextAnimation(1)));
        assert_eq!(press(Encoder::Center), Some(Operation::TogglePower));
        assert_eq!(press(Encoder::Right), Some(Operation::TogglePause));
    }

    #[tokio::test(start_paused = true)]
    async fn polled_events_reach_the_controller() {
        let coords = (0..30).map(|i| [i, i % 3, i / 3]).collect();
        let coords = Arc::new(CoordinateSpace::new(coords).unwrap());
        let controller = Controller::new(coords, &TreeConfig::default());
        let (scheduler, tree) =
            Scheduler::new(controller, CaptureSink::default(), &RenderConfig::default());
        let render = tokio::spawn(scheduler.run());

        let script = Scripted(VecDeque::from([
            vec![EncoderEvent::Turn {
                encoder: Encoder::Center,
                diff: -2,
            }],
            vec![],
            vec![EncoderEvent::Press {
                encoder: Encoder::Left,
            }],
        ]));
        let interval = Duration::from_millis(50);
        let encoders = tokio::spawn(run_encoders(script, tree.clone(), interval));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let state = tree.state().await.unwrap();
        assert_eq!(state.brightness, 204 - 16);
        assert_eq!(state.effect.as_deref(), Some("rainbow_cycle"));

        encoders.abort();
        drop(tree);
        render.await.unwrap();
    }

    #[tokio::test]
    async fn polling_stops_with_the_scheduler() {
        let coords = Arc::new(CoordinateSpace::new(vec![[0, 0, 0]]).unwrap());
        let controller = Controller::new(coords, &TreeConfig::default());
        let (scheduler, tree) =
            Scheduler::new(controller, CaptureSink::default(), &RenderConfig::default());
        drop(scheduler);

        let script = Scripted(VecDeque::from([vec![EncoderEvent::Press {
            encoder: Encoder::Center,
        }]]));
        run_encoders(script, tree, Duration::from_millis(1)).await;
    }
}
