//! Render scheduler: the single owner of the controller.
//!
//! Control surfaces never touch the controller directly. They send an
//! [`Operation`] through a [`TreeHandle`] and the scheduler applies it between
//! two frames, so a surface can never observe or publish a half drawn buffer.
//! Results flow back through a one-shot reply and, for mutations, a
//! [`Notification`] broadcast that every surface can follow.

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time;

use crate::color::Rgb;
use crate::controller::Controller;
use crate::effects::{EffectParams, TimerState};
use crate::render::PixelSink;
use crate::state::{StateUpdate, TreeState};
use crate::{RenderConfig, Result, TreeError};

const NOTIFICATION_CAPACITY: usize = 64;

/// A request from a control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    On,
    Off,
    TogglePower,
    SetColor(Rgb),
    SetBrightness(u8),
    AdjustBrightness(i16),
    SetAnimation { name: String, params: EffectParams },
    NextAnimation(i32),
    SetSpeed(u8),
    AdjustSpeed(i16),
    Pause,
    Resume,
    TogglePause,
    GetState,
    ApplyState(StateUpdate),
    TimerStart,
    TimerPause,
    TimerResume,
    TimerCancel,
    TimerSetDuration(u32),
    TimerState,
}

impl Operation {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::GetState | Operation::TimerState)
    }

    fn apply(self, tree: &mut Controller, now: Instant) -> Result<Reply> {
        match self {
            Operation::On => tree.on(),
            Operation::Off => tree.off(now),
            Operation::TogglePower => {
                if tree.is_on() {
                    tree.off(now)
                } else {
                    tree.on()
                }
            }
            Operation::SetColor(color) => tree.set_color(color, now),
            Operation::SetBrightness(value) => tree.set_brightness(value),
            Operation::AdjustBrightness(delta) => {
                let value =
                    (i32::from(tree.buffer().brightness()) + i32::from(delta)).clamp(0, 255);
                tree.set_brightness(value as u8);
            }
            Operation::SetAnimation { name, params } => {
                tree.set_animation_by_name(&name, &params, now)?
            }
            Operation::NextAnimation(offset) => tree.next_animation(offset, now)?,
            Operation::SetSpeed(speed) => tree.set_speed(speed)?,
            Operation::AdjustSpeed(delta) => {
                if tree.effect().is_some() {
                    let speed = (i32::from(tree.state().speed) + i32::from(delta)).clamp(0, 100);
                    tree.set_speed(speed as u8)?;
                }
            }
            Operation::Pause => tree.pause(now),
            Operation::Resume => tree.resume(now),
            Operation::TogglePause => {
                if tree.is_animating() {
                    tree.pause(now)
                } else {
                    tree.resume(now)
                }
            }
            Operation::GetState => {}
            Operation::ApplyState(update) => tree.apply(&update, now)?,
            Operation::TimerStart => return tree.timer_start(now).map(Reply::Timer),
            Operation::TimerPause => return tree.timer_pause(now).map(Reply::Timer),
            Operation::TimerResume => return tree.timer_resume(now).map(Reply::Timer),
            Operation::TimerCancel => return tree.timer_cancel(now).map(Reply::Timer),
            Operation::TimerSetDuration(seconds) => {
                return tree.timer_set_duration(seconds, now).map(Reply::Timer)
            }
            Operation::TimerState => return Ok(Reply::Timer(tree.timer_state(now))),
        }
        Ok(Reply::Tree(tree.state()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Tree(TreeState),
    Timer(TimerState),
}

/// Broadcast to every surface after a change.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    State(TreeState),
    Timer(TimerState),
}

#[derive(Debug)]
pub struct Command {
    pub op: Operation,
    pub reply: Option<oneshot::Sender<Result<Reply>>>,
}

/// Cloneable entry point for control surfaces.
#[derive(Debug, Clone)]
pub struct TreeHandle {
    commands: mpsc::Sender<Command>,
    notifications: broadcast::Sender<Notification>,
}

impl TreeHandle {
    /// Sends `op` and waits for the scheduler to apply it.
    pub async fn call(&self, op: Operation) -> Result<Reply> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command {
                op,
                reply: Some(reply),
            })
            .await
            .map_err(|_| TreeError::EngineStopped)?;
        response.await.map_err(|_| TreeError::EngineStopped)?
    }

    pub async fn state(&self) -> Result<TreeState> {
        match self.call(Operation::GetState).await? {
            Reply::Tree(state) => Ok(state),
            Reply::Timer(_) => Err(TreeError::invalid("unexpected timer reply")),
        }
    }

    /// Queues `op` without waiting for it to be applied. Fails when the queue
    /// is full instead of blocking the caller.
    pub fn submit(&self, op: Operation) -> Result<()> {
        self.commands
            .try_send(Command { op, reply: None })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => {
                    TreeError::Transport("command queue is full".into())
                }
                mpsc::error::TrySendError::Closed(_) => TreeError::EngineStopped,
            })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }
}

pub struct Scheduler<S> {
    controller: Controller,
    sink: S,
    commands: mpsc::Receiver<Command>,
    notifications: broadcast::Sender<Notification>,
    frame_interval: Duration,
    idle_interval: Duration,
}

impl<S: PixelSink> Scheduler<S> {
    pub fn new(controller: Controller, sink: S, config: &RenderConfig) -> (Self, TreeHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_queue.max(1));
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let handle = TreeHandle {
            commands: command_tx,
            notifications: notifications.clone(),
        };
        let scheduler = Self {
            controller,
            sink,
            commands: command_rx,
            notifications,
            frame_interval: config.frame_interval(),
            idle_interval: config.idle_interval(),
        };
        (scheduler, handle)
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Draws one frame when an effect is running and returns how long to wait
    /// before the next tick.
    pub fn tick(&mut self, now: Instant) -> Duration {
        if self.controller.render(now) {
            self.show();
        }
        self.publish_timer_report(now);

        if self.controller.is_animating() {
            self.frame_interval
        } else {
            self.idle_interval
        }
    }

    /// Applies one command. Successful mutations are pushed to the sink and
    /// announced to every surface.
    pub fn handle(&mut self, command: Command, now: Instant) {
        let Command { op, reply } = command;
        let mutation = op.is_mutation();
        tracing::debug!(?op, "command");

        let result = op.apply(&mut self.controller, now);
        match &result {
            Ok(_) if mutation => {
                self.show();
                let _ = self
                    .notifications
                    .send(Notification::State(self.controller.state()));
                self.publish_timer_report(now);
            }
            Ok(_) => {}
            Err(err) => tracing::debug!(%err, "command rejected"),
        }

        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    /// Runs until every [`TreeHandle`] has been dropped.
    pub async fn run(mut self) {
        tracing::info!(
            frame_ms = self.frame_interval.as_millis() as u64,
            idle_ms = self.idle_interval.as_millis() as u64,
            "render loop started"
        );
        self.show();
        let mut next_tick = time::Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = time::sleep_until(next_tick) => {
                    let delay = self.tick(Instant::now());
                    next_tick = time::Instant::now() + delay;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle(command, Instant::now());
                    next_tick = next_tick.min(time::Instant::now() + self.frame_interval);
                }
            }
        }

        tracing::info!("render loop stopped");
    }

    fn show(&mut self) {
        if let Err(err) = self.controller.buffer().show(&mut self.sink) {
            tracing::warn!(%err, "failed to push frame");
        }
    }

    fn publish_timer_report(&mut self, now: Instant) {
        if let Some(report) = self.controller.take_timer_report(now) {
            let _ = self.notifications.send(Notification::Timer(report));
        }
    }
}
