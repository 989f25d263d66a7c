//! Core library for the Mr Tree LED controller.
//!
//! The crate holds everything that does not need a network socket: the
//! coordinate space loaded from the layout file, colour math, the three
//! effects, the controller that owns tree state, and the render scheduler
//! that serialises every control surface onto a single owner. The binary
//! crate wires these to HTTP, MQTT and the process lifecycle.

pub mod api;
pub mod color;
pub mod config;
pub mod controller;
pub mod coords;
pub mod effects;
pub mod error;
pub mod input;
pub mod mqtt;
pub mod reliability;
pub mod render;
pub mod scheduler;
pub mod state;

pub use color::Rgb;
pub use config::{
    AppConfig, HttpConfig, InputConfig, MqttConfig, RenderConfig, TreeConfig, WatchdogConfig,
};
pub use controller::{perceived_color, Controller, TreeContext};
pub use coords::{Axis, CoordinateSpace};
pub use effects::{Effect, EffectKind, EffectParams, TimerPhase, TimerState, TimerStatus};
pub use error::{Result, TreeError};
pub use input::{run_encoders, Encoder, EncoderEvent, EncoderSource, NoEncoders};
pub use mqtt::Topics;
pub use reliability::{Backoff, Watchdog};
pub use render::{PixelBuffer, PixelSink, TracingSink};
pub use scheduler::{Notification, Operation, Reply, Scheduler, TreeHandle};
pub use state::{AnimationState, Power, StateUpdate, TreeState};
