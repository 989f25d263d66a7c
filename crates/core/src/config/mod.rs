use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::effects::DEFAULT_DURATION_SECS;
use crate::Result;

/// Top-level configuration structure for the application. Every section is
/// optional in the JSON file and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tree: TreeConfig,
    pub render: RenderConfig,
    pub http: HttpConfig,
    pub mqtt: MqttConfig,
    pub watchdog: WatchdogConfig,
    pub input: InputConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// CSV file with one `x,y,z` line per pixel.
    pub layout: PathBuf,
    /// Expected pixel count; the layout must match it when set.
    pub pixel_count: Option<usize>,
    /// Startup brightness, 0–255.
    pub brightness: u8,
    /// Fraction of full LED output that brightness 255 maps to.
    pub brightness_ceiling: f32,
    /// Default countdown length in seconds.
    pub timer_duration: u32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            layout: PathBuf::from("coordinates.csv"),
            pixel_count: None,
            brightness: 204,
            brightness_ceiling: 0.25,
            timer_duration: DEFAULT_DURATION_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub fps: u32,
    pub idle_interval_ms: u64,
    /// Capacity of the command queue feeding the render owner.
    pub command_queue: usize,
}

impl RenderConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            idle_interval_ms: 300,
            command_queue: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 7433)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub base_topic: String,
    pub discovery_prefix: String,
    pub keep_alive_secs: u64,
    /// Upper bound on one iteration of the service loop.
    pub poll_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 1883,
            client_id: "mr_tree".to_string(),
            username: None,
            password: None,
            base_topic: "mr_tree".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            keep_alive_secs: 30,
            poll_timeout_ms: 5_000,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub feed_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feed_interval_ms: 1_000,
            timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// How often the rotary encoders are read.
    pub poll_interval_ms: u64,
}

impl InputConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
        }
    }
}
