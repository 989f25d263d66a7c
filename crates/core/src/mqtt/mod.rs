//! Topic map, discovery documents and inbound message routing for the
//! publish/subscribe surface. Transport lives in the binary; everything here
//! is plain data so it can be exercised without a broker.

use serde_json::{json, Value};

use crate::effects::{EffectKind, TimerState};
use crate::scheduler::{Notification, Operation};
use crate::state::{StateUpdate, TreeState};
use crate::{MqttConfig, Result, TreeError};

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

const TIMER_ACTIONS: [&str; 4] = ["start", "pause", "resume", "cancel"];

/// Every topic the controller publishes to or listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub node_id: String,
    pub discovery_prefix: String,
    pub state: String,
    pub command: String,
    pub availability: String,
    pub timer_state: String,
    pub timer_command: String,
    pub timer_duration: String,
}

impl Topics {
    pub fn new(base: &str, discovery_prefix: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            node_id: base.replace('/', "_"),
            discovery_prefix: discovery_prefix.trim_end_matches('/').to_string(),
            state: format!("{base}/state"),
            command: format!("{base}/set"),
            availability: format!("{base}/status"),
            timer_state: format!("{base}/timer/state"),
            timer_command: format!("{base}/timer/set"),
            timer_duration: format!("{base}/timer/duration/set"),
        }
    }

    pub fn from_config(config: &MqttConfig) -> Self {
        Self::new(&config.base_topic, &config.discovery_prefix)
    }

    /// Topics the service subscribes to after every connect.
    pub fn subscriptions(&self) -> [&str; 3] {
        [&self.command, &self.timer_command, &self.timer_duration]
    }

    fn discovery_topic(&self, component: &str, object_id: &str) -> String {
        format!("{}/{component}/{object_id}/config", self.discovery_prefix)
    }

    /// Retained documents announcing the light, the timer sensor, the
    /// duration control and one button per timer action.
    pub fn discovery_documents(&self) -> Vec<(String, Value)> {
        let node = &self.node_id;
        let device = json!({
            "identifiers": [node],
            "name": "Mr Tree",
            "model": "3D LED tree",
            "manufacturer": "Mr Tree",
        });

        let mut documents = vec![
            (
                self.discovery_topic("light", node),
                json!({
                    "name": "Mr Tree",
                    "unique_id": node,
                    "schema": "json",
                    "state_topic": self.state,
                    "command_topic": self.command,
                    "availability_topic": self.availability,
                    "brightness": true,
                    "brightness_scale": 255,
                    "supported_color_modes": ["rgb"],
                    "effect": true,
                    "effect_list": EffectKind::names(),
                    "device": device,
                }),
            ),
            (
                self.discovery_topic("sensor", &format!("{node}_timer")),
                json!({
                    "name": "Mr Tree Timer",
                    "unique_id": format!("{node}_timer"),
                    "state_topic": self.timer_state,
                    "availability_topic": self.availability,
                    "value_template": "{{ value_json.remaining }}",
                    "json_attributes_topic": self.timer_state,
                    "unit_of_measurement": "s",
                    "device_class": "duration",
                    "device": device,
                }),
            ),
            (
                self.discovery_topic("number", &format!("{node}_timer_duration")),
                json!({
                    "name": "Mr Tree Timer Duration",
                    "unique_id": format!("{node}_timer_duration"),
                    "command_topic": self.timer_duration,
                    "state_topic": self.timer_state,
                    "availability_topic": self.availability,
                    "value_template": "{{ value_json.duration }}",
                    "min": 1,
                    "max": 86_400,
                    "step": 1,
                    "mode": "box",
                    "unit_of_measurement": "s",
                    "device": device,
                }),
            ),
        ];

        for action in TIMER_ACTIONS {
            let object_id = format!("{node}_timer_{action}");
            documents.push((
                self.discovery_topic("button", &object_id),
                json!({
                    "name": format!("Mr Tree Timer {}", capitalize(action)),
                    "unique_id": object_id,
                    "command_topic": self.timer_command,
                    "payload_press": action,
                    "availability_topic": self.availability,
                    "device": device,
                }),
            ));
        }

        documents
    }

    /// Maps an inbound message to the operation it requests. Messages on
    /// topics this node does not own yield `Ok(None)`.
    pub fn route(&self, topic: &str, payload: &[u8]) -> Result<Option<Operation>> {
        if topic == self.command {
            let update = StateUpdate::from_json(payload)?;
            update.validate()?;
            return Ok(Some(Operation::ApplyState(update)));
        }
        if topic == self.timer_command {
            return timer_command(payload).map(Some);
        }
        if topic == self.timer_duration {
            let text = payload_text(payload)?;
            let seconds = text
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite() && *s >= 1.0 && *s <= u32::MAX as f64)
                .ok_or_else(|| TreeError::invalid(format!("invalid timer duration `{text}`")))?;
            return Ok(Some(Operation::TimerSetDuration(seconds.round() as u32)));
        }
        Ok(None)
    }

    /// Topic and payload to publish for a notification.
    pub fn outbound(&self, notification: &Notification) -> Result<(String, Vec<u8>)> {
        match notification {
            Notification::State(state) => Ok((self.state.clone(), state_payload(state)?)),
            Notification::Timer(timer) => Ok((self.timer_state.clone(), timer_payload(timer)?)),
        }
    }
}

pub fn state_payload(state: &TreeState) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(state)?)
}

pub fn timer_payload(timer: &TimerState) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(timer)?)
}

fn timer_command(payload: &[u8]) -> Result<Operation> {
    match payload_text(payload)?.to_ascii_lowercase().as_str() {
        "start" => Ok(Operation::TimerStart),
        "pause" => Ok(Operation::TimerPause),
        "resume" => Ok(Operation::TimerResume),
        "cancel" => Ok(Operation::TimerCancel),
        other => Err(TreeError::invalid(format!("unknown timer command `{other}`"))),
    }
}

fn payload_text(payload: &[u8]) -> Result<&str> {
    std::str::from_utf8(payload)
        .map(str::trim)
        .map_err(|_| TreeError::invalid("payload is not valid UTF-8"))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::TimerStatus;

    fn topics() -> Topics {
        Topics::new("mr_tree", "homeassistant")
    }

    #[test]
    fn builds_topic_map() {
        let topics = topics();
        assert_eq!(topics.state, "mr_tree/state");
        assert_eq!(topics.command, "mr_tree/set");
        assert_eq!(topics.availability, "mr_tree/status");
        assert_eq!(topics.timer_state, "mr_tree/timer/state");
        assert_eq!(
            topics.subscriptions(),
            ["mr_tree/set", "mr_tree/timer/set", "mr_tree/timer/duration/set"]
        );
    }

    #[test]
    fn discovery_covers_every_entity() {
        let documents = topics().discovery_documents();
        let names: Vec<&str> = documents.iter().map(|(topic, _)| topic.as_str()).collect();
        assert!(names.contains(&"homeassistant/light/mr_tree/config"));
        assert!(names.contains(&"homeassistant/sensor/mr_tree_timer/config"));
        assert!(names.contains(&"homeassistant/number/mr_tree_timer_duration/config"));
        assert!(names.contains(&"homeassistant/button/mr_tree_timer_cancel/config"));
        assert_eq!(documents.len(), 7);

        let light = &documents[0].1;
        assert_eq!(light["command_topic"], "mr_tree/set");
        assert_eq!(light["effect_list"][0], "rainbow_cycle");
        assert_eq!(documents[3].1["payload_press"], "start");
    }

    #[test]
    fn routes_inbound_messages() {
        let topics = topics();
        let op = topics
            .route("mr_tree/set", br#"{"state":"ON","effect":"timer"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(op, Operation::ApplyState(StateUpdate { effect: Some(_), .. })));

        assert_eq!(
            topics.route("mr_tree/timer/set", b" Pause ").unwrap(),
            Some(Operation::TimerPause)
        );
        assert_eq!(
            topics.route("mr_tree/timer/duration/set", b"90").unwrap(),
            Some(Operation::TimerSetDuration(90))
        );
        assert_eq!(
            topics.route("mr_tree/timer/duration/set", b"120.0").unwrap(),
            Some(Operation::TimerSetDuration(120))
        );
        assert_eq!(topics.route("someone/else", b"x").unwrap(), None);
    }

    #[test]
    fn rejects_bad_inbound_messages() {
        let topics = topics();
        assert!(topics.route("mr_tree/set", b"not json").is_err());
        assert!(topics.route("mr_tree/set", br#"{"effect":"nope"}"#).is_err());
        assert!(topics.route("mr_tree/timer/set", b"explode").is_err());
        assert!(topics.route("mr_tree/timer/duration/set", b"0").is_err());
        assert!(topics.route("mr_tree/timer/duration/set", b"soon").is_err());
        assert!(topics.route("mr_tree/timer/set", &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn outbound_payloads() {
        let topics = topics();
        let (topic, payload) = topics
            .outbound(&Notification::Timer(TimerState {
                remaining_seconds: 12,
                duration_seconds: 30,
                state: TimerStatus::Active,
            }))
            .unwrap();
        assert_eq!(topic, "mr_tree/timer/state");
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value, json!({"remaining": 12, "duration": 30, "state": "active"}));
    }
}
