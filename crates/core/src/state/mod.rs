use serde::{Deserialize, Serialize};

use crate::{color::Rgb, EffectKind, EffectParams, Result, TreeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Power {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationState {
    Paused,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Rgb,
}

/// Snapshot of everything a control surface can observe. Derived on demand,
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeState {
    pub state: Power,
    /// 0–255.
    pub brightness: u8,
    /// Perceived glow colour of the tree, not the colour of any one pixel.
    pub color: Rgb,
    pub color_mode: ColorMode,
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_params: Option<EffectParams>,
    /// 0–100.
    pub speed: u8,
    pub animation_state: AnimationState,
    pub available_effects: Vec<String>,
}

/// Partial state accepted by the full-state set route and the command topic.
/// Every field is optional; absent fields are left alone.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default)]
    pub state: Option<Power>,
    #[serde(default)]
    pub brightness: Option<u8>,
    #[serde(default)]
    pub color: Option<Rgb>,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub effect_params: Option<EffectParams>,
    #[serde(default)]
    pub speed: Option<u8>,
    #[serde(default)]
    pub animation_state: Option<AnimationState>,
}

impl StateUpdate {
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Checks every field up front so a rejected update never leaves the
    /// tree half-changed. Returns the parsed effect kind, if any.
    pub fn validate(&self) -> Result<Option<EffectKind>> {
        if let Some(speed) = self.speed {
            validate_speed(speed)?;
        }
        if let Some(params) = &self.effect_params {
            params.validate()?;
        }
        self.effect.as_deref().map(str::parse).transpose()
    }
}

pub fn validate_speed(speed: u8) -> Result<()> {
    if speed > 100 {
        return Err(TreeError::invalid(format!(
            "speed must be between 0 and 100, got {speed}"
        )));
    }
    Ok(())
}
