//! Parsing for request/response route parameters. Each helper turns a raw
//! path segment or body into an [`Operation`], rejecting bad input with a
//! validation error before anything reaches the scheduler.

use serde::Serialize;

use crate::color::Rgb;
use crate::effects::EffectParams;
use crate::scheduler::Operation;
use crate::state::validate_speed;
use crate::{Result, TreeError};

/// JSON body returned for rejected requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<&TreeError> for ErrorBody {
    fn from(err: &TreeError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

pub fn color(raw: &str) -> Result<Operation> {
    Rgb::from_hex(raw).map(Operation::SetColor)
}

pub fn brightness(raw: &str) -> Result<Operation> {
    raw.trim()
        .parse::<u8>()
        .map(Operation::SetBrightness)
        .map_err(|_| {
            TreeError::invalid(format!("brightness must be between 0 and 255, got `{raw}`"))
        })
}

pub fn speed(raw: &str) -> Result<Operation> {
    let speed = raw
        .trim()
        .parse::<u8>()
        .map_err(|_| TreeError::invalid(format!("speed must be between 0 and 100, got `{raw}`")))?;
    validate_speed(speed)?;
    Ok(Operation::SetSpeed(speed))
}

/// `body` is an optional JSON object of effect parameters.
pub fn effect(name: &str, body: &[u8]) -> Result<Operation> {
    let name: crate::EffectKind = name.parse()?;
    let params: EffectParams = if body.iter().all(u8::is_ascii_whitespace) {
        EffectParams::default()
    } else {
        serde_json::from_slice(body)?
    };
    params.validate()?;
    Ok(Operation::SetAnimation {
        name: name.name().to_string(),
        params,
    })
}

pub fn timer_duration(raw: &str) -> Result<Operation> {
    match raw.trim().parse::<u32>() {
        Ok(seconds) if seconds > 0 => Ok(Operation::TimerSetDuration(seconds)),
        _ => Err(TreeError::invalid(format!(
            "timer duration must be a positive number of seconds, got `{raw}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_parameters() {
        assert_eq!(color("#ff8000").unwrap(), Operation::SetColor(Rgb::new(255, 128, 0)));
        assert_eq!(brightness("255").unwrap(), Operation::SetBrightness(255));
        assert_eq!(speed("100").unwrap(), Operation::SetSpeed(100));
        assert_eq!(timer_duration("90").unwrap(), Operation::TimerSetDuration(90));
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(color("12345").is_err());
        assert!(brightness("256").is_err());
        assert!(brightness("-1").is_err());
        assert!(speed("101").is_err());
        assert!(timer_duration("0").is_err());
        assert!(timer_duration("ten").is_err());
    }

    #[test]
    fn effect_body_is_optional() {
        assert_eq!(
            effect("sweep", b"").unwrap(),
            Operation::SetAnimation {
                name: "sweep".into(),
                params: EffectParams::default(),
            }
        );
        let Operation::SetAnimation { params, .. } = effect("timer", br#"{"duration":5}"#).unwrap()
        else {
            panic!("expected animation");
        };
        assert_eq!(params.duration, Some(5));

        assert!(effect("strobe", b"").is_err());
        assert!(effect("timer", br#"{"duration":0}"#).is_err());
        assert!(effect("timer", b"{").is_err());
    }

    #[test]
    fn error_body_carries_message() {
        let body = ErrorBody::from(&TreeError::invalid("nope"));
        assert_eq!(serde_json::to_value(body).unwrap()["error"], "nope");
    }
}
