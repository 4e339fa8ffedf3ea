//! Audio and video constraint structs

use crate::error::{MediaError, MediaResult};
use rtcbridge_core::{ConstraintEntry, EngineConstraints};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Build engine constraints from a consumer audio constraint object
///
/// Every top-level key becomes a mandatory entry. Scalars are rendered as
/// strings; `null`, arrays and objects have no engine representation and
/// yield an absent value.
pub fn audio_constraints_from_options(options: &Map<String, Value>) -> EngineConstraints {
    let mandatory = options
        .iter()
        .map(|(key, value)| ConstraintEntry {
            key: key.clone(),
            value: match value {
                Value::Bool(b) => Some(b.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(s.clone()),
                Value::Null | Value::Array(_) | Value::Object(_) => None,
            },
        })
        .collect();

    EngineConstraints {
        mandatory,
        optional: Vec::new(),
    }
}

/// Drop mandatory entries without a value
///
/// The engine fails source creation when a mandatory key is present with no
/// value, so these must never reach it. Returns the dropped keys.
pub fn strip_null_mandatory(constraints: &mut EngineConstraints) -> Vec<String> {
    let mut dropped = Vec::new();
    constraints.mandatory.retain(|entry| {
        if entry.value.is_some() {
            true
        } else {
            debug!("constraint {} is null, ignoring it", entry.key);
            dropped.push(entry.key.clone());
            false
        }
    });
    dropped
}

/// Camera facing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Facing the user
    User,
    /// Facing away from the user
    Environment,
}

impl FacingMode {
    /// Stable string identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }

    /// Facing mode of a device given whether it faces the user
    pub fn from_front_facing(front: bool) -> Self {
        if front {
            FacingMode::User
        } else {
            FacingMode::Environment
        }
    }
}

/// Default capture format used when constraints leave a field unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDefaults {
    /// Default width in pixels
    pub width: u32,
    /// Default height in pixels
    pub height: u32,
    /// Default frames per second
    pub frame_rate: u32,
}

impl Default for VideoDefaults {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

impl VideoDefaults {
    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::InvalidConstraints {
                message: "Invalid resolution".to_string(),
            });
        }

        if self.frame_rate == 0 || self.frame_rate > 120 {
            return Err(MediaError::InvalidConstraints {
                message: "Invalid frame rate".to_string(),
            });
        }

        Ok(())
    }
}

/// Video constraints recognised by capture controllers
///
/// Unset fields fall back to [`VideoDefaults`] (and to facing mode `user`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoConstraints {
    /// Requested width in pixels
    pub width: Option<u32>,
    /// Requested height in pixels
    pub height: Option<u32>,
    /// Requested frames per second
    pub frame_rate: Option<u32>,
    /// Requested camera, as an index into the device list
    pub device_id: Option<String>,
    /// Requested facing mode
    pub facing_mode: Option<FacingMode>,
}

impl VideoConstraints {
    /// Resolve the capture format against `defaults`
    pub fn format(&self, defaults: &VideoDefaults) -> (u32, u32, u32) {
        (
            self.width.unwrap_or(defaults.width),
            self.height.unwrap_or(defaults.height),
            self.frame_rate.unwrap_or(defaults.frame_rate),
        )
    }

    /// Requested facing mode, `user` when unset
    pub fn facing(&self) -> FacingMode {
        self.facing_mode.unwrap_or(FacingMode::User)
    }

    /// Reject explicit zero dimensions or frame rate
    pub fn validate(&self) -> MediaResult<()> {
        if self.width == Some(0) || self.height == Some(0) {
            return Err(MediaError::InvalidConstraints {
                message: "Invalid resolution".to_string(),
            });
        }
        if self.frame_rate == Some(0) {
            return Err(MediaError::InvalidConstraints {
                message: "Invalid frame rate".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audio_options_become_mandatory_entries() {
        let options = json!({
            "echoCancellation": true,
            "sampleRate": 48000,
            "deviceId": null,
        });
        let constraints = audio_constraints_from_options(options.as_object().unwrap());

        assert_eq!(constraints.mandatory.len(), 3);
        let echo = constraints
            .mandatory
            .iter()
            .find(|c| c.key == "echoCancellation")
            .unwrap();
        assert_eq!(echo.value.as_deref(), Some("true"));
        let device = constraints
            .mandatory
            .iter()
            .find(|c| c.key == "deviceId")
            .unwrap();
        assert_eq!(device.value, None);
    }

    #[test]
    fn test_strip_null_mandatory() {
        let options = json!({"a": "1", "b": null, "c": {"nested": true}});
        let mut constraints = audio_constraints_from_options(options.as_object().unwrap());
        let mut dropped = strip_null_mandatory(&mut constraints);
        dropped.sort();

        assert_eq!(dropped, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(constraints.mandatory.len(), 1);
        assert!(constraints.mandatory.iter().all(|c| c.value.is_some()));
    }

    #[test]
    fn test_video_constraints_defaults() {
        let constraints: VideoConstraints =
            serde_json::from_value(json!({"width": 640, "facingMode": "environment"})).unwrap();
        assert_eq!(constraints.format(&VideoDefaults::default()), (640, 720, 30));
        assert_eq!(constraints.facing(), FacingMode::Environment);

        let empty = VideoConstraints::default();
        assert_eq!(empty.facing(), FacingMode::User);
        assert!(empty.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let zero = VideoConstraints {
            width: Some(0),
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let bad_defaults = VideoDefaults {
            frame_rate: 240,
            ..Default::default()
        };
        assert!(bad_defaults.validate().is_err());
        assert!(VideoDefaults::default().validate().is_ok());
    }
}
