use std::fmt::Display;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::speech::{pulse::DEFAULT_BOUNDARY_INTERVAL, timeline::DEFAULT_WORDS_PER_MINUTE};

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "Unable to parse config: {e}"),
            Self::Invalid { field, reason } => write!(f, "Invalid config value {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Where the model and camera are placed after loading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Framing {
    pub model_position: Vec3,
    pub camera_position: Vec3,
    pub look_at: Vec3,
    pub near: f32,
    pub far: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            model_position: Vec3::new(0.0, -1.5, 0.0),
            camera_position: Vec3::new(0.0, 0.3, 4.5),
            look_at: Vec3::new(0.0, -0.2, 0.0),
            near: 0.1,
            far: 100.0,
            fov: 50.0,
        }
    }
}

/// Exponential damping rates per channel. Higher is snappier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DampingRates {
    pub eyes: f32,
    pub jaw: f32,
    /// Head pitch while speaking.
    pub head_nod: f32,
    /// Head yaw and roll while speaking.
    pub head_side: f32,
    /// Head while idle and every gesture joint returning to rest.
    pub idle: f32,
    pub breathing: f32,
    pub upper_arm: f32,
    pub lower_arm: f32,
    pub hand: f32,
    pub gesture_layer: f32,
}

impl Default for DampingRates {
    fn default() -> Self {
        Self {
            eyes: 30.0,
            jaw: 15.0,
            head_nod: 12.0,
            head_side: 10.0,
            idle: 8.0,
            breathing: 10.0,
            upper_arm: 10.0,
            lower_arm: 12.0,
            hand: 14.0,
            gesture_layer: 6.0,
        }
    }
}

impl DampingRates {
    fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> {
        [
            ("eyes", self.eyes),
            ("jaw", self.jaw),
            ("head_nod", self.head_nod),
            ("head_side", self.head_side),
            ("idle", self.idle),
            ("breathing", self.breathing),
            ("upper_arm", self.upper_arm),
            ("lower_arm", self.lower_arm),
            ("hand", self.hand),
            ("gesture_layer", self.gesture_layer),
        ]
        .into_iter()
    }
}

/// Tunables for a single avatar session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub framing: Framing,
    pub damping: DampingRates,
    pub words_per_minute: f32,
    /// Seconds between boundary pulses while audio plays.
    pub boundary_interval: f32,
    /// Resting weight of the gesture clip layer.
    pub gesture_base_weight: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Fixed seed for saccade and blink timing. Random when missing.
    pub seed: Option<u64>,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            damping: DampingRates::default(),
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            boundary_interval: DEFAULT_BOUNDARY_INTERVAL,
            gesture_base_weight: 0.15,
            min_scale: 0.6,
            max_scale: 5.0,
            seed: None,
        }
    }
}

impl AvatarConfig {
    /// Parse and validate a JSON config. Missing fields use their defaults.
    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;

        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, rate) in self.damping.iter() {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ConfigError::Invalid {
                    field: "damping",
                    reason: format!("{name} must be a non-negative number, got {rate}"),
                });
            }
        }

        if !(self.words_per_minute > 0.0) {
            return Err(ConfigError::Invalid {
                field: "words_per_minute",
                reason: format!("must be positive, got {}", self.words_per_minute),
            });
        }
        if !(self.boundary_interval > 0.0) {
            return Err(ConfigError::Invalid {
                field: "boundary_interval",
                reason: format!("must be positive, got {}", self.boundary_interval),
            });
        }
        if !(0.0..=1.0).contains(&self.gesture_base_weight) {
            return Err(ConfigError::Invalid {
                field: "gesture_base_weight",
                reason: format!("must be within 0-1, got {}", self.gesture_base_weight),
            });
        }
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            return Err(ConfigError::Invalid {
                field: "min_scale",
                reason: format!(
                    "must be positive and at most max_scale, got {}-{}",
                    self.min_scale, self.max_scale
                ),
            });
        }

        Ok(())
    }

    /// Clamp a requested model scale to the allowed range.
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        if scale.is_nan() {
            return self.min_scale;
        }

        scale.clamp(self.min_scale, self.max_scale)
    }
}
