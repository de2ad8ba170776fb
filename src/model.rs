pub mod config;
pub mod rig_asset;

use godot::prelude::*;
use serde::{Deserialize, Serialize};

pub use config::AvatarConfig;
pub use rig_asset::RigAsset;

/// A newtype that represents a path that Godot is meant to use.
///
/// This can also be used for arbitrary paths, as Godot can handle arbitrary
/// paths as well.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GodotPath(String);

impl GodotPath {
    /// Whether the path points into the Godot resource system instead of the
    /// filesystem.
    pub fn is_resource(&self) -> bool {
        self.0.starts_with("res://") || self.0.starts_with("user://")
    }

    /// Rig descriptions are loaded without the engine.
    pub fn is_json(&self) -> bool {
        self.0.to_lowercase().ends_with(".json")
    }
}

impl std::ops::Deref for GodotPath {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for GodotPath {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<GodotString> for GodotPath {
    fn from(value: GodotString) -> Self {
        Self(value.to_string())
    }
}

impl From<GodotPath> for GodotString {
    fn from(value: GodotPath) -> Self {
        value.0.into()
    }
}
