/*!
Mouth articulation.

Which channels get written depends on the [LipSyncTier] of the rig. Only one
tier drives the mouth in a given frame.
*/

use crate::{
    rig::{BoneSlot, LipSyncTier, RigControlMap},
    scene::Scene,
    speech::{LipSyncState, Viseme},
};

use super::damp;

/// Largest jaw swing in radians.
const MAX_JAW: f32 = 0.3;
/// Scale of the head tilt used when nothing else can show speech.
const HEAD_TILT: f32 = 0.08;
/// Jaw fallback strength relative to a real viseme.
const JAW_FALLBACK: f32 = 0.7;

/// Open-close oscillation while speaking, before any channel scaling.
pub fn oscillation(lip: &LipSyncState) -> f32 {
    let osc = (lip.t * 12.0).sin().abs();
    (0.1 + 0.9 * osc) * (0.25 + lip.intensity)
}

/// What the mouth should do this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouthDrive {
    /// Set one viseme at the given strength and zero the rest.
    Viseme(Viseme, f32),
    /// Generic mouth-open weight.
    Morph(f32),
    /// Jaw rotation target in radians.
    Jaw(f32),
    /// Extra head pitch in radians.
    HeadTilt(f32),
    /// Close everything.
    Rest,
}

impl MouthDrive {
    pub fn select(tier: LipSyncTier, lip: &LipSyncState) -> Self {
        if !lip.active {
            return Self::Rest;
        }

        match tier {
            LipSyncTier::Visemes => match lip.current_viseme {
                Some(v) => Self::Viseme(v, (0.6 + 0.4 * lip.intensity).clamp(0.0, 1.0)),
                // Silence between segments, keep the mouth moving anyway
                None => Self::Morph(oscillation(lip).min(1.0)),
            },
            LipSyncTier::MouthMorph => Self::Morph(oscillation(lip).min(1.0)),
            LipSyncTier::JawBone => Self::Jaw(oscillation(lip) * MAX_JAW),
            LipSyncTier::HeadTilt => Self::HeadTilt(oscillation(lip) * HEAD_TILT),
            LipSyncTier::None => Self::Rest,
        }
    }

    /// Pitch the head step should add on top of its own motion.
    pub fn head_tilt(&self) -> f32 {
        match self {
            Self::HeadTilt(v) => *v,
            _ => 0.0,
        }
    }

    pub fn apply(&self, scene: &mut Scene, rig: &RigControlMap, jaw_rate: f32, dt: f32) {
        match *self {
            Self::Viseme(viseme, strength) => apply_viseme(scene, rig, viseme, strength),
            Self::Morph(value) => {
                clear_visemes(scene, rig);
                set_mouth(scene, rig, value);
            }
            Self::Jaw(target) => rotate_jaw(scene, rig, target, jaw_rate, dt),
            Self::HeadTilt(_) => {}
            Self::Rest => {
                clear_visemes(scene, rig);
                set_mouth(scene, rig, 0.0);
                rotate_jaw(scene, rig, 0.0, jaw_rate, dt);
            }
        }
    }
}

fn set_mouth(scene: &mut Scene, rig: &RigControlMap, value: f32) {
    for channel in rig.morph_targets.iter() {
        if let Some(morphs) = scene.morphs_mut(channel.mesh) {
            morphs.set(channel.index, value);
        }
    }
}

fn clear_visemes(scene: &mut Scene, rig: &RigControlMap) {
    for channels in rig.viseme_channels.iter() {
        let Some(morphs) = scene.morphs_mut(channels.mesh) else {
            continue;
        };

        for idx in channels.indices.iter().chain([&channels.jaw_index]).flatten() {
            morphs.set(*idx, 0.0);
        }
    }
}

fn apply_viseme(scene: &mut Scene, rig: &RigControlMap, viseme: Viseme, strength: f32) {
    clear_visemes(scene, rig);

    for channels in rig.viseme_channels.iter() {
        let Some(morphs) = scene.morphs_mut(channels.mesh) else {
            continue;
        };

        match (channels.index(viseme), channels.jaw_index) {
            (Some(idx), _) => morphs.set(idx, strength),
            (None, Some(jaw)) => morphs.set(jaw, strength * JAW_FALLBACK),
            (None, None) => {}
        }
    }
}

/// Rotates about the jaw's local Z axis, which suits the usual humanoid
/// exports but not every skeleton.
fn rotate_jaw(scene: &mut Scene, rig: &RigControlMap, target: f32, rate: f32, dt: f32) {
    let Some(rotation) = super::rotation_mut(scene, rig.bones.get(BoneSlot::Jaw)) else {
        return;
    };

    rotation.z = damp(rotation.z, target, rate, dt);
}
