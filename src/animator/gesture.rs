//! Talking gestures, procedural arms plus the optional clip layer.

use std::f64::consts::PI;

use crate::{
    clip::ClipAction,
    model::config::DampingRates,
    rig::{BoneSlot, Bones},
    scene::Scene,
    speech::LipSyncState,
};

use super::{damp, rotation_mut, wave};

const LOWER_ARM_LIMIT: f32 = 0.6;
const HAND_LIMIT: f32 = 0.5;

/// Swing the arms while speaking, bring them back to rest otherwise.
pub fn arms(
    scene: &mut Scene,
    bones: &Bones,
    now: f64,
    lip: &LipSyncState,
    rates: &DampingRates,
    dt: f32,
) {
    if !(lip.active && lip.intensity > 0.0) {
        rest(scene, bones, rates.idle, dt);
        return;
    }

    let amp = 0.3 * lip.intensity;
    let swing = wave(now, 1.4, 0.0);
    let counter = wave(now, 1.2, PI * 0.3);

    for (slot, side) in [(BoneSlot::LeftUpperArm, 1.0), (BoneSlot::RightUpperArm, -1.0)] {
        if let Some(r) = rotation_mut(scene, bones.get(slot)) {
            r.z = damp(r.z, side * amp * 0.8 * swing, rates.upper_arm, dt);
            r.x = damp(r.x, side * amp * 0.5 * counter, rates.upper_arm, dt);
        }
    }

    for (slot, side) in [(BoneSlot::LeftLowerArm, 1.0), (BoneSlot::RightLowerArm, -1.0)] {
        if let Some(r) = rotation_mut(scene, bones.get(slot)) {
            let target = (amp * 0.9 * (side * swing * 0.8 + 0.2))
                .clamp(-LOWER_ARM_LIMIT, LOWER_ARM_LIMIT);
            r.x = damp(r.x, target, rates.lower_arm, dt);
        }
    }

    let hands = [
        (BoneSlot::LeftHand, wave(now, 2.0, 0.4)),
        (BoneSlot::RightHand, wave(now, 2.1, -0.3)),
    ];
    for (slot, hand) in hands {
        if let Some(r) = rotation_mut(scene, bones.get(slot)) {
            let target = (amp * 0.6 * hand).clamp(-HAND_LIMIT, HAND_LIMIT);
            r.y = damp(r.y, target, rates.hand, dt);
        }
    }
}

fn rest(scene: &mut Scene, bones: &Bones, rate: f32, dt: f32) {
    for slot in [BoneSlot::LeftUpperArm, BoneSlot::RightUpperArm] {
        if let Some(r) = rotation_mut(scene, bones.get(slot)) {
            r.z = damp(r.z, 0.0, rate, dt);
            r.x = damp(r.x, 0.0, rate, dt);
        }
    }
    for slot in [BoneSlot::LeftLowerArm, BoneSlot::RightLowerArm] {
        if let Some(r) = rotation_mut(scene, bones.get(slot)) {
            r.x = damp(r.x, 0.0, rate, dt);
        }
    }
    for slot in [BoneSlot::LeftHand, BoneSlot::RightHand] {
        if let Some(r) = rotation_mut(scene, bones.get(slot)) {
            r.y = damp(r.y, 0.0, rate, dt);
        }
    }
}

/// Weight of the upper body clip layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureLayer {
    base_weight: f32,
    weight: f32,
}

impl GestureLayer {
    pub fn new(base_weight: f32) -> Self {
        Self {
            base_weight,
            weight: 0.0,
        }
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Ease the layer toward its resting weight, plus more while speaking.
    pub fn update(&mut self, action: &mut ClipAction, lip: &LipSyncState, rate: f32, dt: f32) {
        let speak = if lip.active { 0.7 * lip.intensity } else { 0.0 };
        let target = (self.base_weight + speak).clamp(0.0, 1.0);

        self.weight = damp(self.weight, target, rate, dt);
        action.weight = self.weight;
        action.time_scale = 1.0 + 0.2 * lip.intensity;
    }
}
