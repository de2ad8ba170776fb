/*!
Per-frame procedural animation.

Every channel is smoothed with [damp], which stays stable for any frame delta,
so a frame arriving seconds late just snaps closer to its target.
*/

pub mod blink;
pub mod body;
pub mod gaze;
pub mod gesture;
pub mod mouth;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    clip::ClipAction,
    model::config::{AvatarConfig, DampingRates},
    rig::{BoneSlot, RigControlMap},
    scene::{NodeId, Scene},
    speech::LipSyncState,
};

use self::{blink::Blink, gaze::Gaze, gesture::GestureLayer, mouth::MouthDrive};

/// Upper bound for the random time offset picked at startup, in seconds.
const PHASE_RANGE: f64 = 60.0;

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// `sin(now * freq + offset)`.
///
/// Procedural time grows for as long as the avatar runs, so the phase is
/// computed in `f64` and only the result is narrowed.
pub fn wave(now: f64, freq: f64, offset: f64) -> f32 {
    (now * freq + offset).sin() as f32
}

/// Frame-rate independent exponential smoothing of `current` toward `target`.
pub fn damp(current: f32, target: f32, rate: f32, dt: f32) -> f32 {
    lerp(current, target, 1.0 - (-rate * dt).exp())
}

/// Rotation offset of an optional node.
fn rotation_mut(scene: &mut Scene, id: Option<NodeId>) -> Option<&mut Vec3> {
    id.and_then(|id| scene.transform_mut(id))
        .map(|t| &mut t.rotation)
}

/// Drives everything on a rig that is not baked into a clip.
#[derive(Debug)]
pub struct Animator<R: Rng = ChaCha8Rng> {
    rng: R,
    rates: DampingRates,
    /// Procedural time in seconds, starting at a random offset so multiple
    /// avatars do not sway in lockstep.
    clock: f64,
    gaze: Gaze,
    blink: Blink,
    gesture: GestureLayer,
}

impl Animator<ChaCha8Rng> {
    /// Seeded from the config, or from entropy when no seed is set.
    pub fn from_config(config: &AvatarConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);

        Self::new(
            ChaCha8Rng::seed_from_u64(seed),
            config.damping,
            config.gesture_base_weight,
        )
    }
}

impl<R: Rng> Animator<R> {
    pub fn new(mut rng: R, rates: DampingRates, gesture_base_weight: f32) -> Self {
        let clock = rng.random_range(0.0..PHASE_RANGE);
        let gaze = Gaze::new();
        let blink = Blink::new(&mut rng);

        Self {
            rng,
            rates,
            clock,
            gaze,
            blink,
            gesture: GestureLayer::new(gesture_base_weight),
        }
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn gesture_weight(&self) -> f32 {
        self.gesture.weight()
    }

    /// Advance by `dt` seconds and write the resulting pose into `scene`.
    ///
    /// `lip` must already be ticked for this frame. `gesture` is the upper body
    /// clip layer, if one was loaded.
    pub fn update(
        &mut self,
        dt: f32,
        scene: &mut Scene,
        rig: &RigControlMap,
        lip: &LipSyncState,
        gesture: Option<&mut ClipAction>,
    ) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.clock += f64::from(dt);
        let now = self.clock;
        let rates = &self.rates;

        body::sway(scene, now);
        if let Some(chest) = rig.bones.get(BoneSlot::Chest) {
            body::breathe(scene, chest, now, rates.breathing, dt);
        }

        let drive = MouthDrive::select(rig.lip_sync_tier(), lip);
        drive.apply(scene, rig, rates.jaw, dt);

        if let Some(head) = rig.bones.get(BoneSlot::Head) {
            body::head(scene, head, now, lip, drive.head_tilt(), rates, dt);
        }

        gesture::arms(scene, &rig.bones, now, lip, rates, dt);
        if let Some(action) = gesture {
            self.gesture.update(action, lip, rates.gesture_layer, dt);
        }

        self.gaze
            .update(&mut self.rng, scene, &rig.bones, rates.eyes, dt);
        self.blink
            .update(&mut self.rng, dt, scene, &rig.blink_channels);
    }
}
