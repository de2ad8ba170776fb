use glam::Vec3;
use rand::Rng;

use crate::{
    rig::{BoneSlot, Bones},
    scene::{NodeId, Scene},
};

use super::damp;

/// Yaw and pitch limit for the eyes in radians.
const MAX_ANGLE: f32 = 0.25;
const MIN_SACCADE: f32 = 0.18;
const MAX_SACCADE: f32 = 0.6;

/// Eye saccades toward a point in front of the face.
///
/// The look target is expressed relative to the model root, so it follows the
/// model when it is moved or scaled.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaze {
    target: Vec3,
    /// Seconds until the next saccade.
    next_saccade_in: f32,
}

impl Default for Gaze {
    fn default() -> Self {
        Self::new()
    }
}

impl Gaze {
    /// The first saccade happens on the first update.
    pub fn new() -> Self {
        Self {
            target: Vec3::new(0.0, 1.6, 2.5),
            next_saccade_in: 0.0,
        }
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn update(
        &mut self,
        rng: &mut impl Rng,
        scene: &mut Scene,
        bones: &Bones,
        rate: f32,
        dt: f32,
    ) {
        self.next_saccade_in -= dt;
        if self.next_saccade_in <= 0.0 {
            let x = rng.random_range(-0.1..0.1);
            let y = rng.random_range(-0.075..0.075);
            self.target = Vec3::new(x, 1.5 + y, 2.0);
            self.next_saccade_in = rng.random_range(MIN_SACCADE..MAX_SACCADE);
        }

        for slot in [BoneSlot::LeftEye, BoneSlot::RightEye] {
            if let Some(eye) = bones.get(slot) {
                look_at(scene, eye, self.target, rate, dt);
            }
        }
    }
}

/// Yaw and pitch that point local +Z from `from` toward `to`, both in the same
/// space and clamped to [MAX_ANGLE].
pub fn angles(from: Vec3, to: Vec3) -> (f32, f32) {
    let dir = (to - from).normalize_or_zero();
    let yaw = dir.x.atan2(dir.z);
    let pitch = (-dir.y).atan2(dir.x.hypot(dir.z));

    (
        yaw.clamp(-MAX_ANGLE, MAX_ANGLE),
        pitch.clamp(-MAX_ANGLE, MAX_ANGLE),
    )
}

fn look_at(scene: &mut Scene, eye: NodeId, target: Vec3, rate: f32, dt: f32) {
    let Some(node) = scene.node(eye) else {
        return;
    };

    let parent = node
        .parent
        .map(|p| scene.model_matrix(p))
        .unwrap_or_default();
    let local = parent.inverse().transform_point3(target);
    if !local.is_finite() {
        return;
    }

    let (yaw, pitch) = angles(node.transform.translation, local);
    let Some(transform) = scene.transform_mut(eye) else {
        return;
    };

    transform.rotation.y = damp(transform.rotation.y, yaw, rate, dt);
    transform.rotation.x = damp(transform.rotation.x, pitch, rate, dt);
}

#[cfg(test)]
mod tests {
    use glam::Quat;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::{rig::RigControlMap, scene::NodeKind};

    #[test]
    fn angles_are_clamped() {
        let (yaw, pitch) = angles(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!((yaw, pitch), (0.0, 0.0));

        let (yaw, pitch) = angles(Vec3::ZERO, Vec3::new(10.0, -10.0, 1.0));
        assert_eq!((yaw, pitch), (MAX_ANGLE, MAX_ANGLE));

        let (yaw, _) = angles(Vec3::ZERO, Vec3::new(0.1, 0.0, 1.0));
        assert!((yaw - 0.1f32.atan2(1.0)).abs() < 1e-6);

        // Degenerate direction
        assert_eq!(angles(Vec3::ONE, Vec3::ONE), (0.0, 0.0));
    }

    #[test]
    fn saccades_stay_in_front_and_in_range() {
        let mut scene = Scene::new("root");
        let head = scene.add_child_at(
            scene.root(),
            "Head",
            NodeKind::Bone,
            Vec3::new(0.0, 1.5, 0.0),
            Quat::IDENTITY,
        );
        let eye = scene.add_child_at(
            head,
            "LeftEye",
            NodeKind::Bone,
            Vec3::new(0.03, 0.05, 0.1),
            Quat::IDENTITY,
        );
        // The model is placed below the origin, gaze follows it
        scene.node_mut(scene.root()).unwrap().transform.translation = Vec3::new(0.0, -1.5, 0.0);
        let rig = RigControlMap::discover(&scene);

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut gaze = Gaze::new();
        let mut last = gaze.target();
        let mut saccades = 0;
        for _ in 0..600 {
            gaze.update(&mut rng, &mut scene, &rig.bones, 30.0, 1.0 / 60.0);

            let target = gaze.target();
            if target != last {
                saccades += 1;
                last = target;
            }
            assert!(target.x.abs() <= 0.1);
            assert!((target.y - 1.5).abs() <= 0.075);
            assert_eq!(target.z, 2.0);

            let r = scene.node(eye).unwrap().transform.rotation;
            assert!(r.x.abs() <= MAX_ANGLE && r.y.abs() <= MAX_ANGLE, "{r}");
            // Target is roughly level with the eye, so the clamp is never hit
            assert!(r.x.abs() < MAX_ANGLE - 0.05, "{r}");
        }

        // Ten seconds with intervals between 0.18 and 0.6
        assert!((16..=56).contains(&saccades), "{saccades}");
    }

    #[test]
    fn missing_eyes_still_resample() {
        let mut scene = Scene::new("root");
        let bones = Bones::default();
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let mut gaze = Gaze::new();
        gaze.update(&mut rng, &mut scene, &bones, 30.0, 0.016);

        assert_eq!(gaze.target().z, 2.0);
    }
}
