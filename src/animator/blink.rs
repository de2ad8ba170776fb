use rand::Rng;

use crate::{rig::BlinkChannels, scene::Scene};

/// Seconds to fully close, and again to fully open.
const HALF_BLINK: f32 = 0.08;
const MIN_INTERVAL: f32 = 3.0;
const INTERVAL_SPREAD: f32 = 4.0;
const DOUBLE_BLINK_CHANCE: f64 = 0.05;
const DOUBLE_BLINK_DELAY: f32 = 0.25;

/// Blink timer driving both eyes with the same triangular envelope.
///
/// The wait until the next blink counts down by frame deltas, so it does not
/// depend on how long the avatar has been running.
#[derive(Debug, Clone, PartialEq)]
pub struct Blink {
    /// 0-1 closing, 1-2 opening.
    phase: f32,
    blinking: bool,
    /// Seconds until the next blink starts.
    next_in: f32,
}

impl Blink {
    pub fn new(rng: &mut impl Rng) -> Self {
        Self {
            phase: 0.0,
            blinking: false,
            next_in: next_interval(rng),
        }
    }

    pub fn is_blinking(&self) -> bool {
        self.blinking
    }

    pub fn next_in(&self) -> f32 {
        self.next_in
    }

    pub fn update(
        &mut self,
        rng: &mut impl Rng,
        dt: f32,
        scene: &mut Scene,
        channels: &[BlinkChannels],
    ) {
        if !self.blinking {
            self.next_in -= dt;
            if self.next_in <= 0.0 {
                self.blinking = true;
                self.phase = 0.0;
            }
        }
        if !self.blinking {
            return;
        }

        self.phase += dt / HALF_BLINK;
        if self.phase < 1.0 {
            set_blink(scene, channels, self.phase.clamp(0.0, 1.0));
        } else if self.phase < 2.0 {
            set_blink(scene, channels, (2.0 - self.phase).clamp(0.0, 1.0));
        } else {
            set_blink(scene, channels, 0.0);
            self.blinking = false;
            self.next_in = if rng.random_bool(DOUBLE_BLINK_CHANCE) {
                DOUBLE_BLINK_DELAY
            } else {
                next_interval(rng)
            };
        }
    }
}

fn next_interval(rng: &mut impl Rng) -> f32 {
    MIN_INTERVAL + rng.random::<f32>() * INTERVAL_SPREAD
}

pub fn set_blink(scene: &mut Scene, channels: &[BlinkChannels], value: f32) {
    for channel in channels {
        let Some(morphs) = scene.morphs_mut(channel.mesh) else {
            continue;
        };

        for idx in [channel.left, channel.right].into_iter().flatten() {
            morphs.set(idx, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::{
        rig::RigControlMap,
        scene::{MorphSet, NodeId, NodeKind},
    };

    fn face() -> (Scene, NodeId, RigControlMap) {
        let mut scene = Scene::new("root");
        let face = scene.add_child(
            scene.root(),
            "Face",
            NodeKind::Mesh(MorphSet::new(["jawOpen", "eyeBlinkLeft", "eyeBlinkRight"])),
        );
        let rig = RigControlMap::discover(&scene);

        (scene, face, rig)
    }

    #[test]
    fn envelope() {
        let (mut scene, face, rig) = face();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut blink = Blink {
            phase: 0.0,
            blinking: false,
            next_in: 0.0,
        };

        let mut step = |blink: &mut Blink, scene: &mut Scene| {
            blink.update(&mut rng, 0.04, scene, &rig.blink_channels);
            let m = scene.morphs(face).unwrap();
            (m.get(1).unwrap(), m.get(2).unwrap())
        };

        let (l, r) = step(&mut blink, &mut scene);
        assert!((l - 0.5).abs() < 1e-5 && l == r);
        let (l, _) = step(&mut blink, &mut scene);
        assert!((l - 1.0).abs() < 1e-5);
        let (l, _) = step(&mut blink, &mut scene);
        assert!((l - 0.5).abs() < 1e-5);
        step(&mut blink, &mut scene);
        let (l, r) = step(&mut blink, &mut scene);
        assert_eq!((l, r), (0.0, 0.0));
        assert!(!blink.is_blinking());
        assert!(blink.next_in() >= DOUBLE_BLINK_DELAY);
    }

    #[test]
    fn interval_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for _ in 0..1000 {
            let v = next_interval(&mut rng);
            assert!((MIN_INTERVAL..MIN_INTERVAL + INTERVAL_SPREAD).contains(&v));
        }
    }

    #[test]
    fn huge_frame_finishes_blink() {
        let (mut scene, face, rig) = face();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut blink = Blink::new(&mut rng);

        blink.update(&mut rng, 10.0, &mut scene, &rig.blink_channels);
        assert!(!blink.is_blinking());
        assert_eq!(scene.morphs(face).unwrap().influences(), &[0.0, 0.0, 0.0]);
        assert!(blink.next_in() > 0.0);
    }

    #[test]
    fn does_not_touch_mouth() {
        let (mut scene, face, rig) = face();
        scene.morphs_mut(face).unwrap().set(0, 0.4);

        set_blink(&mut scene, &rig.blink_channels, 1.0);
        assert_eq!(scene.morphs(face).unwrap().influences(), &[0.4, 1.0, 1.0]);
    }
}
