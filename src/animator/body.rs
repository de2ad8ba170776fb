//! Idle sway, breathing and head motion.

use crate::{
    model::config::DampingRates,
    scene::{NodeId, Scene},
    speech::LipSyncState,
};

use super::{damp, wave};

/// Slow bob and sway of the whole model around its rest position.
pub fn sway(scene: &mut Scene, now: f64) {
    let root = scene.root();
    let Some(node) = scene.node_mut(root) else {
        return;
    };

    node.transform.translation.y = node.rest_translation.y + wave(now, 1.2, 0.0) * 0.008;
    node.transform.rotation.y = wave(now, 0.4, 0.0) * 0.02;
    node.transform.rotation.x = wave(now, 0.33, 0.0) * 0.01;
}

/// Amount of breath in, 0.0-0.04.
pub fn breath(now: f64) -> f32 {
    (wave(now, 0.5, 0.0) * 0.5 + 0.5) * 0.04
}

pub fn breathe(scene: &mut Scene, chest: NodeId, now: f64, rate: f32, dt: f32) {
    let Some(node) = scene.node_mut(chest) else {
        return;
    };

    let breath = breath(now);
    let target = node.rest_translation.y + breath * 0.01;
    node.transform.translation.y = damp(node.transform.translation.y, target, rate, dt);
    node.transform.scale.y = 1.0 + breath;
}

/// Head nods along with speech and settles into a slow idle tilt otherwise.
///
/// `extra_tilt` is the pitch added when the head is the only way left to show
/// speech on the rig.
pub fn head(
    scene: &mut Scene,
    head: NodeId,
    now: f64,
    lip: &LipSyncState,
    extra_tilt: f32,
    rates: &DampingRates,
    dt: f32,
) {
    let Some(rotation) = scene.transform_mut(head).map(|t| &mut t.rotation) else {
        return;
    };

    let amp = lip.intensity;
    let tilt = 0.02 * wave(now, 0.7, 0.0);

    if lip.active {
        let talk = (lip.t * 12.0).sin().abs();
        let nod = talk * amp * 0.15;
        let side = (lip.t * 8.0).sin() * amp * 0.08;

        rotation.x = damp(rotation.x, tilt + nod + extra_tilt, rates.head_nod, dt);
        rotation.y = damp(rotation.y, side, rates.head_side, dt);
        rotation.z = damp(rotation.z, side * 0.5, rates.head_side, dt);
    } else {
        // Leftover intensity keeps nodding while it decays
        let nod = amp * 0.05 * wave(now, 8.0, 0.0);

        rotation.x = damp(rotation.x, tilt + nod, rates.idle, dt);
        rotation.y = damp(rotation.y, 0.02 * wave(now + 1.7, 0.9, 0.0), rates.idle, dt);
        rotation.z = damp(rotation.z, 0.0, rates.idle, dt);
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;
    use crate::scene::NodeKind;

    #[test]
    fn sway_stays_near_rest() {
        let mut scene = Scene::new("root");
        scene.node_mut(scene.root()).unwrap().rest_translation = Vec3::new(0.0, -1.5, 0.0);

        for i in 0..200 {
            sway(&mut scene, i as f64 * 0.1);
            let t = scene.node(scene.root()).unwrap().transform;
            assert!((t.translation.y + 1.5).abs() <= 0.008 + 1e-6);
            assert!(t.rotation.y.abs() <= 0.02);
            assert!(t.rotation.x.abs() <= 0.01);
        }
    }

    #[test]
    fn breathing_is_relative_to_rest() {
        let mut scene = Scene::new("root");
        let chest = scene.add_child_at(
            scene.root(),
            "Chest",
            NodeKind::Bone,
            Vec3::new(0.0, 1.2, 0.0),
            Quat::IDENTITY,
        );

        for i in 0..100 {
            breathe(&mut scene, chest, i as f64 * 0.05, 10.0, 0.05);
        }

        let t = scene.node(chest).unwrap().transform;
        assert!((t.translation.y - 1.2).abs() <= 0.0004 + 1e-5);
        assert!((1.0..=1.04).contains(&t.scale.y));
    }

    #[test]
    fn head_settles_after_speech() {
        let mut scene = Scene::new("root");
        let id = scene.add_child(scene.root(), "Head", NodeKind::Bone);
        scene.transform_mut(id).unwrap().rotation = Vec3::new(0.3, 0.3, 0.3);

        let lip = LipSyncState::default();
        for i in 0..300 {
            head(&mut scene, id, i as f64 / 60.0, &lip, 0.0, &DampingRates::default(), 1.0 / 60.0);
        }

        let r = scene.node(id).unwrap().transform.rotation;
        assert!(r.x.abs() <= 0.021, "{r}");
        assert!(r.y.abs() <= 0.021, "{r}");
        assert!(r.z.abs() < 1e-3, "{r}");
    }

    #[test]
    fn head_nods_while_speaking() {
        let mut scene = Scene::new("root");
        let id = scene.add_child(scene.root(), "Head", NodeKind::Bone);
        let lip = LipSyncState {
            active: true,
            t: 0.1,
            intensity: 1.0,
            ..Default::default()
        };

        // At now = 0 the idle tilt is zero, so the pitch target is the nod alone
        head(&mut scene, id, 0.0, &lip, 0.0, &DampingRates::default(), 5.0);
        let r = scene.node(id).unwrap().transform.rotation;
        let expected = (0.1f32 * 12.0).sin().abs() * 0.15;
        assert!((r.x - expected).abs() < 1e-4, "{r}");

        head(&mut scene, id, 0.0, &lip, 0.05, &DampingRates::default(), 5.0);
        let r = scene.node(id).unwrap().transform.rotation;
        assert!((r.x - expected - 0.05).abs() < 1e-4, "{r}");
    }
}
