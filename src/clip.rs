/*!
Baked rotation clips and a small mixer to play them on a [Scene].

Only rotation tracks are supported. Keyframe rotations are relative to the bound
node's rest rotation, the same convention [crate::scene::Transform] uses.
*/

use glam::{EulerRot, Quat, Vec3};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::scene::{NodeId, Scene};

static UPPER_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new("(?i)shoulder|upperarm|lowerarm|forearm|hand|thumb|index|middle|ring|pinky")
        .expect("built-in pattern must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub rotation: Quat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Name of the node this track animates.
    pub target: String,
    /// Sorted by time.
    pub keyframes: Vec<Keyframe>,
}

impl Track {
    /// Linear (slerp) sample, clamped to the first and last keyframe.
    pub fn sample(&self, time: f32) -> Option<Quat> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;

        if time.is_nan() || time <= first.time {
            return Some(first.rotation);
        }
        if time >= last.time {
            return Some(last.rotation);
        }

        let next = self.keyframes.partition_point(|k| k.time <= time);
        let (a, b) = (&self.keyframes[next - 1], &self.keyframes[next]);
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return Some(b.rotation);
        }

        Some(a.rotation.slerp(b.rotation, (time - a.time) / span))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    /// Seconds.
    pub duration: f32,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    /// Copy of this clip limited to shoulder, arm, hand and finger tracks.
    ///
    /// Returns [None] when no track survives the filter.
    pub fn upper_body(&self) -> Option<AnimationClip> {
        let tracks = self
            .tracks
            .iter()
            .filter(|t| UPPER_BODY.is_match(&t.target))
            .cloned()
            .collect::<Vec<_>>();
        if tracks.is_empty() {
            return None;
        }

        Some(AnimationClip {
            name: format!("{}_upper", self.name),
            duration: self.duration,
            tracks,
        })
    }
}

/// Handle to an action inside an [AnimationMixer].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(usize);

/// A looping clip bound to scene nodes.
#[derive(Debug, Clone)]
pub struct ClipAction {
    clip: AnimationClip,
    /// Parallel to `clip.tracks`, [None] for tracks without a matching node.
    bindings: Vec<Option<NodeId>>,
    time: f32,
    pub weight: f32,
    pub time_scale: f32,
}

impl ClipAction {
    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Number of tracks that found a node to animate.
    pub fn bound_tracks(&self) -> usize {
        self.bindings.iter().filter(|v| v.is_some()).count()
    }

    fn advance(&mut self, dt: f32) {
        self.time += dt * self.time_scale;
        if self.clip.duration > 0.0 && self.time.is_finite() {
            self.time = self.time.rem_euclid(self.clip.duration);
        } else {
            self.time = 0.0;
        }
    }
}

/// Plays [ClipAction]s and blends them by weight.
#[derive(Debug, Clone, Default)]
pub struct AnimationMixer {
    actions: Vec<ClipAction>,
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `clip` to the nodes of `scene` by name and start it looping.
    pub fn add_action(&mut self, clip: AnimationClip, scene: &Scene, weight: f32) -> ActionId {
        let bindings = clip
            .tracks
            .iter()
            .map(|t| scene.find(&t.target))
            .collect::<Vec<_>>();

        let action = ClipAction {
            clip,
            bindings,
            time: 0.0,
            weight,
            time_scale: 1.0,
        };
        debug!(
            "Playing clip {} with {}/{} tracks bound",
            action.clip.name,
            action.bound_tracks(),
            action.clip.tracks.len()
        );

        self.actions.push(action);

        ActionId(self.actions.len() - 1)
    }

    pub fn action(&self, id: ActionId) -> Option<&ClipAction> {
        self.actions.get(id.0)
    }

    pub fn action_mut(&mut self, id: ActionId) -> Option<&mut ClipAction> {
        self.actions.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClipAction> {
        self.actions.iter()
    }

    /// Advance every action by `dt` and write the blended pose into `scene`.
    ///
    /// Nodes are only written when their total weight is positive. A total
    /// below 1 is blended with the rest pose.
    pub fn update(&mut self, dt: f32, scene: &mut Scene) {
        let mut poses: Vec<(NodeId, Quat, f32)> = vec![];

        for action in self.actions.iter_mut() {
            action.advance(dt);

            let weight = action.weight;
            if weight <= 0.0 {
                continue;
            }

            for (track, binding) in action.clip.tracks.iter().zip(action.bindings.iter()) {
                let (Some(id), Some(rotation)) = (binding, track.sample(action.time)) else {
                    continue;
                };

                match poses.iter_mut().find(|(v, _, _)| v == id) {
                    Some((_, acc, total)) => {
                        *total += weight;
                        *acc = acc.slerp(rotation, weight / *total);
                    }
                    None => poses.push((*id, rotation, weight)),
                }
            }
        }

        for (id, acc, total) in poses {
            let rotation = if total < 1.0 {
                Quat::IDENTITY.slerp(acc, total)
            } else {
                acc
            };

            if let Some(transform) = scene.transform_mut(id) {
                let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
                transform.rotation = Vec3::new(x, y, z);
            }
        }
    }
}
