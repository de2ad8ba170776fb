/*!
Mirrors an instantiated Godot scene into a [Scene] and writes the animated pose
back every frame.

Skeleton bones, `MeshInstance3D` blend shapes and plain `Node3D`s all become
scene nodes. Rotation tracks of any `AnimationPlayer` become [AnimationClip]s.
*/

use std::collections::HashMap;

use glam::Quat;
use godot::{
    engine::{
        animation::TrackType, global::Error, AnimationPlayer, ArrayMesh, GltfDocument, GltfState,
        MeshInstance3D, PackedScene, Skeleton3D,
    },
    prelude::*,
};
use log::{debug, warn};

use crate::{
    clip::{AnimationClip, Keyframe, Track},
    model::{GodotPath, RigAsset},
    scene::{MorphSet, NodeId, NodeKind, Scene},
    session::{JsonRigSource, LoadError, RigSource},
};

use super::{from_quat, from_vec3, to_quat, to_vec3};

/// Animations Godot generates for resetting a pose.
const RESET_ANIMATION: &str = "RESET";

/// Which engine object a scene node writes back to.
#[derive(Debug)]
enum Binding {
    Node(Gd<Node3D>),
    Bone { skeleton: Gd<Skeleton3D>, bone: i32 },
    Mesh(Gd<MeshInstance3D>),
}

/// An instantiated model plus the mapping from scene nodes to engine objects.
#[derive(Debug)]
pub struct GodotRig {
    root: Gd<Node3D>,
    bindings: Vec<(NodeId, Binding)>,
}

impl GodotRig {
    pub fn root(&self) -> Gd<Node3D> {
        self.root.share()
    }

    /// Push the animated pose into the engine.
    pub fn apply(&mut self, scene: &Scene) {
        for (id, binding) in self.bindings.iter_mut() {
            let Some(node) = scene.node(*id) else {
                continue;
            };

            match binding {
                Binding::Node(v) => {
                    v.set_position(from_vec3(node.transform.translation));
                    v.set_quaternion(from_quat(node.local_rotation()));
                    v.set_scale(from_vec3(node.transform.scale));
                }
                Binding::Bone { skeleton, bone } => {
                    skeleton.set_bone_pose_position(*bone, from_vec3(node.transform.translation));
                    skeleton.set_bone_pose_rotation(*bone, from_quat(node.local_rotation()));
                    skeleton.set_bone_pose_scale(*bone, from_vec3(node.transform.scale));
                }
                Binding::Mesh(v) => {
                    let Some(morphs) = node.morphs() else {
                        continue;
                    };
                    for (idx, value) in morphs.influences().iter().enumerate() {
                        v.set_blend_shape_value(idx as i32, *value);
                    }
                }
            }
        }
    }

    fn free(self) {
        self.root.free();
    }
}

/// Loads models through the engine.
///
/// `res://` and `user://` paths go through the resource loader, other paths are
/// read as glTF at runtime and `.json` paths are rig descriptions without any
/// engine nodes.
#[derive(Debug, Default)]
pub struct GodotRigSource {
    instances: HashMap<String, GodotRig>,
}

impl GodotRigSource {
    /// Take ownership of the engine nodes created for `url`.
    pub fn take(&mut self, url: &str) -> Option<GodotRig> {
        self.instances.remove(url)
    }

    /// Free every instance nobody took.
    pub fn clear(&mut self) {
        for (url, rig) in self.instances.drain() {
            debug!("Freeing unused instance of {url}");
            rig.free();
        }
    }

    fn instantiate(path: &GodotPath) -> Result<Gd<Node>, LoadError> {
        if path.is_resource() {
            let scene = try_load::<PackedScene>(path.as_str())
                .ok_or_else(|| LoadError::NotFound(path.to_string()))?;

            return scene
                .instantiate()
                .ok_or_else(|| LoadError::Unsupported(format!("{} is not instantiable", path.as_str())));
        }

        if !std::path::Path::new(path.as_str()).exists() {
            return Err(LoadError::NotFound(path.to_string()));
        }

        let mut doc = GltfDocument::new();
        let state = GltfState::new();
        let err = doc.append_from_file(path.clone().into(), state.share());
        if err != Error::OK {
            return Err(LoadError::Parse(format!("{} ({err:?})", path.as_str())));
        }

        doc.generate_scene(state)
            .ok_or_else(|| LoadError::Unsupported(format!("{} has no scene", path.as_str())))
    }
}

impl Drop for GodotRigSource {
    fn drop(&mut self) {
        self.clear();
    }
}

impl GodotRigSource {
    /// Instantiate `path` and mirror it. The caller owns the returned root.
    fn mirror(path: &GodotPath) -> Result<(Gd<Node3D>, Mirror), LoadError> {
        let node = Self::instantiate(path)?;
        let Some(root) = node.share().try_cast::<Node3D>() else {
            node.free();
            return Err(LoadError::Unsupported(format!("{} is not a Node3D", path.as_str())));
        };

        let mut mirror = Mirror::new(&root);
        let root_id = mirror.scene.root();
        for child in root.get_children().iter_shared() {
            mirror.visit(child, root_id);
        }

        Ok((root, mirror))
    }
}

impl RigSource for GodotRigSource {
    fn load_rig(&mut self, url: &str) -> Result<RigAsset, LoadError> {
        let path = GodotPath::from(url);
        if path.is_json() {
            return JsonRigSource.load_rig(url);
        }

        let (root, mirror) = Self::mirror(&path)?;
        let clips = mirror.clips();
        debug!(
            "Mirrored {url}: {} nodes, {} bindings, {} clips",
            mirror.scene.len(),
            mirror.bindings.len(),
            clips.len()
        );

        let Mirror {
            scene, bindings, ..
        } = mirror;
        if let Some(old) = self.instances.insert(url.to_string(), GodotRig { root, bindings }) {
            old.free();
        }

        Ok(RigAsset { scene, clips })
    }

    /// The engine instance is freed right away and never stored.
    fn load_clips(&mut self, url: &str) -> Result<Vec<AnimationClip>, LoadError> {
        let path = GodotPath::from(url);
        if path.is_json() {
            return JsonRigSource.load_clips(url);
        }

        let (root, mirror) = Self::mirror(&path)?;
        let clips = mirror.clips();
        debug!("Read {} clips from {url}", clips.len());
        drop(mirror);
        root.free();

        Ok(clips)
    }
}

/// Builds a [Scene] while walking the engine tree.
struct Mirror {
    scene: Scene,
    bindings: Vec<(NodeId, Binding)>,
    players: Vec<Gd<AnimationPlayer>>,
}

impl Mirror {
    fn new(root: &Gd<Node3D>) -> Self {
        let scene = Scene::new(root.get_name().to_string());
        let root_id = scene.root();

        Self {
            scene,
            bindings: vec![(root_id, Binding::Node(root.share()))],
            players: vec![],
        }
    }

    fn visit(&mut self, node: Gd<Node>, parent: NodeId) {
        let name = node.get_name().to_string();

        if let Some(player) = node.share().try_cast::<AnimationPlayer>() {
            self.players.push(player);
            return;
        }

        let Some(node3d) = node.share().try_cast::<Node3D>() else {
            for child in node.get_children().iter_shared() {
                self.visit(child, parent);
            }
            return;
        };

        let id = match node.share().try_cast::<MeshInstance3D>() {
            Some(mesh) => {
                let morphs = morph_names(&mesh);
                let id = self.add(parent, &name, NodeKind::Mesh(MorphSet::new(morphs)), &node3d);
                self.bindings.push((id, Binding::Mesh(mesh)));
                id
            }
            None => {
                let id = self.add(parent, &name, NodeKind::Group, &node3d);
                self.bindings.push((id, Binding::Node(node3d.share())));
                id
            }
        };

        if let Some(skeleton) = node.share().try_cast::<Skeleton3D>() {
            self.bones(skeleton, id);
        }

        for child in node.get_children().iter_shared() {
            self.visit(child, id);
        }
    }

    fn add(&mut self, parent: NodeId, name: &str, kind: NodeKind, node: &Gd<Node3D>) -> NodeId {
        let id = self.scene.add_child_at(
            parent,
            name,
            kind,
            to_vec3(node.get_position()),
            to_quat(node.get_quaternion()),
        );
        // glTF armatures are often scaled
        if let Some(t) = self.scene.transform_mut(id) {
            t.scale = to_vec3(node.get_scale());
        }

        id
    }

    /// Bones hang below the skeleton node in bone hierarchy order.
    fn bones(&mut self, skeleton: Gd<Skeleton3D>, skeleton_id: NodeId) {
        let count = skeleton.get_bone_count();

        let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
        for bone in 0..count {
            children
                .entry(skeleton.get_bone_parent(bone))
                .or_default()
                .push(bone);
        }

        let mut stack = children
            .get(&-1)
            .map(|roots| roots.iter().rev().map(|b| (*b, skeleton_id)).collect::<Vec<_>>())
            .unwrap_or_default();
        while let Some((bone, parent)) = stack.pop() {
            let rest = skeleton.get_bone_rest(bone);
            let id = self.scene.add_child_at(
                parent,
                skeleton.get_bone_name(bone).to_string(),
                NodeKind::Bone,
                to_vec3(rest.origin),
                to_quat(rest.basis.to_quat()),
            );
            self.bindings.push((
                id,
                Binding::Bone {
                    skeleton: skeleton.share(),
                    bone,
                },
            ));

            if let Some(v) = children.get(&bone) {
                stack.extend(v.iter().rev().map(|b| (*b, id)));
            }
        }
    }

    /// Rotation tracks of every animation, relative to the rest pose.
    fn clips(&self) -> Vec<AnimationClip> {
        let mut r = vec![];

        for player in self.players.iter() {
            for name in player.get_animation_list().as_slice() {
                if name.to_string() == RESET_ANIMATION {
                    continue;
                }
                let Some(animation) = player.get_animation(name.into()) else {
                    continue;
                };

                let mut tracks = vec![];
                for track in 0..animation.get_track_count() {
                    if animation.track_get_type(track) != TrackType::TYPE_ROTATION_3D {
                        continue;
                    }

                    let path = animation.track_get_path(track).to_string();
                    let target = track_target(&path).to_string();
                    let rest = self
                        .scene
                        .find(&target)
                        .and_then(|id| self.scene.node(id))
                        .map(|v| v.rest_rotation)
                        .unwrap_or(Quat::IDENTITY);

                    let keyframes = (0..animation.track_get_key_count(track))
                        .filter_map(|key| {
                            let value = animation.track_get_key_value(track, key);
                            let rotation = value.try_to::<Quaternion>().ok()?;

                            Some(Keyframe {
                                time: animation.track_get_key_time(track, key) as f32,
                                rotation: rest.inverse() * to_quat(rotation),
                            })
                        })
                        .collect::<Vec<_>>();
                    if keyframes.is_empty() {
                        continue;
                    }

                    tracks.push(Track { target, keyframes });
                }

                if tracks.is_empty() {
                    warn!("Animation {name} has no rotation tracks, skipping");
                    continue;
                }

                r.push(AnimationClip {
                    name: name.to_string(),
                    duration: animation.get_length(),
                    tracks,
                });
            }
        }

        r
    }
}

fn morph_names(mesh: &Gd<MeshInstance3D>) -> Vec<String> {
    let Some(mesh) = mesh.get_mesh().and_then(|v| v.try_cast::<ArrayMesh>()) else {
        return vec![];
    };

    (0..mesh.get_blend_shape_count())
        .map(|i| mesh.get_blend_shape_name(i).to_string())
        .collect()
}

/// `Armature/Skeleton3D:mixamorig_Hips` targets `mixamorig_Hips`,
/// `Armature/Head` targets `Head`.
fn track_target(path: &str) -> &str {
    match path.split_once(':') {
        Some((_, bone)) => bone,
        None => path.rsplit('/').next().unwrap_or(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_targets() {
        assert_eq!(track_target("Armature/Skeleton3D:mixamorig_Hips"), "mixamorig_Hips");
        assert_eq!(track_target("Skeleton3D:mixamorig:LeftHand"), "mixamorig:LeftHand");
        assert_eq!(track_target("Armature/Head"), "Head");
        assert_eq!(track_target("Head"), "Head");
    }
}
