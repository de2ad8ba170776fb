/*!
Plain data description of a rig, used for headless loading and tests.

```json
{
    "name": "Avatar",
    "nodes": [
        {
            "name": "Hips",
            "kind": "bone",
            "translation": [0.0, 1.0, 0.0],
            "children": [{ "name": "Head", "kind": "bone" }]
        },
        { "name": "Face", "kind": "mesh", "morphs": ["jawOpen", "viseme_aa"] }
    ],
    "clips": []
}
```
*/

use glam::{Quat, Vec3, Vec4};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    clip::AnimationClip,
    scene::{MorphSet, NodeId, NodeKind, Scene},
};

/// A loaded rig, ready to be introspected and animated.
#[derive(Debug, Clone)]
pub struct RigAsset {
    pub scene: Scene,
    /// Baked clips. The first one is played as the base layer.
    pub clips: Vec<AnimationClip>,
}

impl RigAsset {
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        let description: RigDescription = serde_json::from_str(data)?;

        Ok(description.into())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeDescriptionKind {
    #[default]
    Group,
    Bone,
    Mesh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    #[serde(default)]
    pub kind: NodeDescriptionKind,
    /// Rest translation.
    #[serde(default)]
    pub translation: Vec3,
    /// Rest rotation as `[x, y, z, w]`.
    #[serde(default = "identity")]
    pub rotation: Quat,
    /// Morph target names in channel order. Only used by meshes.
    #[serde(default)]
    pub morphs: Vec<String>,
    #[serde(default)]
    pub children: Vec<NodeDescription>,
}

fn identity() -> Quat {
    Quat::IDENTITY
}

/// Unit length version of `rotation`, [None] for zero or non-finite input.
fn normalized(rotation: Quat) -> Option<Quat> {
    Vec4::from(rotation).try_normalize().map(Quat::from_vec4)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigDescription {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub clips: Vec<AnimationClip>,
}

fn default_name() -> String {
    "Avatar".to_string()
}

impl From<RigDescription> for RigAsset {
    fn from(value: RigDescription) -> Self {
        let mut scene = Scene::new(value.name);
        let root = scene.root();
        for node in value.nodes {
            add_node(&mut scene, root, node);
        }

        let mut clips = value.clips;
        for track in clips.iter_mut().flat_map(|c| c.tracks.iter_mut()) {
            let before = track.keyframes.len();
            track.keyframes.retain_mut(|k| match normalized(k.rotation) {
                Some(v) => {
                    k.rotation = v;
                    true
                }
                None => false,
            });
            if track.keyframes.len() != before {
                warn!("Dropped keyframes without a valid rotation from {}", track.target);
            }
        }

        Self { scene, clips }
    }
}

fn add_node(scene: &mut Scene, parent: NodeId, description: NodeDescription) {
    let kind = match description.kind {
        NodeDescriptionKind::Group => NodeKind::Group,
        NodeDescriptionKind::Bone => NodeKind::Bone,
        NodeDescriptionKind::Mesh => NodeKind::Mesh(MorphSet::new(description.morphs)),
    };

    let rotation = normalized(description.rotation).unwrap_or_else(|| {
        warn!("{} has an invalid rest rotation, using identity", description.name);
        Quat::IDENTITY
    });

    let id = scene.add_child_at(
        parent,
        description.name,
        kind,
        description.translation,
        rotation,
    );
    for child in description.children {
        add_node(scene, id, child);
    }
}
