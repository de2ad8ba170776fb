/*!
Engine-independent mirror of a loaded model.

The animation core only ever reads and writes this arena. Engine bindings are
responsible for building it from their own node tree and for pushing the
animated values back out every frame.
*/

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Handle to a node in a [Scene]. Only valid for the scene that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Morph targets (blend shapes) of a single mesh.
///
/// Key order is insertion order and is significant, since channel discovery
/// breaks ties by taking the first matching key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphSet {
    dictionary: Vec<(String, usize)>,
    influences: Vec<f32>,
}

impl MorphSet {
    /// Create a set where each name maps to its position in `names`.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dictionary = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name.into(), idx))
            .collect::<Vec<_>>();
        let influences = vec![0.0; dictionary.len()];

        Self {
            dictionary,
            influences,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty()
    }

    pub fn len(&self) -> usize {
        self.influences.len()
    }

    /// Names in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.dictionary.iter().map(|(name, _)| name.as_str())
    }

    /// `(name, index)` pairs in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, usize)> {
        self.dictionary.iter().map(|(name, idx)| (name.as_str(), *idx))
    }

    /// Exact-name lookup.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.dictionary
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, idx)| *idx)
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.influences.get(index).copied()
    }

    /// Set an influence. Out of range indices are ignored.
    pub fn set(&mut self, index: usize, value: f32) {
        if let Some(v) = self.influences.get_mut(index) {
            *v = value;
        }
    }

    pub fn influences(&self) -> &[f32] {
        &self.influences
    }
}

/// What a node is, as far as the animation core cares.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Bone,
    Mesh(MorphSet),
}

/// Local transform of a node.
///
/// `rotation` is an XYZ Euler offset applied on top of the node's rest rotation,
/// so a zero rotation always means "rest pose".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    pub rest_rotation: Quat,
    pub rest_translation: Vec3,
    pub transform: Transform,
}

impl SceneNode {
    pub fn is_bone(&self) -> bool {
        matches!(self.kind, NodeKind::Bone)
    }

    pub fn morphs(&self) -> Option<&MorphSet> {
        match &self.kind {
            NodeKind::Mesh(v) => Some(v),
            _ => None,
        }
    }

    /// Rest rotation combined with the animated Euler offset.
    pub fn local_rotation(&self) -> Quat {
        let r = self.transform.rotation;
        self.rest_rotation * Quat::from_euler(EulerRot::XYZ, r.x, r.y, r.z)
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.transform.scale,
            self.local_rotation(),
            self.transform.translation,
        )
    }
}

/// Arena of [SceneNode]s. Node 0 is always the model root.
#[derive(Debug, Clone)]
pub struct Scene {
    nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![SceneNode {
                name: root_name.into(),
                parent: None,
                children: vec![],
                kind: NodeKind::Group,
                rest_rotation: Quat::IDENTITY,
                rest_translation: Vec3::ZERO,
                transform: Transform::default(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a child at rest (identity rotation, origin).
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>, kind: NodeKind) -> NodeId {
        self.add_child_at(parent, name, kind, Vec3::ZERO, Quat::IDENTITY)
    }

    /// Append a child with an explicit rest translation and rotation.
    ///
    /// Panics if `parent` does not belong to this scene.
    pub fn add_child_at(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        kind: NodeKind,
        rest_translation: Vec3,
        rest_rotation: Quat,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SceneNode {
            name: name.into(),
            parent: Some(parent),
            children: vec![],
            kind,
            rest_rotation,
            rest_translation,
            transform: Transform {
                translation: rest_translation,
                ..Default::default()
            },
        });
        self.nodes[parent.0].children.push(id);

        id
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn transform_mut(&mut self, id: NodeId) -> Option<&mut Transform> {
        self.nodes.get_mut(id.0).map(|n| &mut n.transform)
    }

    pub fn morphs(&self, id: NodeId) -> Option<&MorphSet> {
        self.nodes.get(id.0).and_then(|n| n.morphs())
    }

    pub fn morphs_mut(&mut self, id: NodeId) -> Option<&mut MorphSet> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Mesh(v)) => Some(v),
            _ => None,
        }
    }

    /// First node with exactly this name, in traversal order.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.traverse()
            .into_iter()
            .find(|id| self.nodes[id.0].name == name)
    }

    /// Depth-first, pre-order, children in insertion order.
    pub fn traverse(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];

        while let Some(id) = stack.pop() {
            order.push(id);
            // Reversed so the first child is visited first
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }

        order
    }

    /// Model-space matrix of a node, including the root's own transform.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);

        while let Some(v) = current.and_then(|v| self.nodes.get(v.0)) {
            matrix = v.local_matrix() * matrix;
            current = v.parent;
        }

        matrix
    }

    /// Matrix of a node relative to the model root, ignoring the root's own
    /// transform. Identity for the root itself.
    pub fn model_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);

        while let Some(v) = current.and_then(|v| self.nodes.get(v.0)) {
            if v.parent.is_none() {
                break;
            }
            matrix = v.local_matrix() * matrix;
            current = v.parent;
        }

        matrix
    }

    /// Iterate over every node with its id, in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter().enumerate().map(|(idx, n)| (NodeId(idx), n))
    }
}
