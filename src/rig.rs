/*!
Rig introspection.

Walks a [Scene] once and figures out which bones and morph targets can be used
for what. Missing channels are expected and never an error, the result just
reports a weaker [LipSyncTier].
*/

pub mod rules;

use log::{debug, info, warn};

use crate::{
    scene::{MorphSet, NodeId, Scene},
    speech::Viseme,
};

pub use rules::BoneSlot;

/// A single morph channel on a specific mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphChannel {
    pub mesh: NodeId,
    pub index: usize,
}

/// Viseme channels found on one mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisemeChannels {
    pub mesh: NodeId,
    /// Indexed by [Viseme::index].
    pub indices: [Option<usize>; 6],
    /// Generic mouth-open channel, used when a viseme is missing on this mesh.
    pub jaw_index: Option<usize>,
}

impl VisemeChannels {
    pub fn index(&self, viseme: Viseme) -> Option<usize> {
        self.indices[viseme.index()]
    }
}

/// Eye blink channels found on one mesh. At least one side is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkChannels {
    pub mesh: NodeId,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

/// Bones keyed by [BoneSlot]. Any slot may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bones {
    slots: [Option<NodeId>; BoneSlot::COUNT],
}

impl Bones {
    pub fn get(&self, slot: BoneSlot) -> Option<NodeId> {
        self.slots[slot.index()]
    }

    pub fn is_set(&self, slot: BoneSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    fn set(&mut self, slot: BoneSlot, id: NodeId) {
        self.slots[slot.index()] = Some(id);
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|v| v.is_some()).count()
    }
}

/// How mouth movement can be expressed on a rig, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LipSyncTier {
    Visemes,
    MouthMorph,
    JawBone,
    HeadTilt,
    None,
}

impl AsRef<str> for LipSyncTier {
    fn as_ref(&self) -> &str {
        match self {
            Self::Visemes => "visemes",
            Self::MouthMorph => "mouth_morph",
            Self::JawBone => "jaw_bone",
            Self::HeadTilt => "head_tilt",
            Self::None => "none",
        }
    }
}

/// Everything the animator is allowed to touch on a loaded rig.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RigControlMap {
    pub morph_targets: Vec<MorphChannel>,
    pub viseme_channels: Vec<VisemeChannels>,
    pub blink_channels: Vec<BlinkChannels>,
    pub bones: Bones,
}

impl RigControlMap {
    /// Discover the control map of `scene`.
    ///
    /// Nodes are visited depth-first in child order and the first match for a
    /// slot wins, so the result only depends on the scene's structure.
    pub fn discover(scene: &Scene) -> Self {
        let mut r = Self::default();

        for id in scene.traverse() {
            let Some(node) = scene.node(id) else {
                continue;
            };

            if let Some(morphs) = node.morphs().filter(|v| !v.is_empty()) {
                debug!(
                    "Found mesh {} with {} morph targets",
                    node.name,
                    morphs.len()
                );
                r.discover_morphs(id, morphs);
            }

            if node.is_bone() {
                let bones = &r.bones;
                let slots = rules::match_bone(&node.name, |s| bones.is_set(s));
                for slot in slots {
                    debug!("Using bone {} for {}", node.name, slot.as_ref());
                    r.bones.set(slot, id);
                }
            }
        }

        info!(
            "Rig discovered - lip sync targets: {}, viseme targets: {}, blink targets: {}, bones: {}",
            r.morph_targets.len(),
            r.viseme_channels.len(),
            r.blink_channels.len(),
            r.bones.count()
        );
        match r.lip_sync_tier() {
            LipSyncTier::Visemes | LipSyncTier::MouthMorph => {}
            LipSyncTier::JawBone => {
                warn!("No morph targets found, using jaw bone rotation for lip sync")
            }
            LipSyncTier::HeadTilt => {
                warn!("No morph targets or jaw bone found, using head tilt for lip sync")
            }
            LipSyncTier::None => {
                warn!("No lip sync method available, no morph targets, jaw bone, or head bone")
            }
        }

        r
    }

    fn discover_morphs(&mut self, mesh: NodeId, morphs: &MorphSet) {
        let jaw_index = mouth_open_index(morphs);
        if let Some(index) = jaw_index {
            self.morph_targets.push(MorphChannel { mesh, index });
        }

        let mut indices = [None; 6];
        for viseme in Viseme::ALL {
            indices[viseme.index()] = morphs
                .entries()
                .find(|(name, _)| rules::is_viseme_candidate(viseme, name))
                .map(|(_, idx)| idx);
        }
        if indices.iter().any(Option::is_some) {
            self.viseme_channels.push(VisemeChannels {
                mesh,
                indices,
                jaw_index,
            });
        }

        let left = blink_index(morphs, true);
        let right = blink_index(morphs, false);
        if left.is_some() || right.is_some() {
            self.blink_channels.push(BlinkChannels { mesh, left, right });
        }
    }

    /// The strongest mouth strategy this rig supports.
    pub fn lip_sync_tier(&self) -> LipSyncTier {
        if !self.viseme_channels.is_empty() {
            LipSyncTier::Visemes
        } else if !self.morph_targets.is_empty() {
            LipSyncTier::MouthMorph
        } else if self.bones.is_set(BoneSlot::Jaw) {
            LipSyncTier::JawBone
        } else if self.bones.is_set(BoneSlot::Head) {
            LipSyncTier::HeadTilt
        } else {
            LipSyncTier::None
        }
    }

    /// Whether speech can be shown on this rig at all.
    pub fn has_lip_sync(&self) -> bool {
        self.lip_sync_tier() != LipSyncTier::None
    }
}

/// Resolve a generic "mouth open" channel.
fn mouth_open_index(morphs: &MorphSet) -> Option<usize> {
    if let Some(idx) = rules::MOUTH_EXACT.iter().find_map(|n| morphs.index_of(n)) {
        return Some(idx);
    }

    rules::MOUTH_FUZZY
        .iter()
        .find_map(|needle| {
            morphs
                .entries()
                .find(|(name, _)| name.to_lowercase().contains(needle))
                .map(|(_, idx)| idx)
        })
        .or_else(|| morphs.entries().next().map(|(_, idx)| idx))
}

fn blink_index(morphs: &MorphSet, left: bool) -> Option<usize> {
    rules::blink_patterns(left).iter().find_map(|p| {
        morphs
            .entries()
            .find(|(name, _)| p.is_match(name))
            .map(|(_, idx)| idx)
    })
}
