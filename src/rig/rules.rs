/*!
Name matching rules used when introspecting a rig.

Rigs come from all sorts of exporters, so nothing here assumes a naming
convention. Everything is expressed as ordered tables so the matching policy
can be tested without building a scene.
*/

use once_cell::sync::Lazy;
use regex::Regex;

use crate::speech::Viseme;

/// Named bone slots the animator knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoneSlot {
    Head,
    Neck,
    Chest,
    Spine,
    Jaw,
    LeftEye,
    RightEye,
    LeftUpperArm,
    RightUpperArm,
    LeftLowerArm,
    RightLowerArm,
    LeftHand,
    RightHand,
}

impl BoneSlot {
    pub const COUNT: usize = 13;

    pub const ALL: [BoneSlot; Self::COUNT] = [
        Self::Head,
        Self::Neck,
        Self::Chest,
        Self::Spine,
        Self::Jaw,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftUpperArm,
        Self::RightUpperArm,
        Self::LeftLowerArm,
        Self::RightLowerArm,
        Self::LeftHand,
        Self::RightHand,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl AsRef<str> for BoneSlot {
    fn as_ref(&self) -> &str {
        match self {
            Self::Head => "head",
            Self::Neck => "neck",
            Self::Chest => "chest",
            Self::Spine => "spine",
            Self::Jaw => "jaw",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftUpperArm => "left_upper_arm",
            Self::RightUpperArm => "right_upper_arm",
            Self::LeftLowerArm => "left_lower_arm",
            Self::RightLowerArm => "right_lower_arm",
            Self::LeftHand => "left_hand",
            Self::RightHand => "right_hand",
        }
    }
}

/// A single `(predicate, slot)` entry.
pub struct BoneRule {
    pub slot: BoneSlot,
    /// Trunk rules form a chain: once a bone fills one trunk slot, the remaining
    /// trunk rules are skipped for that bone.
    pub trunk: bool,
    /// Receives the lower-cased bone name.
    pub matches: fn(&str) -> bool,
}

/// Evaluated in order for every bone.
pub const BONE_RULES: &[BoneRule] = &[
    BoneRule {
        slot: BoneSlot::Head,
        trunk: true,
        matches: |n| n.contains("head"),
    },
    BoneRule {
        slot: BoneSlot::Neck,
        trunk: true,
        matches: |n| n.contains("neck"),
    },
    BoneRule {
        slot: BoneSlot::Chest,
        trunk: true,
        matches: |n| n.contains("chest") || n.contains("upperchest"),
    },
    BoneRule {
        slot: BoneSlot::Spine,
        trunk: true,
        matches: |n| n.contains("spine"),
    },
    BoneRule {
        slot: BoneSlot::Jaw,
        trunk: false,
        matches: |n| {
            n.contains("jaw")
                || n.contains("chin")
                || n.contains("mandible")
                || n == "j_jaw"
                || n == "jaw_bone"
        },
    },
    BoneRule {
        slot: BoneSlot::LeftEye,
        trunk: false,
        matches: |n| {
            n.contains("eye_l") || n.contains("leye") || (n.contains("eye") && n.contains("left"))
        },
    },
    BoneRule {
        slot: BoneSlot::RightEye,
        trunk: false,
        matches: |n| {
            n.contains("eye_r")
                || n.contains("reye")
                || (n.contains("eye") && n.contains("right"))
        },
    },
    BoneRule {
        slot: BoneSlot::LeftUpperArm,
        trunk: false,
        matches: |n| n.contains("upperarm_l") || n.contains("leftarm") || n.contains("arm_l"),
    },
    BoneRule {
        slot: BoneSlot::RightUpperArm,
        trunk: false,
        matches: |n| n.contains("upperarm_r") || n.contains("rightarm") || n.contains("arm_r"),
    },
    BoneRule {
        slot: BoneSlot::LeftLowerArm,
        trunk: false,
        matches: |n| n.contains("lowerarm_l") || n.contains("forearm_l"),
    },
    BoneRule {
        slot: BoneSlot::RightLowerArm,
        trunk: false,
        matches: |n| n.contains("lowerarm_r") || n.contains("forearm_r"),
    },
    BoneRule {
        slot: BoneSlot::LeftHand,
        trunk: false,
        matches: |n| n.contains("hand_l") || (n.contains("hand") && n.contains("left")),
    },
    BoneRule {
        slot: BoneSlot::RightHand,
        trunk: false,
        matches: |n| n.contains("hand_r") || (n.contains("hand") && n.contains("right")),
    },
];

/// Slots a bone with `name` should fill, given which slots are already taken.
pub fn match_bone(name: &str, is_filled: impl Fn(BoneSlot) -> bool) -> Vec<BoneSlot> {
    let name = name.to_lowercase();
    let mut trunk_taken = false;
    let mut r = vec![];

    for rule in BONE_RULES {
        if rule.trunk && trunk_taken {
            continue;
        }
        if is_filled(rule.slot) || !(rule.matches)(&name) {
            continue;
        }

        r.push(rule.slot);
        if rule.trunk {
            trunk_taken = true;
        }
    }

    r
}

/// Exact names checked before any fuzzy search for a generic mouth-open channel.
pub const MOUTH_EXACT: &[&str] = &["jawOpen", "JawOpen", "mouthOpen", "MouthOpen"];

/// Case-insensitive substrings, each searched across all keys in key order.
pub const MOUTH_FUZZY: &[&str] = &["jaw", "mouth", "viseme_aa", "viseme_oh"];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("built-in pattern must compile"))
        .collect()
}

static VISEME_PATTERNS: Lazy<[Vec<Regex>; 6]> = Lazy::new(|| {
    [
        compile(&["viseme_aa", "A_", "^A$", "phoneme[_-]?a"]),
        compile(&["viseme_e", "^E$", "phoneme[_-]?e"]),
        compile(&["viseme_ih", "viseme_ee", "^I$", "phoneme[_-]?i"]),
        compile(&["viseme_oh", "^O$", "phoneme[_-]?o"]),
        compile(&["viseme_ou", "^U$", "phoneme[_-]?u", "w[_-]?round"]),
        compile(&[
            "viseme_mbp",
            "viseme_PP",
            "viseme_b",
            "^M$|^B$|^P$",
            "closed[_-]?mouth",
        ]),
    ]
});

static BLINK_LEFT: Lazy<Vec<Regex>> =
    Lazy::new(|| compile(&["eye.?blink.*(left|l)", "blink.*(left|l)", "eyeBlinkLeft"]));

static BLINK_RIGHT: Lazy<Vec<Regex>> =
    Lazy::new(|| compile(&["eye.?blink.*(right|r)", "blink.*(right|r)", "eyeBlinkRight"]));

/// Whether a morph target name is a candidate for `viseme`.
pub fn is_viseme_candidate(viseme: Viseme, name: &str) -> bool {
    VISEME_PATTERNS[viseme.index()]
        .iter()
        .any(|p| p.is_match(name))
}

/// Blink patterns for one side, in priority order.
pub fn blink_patterns(left: bool) -> &'static [Regex] {
    if left {
        BLINK_LEFT.as_slice()
    } else {
        BLINK_RIGHT.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(name: &str) -> Vec<BoneSlot> {
        match_bone(name, |_| false)
    }

    mod bones {
        use super::*;

        #[test]
        fn mixamo_names() {
            assert_eq!(slots("mixamorig:Head"), vec![BoneSlot::Head]);
            assert_eq!(slots("mixamorig:Neck"), vec![BoneSlot::Neck]);
            assert_eq!(slots("mixamorig:Spine2"), vec![BoneSlot::Spine]);
            assert_eq!(slots("mixamorig:LeftArm"), vec![BoneSlot::LeftUpperArm]);
            assert_eq!(slots("mixamorig:RightArm"), vec![BoneSlot::RightUpperArm]);
            assert_eq!(slots("mixamorig:LeftHand"), vec![BoneSlot::LeftHand]);
            assert_eq!(slots("mixamorig:LeftEye"), vec![BoneSlot::LeftEye]);
        }

        #[test]
        fn upper_arm_conventions() {
            for name in ["upperarm_l", "LeftArm", "arm_L"] {
                assert_eq!(slots(name), vec![BoneSlot::LeftUpperArm], "{name}");
            }
            for name in ["UpperArm_R", "rightarm", "ARM_R"] {
                assert_eq!(slots(name), vec![BoneSlot::RightUpperArm], "{name}");
            }
        }

        #[test]
        fn jaw_conventions() {
            for name in ["Jaw", "chin_01", "Mandible", "J_Jaw", "jaw_bone"] {
                assert_eq!(slots(name), vec![BoneSlot::Jaw], "{name}");
            }
        }

        #[test]
        fn trunk_chain_fills_one_slot() {
            // Would match both head and neck, head comes first in the chain
            assert_eq!(slots("neck_head"), vec![BoneSlot::Head]);
            // Head already filled, the same bone falls through to neck
            assert_eq!(
                match_bone("neck_head", |s| s == BoneSlot::Head),
                vec![BoneSlot::Neck]
            );
        }

        #[test]
        fn independent_rules_can_stack() {
            // A head-jaw bone fills both the trunk head slot and the jaw slot
            assert_eq!(slots("head_jaw"), vec![BoneSlot::Head, BoneSlot::Jaw]);
        }

        #[test]
        fn filled_slots_are_skipped() {
            assert!(match_bone("mixamorig:Head", |s| s == BoneSlot::Head).is_empty());
        }

        #[test]
        fn forearm_falls_into_upper_arm_when_empty() {
            assert_eq!(
                slots("forearm_l"),
                vec![BoneSlot::LeftUpperArm, BoneSlot::LeftLowerArm]
            );
        }

        #[test]
        fn unrelated_names() {
            assert!(slots("hips").is_empty());
            assert!(slots("root").is_empty());
        }
    }

    mod morphs {
        use super::*;

        #[test]
        fn viseme_candidates() {
            assert!(is_viseme_candidate(Viseme::A, "viseme_aa"));
            assert!(is_viseme_candidate(Viseme::A, "a"));
            assert!(is_viseme_candidate(Viseme::A, "Phoneme-A"));
            assert!(is_viseme_candidate(Viseme::E, "VISEME_E"));
            assert!(is_viseme_candidate(Viseme::I, "viseme_ee"));
            assert!(is_viseme_candidate(Viseme::U, "W_Round"));
            assert!(is_viseme_candidate(Viseme::Mbp, "viseme_PP"));
            assert!(is_viseme_candidate(Viseme::Mbp, "b"));
            assert!(is_viseme_candidate(Viseme::Mbp, "closedMouth"));

            assert!(!is_viseme_candidate(Viseme::A, "jawOpen"));
            assert!(!is_viseme_candidate(Viseme::O, "mouthSmile"));
        }

        #[test]
        fn blink_candidates() {
            assert!(blink_patterns(true)
                .iter()
                .any(|p| p.is_match("eyeBlinkLeft")));
            assert!(blink_patterns(true).iter().any(|p| p.is_match("Blink_L")));
            assert!(blink_patterns(false)
                .iter()
                .any(|p| p.is_match("eyeBlinkRight")));
            assert!(!blink_patterns(false)
                .iter()
                .any(|p| p.is_match("eyeBlinkLeft")));
        }
    }
}
