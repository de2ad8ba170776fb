/*!
Speech-driven mouth state.

Speech audio is produced and played somewhere else entirely. This module only
knows about the text being spoken and the lifecycle pulses coming from whatever
plays it, and turns those into a coarse mouth shape per frame.
*/

pub mod coordinator;
pub mod pulse;
pub mod timeline;

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

pub use coordinator::{Clock, LipSyncState, SpeechCoordinator, SpeechHooks, SystemClock};
pub use pulse::BoundaryPulse;
pub use timeline::{VisemeSegment, VisemeTimeline};

/// Coarse mouth shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Viseme {
    A,
    E,
    I,
    O,
    U,
    #[serde(rename = "MBP")]
    Mbp,
}

impl Viseme {
    pub const ALL: [Viseme; 6] = [
        Viseme::A,
        Viseme::E,
        Viseme::I,
        Viseme::O,
        Viseme::U,
        Viseme::Mbp,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Character class table. Anything not listed is treated as a gap.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' | 'a' => Some(Self::A),
            'E' | 'e' => Some(Self::E),
            'I' | 'i' | 'Y' | 'y' => Some(Self::I),
            'O' | 'o' => Some(Self::O),
            'U' | 'u' | 'W' | 'w' => Some(Self::U),
            'B' | 'b' | 'P' | 'p' | 'M' | 'm' => Some(Self::Mbp),
            _ => None,
        }
    }
}

impl AsRef<str> for Viseme {
    fn as_ref(&self) -> &str {
        match self {
            Self::A => "A",
            Self::E => "E",
            Self::I => "I",
            Self::O => "O",
            Self::U => "U",
            Self::Mbp => "MBP",
        }
    }
}

impl Display for Viseme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownViseme(pub String);

impl Display for UnknownViseme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown viseme: {}", self.0)
    }
}

impl std::error::Error for UnknownViseme {}

impl FromStr for Viseme {
    type Err = UnknownViseme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "E" => Ok(Self::E),
            "I" => Ok(Self::I),
            "O" => Ok(Self::O),
            "U" => Ok(Self::U),
            "MBP" => Ok(Self::Mbp),
            _ => Err(UnknownViseme(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_table() {
        assert_eq!(Viseme::from_char('a'), Some(Viseme::A));
        assert_eq!(Viseme::from_char('Y'), Some(Viseme::I));
        assert_eq!(Viseme::from_char('w'), Some(Viseme::U));
        assert_eq!(Viseme::from_char('P'), Some(Viseme::Mbp));
        assert_eq!(Viseme::from_char('t'), None);
        assert_eq!(Viseme::from_char(' '), None);
        assert_eq!(Viseme::from_char('é'), None);
    }

    #[test]
    fn parse_symbols() {
        assert_eq!("mbp".parse::<Viseme>(), Ok(Viseme::Mbp));
        assert_eq!("o".parse::<Viseme>(), Ok(Viseme::O));
        assert!("th".parse::<Viseme>().is_err());
    }

    #[test]
    fn index_matches_all_order() {
        for (idx, v) in Viseme::ALL.iter().enumerate() {
            assert_eq!(v.index(), idx);
        }
    }
}
