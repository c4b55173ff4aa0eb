//! Target parts reported by the bootloader's platform query.

use std::fmt;

/// Microcontroller family member running the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TargetPart {
    /// MAX32660.
    Max32660,
    /// MAX32670.
    Max32670,
    /// MAX78000.
    Max78000,
    /// MAX32655.
    Max32655,
    /// MAX32672.
    Max32672,
    /// Platform id without a known part name.
    Unknown(u8),
}

impl TargetPart {
    /// Map a platform id to a part.
    pub fn from_platform_id(id: u8) -> Self {
        match id {
            1 => Self::Max32660,
            3 => Self::Max32670,
            5 => Self::Max78000,
            6 => Self::Max32655,
            9 => Self::Max32672,
            other => Self::Unknown(other),
        }
    }

    /// Platform id as reported by the target.
    pub fn platform_id(self) -> u8 {
        match self {
            Self::Max32660 => 1,
            Self::Max32670 => 3,
            Self::Max78000 => 5,
            Self::Max32655 => 6,
            Self::Max32672 => 9,
            Self::Unknown(id) => id,
        }
    }

    /// Part name, or the decimal platform id for unknown parts.
    pub fn name(self) -> String {
        match self {
            Self::Max32660 => "MAX32660".to_string(),
            Self::Max32670 => "MAX32670".to_string(),
            Self::Max78000 => "MAX78000".to_string(),
            Self::Max32655 => "MAX32655".to_string(),
            Self::Max32672 => "MAX32672".to_string(),
            Self::Unknown(id) => id.to_string(),
        }
    }

    /// Whether the id maps to a named part.
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for TargetPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_parts() {
        assert_eq!(TargetPart::from_platform_id(1).name(), "MAX32660");
        assert_eq!(TargetPart::from_platform_id(3).name(), "MAX32670");
        assert_eq!(TargetPart::from_platform_id(5).name(), "MAX78000");
        assert_eq!(TargetPart::from_platform_id(6).name(), "MAX32655");
        assert_eq!(TargetPart::from_platform_id(9).name(), "MAX32672");
    }

    #[test]
    fn test_unknown_part_is_decimal() {
        let part = TargetPart::from_platform_id(0x7F);
        assert_eq!(part.to_string(), "127");
        assert!(!part.is_known());
        assert_eq!(part.platform_id(), 0x7F);
    }
}
