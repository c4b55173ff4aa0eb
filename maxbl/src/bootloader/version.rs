//! Bootloader version numbers.

use {
    crate::error::{Error, Result},
    std::{fmt, str::FromStr},
};

/// Bootloader firmware version, rendered as `vMAJOR.MINOR.PATCH`.
///
/// Versions compare numerically, so `v3.10.0` is newer than `v3.4.2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BootloaderVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch version.
    pub patch: u8,
}

impl BootloaderVersion {
    /// First version with the 64-bit configuration layout.
    pub const CONFIG_64BIT: Self = Self::new(3, 4, 2);

    /// Create a version.
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether this bootloader uses the legacy 32-bit configuration word and
    /// the indexed I2C address table (version <= v3.4.1).
    pub fn is_legacy(self) -> bool {
        self < Self::CONFIG_64BIT
    }
}

impl fmt::Display for BootloaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for BootloaderVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("invalid bootloader version '{s}'"));
        let digits = s
            .trim()
            .strip_prefix(['v', 'V'])
            .unwrap_or(s.trim());
        let mut parts = digits.split('.');
        let mut next = || -> Result<u8> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts
            .next()
            .is_some()
        {
            return Err(invalid());
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let v: BootloaderVersion = "v3.4.2".parse().unwrap();
        assert_eq!(v, BootloaderVersion::new(3, 4, 2));
        assert_eq!(v.to_string(), "v3.4.2");
        assert_eq!("1.0.7".parse::<BootloaderVersion>().unwrap().to_string(), "v1.0.7");
        assert!("v3.4".parse::<BootloaderVersion>().is_err());
        assert!("v3.4.2.1".parse::<BootloaderVersion>().is_err());
        assert!("Error".parse::<BootloaderVersion>().is_err());
    }

    #[test]
    fn test_legacy_boundary() {
        assert!(BootloaderVersion::new(3, 4, 1).is_legacy());
        assert!(BootloaderVersion::new(2, 9, 9).is_legacy());
        assert!(!BootloaderVersion::new(3, 4, 2).is_legacy());
        assert!(!BootloaderVersion::new(3, 10, 0).is_legacy());
        let v: BootloaderVersion = "v3.4.10".parse().unwrap();
        assert!(!v.is_legacy());
    }
}
