//! Filename naming flags.

use std::fmt;
use std::str::FromStr;

use super::error::ConfigError;

/// Bitset selecting which segments appear in a destination filename.
///
/// Parsed from names joined by `|` (`prefix|title|quality`) or from a
/// decimal / `0x` hex integer. Unknown names or bits are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamingFlags(u8);

const NAMES: [(&str, NamingFlags); 7] = [
    ("none", NamingFlags::NONE),
    ("prefix", NamingFlags::PREFIX),
    ("score", NamingFlags::SCORE),
    ("title", NamingFlags::TITLE),
    ("tags", NamingFlags::TAGS),
    ("quality", NamingFlags::QUALITY),
    ("full", NamingFlags::ALL),
];

impl NamingFlags {
    /// Id and extension only.
    pub const NONE: Self = Self(0x00);
    /// Filename prefix (`id_`).
    pub const PREFIX: Self = Self(0x01);
    /// `(score, rating%)` segment.
    pub const SCORE: Self = Self(0x02);
    /// Title segment.
    pub const TITLE: Self = Self(0x04);
    /// Tag list segment.
    pub const TAGS: Self = Self(0x08);
    /// Quality suffix.
    pub const QUALITY: Self = Self(0x10);
    /// Every segment.
    pub const ALL: Self = Self(0x1F);

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both sets.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the raw bits.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Builds flags from raw bits, rejecting unknown bits.
    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits & !Self::ALL.0 == 0).then_some(Self(bits))
    }
}

impl Default for NamingFlags {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromStr for NamingFlags {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || ConfigError::invalid_naming_flags(s);

        let numeric = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(u8::from_str_radix(hex, 16).map_err(|_| invalid())?)
        } else if raw.chars().all(|c| c.is_ascii_digit()) && !raw.is_empty() {
            Some(raw.parse::<u8>().map_err(|_| invalid())?)
        } else {
            None
        };
        if let Some(bits) = numeric {
            return Self::from_bits(bits).ok_or_else(invalid);
        }

        let mut flags = Self::NONE;
        for name in raw.split('|').map(str::trim) {
            let (_, flag) = NAMES
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .ok_or_else(invalid)?;
            flags = flags.union(*flag);
        }
        Ok(flags)
    }
}

impl fmt::Display for NamingFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NONE {
            return f.write_str("none");
        }
        if *self == Self::ALL {
            return f.write_str("full");
        }
        let names: Vec<&str> = NAMES[1..6]
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        f.write_str(&names.join("|"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        let flags: NamingFlags = "prefix|quality".parse().unwrap();
        assert!(flags.contains(NamingFlags::PREFIX));
        assert!(flags.contains(NamingFlags::QUALITY));
        assert!(!flags.contains(NamingFlags::TAGS));
        assert_eq!("FULL".parse::<NamingFlags>().unwrap(), NamingFlags::ALL);
        assert_eq!("none".parse::<NamingFlags>().unwrap(), NamingFlags::NONE);
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!("31".parse::<NamingFlags>().unwrap(), NamingFlags::ALL);
        assert_eq!("0x11".parse::<NamingFlags>().unwrap().bits(), 0x11);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("prefix|author".parse::<NamingFlags>().is_err());
        assert!("0x20".parse::<NamingFlags>().is_err());
        assert!("64".parse::<NamingFlags>().is_err());
        assert!("".parse::<NamingFlags>().is_err());
        assert!("0xzz".parse::<NamingFlags>().is_err());
    }

    #[test]
    fn test_display_round_trips_names() {
        let flags = NamingFlags::TITLE.union(NamingFlags::TAGS);
        assert_eq!(flags.to_string(), "title|tags");
        assert_eq!(NamingFlags::default().to_string(), "full");
    }
}
