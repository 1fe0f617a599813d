//! Resource flags and their names.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// A set of lockable resources, one bit per resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceMask(u32);

impl ResourceMask {
    pub const EMPTY: Self = Self(0);
    pub const PUBLISH: Self = Self(0x01);
    pub const IMPORT: Self = Self(0x02);
    pub const EXPORT: Self = Self(0x04);
    pub const REINDEX: Self = Self(0x08);
    pub const MAINTENANCE: Self = Self(0x10);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bits that do not correspond to any entry in [`RESOURCES`].
    pub fn unknown_bits(self) -> u32 {
        self.0 & !known_bits()
    }

    /// `true` when exactly one known resource bit is set.
    pub fn is_single_resource(self) -> bool {
        self.0.count_ones() == 1 && self.unknown_bits() == 0
    }

    /// Names of the resources in this mask, in table order.
    pub fn names(self) -> Vec<&'static str> {
        RESOURCES
            .iter()
            .filter(|r| self.contains(r.flag))
            .map(|r| r.name)
            .collect()
    }

    /// Resolve a resource by its name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        RESOURCES
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .map(|r| r.flag)
    }
}

impl BitOr for ResourceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResourceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ResourceMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ResourceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            write!(f, "{:#x}", self.0)
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// One lockable resource: its flag paired with its display name.
#[derive(Debug, Clone, Copy)]
pub struct Resource {
    pub flag: ResourceMask,
    pub name: &'static str,
}

/// Every resource the lock subsystem knows about.
pub const RESOURCES: &[Resource] = &[
    Resource { flag: ResourceMask::PUBLISH, name: "publish" },
    Resource { flag: ResourceMask::IMPORT, name: "import" },
    Resource { flag: ResourceMask::EXPORT, name: "export" },
    Resource { flag: ResourceMask::REINDEX, name: "reindex" },
    Resource { flag: ResourceMask::MAINTENANCE, name: "maintenance" },
];

fn known_bits() -> u32 {
    RESOURCES.iter().fold(0, |acc, r| acc | r.flag.bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_flags_are_distinct_single_bits() {
        let mut seen = 0u32;
        for r in RESOURCES {
            assert_eq!(r.flag.bits().count_ones(), 1, "{} is not a single bit", r.name);
            assert_eq!(seen & r.flag.bits(), 0, "{} overlaps another flag", r.name);
            seen |= r.flag.bits();
        }
    }

    #[test]
    fn names_follow_table_order() {
        let mask = ResourceMask::EXPORT | ResourceMask::PUBLISH;
        assert_eq!(mask.names(), vec!["publish", "export"]);
        assert_eq!(mask.to_string(), "publish|export");
    }

    #[test]
    fn unknown_bits_are_detected() {
        let mask = ResourceMask::from_bits(0x01 | 0x8000);
        assert_eq!(mask.unknown_bits(), 0x8000);
        assert!(!mask.is_single_resource());
        assert!(ResourceMask::REINDEX.is_single_resource());
        assert!(!(ResourceMask::IMPORT | ResourceMask::EXPORT).is_single_resource());
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(ResourceMask::from_name("Publish"), Some(ResourceMask::PUBLISH));
        assert_eq!(ResourceMask::from_name("nope"), None);
    }

    #[test]
    fn display_of_unnamed_mask_is_hex() {
        assert_eq!(ResourceMask::from_bits(0x100).to_string(), "0x100");
    }
}
