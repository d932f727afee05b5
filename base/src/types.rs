//! Addresses and address ranges on the bus.
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

#[cfg(test)]
use test_strategy::{proptest, Arbitrary};

/// A byte address on the bus.  Addresses are rebased as packets
/// pass through switches, so the same packet carries different
/// addresses on different hops.
pub type Address = u32;

/// Address ranges attached to a switch must be aligned to this many
/// bytes, in both base and size.
pub const WORD_SIZE: u32 = 4;

/// A half-open range of bus addresses `[base, base + size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressRange {
    pub base: Address,
    pub size: u32,
}

impl AddressRange {
    #[must_use]
    pub const fn new(base: Address, size: u32) -> AddressRange {
        AddressRange { base, size }
    }

    /// One past the last address of the range.  This is computed in
    /// 64 bits since a range may end exactly at the top of the
    /// address space.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.base) + u64::from(self.size)
    }

    #[must_use]
    pub fn is_word_aligned(&self) -> bool {
        self.base % WORD_SIZE == 0 && self.size % WORD_SIZE == 0
    }

    #[must_use]
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        if self.size == 0 || other.size == 0 {
            return false;
        }
        u64::from(self.base) < other.end() && u64::from(other.base) < self.end()
    }

    /// Returns true when an access of `width` bytes at `address`
    /// falls entirely within the range.
    ///
    /// ```
    /// use base::AddressRange;
    /// let r = AddressRange::new(0x100, 0x10);
    /// assert!(r.contains(0x10c, 4));
    /// assert!(!r.contains(0x10d, 4));
    /// assert!(!r.contains(0x110, 1));
    /// ```
    #[must_use]
    pub fn contains(&self, address: Address, width: u32) -> bool {
        address >= self.base && u64::from(address) + u64::from(width) <= self.end()
    }

    /// The offset of `address` from the base of this range, if the
    /// address lies at or after the base.
    #[must_use]
    pub fn offset_of(&self, address: Address) -> Option<u32> {
        address.checked_sub(self.base)
    }
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#010x}, {:#010x})", self.base, self.end())
    }
}

#[test]
fn test_alignment() {
    assert!(AddressRange::new(0, 4).is_word_aligned());
    assert!(AddressRange::new(0x1000, 0x100).is_word_aligned());
    assert!(!AddressRange::new(2, 4).is_word_aligned());
    assert!(!AddressRange::new(0, 6).is_word_aligned());
}

#[test]
fn test_overlap_edges() {
    let a = AddressRange::new(0x100, 0x100);
    assert!(!a.overlaps(&AddressRange::new(0x200, 0x100)));
    assert!(!a.overlaps(&AddressRange::new(0, 0x100)));
    assert!(a.overlaps(&AddressRange::new(0x1fc, 4)));
    assert!(a.overlaps(&AddressRange::new(0, 0x104)));
    assert!(a.overlaps(&AddressRange::new(0x140, 4)));
}

#[test]
fn test_range_reaching_top_of_memory() {
    let r = AddressRange::new(0xffff_ff00, 0x100);
    assert_eq!(r.end(), 1 << 32);
    assert!(r.contains(0xffff_fffc, 4));
    assert!(!r.contains(0xffff_fffd, 4));
}

#[cfg(test)]
#[derive(Debug, Arbitrary)]
struct RangePair {
    #[strategy(0..0x1000u32)]
    a_base: u32,
    #[strategy(1..0x100u32)]
    a_size: u32,
    #[strategy(0..0x1000u32)]
    b_base: u32,
    #[strategy(1..0x100u32)]
    b_size: u32,
}

#[cfg(test)]
#[proptest]
fn overlap_is_symmetric(input: RangePair) {
    let a = AddressRange::new(input.a_base, input.a_size);
    let b = AddressRange::new(input.b_base, input.b_size);
    assert_eq!(a.overlaps(&b), b.overlaps(&a));
    let shares_a_byte = (input.a_base..input.a_base + input.a_size)
        .any(|addr| b.contains(addr, 1));
    assert_eq!(a.overlaps(&b), shares_a_byte);
}
