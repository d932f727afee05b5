//! Raw instruction words.
//!
//! An instruction occupies one 32-bit word.  The only field whose
//! position is fixed for every instruction form is the primary
//! opcode, which lives in the least significant seven bits:
//!
//! |  ...form specific...  | Opcode |
//! |-----------------------|--------|
//! |       25 bits         | 7 bits |
//! |       (7-31)          | (0-6)  |
//!
//! Everything else (register numbers, immediates, minor opcodes) is
//! extracted by an instruction form which knows the layout for the
//! opcodes it is registered against.

use std::fmt::{self, Debug, Display, Formatter};

use serde::Serialize;

#[cfg(test)]
use test_strategy::proptest;

/// Width in bytes of an instruction word.  The control unit advances
/// the program counter by this amount.
pub const INSTRUCTION_WIDTH: u32 = 4;

const OPCODE_MASK: u32 = 0x7f;

/// The primary opcode field of an instruction word.
pub type Opcode = u32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstructionWord(u32);

impl InstructionWord {
    #[must_use]
    pub const fn new(bits: u32) -> InstructionWord {
        InstructionWord(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns the primary opcode (the low seven bits).
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.0 & OPCODE_MASK
    }

    /// Extracts `width` bits starting at bit `lsb`.
    ///
    /// ```
    /// use base::InstructionWord;
    /// let w = InstructionWord::new(0x0020_80b3);
    /// assert_eq!(w.field(7, 5), 1);
    /// assert_eq!(w.field(15, 5), 1);
    /// assert_eq!(w.field(20, 5), 2);
    /// ```
    #[must_use]
    pub const fn field(&self, lsb: u32, width: u32) -> u32 {
        if width >= 32 {
            self.0 >> lsb
        } else {
            (self.0 >> lsb) & ((1 << width) - 1)
        }
    }
}

impl From<u32> for InstructionWord {
    fn from(bits: u32) -> InstructionWord {
        InstructionWord(bits)
    }
}

impl Debug for InstructionWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "InstructionWord({:#010x})", self.0)
    }
}

impl Display for InstructionWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[test]
fn test_opcode_of_add() {
    // add x1, x1, x2
    let w = InstructionWord::new(0x0020_80b3);
    assert_eq!(w.opcode(), 0x33);
}

#[test]
fn test_display() {
    assert_eq!(InstructionWord::new(0x13).to_string(), "0x00000013");
}

#[cfg(test)]
#[proptest]
fn opcode_is_low_seven_bits(bits: u32) {
    let w = InstructionWord::new(bits);
    assert!(w.opcode() < 0x80);
    assert_eq!(w.opcode(), bits % 128);
    assert_eq!(w.field(0, 7), w.opcode());
    assert_eq!(w.field(0, 32), bits);
}
