use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use base::InstructionWord;
use cpu::{FileId, InstructionForm, OperandError, RegisterBank, RegisterSet};

use super::opcode;

/// The six RV32I encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    R,
    I,
    S,
    B,
    U,
    J,
}

fn sign_extend(value: u32, bits: u32) -> u32 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as u32
}

fn bit(word: InstructionWord, n: u32) -> u32 {
    word.field(n, 1)
}

/// Shift-immediate instructions (SLLI, SRLI, SRAI) keep a shift
/// amount in the immediate field and a sub-minor opcode above it.
fn is_shift_immediate(word: InstructionWord) -> bool {
    word.opcode() == opcode::OP_IMM && matches!(word.field(12, 3), 1 | 5)
}

pub struct Rv32Form {
    layout: Layout,
    bank: Arc<RegisterBank>,
    file: FileId,
}

impl Rv32Form {
    #[must_use]
    pub fn new(layout: Layout, bank: Arc<RegisterBank>, file: FileId) -> Rv32Form {
        Rv32Form { layout, bank, file }
    }

    fn reg(&self, word: InstructionWord, lsb: u32) -> Result<cpu::RegisterRef, OperandError> {
        self.bank.reference(self.file, word.field(lsb, 5) as usize)
    }
}

impl InstructionForm for Rv32Form {
    fn name(&self) -> &str {
        match self.layout {
            Layout::R => "rv32-r",
            Layout::I => "rv32-i",
            Layout::S => "rv32-s",
            Layout::B => "rv32-b",
            Layout::U => "rv32-u",
            Layout::J => "rv32-j",
        }
    }

    fn registers(&self, word: InstructionWord) -> Result<RegisterSet, OperandError> {
        let rd = || self.reg(word, 7);
        let rs1 = || self.reg(word, 15);
        let rs2 = || self.reg(word, 20);
        Ok(match self.layout {
            Layout::R => RegisterSet::new(Some(rd()?), vec![rs1()?, rs2()?]),
            Layout::I => RegisterSet::new(Some(rd()?), vec![rs1()?]),
            Layout::S | Layout::B => RegisterSet::new(None, vec![rs1()?, rs2()?]),
            Layout::U | Layout::J => RegisterSet::new(Some(rd()?), Vec::new()),
        })
    }

    fn immediate(&self, word: InstructionWord) -> u32 {
        match self.layout {
            Layout::R => 0,
            Layout::I if is_shift_immediate(word) => word.field(20, 5),
            Layout::I => sign_extend(word.field(20, 12), 12),
            Layout::S => sign_extend((word.field(25, 7) << 5) | word.field(7, 5), 12),
            Layout::B => sign_extend(
                (bit(word, 31) << 12)
                    | (bit(word, 7) << 11)
                    | (word.field(25, 6) << 5)
                    | (word.field(8, 4) << 1),
                13,
            ),
            Layout::U => word.bits() & 0xffff_f000,
            Layout::J => sign_extend(
                (bit(word, 31) << 20)
                    | (word.field(12, 8) << 12)
                    | (bit(word, 20) << 11)
                    | (word.field(21, 10) << 1),
                21,
            ),
        }
    }

    fn minor(&self, word: InstructionWord) -> u32 {
        match self.layout {
            Layout::R | Layout::I | Layout::S | Layout::B => word.field(12, 3),
            Layout::U | Layout::J => 0,
        }
    }

    fn sub_minor(&self, word: InstructionWord) -> u32 {
        match self.layout {
            Layout::R => word.field(25, 7),
            Layout::I if is_shift_immediate(word) => word.field(25, 7),
            _ => 0,
        }
    }
}

impl Debug for Rv32Form {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rv32Form")
            .field("layout", &self.layout)
            .field("file", &self.file)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use cpu::{RegisterFile, RegisterRef};
    use test_strategy::proptest;

    use super::super::encode;
    use super::*;

    fn form(layout: Layout) -> Rv32Form {
        let bank = Arc::new(RegisterBank::new(vec![RegisterFile::new("x", 32, Some(0))]));
        Rv32Form::new(layout, bank, 0)
    }

    fn x(id: usize) -> RegisterRef {
        RegisterRef::new(0, id)
    }

    #[test]
    fn test_register_sets() {
        let set = form(Layout::R)
            .registers(encode::r(opcode::OP, 3, 0, 1, 2, 0))
            .expect("decodes");
        assert_eq!(set.destination(), Ok(x(3)));
        assert_eq!(set.source(1), Ok(x(1)));
        assert_eq!(set.source(2), Ok(x(2)));

        let set = form(Layout::S)
            .registers(encode::s(opcode::STORE, 2, 5, 6, 0))
            .expect("decodes");
        assert!(!set.has_destination());
        assert_eq!(set.source_count(), 2);

        let set = form(Layout::J)
            .registers(encode::j(opcode::JAL, 1, 8))
            .expect("decodes");
        assert_eq!(set.destination(), Ok(x(1)));
        assert_eq!(set.source_count(), 0);
    }

    #[test]
    fn test_register_beyond_small_file() {
        let bank = Arc::new(RegisterBank::new(vec![RegisterFile::new("e", 16, Some(0))]));
        let form = Rv32Form::new(Layout::R, bank, 0);
        assert_eq!(
            form.registers(encode::r(opcode::OP, 17, 0, 1, 2, 0))
                .map(|_| ()),
            Err(OperandError::NoSuchRegister(RegisterRef::new(0, 17)))
        );
    }

    #[test]
    fn test_shift_immediates() {
        let f = form(Layout::I);
        // srai x1, x2, 3
        let w = encode::i(opcode::OP_IMM, 1, 5, 2, 0x403);
        assert_eq!(f.immediate(w), 3);
        assert_eq!(f.minor(w), 5);
        assert_eq!(f.sub_minor(w), 0x20);
        // andi x1, x2, -1 is not a shift; the whole field is the immediate.
        let w = encode::i(opcode::OP_IMM, 1, 7, 2, -1);
        assert_eq!(f.immediate(w), u32::MAX);
        assert_eq!(f.sub_minor(w), 0);
    }

    #[test]
    fn test_upper_immediate() {
        let w = encode::u(opcode::LUI, 1, 0xfffff);
        assert_eq!(form(Layout::U).immediate(w), 0xffff_f000);
    }

    #[proptest]
    fn i_immediate_round_trips(#[strategy(-2048..2048_i32)] imm: i32) {
        let w = encode::i(opcode::LOAD, 1, 2, 3, imm);
        assert_eq!(form(Layout::I).immediate(w) as i32, imm);
    }

    #[proptest]
    fn s_immediate_round_trips(#[strategy(-2048..2048_i32)] imm: i32) {
        let w = encode::s(opcode::STORE, 2, 3, 4, imm);
        assert_eq!(form(Layout::S).immediate(w) as i32, imm);
    }

    #[proptest]
    fn b_immediate_round_trips(#[strategy(-2048..2048_i32)] half: i32) {
        let imm = half * 2;
        let w = encode::b(opcode::BRANCH, 0, 1, 2, imm);
        assert_eq!(form(Layout::B).immediate(w) as i32, imm);
    }

    #[proptest]
    fn j_immediate_round_trips(#[strategy(-(1_i32 << 19)..(1_i32 << 19))] half: i32) {
        let imm = half * 2;
        let w = encode::j(opcode::JAL, 1, imm);
        assert_eq!(form(Layout::J).immediate(w) as i32, imm);
    }
}
