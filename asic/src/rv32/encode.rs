//! Encoders for the six RV32I instruction layouts.  These are used to
//! assemble small programs in tests and machine images.
//!
//! Immediates are given as signed values; only the bits the layout
//! can hold are kept.
use base::{InstructionWord, Opcode};

#[must_use]
pub fn r(opcode: Opcode, rd: u32, funct3: u32, rs1: u32, rs2: u32, funct7: u32) -> InstructionWord {
    InstructionWord::new(
        (opcode & 0x7f)
            | ((rd & 0x1f) << 7)
            | ((funct3 & 0x7) << 12)
            | ((rs1 & 0x1f) << 15)
            | ((rs2 & 0x1f) << 20)
            | ((funct7 & 0x7f) << 25),
    )
}

#[must_use]
pub fn i(opcode: Opcode, rd: u32, funct3: u32, rs1: u32, imm: i32) -> InstructionWord {
    let imm = imm as u32;
    InstructionWord::new(
        (opcode & 0x7f)
            | ((rd & 0x1f) << 7)
            | ((funct3 & 0x7) << 12)
            | ((rs1 & 0x1f) << 15)
            | ((imm & 0xfff) << 20),
    )
}

#[must_use]
pub fn s(opcode: Opcode, funct3: u32, rs1: u32, rs2: u32, imm: i32) -> InstructionWord {
    let imm = imm as u32;
    InstructionWord::new(
        (opcode & 0x7f)
            | ((imm & 0x1f) << 7)
            | ((funct3 & 0x7) << 12)
            | ((rs1 & 0x1f) << 15)
            | ((rs2 & 0x1f) << 20)
            | (((imm >> 5) & 0x7f) << 25),
    )
}

/// `imm` is a byte offset; bit 0 is not encoded.
#[must_use]
pub fn b(opcode: Opcode, funct3: u32, rs1: u32, rs2: u32, imm: i32) -> InstructionWord {
    let imm = imm as u32;
    InstructionWord::new(
        (opcode & 0x7f)
            | (((imm >> 11) & 1) << 7)
            | (((imm >> 1) & 0xf) << 8)
            | ((funct3 & 0x7) << 12)
            | ((rs1 & 0x1f) << 15)
            | ((rs2 & 0x1f) << 20)
            | (((imm >> 5) & 0x3f) << 25)
            | (((imm >> 12) & 1) << 31),
    )
}

/// `upper` holds the value of bits 12 to 31.
#[must_use]
pub fn u(opcode: Opcode, rd: u32, upper: u32) -> InstructionWord {
    InstructionWord::new((opcode & 0x7f) | ((rd & 0x1f) << 7) | (upper << 12))
}

/// `imm` is a byte offset; bit 0 is not encoded.
#[must_use]
pub fn j(opcode: Opcode, rd: u32, imm: i32) -> InstructionWord {
    let imm = imm as u32;
    InstructionWord::new(
        (opcode & 0x7f)
            | ((rd & 0x1f) << 7)
            | (((imm >> 12) & 0xff) << 12)
            | (((imm >> 11) & 1) << 20)
            | (((imm >> 1) & 0x3ff) << 21)
            | (((imm >> 20) & 1) << 31),
    )
}

/// Little-endian bytes of a program, as a RAM image.
#[must_use]
pub fn image(program: &[InstructionWord]) -> Vec<u8> {
    program
        .iter()
        .flat_map(|w| w.bits().to_le_bytes())
        .collect()
}

#[test]
fn test_known_encodings() {
    use super::opcode;
    // addi x1, x0, 5
    assert_eq!(i(opcode::OP_IMM, 1, 0, 0, 5).bits(), 0x0050_0093);
    // add x3, x1, x2
    assert_eq!(r(opcode::OP, 3, 0, 1, 2, 0).bits(), 0x0020_81b3);
    // sw x2, 8(x1)
    assert_eq!(s(opcode::STORE, 2, 1, 2, 8).bits(), 0x0020_a423);
    // beq x1, x2, -8
    assert_eq!(b(opcode::BRANCH, 0, 1, 2, -8).bits(), 0xfe20_8ce3);
    // lui x5, 0x12345
    assert_eq!(u(opcode::LUI, 5, 0x12345).bits(), 0x1234_52b7);
    // jal x1, 16
    assert_eq!(j(opcode::JAL, 1, 16).bits(), 0x0100_00ef);
    assert_eq!(image(&[InstructionWord::new(0x0403_0201)]), vec![1, 2, 3, 4]);
}
