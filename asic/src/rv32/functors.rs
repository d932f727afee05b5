use std::sync::Arc;

use tracing::{event, Level};

use cpu::{DataPort, ExecutionError, GenericInstruction, InstructionFunctor, ProgramCounter};

fn unsupported(functor: &dyn InstructionFunctor, i: &GenericInstruction) -> ExecutionError {
    ExecutionError::Unsupported {
        functor: functor.name().to_string(),
        minor: i.minor(),
        sub_minor: i.sub_minor(),
    }
}

/// Register-register arithmetic (opcode 0x33).
#[derive(Debug)]
pub struct Op;

impl InstructionFunctor for Op {
    fn name(&self) -> &str {
        "rv32-op"
    }

    fn execute(&self, i: &GenericInstruction) -> Result<(), ExecutionError> {
        let a = i.read_source(1)?;
        let b = i.read_source(2)?;
        let result = match (i.minor(), i.sub_minor()) {
            (0, 0x00) => a.wrapping_add(b),
            (0, 0x20) => a.wrapping_sub(b),
            (1, 0x00) => a << (b & 0x1f),
            (2, 0x00) => u32::from((a as i32) < (b as i32)),
            (3, 0x00) => u32::from(a < b),
            (4, 0x00) => a ^ b,
            (5, 0x00) => a >> (b & 0x1f),
            (5, 0x20) => ((a as i32) >> (b & 0x1f)) as u32,
            (6, 0x00) => a | b,
            (7, 0x00) => a & b,
            _ => return Err(unsupported(self, i)),
        };
        i.write_destination(result)?;
        Ok(())
    }
}

/// Register-immediate arithmetic (opcode 0x13).
#[derive(Debug)]
pub struct OpImm;

impl InstructionFunctor for OpImm {
    fn name(&self) -> &str {
        "rv32-op-imm"
    }

    fn execute(&self, i: &GenericInstruction) -> Result<(), ExecutionError> {
        let a = i.read_source(1)?;
        let imm = i.immediate();
        let result = match (i.minor(), i.sub_minor()) {
            (0, _) => a.wrapping_add(imm),
            (2, _) => u32::from((a as i32) < (imm as i32)),
            (3, _) => u32::from(a < imm),
            (4, _) => a ^ imm,
            (6, _) => a | imm,
            (7, _) => a & imm,
            (1, 0x00) => a << (imm & 0x1f),
            (5, 0x00) => a >> (imm & 0x1f),
            (5, 0x20) => ((a as i32) >> (imm & 0x1f)) as u32,
            _ => return Err(unsupported(self, i)),
        };
        i.write_destination(result)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Lui;

impl InstructionFunctor for Lui {
    fn name(&self) -> &str {
        "rv32-lui"
    }

    fn execute(&self, i: &GenericInstruction) -> Result<(), ExecutionError> {
        i.write_destination(i.immediate())
    }
}

#[derive(Debug)]
pub struct Auipc {
    pc: ProgramCounter,
}

impl Auipc {
    #[must_use]
    pub fn new(pc: ProgramCounter) -> Auipc {
        Auipc { pc }
    }
}

impl InstructionFunctor for Auipc {
    fn name(&self) -> &str {
        "rv32-auipc"
    }

    fn execute(&self, i: &GenericInstruction) -> Result<(), ExecutionError> {
        i.write_destination(self.pc.get().wrapping_add(i.immediate()))
    }
}

/// Jump and link: the destination gets the address of the next
/// instruction.
#[derive(Debug)]
pub struct Jal {
    pc: ProgramCounter,
}

impl Jal {
    #[must_use]
    pub fn new(pc: ProgramCounter) -> Jal {
        Jal { pc }
    }
}

impl InstructionFunctor for Jal {
    fn name(&self) -> &str {
        "rv32-jal"
    }

    fn execute(&self, i: &GenericInstruction) -> Result<(), ExecutionError> {
        let here = self.pc.get();
        i.write_destination(here.wrapping_add(4))?;
        self.pc.set(here.wrapping_add(i.immediate()));
        Ok(())
    }
}

/// Indirect jump and link.  Jumping to address zero halts the CPU.
#[derive(Debug)]
pub struct Jalr {
    pc: ProgramCounter,
}

impl Jalr {
    #[must_use]
    pub fn new(pc: ProgramCounter) -> Jalr {
        Jalr { pc }
    }
}

impl InstructionFunctor for Jalr {
    fn name(&self) -> &str {
        "rv32-jalr"
    }

    fn execute(&self, i: &GenericInstruction) -> Result<(), ExecutionError> {
        if i.minor() != 0 {
            return Err(unsupported(self, i));
        }
        // The base must be read before the link is written, since rd
        // and rs1 may be the same register.
        let target = i.read_source(1)?.wrapping_add(i.immediate()) & !1;
        let here = self.pc.get();
        i.write_destination(here.wrapping_add(4))?;
        self.pc.set(target);
        Ok(())
    }
}

/// Conditional branches.  The not-taken case also writes the counter
/// (to the following instruction), so the control unit never needs
/// to advance past a branch itself.
#[derive(Debug)]
pub struct Branch {
    pc: ProgramCounter,
}

impl Branch {
    #[must_use]
    pub fn new(pc: ProgramCounter) -> Branch {
        Branch { pc }
    }
}

impl InstructionFunctor for Branch {
    fn name(&self) -> &str {
        "rv32-branch"
    }

    fn execute(&self, i: &GenericInstruction) -> Result<(), ExecutionError> {
        let a = i.read_source(1)?;
        let b = i.read_source(2)?;
        let taken = match i.minor() {
            0 => a == b,
            1 => a != b,
            4 => (a as i32) < (b as i32),
            5 => (a as i32) >= (b as i32),
            6 => a < b,
            7 => a >= b,
            _ => return Err(unsupported(self, i)),
        };
        let here = self.pc.get();
        let next = if taken {
            here.wrapping_add(i.immediate())
        } else {
            here.wrapping_add(4)
        };
        self.pc.set(next);
        Ok(())
    }
}

pub struct Load {
    port: Arc<dyn DataPort>,
}

impl Load {
    #[must_use]
    pub fn new(port: Arc<dyn DataPort>) -> Load {
        Load { port }
    }
}

impl InstructionFunctor for Load {
    fn name(&self) -> &str {
        "rv32-load"
    }

    fn execute(&self, i: &GenericInstruction) -> Result<(), ExecutionError> {
        let address = i.read_source(1)?.wrapping_add(i.immediate());
        let value = match i.minor() {
            0 => self.port.read8(address)? as i8 as u32,
            1 => self.port.read16(address)? as i16 as u32,
            2 => self.port.read32(address)?,
            4 => u32::from(self.port.read8(address)?),
            5 => u32::from(self.port.read16(address)?),
            _ => return Err(unsupported(self, i)),
        };
        event!(Level::TRACE, "load {:#010x} from {:#010x}", value, address);
        i.write_destination(value)
    }
}

pub struct Store {
    port: Arc<dyn DataPort>,
}

impl Store {
    #[must_use]
    pub fn new(port: Arc<dyn DataPort>) -> Store {
        Store { port }
    }
}

impl InstructionFunctor for Store {
    fn name(&self) -> &str {
        "rv32-store"
    }

    fn execute(&self, i: &GenericInstruction) -> Result<(), ExecutionError> {
        let address = i.read_source(1)?.wrapping_add(i.immediate());
        let value = i.read_source(2)?;
        event!(Level::TRACE, "store {:#010x} to {:#010x}", value, address);
        match i.minor() {
            0 => self.port.write8(address, value as u8)?,
            1 => self.port.write16(address, value as u16)?,
            2 => self.port.write32(address, value)?,
            _ => return Err(unsupported(self, i)),
        }
        Ok(())
    }
}
