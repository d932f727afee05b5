//! Errors raised by the CPU model.
//!
//! [`OperandError`] and [`RegisterAccessError`] are usage errors: they
//! mean an instruction form or functor asked for something the
//! instruction does not have, which is a bug in the instruction
//! definitions rather than in the simulated program.  [`PortError`]
//! and [`ExecutionError`] can be provoked by the simulated program
//! (for example by loading from an unmapped address).
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use base::{Address, InstructionWord, Opcode, PayloadKind};

use super::registers::RegisterRef;
use super::registry::ExecutorId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperandError {
    NoDestination,
    /// Source operands are numbered from 1.
    ZeroSourceIndex,
    NoSource(usize),
    NoSuchRegister(RegisterRef),
}

impl Display for OperandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OperandError::NoDestination => f.write_str("destination register (rd) is not present"),
            OperandError::ZeroSourceIndex => {
                f.write_str("operand registers are numbered from 1 (index zero is not permitted)")
            }
            OperandError::NoSource(n) => write!(f, "operand register rs{n} is not present"),
            OperandError::NoSuchRegister(r) => write!(f, "register {r} does not exist"),
        }
    }
}

impl Error for OperandError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterAccessError {
    Unborrowed(RegisterRef),
    NoSuchRegister(RegisterRef),
}

impl Display for RegisterAccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RegisterAccessError::Unborrowed(r) => {
                write!(f, "attempt to use unborrowed register {r}")
            }
            RegisterAccessError::NoSuchRegister(r) => write!(f, "register {r} does not exist"),
        }
    }
}

impl Error for RegisterAccessError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortError {
    /// Nothing answers at this address.
    InvalidAddress(Address),
    UnexpectedPayload {
        address: Address,
        expected: PayloadKind,
        found: PayloadKind,
    },
    /// The machine was stopped while the port waited for a response.
    Interrupted(Address),
}

impl Display for PortError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PortError::InvalidAddress(a) => write!(f, "no device responds at address {a:#010x}"),
            PortError::UnexpectedPayload {
                address,
                expected,
                found,
            } => write!(
                f,
                "invalid read of size {} at address {address:#010x}: response payload was {found}, expected {expected}",
                expected.width()
            ),
            PortError::Interrupted(a) => {
                write!(f, "stopped while waiting for a response from {a:#010x}")
            }
        }
    }
}

impl Error for PortError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    Duplicate(Opcode),
    NotRegistered(Opcode),
    OpcodeOutOfRange(Opcode),
    Decode {
        word: InstructionWord,
        form: String,
        error: OperandError,
    },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Duplicate(op) => {
                write!(f, "instruction with opcode {op:#04x} is already registered")
            }
            RegistryError::NotRegistered(op) => {
                write!(f, "instruction with opcode {op:#04x} is not registered")
            }
            RegistryError::OpcodeOutOfRange(op) => {
                write!(f, "{op:#x} does not fit in the 7-bit opcode field")
            }
            RegistryError::Decode { word, form, error } => {
                write!(f, "form {form} cannot decode {word}: {error}")
            }
        }
    }
}

impl Error for RegistryError {}

/// A failure inside an instruction functor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionError {
    Operand { form: String, error: OperandError },
    Register(RegisterAccessError),
    Port(PortError),
    /// The functor does not implement this minor / sub-minor
    /// combination.
    Unsupported {
        functor: String,
        minor: u32,
        sub_minor: u32,
    },
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Operand { form, error } => write!(f, "instruction form {form}: {error}"),
            ExecutionError::Register(e) => e.fmt(f),
            ExecutionError::Port(e) => e.fmt(f),
            ExecutionError::Unsupported {
                functor,
                minor,
                sub_minor,
            } => write!(
                f,
                "{functor} does not support minor opcode {minor:#x} with sub-minor opcode {sub_minor:#x}"
            ),
        }
    }
}

impl Error for ExecutionError {}

impl From<RegisterAccessError> for ExecutionError {
    fn from(e: RegisterAccessError) -> ExecutionError {
        ExecutionError::Register(e)
    }
}

impl From<PortError> for ExecutionError {
    fn from(e: PortError) -> ExecutionError {
        ExecutionError::Port(e)
    }
}

/// Anything which can go wrong while a CPU is stepped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CpuError {
    Registry(RegistryError),
    Execution {
        executor: String,
        word: InstructionWord,
        error: ExecutionError,
    },
    Fetch { address: Address, error: PortError },
    UnknownExecutor(ExecutorId),
}

impl Display for CpuError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CpuError::Registry(e) => e.fmt(f),
            CpuError::Execution {
                executor,
                word,
                error,
            } => write!(f, "executor {executor} failed on instruction {word}: {error}"),
            CpuError::Fetch { address, error } => {
                write!(f, "instruction fetch from {address:#010x} failed: {error}")
            }
            CpuError::UnknownExecutor(id) => write!(f, "there is no executor with id {}", id.0),
        }
    }
}

impl Error for CpuError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CpuError::Registry(e) => Some(e),
            CpuError::Execution { error, .. } => Some(error),
            CpuError::Fetch { error, .. } => Some(error),
            CpuError::UnknownExecutor(_) => None,
        }
    }
}

impl From<RegistryError> for CpuError {
    fn from(e: RegistryError) -> CpuError {
        CpuError::Registry(e)
    }
}

#[test]
fn test_messages() {
    assert_eq!(
        RegistryError::Duplicate(0x33).to_string(),
        "instruction with opcode 0x33 is already registered"
    );
    assert_eq!(
        RegistryError::NotRegistered(0x7).to_string(),
        "instruction with opcode 0x07 is not registered"
    );
    assert_eq!(
        OperandError::NoSource(3).to_string(),
        "operand register rs3 is not present"
    );
    assert_eq!(
        PortError::UnexpectedPayload {
            address: 0x10,
            expected: PayloadKind::X32,
            found: PayloadKind::InvalidAddress
        }
        .to_string(),
        "invalid read of size 4 at address 0x00000010: response payload was OOPS, expected _X32"
    );
}
