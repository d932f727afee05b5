//! This crate models a CPU core: register files guarded by an
//! ownership arbitration engine, an instruction registry binding
//! opcodes to decode forms and functors, executor units which run
//! instructions once their registers are available, and a control
//! unit fetching through a bus port.
#![crate_name = "cpu"]

mod arbiter;
mod control;
#[allow(clippy::module_inception)]
mod cpu;
mod error;
mod executor;
mod instruction;
mod port;
mod registers;
mod registry;
mod request;

#[cfg(test)]
mod testing;

pub use control::{ControlUnit, ProgramCounter};
pub use cpu::{Cpu, CpuMonitor};
pub use error::{CpuError, ExecutionError, OperandError, PortError, RegisterAccessError, RegistryError};
pub use executor::{Executor, InOrderExecutor, OutOfOrderExecutor};
pub use instruction::{GenericInstruction, InstructionForm, InstructionFunctor};
pub use port::{BusPort, DataPort};
pub use registers::{FileId, RegisterBank, RegisterFile, RegisterId, RegisterRef};
pub use registry::{ExecutorId, InstructionRegistry};
pub use request::{RegisterRequest, RegisterSet};
