//! The control unit fetches instructions and hands them out.
//!
//! The program counter is shared with the functors of control-flow
//! instructions, which may overwrite it.  The control unit remembers
//! the address it last fetched from: if the counter still holds that
//! address the previous instruction did not jump, so the counter is
//! advanced before fetching.  If the counter changed (a jump, or the
//! very first fetch) the instruction at the new address is fetched as
//! is.  A branch to its own address is therefore indistinguishable
//! from falling through.
//!
//! The machine halts when the counter reaches zero.
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{event, Level};

use base::{Address, InstructionWord, INSTRUCTION_WIDTH};

use super::error::CpuError;
use super::executor::Executor;
use super::port::DataPort;
use super::registry::{ExecutorId, InstructionRegistry};

#[cfg(test)]
mod tests;

#[derive(Clone, Debug, Default)]
pub struct ProgramCounter(Arc<AtomicU32>);

impl ProgramCounter {
    #[must_use]
    pub fn new(value: Address) -> ProgramCounter {
        ProgramCounter(Arc::new(AtomicU32::new(value)))
    }

    #[must_use]
    pub fn get(&self) -> Address {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, value: Address) {
        self.0.store(value, Ordering::Release);
    }
}

pub struct ControlUnit {
    pc: ProgramCounter,
    last_fetch: Address,
    registry: Arc<InstructionRegistry>,
    executors: Vec<Arc<dyn Executor>>,
    /// The executor whose pending work holds up fetching.
    own_executor: ExecutorId,
    port: Arc<dyn DataPort>,
}

impl ControlUnit {
    #[must_use]
    pub fn new(
        pc: ProgramCounter,
        registry: Arc<InstructionRegistry>,
        executors: Vec<Arc<dyn Executor>>,
        own_executor: ExecutorId,
        port: Arc<dyn DataPort>,
    ) -> ControlUnit {
        ControlUnit {
            pc,
            last_fetch: 0,
            registry,
            executors,
            own_executor,
            port,
        }
    }

    #[must_use]
    pub fn pc(&self) -> &ProgramCounter {
        &self.pc
    }

    fn executor(&self, id: ExecutorId) -> Result<&Arc<dyn Executor>, CpuError> {
        self.executors
            .get(id.0)
            .ok_or(CpuError::UnknownExecutor(id))
    }

    /// Fetches and dispatches at most one instruction.
    pub fn step(&mut self) -> Result<(), CpuError> {
        if self.is_completed() || self.executor(self.own_executor)?.has_pending() {
            return Ok(());
        }
        let mut pc = self.pc.get();
        if pc == self.last_fetch {
            pc = pc.wrapping_add(INSTRUCTION_WIDTH);
            self.pc.set(pc);
            if pc == 0 {
                return Ok(());
            }
        }
        self.last_fetch = pc;
        let word = self
            .port
            .read32(pc)
            .map(InstructionWord::new)
            .map_err(|error| CpuError::Fetch { address: pc, error })?;
        let target = self.registry.executor(word)?;
        event!(
            Level::DEBUG,
            "fetched {} at {:#010x} for executor {}",
            word,
            pc,
            target.0
        );
        self.executor(target)?.admit(word)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.pc.get() == 0
    }
}

impl Debug for ControlUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlUnit")
            .field("pc", &format_args!("{:#010x}", self.pc.get()))
            .field("last_fetch", &format_args!("{:#010x}", self.last_fetch))
            .field("own_executor", &self.own_executor)
            .finish_non_exhaustive()
    }
}
