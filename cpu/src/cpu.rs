use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use super::control::{ControlUnit, ProgramCounter};
use super::error::CpuError;
use super::executor::Executor;
use super::registers::RegisterBank;

/// One CPU: a control unit, the executors it dispatches to and the
/// register bank they share.  A CPU is driven by a single thread
/// calling [`Cpu::step`] in a loop.
pub struct Cpu {
    name: String,
    bank: Arc<RegisterBank>,
    control: ControlUnit,
    executors: Vec<Arc<dyn Executor>>,
}

impl Cpu {
    #[must_use]
    pub fn new(
        name: &str,
        bank: Arc<RegisterBank>,
        control: ControlUnit,
        executors: Vec<Arc<dyn Executor>>,
    ) -> Cpu {
        Cpu {
            name: name.to_string(),
            bank,
            control,
            executors,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bank(&self) -> &Arc<RegisterBank> {
        &self.bank
    }

    #[must_use]
    pub fn pc(&self) -> &ProgramCounter {
        self.control.pc()
    }

    /// Steps the control unit, then each executor once.
    pub fn step(&mut self) -> Result<(), CpuError> {
        self.control.step()?;
        for executor in &self.executors {
            executor.step()?;
        }
        Ok(())
    }

    /// A handle which another thread can use to watch for completion.
    #[must_use]
    pub fn monitor(&self) -> CpuMonitor {
        CpuMonitor {
            name: self.name.clone(),
            pc: self.control.pc().clone(),
            executors: self.executors.clone(),
        }
    }
}

impl Debug for Cpu {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("name", &self.name)
            .field("control", &self.control)
            .field(
                "executors",
                &self.executors.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Clone)]
pub struct CpuMonitor {
    name: String,
    pc: ProgramCounter,
    executors: Vec<Arc<dyn Executor>>,
}

impl CpuMonitor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The CPU has halted (program counter zero) and every executor
    /// has drained its pool.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.pc.get() == 0 && self.executors.iter().all(|e| !e.has_pending())
    }
}
