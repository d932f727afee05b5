//! Executor units.
//!
//! An executor admits raw instruction words, decodes them through the
//! registry, submits their register requests and keeps them in a pool
//! until they can run.  Each call to [`Executor::step`] completes at
//! most one instruction, so the CPU's run loop decides the pace.
//!
//! Two disciplines are provided.  [`InOrderExecutor`] only ever looks
//! at the oldest instruction, so a stalled instruction holds up
//! everything behind it.  [`OutOfOrderExecutor`] runs the oldest
//! instruction which is ready; register exclusivity is the only thing
//! keeping later instructions from overtaking earlier ones.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{event, Level};

use base::InstructionWord;

use super::error::CpuError;
use super::instruction::GenericInstruction;
use super::registry::InstructionRegistry;

pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    /// Decodes `word`, claims its registers and queues it.
    fn admit(&self, word: InstructionWord) -> Result<(), CpuError>;

    fn has_pending(&self) -> bool;

    /// Runs at most one instruction.
    fn step(&self) -> Result<(), CpuError>;
}

fn lock_pool<T>(pool: &Mutex<T>) -> MutexGuard<'_, T> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Executes a ready instruction and gives its registers back.
fn complete(
    executor: &str,
    registry: &InstructionRegistry,
    instruction: &mut GenericInstruction,
) -> Result<(), CpuError> {
    let functor = registry.functor_of(instruction)?;
    event!(
        Level::DEBUG,
        "{}: executing {} ({} via {})",
        executor,
        instruction.word(),
        functor.name(),
        instruction.form_name()
    );
    functor
        .execute(instruction)
        .map_err(|error| CpuError::Execution {
            executor: executor.to_string(),
            word: instruction.word(),
            error,
        })?;
    instruction.release();
    Ok(())
}

pub struct InOrderExecutor {
    name: String,
    registry: Arc<InstructionRegistry>,
    pool: Mutex<VecDeque<GenericInstruction>>,
}

impl InOrderExecutor {
    #[must_use]
    pub fn new(name: &str, registry: Arc<InstructionRegistry>) -> InOrderExecutor {
        InOrderExecutor {
            name: name.to_string(),
            registry,
            pool: Mutex::new(VecDeque::new()),
        }
    }
}

impl Executor for InOrderExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn admit(&self, word: InstructionWord) -> Result<(), CpuError> {
        let mut instruction = self.registry.parse(word)?;
        let mut pool = lock_pool(&self.pool);
        instruction.submit();
        pool.push_back(instruction);
        Ok(())
    }

    fn has_pending(&self) -> bool {
        !lock_pool(&self.pool).is_empty()
    }

    fn step(&self) -> Result<(), CpuError> {
        let mut pool = lock_pool(&self.pool);
        match pool.front_mut() {
            Some(front) if front.is_ready() => {
                complete(&self.name, &self.registry, front)?;
                pool.pop_front();
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

pub struct OutOfOrderExecutor {
    name: String,
    registry: Arc<InstructionRegistry>,
    pool: Mutex<Vec<GenericInstruction>>,
}

impl OutOfOrderExecutor {
    #[must_use]
    pub fn new(name: &str, registry: Arc<InstructionRegistry>) -> OutOfOrderExecutor {
        OutOfOrderExecutor {
            name: name.to_string(),
            registry,
            pool: Mutex::new(Vec::new()),
        }
    }
}

impl Executor for OutOfOrderExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn admit(&self, word: InstructionWord) -> Result<(), CpuError> {
        let mut instruction = self.registry.parse(word)?;
        let mut pool = lock_pool(&self.pool);
        instruction.submit();
        pool.push(instruction);
        Ok(())
    }

    fn has_pending(&self) -> bool {
        !lock_pool(&self.pool).is_empty()
    }

    fn step(&self) -> Result<(), CpuError> {
        let mut pool = lock_pool(&self.pool);
        if let Some(pos) = pool.iter().position(GenericInstruction::is_ready) {
            complete(&self.name, &self.registry, &mut pool[pos])?;
            pool.remove(pos);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{CpuError, ExecutionError};
    use crate::registers::{RegisterBank, RegisterRef};
    use crate::registry::ExecutorId;
    use crate::request::{RegisterRequest, RegisterSet};
    use crate::testing::{bank, encode, AddAndRecord, Refuse, ThreeRegisterForm};

    const ADD: u32 = 0x33;
    const FAIL: u32 = 0x0b;

    fn registry(bank: &Arc<RegisterBank>, functor: &Arc<AddAndRecord>) -> Arc<InstructionRegistry> {
        let form = Arc::new(ThreeRegisterForm {
            bank: Arc::clone(bank),
        });
        let mut registry = InstructionRegistry::new(Arc::clone(bank));
        registry
            .register(ADD, form.clone(), functor.clone(), ExecutorId(0))
            .expect("register add");
        registry
            .register(FAIL, form, Arc::new(Refuse), ExecutorId(0))
            .expect("register fail");
        Arc::new(registry)
    }

    /// Holds register 5 so that anything reading it stalls.
    fn blocker(bank: &Arc<RegisterBank>) -> RegisterRequest {
        let mut request = RegisterRequest::new(
            Arc::clone(bank),
            RegisterSet::new(Some(RegisterRef::new(0, 5)), vec![]),
        );
        request.submit();
        assert!(request.is_ready());
        request
    }

    // I1: x6 = x5 + x1 (stalls on x5).  I2: x7 = x2 + x3 (independent).
    fn stalled_then_ready() -> (InstructionWord, InstructionWord) {
        (encode(ADD, 6, 5, 1), encode(ADD, 7, 2, 3))
    }

    #[test]
    fn test_in_order_never_overtakes() {
        let bank = bank();
        let functor = Arc::new(AddAndRecord::default());
        let executor = InOrderExecutor::new("in-order", registry(&bank, &functor));
        let mut hold = blocker(&bank);
        let (i1, i2) = stalled_then_ready();
        executor.admit(i1).expect("admit i1");
        executor.admit(i2).expect("admit i2");

        for _ in 0..5 {
            executor.step().expect("step");
        }
        assert!(functor.executed().is_empty());
        assert!(executor.has_pending());

        hold.release();
        executor.step().expect("step");
        assert_eq!(functor.executed(), vec![i1]);
        executor.step().expect("step");
        assert_eq!(functor.executed(), vec![i1, i2]);
        assert!(!executor.has_pending());
    }

    #[test]
    fn test_out_of_order_runs_first_ready() {
        let bank = bank();
        let functor = Arc::new(AddAndRecord::default());
        let executor = OutOfOrderExecutor::new("out-of-order", registry(&bank, &functor));
        let mut hold = blocker(&bank);
        let (i1, i2) = stalled_then_ready();
        executor.admit(i1).expect("admit i1");
        executor.admit(i2).expect("admit i2");

        executor.step().expect("step");
        assert_eq!(functor.executed(), vec![i2]);
        assert!(executor.has_pending());
        executor.step().expect("step");
        assert_eq!(functor.executed(), vec![i2]);

        hold.release();
        executor.step().expect("step");
        assert_eq!(functor.executed(), vec![i2, i1]);
        assert!(!executor.has_pending());
    }

    #[test]
    fn test_results_are_written_and_registers_released() {
        let bank = bank();
        bank.preload(RegisterRef::new(0, 1), 40).expect("x1");
        bank.preload(RegisterRef::new(0, 2), 2).expect("x2");
        let functor = Arc::new(AddAndRecord::default());
        let executor = InOrderExecutor::new("in-order", registry(&bank, &functor));
        // x3 = x1 + x2; x4 = x3 + x3 depends on the first.
        executor.admit(encode(ADD, 3, 1, 2)).expect("admit");
        executor.admit(encode(ADD, 4, 3, 3)).expect("admit");
        assert!(bank.is_locked(RegisterRef::new(0, 3)));
        executor.step().expect("step");
        executor.step().expect("step");
        assert!(!executor.has_pending());
        let values = bank.snapshot(0).expect("file 0");
        assert_eq!(values[3], 42);
        assert_eq!(values[4], 84);
        assert!((0..32).all(|id| !bank.is_locked(RegisterRef::new(0, id))));
        assert_eq!(bank.waiting(), 0);
    }

    #[test]
    fn test_writes_to_zero_register_are_discarded() {
        let bank = bank();
        bank.preload(RegisterRef::new(0, 1), 7).expect("x1");
        let functor = Arc::new(AddAndRecord::default());
        let executor = OutOfOrderExecutor::new("ooo", registry(&bank, &functor));
        executor.admit(encode(ADD, 0, 1, 1)).expect("admit");
        executor.step().expect("step");
        assert_eq!(bank.snapshot(0).map(|v| v[0]), Some(0));
    }

    #[test]
    fn test_functor_failure_is_reported_with_executor_name() {
        let bank = bank();
        let functor = Arc::new(AddAndRecord::default());
        let executor = InOrderExecutor::new("alu", registry(&bank, &functor));
        let word = encode(FAIL, 1, 2, 3);
        executor.admit(word).expect("admit");
        match executor.step() {
            Err(CpuError::Execution {
                executor,
                word: w,
                error: ExecutionError::Unsupported { .. },
            }) => {
                assert_eq!(executor, "alu");
                assert_eq!(w, word);
            }
            other => panic!("expected an execution failure, got {other:?}"),
        }
    }

    #[test]
    fn test_unregistered_opcode_is_rejected_at_admission() {
        let bank = bank();
        let functor = Arc::new(AddAndRecord::default());
        let executor = InOrderExecutor::new("alu", registry(&bank, &functor));
        assert!(matches!(
            executor.admit(InstructionWord::new(0x7f)),
            Err(CpuError::Registry(_))
        ));
        assert!(!executor.has_pending());
    }
}
