use std::sync::Arc;

use base::InstructionWord;

use super::*;
use crate::error::{ExecutionError, PortError};
use crate::executor::InOrderExecutor;
use crate::instruction::{GenericInstruction, InstructionFunctor};
use crate::testing::{bank, encode, AddAndRecord, ThreeRegisterForm, WordMemory};

const ADD: u32 = 0x33;
const JUMP: u32 = 0x6f;

/// Sets the program counter to the upper twenty bits of the word.
struct JumpTo {
    pc: ProgramCounter,
}

impl InstructionFunctor for JumpTo {
    fn name(&self) -> &str {
        "jump-to"
    }

    fn execute(&self, instruction: &GenericInstruction) -> Result<(), ExecutionError> {
        self.pc.set(instruction.word().bits() >> 12);
        Ok(())
    }
}

fn jump(target: u32) -> InstructionWord {
    InstructionWord::new(JUMP | (target << 12))
}

struct Machine {
    control: ControlUnit,
    executor: Arc<InOrderExecutor>,
    functor: Arc<AddAndRecord>,
    memory: Arc<WordMemory>,
}

fn machine(initial_pc: u32, program_base: u32, program: &[InstructionWord]) -> Machine {
    let bank = bank();
    let pc = ProgramCounter::new(initial_pc);
    let form = Arc::new(ThreeRegisterForm {
        bank: Arc::clone(&bank),
    });
    let functor = Arc::new(AddAndRecord::default());
    let mut registry = InstructionRegistry::new(bank);
    registry
        .register(ADD, form.clone(), functor.clone(), ExecutorId(0))
        .expect("register add");
    registry
        .register(JUMP, form, Arc::new(JumpTo { pc: pc.clone() }), ExecutorId(0))
        .expect("register jump");
    let registry = Arc::new(registry);
    let executor = Arc::new(InOrderExecutor::new("main", Arc::clone(&registry)));
    let memory = Arc::new(WordMemory::with_program(program_base, program));
    let control = ControlUnit::new(
        pc,
        registry,
        vec![executor.clone() as Arc<dyn Executor>],
        ExecutorId(0),
        memory.clone(),
    );
    Machine {
        control,
        executor,
        functor,
        memory,
    }
}

fn reads(m: &Machine) -> Vec<u32> {
    m.memory.reads.lock().expect("test lock").clone()
}

#[test]
fn test_first_fetch_does_not_advance() {
    let program = [encode(ADD, 1, 2, 3), encode(ADD, 4, 5, 6)];
    let mut m = machine(0x100, 0x100, &program);
    m.control.step().expect("step");
    assert_eq!(reads(&m), vec![0x100]);
    assert_eq!(m.control.pc().get(), 0x100);
    assert!(m.executor.has_pending());

    // The executor is busy, so nothing is fetched.
    m.control.step().expect("step");
    assert_eq!(reads(&m), vec![0x100]);

    m.executor.step().expect("execute");
    m.control.step().expect("step");
    assert_eq!(reads(&m), vec![0x100, 0x104]);
    assert_eq!(m.control.pc().get(), 0x104);
    m.executor.step().expect("execute");
    assert_eq!(m.functor.executed(), program.to_vec());
}

#[test]
fn test_jump_is_fetched_without_advancing() {
    let program = [jump(0x200)];
    let mut m = machine(0x100, 0x100, &program);
    m.memory
        .words
        .lock()
        .expect("test lock")
        .insert(0x200, encode(ADD, 1, 1, 1).bits());
    m.control.step().expect("fetch jump");
    m.executor.step().expect("execute jump");
    assert_eq!(m.control.pc().get(), 0x200);
    m.control.step().expect("fetch target");
    assert_eq!(reads(&m), vec![0x100, 0x200]);
}

#[test]
fn test_jump_to_zero_halts() {
    let program = [encode(ADD, 1, 2, 3), jump(0)];
    let mut m = machine(0x40, 0x40, &program);
    assert!(!m.control.is_completed());
    for _ in 0..4 {
        m.control.step().expect("step");
        m.executor.step().expect("execute");
    }
    assert!(m.control.is_completed());
    assert_eq!(reads(&m), vec![0x40, 0x44]);
    m.control.step().expect("halted step is a no-op");
    assert_eq!(reads(&m), vec![0x40, 0x44]);
}

#[test]
fn test_zero_initial_pc_is_already_complete() {
    let mut m = machine(0, 0, &[encode(ADD, 1, 2, 3)]);
    assert!(m.control.is_completed());
    m.control.step().expect("step");
    assert!(reads(&m).is_empty());
}

#[test]
fn test_fetch_failure() {
    let mut m = machine(0x80, 0x100, &[]);
    assert_eq!(
        m.control.step(),
        Err(CpuError::Fetch {
            address: 0x80,
            error: PortError::InvalidAddress(0x80)
        })
    );
}

#[test]
fn test_unregistered_opcode_fails_dispatch() {
    let mut m = machine(0x10, 0x10, &[InstructionWord::new(0x7b)]);
    assert!(matches!(m.control.step(), Err(CpuError::Registry(_))));
}
