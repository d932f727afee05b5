//! Small instruction definitions used by the unit tests.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use base::prelude::*;

use super::error::{ExecutionError, OperandError, PortError};
use super::instruction::{GenericInstruction, InstructionForm, InstructionFunctor};
use super::port::DataPort;
use super::registers::{RegisterBank, RegisterFile};
use super::request::RegisterSet;

/// Register layout: rd in bits 7-11, rs1 in 15-19, rs2 in 20-24.
pub(crate) struct ThreeRegisterForm {
    pub(crate) bank: Arc<RegisterBank>,
}

impl InstructionForm for ThreeRegisterForm {
    fn name(&self) -> &str {
        "three-register"
    }

    fn registers(&self, word: InstructionWord) -> Result<RegisterSet, OperandError> {
        let rd = self.bank.reference(0, word.field(7, 5) as usize)?;
        let rs1 = self.bank.reference(0, word.field(15, 5) as usize)?;
        let rs2 = self.bank.reference(0, word.field(20, 5) as usize)?;
        Ok(RegisterSet::new(Some(rd), vec![rs1, rs2]))
    }

    fn minor(&self, word: InstructionWord) -> u32 {
        word.field(12, 3)
    }
}

/// Encodes an instruction for [`ThreeRegisterForm`].
pub(crate) fn encode(opcode: u32, rd: u32, rs1: u32, rs2: u32) -> InstructionWord {
    InstructionWord::new(opcode | (rd << 7) | (rs1 << 15) | (rs2 << 20))
}

/// Adds its sources into its destination and records what it ran.
#[derive(Default)]
pub(crate) struct AddAndRecord {
    pub(crate) executed: Mutex<Vec<InstructionWord>>,
}

impl AddAndRecord {
    pub(crate) fn executed(&self) -> Vec<InstructionWord> {
        self.executed.lock().expect("test lock").clone()
    }
}

impl InstructionFunctor for AddAndRecord {
    fn name(&self) -> &str {
        "add-and-record"
    }

    fn execute(&self, instruction: &GenericInstruction) -> Result<(), ExecutionError> {
        let sum = instruction
            .read_source(1)?
            .wrapping_add(instruction.read_source(2)?);
        instruction.write_destination(sum)?;
        self.executed
            .lock()
            .expect("test lock")
            .push(instruction.word());
        Ok(())
    }
}

/// Always fails.
pub(crate) struct Refuse;

impl InstructionFunctor for Refuse {
    fn name(&self) -> &str {
        "refuse"
    }

    fn execute(&self, instruction: &GenericInstruction) -> Result<(), ExecutionError> {
        Err(ExecutionError::Unsupported {
            functor: self.name().to_string(),
            minor: instruction.minor(),
            sub_minor: instruction.sub_minor(),
        })
    }
}

pub(crate) fn bank() -> Arc<RegisterBank> {
    Arc::new(RegisterBank::new(vec![RegisterFile::new("x", 32, Some(0))]))
}

/// Word-addressed memory answering port requests directly.
#[derive(Default)]
pub(crate) struct WordMemory {
    pub(crate) words: Mutex<BTreeMap<Address, u32>>,
    pub(crate) reads: Mutex<Vec<Address>>,
}

impl WordMemory {
    pub(crate) fn with_program(base: Address, program: &[InstructionWord]) -> WordMemory {
        let memory = WordMemory::default();
        {
            let mut words = memory.words.lock().expect("test lock");
            for (i, w) in program.iter().enumerate() {
                words.insert(base + 4 * i as u32, w.bits());
            }
        }
        memory
    }
}

impl DataPort for WordMemory {
    fn read(&self, address: Address, kind: PayloadKind) -> Result<Payload, PortError> {
        self.reads.lock().expect("test lock").push(address);
        match self.words.lock().expect("test lock").get(&address) {
            Some(w) => Ok(Payload::truncated(kind, u64::from(*w))),
            None => Err(PortError::InvalidAddress(address)),
        }
    }

    fn write(&self, address: Address, payload: Payload) -> Result<(), PortError> {
        let value = payload.value().ok_or(PortError::InvalidAddress(address))?;
        self.words
            .lock()
            .expect("test lock")
            .insert(address, value as u32);
        Ok(())
    }
}
