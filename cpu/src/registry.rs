//! The instruction registry maps each primary opcode to the form
//! which decodes it, the functor which executes it and the executor
//! which runs it.
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use tracing::{event, Level};

use base::{InstructionWord, Opcode};

use super::error::RegistryError;
use super::instruction::{GenericInstruction, InstructionForm, InstructionFunctor};
use super::registers::RegisterBank;

const OPCODE_LIMIT: Opcode = 0x80;

/// Identifies an executor within its CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutorId(pub usize);

struct Entry {
    form: Arc<dyn InstructionForm>,
    functor: Arc<dyn InstructionFunctor>,
    executor: ExecutorId,
}

pub struct InstructionRegistry {
    bank: Arc<RegisterBank>,
    entries: BTreeMap<Opcode, Entry>,
}

impl InstructionRegistry {
    #[must_use]
    pub fn new(bank: Arc<RegisterBank>) -> InstructionRegistry {
        InstructionRegistry {
            bank,
            entries: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        opcode: Opcode,
        form: Arc<dyn InstructionForm>,
        functor: Arc<dyn InstructionFunctor>,
        executor: ExecutorId,
    ) -> Result<(), RegistryError> {
        if opcode >= OPCODE_LIMIT {
            return Err(RegistryError::OpcodeOutOfRange(opcode));
        }
        if self.entries.contains_key(&opcode) {
            return Err(RegistryError::Duplicate(opcode));
        }
        event!(
            Level::DEBUG,
            "opcode {:#04x}: form {}, functor {}, executor {}",
            opcode,
            form.name(),
            functor.name(),
            executor.0
        );
        self.entries.insert(
            opcode,
            Entry {
                form,
                functor,
                executor,
            },
        );
        Ok(())
    }

    fn entry(&self, opcode: Opcode) -> Result<&Entry, RegistryError> {
        self.entries
            .get(&opcode)
            .ok_or(RegistryError::NotRegistered(opcode))
    }

    #[must_use]
    pub fn contains(&self, opcode: Opcode) -> bool {
        self.entries.contains_key(&opcode)
    }

    pub fn opcodes(&self) -> impl Iterator<Item = Opcode> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn bank(&self) -> &Arc<RegisterBank> {
        &self.bank
    }

    /// Decodes `word` into an instruction whose register request has
    /// not been submitted yet.
    pub fn parse(&self, word: InstructionWord) -> Result<GenericInstruction, RegistryError> {
        let entry = self.entry(word.opcode())?;
        GenericInstruction::new(word, Arc::clone(&entry.form), Arc::clone(&self.bank)).map_err(
            |error| RegistryError::Decode {
                word,
                form: entry.form.name().to_string(),
                error,
            },
        )
    }

    pub fn form(&self, word: InstructionWord) -> Result<Arc<dyn InstructionForm>, RegistryError> {
        Ok(Arc::clone(&self.entry(word.opcode())?.form))
    }

    pub fn functor(&self, word: InstructionWord) -> Result<Arc<dyn InstructionFunctor>, RegistryError> {
        Ok(Arc::clone(&self.entry(word.opcode())?.functor))
    }

    pub fn functor_of(
        &self,
        instruction: &GenericInstruction,
    ) -> Result<Arc<dyn InstructionFunctor>, RegistryError> {
        self.functor(instruction.word())
    }

    pub fn executor(&self, word: InstructionWord) -> Result<ExecutorId, RegistryError> {
        Ok(self.entry(word.opcode())?.executor)
    }

    pub fn executor_of(&self, instruction: &GenericInstruction) -> Result<ExecutorId, RegistryError> {
        self.executor(instruction.word())
    }
}

impl Debug for InstructionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for (opcode, entry) in &self.entries {
            m.entry(
                &format_args!("{opcode:#04x}"),
                &format_args!(
                    "{} / {} / executor {}",
                    entry.form.name(),
                    entry.functor.name(),
                    entry.executor.0
                ),
            );
        }
        m.finish()
    }
}
