//! Decoded instructions.
//!
//! An [`InstructionForm`] knows the bit layout shared by a group of
//! opcodes: where the register numbers, the immediate and the minor
//! opcode fields live.  An [`InstructionFunctor`] knows what the
//! instruction does.  A [`GenericInstruction`] ties a raw word to its
//! form and to the register request the arbitration engine schedules.
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use base::{InstructionWord, Opcode};

use super::error::{ExecutionError, OperandError};
use super::registers::{RegisterBank, RegisterRef};
use super::request::{RegisterRequest, RegisterSet};

pub trait InstructionForm: Send + Sync {
    fn name(&self) -> &str;

    /// The registers named by `word`.
    fn registers(&self, word: InstructionWord) -> Result<RegisterSet, OperandError>;

    /// The immediate operand, sign-extended to 32 bits where the form
    /// defines it as signed.
    fn immediate(&self, _word: InstructionWord) -> u32 {
        0
    }

    fn minor(&self, _word: InstructionWord) -> u32 {
        0
    }

    fn sub_minor(&self, _word: InstructionWord) -> u32 {
        0
    }
}

pub trait InstructionFunctor: Send + Sync {
    fn name(&self) -> &str;

    /// Carries out the instruction.  All registers of the instruction
    /// are borrowed when this is called.
    fn execute(&self, instruction: &GenericInstruction) -> Result<(), ExecutionError>;
}

pub struct GenericInstruction {
    word: InstructionWord,
    form: Arc<dyn InstructionForm>,
    request: RegisterRequest,
}

impl GenericInstruction {
    /// Decodes `word` with `form`.  The register request is built but
    /// not yet submitted.
    pub fn new(
        word: InstructionWord,
        form: Arc<dyn InstructionForm>,
        bank: Arc<RegisterBank>,
    ) -> Result<GenericInstruction, OperandError> {
        let set = form.registers(word)?;
        Ok(GenericInstruction {
            word,
            form,
            request: RegisterRequest::new(bank, set),
        })
    }

    #[must_use]
    pub fn word(&self) -> InstructionWord {
        self.word
    }

    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.word.opcode()
    }

    #[must_use]
    pub fn form_name(&self) -> &str {
        self.form.name()
    }

    #[must_use]
    pub fn immediate(&self) -> u32 {
        self.form.immediate(self.word)
    }

    #[must_use]
    pub fn minor(&self) -> u32 {
        self.form.minor(self.word)
    }

    #[must_use]
    pub fn sub_minor(&self) -> u32 {
        self.form.sub_minor(self.word)
    }

    fn operand_error(&self, error: OperandError) -> ExecutionError {
        ExecutionError::Operand {
            form: self.form.name().to_string(),
            error,
        }
    }

    pub fn destination(&self) -> Result<RegisterRef, ExecutionError> {
        self.request
            .registers()
            .destination()
            .map_err(|e| self.operand_error(e))
    }

    pub fn source(&self, n: usize) -> Result<RegisterRef, ExecutionError> {
        self.request
            .registers()
            .source(n)
            .map_err(|e| self.operand_error(e))
    }

    #[must_use]
    pub fn request(&self) -> &RegisterRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut RegisterRequest {
        &mut self.request
    }

    pub fn submit(&mut self) {
        self.request.submit();
    }

    pub fn release(&mut self) {
        self.request.release();
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.request.is_ready()
    }

    pub fn read_source(&self, n: usize) -> Result<u32, ExecutionError> {
        let reg = self.source(n)?;
        Ok(self.request.bank().read(&self.request, reg)?)
    }

    pub fn read_destination(&self) -> Result<u32, ExecutionError> {
        let reg = self.destination()?;
        Ok(self.request.bank().read(&self.request, reg)?)
    }

    pub fn write_destination(&self, value: u32) -> Result<(), ExecutionError> {
        let reg = self.destination()?;
        Ok(self.request.bank().write(&self.request, reg, value)?)
    }
}

impl Debug for GenericInstruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericInstruction")
            .field("word", &self.word)
            .field("form", &self.form.name())
            .field("request", &self.request)
            .finish()
    }
}
