//! Register files and the lock which protects them.
//!
//! A CPU has one [`RegisterBank`] holding all of its register files.
//! Each register slot records whether it is currently locked (lent to
//! some request).  Instructions never hold a reference into a file;
//! they name registers by [`RegisterRef`], a plain (file, register)
//! pair, and the bank's [`Arbiter`](crate::arbiter) tracks which
//! request currently holds each lend.
//!
//! The bank's single mutex covers both the files and the arbiter, so
//! a request's lend state can never be observed half-updated.
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{event, Level};

use super::arbiter::Arbiter;
use super::error::{OperandError, RegisterAccessError};
use super::request::RegisterRequest;

/// Index of a register file within its bank.
pub type FileId = usize;
/// Index of a register within its file.
pub type RegisterId = usize;

/// Names one register slot.  Two references are equal exactly when
/// they name the same slot of the same file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegisterRef {
    pub file: FileId,
    pub id: RegisterId,
}

impl RegisterRef {
    #[must_use]
    pub const fn new(file: FileId, id: RegisterId) -> RegisterRef {
        RegisterRef { file, id }
    }
}

impl Display for RegisterRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "f{}:r{}", self.file, self.id)
    }
}

impl Debug for RegisterRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    value: u32,
    locked: bool,
}

/// A fixed-size array of 32-bit registers, optionally with a
/// hard-wired zero register.  The zero register reads as zero, ignores
/// writes and is never locked.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    name: String,
    slots: Vec<Slot>,
    zero: Option<RegisterId>,
}

impl RegisterFile {
    #[must_use]
    pub fn new(name: &str, count: usize, zero: Option<RegisterId>) -> RegisterFile {
        RegisterFile {
            name: name.to_string(),
            slots: vec![Slot::default(); count],
            zero: zero.filter(|z| *z < count),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn zero_register(&self) -> Option<RegisterId> {
        self.zero
    }

    #[must_use]
    pub fn is_zero(&self, id: RegisterId) -> bool {
        self.zero == Some(id)
    }

    #[must_use]
    pub fn is_locked(&self, id: RegisterId) -> bool {
        self.slots.get(id).is_some_and(|s| s.locked)
    }

    pub(crate) fn lend(&mut self, id: RegisterId) {
        if self.is_zero(id) {
            return;
        }
        if let Some(slot) = self.slots.get_mut(id) {
            slot.locked = true;
        }
    }

    pub(crate) fn reclaim(&mut self, id: RegisterId) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.locked = false;
        }
    }

    #[must_use]
    pub fn value(&self, id: RegisterId) -> Option<u32> {
        if self.is_zero(id) {
            return self.slots.get(id).map(|_| 0);
        }
        self.slots.get(id).map(|s| s.value)
    }

    pub(crate) fn set_value(&mut self, id: RegisterId, value: u32) {
        if self.is_zero(id) {
            return;
        }
        if let Some(slot) = self.slots.get_mut(id) {
            slot.value = value;
        }
    }

    #[must_use]
    pub fn values(&self) -> Vec<u32> {
        (0..self.len())
            .map(|id| self.value(id).unwrap_or_default())
            .collect()
    }
}

pub(crate) struct BankState {
    pub(crate) files: Vec<RegisterFile>,
    pub(crate) arbiter: Arbiter,
}

/// All the register files of one CPU, plus the arbitration engine
/// deciding who may use them.
pub struct RegisterBank {
    state: Mutex<BankState>,
}

impl RegisterBank {
    #[must_use]
    pub fn new(files: Vec<RegisterFile>) -> RegisterBank {
        RegisterBank {
            state: Mutex::new(BankState {
                files,
                arbiter: Arbiter::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BankState> {
        // Every update made under this lock leaves the state
        // consistent before the next statement can panic, so a
        // poisoned lock does not indicate corruption.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks that `id` exists in file `file` and returns a reference
    /// to it.
    pub fn reference(&self, file: FileId, id: RegisterId) -> Result<RegisterRef, OperandError> {
        let r = RegisterRef::new(file, id);
        match self.lock().files.get(file) {
            Some(f) if id < f.len() => Ok(r),
            _ => Err(OperandError::NoSuchRegister(r)),
        }
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    #[must_use]
    pub fn file_name(&self, file: FileId) -> Option<String> {
        self.lock().files.get(file).map(|f| f.name().to_string())
    }

    /// Claims the registers of `request`.  Registers which are free
    /// are lent at once; if any remain, the request joins the back of
    /// the waiting list.
    pub fn submit(&self, request: &mut RegisterRequest) {
        if request.ticket().is_some() {
            event!(Level::WARN, "register request submitted twice; ignoring");
            return;
        }
        let regs: Vec<RegisterRef> = request.registers().iter().collect();
        let mut guard = self.lock();
        let state = &mut *guard;
        let ticket = state.arbiter.submit(&mut state.files, &regs);
        request.set_ticket(ticket);
    }

    /// Gives up the registers of `request`, handing them to waiting
    /// requests in submission order.
    pub fn release(&self, request: &mut RegisterRequest) {
        if let Some(ticket) = request.take_ticket() {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.arbiter.release(&mut state.files, ticket);
        }
    }

    #[must_use]
    pub fn is_ready(&self, request: &RegisterRequest) -> bool {
        request
            .ticket()
            .is_some_and(|t| self.lock().arbiter.is_ready(t))
    }

    /// True when `request` currently holds the lend on `reg`.
    #[must_use]
    pub fn is_borrowed(&self, request: &RegisterRequest, reg: RegisterRef) -> bool {
        request
            .ticket()
            .is_some_and(|t| self.lock().arbiter.holds(t, reg))
    }

    #[must_use]
    pub fn is_locked(&self, reg: RegisterRef) -> bool {
        self.lock()
            .files
            .get(reg.file)
            .is_some_and(|f| f.is_locked(reg.id))
    }

    /// Number of submitted requests still waiting for registers.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.lock().arbiter.waiting_len()
    }

    fn check_access(
        state: &BankState,
        request: &RegisterRequest,
        reg: RegisterRef,
    ) -> Result<(), RegisterAccessError> {
        let file = state
            .files
            .get(reg.file)
            .filter(|f| reg.id < f.len())
            .ok_or(RegisterAccessError::NoSuchRegister(reg))?;
        if file.is_zero(reg.id) {
            return Ok(());
        }
        match request.ticket() {
            Some(t) if state.arbiter.holds(t, reg) => Ok(()),
            _ => Err(RegisterAccessError::Unborrowed(reg)),
        }
    }

    pub(crate) fn read(
        &self,
        request: &RegisterRequest,
        reg: RegisterRef,
    ) -> Result<u32, RegisterAccessError> {
        let state = self.lock();
        RegisterBank::check_access(&state, request, reg)?;
        state.files[reg.file]
            .value(reg.id)
            .ok_or(RegisterAccessError::NoSuchRegister(reg))
    }

    pub(crate) fn write(
        &self,
        request: &RegisterRequest,
        reg: RegisterRef,
        value: u32,
    ) -> Result<(), RegisterAccessError> {
        let mut state = self.lock();
        RegisterBank::check_access(&state, request, reg)?;
        state.files[reg.file].set_value(reg.id, value);
        Ok(())
    }

    /// Sets a register outside of arbitration.  This is only for
    /// setting up initial machine state before anything runs.
    pub fn preload(&self, reg: RegisterRef, value: u32) -> Result<(), OperandError> {
        let mut state = self.lock();
        match state.files.get_mut(reg.file) {
            Some(f) if reg.id < f.len() => {
                f.set_value(reg.id, value);
                Ok(())
            }
            _ => Err(OperandError::NoSuchRegister(reg)),
        }
    }

    /// A copy of the values in one register file.
    #[must_use]
    pub fn snapshot(&self, file: FileId) -> Option<Vec<u32>> {
        self.lock().files.get(file).map(RegisterFile::values)
    }
}

impl Debug for RegisterBank {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("RegisterBank")
            .field("files", &state.files)
            .field("waiting", &state.arbiter.waiting_len())
            .finish()
    }
}

#[test]
fn test_zero_register() {
    let mut file = RegisterFile::new("x", 4, Some(0));
    file.set_value(0, 99);
    file.set_value(1, 5);
    assert_eq!(file.value(0), Some(0));
    assert_eq!(file.value(1), Some(5));
    file.lend(0);
    file.lend(1);
    assert!(!file.is_locked(0));
    assert!(file.is_locked(1));
    file.reclaim(1);
    assert!(!file.is_locked(1));
    assert_eq!(file.values(), vec![0, 5, 0, 0]);
}

#[test]
fn test_zero_register_out_of_range_is_ignored() {
    let file = RegisterFile::new("x", 4, Some(7));
    assert_eq!(file.zero_register(), None);
    assert_eq!(file.value(4), None);
}

#[test]
fn test_reference_validation() {
    let bank = RegisterBank::new(vec![RegisterFile::new("x", 32, Some(0))]);
    assert_eq!(bank.reference(0, 31), Ok(RegisterRef::new(0, 31)));
    assert_eq!(
        bank.reference(0, 32),
        Err(OperandError::NoSuchRegister(RegisterRef::new(0, 32)))
    );
    assert_eq!(
        bank.reference(1, 0),
        Err(OperandError::NoSuchRegister(RegisterRef::new(1, 0)))
    );
}

#[test]
fn test_preload_and_snapshot() {
    let bank = RegisterBank::new(vec![RegisterFile::new("x", 4, Some(0))]);
    bank.preload(RegisterRef::new(0, 2), 42)
        .expect("register exists");
    bank.preload(RegisterRef::new(0, 0), 42)
        .expect("zero register exists");
    assert_eq!(bank.snapshot(0), Some(vec![0, 0, 42, 0]));
    assert_eq!(bank.snapshot(1), None);
}
