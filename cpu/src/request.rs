use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use super::arbiter::Ticket;
use super::error::OperandError;
use super::registers::{RegisterBank, RegisterRef};

/// The registers one instruction names: an optional destination
/// (`rd`) and the source operands, numbered from 1.  Membership is
/// fixed once the set is built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterSet {
    destination: Option<RegisterRef>,
    sources: Vec<RegisterRef>,
}

impl RegisterSet {
    #[must_use]
    pub fn new(destination: Option<RegisterRef>, sources: Vec<RegisterRef>) -> RegisterSet {
        RegisterSet {
            destination,
            sources,
        }
    }

    pub fn destination(&self) -> Result<RegisterRef, OperandError> {
        self.destination.ok_or(OperandError::NoDestination)
    }

    /// Source operand `n`, counting from 1.
    pub fn source(&self, n: usize) -> Result<RegisterRef, OperandError> {
        if n == 0 {
            return Err(OperandError::ZeroSourceIndex);
        }
        self.sources
            .get(n - 1)
            .copied()
            .ok_or(OperandError::NoSource(n))
    }

    #[must_use]
    pub fn has_destination(&self) -> bool {
        self.destination.is_some()
    }

    #[must_use]
    pub fn has_source(&self, n: usize) -> bool {
        n != 0 && n <= self.sources.len()
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// All registers in index order: destination first, then the
    /// sources.
    pub fn iter(&self) -> impl Iterator<Item = RegisterRef> + '_ {
        self.destination.iter().chain(self.sources.iter()).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.destination.is_some()) + self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A claim on the registers of a [`RegisterSet`].
///
/// The request is ready once every register in the set has been lent
/// to it.  A request which was never submitted is never ready.
/// Requests cannot be cloned, since each one stands for a unique
/// claim; dropping a request which still holds registers releases
/// them.
pub struct RegisterRequest {
    bank: Arc<RegisterBank>,
    set: RegisterSet,
    ticket: Option<Ticket>,
}

impl RegisterRequest {
    #[must_use]
    pub fn new(bank: Arc<RegisterBank>, set: RegisterSet) -> RegisterRequest {
        RegisterRequest {
            bank,
            set,
            ticket: None,
        }
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterSet {
        &self.set
    }

    #[must_use]
    pub fn bank(&self) -> &Arc<RegisterBank> {
        &self.bank
    }

    /// Hands the request to its bank's arbitration engine.
    pub fn submit(&mut self) {
        let bank = Arc::clone(&self.bank);
        bank.submit(self);
    }

    pub fn release(&mut self) {
        let bank = Arc::clone(&self.bank);
        bank.release(self);
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.ticket.is_some()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.bank.is_ready(self)
    }

    #[must_use]
    pub fn is_requested(&self, reg: RegisterRef) -> bool {
        self.set.iter().any(|r| r == reg)
    }

    #[must_use]
    pub fn is_borrowed(&self, reg: RegisterRef) -> bool {
        self.bank.is_borrowed(self, reg)
    }

    pub(crate) fn ticket(&self) -> Option<Ticket> {
        self.ticket
    }

    pub(crate) fn set_ticket(&mut self, ticket: Ticket) {
        self.ticket = Some(ticket);
    }

    pub(crate) fn take_ticket(&mut self) -> Option<Ticket> {
        self.ticket.take()
    }
}

impl Drop for RegisterRequest {
    fn drop(&mut self) {
        if self.ticket.is_some() {
            self.release();
        }
    }
}

impl Debug for RegisterRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("set", &self.set)
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
fn bank(count: usize) -> Arc<RegisterBank> {
    use super::registers::RegisterFile;
    Arc::new(RegisterBank::new(vec![RegisterFile::new("x", count, Some(0))]))
}

#[test]
fn test_register_set_accessors() {
    let set = RegisterSet::new(
        Some(RegisterRef::new(0, 5)),
        vec![RegisterRef::new(0, 1), RegisterRef::new(0, 2)],
    );
    assert_eq!(set.destination(), Ok(RegisterRef::new(0, 5)));
    assert_eq!(set.source(0), Err(OperandError::ZeroSourceIndex));
    assert_eq!(set.source(1), Ok(RegisterRef::new(0, 1)));
    assert_eq!(set.source(2), Ok(RegisterRef::new(0, 2)));
    assert_eq!(set.source(3), Err(OperandError::NoSource(3)));
    assert!(!set.has_source(0));
    assert!(set.has_source(2));
    assert!(!set.has_source(3));
    assert_eq!(set.source_count(), 2);
    assert_eq!(set.len(), 3);
    assert_eq!(
        set.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![5, 1, 2]
    );
}

#[test]
fn test_register_set_without_destination() {
    let set = RegisterSet::new(None, vec![RegisterRef::new(0, 3)]);
    assert_eq!(set.destination(), Err(OperandError::NoDestination));
    assert!(!set.has_destination());
    assert_eq!(set.len(), 1);
    assert_eq!(set.iter().collect::<Vec<_>>(), vec![RegisterRef::new(0, 3)]);
}

#[test]
fn test_request_lifecycle() {
    let bank = bank(8);
    let set = RegisterSet::new(Some(RegisterRef::new(0, 1)), vec![RegisterRef::new(0, 2)]);
    let mut request = RegisterRequest::new(Arc::clone(&bank), set);
    assert!(!request.is_ready());
    assert!(request.is_requested(RegisterRef::new(0, 2)));
    assert!(!request.is_requested(RegisterRef::new(0, 3)));

    request.submit();
    assert!(request.is_submitted());
    assert!(request.is_ready());
    assert!(request.is_borrowed(RegisterRef::new(0, 1)));
    assert!(bank.is_locked(RegisterRef::new(0, 2)));

    request.release();
    assert!(!request.is_ready());
    assert!(!bank.is_locked(RegisterRef::new(0, 1)));
    assert!(!bank.is_locked(RegisterRef::new(0, 2)));
}

#[test]
fn test_drop_releases_registers() {
    let bank = bank(8);
    let reg = RegisterRef::new(0, 4);
    let mut first = RegisterRequest::new(Arc::clone(&bank), RegisterSet::new(Some(reg), vec![]));
    first.submit();
    let mut second = RegisterRequest::new(Arc::clone(&bank), RegisterSet::new(None, vec![reg]));
    second.submit();
    assert!(!second.is_ready());
    drop(first);
    assert!(second.is_ready());
    drop(second);
    assert!(!bank.is_locked(reg));
}
