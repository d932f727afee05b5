//! Register ownership arbitration.
//!
//! Every submitted request gets a [`Ticket`] and a claim: one handle
//! per register it names, each with its own borrowed / acquired
//! state.  A request is ready once all of its handles are borrowed.
//!
//! Submitting lends each register which is free right now.  Handles
//! in the same request naming the same register share one lend, so
//! a request never waits for itself.  A request which is not ready
//! goes to the back of the waiting list.
//!
//! Releasing walks the waiting list from the front and hands each
//! register of the releasing request to the first waiter needing it
//! (every handle of that waiter naming the register receives it
//! together).  Waiters which become ready leave the list.  Whatever
//! nobody was waiting for goes back to the file.
//!
//! The policy is FIFO-biased but not fair: a request needing many
//! registers can be overtaken indefinitely by requests needing few.
//!
//! None of this locks anything itself; the caller holds the bank lock.
use std::collections::{BTreeMap, VecDeque};

use tracing::{event, Level};

use super::registers::{RegisterFile, RegisterRef};

#[cfg(test)]
mod tests;

pub type Ticket = u64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandleState {
    /// The holder may read and write the register.
    pub borrowed: bool,
    /// The lend has been given back (or handed on); the handle is
    /// inert.
    pub acquired: bool,
}

#[derive(Debug)]
struct Claim {
    handles: Vec<(RegisterRef, HandleState)>,
}

impl Claim {
    fn is_ready(&self) -> bool {
        self.handles.iter().all(|(_, s)| s.borrowed)
    }

    fn holds(&self, reg: RegisterRef) -> bool {
        self.handles.iter().any(|(r, s)| *r == reg && s.borrowed)
    }

    fn holds_nothing(&self) -> bool {
        self.handles.iter().all(|(_, s)| !s.borrowed)
    }

    /// Hands every register `self` holds and `to` still needs over to
    /// `to`.  Ownership moves without the file ever seeing the
    /// register unlocked.
    fn hand_over(&mut self, to: &mut Claim) {
        for i in 0..self.handles.len() {
            let (reg, state) = self.handles[i];
            if !state.borrowed {
                continue;
            }
            let mut taken = false;
            for (r, s) in to.handles.iter_mut() {
                if *r == reg && !s.borrowed {
                    s.borrowed = true;
                    taken = true;
                }
            }
            if taken {
                for (r, s) in self.handles.iter_mut() {
                    if *r == reg {
                        s.borrowed = false;
                        s.acquired = true;
                    }
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Arbiter {
    next_ticket: Ticket,
    claims: BTreeMap<Ticket, Claim>,
    waiting: VecDeque<Ticket>,
}

impl Arbiter {
    pub(crate) fn new() -> Arbiter {
        Arbiter::default()
    }

    pub(crate) fn submit(&mut self, files: &mut [RegisterFile], regs: &[RegisterRef]) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let mut claimed: Vec<RegisterRef> = Vec::with_capacity(regs.len());
        let mut handles = Vec::with_capacity(regs.len());
        for &reg in regs {
            let mut state = HandleState::default();
            if claimed.contains(&reg) {
                state.borrowed = true;
            } else if let Some(file) = files.get_mut(reg.file) {
                if !file.is_locked(reg.id) {
                    file.lend(reg.id);
                    state.borrowed = true;
                    claimed.push(reg);
                }
            }
            handles.push((reg, state));
        }
        let claim = Claim { handles };
        if !claim.is_ready() {
            event!(
                Level::TRACE,
                "request {} waits; holds {:?}",
                ticket,
                claim.handles
            );
            self.waiting.push_back(ticket);
        }
        self.claims.insert(ticket, claim);
        ticket
    }

    pub(crate) fn release(&mut self, files: &mut [RegisterFile], ticket: Ticket) {
        let Some(mut releasing) = self.claims.remove(&ticket) else {
            return;
        };
        // Releasing a request which never became ready is allowed; it
        // simply stops waiting.
        self.waiting.retain(|t| *t != ticket);

        let mut pos = 0;
        while pos < self.waiting.len() && !releasing.holds_nothing() {
            let waiter = self.waiting[pos];
            let Some(claim) = self.claims.get_mut(&waiter) else {
                self.waiting.remove(pos);
                continue;
            };
            releasing.hand_over(claim);
            if claim.is_ready() {
                event!(Level::TRACE, "request {} is ready after {} released", waiter, ticket);
                self.waiting.remove(pos);
            } else {
                pos += 1;
            }
        }

        for (reg, state) in releasing.handles.iter_mut() {
            if state.borrowed {
                if let Some(file) = files.get_mut(reg.file) {
                    file.reclaim(reg.id);
                }
            }
            state.borrowed = false;
            state.acquired = true;
        }
    }

    pub(crate) fn is_ready(&self, ticket: Ticket) -> bool {
        self.claims.get(&ticket).is_some_and(Claim::is_ready)
    }

    pub(crate) fn holds(&self, ticket: Ticket, reg: RegisterRef) -> bool {
        self.claims.get(&ticket).is_some_and(|c| c.holds(reg))
    }

    pub(crate) fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    #[cfg(test)]
    pub(crate) fn handle_states(&self, ticket: Ticket) -> Vec<HandleState> {
        self.claims
            .get(&ticket)
            .map(|c| c.handles.iter().map(|(_, s)| *s).collect())
            .unwrap_or_default()
    }
}
