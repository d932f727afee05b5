//! The switch context is the reverse path of a packet.
//!
//! Every switch a request passes through pushes its own identifier.
//! When the response comes back, each switch only accepts packets
//! whose top identifier is its own, and pops it before forwarding the
//! response upstream.  The stack is bounded; a machine whose switch
//! tree is deeper than [`MAX_SWITCH_DEPTH`] is misconfigured.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// Identifies one switch within a machine.
pub type SwitchId = u8;

pub const MAX_SWITCH_DEPTH: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchContextError {
    /// Pushing would exceed [`MAX_SWITCH_DEPTH`].
    Overflow(SwitchId),
    /// Popping an empty stack.
    Empty(SwitchId),
    /// The top of the stack belongs to a different switch.
    Mismatch { expected: SwitchId, found: SwitchId },
}

impl Display for SwitchContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SwitchContextError::Overflow(id) => write!(
                f,
                "switch {id} cannot push onto a switch context which already holds {MAX_SWITCH_DEPTH} entries"
            ),
            SwitchContextError::Empty(id) => {
                write!(f, "switch {id} attempted to pop from an empty switch context")
            }
            SwitchContextError::Mismatch { expected, found } => write!(
                f,
                "switch {expected} attempted to pop a switch context whose top belongs to switch {found}"
            ),
        }
    }
}

impl Error for SwitchContextError {}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SwitchContext {
    ids: [SwitchId; MAX_SWITCH_DEPTH],
    depth: u8,
}

impl SwitchContext {
    #[must_use]
    pub fn new() -> SwitchContext {
        SwitchContext::default()
    }

    pub fn push(&mut self, id: SwitchId) -> Result<(), SwitchContextError> {
        let depth = usize::from(self.depth);
        if depth >= MAX_SWITCH_DEPTH {
            return Err(SwitchContextError::Overflow(id));
        }
        self.ids[depth] = id;
        self.depth += 1;
        Ok(())
    }

    /// Pops the top entry, which must be `id`.
    pub fn pop(&mut self, id: SwitchId) -> Result<(), SwitchContextError> {
        match self.top() {
            None => Err(SwitchContextError::Empty(id)),
            Some(found) if found != id => Err(SwitchContextError::Mismatch {
                expected: id,
                found,
            }),
            Some(_) => {
                self.depth -= 1;
                self.ids[usize::from(self.depth)] = 0;
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn top(&self) -> Option<SwitchId> {
        self.as_slice().last().copied()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        usize::from(self.depth)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Switch identifiers from the outermost (first pushed) to the
    /// innermost.
    #[must_use]
    pub fn as_slice(&self) -> &[SwitchId] {
        &self.ids[..usize::from(self.depth)]
    }
}

impl fmt::Debug for SwitchContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[test]
fn test_push_pop() {
    let mut ctx = SwitchContext::new();
    assert_eq!(ctx.top(), None);
    ctx.push(3).expect("push onto empty context");
    ctx.push(7).expect("push onto context of depth 1");
    assert_eq!(ctx.top(), Some(7));
    assert_eq!(ctx.as_slice(), &[3, 7]);
    assert_eq!(
        ctx.pop(3),
        Err(SwitchContextError::Mismatch {
            expected: 3,
            found: 7
        })
    );
    assert_eq!(ctx.pop(7), Ok(()));
    assert_eq!(ctx.pop(3), Ok(()));
    assert!(ctx.is_empty());
    assert_eq!(ctx.pop(3), Err(SwitchContextError::Empty(3)));
}

#[test]
fn test_overflow() {
    let mut ctx = SwitchContext::new();
    for id in 1..=8 {
        ctx.push(id).expect("context should hold eight entries");
    }
    assert_eq!(ctx.depth(), MAX_SWITCH_DEPTH);
    assert_eq!(ctx.push(9), Err(SwitchContextError::Overflow(9)));
    assert_eq!(ctx.top(), Some(8));
}

#[test]
fn test_equality_ignores_popped_entries() {
    let mut a = SwitchContext::new();
    a.push(1).expect("push");
    a.push(2).expect("push");
    a.pop(2).expect("pop");
    let mut b = SwitchContext::new();
    b.push(1).expect("push");
    assert_eq!(a, b);
}
