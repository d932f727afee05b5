//! Bus packets.
//!
//! A packet is a request (from a root towards an endpoint) or a
//! response (travelling back).  Both directions use the same shape;
//! the queue a packet sits in says which way it is going.

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use super::switchctx::SwitchContext;
use super::types::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    Read,
    Write,
    Atomic,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Read => "READ",
            Operation::Write => "WRITE",
            Operation::Atomic => "ATOMIC",
        })
    }
}

/// The type of a payload, without its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PayloadKind {
    X8,
    X16,
    X32,
    X64,
    /// The sentinel answer to a request nobody could serve.
    InvalidAddress,
}

impl PayloadKind {
    /// Width of the payload in bytes.  The invalid-address sentinel
    /// carries no data.
    #[must_use]
    pub const fn width(&self) -> u32 {
        match self {
            PayloadKind::X8 => 1,
            PayloadKind::X16 => 2,
            PayloadKind::X32 => 4,
            PayloadKind::X64 => 8,
            PayloadKind::InvalidAddress => 0,
        }
    }

    #[must_use]
    pub const fn type_id(&self) -> &'static str {
        match self {
            PayloadKind::X8 => "_X8",
            PayloadKind::X16 => "_X16",
            PayloadKind::X32 => "_X32",
            PayloadKind::X64 => "_X64",
            PayloadKind::InvalidAddress => "OOPS",
        }
    }
}

impl Display for PayloadKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_id())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Payload {
    X8(u8),
    X16(u16),
    X32(u32),
    X64(u64),
    InvalidAddress,
}

impl Payload {
    /// Marker value of the invalid-address sentinel, for log output.
    pub const INVALID_ADDRESS_MARKER: u32 = 0x5350_4f4f;

    /// A zero-valued payload of the given kind; this is what a read
    /// request carries.
    #[must_use]
    pub const fn zero(kind: PayloadKind) -> Payload {
        match kind {
            PayloadKind::X8 => Payload::X8(0),
            PayloadKind::X16 => Payload::X16(0),
            PayloadKind::X32 => Payload::X32(0),
            PayloadKind::X64 => Payload::X64(0),
            PayloadKind::InvalidAddress => Payload::InvalidAddress,
        }
    }

    /// Builds a payload of `kind` from the low bytes of `value`.
    #[must_use]
    pub const fn truncated(kind: PayloadKind, value: u64) -> Payload {
        match kind {
            PayloadKind::X8 => Payload::X8(value as u8),
            PayloadKind::X16 => Payload::X16(value as u16),
            PayloadKind::X32 => Payload::X32(value as u32),
            PayloadKind::X64 => Payload::X64(value),
            PayloadKind::InvalidAddress => Payload::InvalidAddress,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Payload::X8(_) => PayloadKind::X8,
            Payload::X16(_) => PayloadKind::X16,
            Payload::X32(_) => PayloadKind::X32,
            Payload::X64(_) => PayloadKind::X64,
            Payload::InvalidAddress => PayloadKind::InvalidAddress,
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.kind().width()
    }

    /// The value zero-extended to 64 bits, or `None` for the
    /// invalid-address sentinel.
    #[must_use]
    pub const fn value(&self) -> Option<u64> {
        match self {
            Payload::X8(v) => Some(*v as u64),
            Payload::X16(v) => Some(*v as u64),
            Payload::X32(v) => Some(*v as u64),
            Payload::X64(v) => Some(*v),
            Payload::InvalidAddress => None,
        }
    }

    #[must_use]
    pub const fn is_invalid_address(&self) -> bool {
        matches!(self, Payload::InvalidAddress)
    }
}

impl Display for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(v) => write!(f, "{}:{:#x}", self.kind(), v),
            None => write!(f, "{}:{:#x}", self.kind(), Payload::INVALID_ADDRESS_MARKER),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Packet {
    pub operation: Operation,
    pub address: Address,
    pub payload: Payload,
    pub switch_context: SwitchContext,
}

impl Packet {
    #[must_use]
    pub fn new(operation: Operation, address: Address, payload: Payload) -> Packet {
        Packet {
            operation,
            address,
            payload,
            switch_context: SwitchContext::new(),
        }
    }

    #[must_use]
    pub fn read(address: Address, kind: PayloadKind) -> Packet {
        Packet::new(Operation::Read, address, Payload::zero(kind))
    }

    #[must_use]
    pub fn write(address: Address, payload: Payload) -> Packet {
        Packet::new(Operation::Write, address, payload)
    }

    /// Builds the response to this request: same operation, address
    /// and reverse path, new payload.
    #[must_use]
    pub fn respond_with(&self, payload: Payload) -> Packet {
        Packet {
            operation: self.operation,
            address: self.address,
            payload,
            switch_context: self.switch_context,
        }
    }
}

/// Packets compare equal when operation, address and payload match;
/// the reverse path is routing state, not content.
impl PartialEq for Packet {
    fn eq(&self, other: &Packet) -> bool {
        self.operation == other.operation
            && self.address == other.address
            && self.payload == other.payload
    }
}

impl Eq for Packet {}

impl Display for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:#010x} {} via {:?}",
            self.operation, self.address, self.payload, self.switch_context
        )
    }
}

#[test]
fn test_widths() {
    assert_eq!(Payload::X8(1).width(), 1);
    assert_eq!(Payload::X16(1).width(), 2);
    assert_eq!(Payload::X32(1).width(), 4);
    assert_eq!(Payload::X64(1).width(), 8);
    assert_eq!(Payload::InvalidAddress.width(), 0);
}

#[test]
fn test_truncated() {
    assert_eq!(
        Payload::truncated(PayloadKind::X16, 0x1234_5678),
        Payload::X16(0x5678)
    );
    assert_eq!(
        Payload::truncated(PayloadKind::X8, 0x1ff),
        Payload::X8(0xff)
    );
}

#[test]
fn test_response_keeps_reverse_path() {
    let mut request = Packet::read(0x40, PayloadKind::X32);
    request.switch_context.push(5).expect("push");
    let response = request.respond_with(Payload::X32(9));
    assert_eq!(response.address, 0x40);
    assert_eq!(response.switch_context.top(), Some(5));
    assert_ne!(response, request);
}

#[test]
fn test_equality_ignores_switch_context() {
    let a = Packet::write(8, Payload::X8(1));
    let mut b = a.clone();
    b.switch_context.push(1).expect("push");
    assert_eq!(a, b);
}

#[test]
fn test_packet_serializes() {
    let p = Packet::read(0x10, PayloadKind::X16);
    let json = serde_json::to_string(&p).expect("packets should serialize");
    assert!(json.contains("\"Read\""));
    assert!(json.contains("\"address\":16"));
}
