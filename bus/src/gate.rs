//! Gates are the queue pairs at the edges of the fabric.
//!
//! A [`DeviceGate`] sits in front of a device: the bus side sees it
//! as a [`Slave`], the device side as an [`Endpoint`].  A [`CpuGate`]
//! is the CPU side of the bus, a [`Root`] which forwards requests to
//! a single slave.
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{event, Level};

use base::{Address, Operation, Packet};

use super::queue::PacketQueue;
use super::roles::{Endpoint, Root, Slave};

#[derive(Debug, Default)]
pub struct DeviceGate {
    /// Requests travelling towards the device.
    requests: PacketQueue,
    /// Responses travelling back towards the master.
    responses: PacketQueue,
}

impl DeviceGate {
    #[must_use]
    pub fn new() -> DeviceGate {
        DeviceGate::default()
    }

    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }
}

impl Slave for DeviceGate {
    fn accept_request(&self, packet: Packet) {
        self.requests.push(packet);
    }

    fn take_response(&self, accept: &dyn Fn(&Packet) -> bool) -> Option<Packet> {
        self.responses.pop_if(|p| accept(p))
    }
}

impl Endpoint for DeviceGate {
    fn next_request(&self) -> Option<Packet> {
        self.requests.pop()
    }

    fn respond(&self, packet: Packet) {
        self.responses.push(packet);
    }
}

/// The master end of the bus for one CPU port.
///
/// Responses are matched to requests by address alone.  This only
/// works with a single read in flight, which is how the CPU port
/// uses it; a packet does not carry an originator tag.
///
/// Writes are posted, so the only answer a write ever gets is the
/// invalid-address sentinel from a default device.  Nobody waits for
/// it, and since responses are only taken from the front of a queue
/// it would hold up every response behind it; the gate discards such
/// answers whenever it polls.
pub struct CpuGate {
    slave: Arc<dyn Slave>,
    awaiting: Mutex<Option<Address>>,
}

impl CpuGate {
    #[must_use]
    pub fn new(slave: Arc<dyn Slave>) -> CpuGate {
        CpuGate {
            slave,
            awaiting: Mutex::new(None),
        }
    }
}

impl Debug for CpuGate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuGate")
            .field(
                "awaiting",
                &*self.awaiting.lock().unwrap_or_else(PoisonError::into_inner),
            )
            .finish_non_exhaustive()
    }
}

impl Root for CpuGate {
    fn send_request(&self, packet: Packet) {
        if packet.operation == Operation::Read {
            *self.awaiting.lock().unwrap_or_else(PoisonError::into_inner) = Some(packet.address);
        }
        event!(Level::TRACE, "root sends {}", packet);
        self.slave.accept_request(packet);
    }

    fn poll_response(&self) -> Option<Packet> {
        while let Some(orphan) = self
            .slave
            .take_response(&|p| p.operation == Operation::Write)
        {
            event!(Level::DEBUG, "root discards answer to posted write: {}", orphan);
        }
        let awaiting = *self.awaiting.lock().unwrap_or_else(PoisonError::into_inner);
        let address = awaiting?;
        self.slave.take_response(&|p| p.address == address)
    }
}

#[test]
fn test_device_gate_directions() {
    use base::{Payload, PayloadKind};

    let gate = DeviceGate::new();
    gate.accept_request(Packet::read(4, PayloadKind::X32));
    assert_eq!(gate.pending_requests(), 1);
    assert_eq!(gate.take_response(&|_| true), None);

    let request = gate.next_request().expect("request should be waiting");
    gate.respond(request.respond_with(Payload::X32(0xabcd)));
    assert_eq!(gate.next_request(), None);
    assert_eq!(gate.take_response(&|p| p.address == 8), None);
    let response = gate
        .take_response(&|p| p.address == 4)
        .expect("response should be waiting");
    assert_eq!(response.payload, Payload::X32(0xabcd));
}

#[test]
fn test_cpu_gate_matches_last_read_address() {
    use base::{Payload, PayloadKind};

    let device = Arc::new(DeviceGate::new());
    let root = CpuGate::new(Arc::clone(&device) as Arc<dyn Slave>);
    assert_eq!(root.poll_response(), None);

    root.send_request(Packet::read(0x20, PayloadKind::X16));
    let request = device.next_request().expect("request should reach the device");
    assert_eq!(root.poll_response(), None);

    device.respond(request.respond_with(Payload::X16(7)));
    let response = root.poll_response().expect("response should match");
    assert_eq!(response.payload, Payload::X16(7));
}

#[test]
fn test_cpu_gate_write_does_not_change_awaited_address() {
    use base::{Payload, PayloadKind};

    let device = Arc::new(DeviceGate::new());
    let root = CpuGate::new(Arc::clone(&device) as Arc<dyn Slave>);
    root.send_request(Packet::read(0x10, PayloadKind::X8));
    root.send_request(Packet::write(0x30, Payload::X8(1)));
    let read = device.next_request().expect("read should arrive first");
    assert_eq!(read.operation, Operation::Read);
    device.respond(read.respond_with(Payload::X8(5)));
    assert_eq!(
        root.poll_response().map(|p| p.payload),
        Some(Payload::X8(5))
    );
}

#[test]
fn test_cpu_gate_discards_answers_to_writes() {
    use base::{Payload, PayloadKind};

    let device = Arc::new(DeviceGate::new());
    let root = CpuGate::new(Arc::clone(&device) as Arc<dyn Slave>);
    root.send_request(Packet::write(0x40, Payload::X32(9)));
    root.send_request(Packet::read(0x44, PayloadKind::X32));
    let write = device.next_request().expect("write should arrive first");
    let read = device.next_request().expect("read should follow");
    // The answer to the write sits in front of the one the root wants.
    device.respond(write.respond_with(Payload::InvalidAddress));
    device.respond(read.respond_with(Payload::X32(0x55)));
    assert_eq!(
        root.poll_response().map(|p| p.payload),
        Some(Payload::X32(0x55))
    );
    assert_eq!(device.pending_responses(), 0);
}
