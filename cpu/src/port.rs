//! Data ports connect a CPU to the bus.
//!
//! The control unit fetches instructions through a port, and load /
//! store functors use the same port for data.
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::thread;

use tracing::{event, Level};

use base::{Address, Packet, Payload, PayloadKind, StopSignal};
use bus::Root;

use super::error::PortError;

fn expect_kind(address: Address, payload: Payload, expected: PayloadKind) -> Result<u64, PortError> {
    if payload.is_invalid_address() {
        return Err(PortError::InvalidAddress(address));
    }
    match payload.value() {
        Some(v) if payload.kind() == expected => Ok(v),
        _ => Err(PortError::UnexpectedPayload {
            address,
            expected,
            found: payload.kind(),
        }),
    }
}

pub trait DataPort: Send + Sync {
    /// Reads a value of the given width.  The returned payload has
    /// whatever type the responder chose.
    fn read(&self, address: Address, kind: PayloadKind) -> Result<Payload, PortError>;

    /// Posts a write; no response is awaited.
    fn write(&self, address: Address, payload: Payload) -> Result<(), PortError>;

    fn read8(&self, address: Address) -> Result<u8, PortError> {
        let v = expect_kind(address, self.read(address, PayloadKind::X8)?, PayloadKind::X8)?;
        Ok(v as u8)
    }

    fn read16(&self, address: Address) -> Result<u16, PortError> {
        let v = expect_kind(address, self.read(address, PayloadKind::X16)?, PayloadKind::X16)?;
        Ok(v as u16)
    }

    fn read32(&self, address: Address) -> Result<u32, PortError> {
        let v = expect_kind(address, self.read(address, PayloadKind::X32)?, PayloadKind::X32)?;
        Ok(v as u32)
    }

    fn read64(&self, address: Address) -> Result<u64, PortError> {
        expect_kind(address, self.read(address, PayloadKind::X64)?, PayloadKind::X64)
    }

    fn write8(&self, address: Address, value: u8) -> Result<(), PortError> {
        self.write(address, Payload::X8(value))
    }

    fn write16(&self, address: Address, value: u16) -> Result<(), PortError> {
        self.write(address, Payload::X16(value))
    }

    fn write32(&self, address: Address, value: u32) -> Result<(), PortError> {
        self.write(address, Payload::X32(value))
    }

    fn write64(&self, address: Address, value: u64) -> Result<(), PortError> {
        self.write(address, Payload::X64(value))
    }
}

/// A data port backed by a bus root.  Reads block (spinning) until
/// the response arrives or the machine is stopped.
pub struct BusPort {
    root: Arc<dyn Root>,
    stop: StopSignal,
}

impl BusPort {
    #[must_use]
    pub fn new(root: Arc<dyn Root>, stop: StopSignal) -> BusPort {
        BusPort { root, stop }
    }
}

impl DataPort for BusPort {
    fn read(&self, address: Address, kind: PayloadKind) -> Result<Payload, PortError> {
        self.root.send_request(Packet::read(address, kind));
        loop {
            if let Some(response) = self.root.poll_response() {
                event!(Level::TRACE, "port read {}", response);
                return Ok(response.payload);
            }
            if self.stop.is_stopped() {
                return Err(PortError::Interrupted(address));
            }
            thread::yield_now();
        }
    }

    fn write(&self, address: Address, payload: Payload) -> Result<(), PortError> {
        self.root.send_request(Packet::write(address, payload));
        Ok(())
    }
}

impl Debug for BusPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusPort")
            .field("stopped", &self.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

#[test]
fn test_bus_port_read_and_write() {
    use bus::{CpuGate, DeviceGate, Endpoint, Slave};

    let device = Arc::new(DeviceGate::new());
    let root = Arc::new(CpuGate::new(Arc::clone(&device) as Arc<dyn Slave>));
    let port = BusPort::new(root, StopSignal::new());

    port.write16(0x10, 0xbeef).expect("writes are posted");
    let write = device.next_request().expect("write reaches device");
    assert_eq!(write.payload, Payload::X16(0xbeef));

    let responder = {
        let device = Arc::clone(&device);
        thread::spawn(move || loop {
            if let Some(request) = device.next_request() {
                device.respond(request.respond_with(Payload::X32(0x1234_5678)));
                return;
            }
            thread::yield_now();
        })
    };
    assert_eq!(port.read32(0x20), Ok(0x1234_5678));
    responder.join().expect("responder thread");
}

#[test]
fn test_bus_port_reports_invalid_address_and_wrong_width() {
    use bus::{CpuGate, DeviceGate, Endpoint, Slave};

    let device = Arc::new(DeviceGate::new());
    let root = Arc::new(CpuGate::new(Arc::clone(&device) as Arc<dyn Slave>));
    let port = BusPort::new(root, StopSignal::new());

    let responder = {
        let device = Arc::clone(&device);
        thread::spawn(move || {
            let mut answered = 0;
            while answered < 2 {
                if let Some(request) = device.next_request() {
                    let payload = if answered == 0 {
                        Payload::InvalidAddress
                    } else {
                        Payload::X8(1)
                    };
                    device.respond(request.respond_with(payload));
                    answered += 1;
                }
                thread::yield_now();
            }
        })
    };
    assert_eq!(port.read32(0x40), Err(PortError::InvalidAddress(0x40)));
    assert_eq!(
        port.read32(0x44),
        Err(PortError::UnexpectedPayload {
            address: 0x44,
            expected: PayloadKind::X32,
            found: PayloadKind::X8
        })
    );
    responder.join().expect("responder thread");
}

#[test]
fn test_bus_port_read_is_interrupted_by_stop() {
    use bus::{CpuGate, DeviceGate, Slave};

    let device = Arc::new(DeviceGate::new());
    let root = Arc::new(CpuGate::new(Arc::clone(&device) as Arc<dyn Slave>));
    let stop = StopSignal::new();
    stop.request_stop();
    let port = BusPort::new(root, stop);
    assert_eq!(port.read8(0x3), Err(PortError::Interrupted(0x3)));
}
