use tracing::{event, Level};

use base::{Packet, Payload};

use super::error::BusError;
use super::gate::DeviceGate;
use super::roles::{Endpoint, Slave, Transfer};

/// Answers every request with the invalid-address sentinel.  This is
/// what a switch forwards to when no range matches.
#[derive(Debug)]
pub struct DefaultDevice {
    name: String,
    gate: DeviceGate,
}

impl DefaultDevice {
    #[must_use]
    pub fn new(name: &str) -> DefaultDevice {
        DefaultDevice {
            name: name.to_string(),
            gate: DeviceGate::new(),
        }
    }
}

impl Slave for DefaultDevice {
    fn accept_request(&self, packet: Packet) {
        self.gate.accept_request(packet);
    }

    fn take_response(&self, accept: &dyn Fn(&Packet) -> bool) -> Option<Packet> {
        self.gate.take_response(accept)
    }
}

impl Transfer for DefaultDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn transfer(&self) -> Result<(), BusError> {
        if let Some(request) = self.gate.next_request() {
            event!(
                Level::DEBUG,
                "{}: no device at {:#010x}, answering {}",
                self.name,
                request.address,
                Payload::InvalidAddress.kind()
            );
            self.gate.respond(request.respond_with(Payload::InvalidAddress));
        }
        Ok(())
    }
}

#[test]
fn test_answers_with_sentinel() {
    use base::{Operation, PayloadKind};

    let dev = DefaultDevice::new("nowhere");
    let mut request = Packet::read(0x1234, PayloadKind::X32);
    request.switch_context.push(4).expect("push");
    dev.accept_request(request);
    assert_eq!(dev.take_response(&|_| true), None);
    dev.transfer().expect("default device transfer cannot fail");
    let response = dev
        .take_response(&|_| true)
        .expect("response should be waiting");
    assert_eq!(response.operation, Operation::Read);
    assert_eq!(response.address, 0x1234);
    assert!(response.payload.is_invalid_address());
    assert_eq!(response.switch_context.top(), Some(4));
}

#[test]
fn test_answers_writes_too() {
    let dev = DefaultDevice::new("nowhere");
    dev.accept_request(Packet::write(8, Payload::X8(1)));
    dev.transfer().expect("transfer");
    assert!(dev
        .take_response(&|_| true)
        .is_some_and(|p| p.payload.is_invalid_address()));
}
