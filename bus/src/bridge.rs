use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use tracing::{event, Level};

use base::{Packet, Payload};

use super::error::BusError;
use super::gate::DeviceGate;
use super::roles::{Endpoint, Slave, Transfer};

/// A function applied to the payload of every packet crossing a
/// bridge, in both directions.
pub type PayloadTransform = Box<dyn Fn(Payload) -> Payload + Send + Sync>;

/// Forwards everything to one fixed downstream slave.  A bridge does
/// not touch the switch context or the address.
pub struct Bridge {
    name: String,
    upstream: DeviceGate,
    downstream: Arc<dyn Slave>,
    transform: Option<PayloadTransform>,
}

impl Bridge {
    #[must_use]
    pub fn new(name: &str, downstream: Arc<dyn Slave>) -> Bridge {
        Bridge {
            name: name.to_string(),
            upstream: DeviceGate::new(),
            downstream,
            transform: None,
        }
    }

    /// Looks up one of the stock transforms by name.  `byte-swap`
    /// reverses the byte order of every value, which makes a bridge
    /// between a little-endian and a big-endian part of a machine.
    #[must_use]
    pub fn named_transform(name: &str) -> Option<PayloadTransform> {
        match name {
            "byte-swap" => Some(Box::new(|payload| match payload {
                Payload::X8(v) => Payload::X8(v),
                Payload::X16(v) => Payload::X16(v.swap_bytes()),
                Payload::X32(v) => Payload::X32(v.swap_bytes()),
                Payload::X64(v) => Payload::X64(v.swap_bytes()),
                Payload::InvalidAddress => Payload::InvalidAddress,
            })),
            _ => None,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: PayloadTransform) -> Bridge {
        self.transform = Some(transform);
        self
    }

    fn apply(&self, mut packet: Packet) -> Packet {
        if let Some(transform) = &self.transform {
            if !packet.payload.is_invalid_address() {
                packet.payload = transform(packet.payload);
            }
        }
        packet
    }
}

impl Slave for Bridge {
    fn accept_request(&self, packet: Packet) {
        self.upstream.accept_request(packet);
    }

    fn take_response(&self, accept: &dyn Fn(&Packet) -> bool) -> Option<Packet> {
        self.upstream.take_response(accept)
    }
}

impl Transfer for Bridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn transfer(&self) -> Result<(), BusError> {
        if let Some(request) = self.upstream.next_request() {
            event!(Level::TRACE, "bridge {} forwards {}", self.name, request);
            self.downstream.accept_request(self.apply(request));
        }
        if let Some(response) = self.downstream.take_response(&|_| true) {
            self.upstream.respond(self.apply(response));
        }
        Ok(())
    }
}

impl Debug for Bridge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.name)
            .field("upstream", &self.upstream)
            .field("has_transform", &self.transform.is_some())
            .finish_non_exhaustive()
    }
}

#[test]
fn test_bridge_forwards_both_ways() {
    use base::PayloadKind;

    let device = Arc::new(DeviceGate::new());
    let bridge = Bridge::new("b", Arc::clone(&device) as Arc<dyn Slave>);
    bridge.accept_request(Packet::read(0x40, PayloadKind::X32));
    bridge.transfer().expect("transfer");
    let request = device.next_request().expect("request crosses the bridge");
    assert_eq!(request.address, 0x40);
    device.respond(request.respond_with(Payload::X32(3)));
    bridge.transfer().expect("transfer");
    let response = bridge
        .take_response(&|_| true)
        .expect("response crosses back");
    assert_eq!(response.payload, Payload::X32(3));
}

#[test]
fn test_bridge_transform() {
    use base::PayloadKind;

    let device = Arc::new(DeviceGate::new());
    let swap = Bridge::named_transform("byte-swap").expect("byte-swap is a stock transform");
    let bridge = Bridge::new("swap", Arc::clone(&device) as Arc<dyn Slave>).with_transform(swap);
    bridge.accept_request(Packet::write(0, Payload::X32(0x1122_3344)));
    bridge.accept_request(Packet::read(4, PayloadKind::X32));
    bridge.transfer().expect("transfer");
    bridge.transfer().expect("transfer");
    assert_eq!(
        device.next_request().map(|p| p.payload),
        Some(Payload::X32(0x4433_2211))
    );
    let read = device.next_request().expect("read arrives");
    device.respond(read.respond_with(Payload::X32(0xaabb_ccdd)));
    device.respond(read.respond_with(Payload::InvalidAddress));
    bridge.transfer().expect("transfer");
    bridge.transfer().expect("transfer");
    assert_eq!(
        bridge.take_response(&|_| true).map(|p| p.payload),
        Some(Payload::X32(0xddcc_bbaa))
    );
    assert_eq!(
        bridge.take_response(&|_| true).map(|p| p.payload),
        Some(Payload::InvalidAddress)
    );
}

#[test]
fn test_named_transforms() {
    assert!(Bridge::named_transform("rot13").is_none());
    let swap = Bridge::named_transform("byte-swap").expect("byte-swap is a stock transform");
    assert_eq!(swap(Payload::X8(0x12)), Payload::X8(0x12));
    assert_eq!(swap(Payload::X16(0x1234)), Payload::X16(0x3412));
    assert_eq!(
        swap(Payload::X64(0x0102_0304_0506_0708)),
        Payload::X64(0x0807_0605_0403_0201)
    );
}
