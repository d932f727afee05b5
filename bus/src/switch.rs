//! Address-decoding switches.
//!
//! A switch owns a sorted list of non-overlapping address ranges,
//! each with the slave serving it, plus a default slave for
//! everything else.  Requests are rebased so that each slave sees
//! addresses relative to the start of its own range; responses are
//! rebased back on the way up.
//!
//! The switch pushes its identifier onto the packet's switch context
//! on the way down, and on the way up only takes a response from a
//! slave if the top of the context is its own identifier.  This is
//! what lets several switches share a slave without stealing each
//! other's responses.
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use tracing::{event, Level};

use base::{Address, AddressRange, Packet, SwitchId};

use super::error::{BusError, ConnectError};
use super::gate::DeviceGate;
use super::roles::{Endpoint, Slave, Transfer};


fn same_slave(a: &Arc<dyn Slave>, b: &Arc<dyn Slave>) -> bool {
    // Data pointers only: vtable pointers are not unique per type.
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

struct Route {
    range: AddressRange,
    slave: Arc<dyn Slave>,
}

pub struct Switch {
    name: String,
    id: SwitchId,
    upstream: DeviceGate,
    routes: Vec<Route>,
    default_slave: Arc<dyn Slave>,
}

impl Switch {
    #[must_use]
    pub fn new(name: &str, id: SwitchId, default_slave: Arc<dyn Slave>) -> Switch {
        Switch {
            name: name.to_string(),
            id,
            upstream: DeviceGate::new(),
            routes: Vec::new(),
            default_slave,
        }
    }

    #[must_use]
    pub fn id(&self) -> SwitchId {
        self.id
    }

    /// Attaches `slave` to serve `range`.  Connections are made while
    /// the machine is being built, before the switch is shared.
    pub fn connect(&mut self, range: AddressRange, slave: Arc<dyn Slave>) -> Result<(), ConnectError> {
        if !range.is_word_aligned() {
            return Err(ConnectError::Misaligned {
                switch: self.name.clone(),
                range,
            });
        }
        if same_slave(&self.default_slave, &slave) {
            return Err(ConnectError::AlreadyConnected {
                switch: self.name.clone(),
                range,
                existing: None,
            });
        }
        if let Some(existing) = self.routes.iter().find(|r| same_slave(&r.slave, &slave)) {
            return Err(ConnectError::AlreadyConnected {
                switch: self.name.clone(),
                range,
                existing: Some(existing.range),
            });
        }
        let pos = self.routes.partition_point(|r| r.range.base < range.base);
        // The list is sorted and free of overlaps, so only the
        // neighbours of the insertion point can collide.
        let neighbours = pos.checked_sub(1).into_iter().chain(Some(pos));
        for i in neighbours {
            if let Some(existing) = self.routes.get(i) {
                if existing.range.overlaps(&range) || existing.range.base == range.base {
                    return Err(ConnectError::Overlap {
                        switch: self.name.clone(),
                        range,
                        existing: existing.range,
                    });
                }
            }
        }
        event!(
            Level::DEBUG,
            "switch {} (id {}) connects {}",
            self.name,
            self.id,
            range
        );
        self.routes.insert(pos, Route { range, slave });
        Ok(())
    }

    /// The connected ranges, in address order.
    pub fn ranges(&self) -> impl Iterator<Item = AddressRange> + '_ {
        self.routes.iter().map(|r| r.range)
    }

    /// Finds the route serving `packet`.  A packet whose access is
    /// not wholly inside a range, or whose offset within the range is
    /// not a multiple of the access width, has no route.
    fn route_for(&self, packet: &Packet) -> Option<&Route> {
        let width = packet.payload.width();
        if width == 0 {
            return None;
        }
        let pos = self
            .routes
            .partition_point(|r| r.range.base <= packet.address);
        let route = self.routes.get(pos.checked_sub(1)?)?;
        if !route.range.contains(packet.address, width) {
            return None;
        }
        let offset = route.range.offset_of(packet.address)?;
        if offset % width != 0 {
            return None;
        }
        Some(route)
    }

    fn forward_request(&self, mut packet: Packet) -> Result<(), BusError> {
        packet
            .switch_context
            .push(self.id)
            .map_err(|error| BusError::SwitchContext {
                switch: self.id,
                error,
            })?;
        match self.route_for(&packet) {
            Some(route) => {
                packet.address -= route.range.base;
                event!(
                    Level::TRACE,
                    "switch {} forwards {} to range {}",
                    self.name,
                    packet,
                    route.range
                );
                route.slave.accept_request(packet);
            }
            None => {
                event!(
                    Level::DEBUG,
                    "switch {} has no route for {}; using default slave",
                    self.name,
                    packet
                );
                self.default_slave.accept_request(packet);
            }
        }
        Ok(())
    }

    fn collect_response(&self, slave: &dyn Slave, base: Address) -> Result<(), BusError> {
        let id = self.id;
        if let Some(mut packet) = slave.take_response(&|p| p.switch_context.top() == Some(id)) {
            packet.address = packet.address.wrapping_add(base);
            packet
                .switch_context
                .pop(id)
                .map_err(|error| BusError::SwitchContext { switch: id, error })?;
            event!(Level::TRACE, "switch {} returns {}", self.name, packet);
            self.upstream.respond(packet);
        }
        Ok(())
    }
}

impl Slave for Switch {
    fn accept_request(&self, packet: Packet) {
        self.upstream.accept_request(packet);
    }

    fn take_response(&self, accept: &dyn Fn(&Packet) -> bool) -> Option<Packet> {
        self.upstream.take_response(accept)
    }
}

impl Transfer for Switch {
    fn name(&self) -> &str {
        &self.name
    }

    fn transfer(&self) -> Result<(), BusError> {
        if let Some(packet) = self.upstream.next_request() {
            self.forward_request(packet)?;
        }
        for route in &self.routes {
            self.collect_response(&*route.slave, route.range.base)?;
        }
        self.collect_response(&*self.default_slave, 0)
    }
}

impl Debug for Switch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Switch")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("ranges", &self.ranges().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
