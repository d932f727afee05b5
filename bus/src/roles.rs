//! The roles a bus component can play.
//!
//! A concrete component implements whichever of these it needs; a
//! switch, for example, is both a [`Slave`] (its upstream accepts
//! requests) and a [`Transfer`] device (it moves packets along when
//! the run loop ticks it).

use base::Packet;

use super::error::BusError;

/// The downstream side of a connection: something a master can send
/// requests to and collect responses from.
pub trait Slave: Send + Sync {
    /// Queues a request for this slave.
    fn accept_request(&self, packet: Packet);

    /// Takes the oldest waiting response, but only if `accept`
    /// approves of it.
    fn take_response(&self, accept: &dyn Fn(&Packet) -> bool) -> Option<Packet>;
}

/// A terminal device which answers requests.
pub trait Endpoint: Send + Sync {
    fn next_request(&self) -> Option<Packet>;
    fn respond(&self, packet: Packet);
}

/// The master side of the bus, as used by a CPU port.
pub trait Root: Send + Sync {
    fn send_request(&self, packet: Packet);

    /// Returns the response to the most recent read, if it has
    /// arrived.
    fn poll_response(&self) -> Option<Packet>;
}

/// A device which moves packets when ticked.
pub trait Transfer: Send + Sync {
    fn name(&self) -> &str;

    /// Moves at most one request and one response per attached slave.
    fn transfer(&self) -> Result<(), BusError>;
}
