//! Peripherals are devices which sit behind a bus endpoint and are
//! driven by a thread of their own.
use super::error::PeripheralError;

pub trait Peripheral: Send {
    fn name(&self) -> &str;

    /// Services at most one request from the peripheral's endpoint.
    /// The run loop calls this repeatedly until the machine stops.
    fn handle(&mut self) -> Result<(), PeripheralError>;
}
