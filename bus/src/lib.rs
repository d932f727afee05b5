//! The memory-mapped bus fabric.
//!
//! Packets travel from a [`Root`] (a CPU's port) through any number
//! of [`Switch`]es and [`Bridge`]s to an [`Endpoint`] (a peripheral),
//! and the response retraces the same path.  Components which need
//! to move packets along implement [`Transfer`]; the run loop calls
//! `transfer()` on each of them in turn.
//!
//! Every component is shared between threads (the transfer thread,
//! the CPU threads and the peripheral threads), so all operations
//! take `&self` and rely on the internally synchronised
//! [`PacketQueue`].
#![crate_name = "bus"]

mod bridge;
mod default;
mod error;
mod gate;
mod queue;
mod roles;
mod switch;

pub use bridge::{Bridge, PayloadTransform};
pub use default::DefaultDevice;
pub use error::{BusError, ConnectError};
pub use gate::{CpuGate, DeviceGate};
pub use queue::{ConcurrentQueue, PacketQueue};
pub use roles::{Endpoint, Root, Slave, Transfer};
pub use switch::Switch;
