//! Assembles whole machines and runs them.
//!
//! A [`MachineDescription`] (usually loaded from JSON) names the CPUs,
//! the bus fabric and the peripherals of a machine, together with the
//! module implementing each pluggable component.  [`Asic::build`]
//! turns a description into a machine using the factories in a
//! [`ModuleRegistry`], and a [`Runner`] runs it, one thread per CPU
//! and per peripheral plus one for the bus.
//!
//! The built-in modules provide 32-bit register files, the two kinds
//! of executor, RAM and UART peripherals and a subset of RV32I (see
//! [`rv32`]).
#![crate_name = "asic"]

mod config;
mod error;
mod loader;
mod modules;
mod peripheral;
mod ram;
pub mod rv32;
mod runner;
pub mod uart;

pub use config::{
    BridgeDescription, BusDescription, ComponentDescription, ControlDescription, CpuDescription,
    InstructionDescription, MachineDescription, MasterDescription, PeripheralDescription,
    PortDescription, RouteDescription, SwitchDescription,
};
pub use error::{ComponentKind, ConfigError, ModuleError, PeripheralError, RunError};
pub use loader::Asic;
pub use modules::{
    CpuContext, ExecutorContext, ExecutorFactory, FormFactory, FunctorFactory, ModuleRegistry,
    PeripheralContext, PeripheralFactory, RegisterFileFactory,
};
pub use peripheral::Peripheral;
pub use ram::Ram;
pub use runner::{CpuReport, RunReport, Runner};
pub use uart::Uart;
