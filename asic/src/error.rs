//! Errors raised while building and running a machine.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use base::{SettingsError, SwitchId};
use bus::ConnectError;
use cpu::RegistryError;

/// The kinds of component which appear in a machine description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    RegisterFile,
    Form,
    Functor,
    Executor,
    Control,
    Peripheral,
    Master,
    Slave,
    Endpoint,
}

impl Display for ComponentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentKind::RegisterFile => "register file",
            ComponentKind::Form => "instruction form",
            ComponentKind::Functor => "instruction functor",
            ComponentKind::Executor => "executor",
            ComponentKind::Control => "control unit",
            ComponentKind::Peripheral => "peripheral",
            ComponentKind::Master => "bus master",
            ComponentKind::Slave => "bus slave",
            ComponentKind::Endpoint => "bus endpoint",
        })
    }
}

/// A module factory refused to build a component.
#[derive(Debug)]
pub enum ModuleError {
    Settings(SettingsError),
    NoSuchRegisterFile(String),
    Io { path: PathBuf, error: io::Error },
    /// A thread the component needs could not be started.
    Spawn(io::Error),
    /// The settings are well-typed but make no sense together.
    Invalid(String),
}

impl Display for ModuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ModuleError::Settings(e) => e.fmt(f),
            ModuleError::NoSuchRegisterFile(name) => {
                write!(f, "there is no register file named {name}")
            }
            ModuleError::Io { path, error } => {
                write!(f, "unable to use {}: {error}", path.display())
            }
            ModuleError::Spawn(error) => write!(f, "unable to start a thread: {error}"),
            ModuleError::Invalid(msg) => f.write_str(msg),
        }
    }
}

impl Error for ModuleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ModuleError::Settings(e) => Some(e),
            ModuleError::Io { error, .. } | ModuleError::Spawn(error) => Some(error),
            ModuleError::NoSuchRegisterFile(_) | ModuleError::Invalid(_) => None,
        }
    }
}

impl From<SettingsError> for ModuleError {
    fn from(e: SettingsError) -> ModuleError {
        ModuleError::Settings(e)
    }
}

/// The machine description cannot be turned into a machine.  All of
/// these are fatal.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        error: io::Error,
    },
    Json(serde_json::Error),
    UnknownModule {
        kind: ComponentKind,
        module: String,
        component: String,
    },
    /// A component refers to another one by a name which is not
    /// defined.  `owner` is the CPU or bus section doing the lookup.
    Missing {
        kind: ComponentKind,
        name: String,
        owner: String,
    },
    Module {
        kind: ComponentKind,
        component: String,
        error: ModuleError,
    },
    Registry {
        cpu: String,
        error: RegistryError,
    },
    Connect(ConnectError),
    /// Two switches were given the same identifier.
    DuplicateSwitchId {
        id: SwitchId,
        first: String,
        second: String,
    },
    /// A bus name is defined in more than one section.
    AmbiguousName(String),
    /// Following slave references from this component leads back to
    /// it.
    CyclicBus(String),
    UnknownTransform {
        bridge: String,
        transform: String,
    },
    /// Two peripherals claim the same endpoint.
    EndpointInUse {
        endpoint: String,
        first: String,
        second: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, error } => {
                write!(f, "unable to read machine description {}: {error}", path.display())
            }
            ConfigError::Json(e) => write!(f, "malformed machine description: {e}"),
            ConfigError::UnknownModule {
                kind,
                module,
                component,
            } => write!(f, "{kind} {component} uses unknown module {module}"),
            ConfigError::Missing { kind, name, owner } => {
                write!(f, "no {kind} with name `{name}` registered for {owner}")
            }
            ConfigError::Module {
                kind,
                component,
                error,
            } => write!(f, "failed to build {kind} {component}: {error}"),
            ConfigError::Registry { cpu, error } => write!(f, "cpu {cpu}: {error}"),
            ConfigError::Connect(e) => e.fmt(f),
            ConfigError::DuplicateSwitchId { id, first, second } => write!(
                f,
                "switches {first} and {second} both have identifier {id}"
            ),
            ConfigError::AmbiguousName(name) => {
                write!(f, "bus component {name} is defined in more than one section")
            }
            ConfigError::CyclicBus(name) => {
                write!(f, "bus component {name} is (indirectly) its own slave")
            }
            ConfigError::UnknownTransform { bridge, transform } => {
                write!(f, "bridge {bridge} uses unknown payload transform {transform}")
            }
            ConfigError::EndpointInUse {
                endpoint,
                first,
                second,
            } => write!(
                f,
                "peripherals {first} and {second} both claim endpoint {endpoint}"
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { error, .. } => Some(error),
            ConfigError::Json(e) => Some(e),
            ConfigError::Module { error, .. } => Some(error),
            ConfigError::Registry { error, .. } => Some(error),
            ConfigError::Connect(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectError> for ConfigError {
    fn from(e: ConnectError) -> ConfigError {
        ConfigError::Connect(e)
    }
}

/// A peripheral could not service its endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeripheralError(pub String);

impl Display for PeripheralError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for PeripheralError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunError {
    /// A thread failed and stopped the machine.
    ThreadFailed(String),
    Panicked(String),
    DeadlineExceeded(Duration),
    /// The machine's stop signal was already raised before the run
    /// started (for example, because it has been run before).
    AlreadyStopped,
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RunError::ThreadFailed(reason) => {
                write!(f, "one of the threads got an exception: {reason}")
            }
            RunError::Panicked(thread) => write!(f, "thread {thread} panicked"),
            RunError::DeadlineExceeded(d) => {
                write!(f, "machine did not complete within {} ms", d.as_millis())
            }
            RunError::AlreadyStopped => f.write_str("machine has already been stopped"),
        }
    }
}

impl Error for RunError {}

#[test]
fn test_messages() {
    assert_eq!(
        ConfigError::Missing {
            kind: ComponentKind::Form,
            name: "r".to_string(),
            owner: "cpu core0".to_string()
        }
        .to_string(),
        "no instruction form with name `r` registered for cpu core0"
    );
    assert_eq!(
        RunError::ThreadFailed("Got exception from cpu c: boom".to_string()).to_string(),
        "one of the threads got an exception: Got exception from cpu c: boom"
    );
}
