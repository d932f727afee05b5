use std::error::Error;
use std::fmt::{self, Display, Formatter};

use base::{AddressRange, SwitchContextError, SwitchId};

/// Failure to attach a slave to a switch.  These are configuration
/// errors: the machine cannot be built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectError {
    Misaligned {
        switch: String,
        range: AddressRange,
    },
    Overlap {
        switch: String,
        range: AddressRange,
        existing: AddressRange,
    },
    /// The slave is already reachable through this switch (under
    /// another range, or as its default slave).  Responses are
    /// rebased by the range they come back through, so a slave can
    /// only appear once per switch.
    AlreadyConnected {
        switch: String,
        range: AddressRange,
        existing: Option<AddressRange>,
    },
}

impl Display for ConnectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::Misaligned { switch, range } => write!(
                f,
                "switch {switch}: address range {range} is not aligned to the bus word size"
            ),
            ConnectError::Overlap {
                switch,
                range,
                existing,
            } => write!(
                f,
                "switch {switch}: address range {range} overlaps already connected range {existing}"
            ),
            ConnectError::AlreadyConnected {
                switch,
                range,
                existing: Some(existing),
            } => write!(
                f,
                "switch {switch}: the slave for address range {range} is already connected at {existing}"
            ),
            ConnectError::AlreadyConnected {
                switch,
                range,
                existing: None,
            } => write!(
                f,
                "switch {switch}: the slave for address range {range} is already the default slave"
            ),
        }
    }
}

impl Error for ConnectError {}

/// A failure while moving packets.  These indicate a broken bus
/// topology rather than a bad address (bad addresses are answered
/// with the invalid-address sentinel).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusError {
    SwitchContext {
        switch: SwitchId,
        error: SwitchContextError,
    },
}

impl Display for BusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BusError::SwitchContext { switch, error } => {
                write!(f, "switch {switch} could not route packet: {error}")
            }
        }
    }
}

impl Error for BusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BusError::SwitchContext { error, .. } => Some(error),
        }
    }
}
