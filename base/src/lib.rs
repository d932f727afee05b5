//! The `base` crate defines the value types which are shared by the
//! bus fabric, the CPU model and the machine loader.  None of these
//! types knows anything about threads or about how a machine is
//! assembled; they are plain data with a few invariants attached.

mod instruction;
mod packet;
mod settings;
mod stop;
mod switchctx;
mod types;

pub mod prelude;

pub use instruction::{InstructionWord, Opcode, INSTRUCTION_WIDTH};
pub use packet::{Operation, Packet, Payload, PayloadKind};
pub use settings::{SettingValue, Settings, SettingsError};
pub use stop::StopSignal;
pub use switchctx::{SwitchContext, SwitchContextError, SwitchId, MAX_SWITCH_DEPTH};
pub use types::{Address, AddressRange, WORD_SIZE};
