//! The prelude exports the structs which nearly every user of the
//! simulator needs: words, addresses, packets and settings.
pub use super::instruction::*;
pub use super::packet::*;
pub use super::settings::*;
pub use super::stop::StopSignal;
pub use super::switchctx::*;
pub use super::types::*;
