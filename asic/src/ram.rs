//! A memory-backed endpoint device.
//!
//! Addresses are offsets into the memory (the switches above have
//! already subtracted the base of the range the RAM is mapped at).
//! Values are stored little-endian.
//!
//! An image file only supplies the initial contents.  Stores change
//! the memory, never the file, so every run of a machine starts from
//! the same image.
use std::fmt::{self, Debug, Formatter};
use std::fs;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{event, Level};

use base::{Address, Operation, Payload, PayloadKind, Settings};
use bus::Endpoint;

use super::error::{ModuleError, PeripheralError};
use super::peripheral::Peripheral;

pub struct Ram {
    name: String,
    endpoint: Arc<dyn Endpoint>,
    bytes: Vec<u8>,
}

impl Ram {
    #[must_use]
    pub fn new(name: &str, endpoint: Arc<dyn Endpoint>, size: usize) -> Ram {
        Ram {
            name: name.to_string(),
            endpoint,
            bytes: vec![0; size],
        }
    }

    /// Builds a RAM from its settings: `size` in bytes, and optionally
    /// `image`, the path of a file copied into memory at
    /// `image-offset` (default 0).
    pub fn from_settings(
        name: &str,
        endpoint: Arc<dyn Endpoint>,
        settings: &Settings,
    ) -> Result<Ram, ModuleError> {
        let size: usize = settings.uint("size")?;
        let mut ram = Ram::new(name, endpoint, size);
        if let Some(image) = settings.optional_string("image")? {
            let path = PathBuf::from(image);
            let offset: usize = settings.optional_uint("image-offset")?.unwrap_or(0);
            let contents = fs::read(&path).map_err(|error| ModuleError::Io { path, error })?;
            ram.load_image(offset, &contents)?;
            event!(
                Level::INFO,
                "{}: loaded {} bytes from {} at offset {:#x}",
                name,
                contents.len(),
                image,
                offset
            );
        }
        Ok(ram)
    }

    pub fn load_image(&mut self, offset: usize, image: &[u8]) -> Result<(), ModuleError> {
        let end = offset
            .checked_add(image.len())
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                ModuleError::Invalid(format!(
                    "image of {} bytes at offset {offset:#x} does not fit in {} bytes of memory",
                    image.len(),
                    self.bytes.len()
                ))
            })?;
        self.bytes[offset..end].copy_from_slice(image);
        Ok(())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn span(&self, address: Address, width: u32) -> Option<Range<usize>> {
        let start = usize::try_from(address).ok()?;
        let end = start.checked_add(usize::try_from(width).ok()?)?;
        (width > 0 && end <= self.bytes.len()).then_some(start..end)
    }

    fn read(&self, address: Address, kind: PayloadKind) -> Payload {
        match self.span(address, kind.width()) {
            Some(span) => {
                let value = self.bytes[span]
                    .iter()
                    .rev()
                    .fold(0_u64, |acc, b| (acc << 8) | u64::from(*b));
                Payload::truncated(kind, value)
            }
            None => {
                event!(
                    Level::DEBUG,
                    "{}: read of {} at {:#010x} is outside memory",
                    self.name,
                    kind,
                    address
                );
                Payload::InvalidAddress
            }
        }
    }

    fn write(&mut self, address: Address, payload: Payload) {
        let (Some(value), Some(span)) = (payload.value(), self.span(address, payload.width()))
        else {
            event!(
                Level::WARN,
                "{}: dropping write of {} to {:#010x}",
                self.name,
                payload,
                address
            );
            return;
        };
        for (i, b) in self.bytes[span].iter_mut().enumerate() {
            *b = (value >> (8 * i)) as u8;
        }
    }
}

impl Peripheral for Ram {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&mut self) -> Result<(), PeripheralError> {
        let Some(request) = self.endpoint.next_request() else {
            return Ok(());
        };
        event!(Level::TRACE, "{}: got {}", self.name, request);
        match request.operation {
            Operation::Read => {
                let payload = self.read(request.address, request.payload.kind());
                self.endpoint.respond(request.respond_with(payload));
            }
            Operation::Write => self.write(request.address, request.payload),
            Operation::Atomic => {
                event!(
                    Level::DEBUG,
                    "{}: atomic operations are not supported",
                    self.name
                );
                self.endpoint
                    .respond(request.respond_with(Payload::InvalidAddress));
            }
        }
        Ok(())
    }
}

impl Debug for Ram {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ram")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish_non_exhaustive()
    }
}
