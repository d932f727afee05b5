//! A byte-stream serial port.
//!
//! The UART has three 32-bit registers, at these offsets from the
//! start of the range it is mapped at:
//!
//! | offset | access | register |
//! |--------|--------|----------|
//! | `0x0`  | read   | status |
//! | `0x4`  | write  | transmit: the low byte of the value is sent |
//! | `0x8`  | read   | receive: the next input byte, or 0 if there is none |
//!
//! Status bits: 0 is set when the transmitter is idle (it always
//! is), 1 when an input byte is waiting, 2 once a transmit has
//! failed, 3 once a receive found no input.  The two error bits stay
//! set.  Reading any other register gets the invalid-address
//! sentinel; writes to other registers are dropped.
//!
//! Input arrives through a channel, so checking for it never blocks
//! the peripheral's thread.
use std::fmt::{self, Debug, Formatter};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use tracing::{event, Level};

use base::{Address, Operation, Packet, Payload, Settings};
use bus::Endpoint;

use super::error::{ModuleError, PeripheralError};
use super::peripheral::Peripheral;

pub const STATUS: Address = 0x0;
pub const TRANSMIT: Address = 0x4;
pub const RECEIVE: Address = 0x8;

pub const TX_IDLE: u32 = 1 << 0;
pub const RX_READY: u32 = 1 << 1;
pub const TX_ERROR: u32 = 1 << 2;
pub const RX_ERROR: u32 = 1 << 3;

/// Sends the bytes of `input` to `sink` until either runs out.
pub fn forward_input<R: Read>(input: R, sink: &Sender<u8>) {
    for byte in input.bytes() {
        match byte {
            Ok(b) => {
                if sink.send(b).is_err() {
                    return;
                }
            }
            Err(e) => {
                event!(Level::WARN, "stopped reading UART input: {}", e);
                return;
            }
        }
    }
}

pub struct Uart {
    name: String,
    endpoint: Arc<dyn Endpoint>,
    input: Option<Receiver<u8>>,
    waiting: Option<u8>,
    output: Box<dyn Write + Send>,
    errors: u32,
}

impl Uart {
    /// A UART with no input at all is built with `input` set to
    /// `None`.
    #[must_use]
    pub fn new(
        name: &str,
        endpoint: Arc<dyn Endpoint>,
        input: Option<Receiver<u8>>,
        output: Box<dyn Write + Send>,
    ) -> Uart {
        Uart {
            name: name.to_string(),
            endpoint,
            input,
            waiting: None,
            output,
            errors: 0,
        }
    }

    /// An output-only UART writing to the file named by the `output`
    /// setting.  The file is created, or truncated if it exists.
    pub fn to_file(
        name: &str,
        endpoint: Arc<dyn Endpoint>,
        settings: &Settings,
    ) -> Result<Uart, ModuleError> {
        let path = PathBuf::from(settings.string("output")?);
        let file = File::create(&path).map_err(|error| ModuleError::Io {
            path: path.clone(),
            error,
        })?;
        event!(Level::INFO, "{}: writing to {}", name, path.display());
        Ok(Uart::new(name, endpoint, None, Box::new(file)))
    }

    /// A UART connected to the simulator's own standard input and
    /// output.  A thread of its own reads standard input.
    pub fn on_stdio(name: &str, endpoint: Arc<dyn Endpoint>) -> Result<Uart, ModuleError> {
        let (sink, input) = mpsc::channel();
        thread::Builder::new()
            .name(format!("{name} input"))
            .spawn(move || forward_input(io::stdin(), &sink))
            .map_err(ModuleError::Spawn)?;
        Ok(Uart::new(
            name,
            endpoint,
            Some(input),
            Box::new(io::stdout()),
        ))
    }

    /// The next input byte, without consuming it.
    fn peek_input(&mut self) -> Option<u8> {
        if self.waiting.is_none() {
            if let Some(input) = &self.input {
                match input.try_recv() {
                    Ok(b) => self.waiting = Some(b),
                    Err(TryRecvError::Empty) => (),
                    Err(TryRecvError::Disconnected) => {
                        event!(Level::DEBUG, "{}: input is exhausted", self.name);
                        self.input = None;
                    }
                }
            }
        }
        self.waiting
    }

    fn status(&mut self) -> u32 {
        let ready = if self.peek_input().is_some() { RX_READY } else { 0 };
        TX_IDLE | ready | self.errors
    }

    fn receive(&mut self) -> u32 {
        self.peek_input();
        match self.waiting.take() {
            Some(b) => u32::from(b),
            None => {
                event!(Level::DEBUG, "{}: receive with no input waiting", self.name);
                self.errors |= RX_ERROR;
                0
            }
        }
    }

    fn transmit(&mut self, payload: Payload) {
        let Some(value) = payload.value() else {
            return;
        };
        let byte = value as u8;
        if let Err(e) = self
            .output
            .write_all(&[byte])
            .and_then(|()| self.output.flush())
        {
            event!(Level::WARN, "{}: failed to transmit {:#04x}: {}", self.name, byte, e);
            self.errors |= TX_ERROR;
        }
    }

    fn read(&mut self, request: &Packet) -> Payload {
        let value = match request.address {
            STATUS => self.status(),
            RECEIVE => self.receive(),
            other => {
                event!(
                    Level::DEBUG,
                    "{}: there is no readable register at offset {:#x}",
                    self.name,
                    other
                );
                return Payload::InvalidAddress;
            }
        };
        Payload::truncated(request.payload.kind(), u64::from(value))
    }
}

impl Peripheral for Uart {
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
                let payload = self.read(&request);
                self.endpoint.respond(request.respond_with(payload));
            }
            Operation::Write if request.address == TRANSMIT => self.transmit(request.payload),
            Operation::Write => {
                event!(
                    Level::WARN,
                    "{}: dropping write of {} to offset {:#x}",
                    self.name,
                    request.payload,
                    request.address
                );
            }
            Operation::Atomic => {
                self.endpoint
                    .respond(request.respond_with(Payload::InvalidAddress));
            }
        }
        Ok(())
    }
}

impl Debug for Uart {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uart")
            .field("name", &self.name)
            .field("has_input", &self.input.is_some())
            .field("waiting", &self.waiting)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use base::{PayloadKind, SettingValue};
    use bus::{DeviceGate, Slave};

    use super::*;

    /// Output which tests can look at afterwards.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().expect("lock should not be poisoned").clone()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .expect("lock should not be poisoned")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "nobody is listening"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn uart(input: Option<Receiver<u8>>, output: Box<dyn Write + Send>) -> (Uart, Arc<DeviceGate>) {
        let gate = Arc::new(DeviceGate::new());
        let uart = Uart::new(
            "uart",
            Arc::clone(&gate) as Arc<dyn Endpoint>,
            input,
            output,
        );
        (uart, gate)
    }

    fn exchange(uart: &mut Uart, gate: &DeviceGate, request: Packet) -> Option<Payload> {
        gate.accept_request(request);
        uart.handle().expect("the UART never fails");
        gate.take_response(&|_| true).map(|p| p.payload)
    }

    fn read(uart: &mut Uart, gate: &DeviceGate, address: Address) -> Option<Payload> {
        exchange(uart, gate, Packet::read(address, PayloadKind::X32))
    }

    #[test]
    fn test_transmit_sends_low_byte() {
        let out = Captured::default();
        let (mut uart, gate) = uart(None, Box::new(out.clone()));
        for value in [u32::from(b'o'), 0x1234_566b] {
            assert_eq!(
                exchange(&mut uart, &gate, Packet::write(TRANSMIT, Payload::X32(value))),
                None
            );
        }
        assert_eq!(
            exchange(&mut uart, &gate, Packet::write(TRANSMIT, Payload::X8(b'!'))),
            None
        );
        assert_eq!(out.contents(), b"ok!");
        assert_eq!(read(&mut uart, &gate, STATUS), Some(Payload::X32(TX_IDLE)));
    }

    #[test]
    fn test_writes_elsewhere_are_dropped() {
        let out = Captured::default();
        let (mut uart, gate) = uart(None, Box::new(out.clone()));
        for address in [STATUS, RECEIVE, 0xc] {
            assert_eq!(
                exchange(&mut uart, &gate, Packet::write(address, Payload::X32(0x41))),
                None
            );
        }
        assert!(out.contents().is_empty());
    }

    #[test]
    fn test_receive() {
        let (sink, input) = mpsc::channel();
        let (mut uart, gate) = uart(Some(input), Box::new(io::sink()));
        assert_eq!(read(&mut uart, &gate, STATUS), Some(Payload::X32(TX_IDLE)));

        forward_input(&b"hi"[..], &sink);
        assert_eq!(
            read(&mut uart, &gate, STATUS),
            Some(Payload::X32(TX_IDLE | RX_READY))
        );
        assert_eq!(read(&mut uart, &gate, RECEIVE), Some(Payload::X32(u32::from(b'h'))));
        assert_eq!(
            exchange(&mut uart, &gate, Packet::read(RECEIVE, PayloadKind::X8)),
            Some(Payload::X8(b'i'))
        );

        drop(sink);
        assert_eq!(read(&mut uart, &gate, RECEIVE), Some(Payload::X32(0)));
        assert_eq!(
            read(&mut uart, &gate, STATUS),
            Some(Payload::X32(TX_IDLE | RX_ERROR))
        );
    }

    #[test]
    fn test_failed_transmit_sets_error() {
        let (mut uart, gate) = uart(None, Box::new(Broken));
        exchange(&mut uart, &gate, Packet::write(TRANSMIT, Payload::X32(0x41)));
        assert_eq!(
            read(&mut uart, &gate, STATUS),
            Some(Payload::X32(TX_IDLE | TX_ERROR))
        );
    }

    #[test]
    fn test_unknown_registers() {
        let (mut uart, gate) = uart(None, Box::new(io::sink()));
        assert_eq!(read(&mut uart, &gate, TRANSMIT), Some(Payload::InvalidAddress));
        assert_eq!(read(&mut uart, &gate, 0x10), Some(Payload::InvalidAddress));
        assert_eq!(
            exchange(
                &mut uart,
                &gate,
                Packet::new(Operation::Atomic, STATUS, Payload::X32(1))
            ),
            Some(Payload::InvalidAddress)
        );
    }

    #[test]
    fn test_file_output() {
        let file = tempfile::NamedTempFile::new().expect("temporary file");
        let settings = Settings::new().with(
            "output",
            SettingValue::Str(file.path().to_string_lossy().into_owned()),
        );
        let gate = Arc::new(DeviceGate::new());
        let mut uart = Uart::to_file("uart", Arc::clone(&gate) as Arc<dyn Endpoint>, &settings)
            .expect("file should be writable");
        for b in *b"out" {
            exchange(&mut uart, &gate, Packet::write(TRANSMIT, Payload::X8(b)));
        }
        assert_eq!(
            std::fs::read(file.path()).expect("output should be readable"),
            b"out"
        );

        assert!(matches!(
            Uart::to_file("uart", gate, &Settings::new()),
            Err(ModuleError::Settings(_))
        ));
    }
}
