//! Virtual serial ports on top of a ChipIo I/O expander.
//!
//! A ChipIo chip provides UART channels, but it can only be reached through a slow, shared, transaction oriented bus.
//! This library maps the byte stream semantics of a serial port onto chip transactions.
//!
//! Each [`Port`] exposes a non-blocking byte stream to the application
//! (a Unix stream socket, available as file descriptor),
//! and a background worker moves the data between the stream and the chip.
//! The line settings (baud rate, data bits, parity, stop bits and flow control) are changed with methods on the port.
//!
//! Multiple ports can share a single chip.
//! The [`ChipTransactor`] ensures that only one transaction is in flight on the bus at any time.
//! Use [`SharedChip`] to turn a raw [`ChipLink`] into a shareable transactor.
//!
//! If the interrupt line of the chip is available, pass it as [`IrqSource`] when opening the port.
//! The worker will then wait for edges on the interrupt line instead of polling the chip.
//!
//! # Optional features
//!
//! * `serial2`: provide [`link::SerialLink`] for chips attached through a serial port (enabled by default).
//! * `log`: emit log messages with the [`log`](https://docs.rs/log) crate.
//!
//! # Example
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use chipio_serial::{Parity, Port, SharedChip};
//! use chipio_serial::link::SerialLink;
//! use std::io::Write;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let link = SerialLink::open("/dev/ttyUSB0", 115_200, Duration::from_millis(50))?;
//! let chip = Arc::new(SharedChip::new(link));
//! let mut port = Port::open(chip, None)?;
//! port.set_baud_rate(57_600)?;
//! port.set_parity(Parity::Even)?;
//! port.stream()?.write_all(b"Hello world!\n")?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod log;

mod chip;
mod endian;
mod error;
mod irq;
mod line;
mod port;
mod protocol;
mod worker;

pub mod link;

pub use chip::{ChipLink, ChipTransactor, SharedChip};
pub use error::*;
pub use irq::{Edge, IrqSource};
pub use line::{Capabilities, DataBits, FlowControl, LineConfig, LineSetting, Parity, Setting, StopBits};
pub use port::{BufferState, Port, PortOptions};
pub use protocol::command;
pub use worker::TransferState;
