//! Framed link over a serial port using the `serial2` crate.

use std::path::Path;
use std::time::Duration;

use super::{FrameLink, Transport};

/// Re-exported `serial2` crate in case you need to modify serial port settings.
pub use serial2;

/// A link to a chip attached through a serial port.
pub type SerialLink = FrameLink<serial2::SerialPort>;

impl FrameLink<serial2::SerialPort> {
	/// Open a serial port and use it as link to a chip.
	///
	/// The port is configured in raw mode with 8 data bits, no parity and 1 stop bit.
	pub fn open(path: impl AsRef<Path>, baud_rate: u32, timeout: Duration) -> std::io::Result<Self> {
		let port = serial2::SerialPort::open(path, baud_rate)?;
		Ok(Self::new(port, timeout))
	}
}

impl Transport for serial2::SerialPort {
	fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
		self.set_read_timeout(timeout)?;
		serial2::SerialPort::read(self, buffer)
	}

	fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
		serial2::SerialPort::write_all(self, data)
	}

	fn discard_input_buffer(&mut self) -> std::io::Result<()> {
		serial2::SerialPort::discard_input_buffer(self)
	}
}
