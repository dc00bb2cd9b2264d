//! Framed request/response link to a chip attached through a byte stream, such as a USB serial adapter.
//!
//! Every exchange consists of a request frame followed by a response frame:
//! ```text
//! request:  AA 55 | command | length (u16 LE) | payload | CRC-16 (u16 LE)
//! response: AA 55 | status  | length (u16 LE) | payload | CRC-16 (u16 LE)
//! ```
//! The CRC covers everything before it.
//! A non-zero status in the response is a negative acknowledgement.

use std::time::{Duration, Instant};

use crate::endian::{read_u16_le, write_u16_le};
use crate::ChipLink;

#[cfg(feature = "serial2")]
pub mod serial2;

#[cfg(feature = "serial2")]
pub use self::serial2::SerialLink;

/// Prefix of every frame.
pub const HEADER_PREFIX: [u8; 2] = [0xAA, 0x55];

/// Size of the frame header: prefix, command or status and length.
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size of a single frame.
pub const MAX_PAYLOAD_SIZE: usize = 4096;

const CRC_SIZE: usize = 2;

/// A byte stream that carries frames, normally a serial port.
pub trait Transport {
	/// Read available bytes, blocking until at least one byte is available or the timeout expires.
	///
	/// An expired timeout must be reported as an error of kind [`std::io::ErrorKind::TimedOut`].
	fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> std::io::Result<usize>;

	/// Write all bytes to the stream.
	fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;

	/// Discard data in the input buffer of the stream.
	fn discard_input_buffer(&mut self) -> std::io::Result<()>;
}

/// An error on a framed link.
#[derive(Debug)]
pub enum LinkError {
	/// Reading from or writing to the transport failed.
	Io(std::io::Error),

	/// No complete response was received before the timeout expired.
	Timeout,

	/// The response frame has an invalid checksum.
	InvalidChecksum { message: u16, computed: u16 },

	/// The chip responded with a negative acknowledgement.
	Nack { command: u8, status: u8 },

	/// The frame payload exceeds [`MAX_PAYLOAD_SIZE`].
	FrameTooLarge { size: usize },
}

/// A [`ChipLink`] that exchanges framed messages over a [`Transport`].
#[derive(Debug)]
pub struct FrameLink<T> {
	transport: T,
	timeout: Duration,
	read_buffer: Vec<u8>,
	write_buffer: Vec<u8>,
}

impl<T: Transport> FrameLink<T> {
	/// Create a new link on a transport.
	///
	/// The timeout applies to each response as a whole.
	pub fn new(transport: T, timeout: Duration) -> Self {
		Self {
			transport,
			timeout,
			read_buffer: Vec::with_capacity(HEADER_SIZE + MAX_PAYLOAD_SIZE + CRC_SIZE),
			write_buffer: Vec::with_capacity(HEADER_SIZE + MAX_PAYLOAD_SIZE + CRC_SIZE),
		}
	}

	/// Get the response timeout.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Set the response timeout.
	pub fn set_timeout(&mut self, timeout: Duration) {
		self.timeout = timeout;
	}

	/// Get a reference to the underlying transport.
	pub fn transport(&self) -> &T {
		&self.transport
	}

	/// Get a mutable reference to the underlying transport.
	///
	/// Reading from or writing to the transport directly may corrupt the framing of the next exchange.
	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	/// Consume the link to get the transport back.
	pub fn into_transport(self) -> T {
		self.transport
	}

	/// Write a request frame.
	fn write_request(&mut self, command: u8, payload: &[u8]) -> Result<(), LinkError> {
		encode_frame(&mut self.write_buffer, command, payload)?;

		// Throw away stale data, it can not belong to the response of this request.
		self.read_buffer.clear();
		self.transport.discard_input_buffer().map_err(LinkError::Io)?;

		trace!("sending frame: {:02X?}", self.write_buffer);
		self.transport.write_all(&self.write_buffer).map_err(LinkError::Io)
	}

	/// Read the response frame for a command.
	fn read_response(&mut self, command: u8) -> Result<Vec<u8>, LinkError> {
		let deadline = Instant::now() + self.timeout;

		let frame_len = loop {
			self.remove_garbage();

			// After removing garbage, the read buffer starts with a (possibly partial) header.
			if self.read_buffer.len() >= HEADER_SIZE {
				let payload_len = usize::from(read_u16_le(&self.read_buffer[3..]));
				if payload_len > MAX_PAYLOAD_SIZE {
					self.read_buffer.clear();
					return Err(LinkError::FrameTooLarge { size: payload_len });
				}
				let frame_len = HEADER_SIZE + payload_len + CRC_SIZE;
				if self.read_buffer.len() >= frame_len {
					break frame_len;
				}
			}

			let timeout = deadline.checked_duration_since(Instant::now()).ok_or(LinkError::Timeout)?;
			let mut chunk = [0; 256];
			let new_data = match self.transport.read(&mut chunk, timeout) {
				Ok(x) => x,
				Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Err(LinkError::Timeout),
				Err(e) => return Err(LinkError::Io(e)),
			};
			self.read_buffer.extend_from_slice(&chunk[..new_data]);
		};

		let frame: Vec<u8> = self.read_buffer.drain(..frame_len).collect();
		trace!("read frame: {:02X?}", frame);
		let body_end = frame_len - CRC_SIZE;
		let message = read_u16_le(&frame[body_end..]);
		let computed = calculate_crc(0, &frame[..body_end]);
		if message != computed {
			return Err(LinkError::InvalidChecksum { message, computed });
		}

		let status = frame[2];
		if status != 0 {
			return Err(LinkError::Nack { command, status });
		}
		Ok(frame[HEADER_SIZE..body_end].to_vec())
	}

	/// Remove leading garbage data from the read buffer.
	fn remove_garbage(&mut self) {
		let garbage_len = find_header(&self.read_buffer);
		if garbage_len > 0 {
			debug!("skipping {} bytes of leading garbage.", garbage_len);
			trace!("skipped garbage: {:02X?}", &self.read_buffer[..garbage_len]);
			self.read_buffer.drain(..garbage_len);
		}
	}
}

impl<T: Transport> ChipLink for FrameLink<T> {
	type Error = LinkError;

	fn exchange(&mut self, command: u8, payload: &[u8]) -> Result<Vec<u8>, Self::Error> {
		self.write_request(command, payload)?;
		self.read_response(command)
	}

	fn max_payload_size(&self) -> Option<usize> {
		Some(MAX_PAYLOAD_SIZE)
	}
}

/// Encode a frame into a buffer, replacing the contents of the buffer.
fn encode_frame(buffer: &mut Vec<u8>, command_or_status: u8, payload: &[u8]) -> Result<(), LinkError> {
	if payload.len() > MAX_PAYLOAD_SIZE {
		return Err(LinkError::FrameTooLarge { size: payload.len() });
	}

	buffer.clear();
	buffer.resize(HEADER_SIZE + payload.len() + CRC_SIZE, 0);
	buffer[..2].copy_from_slice(&HEADER_PREFIX);
	buffer[2] = command_or_status;
	write_u16_le(&mut buffer[3..], payload.len() as u16);
	buffer[HEADER_SIZE..][..payload.len()].copy_from_slice(payload);

	let crc_index = HEADER_SIZE + payload.len();
	let crc = calculate_crc(0, &buffer[..crc_index]);
	write_u16_le(&mut buffer[crc_index..], crc);
	Ok(())
}

/// Find the potential starting position of a header.
///
/// If the buffer ends with a partial header prefix, the start position of the partial prefix is returned.
fn find_header(buffer: &[u8]) -> usize {
	for i in 0..buffer.len() {
		let possible_prefix = HEADER_PREFIX.len().min(buffer.len() - i);
		if buffer[i..].starts_with(&HEADER_PREFIX[..possible_prefix]) {
			return i;
		}
	}

	buffer.len()
}

/// Calculate a CRC-16/BUYPASS checksum (polynomial 0x8005, not reflected).
///
/// Pass 0 as initial `crc` for a new message, or a previous result to continue a calculation.
pub fn calculate_crc(mut crc: u16, data: &[u8]) -> u16 {
	for &byte in data {
		crc ^= u16::from(byte) << 8;
		for _ in 0..8 {
			if crc & 0x8000 != 0 {
				crc = (crc << 1) ^ 0x8005;
			} else {
				crc <<= 1;
			}
		}
	}
	crc
}

impl std::error::Error for LinkError {}

impl From<std::io::Error> for LinkError {
	fn from(other: std::io::Error) -> Self {
		Self::Io(other)
	}
}

impl std::fmt::Display for LinkError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Io(e) => write!(f, "{}", e),
			Self::Timeout => write!(f, "timeout while waiting for response"),
			Self::InvalidChecksum { message, computed } => write!(
				f,
				"invalid checksum, message claims {:#06X}, computed {:#06X}",
				message, computed
			),
			Self::Nack { command, status } => write!(f, "chip rejected command {:#04X} with status {:#04X}", command, status),
			Self::FrameTooLarge { size } => write!(f, "frame payload of {} bytes exceeds maximum of {} bytes", size, MAX_PAYLOAD_SIZE),
		}
	}
}
