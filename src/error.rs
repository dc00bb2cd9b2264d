//! Error types for port and chip operations.
//!
//! Most errors are generic over `E`, the error type of the [`ChipTransactor`](crate::ChipTransactor).

use crate::line::Setting;

/// An error that can occur while opening a port.
#[derive(Debug)]
pub enum OpenError<E> {
	/// The chip transactor is not connected to the chip.
	NotConnected,

	/// The chip refused to allocate a serial channel.
	Rejected(E),

	/// The initial handshake with the chip failed.
	Handshake(TransactionError<E>),

	/// Failed to create the byte-stream bridge.
	Bridge(std::io::Error),

	/// Failed to spawn the worker thread.
	Worker(std::io::Error),
}

/// A single chip transaction failed.
#[derive(Debug)]
pub enum TransactionError<E> {
	/// The transactor reported an error (bus error, timeout, NACK).
	Bus(E),

	/// The chip sent a response that does not match the request.
	InvalidResponse(InvalidResponse),
}

/// The response of the chip is malformed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InvalidResponse {
	Length(InvalidResponseLength),
	Code(InvalidLineCode),
	Name(InvalidPortName),
}

/// The expected number of bytes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExpectedCount {
	Exact(usize),
	Min(usize),
	Max(usize),
}

/// The response has an invalid length.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidResponseLength {
	pub command: u8,
	pub actual: usize,
	pub expected: ExpectedCount,
}

/// The response contains an unknown code for a line setting.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidLineCode {
	pub setting: Setting,
	pub raw: u8,
}

/// The port name reported by the chip is not valid UTF-8.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidPortName {
	pub raw: Vec<u8>,
}

/// A line setting could not be changed.
#[derive(Debug)]
pub enum ConfigError<E> {
	/// The port is closed.
	Closed,

	/// The requested value is not supported by the chip.
	Unsupported(UnsupportedSetting),

	/// The configuration transaction failed.
	Transaction(TransactionError<E>),
}

/// The requested line setting is outside of the chip-supported set.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UnsupportedSetting {
	pub setting: Setting,
	pub value: String,
}

/// A status query failed.
///
/// The caller should treat the queried value as unknown, not as zero.
#[derive(Debug)]
pub enum QueryError<E> {
	/// The port is closed.
	Closed,

	/// The status transaction failed.
	Transaction(TransactionError<E>),
}

/// An error that aborted a transfer of the worker.
#[derive(Debug)]
pub enum TransferError<E> {
	/// A chip transaction failed.
	Transaction(TransactionError<E>),

	/// Waiting for the chip failed.
	Wait(std::io::Error),

	/// Reading from or writing to the byte-stream bridge failed.
	Bridge(std::io::Error),

	/// The transfer was cancelled with [`Port::cancel_transfer()`](crate::Port::cancel_transfer).
	///
	/// `written` bytes were accepted by the chip before the transfer was cancelled.
	Cancelled { written: usize },
}

/// An error that occurred while closing a port.
///
/// The port is considered closed regardless.
#[derive(Debug)]
pub enum CloseError<E> {
	/// The worker thread panicked.
	Worker,

	/// The chip failed to release the serial channel.
	Release(TransactionError<E>),
}

/// The port has been closed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PortClosed;

impl InvalidResponseLength {
	pub fn check(command: u8, actual: usize, expected: usize) -> Result<(), Self> {
		if actual == expected {
			Ok(())
		} else {
			Err(Self {
				command,
				actual,
				expected: ExpectedCount::Exact(expected),
			})
		}
	}

	pub fn check_min(command: u8, actual: usize, min: usize) -> Result<(), Self> {
		if actual >= min {
			Ok(())
		} else {
			Err(Self {
				command,
				actual,
				expected: ExpectedCount::Min(min),
			})
		}
	}

	pub fn check_max(command: u8, actual: usize, max: usize) -> Result<(), Self> {
		if actual <= max {
			Ok(())
		} else {
			Err(Self {
				command,
				actual,
				expected: ExpectedCount::Max(max),
			})
		}
	}
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for OpenError<E> {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for TransactionError<E> {}
impl std::error::Error for InvalidResponse {}
impl std::error::Error for InvalidResponseLength {}
impl std::error::Error for InvalidLineCode {}
impl std::error::Error for InvalidPortName {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for ConfigError<E> {}
impl std::error::Error for UnsupportedSetting {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for QueryError<E> {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for TransferError<E> {}
impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CloseError<E> {}
impl std::error::Error for PortClosed {}

impl<E> From<InvalidResponse> for TransactionError<E> {
	fn from(other: InvalidResponse) -> Self {
		Self::InvalidResponse(other)
	}
}

impl<E> From<InvalidResponseLength> for TransactionError<E> {
	fn from(other: InvalidResponseLength) -> Self {
		Self::InvalidResponse(other.into())
	}
}

impl<E> From<InvalidLineCode> for TransactionError<E> {
	fn from(other: InvalidLineCode) -> Self {
		Self::InvalidResponse(other.into())
	}
}

impl<E> From<InvalidPortName> for TransactionError<E> {
	fn from(other: InvalidPortName) -> Self {
		Self::InvalidResponse(other.into())
	}
}

impl From<InvalidResponseLength> for InvalidResponse {
	fn from(other: InvalidResponseLength) -> Self {
		Self::Length(other)
	}
}

impl From<InvalidLineCode> for InvalidResponse {
	fn from(other: InvalidLineCode) -> Self {
		Self::Code(other)
	}
}

impl From<InvalidPortName> for InvalidResponse {
	fn from(other: InvalidPortName) -> Self {
		Self::Name(other)
	}
}

impl<E> From<TransactionError<E>> for ConfigError<E> {
	fn from(other: TransactionError<E>) -> Self {
		Self::Transaction(other)
	}
}

impl<E> From<UnsupportedSetting> for ConfigError<E> {
	fn from(other: UnsupportedSetting) -> Self {
		Self::Unsupported(other)
	}
}

impl<E> From<PortClosed> for ConfigError<E> {
	fn from(_: PortClosed) -> Self {
		Self::Closed
	}
}

impl<E> From<TransactionError<E>> for QueryError<E> {
	fn from(other: TransactionError<E>) -> Self {
		Self::Transaction(other)
	}
}

impl<E> From<PortClosed> for QueryError<E> {
	fn from(_: PortClosed) -> Self {
		Self::Closed
	}
}

impl<E> From<TransactionError<E>> for TransferError<E> {
	fn from(other: TransactionError<E>) -> Self {
		Self::Transaction(other)
	}
}

impl<E> From<TransactionError<E>> for OpenError<E> {
	fn from(other: TransactionError<E>) -> Self {
		Self::Handshake(other)
	}
}

impl<E: std::fmt::Display> std::fmt::Display for OpenError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::NotConnected => write!(f, "chip is not connected"),
			Self::Rejected(e) => write!(f, "chip refused to allocate a serial channel: {}", e),
			Self::Handshake(e) => write!(f, "handshake with chip failed: {}", e),
			Self::Bridge(e) => write!(f, "failed to create byte-stream bridge: {}", e),
			Self::Worker(e) => write!(f, "failed to spawn worker thread: {}", e),
		}
	}
}

impl<E: std::fmt::Display> std::fmt::Display for TransactionError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Bus(e) => write!(f, "chip transaction failed: {}", e),
			Self::InvalidResponse(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for InvalidResponse {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Length(e) => write!(f, "{}", e),
			Self::Code(e) => write!(f, "{}", e),
			Self::Name(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for ExpectedCount {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Exact(x) => write!(f, "exactly {}", x),
			Self::Min(x) => write!(f, "at least {}", x),
			Self::Max(x) => write!(f, "at most {}", x),
		}
	}
}

impl std::fmt::Display for InvalidResponseLength {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(
			f,
			"invalid response length for command {:#04X}, expected {} bytes, got {}",
			self.command, self.expected, self.actual
		)
	}
}

impl std::fmt::Display for InvalidLineCode {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "invalid {} code in response: {:#04X}", self.setting, self.raw)
	}
}

impl std::fmt::Display for InvalidPortName {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "port name is not valid UTF-8: {:02X?}", self.raw)
	}
}

impl<E: std::fmt::Display> std::fmt::Display for ConfigError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Closed => write!(f, "{}", PortClosed),
			Self::Unsupported(e) => write!(f, "{}", e),
			Self::Transaction(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for UnsupportedSetting {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{} {} is not supported by the chip", self.setting, self.value)
	}
}

impl<E: std::fmt::Display> std::fmt::Display for QueryError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Closed => write!(f, "{}", PortClosed),
			Self::Transaction(e) => write!(f, "status query failed: {}", e),
		}
	}
}

impl<E: std::fmt::Display> std::fmt::Display for TransferError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Transaction(e) => write!(f, "{}", e),
			Self::Wait(e) => write!(f, "failed to wait for chip: {}", e),
			Self::Bridge(e) => write!(f, "byte-stream bridge failed: {}", e),
			Self::Cancelled { written } => write!(f, "transfer cancelled after {} bytes", written),
		}
	}
}

impl<E: std::fmt::Display> std::fmt::Display for CloseError<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Worker => write!(f, "worker thread panicked"),
			Self::Release(e) => write!(f, "failed to release serial channel: {}", e),
		}
	}
}

impl std::fmt::Display for PortClosed {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "port is closed")
	}
}
