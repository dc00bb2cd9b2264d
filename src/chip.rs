//! Traits for the connection to the ChipIo expander.
//!
//! The [`ChipTransactor`] trait is the boundary used by [`Port`](crate::Port).
//! It performs one atomic request/response exchange with the chip, and it owns the exclusion that serializes
//! transactions of all ports sharing the same chip.
//!
//! If you have a raw [`ChipLink`] that can only be used through a mutable reference,
//! wrap it in a [`SharedChip`] to get a [`ChipTransactor`].

use std::sync::Mutex;

/// A connection to a chip that can be shared by multiple ports.
///
/// Implementations must guarantee that at most one transaction is in flight at any time,
/// even when `transact()` is called from multiple threads.
pub trait ChipTransactor {
	/// The error type returned by a failed transaction.
	type Error: std::fmt::Debug + std::fmt::Display;

	/// Check if the transactor is currently connected to the chip.
	fn is_connected(&self) -> bool;

	/// Send a command with a payload to the chip and wait for the response payload.
	///
	/// A negative acknowledgement by the chip must be reported as an error.
	fn transact(&self, command: u8, payload: &[u8]) -> Result<Vec<u8>, Self::Error>;

	/// The largest request or response payload a single transaction can carry, if limited.
	///
	/// The payload size includes the channel byte.
	fn max_payload_size(&self) -> Option<usize> {
		None
	}
}

/// A raw request/response link to a chip, such as an I2C or serial bus.
pub trait ChipLink {
	/// The error type returned by the link.
	type Error: std::fmt::Debug + std::fmt::Display;

	/// Check if the link is currently connected to the chip.
	fn is_connected(&self) -> bool {
		true
	}

	/// Perform a single request/response exchange with the chip.
	fn exchange(&mut self, command: u8, payload: &[u8]) -> Result<Vec<u8>, Self::Error>;

	/// The largest request or response payload the link can carry, if limited.
	fn max_payload_size(&self) -> Option<usize> {
		None
	}
}

/// A [`ChipLink`] guarded by a mutex, for sharing between ports.
///
/// Wrap it in an [`Arc`](std::sync::Arc) and pass a clone to each [`Port`](crate::Port).
#[derive(Debug)]
pub struct SharedChip<L> {
	link: Mutex<L>,
	max_payload_size: Option<usize>,
}

impl<L: ChipLink> SharedChip<L> {
	/// Create a new shared chip for a connected link.
	pub fn new(link: L) -> Self {
		Self {
			max_payload_size: link.max_payload_size(),
			link: Mutex::new(link),
		}
	}

	/// Consume the shared chip to get the link back.
	pub fn into_inner(self) -> L {
		self.link.into_inner().unwrap_or_else(|e| e.into_inner())
	}

	/// Run a function with exclusive access to the link.
	///
	/// No port can perform a transaction while the function is running.
	pub fn with_link<F, R>(&self, f: F) -> R
	where
		F: FnOnce(&mut L) -> R,
	{
		// A panic in another user of the link does not leave the link in a broken state,
		// so we can ignore poisoning.
		let mut link = self.link.lock().unwrap_or_else(|e| e.into_inner());
		f(&mut link)
	}
}

impl<L: ChipLink> ChipTransactor for SharedChip<L> {
	type Error = L::Error;

	fn is_connected(&self) -> bool {
		self.with_link(|link| link.is_connected())
	}

	fn transact(&self, command: u8, payload: &[u8]) -> Result<Vec<u8>, Self::Error> {
		self.with_link(|link| {
			trace!("chip transaction: command {:#04X}, payload {:02X?}", command, payload);
			let response = link.exchange(command, payload);
			match &response {
				Ok(data) => {
					trace!("chip response: {:02X?}", data);
				},
				Err(e) => {
					debug!("chip transaction {:#04X} failed: {}", command, e);
				},
			}
			response
		})
	}

	fn max_payload_size(&self) -> Option<usize> {
		self.max_payload_size
	}
}
