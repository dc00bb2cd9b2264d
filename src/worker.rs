//! The transmit/receive worker of a port.
//!
//! The worker runs on a background thread and moves data between the byte-stream bridge and the chip.
//! It owns the busy/ready state machine: data is submitted in chunks of at most the chip buffer size,
//! and after each chunk the worker waits until the chip reports that the channel is no longer busy.
//! The worker only returns to [`TransferState::Idle`] once the byte stream is empty and the last chunk is drained.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{TransactionError, TransferError};
use crate::irq::WaitStrategy;
use crate::protocol::{Channel, ChannelStatus};
use crate::{BufferState, ChipTransactor};

/// The state of the transmit state machine of a port.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransferState {
	/// No transfer in progress.
	Idle,

	/// A write transaction is in flight.
	AwaitingChip,

	/// Data was submitted, waiting for the chip to finish processing it.
	Draining,
}

impl TransferState {
	fn from_raw(raw: u8) -> Self {
		match raw {
			1 => Self::AwaitingChip,
			2 => Self::Draining,
			_ => Self::Idle,
		}
	}

	fn to_raw(self) -> u8 {
		match self {
			Self::Idle => 0,
			Self::AwaitingChip => 1,
			Self::Draining => 2,
		}
	}
}

/// State shared between a worker and its port.
pub(crate) struct WorkerShared<E> {
	state: AtomicU8,
	cancel: AtomicBool,
	stop: AtomicBool,
	error: Mutex<Option<TransferError<E>>>,
	buffer: Mutex<BufferState>,
}

impl<E> WorkerShared<E> {
	pub fn new(buffer_size: usize) -> Self {
		Self {
			state: AtomicU8::new(TransferState::Idle.to_raw()),
			cancel: AtomicBool::new(false),
			stop: AtomicBool::new(false),
			error: Mutex::new(None),
			buffer: Mutex::new(BufferState {
				capacity: buffer_size,
				rx_pending: 0,
				tx_pending: 0,
				busy: false,
			}),
		}
	}

	pub fn state(&self) -> TransferState {
		TransferState::from_raw(self.state.load(Ordering::Acquire))
	}

	/// Ask the worker to abandon the current write.
	pub fn cancel(&self) {
		self.cancel.store(true, Ordering::Release);
	}

	/// Ask the worker to stop.
	pub fn stop(&self) {
		self.stop.store(true, Ordering::Release);
	}

	pub fn take_error(&self) -> Option<TransferError<E>> {
		self.error.lock().unwrap_or_else(|e| e.into_inner()).take()
	}

	pub fn buffer_state(&self) -> BufferState {
		*self.buffer.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Store a status reported by the chip and return the new buffer state.
	pub fn update_buffer_state(&self, status: &ChannelStatus) -> BufferState {
		let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
		buffer.rx_pending = status.rx_pending;
		buffer.tx_pending = status.tx_pending;
		buffer.busy = status.busy;
		*buffer
	}

	fn set_state(&self, state: TransferState) {
		self.state.store(state.to_raw(), Ordering::Release);
	}

	fn should_abort(&self) -> bool {
		self.stop.load(Ordering::Acquire) || self.cancel.load(Ordering::Acquire)
	}
}

pub(crate) struct Worker<C: ChipTransactor> {
	channel: Channel<C>,
	buffer_size: usize,
	waiter: Box<dyn WaitStrategy>,
	shared: Arc<WorkerShared<C::Error>>,

	/// Data received from the chip that did not fit in the bridge yet.
	pending_rx: Vec<u8>,
}

impl<C: ChipTransactor> Worker<C> {
	pub fn new(channel: Channel<C>, buffer_size: usize, waiter: Box<dyn WaitStrategy>, shared: Arc<WorkerShared<C::Error>>) -> Self {
		Self {
			channel,
			buffer_size,
			waiter,
			shared,
			pending_rx: Vec::new(),
		}
	}

	/// Move data between the bridge and the chip until the port is closed.
	///
	/// The bridge must be in non-blocking mode.
	pub fn run(mut self, bridge: UnixStream) {
		debug!("worker started for channel {}", self.channel.id());
		let mut tx_buffer = vec![0; self.buffer_size];
		let mut rx_buffer = vec![0; self.buffer_size];

		while !self.shared.stop.load(Ordering::Acquire) {
			let mut progress = false;

			match (&bridge).read(&mut tx_buffer) {
				Ok(0) => {
					debug!("byte-stream bridge closed by application");
					break;
				},
				Ok(read) => {
					progress = true;
					match self.transmit(&tx_buffer[..read]) {
						Ok(_) => (),
						Err(e @ TransferError::Cancelled { .. }) => {
							discard_input(&bridge, &mut tx_buffer);
							self.report(e);
						},
						Err(e) => self.report(e),
					}
				},
				Err(e) if is_transient(&e) => self.settle(),
				Err(e) => {
					self.report(TransferError::Bridge(e));
					break;
				},
			}

			// Don't take new data from the chip until the application consumed the previous data.
			// That way the receive count of the chip stays accurate.
			if self.pending_rx.is_empty() {
				match self.receive(&mut rx_buffer) {
					Ok(0) => (),
					Ok(received) => self.pending_rx.extend_from_slice(&rx_buffer[..received]),
					Err(e) => self.report(e),
				}
			}

			if !self.pending_rx.is_empty() {
				match (&bridge).write(&self.pending_rx) {
					Ok(written) => {
						self.pending_rx.drain(..written);
						progress = true;
					},
					Err(e) if is_transient(&e) => (),
					Err(e) => {
						self.report(TransferError::Bridge(e));
						break;
					},
				}
			}

			if !progress {
				if let Err(e) = self.waiter.wait() {
					self.report(TransferError::Wait(e));
				}
			}
		}
		self.shared.set_state(TransferState::Idle);
		debug!("worker stopped for channel {}", self.channel.id());
	}

	/// Write data to the chip, in chunks of at most the buffer size.
	///
	/// Each chunk is followed by a drain: the worker waits until the chip is no longer busy.
	/// Returns the number of bytes accepted by the chip.
	///
	/// On success the state stays [`TransferState::Draining`], since more data for the same transfer may follow.
	/// On failure the state is [`TransferState::Idle`].
	pub fn transmit(&mut self, data: &[u8]) -> Result<usize, TransferError<C::Error>> {
		let mut written = 0;
		while written < data.len() {
			if self.shared.should_abort() {
				return Err(self.cancelled(written));
			}
			let end = data.len().min(written + self.buffer_size);
			self.shared.set_state(TransferState::AwaitingChip);
			let accepted = match self.channel.write(&data[written..end]) {
				Ok(x) => x,
				Err(e) => {
					self.shared.set_state(TransferState::Idle);
					return Err(e.into());
				},
			};
			trace!("chip accepted {} of {} bytes", accepted, end - written);
			written += accepted;

			self.shared.set_state(TransferState::Draining);
			if let Err(e) = self.drain(written) {
				self.shared.set_state(TransferState::Idle);
				return Err(e);
			}

			// The transmit buffer was full, give the chip some time before offering the data again.
			if accepted == 0 {
				if let Err(e) = self.waiter.wait() {
					self.shared.set_state(TransferState::Idle);
					return Err(TransferError::Wait(e));
				}
			}
		}
		Ok(written)
	}

	/// Return to idle after the byte stream ran empty.
	///
	/// A cancel request that arrives while idle has nothing to cancel, so it is dropped here.
	fn settle(&self) {
		if self.shared.state() != TransferState::Idle {
			trace!("transfer on channel {} complete", self.channel.id());
			self.shared.set_state(TransferState::Idle);
		}
		self.shared.cancel.store(false, Ordering::Release);
	}

	/// Take received data from the chip without waiting.
	///
	/// Returns 0 if the chip has no received data.
	pub fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, TransferError<C::Error>> {
		let status = self.query_status()?;
		if status.rx_pending == 0 {
			return Ok(0);
		}
		let count = buffer.len().min(status.rx_pending).min(self.buffer_size);
		let received = self.channel.read(&mut buffer[..count])?;
		trace!("received {} bytes from chip: {:02X?}", received, &buffer[..received]);
		Ok(received)
	}

	/// Wait until the chip is no longer busy.
	fn drain(&mut self, written: usize) -> Result<(), TransferError<C::Error>> {
		loop {
			if !self.query_status()?.busy {
				return Ok(());
			}
			if self.shared.should_abort() {
				return Err(self.cancelled(written));
			}
			self.waiter.wait().map_err(TransferError::Wait)?;
		}
	}

	fn query_status(&self) -> Result<BufferState, TransactionError<C::Error>> {
		let status = self.channel.status()?;
		Ok(self.shared.update_buffer_state(&status))
	}

	fn cancelled(&self, written: usize) -> TransferError<C::Error> {
		self.shared.cancel.store(false, Ordering::Release);
		self.shared.set_state(TransferState::Idle);
		debug!("transfer cancelled after {} bytes", written);
		TransferError::Cancelled { written }
	}

	/// Keep an error for the port to pick up.
	fn report(&self, error: TransferError<C::Error>) {
		if !matches!(error, TransferError::Cancelled { .. }) {
			error!("transfer on channel {} failed: {}", self.channel.id(), error);
		}
		*self.shared.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
	}
}

/// Throw away all data the application already wrote to the bridge.
fn discard_input(mut bridge: &UnixStream, buffer: &mut [u8]) {
	let mut discarded = 0;
	loop {
		match bridge.read(buffer) {
			Ok(0) => break,
			Ok(read) => discarded += read,
			Err(e) if e.kind() == std::io::ErrorKind::Interrupted => (),
			Err(_) => break,
		}
	}
	debug!("discarded {} bytes of cancelled data", discarded);
}

fn is_transient(error: &std::io::Error) -> bool {
	matches!(error.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted)
}
