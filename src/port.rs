use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{CloseError, ConfigError, OpenError, PortClosed, QueryError, TransactionError, TransferError, UnsupportedSetting};
use crate::irq::{wait_strategy, IrqSource};
use crate::line::{Capabilities, DataBits, FlowControl, LineCode, LineConfig, LineSetting, Parity, Setting, StopBits};
use crate::protocol::Channel;
use crate::worker::{TransferState, Worker, WorkerShared};
use crate::ChipTransactor;

/// Options for opening a [`Port`].
#[derive(Debug, Clone)]
pub struct PortOptions {
	/// Interval between status queries when the port has no interrupt source.
	pub poll_interval: Duration,

	/// Maximum time to wait for an edge on the interrupt source.
	///
	/// The worker checks for new data from the application after each timeout.
	pub edge_timeout: Duration,

	/// Name of the worker thread.
	///
	/// Defaults to `chipio-serial-{channel}`.
	pub thread_name: Option<String>,
}

impl Default for PortOptions {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_millis(5),
			edge_timeout: Duration::from_millis(50),
			thread_name: None,
		}
	}
}

/// Buffer capacity and occupancy of a serial channel, as last reported by the chip.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferState {
	/// Size of the chip side buffers, fixed when the port is opened.
	pub capacity: usize,

	/// Number of received bytes waiting in the chip.
	pub rx_pending: usize,

	/// Number of bytes waiting in the transmit buffer of the chip.
	pub tx_pending: usize,

	/// The chip is still processing submitted data.
	pub busy: bool,
}

/// A virtual serial port on a ChipIo expander.
///
/// The application exchanges data with the port through a non-blocking byte stream,
/// available with [`Self::stream()`] or [`Self::file_descriptor()`].
/// A background worker moves the data between the stream and the chip.
///
/// Line settings and status are accessed with the methods of the port directly.
/// Each of these performs at most one chip transaction.
pub struct Port<C: ChipTransactor> {
	channel: Channel<C>,
	irq: Option<Arc<dyn IrqSource>>,
	name: String,
	capabilities: Capabilities,
	line_config: LineConfig,
	stream: Option<UnixStream>,
	raw_fd: RawFd,
	worker: Option<JoinHandle<()>>,
	shared: Arc<WorkerShared<C::Error>>,
}

impl<C> Port<C>
where
	C: ChipTransactor + Send + Sync + 'static,
	C::Error: Send + 'static,
{
	/// Open a new serial port on a chip with the default options.
	///
	/// If `irq` is given, the worker waits for edges on the interrupt line instead of polling the chip.
	/// The port only keeps a handle to the chip and the interrupt source, it never closes them.
	pub fn open(chip: Arc<C>, irq: Option<Arc<dyn IrqSource>>) -> Result<Self, OpenError<C::Error>> {
		Self::open_with_options(chip, irq, PortOptions::default())
	}

	/// Open a new serial port on a chip.
	pub fn open_with_options(chip: Arc<C>, irq: Option<Arc<dyn IrqSource>>, options: PortOptions) -> Result<Self, OpenError<C::Error>> {
		if !chip.is_connected() {
			return Err(OpenError::NotConnected);
		}

		let channel = Channel::open(chip).map_err(|e| match e {
			TransactionError::Bus(e) => OpenError::Rejected(e),
			e => OpenError::Handshake(e),
		})?;
		debug!("allocated serial channel {}", channel.id());

		match Self::start(channel.clone(), irq, options) {
			Ok(port) => Ok(port),
			Err(e) => {
				if let Err(e) = channel.close() {
					warn!("failed to release serial channel {} after failed open: {}", channel.id(), e);
				}
				Err(e)
			},
		}
	}

	fn start(channel: Channel<C>, irq: Option<Arc<dyn IrqSource>>, options: PortOptions) -> Result<Self, OpenError<C::Error>> {
		let info = channel.info()?;
		let line_config = channel.line_config()?;
		let buffer_size = match info.buffer_size {
			0 => {
				warn!("chip reported a buffer size of 0 for channel {}, using 1", channel.id());
				1
			},
			x => x,
		};

		let chunk_size = match channel.max_data_size() {
			Some(max) if max < buffer_size => {
				debug!("limiting transfers on channel {} to {} bytes per transaction", channel.id(), max);
				max
			},
			_ => buffer_size,
		};

		let (stream, bridge) = UnixStream::pair().map_err(OpenError::Bridge)?;
		stream.set_nonblocking(true).map_err(OpenError::Bridge)?;
		bridge.set_nonblocking(true).map_err(OpenError::Bridge)?;

		let shared = Arc::new(WorkerShared::new(buffer_size));
		let waiter = wait_strategy(irq.clone(), options.poll_interval, options.edge_timeout);
		let worker = Worker::new(channel.clone(), chunk_size, waiter, shared.clone());
		let thread_name = options.thread_name.unwrap_or_else(|| format!("chipio-serial-{}", channel.id()));
		let worker = std::thread::Builder::new()
			.name(thread_name)
			.spawn(move || worker.run(bridge))
			.map_err(OpenError::Worker)?;

		debug!("opened serial port {:?} on channel {}: {}", info.name, channel.id(), line_config);
		Ok(Self {
			channel,
			irq,
			name: info.name,
			capabilities: info.capabilities,
			line_config,
			raw_fd: stream.as_raw_fd(),
			stream: Some(stream),
			worker: Some(worker),
			shared,
		})
	}
}

impl<C: ChipTransactor> Port<C> {
	/// Close the port.
	///
	/// This stops the worker, closes the byte stream and releases the serial channel on the chip.
	/// The port is closed afterwards even if an error is returned.
	/// Closing a port that is already closed does nothing.
	pub fn close(&mut self) -> Result<(), CloseError<C::Error>> {
		if self.stream.is_none() {
			return Ok(());
		}

		self.shared.stop();
		let worker = self.worker.take().map(|worker| worker.join());
		self.stream = None;
		let released = self.channel.close();
		debug!("closed serial port {:?} on channel {}", self.name, self.channel.id());

		if let Some(Err(_)) = worker {
			return Err(CloseError::Worker);
		}
		released.map_err(CloseError::Release)
	}

	/// Check if the port is still open.
	pub fn is_open(&self) -> bool {
		self.stream.is_some()
	}

	/// The raw file descriptor of the application end of the byte stream.
	///
	/// The file descriptor is in non-blocking mode.
	/// It stays the same for the lifetime of the port, but it is only valid until the port is closed.
	pub fn file_descriptor(&self) -> RawFd {
		self.raw_fd
	}

	/// The application end of the byte stream.
	///
	/// Data written to the stream is transmitted by the chip,
	/// and data received by the chip can be read from it.
	pub fn stream(&self) -> Result<&UnixStream, PortClosed> {
		self.stream.as_ref().ok_or(PortClosed)
	}

	/// The name of the port as reported by the chip.
	pub fn port_name(&self) -> Result<&str, PortClosed> {
		self.check_open()?;
		Ok(&self.name)
	}

	/// The channel number assigned by the chip.
	pub fn channel_id(&self) -> u8 {
		self.channel.id()
	}

	/// The line settings supported by the chip.
	pub fn capabilities(&self) -> Capabilities {
		self.capabilities
	}

	/// Check if the worker waits on an interrupt source instead of polling.
	pub fn uses_interrupts(&self) -> bool {
		self.irq.is_some()
	}

	/// Query the chip for the number of received bytes that have not been read yet.
	///
	/// Bytes already moved to the byte stream by the worker are not included.
	pub fn bytes_available(&self) -> Result<usize, QueryError<C::Error>> {
		Ok(self.status()?.rx_pending)
	}

	/// Query the chip to check if it is still processing submitted data.
	pub fn is_busy(&self) -> Result<bool, QueryError<C::Error>> {
		Ok(self.status()?.busy)
	}

	/// The size of the chip side buffers.
	///
	/// This does not perform a chip transaction.
	pub fn buffer_size(&self) -> Result<usize, QueryError<C::Error>> {
		self.check_open()?;
		Ok(self.shared.buffer_state().capacity)
	}

	/// Query the chip for the buffer occupancy and busy flag of the channel.
	pub fn status(&self) -> Result<BufferState, QueryError<C::Error>> {
		self.check_open()?;
		let status = self.channel.status()?;
		Ok(self.shared.update_buffer_state(&status))
	}

	/// The buffer state from the last status query, by the application or by the worker.
	///
	/// This does not perform a chip transaction, so the values may be outdated.
	pub fn cached_status(&self) -> BufferState {
		self.shared.buffer_state()
	}

	/// The current state of the transmit state machine.
	pub fn transfer_state(&self) -> TransferState {
		self.shared.state()
	}

	/// Take the error that aborted the last failed transfer, if any.
	pub fn take_transfer_error(&self) -> Option<TransferError<C::Error>> {
		self.shared.take_error()
	}

	/// Abandon the data that is currently being transmitted.
	///
	/// Data not yet submitted to the chip is discarded, including data waiting in the byte stream.
	/// Data already accepted by the chip will still be transmitted by the chip.
	/// If no transfer is in progress, the request is dropped as soon as the worker finds the byte stream empty.
	pub fn cancel_transfer(&self) {
		debug!("cancelling transfer on channel {}", self.channel.id());
		self.shared.cancel();
	}

	/// The current line configuration.
	pub fn line_config(&self) -> LineConfig {
		self.line_config
	}

	pub fn baud_rate(&self) -> u32 {
		self.line_config.baud_rate
	}

	pub fn data_bits(&self) -> DataBits {
		self.line_config.data_bits
	}

	pub fn parity(&self) -> Parity {
		self.line_config.parity
	}

	pub fn stop_bits(&self) -> StopBits {
		self.line_config.stop_bits
	}

	pub fn flow_control(&self) -> FlowControl {
		self.line_config.flow_control
	}

	/// Read the line configuration from the chip.
	pub fn refresh_line_config(&mut self) -> Result<LineConfig, QueryError<C::Error>> {
		self.check_open()?;
		self.line_config = self.channel.line_config()?;
		Ok(self.line_config)
	}

	/// Set the baud rate.
	///
	/// The chip may coerce the baud rate to a supported value.
	/// The committed baud rate is returned.
	pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<u32, ConfigError<C::Error>> {
		self.check_open()?;
		if baud_rate == 0 {
			return Err(UnsupportedSetting {
				setting: Setting::BaudRate,
				value: baud_rate.to_string(),
			}
			.into());
		}
		let committed = self.channel.set_baud_rate(baud_rate)?;
		if committed != baud_rate {
			debug!("chip coerced baud rate {} to {}", baud_rate, committed);
		}
		self.line_config.baud_rate = committed;
		Ok(committed)
	}

	/// Set the number of data bits and return the committed value.
	pub fn set_data_bits(&mut self, data_bits: DataBits) -> Result<DataBits, ConfigError<C::Error>> {
		self.check_supported(data_bits)?;
		let committed = self.channel.set_data_bits(data_bits)?;
		self.line_config.data_bits = committed;
		Ok(committed)
	}

	/// Set the parity and return the committed value.
	pub fn set_parity(&mut self, parity: Parity) -> Result<Parity, ConfigError<C::Error>> {
		self.check_supported(parity)?;
		let committed = self.channel.set_parity(parity)?;
		self.line_config.parity = committed;
		Ok(committed)
	}

	/// Set the number of stop bits and return the committed value.
	pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<StopBits, ConfigError<C::Error>> {
		self.check_supported(stop_bits)?;
		let committed = self.channel.set_stop_bits(stop_bits)?;
		self.line_config.stop_bits = committed;
		Ok(committed)
	}

	/// Set the flow control mode and return the committed value.
	pub fn set_flow_control(&mut self, flow_control: FlowControl) -> Result<FlowControl, ConfigError<C::Error>> {
		self.check_supported(flow_control)?;
		let committed = self.channel.set_flow_control(flow_control)?;
		self.line_config.flow_control = committed;
		Ok(committed)
	}

	/// Apply all settings of a line configuration, in order.
	///
	/// Each setting is committed separately.
	/// If a setting fails, the settings before it stay applied.
	pub fn set_line_config(&mut self, config: LineConfig) -> Result<LineConfig, ConfigError<C::Error>> {
		self.set_baud_rate(config.baud_rate)?;
		self.set_data_bits(config.data_bits)?;
		self.set_parity(config.parity)?;
		self.set_stop_bits(config.stop_bits)?;
		self.set_flow_control(config.flow_control)?;
		Ok(self.line_config)
	}

	fn check_open(&self) -> Result<(), PortClosed> {
		match self.stream {
			Some(_) => Ok(()),
			None => Err(PortClosed),
		}
	}

	fn check_supported<T>(&self, value: T) -> Result<(), ConfigError<C::Error>>
	where
		T: LineSetting + LineCode + std::fmt::Display,
	{
		self.check_open()?;
		if self.capabilities.supports(value) {
			Ok(())
		} else {
			Err(UnsupportedSetting {
				setting: T::SETTING,
				value: value.to_string(),
			}
			.into())
		}
	}
}

impl<C: ChipTransactor> AsRawFd for Port<C> {
	fn as_raw_fd(&self) -> RawFd {
		self.raw_fd
	}
}

impl<C: ChipTransactor> std::fmt::Debug for Port<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("Port")
			.field("channel", &self.channel.id())
			.field("name", &self.name)
			.field("line_config", &self.line_config)
			.field("open", &self.is_open())
			.finish_non_exhaustive()
	}
}

impl<C: ChipTransactor> Drop for Port<C> {
	fn drop(&mut self) {
		if let Err(e) = self.close() {
			error!("failed to close serial port {:?}: {}", self.name, e);
		}
	}
}
