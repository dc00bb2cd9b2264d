use chipio_serial::{command, ChipLink};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATUS_BUSY: u8 = 0x01;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MockError {
	Disconnected,
	Nack { command: u8, status: u8 },
}

impl std::fmt::Display for MockError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Disconnected => write!(f, "chip disconnected"),
			Self::Nack { command, status } => write!(f, "chip rejected command {:#04X} with status {}", command, status),
		}
	}
}

/// Simulated state of one serial channel of the chip.
#[derive(Debug, Clone)]
pub struct MockChannel {
	pub name: String,
	pub buffer_size: u16,

	/// Capability masks as sent on the wire: data bits (bit 0 = 5 bits), parity, stop bits, flow control.
	pub capabilities: [u8; 4],

	pub baud_rate: u32,
	pub supported_baud_rates: Vec<u32>,
	pub data_bits: u8,
	pub parity: u8,
	pub stop_bits: u8,
	pub flow_control: u8,

	/// Data waiting to be read by the host.
	pub rx: VecDeque<u8>,

	/// All data accepted from the host.
	pub tx: Vec<u8>,

	/// Size of each offered write.
	pub writes: Vec<usize>,

	/// Maximum number of bytes accepted per write.
	pub max_accept: Option<usize>,

	/// Number of busy status responses after each write.
	pub busy_polls: usize,

	/// Report busy until cleared.
	pub hold_busy: bool,

	/// Line codes the chip commits instead of the requested code: (command, requested) => committed.
	pub coerce: BTreeMap<(u8, u8), u8>,

	/// Remaining busy status responses for the last write.
	pub busy_left: usize,

	/// Number of bytes accepted by the last write.
	pub last_accepted: usize,
}

impl Default for MockChannel {
	fn default() -> Self {
		Self {
			name: String::from("uart"),
			buffer_size: 64,
			capabilities: [0b1111, 0b1_1111, 0b1110, 0b111],
			baud_rate: 9600,
			supported_baud_rates: vec![9600, 19_200, 57_600, 115_200],
			data_bits: 8,
			parity: 0,
			stop_bits: 1,
			flow_control: 0,
			rx: VecDeque::new(),
			tx: Vec::new(),
			writes: Vec::new(),
			max_accept: None,
			busy_polls: 0,
			hold_busy: false,
			coerce: BTreeMap::new(),
			busy_left: 0,
			last_accepted: 0,
		}
	}
}

impl MockChannel {
	pub fn is_busy(&self) -> bool {
		self.hold_busy || self.busy_left > 0
	}

	pub fn busy_left(&self) -> usize {
		self.busy_left
	}

	fn commit_code(&self, command: u8, requested: u8) -> u8 {
		self.coerce.get(&(command, requested)).copied().unwrap_or(requested)
	}
}

/// A simulated ChipIo chip.
pub struct MockChip {
	pub connected: bool,
	pub max_channels: usize,

	/// Template for newly opened channels.
	pub template: MockChannel,

	pub channels: BTreeMap<u8, MockChannel>,

	/// Reject the next transaction with this command.
	pub fail_next: Option<u8>,

	/// Time spent in each transaction.
	pub delay: Duration,

	/// All transactions: command and channel (0xFF for SERIAL_OPEN).
	pub transactions: Vec<(u8, u8)>,

	pub in_flight: Arc<AtomicUsize>,
	pub max_in_flight: Arc<AtomicUsize>,

	/// Largest payload the link can carry, larger requests and responses are rejected.
	pub max_payload_size: Option<usize>,

	/// Channel number for the next SERIAL_OPEN.
	pub next_channel: u8,
}

impl Default for MockChip {
	fn default() -> Self {
		Self {
			connected: true,
			max_channels: 4,
			template: MockChannel::default(),
			channels: BTreeMap::new(),
			fail_next: None,
			delay: Duration::ZERO,
			transactions: Vec::new(),
			in_flight: Arc::new(AtomicUsize::new(0)),
			max_in_flight: Arc::new(AtomicUsize::new(0)),
			max_payload_size: None,
			next_channel: 0,
		}
	}
}

impl MockChip {
	pub fn channel(&self, id: u8) -> &MockChannel {
		&self.channels[&id]
	}

	pub fn channel_mut(&mut self, id: u8) -> &mut MockChannel {
		self.channels.get_mut(&id).unwrap()
	}

	/// Count the transactions with a given command.
	pub fn count(&self, command: u8) -> usize {
		self.transactions.iter().filter(|x| x.0 == command).count()
	}

	fn process(&mut self, command: u8, payload: &[u8]) -> Result<Vec<u8>, MockError> {
		if !self.connected {
			return Err(MockError::Disconnected);
		}
		if self.fail_next == Some(command) {
			self.fail_next = None;
			return Err(MockError::Nack { command, status: 3 });
		}
		if self.max_payload_size.map_or(false, |max| payload.len() > max) {
			return Err(MockError::Nack { command, status: 5 });
		}

		if command == command::SERIAL_OPEN {
			self.transactions.push((command, 0xFF));
			if self.channels.len() >= self.max_channels {
				return Err(MockError::Nack { command, status: 1 });
			}
			let id = self.next_channel;
			self.next_channel += 1;
			let mut channel = self.template.clone();
			channel.name = format!("{}{}", self.template.name, id);
			self.channels.insert(id, channel);
			return Ok(vec![id]);
		}

		let id = payload[0];
		let payload = &payload[1..];
		self.transactions.push((command, id));
		let channel = self.channels.get_mut(&id).ok_or(MockError::Nack { command, status: 2 })?;

		match command {
			command::SERIAL_CLOSE => {
				self.channels.remove(&id);
				Ok(Vec::new())
			},
			command::SERIAL_INFO => {
				let mut response = channel.buffer_size.to_le_bytes().to_vec();
				response.extend_from_slice(&channel.capabilities);
				response.extend_from_slice(channel.name.as_bytes());
				Ok(response)
			},
			command::SERIAL_GET_CONFIG => {
				let mut response = channel.baud_rate.to_le_bytes().to_vec();
				response.extend_from_slice(&[channel.data_bits, channel.parity, channel.stop_bits, channel.flow_control]);
				Ok(response)
			},
			command::SERIAL_SET_BAUDRATE => {
				let requested = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
				channel.baud_rate = if channel.supported_baud_rates.contains(&requested) {
					requested
				} else {
					9600
				};
				Ok(channel.baud_rate.to_le_bytes().to_vec())
			},
			command::SERIAL_SET_DATABITS => {
				channel.data_bits = channel.commit_code(command, payload[0]);
				Ok(vec![channel.data_bits])
			},
			command::SERIAL_SET_PARITY => {
				channel.parity = channel.commit_code(command, payload[0]);
				Ok(vec![channel.parity])
			},
			command::SERIAL_SET_STOPBITS => {
				channel.stop_bits = channel.commit_code(command, payload[0]);
				Ok(vec![channel.stop_bits])
			},
			command::SERIAL_SET_FLOW => {
				channel.flow_control = channel.commit_code(command, payload[0]);
				Ok(vec![channel.flow_control])
			},
			command::SERIAL_STATUS => {
				let busy = channel.is_busy();
				channel.busy_left = channel.busy_left.saturating_sub(1);
				let tx_pending = if busy { channel.last_accepted } else { 0 };
				let mut response = vec![if busy { STATUS_BUSY } else { 0 }];
				response.extend_from_slice(&(channel.rx.len() as u16).to_le_bytes());
				response.extend_from_slice(&(tx_pending as u16).to_le_bytes());
				Ok(response)
			},
			command::SERIAL_WRITE => {
				channel.writes.push(payload.len());
				let accepted = payload.len().min(channel.max_accept.unwrap_or(usize::MAX));
				channel.tx.extend_from_slice(&payload[..accepted]);
				channel.busy_left = channel.busy_polls;
				channel.last_accepted = accepted;
				Ok((accepted as u16).to_le_bytes().to_vec())
			},
			command::SERIAL_READ => {
				let count = usize::from(u16::from_le_bytes([payload[0], payload[1]]));
				let count = count.min(channel.rx.len());
				Ok(channel.rx.drain(..count).collect())
			},
			_ => Err(MockError::Nack { command, status: 4 }),
		}
	}
}

impl ChipLink for MockChip {
	type Error = MockError;

	fn is_connected(&self) -> bool {
		self.connected
	}

	fn exchange(&mut self, command: u8, payload: &[u8]) -> Result<Vec<u8>, Self::Error> {
		let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
		if !self.delay.is_zero() {
			std::thread::sleep(self.delay);
		}
		let result = match self.process(command, payload) {
			Ok(response) if self.max_payload_size.map_or(false, |max| response.len() > max) => Err(MockError::Nack { command, status: 5 }),
			result => result,
		};
		self.in_flight.fetch_sub(1, Ordering::SeqCst);
		result
	}

	fn max_payload_size(&self) -> Option<usize> {
		self.max_payload_size
	}
}
