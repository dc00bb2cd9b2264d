//! Transactions of a serial channel on the chip.

use std::sync::Arc;

use crate::endian::{read_u16_le, read_u32_le, write_u16_le, write_u32_le};
use crate::error::{InvalidLineCode, InvalidPortName, InvalidResponseLength, TransactionError};
use crate::line::{Capabilities, DataBits, FlowControl, LineCode, LineConfig, Parity, StopBits};
use crate::ChipTransactor;

#[rustfmt::skip]
pub mod command {
	pub const SERIAL_OPEN         : u8 = 0x40;
	pub const SERIAL_CLOSE        : u8 = 0x41;
	pub const SERIAL_INFO         : u8 = 0x42;
	pub const SERIAL_GET_CONFIG   : u8 = 0x43;
	pub const SERIAL_SET_BAUDRATE : u8 = 0x44;
	pub const SERIAL_SET_DATABITS : u8 = 0x45;
	pub const SERIAL_SET_PARITY   : u8 = 0x46;
	pub const SERIAL_SET_STOPBITS : u8 = 0x47;
	pub const SERIAL_SET_FLOW     : u8 = 0x48;
	pub const SERIAL_STATUS       : u8 = 0x49;
	pub const SERIAL_WRITE        : u8 = 0x4A;
	pub const SERIAL_READ         : u8 = 0x4B;
}

/// Bit in the status flags that is set while the channel is busy.
pub const STATUS_BUSY: u8 = 0x01;

const INFO_HEADER_SIZE: usize = 6;
const CONFIG_SIZE: usize = 8;
const STATUS_SIZE: usize = 5;

/// Information reported by the chip when a channel is opened.
#[derive(Debug, Clone)]
pub(crate) struct ChannelInfo {
	pub buffer_size: usize,
	pub capabilities: Capabilities,
	pub name: String,
}

/// Status of a channel as reported by the chip.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct ChannelStatus {
	pub busy: bool,
	pub rx_pending: usize,
	pub tx_pending: usize,
}

/// A serial channel on a chip.
///
/// Cloning the channel gives another handle to the same channel.
pub(crate) struct Channel<C> {
	chip: Arc<C>,
	id: u8,
}

impl<C> Clone for Channel<C> {
	fn clone(&self) -> Self {
		Self {
			chip: self.chip.clone(),
			id: self.id,
		}
	}
}

impl<C: ChipTransactor> Channel<C> {
	/// Ask the chip to allocate a new serial channel.
	pub fn open(chip: Arc<C>) -> Result<Self, TransactionError<C::Error>> {
		let response = chip.transact(command::SERIAL_OPEN, &[]).map_err(TransactionError::Bus)?;
		InvalidResponseLength::check(command::SERIAL_OPEN, response.len(), 1)?;
		Ok(Self { chip, id: response[0] })
	}

	/// The channel number assigned by the chip.
	pub fn id(&self) -> u8 {
		self.id
	}

	/// The largest amount of serial data a single write or read transaction can carry, if limited by the chip link.
	pub fn max_data_size(&self) -> Option<usize> {
		self.chip.max_payload_size().map(|max| max.saturating_sub(1).max(1))
	}

	/// Release the channel on the chip.
	pub fn close(&self) -> Result<(), TransactionError<C::Error>> {
		self.transact(command::SERIAL_CLOSE, &[])?;
		Ok(())
	}

	/// Query the buffer size, capabilities and name of the channel.
	pub fn info(&self) -> Result<ChannelInfo, TransactionError<C::Error>> {
		let response = self.transact(command::SERIAL_INFO, &[])?;
		InvalidResponseLength::check_min(command::SERIAL_INFO, response.len(), INFO_HEADER_SIZE)?;
		// The data bits mask starts at 5 bits to fit in a single byte.
		let capabilities = Capabilities {
			data_bits: u16::from(response[2]) << 5,
			parity: response[3],
			stop_bits: response[4],
			flow_control: response[5],
		};
		let name = &response[INFO_HEADER_SIZE..];
		let name = std::str::from_utf8(name).map_err(|_| InvalidPortName { raw: name.to_vec() })?;
		Ok(ChannelInfo {
			buffer_size: read_u16_le(&response[0..]).into(),
			capabilities,
			name: name.to_owned(),
		})
	}

	/// Read the current line configuration of the channel.
	pub fn line_config(&self) -> Result<LineConfig, TransactionError<C::Error>> {
		let response = self.transact(command::SERIAL_GET_CONFIG, &[])?;
		InvalidResponseLength::check(command::SERIAL_GET_CONFIG, response.len(), CONFIG_SIZE)?;
		Ok(LineConfig {
			baud_rate: read_u32_le(&response[0..]),
			data_bits: decode_code(response[4])?,
			parity: decode_code(response[5])?,
			stop_bits: decode_code(response[6])?,
			flow_control: decode_code(response[7])?,
		})
	}

	/// Set the baud rate and return the value committed by the chip.
	pub fn set_baud_rate(&self, baud_rate: u32) -> Result<u32, TransactionError<C::Error>> {
		let mut payload = [0; 4];
		write_u32_le(&mut payload, baud_rate);
		let response = self.transact(command::SERIAL_SET_BAUDRATE, &payload)?;
		InvalidResponseLength::check(command::SERIAL_SET_BAUDRATE, response.len(), 4)?;
		Ok(read_u32_le(&response))
	}

	pub fn set_data_bits(&self, value: DataBits) -> Result<DataBits, TransactionError<C::Error>> {
		self.set_code(command::SERIAL_SET_DATABITS, value)
	}

	pub fn set_parity(&self, value: Parity) -> Result<Parity, TransactionError<C::Error>> {
		self.set_code(command::SERIAL_SET_PARITY, value)
	}

	pub fn set_stop_bits(&self, value: StopBits) -> Result<StopBits, TransactionError<C::Error>> {
		self.set_code(command::SERIAL_SET_STOPBITS, value)
	}

	pub fn set_flow_control(&self, value: FlowControl) -> Result<FlowControl, TransactionError<C::Error>> {
		self.set_code(command::SERIAL_SET_FLOW, value)
	}

	/// Query the busy flag and buffer occupancy of the channel.
	pub fn status(&self) -> Result<ChannelStatus, TransactionError<C::Error>> {
		let response = self.transact(command::SERIAL_STATUS, &[])?;
		InvalidResponseLength::check(command::SERIAL_STATUS, response.len(), STATUS_SIZE)?;
		Ok(ChannelStatus {
			busy: response[0] & STATUS_BUSY != 0,
			rx_pending: read_u16_le(&response[1..]).into(),
			tx_pending: read_u16_le(&response[3..]).into(),
		})
	}

	/// Submit data to the transmit buffer of the channel.
	///
	/// Returns the number of bytes accepted by the chip.
	pub fn write(&self, data: &[u8]) -> Result<usize, TransactionError<C::Error>> {
		let response = self.transact(command::SERIAL_WRITE, data)?;
		InvalidResponseLength::check(command::SERIAL_WRITE, response.len(), 2)?;
		let accepted = usize::from(read_u16_le(&response));
		InvalidResponseLength::check_max(command::SERIAL_WRITE, accepted, data.len())?;
		Ok(accepted)
	}

	/// Take received data from the receive buffer of the channel.
	///
	/// The chip may return fewer bytes than requested.
	pub fn read(&self, buffer: &mut [u8]) -> Result<usize, TransactionError<C::Error>> {
		let count = buffer.len().min(usize::from(u16::MAX));
		let mut payload = [0; 2];
		write_u16_le(&mut payload, count as u16);
		let response = self.transact(command::SERIAL_READ, &payload)?;
		InvalidResponseLength::check_max(command::SERIAL_READ, response.len(), count)?;
		buffer[..response.len()].copy_from_slice(&response);
		Ok(response.len())
	}

	fn set_code<T: LineCode>(&self, command: u8, value: T) -> Result<T, TransactionError<C::Error>> {
		let response = self.transact(command, &[value.code()])?;
		InvalidResponseLength::check(command, response.len(), 1)?;
		Ok(decode_code(response[0])?)
	}

	/// Perform a transaction with the channel number prepended to the payload.
	fn transact(&self, command: u8, payload: &[u8]) -> Result<Vec<u8>, TransactionError<C::Error>> {
		let mut request = Vec::with_capacity(payload.len() + 1);
		request.push(self.id);
		request.extend_from_slice(payload);
		self.chip.transact(command, &request).map_err(TransactionError::Bus)
	}
}

fn decode_code<T: LineCode>(raw: u8) -> Result<T, InvalidLineCode> {
	T::from_code(raw).ok_or(InvalidLineCode { setting: T::SETTING, raw })
}
