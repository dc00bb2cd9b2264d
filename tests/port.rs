use assert2::{assert, let_assert};
use chipio_serial::{
	command, Capabilities, CloseError, ConfigError, DataBits, FlowControl, LineConfig, OpenError, Parity, Port, PortOptions, QueryError,
	Setting, StopBits, TransactionError, TransferState,
};
use std::collections::BTreeMap;
use std::time::Duration;
use test_log::test;

mod common;
use common::{new_chip, open_port, wait_until, GateIrq, MockChannel, MockChip, MockError, TIMEOUT};

#[test]
fn test_open_handshake() {
	let chip = new_chip(MockChip {
		template: MockChannel {
			name: String::from("ttyCHIP"),
			baud_rate: 57_600,
			parity: 1,
			..Default::default()
		},
		..Default::default()
	});
	let port = open_port(&chip);

	assert!(port.channel_id() == 0);
	assert!(let Ok("ttyCHIP0") = port.port_name());
	assert!(let Ok(64) = port.buffer_size());
	assert!(port.capabilities() == Capabilities::ALL);
	assert!(port.baud_rate() == 57_600);
	assert!(port.parity() == Parity::Even);
	assert!(port.data_bits() == DataBits::Eight);
	assert!(!port.uses_interrupts());
	assert!(port.transfer_state() == TransferState::Idle);

	assert!(let Ok(0) = port.bytes_available());
	assert!(let Ok(false) = port.is_busy());
	assert!(port.take_transfer_error().is_none());

	chip.with_link(|mock| {
		assert!(mock.transactions[..3] == [(command::SERIAL_OPEN, 0xFF), (command::SERIAL_INFO, 0), (command::SERIAL_GET_CONFIG, 0)]);
	});
}

#[test]
fn test_file_descriptor_is_stable() {
	use std::os::unix::io::AsRawFd;

	let chip = new_chip(MockChip::default());
	let port = open_port(&chip);
	let_assert!(Ok(stream) = port.stream());
	assert!(port.file_descriptor() == stream.as_raw_fd());
	assert!(port.as_raw_fd() == port.file_descriptor());
}

#[test]
fn test_open_not_connected() {
	let chip = new_chip(MockChip {
		connected: false,
		..Default::default()
	});
	assert!(let Err(OpenError::NotConnected) = Port::open(chip.clone(), None));
	chip.with_link(|mock| assert!(mock.transactions.is_empty()));
}

#[test]
fn test_open_rejected() {
	let chip = new_chip(MockChip {
		max_channels: 1,
		..Default::default()
	});
	let _port = open_port(&chip);
	let_assert!(Err(OpenError::Rejected(e)) = Port::open(chip.clone(), None));
	assert!(e == MockError::Nack { command: command::SERIAL_OPEN, status: 1 });
}

#[test]
fn test_failed_handshake_releases_channel() {
	let chip = new_chip(MockChip {
		fail_next: Some(command::SERIAL_INFO),
		..Default::default()
	});
	let_assert!(Err(OpenError::Handshake(TransactionError::Bus(_))) = Port::open(chip.clone(), None));
	chip.with_link(|mock| {
		assert!(mock.channels.is_empty());
		assert!(mock.count(command::SERIAL_CLOSE) == 1);
	});
}

#[test]
fn test_invalid_handshake_response() {
	let chip = new_chip(MockChip {
		template: MockChannel {
			// Not a valid parity code.
			parity: 9,
			..Default::default()
		},
		..Default::default()
	});
	let_assert!(Err(OpenError::Handshake(TransactionError::InvalidResponse(_))) = Port::open(chip.clone(), None));
	chip.with_link(|mock| assert!(mock.channels.is_empty()));
}

#[test]
fn test_set_baud_rate() {
	let chip = new_chip(MockChip::default());
	let mut port = open_port(&chip);

	assert!(let Ok(115_200) = port.set_baud_rate(115_200));
	assert!(port.baud_rate() == 115_200);

	// The chip does not support this baud rate and falls back to 9600.
	assert!(let Ok(9600) = port.set_baud_rate(12_345));
	assert!(port.baud_rate() == 9600);
	chip.with_link(|mock| assert!(mock.channel(0).baud_rate == 9600));

	let_assert!(Err(ConfigError::Unsupported(e)) = port.set_baud_rate(0));
	assert!(e.setting == Setting::BaudRate);
	assert!(port.baud_rate() == 9600);
}

#[test]
fn test_set_line_settings() {
	let chip = new_chip(MockChip::default());
	let mut port = open_port(&chip);

	assert!(let Ok(DataBits::Seven) = port.set_data_bits(DataBits::Seven));
	assert!(let Ok(Parity::Odd) = port.set_parity(Parity::Odd));
	assert!(let Ok(StopBits::OneAndHalf) = port.set_stop_bits(StopBits::OneAndHalf));
	assert!(let Ok(FlowControl::Software) = port.set_flow_control(FlowControl::Software));

	assert!(port.data_bits() == DataBits::Seven);
	assert!(port.parity() == Parity::Odd);
	assert!(port.stop_bits() == StopBits::OneAndHalf);
	assert!(port.flow_control() == FlowControl::Software);

	chip.with_link(|mock| {
		let channel = mock.channel(0);
		assert!(channel.data_bits == 7);
		assert!(channel.parity == 2);
		assert!(channel.stop_bits == 3);
		assert!(channel.flow_control == 2);
	});
}

#[test]
fn test_set_coerced_line_settings() {
	let mut coerce = BTreeMap::new();
	coerce.insert((command::SERIAL_SET_DATABITS, 5), 8);
	coerce.insert((command::SERIAL_SET_PARITY, 4), 3);
	coerce.insert((command::SERIAL_SET_STOPBITS, 3), 2);
	coerce.insert((command::SERIAL_SET_FLOW, 2), 1);
	let chip = new_chip(MockChip {
		template: MockChannel { coerce, ..Default::default() },
		..Default::default()
	});
	let mut port = open_port(&chip);

	// The chip accepts the request but commits a different value.
	assert!(let Ok(DataBits::Eight) = port.set_data_bits(DataBits::Five));
	assert!(port.data_bits() == DataBits::Eight);
	assert!(let Ok(Parity::Space) = port.set_parity(Parity::Mark));
	assert!(port.parity() == Parity::Space);
	assert!(let Ok(StopBits::Two) = port.set_stop_bits(StopBits::OneAndHalf));
	assert!(port.stop_bits() == StopBits::Two);
	assert!(let Ok(FlowControl::Hardware) = port.set_flow_control(FlowControl::Software));
	assert!(port.flow_control() == FlowControl::Hardware);

	chip.with_link(|mock| {
		let channel = mock.channel(0);
		assert!(channel.data_bits == 8);
		assert!(channel.parity == 3);
		assert!(channel.stop_bits == 2);
		assert!(channel.flow_control == 1);
	});

	// Values without coercion are committed as requested.
	assert!(let Ok(DataBits::Six) = port.set_data_bits(DataBits::Six));
	assert!(port.data_bits() == DataBits::Six);
	assert!(let Ok(StopBits::One) = port.set_stop_bits(StopBits::One));
	assert!(port.stop_bits() == StopBits::One);
	assert!(let Ok(FlowControl::None) = port.set_flow_control(FlowControl::None));
	assert!(port.flow_control() == FlowControl::None);
	assert!(port.line_config() == LineConfig {
		baud_rate: 9600,
		data_bits: DataBits::Six,
		parity: Parity::Space,
		stop_bits: StopBits::One,
		flow_control: FlowControl::None,
	});
}

#[test]
fn test_failed_set_keeps_cached_value() {
	let chip = new_chip(MockChip::default());
	let mut port = open_port(&chip);
	assert!(let Ok(Parity::Even) = port.set_parity(Parity::Even));
	assert!(let Ok(57_600) = port.set_baud_rate(57_600));

	chip.with_link(|mock| mock.fail_next = Some(command::SERIAL_SET_PARITY));
	let_assert!(Err(ConfigError::Transaction(TransactionError::Bus(e))) = port.set_parity(Parity::Odd));
	assert!(e == MockError::Nack { command: command::SERIAL_SET_PARITY, status: 3 });
	assert!(port.parity() == Parity::Even);

	chip.with_link(|mock| mock.fail_next = Some(command::SERIAL_SET_BAUDRATE));
	assert!(let Err(ConfigError::Transaction(_)) = port.set_baud_rate(115_200));
	assert!(port.baud_rate() == 57_600);
}

#[test]
fn test_failed_set_keeps_cached_line_settings() {
	let chip = new_chip(MockChip::default());
	let mut port = open_port(&chip);
	assert!(let Ok(DataBits::Seven) = port.set_data_bits(DataBits::Seven));
	assert!(let Ok(StopBits::Two) = port.set_stop_bits(StopBits::Two));
	assert!(let Ok(FlowControl::Hardware) = port.set_flow_control(FlowControl::Hardware));

	chip.with_link(|mock| mock.fail_next = Some(command::SERIAL_SET_DATABITS));
	let_assert!(Err(ConfigError::Transaction(TransactionError::Bus(e))) = port.set_data_bits(DataBits::Six));
	assert!(e == MockError::Nack { command: command::SERIAL_SET_DATABITS, status: 3 });
	assert!(port.data_bits() == DataBits::Seven);

	chip.with_link(|mock| mock.fail_next = Some(command::SERIAL_SET_STOPBITS));
	let_assert!(Err(ConfigError::Transaction(TransactionError::Bus(e))) = port.set_stop_bits(StopBits::One));
	assert!(e == MockError::Nack { command: command::SERIAL_SET_STOPBITS, status: 3 });
	assert!(port.stop_bits() == StopBits::Two);

	chip.with_link(|mock| mock.fail_next = Some(command::SERIAL_SET_FLOW));
	let_assert!(Err(ConfigError::Transaction(TransactionError::Bus(e))) = port.set_flow_control(FlowControl::Software));
	assert!(e == MockError::Nack { command: command::SERIAL_SET_FLOW, status: 3 });
	assert!(port.flow_control() == FlowControl::Hardware);

	// The chip still has the last committed values.
	chip.with_link(|mock| {
		let channel = mock.channel(0);
		assert!(channel.data_bits == 7);
		assert!(channel.stop_bits == 2);
		assert!(channel.flow_control == 1);
	});
}

#[test]
fn test_unsupported_setting() {
	let chip = new_chip(MockChip {
		template: MockChannel {
			// 8 data bits only, no or even parity, 1 stop bit, no flow control.
			capabilities: [0b1000, 0b11, 0b10, 0b1],
			..Default::default()
		},
		..Default::default()
	});
	let mut port = open_port(&chip);
	assert!(port.capabilities().supports(Parity::Even));

	let_assert!(Err(ConfigError::Unsupported(e)) = port.set_parity(Parity::Mark));
	assert!(e.setting == Setting::Parity);
	assert!(let Err(ConfigError::Unsupported(_)) = port.set_data_bits(DataBits::Seven));
	assert!(let Err(ConfigError::Unsupported(_)) = port.set_stop_bits(StopBits::Two));
	assert!(let Err(ConfigError::Unsupported(_)) = port.set_flow_control(FlowControl::Hardware));
	assert!(port.line_config() == LineConfig::default());

	// Rejected settings are never sent to the chip.
	chip.with_link(|mock| {
		assert!(mock.count(command::SERIAL_SET_PARITY) == 0);
		assert!(mock.count(command::SERIAL_SET_DATABITS) == 0);
	});

	assert!(let Ok(Parity::Even) = port.set_parity(Parity::Even));
}

#[test]
fn test_set_line_config() {
	let chip = new_chip(MockChip::default());
	let mut port = open_port(&chip);

	let config = LineConfig {
		baud_rate: 19_200,
		data_bits: DataBits::Six,
		parity: Parity::Space,
		stop_bits: StopBits::Two,
		flow_control: FlowControl::Hardware,
	};
	assert!(let Ok(_) = port.set_line_config(config));
	assert!(port.line_config() == config);

	// Change the configuration behind the back of the port.
	chip.with_link(|mock| mock.channel_mut(0).baud_rate = 115_200);
	assert!(port.baud_rate() == 19_200);
	let_assert!(Ok(refreshed) = port.refresh_line_config());
	assert!(refreshed.baud_rate == 115_200);
	assert!(port.baud_rate() == 115_200);
	assert!(port.parity() == Parity::Space);
}

#[test]
fn test_close() {
	let chip = new_chip(MockChip::default());
	let mut port = open_port(&chip);

	assert!(let Ok(()) = port.close());
	assert!(!port.is_open());
	chip.with_link(|mock| assert!(mock.channels.is_empty()));
	let transactions = chip.with_link(|mock| mock.transactions.len());

	// Closing twice does nothing.
	assert!(let Ok(()) = port.close());

	assert!(let Err(_) = port.stream());
	assert!(let Err(_) = port.port_name());
	assert!(let Err(QueryError::Closed) = port.bytes_available());
	assert!(let Err(QueryError::Closed) = port.buffer_size());
	assert!(let Err(ConfigError::Closed) = port.set_baud_rate(115_200));
	assert!(let Err(ConfigError::Closed) = port.set_parity(Parity::Even));

	std::thread::sleep(Duration::from_millis(20));
	chip.with_link(|mock| assert!(mock.transactions.len() == transactions));
}

#[test]
fn test_close_release_failure() {
	let chip = new_chip(MockChip::default());
	let mut port = open_port(&chip);
	chip.with_link(|mock| mock.fail_next = Some(command::SERIAL_CLOSE));
	assert!(let Err(CloseError::Release(_)) = port.close());
	assert!(!port.is_open());
	assert!(let Ok(()) = port.close());
}

#[test]
fn test_drop_releases_channel() {
	let chip = new_chip(MockChip::default());
	let first = open_port(&chip);
	let second = open_port(&chip);
	assert!(first.channel_id() != second.channel_id());

	drop(first);
	chip.with_link(|mock| {
		assert!(mock.channels.len() == 1);
		assert!(mock.channels.contains_key(&second.channel_id()));
	});
	drop(second);
	chip.with_link(|mock| assert!(mock.channels.is_empty()));
}

#[test]
fn test_bytes_available() {
	let chip = new_chip(MockChip::default());
	let irq = GateIrq::held();
	let options = PortOptions {
		thread_name: Some(String::from("test-worker")),
		..Default::default()
	};
	let_assert!(Ok(mut port) = Port::open_with_options(chip.clone(), Some(irq.clone()), options));
	assert!(port.uses_interrupts());
	assert!(let Ok(0) = port.bytes_available());

	// With the worker blocked on the interrupt line, received data stays in the chip.
	assert!(wait_until(TIMEOUT, || irq.waiting() == 1));
	chip.with_link(|mock| mock.channel_mut(0).rx.extend(b"hello"));
	assert!(let Ok(5) = port.bytes_available());
	let_assert!(Ok(status) = port.status());
	assert!(status.rx_pending == 5);
	assert!(status.capacity == 64);
	assert!(port.cached_status() == status);

	irq.release();
	let_assert!(Ok(stream) = port.stream());
	assert!(common::read_stream(stream, 5) == b"hello");
	assert!(let Ok(0) = port.bytes_available());
	assert!(let Ok(()) = port.close());
}
