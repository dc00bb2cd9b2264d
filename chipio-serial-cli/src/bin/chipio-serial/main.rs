use chipio_serial::link::SerialLink;
use chipio_serial::{DataBits, FlowControl, LineSetting, Parity, Port, PortOptions, SharedChip, StopBits, TransferState};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod logging;
mod options;

use options::{Command, Options};

type ChipPort = Port<SharedChip<SerialLink>>;

/// Time to keep forwarding received data after standard input is closed and the port is idle.
const LINGER: Duration = Duration::from_millis(200);

fn main() {
	if let Err(()) = do_main(clap::Parser::parse()) {
		std::process::exit(1);
	}
}

fn do_main(options: Options) -> Result<(), ()> {
	logging::init(module_path!(), options.verbose);
	match &options.command {
		Command::Info => {
			let port = open_port(&options)?;
			let status = port.status().map_err(|e| log::error!("Failed to query port status: {}", e))?;
			let capabilities = port.capabilities();
			log::info!("Port: {}", port.port_name().unwrap_or("?"));
			log::info!(" ├─ Channel: {}", port.channel_id());
			log::info!(" ├─ Line settings: {}", port.line_config());
			log::info!(" ├─ Buffer size: {}", status.capacity);
			log::info!(" ├─ Busy: {}", status.busy);
			log::info!(" ├─ Received: {} bytes pending", status.rx_pending);
			log::info!(" ├─ Transmit: {} bytes pending", status.tx_pending);
			log::info!(" └─ Supported settings");
			log::info!("    ├─ Data bits: {}", supported(&capabilities, &DataBits::VALUES));
			log::info!("    ├─ Parity: {}", supported(&capabilities, &Parity::VALUES));
			log::info!("    ├─ Stop bits: {}", supported(&capabilities, &StopBits::VALUES));
			log::info!("    └─ Flow control: {}", supported(&capabilities, &FlowControl::VALUES));
			close_port(port)?;
		},
		Command::Set {
			baud_rate,
			data_bits,
			parity,
			stop_bits,
			flow_control,
		} => {
			let mut port = open_port(&options)?;
			let result = apply_settings(&mut port, *baud_rate, *data_bits, *parity, *stop_bits, *flow_control);
			log::info!("{}: {}", port.port_name().unwrap_or("?"), port.line_config());
			close_port(port)?;
			result?;
		},
		Command::Bridge => {
			let port = open_port(&options)?;
			let result = bridge(&port, Duration::from_millis(options.poll_interval_ms));
			close_port(port)?;
			result?;
		},
		Command::ShellCompletion { shell, output } => {
			write_shell_completion(*shell, output.as_deref())?;
		},
	}

	Ok(())
}

fn open_port(options: &Options) -> Result<ChipPort, ()> {
	let link = SerialLink::open(&options.link, options.link_baud_rate, Duration::from_millis(options.timeout_ms))
		.map_err(|e| log::error!("Failed to open serial adapter: {}: {}", options.link.display(), e))?;
	log::debug!(
		"Using serial adapter {} with baud rate {}",
		options.link.display(),
		options.link_baud_rate
	);

	let port_options = PortOptions {
		poll_interval: Duration::from_millis(options.poll_interval_ms),
		..Default::default()
	};
	let chip = Arc::new(SharedChip::new(link));
	let port = Port::open_with_options(chip, None, port_options).map_err(|e| log::error!("Failed to open port: {}", e))?;
	log::debug!("Opened port {} on channel {}", port.port_name().unwrap_or("?"), port.channel_id());
	Ok(port)
}

fn close_port(mut port: ChipPort) -> Result<(), ()> {
	port.close().map_err(|e| log::error!("Failed to close port: {}", e))
}

fn supported<T: LineSetting + std::fmt::Display>(capabilities: &chipio_serial::Capabilities, values: &[T]) -> String {
	let supported: Vec<String> = values
		.iter()
		.filter(|&&x| capabilities.supports(x))
		.map(|x| x.to_string())
		.collect();
	if supported.is_empty() {
		String::from("(none)")
	} else {
		supported.join(", ")
	}
}

fn apply_settings(
	port: &mut ChipPort,
	baud_rate: Option<u32>,
	data_bits: Option<DataBits>,
	parity: Option<Parity>,
	stop_bits: Option<StopBits>,
	flow_control: Option<FlowControl>,
) -> Result<(), ()> {
	if let Some(baud_rate) = baud_rate {
		let committed = port.set_baud_rate(baud_rate).map_err(|e| log::error!("Failed to set baud rate: {}", e))?;
		if committed != baud_rate {
			log::warn!("Chip does not support baud rate {}, using {} instead", baud_rate, committed);
		}
	}
	if let Some(data_bits) = data_bits {
		port.set_data_bits(data_bits).map_err(|e| log::error!("Failed to set data bits: {}", e))?;
	}
	if let Some(parity) = parity {
		port.set_parity(parity).map_err(|e| log::error!("Failed to set parity: {}", e))?;
	}
	if let Some(stop_bits) = stop_bits {
		port.set_stop_bits(stop_bits).map_err(|e| log::error!("Failed to set stop bits: {}", e))?;
	}
	if let Some(flow_control) = flow_control {
		port.set_flow_control(flow_control)
			.map_err(|e| log::error!("Failed to set flow control: {}", e))?;
	}
	Ok(())
}

/// Forward standard input to the port, and data received by the port to standard output.
///
/// Stops when standard input is closed and all data has been transmitted.
fn bridge(port: &ChipPort, poll_interval: Duration) -> Result<(), ()> {
	let stream = port.stream().map_err(|e| log::error!("{}", e))?;
	let input = stream
		.try_clone()
		.map_err(|e| log::error!("Failed to clone byte stream: {}", e))?;
	let input_done = Arc::new(AtomicBool::new(false));
	std::thread::spawn({
		let input_done = input_done.clone();
		move || {
			if let Err(e) = forward_stdin(input) {
				log::error!("Failed to forward standard input: {}", e);
			}
			input_done.store(true, Ordering::Release);
		}
	});

	let stdout = std::io::stdout();
	let mut buffer = [0; 1024];
	let mut last_activity = Instant::now();
	loop {
		match (&*stream).read(&mut buffer) {
			Ok(0) => {
				log::error!("Byte stream closed unexpectedly");
				return Err(());
			},
			Ok(read) => {
				last_activity = Instant::now();
				let mut stdout = stdout.lock();
				stdout
					.write_all(&buffer[..read])
					.and_then(|()| stdout.flush())
					.map_err(|e| log::error!("Failed to write to stdout: {}", e))?;
				continue;
			},
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => (),
			Err(e) => {
				log::error!("Failed to read from byte stream: {}", e);
				return Err(());
			},
		}

		if let Some(e) = port.take_transfer_error() {
			log::error!("Transfer failed: {}", e);
		}

		if port.transfer_state() != TransferState::Idle {
			last_activity = Instant::now();
		} else if input_done.load(Ordering::Acquire) && last_activity.elapsed() > LINGER {
			return Ok(());
		}
		std::thread::sleep(poll_interval);
	}
}

fn forward_stdin(mut output: UnixStream) -> std::io::Result<()> {
	let stdin = std::io::stdin();
	let mut stdin = stdin.lock();
	let mut buffer = [0; 1024];
	loop {
		let read = stdin.read(&mut buffer)?;
		if read == 0 {
			log::debug!("Standard input closed");
			return Ok(());
		}
		let mut data = &buffer[..read];
		while !data.is_empty() {
			match output.write(data) {
				Ok(written) => data = &data[written..],
				Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => std::thread::sleep(Duration::from_millis(1)),
				Err(e) => return Err(e),
			}
		}
	}
}

fn write_shell_completion(shell: clap_complete::Shell, path: Option<&Path>) -> Result<(), ()> {
	use clap::CommandFactory;

	let mut buffer = Vec::with_capacity(4 * 1024);

	let mut command = Options::command();
	clap_complete::generate(shell, &mut command, env!("CARGO_BIN_NAME"), &mut buffer);
	if !buffer.ends_with(b"\n") {
		buffer.push(b'\n');
	}

	let path = path.unwrap_or_else(|| Path::new("-"));
	if path == Path::new("-") {
		log::debug!("Writing shell completion for {} to stdout", shell);
		let stdout = std::io::stdout();
		stdout
			.lock()
			.write_all(&buffer)
			.map_err(|e| log::error!("Failed to write to stdout: {}", e))?;
	} else {
		log::debug!("Writing shell completion for {} to {}", shell, path.display());
		let mut output = std::fs::File::create(path).map_err(|e| log::error!("Failed to create {}: {}", path.display(), e))?;
		output
			.write_all(&buffer)
			.map_err(|e| log::error!("Failed to write to {}: {}", path.display(), e))?;
	}

	Ok(())
}
