use chipio_serial::{DataBits, FlowControl, Parity, StopBits};
use std::path::PathBuf;

/// Use a virtual serial port of a ChipIo I/O expander.
///
/// The chip must be attached through a serial adapter.
#[derive(clap::Parser)]
pub struct Options {
	/// Increase verbosity, can be used multiple times.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// The serial adapter the chip is attached to.
	#[clap(long, short)]
	#[clap(global = true)]
	#[clap(default_value = "/dev/ttyUSB0")]
	pub link: PathBuf,

	/// The baud rate of the serial adapter.
	#[clap(long)]
	#[clap(global = true)]
	#[clap(default_value = "115200")]
	pub link_baud_rate: u32,

	/// Timeout for a single chip transaction in milliseconds.
	#[clap(long)]
	#[clap(global = true)]
	#[clap(default_value = "50")]
	pub timeout_ms: u64,

	/// Interval between status queries in milliseconds.
	#[clap(long)]
	#[clap(global = true)]
	#[clap(default_value = "5")]
	pub poll_interval_ms: u64,

	#[clap(subcommand)]
	pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
	/// Show the name, buffer size, capabilities and line settings of a port.
	Info,

	/// Change the line settings of a port.
	Set {
		/// The baud rate.
		#[clap(long)]
		baud_rate: Option<u32>,

		/// The number of data bits: 5, 6, 7 or 8.
		#[clap(long)]
		#[clap(value_parser = parse_data_bits)]
		data_bits: Option<DataBits>,

		/// The parity: none, even, odd, space or mark.
		#[clap(long)]
		#[clap(value_parser = parse_parity)]
		parity: Option<Parity>,

		/// The number of stop bits: 1, 1.5 or 2.
		#[clap(long)]
		#[clap(value_parser = parse_stop_bits)]
		stop_bits: Option<StopBits>,

		/// The flow control mode: none, hardware or software.
		#[clap(long)]
		#[clap(value_parser = parse_flow_control)]
		flow_control: Option<FlowControl>,
	},

	/// Connect standard input and output to a port.
	Bridge,

	/// Write shell completions to standard output or a file.
	ShellCompletion {
		/// The shell for which to generate completions.
		#[clap(long)]
		shell: clap_complete::Shell,

		/// The file to write the generated completion file to.
		#[clap(long, short)]
		output: Option<PathBuf>,
	},
}

fn parse_data_bits(input: &str) -> Result<DataBits, &'static str> {
	match input {
		"5" => Ok(DataBits::Five),
		"6" => Ok(DataBits::Six),
		"7" => Ok(DataBits::Seven),
		"8" => Ok(DataBits::Eight),
		_ => Err("invalid data bits: expected 5, 6, 7 or 8"),
	}
}

fn parse_parity(input: &str) -> Result<Parity, &'static str> {
	match input.to_ascii_lowercase().as_str() {
		"none" => Ok(Parity::None),
		"even" => Ok(Parity::Even),
		"odd" => Ok(Parity::Odd),
		"space" => Ok(Parity::Space),
		"mark" => Ok(Parity::Mark),
		_ => Err("invalid parity: expected none, even, odd, space or mark"),
	}
}

fn parse_stop_bits(input: &str) -> Result<StopBits, &'static str> {
	match input {
		"1" => Ok(StopBits::One),
		"1.5" => Ok(StopBits::OneAndHalf),
		"2" => Ok(StopBits::Two),
		_ => Err("invalid stop bits: expected 1, 1.5 or 2"),
	}
}

fn parse_flow_control(input: &str) -> Result<FlowControl, &'static str> {
	match input.to_ascii_lowercase().as_str() {
		"none" => Ok(FlowControl::None),
		"hardware" | "rts/cts" => Ok(FlowControl::Hardware),
		"software" | "xon/xoff" => Ok(FlowControl::Software),
		_ => Err("invalid flow control: expected none, hardware or software"),
	}
}
