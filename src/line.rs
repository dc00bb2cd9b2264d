//! Line configuration of a virtual serial port.

/// Number of data bits per character.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DataBits {
	Five,
	Six,
	Seven,
	Eight,
}

impl DataBits {
	/// All possible values.
	pub const VALUES: [Self; 4] = [Self::Five, Self::Six, Self::Seven, Self::Eight];
}

/// Parity bit mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Parity {
	None,
	Even,
	Odd,
	Space,
	Mark,
}

impl Parity {
	pub const VALUES: [Self; 5] = [Self::None, Self::Even, Self::Odd, Self::Space, Self::Mark];
}

/// Number of stop bits.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StopBits {
	One,
	OneAndHalf,
	Two,
}

impl StopBits {
	pub const VALUES: [Self; 3] = [Self::One, Self::OneAndHalf, Self::Two];
}

/// Flow control mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FlowControl {
	None,
	Hardware,
	Software,
}

impl FlowControl {
	pub const VALUES: [Self; 3] = [Self::None, Self::Hardware, Self::Software];
}

/// Identifies one field of the [`LineConfig`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Setting {
	BaudRate,
	DataBits,
	Parity,
	StopBits,
	FlowControl,
}

/// A snapshot of the line settings of a port, as acknowledged by the chip.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LineConfig {
	pub baud_rate: u32,
	pub data_bits: DataBits,
	pub parity: Parity,
	pub stop_bits: StopBits,
	pub flow_control: FlowControl,
}

impl Default for LineConfig {
	/// 9600 baud, 8N1, no flow control.
	fn default() -> Self {
		Self {
			baud_rate: 9600,
			data_bits: DataBits::Eight,
			parity: Parity::None,
			stop_bits: StopBits::One,
			flow_control: FlowControl::None,
		}
	}
}

/// Conversion between a line setting and the code used in chip transactions.
pub(crate) trait LineCode: Copy + Sized {
	const SETTING: Setting;

	fn code(self) -> u8;

	fn from_code(raw: u8) -> Option<Self>;
}

impl LineCode for DataBits {
	const SETTING: Setting = Setting::DataBits;

	fn code(self) -> u8 {
		match self {
			Self::Five => 5,
			Self::Six => 6,
			Self::Seven => 7,
			Self::Eight => 8,
		}
	}

	fn from_code(raw: u8) -> Option<Self> {
		match raw {
			5 => Some(Self::Five),
			6 => Some(Self::Six),
			7 => Some(Self::Seven),
			8 => Some(Self::Eight),
			_ => None,
		}
	}
}

impl LineCode for Parity {
	const SETTING: Setting = Setting::Parity;

	fn code(self) -> u8 {
		match self {
			Self::None => 0,
			Self::Even => 1,
			Self::Odd => 2,
			Self::Space => 3,
			Self::Mark => 4,
		}
	}

	fn from_code(raw: u8) -> Option<Self> {
		match raw {
			0 => Some(Self::None),
			1 => Some(Self::Even),
			2 => Some(Self::Odd),
			3 => Some(Self::Space),
			4 => Some(Self::Mark),
			_ => None,
		}
	}
}

impl LineCode for StopBits {
	const SETTING: Setting = Setting::StopBits;

	fn code(self) -> u8 {
		match self {
			Self::One => 1,
			Self::Two => 2,
			Self::OneAndHalf => 3,
		}
	}

	fn from_code(raw: u8) -> Option<Self> {
		match raw {
			1 => Some(Self::One),
			2 => Some(Self::Two),
			3 => Some(Self::OneAndHalf),
			_ => None,
		}
	}
}

impl LineCode for FlowControl {
	const SETTING: Setting = Setting::FlowControl;

	fn code(self) -> u8 {
		match self {
			Self::None => 0,
			Self::Hardware => 1,
			Self::Software => 2,
		}
	}

	fn from_code(raw: u8) -> Option<Self> {
		match raw {
			0 => Some(Self::None),
			1 => Some(Self::Hardware),
			2 => Some(Self::Software),
			_ => None,
		}
	}
}

/// The line settings supported by the chip, as reported during the open handshake.
///
/// Each mask has bit `n` set if the setting with code `n` is supported.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Capabilities {
	pub data_bits: u16,
	pub parity: u8,
	pub stop_bits: u8,
	pub flow_control: u8,
}

impl Capabilities {
	/// Capabilities of a chip that supports every setting.
	pub const ALL: Self = Self {
		data_bits: 0b1_1110_0000,
		parity: 0b1_1111,
		stop_bits: 0b1110,
		flow_control: 0b111,
	};

	/// Check if the chip supports a setting.
	pub fn supports<T: LineSetting>(&self, value: T) -> bool {
		value.supported_by(self)
	}
}

/// A line setting that can be checked against the chip [`Capabilities`].
pub trait LineSetting: Copy {
	/// Check if this value is in the supported set of the chip.
	fn supported_by(self, capabilities: &Capabilities) -> bool;
}

impl LineSetting for DataBits {
	fn supported_by(self, capabilities: &Capabilities) -> bool {
		capabilities.data_bits & (1 << self.code()) != 0
	}
}

impl LineSetting for Parity {
	fn supported_by(self, capabilities: &Capabilities) -> bool {
		capabilities.parity & (1 << self.code()) != 0
	}
}

impl LineSetting for StopBits {
	fn supported_by(self, capabilities: &Capabilities) -> bool {
		capabilities.stop_bits & (1 << self.code()) != 0
	}
}

impl LineSetting for FlowControl {
	fn supported_by(self, capabilities: &Capabilities) -> bool {
		capabilities.flow_control & (1 << self.code()) != 0
	}
}

impl std::fmt::Display for DataBits {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{}", self.code())
	}
}

impl std::fmt::Display for Parity {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::None => write!(f, "none"),
			Self::Even => write!(f, "even"),
			Self::Odd => write!(f, "odd"),
			Self::Space => write!(f, "space"),
			Self::Mark => write!(f, "mark"),
		}
	}
}

impl std::fmt::Display for StopBits {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::One => write!(f, "1"),
			Self::OneAndHalf => write!(f, "1.5"),
			Self::Two => write!(f, "2"),
		}
	}
}

impl std::fmt::Display for FlowControl {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::None => write!(f, "none"),
			Self::Hardware => write!(f, "hardware"),
			Self::Software => write!(f, "software"),
		}
	}
}

impl std::fmt::Display for Setting {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::BaudRate => write!(f, "baud rate"),
			Self::DataBits => write!(f, "data bits"),
			Self::Parity => write!(f, "parity"),
			Self::StopBits => write!(f, "stop bits"),
			Self::FlowControl => write!(f, "flow control"),
		}
	}
}

impl std::fmt::Display for LineConfig {
	/// Formats as `115200 8N1`, followed by the flow control if enabled.
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		let parity = match self.parity {
			Parity::None => 'N',
			Parity::Even => 'E',
			Parity::Odd => 'O',
			Parity::Space => 'S',
			Parity::Mark => 'M',
		};
		write!(f, "{} {}{}{}", self.baud_rate, self.data_bits, parity, self.stop_bits)?;
		match self.flow_control {
			FlowControl::None => Ok(()),
			flow => write!(f, " ({} flow control)", flow),
		}
	}
}
