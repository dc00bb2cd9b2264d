pub fn init(root_module: &str, verbosity: u8) {
	use std::io::Write;

	let log_level = match verbosity {
		0 => log::LevelFilter::Info,
		1 => log::LevelFilter::Debug,
		_ => log::LevelFilter::Trace,
	};

	env_logger::Builder::new()
		.format(|buffer, record: &log::Record| {
			use env_logger::fmt::Color;

			let mut prefix_style = buffer.style();
			let prefix = match record.level() {
				log::Level::Trace => "Trace: ",
				log::Level::Debug | log::Level::Info => "",
				log::Level::Warn => {
					prefix_style.set_color(Color::Yellow).set_bold(true);
					"Warning: "
				},
				log::Level::Error => {
					prefix_style.set_color(Color::Red).set_bold(true);
					"Error: "
				},
			};

			writeln!(buffer, "{}{}", prefix_style.value(prefix), record.args())
		})
		.filter_level(log::LevelFilter::Warn)
		.filter_module(root_module, log_level)
		.filter_module("chipio_serial", log_level)
		.init();
}
