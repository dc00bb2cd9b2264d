//! Crate-private logging macros.
//!
//! With the `log` feature enabled these forward to the [`log`](https://docs.rs/log) facade,
//! otherwise the arguments are only type checked and never evaluated.

#[cfg(feature = "log")]
#[allow(unused)]
macro_rules! trace {
	($($args:tt)*) => { ::log::trace!(target: "chipio_serial", $($args)*) }
}

#[cfg(feature = "log")]
#[allow(unused)]
macro_rules! debug {
	($($args:tt)*) => { ::log::debug!(target: "chipio_serial", $($args)*) }
}

#[cfg(feature = "log")]
#[allow(unused)]
macro_rules! warn {
	($($args:tt)*) => { ::log::warn!(target: "chipio_serial", $($args)*) }
}

#[cfg(feature = "log")]
#[allow(unused)]
macro_rules! error {
	($($args:tt)*) => { ::log::error!(target: "chipio_serial", $($args)*) }
}

#[cfg(not(feature = "log"))]
#[allow(unused)]
macro_rules! trace {
	($($args:tt)*) => {
		if false {
			let _ = format_args!($($args)*);
		}
	};
}

#[cfg(not(feature = "log"))]
#[allow(unused)]
macro_rules! debug {
	($($args:tt)*) => {
		if false {
			let _ = format_args!($($args)*);
		}
	};
}

#[cfg(not(feature = "log"))]
#[allow(unused)]
macro_rules! warn {
	($($args:tt)*) => {
		if false {
			let _ = format_args!($($args)*);
		}
	};
}

#[cfg(not(feature = "log"))]
#[allow(unused)]
macro_rules! error {
	($($args:tt)*) => {
		if false {
			let _ = format_args!($($args)*);
		}
	};
}
