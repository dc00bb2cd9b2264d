#![allow(dead_code)]

use chipio_serial::{Edge, IrqSource, Port, PortOptions, SharedChip};
use std::io::Read;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

mod mock_chip;
pub use mock_chip::{MockChannel, MockChip, MockError};

pub type Chip = Arc<SharedChip<MockChip>>;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn new_chip(mock: MockChip) -> Chip {
	Arc::new(SharedChip::new(mock))
}

pub fn fast_options() -> PortOptions {
	PortOptions {
		poll_interval: Duration::from_millis(1),
		..Default::default()
	}
}

pub fn open_port(chip: &Chip) -> Port<SharedChip<MockChip>> {
	match Port::open_with_options(chip.clone(), None, fast_options()) {
		Ok(port) => port,
		Err(e) => panic!("failed to open port: {}", e),
	}
}

/// Poll a condition until it is true or the timeout expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
	let deadline = Instant::now() + timeout;
	loop {
		if condition() {
			return true;
		}
		if Instant::now() > deadline {
			return false;
		}
		std::thread::sleep(Duration::from_millis(1));
	}
}

/// Read exactly `count` bytes from a non-blocking stream.
pub fn read_stream(mut stream: &UnixStream, count: usize) -> Vec<u8> {
	let mut data = Vec::new();
	let mut buffer = [0; 256];
	let deadline = Instant::now() + TIMEOUT;
	while data.len() < count {
		match stream.read(&mut buffer) {
			Ok(0) => panic!("stream closed"),
			Ok(n) => data.extend_from_slice(&buffer[..n]),
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
				assert!(Instant::now() < deadline, "timeout while reading from stream, got {} of {} bytes", data.len(), count);
				std::thread::sleep(Duration::from_millis(1));
			},
			Err(e) => panic!("failed to read from stream: {}", e),
		}
	}
	data
}

/// An interrupt source that blocks the waiter until released.
///
/// After release it behaves as a line without edges.
#[derive(Default)]
pub struct GateIrq {
	held: Mutex<bool>,
	released: Condvar,
	waiting: AtomicUsize,
}

impl GateIrq {
	pub fn held() -> Arc<Self> {
		Arc::new(Self {
			held: Mutex::new(true),
			..Default::default()
		})
	}

	/// Number of waiters that are currently blocked.
	pub fn waiting(&self) -> usize {
		self.waiting.load(Ordering::SeqCst)
	}

	pub fn release(&self) {
		*self.held.lock().unwrap() = false;
		self.released.notify_all();
	}
}

impl IrqSource for GateIrq {
	fn wait_for_edge(&self, timeout: Duration) -> std::io::Result<Edge> {
		let mut held = self.held.lock().unwrap();
		if *held {
			self.waiting.fetch_add(1, Ordering::SeqCst);
			while *held {
				held = self.released.wait(held).unwrap();
			}
			self.waiting.fetch_sub(1, Ordering::SeqCst);
			return Ok(Edge::Signaled);
		}
		drop(held);
		std::thread::sleep(timeout.min(Duration::from_millis(1)));
		Ok(Edge::TimedOut)
	}
}
