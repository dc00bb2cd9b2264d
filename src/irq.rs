//! Waiting for the chip: interrupt line or timed polling.

use std::sync::Arc;
use std::time::Duration;

/// The result of waiting for an edge on an interrupt line.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Edge {
	/// The interrupt line signaled an edge.
	Signaled,

	/// No edge occurred before the timeout expired.
	TimedOut,
}

/// An edge-triggered interrupt line of the chip, such as a GPIO input.
///
/// The chip signals an edge when the state of a serial channel changed,
/// for example when data was received or the transmit buffer drained.
pub trait IrqSource: Send + Sync {
	/// Block until an edge occurs or the timeout expires.
	fn wait_for_edge(&self, timeout: Duration) -> std::io::Result<Edge>;
}

/// Strategy used by the worker to wait for a state change of the chip.
pub(crate) trait WaitStrategy: Send {
	/// Wait until the chip state may have changed.
	///
	/// Returning does not guarantee that anything changed, the caller must query the chip again.
	fn wait(&self) -> std::io::Result<()>;
}

/// Wait by sleeping for a fixed interval.
#[derive(Debug)]
pub(crate) struct PollWait {
	pub interval: Duration,
}

impl WaitStrategy for PollWait {
	fn wait(&self) -> std::io::Result<()> {
		std::thread::sleep(self.interval);
		Ok(())
	}
}

/// Wait for an edge on the interrupt line of the chip.
pub(crate) struct EdgeWait {
	pub source: Arc<dyn IrqSource>,
	pub timeout: Duration,
}

impl WaitStrategy for EdgeWait {
	fn wait(&self) -> std::io::Result<()> {
		if self.source.wait_for_edge(self.timeout)? == Edge::Signaled {
			trace!("interrupt line signaled");
		}
		Ok(())
	}
}

/// Pick the wait strategy for a port.
pub(crate) fn wait_strategy(irq: Option<Arc<dyn IrqSource>>, poll_interval: Duration, edge_timeout: Duration) -> Box<dyn WaitStrategy> {
	match irq {
		Some(source) => Box::new(EdgeWait {
			source,
			timeout: edge_timeout,
		}),
		None => Box::new(PollWait { interval: poll_interval }),
	}
}
