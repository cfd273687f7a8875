
// Currently only Tektronix TDS3000 scopes are supported. Another instrument family gets its own
// module here and its own implementation of `Oscilloscope`.

use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::error::{AcquireError, ParameterError};

pub mod tds3000;

use tds3000::waveform::{AcquisitionConfig, WaveForm};

/// Result of a single busy query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyStatus { Ready, Busy }

impl BusyStatus {

	/// A reply of `0` means ready, anything else means busy.
	pub fn from_reply(reply:&str) -> Self {
		if reply.trim() == "0" { BusyStatus::Ready } else { BusyStatus::Busy }
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStatus {
	/// The instrument settled and is configured.
	Success,
	/// Polling never converged and a hard reboot was commanded. The session must be re-opened.
	Rebooted,
}

/// What the underlying instrument-control library can do. Passed in at construction
/// instead of being sniffed from a global flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
	/// Whether the communication timeout can be changed. Some open-source VISA
	/// implementations reject the timeout attribute.
	pub timeout_attribute: bool,
	/// Receive buffer reserved for curve transfers.
	pub read_buffer_size: usize,
}

impl Default for Capabilities {
	fn default() -> Self {
		Self { timeout_attribute: true, read_buffer_size: 0x20000 }
	}
}

impl Capabilities {
	/// Libraries limited to 12 kB reads and no timeout attribute.
	pub fn limited() -> Self {
		Self { timeout_attribute: false, read_buffer_size: 12 * 1024 }
	}
}

/// Wall-clock bounds for the busy-poll loops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollBudgets {
	/// Wait for an idle instrument before configuring an acquisition.
	pub idle_check: Duration,
	/// After `*RST`.
	pub reset_settle: Duration,
	/// After the averaging mode is re-applied during a reset.
	pub reset_configure: Duration,
	/// Acquisition budget per averaged acquisition per channel.
	pub per_average: Duration,
}

impl Default for PollBudgets {
	fn default() -> Self {
		Self {
			idle_check: Duration::from_millis(5000),
			reset_settle: Duration::from_millis(6000),
			reset_configure: Duration::from_millis(10000),
			per_average: Duration::from_millis(1200),
		}
	}
}

impl PollBudgets {

	/// Linear in both inputs: `per_average * average_count * channel_count`.
	pub fn acquisition_budget(&self, average_count:u32, channel_count:usize) -> Duration {
		self.per_average * average_count * channel_count as u32
	}

}

pub trait Oscilloscope {

	fn validate_average_count(&self, count:u32) -> Result<(), ParameterError>;

	fn get_busy_status(&mut self) -> Result<BusyStatus, AcquireError>;

	/// Polls the busy status until ready or until `timeout` has elapsed. The instrument is
	/// always queried at least once.
	fn wait_for_ready(&mut self, timeout:Duration) -> Result<BusyStatus, AcquireError>;

	fn reset(&mut self, average_count:u32, timeout_ms:u32) -> Result<ResetStatus, AcquireError>;

	/// Fills `out[i]` with the trace of `config.channels[i]`.
	fn acquire(&mut self, config:&AcquisitionConfig, out:&mut [WaveForm]) -> Result<(), AcquireError>;

}
