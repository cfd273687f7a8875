//! The synchronous command/response channel an oscilloscope driver talks through.
//!
//! Every command is followed by its reply (if any) before the next one goes out; there is
//! no pipelining. [`crate::vxi11::CoreClient`] is the network implementation and
//! [`mock::MockTransport`] replays scripted traffic for tests.

use std::io;

use thiserror::Error;

pub mod mock;

/// Capacity reserved for an ordinary query reply.
pub const QUERY_CAPACITY:usize = 1024;

#[derive(Error, Debug)]
pub enum TransportError {
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("timed out waiting for the instrument")]
	Timeout,

	#[error("RPC error: {0}")]
	Rpc(String),

	#[error("device error {code}: {reason}")]
	Device { code: i32, reason: &'static str },

	#[error("no link to the instrument is open")]
	NoLink,

	#[error("reply is not valid UTF-8")]
	NotUtf8,
}

pub trait Transport {

	/// Sends an ASCII command. No reply is read.
	fn write(&mut self, command:&str) -> Result<(), TransportError>;

	/// Blocks until the instrument signals the end of its reply, or until `expected_count` bytes
	/// have arrived when `expected_count` is non-zero. `capacity_hint` sizes the receive buffer.
	fn read_bytes(&mut self, capacity_hint:usize, expected_count:usize) -> Result<Vec<u8>, TransportError>;

	/// Communication timeout for subsequent reads and writes, in milliseconds.
	fn set_timeout(&mut self, ms:u32) -> Result<(), TransportError>;

	/// Device clear: flushes the instrument's input/output queues and event state.
	fn clear(&mut self) -> Result<(), TransportError>;

	/// Write-then-read for commands answered with a short string. The reply is trimmed.
	fn query(&mut self, command:&str) -> Result<String, TransportError> {
		self.write(command)?;
		let reply = self.read_bytes(QUERY_CAPACITY, 0)?;
		String::from_utf8(reply)
			.map(|s| s.trim().to_owned())
			.map_err(|_| TransportError::NotUtf8)
	}

}

impl<T: Transport + ?Sized> Transport for &mut T {
	fn write(&mut self, command:&str) -> Result<(), TransportError> { (**self).write(command) }
	fn read_bytes(&mut self, capacity_hint:usize, expected_count:usize) -> Result<Vec<u8>, TransportError> {
		(**self).read_bytes(capacity_hint, expected_count)
	}
	fn set_timeout(&mut self, ms:u32) -> Result<(), TransportError> { (**self).set_timeout(ms) }
	fn clear(&mut self) -> Result<(), TransportError> { (**self).clear() }
	fn query(&mut self, command:&str) -> Result<String, TransportError> { (**self).query(command) }
}
