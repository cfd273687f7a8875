//! Error types for the acquisition engine.
//!
//! Validation problems ([`ParameterError`]) are detected before any device I/O. Transport
//! failures are carried verbatim. A busy instrument is reported as [`AcquireError::StillAcquiring`]
//! so callers can retry on their own schedule; structurally invalid curve data is a
//! [`AcquireError::WaveformMismatch`] that names the channel it came from.

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
	#[error("average count {0} is not a power of two between 1 and 512")]
	AverageCount(u32),

	#[error("channel {0} is outside 1..=4")]
	Channel(u8),

	#[error("no channels requested")]
	NoChannels,

	#[error("{slots} waveform slots provided for {channels} channels")]
	SlotCount { channels: usize, slots: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
	#[error("bad curve header: {0}")]
	BadHeader(String),

	#[error("curve header declares {declared} bytes but {expected} were expected")]
	LengthMismatch { declared: usize, expected: usize },

	#[error("curve payload needs {expected} bytes but only {available} arrived")]
	Truncated { expected: usize, available: usize },

	#[error("sample {index} ({token:?}) is not a number")]
	BadSample { index: usize, token: String },

	#[error("unsupported data width {0}")]
	UnsupportedWidth(u8),

	#[error("{data_size} samples of {data_width} bytes do not fit in memory")]
	SizeOverflow { data_size: usize, data_width: u8 },

	#[error("curve contains no samples")]
	Empty,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Mismatch {
	#[error("instrument reports {reported} samples but the configured resolution has {expected}")]
	SampleCount { reported: usize, expected: usize },

	#[error(transparent)]
	Decode(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum AcquireError {
	#[error("invalid parameter: {0}")]
	InvalidParameter(#[from] ParameterError),

	#[error("transport failure: {0}")]
	TransportFailure(#[from] TransportError),

	#[error("instrument still acquiring after {waited:?}")]
	StillAcquiring { waited: Duration },

	#[error("instrument still busy after {waited:?} during {stage}")]
	PollTimeout { stage: &'static str, waited: Duration },

	#[error("channel {channel}: {reason}")]
	WaveformMismatch { channel: u8, reason: Mismatch },

	#[error("unexpected reply {reply:?} to {command}")]
	BadReply { command: String, reply: String },
}

impl AcquireError {

	/// Busy timeouts: the session is fine, the caller may try again.
	pub fn is_recoverable(&self) -> bool {
		matches!(self, AcquireError::StillAcquiring{ .. } | AcquireError::PollTimeout{ .. })
	}

}
