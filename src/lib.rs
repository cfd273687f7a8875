
#[macro_use]
extern crate lazy_static;

// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes
pub mod vxi11;

// The command/response channel the oscilloscope drivers talk through, plus a scripted stand-in for tests
pub mod transport;

pub mod error;

// Oscilloscope drivers built on top of a transport
pub mod devices;

pub use devices::{BusyStatus, Capabilities, Oscilloscope, PollBudgets, ResetStatus};
pub use devices::tds3000::{Tds3000, validate_average_count};
pub use devices::tds3000::decode::{decode, Decoded, Encoding, Endian, Scaling};
pub use devices::tds3000::waveform::{AcquisitionConfig, Resolution, WaveForm};
pub use error::{AcquireError, DecodeError, Mismatch, ParameterError};
pub use transport::{Transport, TransportError};
