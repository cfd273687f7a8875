
use std::str::FromStr;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use regex::Regex;

use crate::devices::{BusyStatus, Capabilities, Oscilloscope, PollBudgets, ResetStatus};
use crate::error::{AcquireError, Mismatch, ParameterError};
use crate::transport::Transport;
use crate::vxi11::CoreClient;

pub mod decode;
pub mod waveform;

use decode::{Encoding, Scaling};
use waveform::{AcquisitionConfig, Resolution, WaveForm};

lazy_static! {
	static ref IDN_RE: Regex   = Regex::new("([^,]+),([^,]+),([^,]+),([^,\\s]+)").unwrap();
	// Replies echo the command header unless HEADER OFF has been sent, e.g. ":WFMPRE:XINCR 4.0E-7"
	static ref REPLY_RE: Regex = Regex::new("^(?::?[A-Z][A-Z0-9_:]*\\s+)?(\\S.*)$").unwrap();
}

/// Averaging counts the instrument accepts. 512 only works on some models.
pub const VALID_AVERAGE_COUNTS:[u32; 10] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512];
pub const CHANNEL_MIN:u8 = 1;
pub const CHANNEL_MAX:u8 = 4;
pub const CHANNEL_DEFAULT:u8 = CHANNEL_MIN;
pub const DEFAULT_AVERAGE_COUNT:u32 = 64;
pub const DEFAULT_TIMEOUT_MS:u32 = 5000;

const IS_BUSY:&str = "BUSY?";
const CURVE_ENCODING:&str = "DATA:ENCDG RIBINARY;WIDTH 2";
const RESETTING_FINISHED:&str = "Finished resetting instrument.";

fn acquire_mode(average_count:u32) -> String {
	format!("ACQUIRE:MODE AVERAGE;STOPAFTER SEQUENCE;NUMAVG {}; STATE STOP", average_count)
}

pub fn validate_average_count(count:u32) -> Result<(), ParameterError> {
	match VALID_AVERAGE_COUNTS.binary_search(&count) {
		Ok(_)  => Ok(()),
		Err(_) => Err(ParameterError::AverageCount(count)),
	}
}

pub fn validate_channel(channel:u8) -> Result<(), ParameterError> {
	if channel < CHANNEL_MIN || channel > CHANNEL_MAX { Err(ParameterError::Channel(channel)) }
	else { Ok(()) }
}

/// Formats like C's `%E`: six decimals and a signed exponent of at least two digits.
fn nr3(value:f64) -> String {
	let s = format!("{:.6E}", value);
	match s.split_once('E') {
		Some((mantissa, exp)) => {
			let (sign, digits) = match exp.strip_prefix('-') {
				Some(d) => ('-', d),
				None => ('+', exp),
			};
			format!("{}E{}{:0>2}", mantissa, sign, digits)
		},
		None => s,
	}
}

fn strip_header(reply:&str) -> &str {
	let reply = reply.trim();
	REPLY_RE.captures(reply)
		.and_then(|c| c.get(1))
		.map(|m| m.as_str())
		.unwrap_or(reply)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

/// Driver for the Tektronix TDS3000 series.
///
/// All traffic is strictly call-and-response on a single transport. Busy polling blocks the
/// calling thread until the instrument is ready or the wall-clock budget runs out; there is
/// no other way to cancel it.
pub struct Tds3000<T: Transport> {
	transport: T,
	capabilities: Capabilities,
	budgets: PollBudgets,
	average_count: u32,
}

impl Tds3000<CoreClient> {

	/// Opens a VXI-11 link to `device` on `host` and checks that a TDS3000 answers.
	pub fn connect(host:&str, device:&str, capabilities:Capabilities) -> Result<Self, AcquireError> {
		let core = CoreClient::open(host, device)?;
		let mut scope = Tds3000::new(core, capabilities);
		let idn = scope.identify()?;
		info!("Connected to {} {} (serial {}, firmware {})", idn.manufacturer, idn.model, idn.serial_num, idn.fw_version);
		Ok(scope)
	}

}

impl<T: Transport> Tds3000<T> {

	pub fn new(transport:T, capabilities:Capabilities) -> Self {
		Self { transport, capabilities, budgets: PollBudgets::default(), average_count: DEFAULT_AVERAGE_COUNT }
	}

	pub fn with_budgets(mut self, budgets:PollBudgets) -> Self {
		self.budgets = budgets;
		self
	}

	pub fn capabilities(&self) -> &Capabilities { &self.capabilities }
	pub fn budgets(&self) -> &PollBudgets { &self.budgets }
	pub fn average_count(&self) -> u32 { self.average_count }

	pub fn transport(&self) -> &T { &self.transport }
	pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }

	/// Hands the transport back, e.g. to re-open the session after a reboot.
	pub fn into_transport(self) -> T { self.transport }

	fn write(&mut self, command:&str) -> Result<(), AcquireError> {
		debug!("tds3000: > {}", command);
		Ok(self.transport.write(command)?)
	}

	fn query_text(&mut self, command:&str) -> Result<String, AcquireError> {
		let reply = self.transport.query(command)?;
		debug!("tds3000: {} -> {}", command, reply);
		Ok(strip_header(&reply).to_owned())
	}

	fn query_value<V: FromStr>(&mut self, command:&str) -> Result<V, AcquireError> {
		let reply = self.query_text(command)?;
		reply.parse::<V>().map_err(|_| AcquireError::BadReply{ command: command.to_owned(), reply })
	}

	pub fn identify(&mut self) -> Result<Identity, AcquireError> {
		let reply = self.transport.query("*IDN?")?;
		let bad_reply = || AcquireError::BadReply{ command: "*IDN?".to_owned(), reply: reply.clone() };

		let caps = IDN_RE.captures(&reply).ok_or_else(bad_reply)?;
		let field = |i:usize| caps.get(i).map(|m| m.as_str().trim().to_owned()).ok_or_else(bad_reply);
		let idn = Identity {
			manufacturer: field(1)?,
			model: field(2)?,
			serial_num: field(3)?,
			fw_version: field(4)?,
		};

		if !idn.model.replace(' ', "").to_ascii_uppercase().starts_with("TDS3") {
			return Err(bad_reply());
		}
		Ok(idn)
	}

	pub fn reset_default(&mut self) -> Result<ResetStatus, AcquireError> {
		self.reset(self.average_count, DEFAULT_TIMEOUT_MS)
	}

	/// Single channel, stored average count, high resolution.
	pub fn acquire_default(&mut self, waveform:&mut WaveForm) -> Result<(), AcquireError> {
		self.acquire_channel(waveform, self.average_count, CHANNEL_DEFAULT)
	}

	pub fn acquire_channel(&mut self, waveform:&mut WaveForm, average_count:u32, channel:u8) -> Result<(), AcquireError> {
		let config = AcquisitionConfig::new(average_count, Resolution::High, &[channel]);
		self.acquire(&config, std::slice::from_mut(waveform))
	}

	fn configure(&mut self, config:&AcquisitionConfig, trigger_delay:Option<f64>) -> Result<(), AcquireError> {
		// The averaging mode has to be in place before anything that depends on it
		self.write(&acquire_mode(config.average_count))?;
		self.write(CURVE_ENCODING)?;
		self.write(&format!("ACQUIRE:NUMAVG {}", config.average_count))?;
		self.write(&format!("HORIZONTAL:RESOLUTION {}", config.resolution.as_arg()))?;
		if let Some(delay) = trigger_delay {
			self.write(&format!("HORIZONTAL:DELAY:TIME {}", nr3(delay)))?;
			self.write("HORIZONTAL:DELAY:STATE ON")?;
		}
		self.write(&format!("DATA:START 1;STOP {}", config.resolution.sample_count()))?;
		self.write("HEADER OFF")
	}

	fn fetch_channel(&mut self, channel:u8, resolution:Resolution, waveform:&mut WaveForm) -> Result<(), AcquireError> {
		let mismatch = |reason:Mismatch| AcquireError::WaveformMismatch{ channel, reason };

		// Snapshot the live channel into its reference slot and transfer from there
		self.write(&format!("DATA:SOURCE CH{}", channel))?;
		self.write(&format!("SAVE:WAVEFORM CH{0},REF{0}", channel))?;
		self.write(&format!("SELECT:REF{} ON", channel))?;
		self.write(&format!("DATA:SOURCE REF{}", channel))?;

		let data_width:u8 = self.query_value("DATA:WIDTH?")?;
		if data_width != 1 && data_width != 2 {
			return Err(AcquireError::BadReply{ command: "DATA:WIDTH?".to_owned(), reply: data_width.to_string() });
		}

		let gain:f64 = self.query_value(&format!("CH{}:SCALE?", channel))?;
		let _main_scale = self.query_text("HORIZONTAL:SCALE?")?;
		let sample_interval:f64 = self.query_value("WFMPRE:XINCR?")?;

		let data_size:usize = self.query_value("WFMPRE:NR_PT?")?;
		let expected = resolution.sample_count();
		if data_size != expected {
			return Err(mismatch(Mismatch::SampleCount{ reported: data_size, expected }));
		}

		// The delay is reported from the start of the trace; re-center it on the trigger
		let reported_delay:f64 = self.query_value("HORIZONTAL:DELAY:TIME?")?;
		let trigger_delay = reported_delay - data_size as f64 * sample_interval / 2.0;

		let scaling = Scaling {
			y_mult: self.query_value("WFMPRE:YMULT?")?,
			y_zero: self.query_value("WFMPRE:YZERO?")?,
			y_off: self.query_value("WFMPRE:YOFF?")?,
		};
		let encoding_reply = self.query_text("DATA:ENCDG?")?;
		let encoding = Encoding::from_reply(&encoding_reply)
			.ok_or_else(|| AcquireError::BadReply{ command: "DATA:ENCDG?".to_owned(), reply: encoding_reply.clone() })?;

		self.write("CURVE?")?;
		let expected_count = match encoding {
			Encoding::Ascii => 0,
			Encoding::Binary(_) => resolution.curve_reply_size(data_width),
		};
		let raw = self.transport.read_bytes(self.capabilities.read_buffer_size, expected_count)?;
		debug!("tds3000: CURVE? -> {} bytes ({:?})", raw.len(), encoding);

		let decoded = decode::decode(&raw, encoding, data_size, data_width, scaling)
			.map_err(|e| mismatch(e.into()))?;

		waveform.data_size = data_size;
		waveform.sample_interval = sample_interval;
		waveform.gain = gain;
		waveform.trigger_delay = Some(trigger_delay);
		waveform.samples = decoded.samples;
		waveform.min = decoded.min;
		waveform.max = decoded.max;

		self.write(&format!("SELECT:REF{} OFF", channel))
	}

}

impl<T: Transport> Oscilloscope for Tds3000<T> {

	fn validate_average_count(&self, count:u32) -> Result<(), ParameterError> {
		validate_average_count(count)
	}

	fn get_busy_status(&mut self) -> Result<BusyStatus, AcquireError> {
		let reply = self.query_text(IS_BUSY)?;
		Ok(BusyStatus::from_reply(&reply))
	}

	fn wait_for_ready(&mut self, timeout:Duration) -> Result<BusyStatus, AcquireError> {
		let polling_start = Instant::now();
		loop {
			let status = self.get_busy_status()?;
			if status == BusyStatus::Ready || polling_start.elapsed() >= timeout {
				return Ok(status);
			}
		}
	}

	fn reset(&mut self, average_count:u32, timeout_ms:u32) -> Result<ResetStatus, AcquireError> {
		validate_average_count(average_count)?;

		info!("Resetting instrument...");
		self.write("*RST")?;

		// Not the caller's timeout: a reset takes longer than ordinary traffic
		let settle = self.budgets.reset_settle;
		if self.wait_for_ready(settle)? == BusyStatus::Busy {
			return Err(AcquireError::PollTimeout{ stage: "reset", waited: settle });
		}

		self.transport.clear()?;
		if self.capabilities.timeout_attribute {
			self.transport.set_timeout(timeout_ms)?;
		} else {
			debug!("tds3000: library has no timeout attribute, keeping the current timeout");
		}

		self.write(CURVE_ENCODING)?;
		self.write("HORIZONTAL:TRIGGER:POSITION 0")?;
		self.write("TRIGGER:A:SETLEVEL")?;
		self.average_count = average_count;

		self.write(&acquire_mode(average_count))?;
		if self.wait_for_ready(self.budgets.reset_configure)? == BusyStatus::Ready {
			info!("{}", RESETTING_FINISHED);
			return Ok(ResetStatus::Success);
		}

		warn!("Instrument still busy after reset, stopping acquisition");
		self.write("*OPC")?;
		self.write("ACQUIRE:STATE STOP")?;
		if self.get_busy_status()? == BusyStatus::Ready {
			info!("{}", RESETTING_FINISHED);
			return Ok(ResetStatus::Success);
		}

		warn!("Rebooting instrument...");
		self.write("REBOOT")?;
		Ok(ResetStatus::Rebooted)
	}

	fn acquire(&mut self, config:&AcquisitionConfig, out:&mut [WaveForm]) -> Result<(), AcquireError> {
		config.validate()?;
		if out.len() != config.channels.len() {
			return Err(ParameterError::SlotCount{ channels: config.channels.len(), slots: out.len() }.into());
		}
		self.average_count = config.average_count;

		let idle_check = self.budgets.idle_check;
		if self.wait_for_ready(idle_check)? == BusyStatus::Busy {
			warn!("Instrument is busy.");
			return Err(AcquireError::StillAcquiring{ waited: idle_check });
		}

		let trigger_delay = out[0].trigger_delay;
		self.configure(config, trigger_delay)?;

		self.write("ACQUIRE:STATE RUN")?;
		info!("Acquiring waveform...");

		// Usually means single sequence is on or there is no trigger
		let budget = self.budgets.acquisition_budget(config.average_count, config.channels.len());
		if self.wait_for_ready(budget)? == BusyStatus::Busy {
			return Err(AcquireError::StillAcquiring{ waited: budget });
		}

		for (waveform, &channel) in out.iter_mut().zip(config.channels.iter()) {
			self.fetch_channel(channel, config.resolution, waveform)?;
		}
		info!("Acquisition finished successfully.");
		Ok(())
	}

}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn average_counts() {
		for count in 0..=1000u32 {
			let valid = VALID_AVERAGE_COUNTS.contains(&count);
			assert_eq!(validate_average_count(count).is_ok(), valid, "count {}", count);
		}
	}

	#[test]
	fn channels() {
		assert!(validate_channel(0).is_err());
		assert!((1..=4).all(|ch| validate_channel(ch).is_ok()));
		assert_eq!(validate_channel(5), Err(ParameterError::Channel(5)));
	}

	#[test]
	fn reply_headers_are_stripped() {
		assert_eq!(strip_header(":WFMPRE:XINCR 4.0E-7\n"), "4.0E-7");
		assert_eq!(strip_header("4.0E-7"), "4.0E-7");
		assert_eq!(strip_header(":BUSY 0"), "0");
		assert_eq!(strip_header("RIBINARY"), "RIBINARY");
		assert_eq!(strip_header("DATA:ENCDG ASCII"), "ASCII");
		assert_eq!(strip_header("-1.5E-3"), "-1.5E-3");
	}

	#[test]
	fn exponent_is_padded_like_printf() {
		assert_eq!(nr3(1.0e-3), "1.000000E-03");
		assert_eq!(nr3(-2.5e-10), "-2.500000E-10");
		assert_eq!(nr3(0.0), "0.000000E+00");
		assert_eq!(nr3(120.0), "1.200000E+02");
		assert_eq!(nr3(1.0e100), "1.000000E+100");
	}

	#[test]
	fn averaging_mode_command() {
		assert_eq!(acquire_mode(16), "ACQUIRE:MODE AVERAGE;STOPAFTER SEQUENCE;NUMAVG 16; STATE STOP");
	}
}
