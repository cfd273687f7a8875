
use serde::{Serialize, Deserialize};

use crate::error::ParameterError;
use super::{validate_average_count, validate_channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution { High, Low }

impl Default for Resolution {
	fn default() -> Self { Resolution::High }
}

impl Resolution {

	pub fn sample_count(self) -> usize {
		match self {
			Resolution::High => 10000,
			Resolution::Low  => 500,
		}
	}

	pub fn as_arg(self) -> &'static str {
		match self {
			Resolution::High => "HIGH",
			Resolution::Low  => "LOW",
		}
	}

	/// Size of a binary `CURVE?` reply, header and terminator included.
	pub fn curve_reply_size(self, data_width:u8) -> usize {
		match (self, data_width) {
			(Resolution::High, 1) => 10008,
			(Resolution::High, _) => 20008,
			(Resolution::Low, 1)  => 5006,
			(Resolution::Low, _)  => 1007,
		}
	}

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
	pub average_count: u32,
	#[serde(default)]
	pub resolution: Resolution,
	pub channels: Vec<u8>,
}

impl Default for AcquisitionConfig {
	fn default() -> Self {
		Self { average_count: 64, resolution: Resolution::High, channels: vec![1] }
	}
}

impl AcquisitionConfig {

	pub fn new(average_count:u32, resolution:Resolution, channels:&[u8]) -> Self {
		Self { average_count, resolution, channels: channels.to_vec() }
	}

	pub fn validate(&self) -> Result<(), ParameterError> {
		validate_average_count(self.average_count)?;
		if self.channels.is_empty() {
			return Err(ParameterError::NoChannels);
		}
		self.channels.iter().try_for_each(|&ch| validate_channel(ch))
	}

}

/// One channel's trace. Allocated by the caller and filled in place by an acquisition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveForm {
	pub data_size: usize,
	/// Seconds between samples.
	pub sample_interval: f64,
	/// Vertical scale reported by the instrument, volts per division.
	pub gain: f64,
	/// Seconds. `None` leaves the instrument's horizontal delay alone.
	pub trigger_delay: Option<f64>,
	pub samples: Vec<f64>,
	pub min: f64,
	pub max: f64,
}

impl WaveForm {

	pub fn new() -> Self { Self::default() }

	pub fn with_trigger_delay(trigger_delay:f64) -> Self {
		Self { trigger_delay: Some(trigger_delay), ..Self::default() }
	}

	/// Time of sample `i` relative to the trigger.
	pub fn time_of(&self, i:usize) -> f64 {
		self.trigger_delay.unwrap_or(0.0) + i as f64 * self.sample_interval
	}

}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn curve_reply_sizes() {
		assert_eq!(Resolution::High.curve_reply_size(2), 20008);
		assert_eq!(Resolution::High.curve_reply_size(1), 10008);
		assert_eq!(Resolution::Low.curve_reply_size(2), 1007);
		assert_eq!(Resolution::Low.curve_reply_size(1), 5006);
	}

	#[test]
	fn config_validation() {
		assert!(AcquisitionConfig::default().validate().is_ok());
		assert_eq!(AcquisitionConfig::new(3, Resolution::High, &[1]).validate(), Err(ParameterError::AverageCount(3)));
		assert_eq!(AcquisitionConfig::new(4, Resolution::Low, &[1, 5]).validate(), Err(ParameterError::Channel(5)));
		assert_eq!(AcquisitionConfig::new(4, Resolution::Low, &[]).validate(), Err(ParameterError::NoChannels));
	}

	#[test]
	fn sample_times_start_at_the_trigger_delay() {
		let wf = WaveForm { sample_interval: 4.0e-7, ..WaveForm::with_trigger_delay(-2.0e-3) };
		assert_eq!(wf.time_of(0), -2.0e-3);
		assert!((wf.time_of(5000) - 0.0).abs() < 1e-15);
		assert_eq!(WaveForm { sample_interval: 1.0, ..WaveForm::new() }.time_of(3), 3.0);
	}

	#[test]
	fn config_from_json() {
		let cfg:AcquisitionConfig = serde_json::from_str(r#"{"average_count": 16, "channels": [2, 3]}"#).unwrap();
		assert_eq!(cfg, AcquisitionConfig::new(16, Resolution::High, &[2, 3]));
	}
}
