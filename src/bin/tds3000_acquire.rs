use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use tds3000::vxi11::DEFAULT_DEVICE;
use tds3000::{AcquireError, AcquisitionConfig, Capabilities, Oscilloscope, ResetStatus, Resolution, Tds3000, WaveForm};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolutionArg { High, Low }

impl From<ResolutionArg> for Resolution {
	fn from(r:ResolutionArg) -> Self {
		match r {
			ResolutionArg::High => Resolution::High,
			ResolutionArg::Low  => Resolution::Low,
		}
	}
}

/// Acquire averaged traces from a TDS3000 oscilloscope over VXI-11 and print them as JSON.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
	/// Hostname or IP address of the oscilloscope
	#[arg(long)]
	host: String,

	/// VXI-11 device name
	#[arg(long, default_value = DEFAULT_DEVICE)]
	device: String,

	/// Channel to acquire (repeatable)
	#[arg(long = "channel", default_values_t = [1u8])]
	channels: Vec<u8>,

	/// Number of acquisitions to average
	#[arg(long, default_value_t = 64)]
	average: u32,

	#[arg(long, value_enum, default_value_t = ResolutionArg::High)]
	resolution: ResolutionArg,

	/// Horizontal delay in seconds applied before acquiring
	#[arg(long)]
	trigger_delay: Option<f64>,

	/// Read the acquisition settings from a JSON file instead of the flags above
	#[arg(long)]
	config: Option<PathBuf>,

	/// Reset the instrument before acquiring
	#[arg(long)]
	reset: bool,

	/// Communication timeout applied by a reset, in milliseconds
	#[arg(long, default_value_t = 5000)]
	timeout_ms: u32,

	/// The VISA layer cannot change its timeout
	#[arg(long)]
	no_timeout_attribute: bool,
}

fn load_config(args:&Args) -> Result<AcquisitionConfig, Box<dyn std::error::Error>> {
	match &args.config {
		Some(path) => {
			let text = std::fs::read_to_string(path)?;
			Ok(serde_json::from_str(&text)?)
		},
		None => Ok(AcquisitionConfig::new(args.average, args.resolution.into(), &args.channels)),
	}
}

fn run(args:Args) -> Result<(), Box<dyn std::error::Error>> {
	let config = load_config(&args)?;
	config.validate()?;

	let capabilities = Capabilities { timeout_attribute: !args.no_timeout_attribute, ..Capabilities::default() };
	let mut scope = Tds3000::connect(&args.host, &args.device, capabilities)?;

	if args.reset {
		if scope.reset(config.average_count, args.timeout_ms)? == ResetStatus::Rebooted {
			return Err("instrument was rebooted; reconnect once it is back up".into());
		}
	}

	let mut waveforms = vec![WaveForm::new(); config.channels.len()];
	if let Some(delay) = args.trigger_delay {
		waveforms[0].trigger_delay = Some(delay);
	}

	match scope.acquire(&config, &mut waveforms) {
		Err(e @ AcquireError::StillAcquiring{ .. }) => {
			log::warn!("{} (no trigger?)", e);
			return Err(e.into());
		},
		r => r?,
	}

	println!("{}", serde_json::to_string_pretty(&waveforms)?);
	Ok(())
}

fn main() -> ExitCode {
	env_logger::init();

	match run(Args::parse()) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			log::error!("{}", e);
			ExitCode::FAILURE
		}
	}
}
