use std::path::PathBuf;

use clap::Parser;
use colored::*;

use crate::detect::DetectorParams;
use crate::radio::{EchoConfig, TuneConfig};
use crate::schedule::samples_per_symbol;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Measures RF echo delay with time-scheduled reference bursts", long_about = None)]
pub struct Options {
	#[arg(long, default_value_t = 1e9)]
	pub tx_freq: f64,
	#[arg(long, default_value_t = 1e9)]
	pub rx_freq: f64,
	#[arg(long, default_value_t = 60.0)]
	pub tx_gain: f64,
	#[arg(long, default_value_t = 60.0)]
	pub rx_gain: f64,

	/// Master clock rate in Hz, 0 lets the device choose
	#[arg(long, default_value_t = 0.0)]
	pub mcr: f64,
	#[arg(long, default_value_t = 2e6)]
	pub samplerate: f64,

	/// Symbols per burst
	#[arg(long, default_value_t = 256)]
	pub burst_len: usize,
	/// Seconds between bursts
	#[arg(long, default_value_t = 0.25)]
	pub burst_period: f64,
	/// Longest echo delay to listen for, in seconds
	#[arg(long, default_value_t = 5e-3)]
	pub max_delay: f64,

	/// Number of bursts to send; runs until interrupted if omitted
	#[arg(long)]
	pub count: Option<u64>,
	/// Write the floating point burst as interleaved little-endian f32
	#[arg(long)]
	pub dump_burst: Option<PathBuf>,
	/// Print every report as JSON at exit
	#[arg(long)]
	pub json: bool,

	/// Simulated echo delay in samples
	#[arg(long, default_value_t = 50)]
	pub echo_delay: usize,
	/// Simulated echo amplitude relative to the transmitted burst
	#[arg(long, default_value_t = 0.25)]
	pub echo_scale: f64,
	/// Simulated noise standard deviation in sc16 counts
	#[arg(long, default_value_t = 0.0)]
	pub noise: f64,
}

impl Options {

	pub fn requested_mcr(&self) -> Option<f64> { if self.mcr > 0.0 { Some(self.mcr) } else { None } }

	pub fn sps(&self) -> usize { samples_per_symbol(self.samplerate, self.requested_mcr()) }

	pub fn tune(&self) -> TuneConfig {
		TuneConfig{
			tx_freq_hz: self.tx_freq,
			rx_freq_hz: self.rx_freq,
			tx_gain_db: self.tx_gain,
			rx_gain_db: self.rx_gain,
			sample_rate_sps: self.samplerate,
			master_clock_rate_hz: self.requested_mcr(),
		}
	}

	pub fn echo(&self) -> EchoConfig {
		EchoConfig{ delay_samples: self.echo_delay, scale: self.echo_scale, noise_std: self.noise, ..EchoConfig::default() }
	}

	pub fn detector_params(&self) -> DetectorParams { DetectorParams::default() }

	pub fn print(&self) {
		eprintln!("{}", "Pinger settings".green());
		eprintln!("  TX {:.3} MHz at {:.1} dB, RX {:.3} MHz at {:.1} dB", self.tx_freq / 1e6, self.tx_gain, self.rx_freq / 1e6, self.rx_gain);
		match self.requested_mcr() {
			Some(mcr) => eprintln!("  Master clock {:.3} MHz, sample rate {:.3} Msps", mcr / 1e6, self.samplerate / 1e6),
			None      => eprintln!("  Master clock auto, sample rate {:.3} Msps", self.samplerate / 1e6),
		}
		eprintln!("  Burst {} symbols at {} sps every {:.3} s, listening {:.3} ms", self.burst_len, self.sps(), self.burst_period, self.max_delay * 1e3);
		match self.count {
			Some(n) => eprintln!("  Sending {} bursts", n),
			None    => eprintln!("  Sending until interrupted"),
		}
	}

}
