use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{PingResult, Sc16};

pub mod sim;

pub use self::sim::{EchoConfig, EchoSimulator};

// Taps for the AD936x programmable FIR in 1 sps mode, where the burst goes out without software pulse
// shaping.  Designed for the 4:1 interpolation ratio the chip uses at low sample rates.
pub const ADI_FIR_TAPS:[i16; 128] = [
	   -9,    -5,    -8,    12,    28,    50,    49,    31,
	   -7,   -37,   -43,   -15,    28,    58,    46,    -1,
	  -52,   -64,   -25,    40,    79,    53,   -26,   -97,
	  -96,    -9,   106,   154,    81,   -75,  -198,  -180,
	  -13,   186,   257,   126,  -121,  -284,  -213,    60,
	  311,   297,   -28,  -423,  -516,  -111,   577,   998,
	  655,  -436, -1591, -1827,  -593,  1633,  3390,  3064,
	   90, -4269, -7192, -5700,  1544, 13088, 24996, 32595,
	32767, 25516, 13944,  2648, -4542, -6239, -3737,   133,
	 2741,  2952,  1332,  -630, -1642, -1341,  -284,   638,
	  860,   430,  -172,  -470,  -323,    48,   302,   257,
	   -3,  -238,  -261,   -74,   156,   252,   154,   -44,
	 -186,  -178,   -47,    96,   146,    84,   -27,   -98,
	  -83,    -8,    62,    74,    27,   -37,   -66,   -44,
	    9,    51,    55,    21,   -21,   -45,   -33,    -1,
	   34,    48,    44,    21,     5,   -11,    -7,    -9,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneConfig {
	pub tx_freq_hz: f64,
	pub rx_freq_hz: f64,
	pub tx_gain_db: f64,
	pub rx_gain_db: f64,
	pub sample_rate_sps: f64,
	// None lets the device pick
	pub master_clock_rate_hz: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterPath {
	Tx,
	Rx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncEvent {
	BurstAck,
	Underflow,
	SequenceError,
	TimeError,
}

pub trait FirFilter {
	fn set_taps(&mut self, taps:&[i16]) -> PingResult<()>;
	fn taps(&self) -> &[i16];
}

pub trait TxStream: Send {
	// Queues one complete burst to go out when the device clock reaches timestamp_ticks
	fn transmit(&mut self, burst:&[Sc16], timestamp_ticks:i64, timeout:Duration) -> PingResult<usize>;

	// Ok(None) when nothing arrived within the timeout
	fn poll_ack(&mut self, timeout:Duration) -> PingResult<Option<AsyncEvent>>;
}

pub trait RxStream: Send {
	// Schedules a finite capture of num_samples starting at timestamp_ticks
	fn start_receive(&mut self, timestamp_ticks:i64, num_samples:usize) -> PingResult<()>;

	fn receive(&mut self, buffer:&mut [Sc16], timeout:Duration) -> PingResult<usize>;
}

pub trait Radio {
	type Tx: TxStream + 'static;
	type Rx: RxStream + 'static;

	fn configure(&mut self, tune:&TuneConfig) -> PingResult<()>;

	// Actual values after configure, which may differ from what was requested
	fn master_clock_rate(&self) -> f64;
	fn sample_rate(&self) -> f64;

	fn current_time(&self) -> PingResult<i64>;

	// Not every front end exposes a programmable filter
	fn fir_filter(&mut self, path:FilterPath) -> Option<&mut dyn FirFilter>;

	fn tx_stream(&mut self) -> PingResult<Self::Tx>;
	fn rx_stream(&mut self) -> PingResult<Self::Rx>;
}

// Loads the same taps on both paths; a front end without the filter only gets a warning
pub fn load_fir_taps<R: Radio>(radio:&mut R, taps:&[i16]) -> PingResult<usize> {
	let mut loaded:usize = 0;
	for path in [FilterPath::Tx, FilterPath::Rx] {
		match radio.fir_filter(path) {
			Some(filter) => {
				filter.set_taps(taps)?;
				info!(?path, taps = taps.len(), "loaded FIR taps");
				loaded += 1;
			},
			None => warn!(?path, "front end has no programmable FIR, continuing without it"),
		}
	}
	Ok(loaded)
}

#[test]
fn adi_taps_peak_in_the_middle() {
	let (peak_idx, _) = ADI_FIR_TAPS.iter().enumerate().max_by_key(|(_, t)| **t).unwrap();
	assert_eq!(peak_idx, 64);
}
