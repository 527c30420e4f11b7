use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use num_complex::Complex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::radio::{AsyncEvent, FilterPath, FirFilter, Radio, RxStream, TuneConfig, TxStream};
use crate::{PingErr, PingResult, Sc16};

// Largest chunk a single receive call hands back, like a streamer's samples-per-packet
pub const MAX_SAMPS_PER_PACKET:usize = 2040;

// Bursts the echo path remembers before the oldest is dropped
const MAX_STORED_BURSTS:usize = 64;

// Clock rate picked when the tune request leaves it to the device
const AUTO_MCR_FACTOR:f64 = 16.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoConfig {
	pub delay_samples: usize,
	pub scale: f64,
	// Standard deviation per I/Q component, in sc16 counts
	pub noise_std: f64,
	pub seed: u64,
}

impl Default for EchoConfig {
	fn default() -> Self {
		Self{ delay_samples: 50, scale: 0.25, noise_std: 0.0, seed: 0x5eed }
	}
}

#[derive(Debug, Clone, Copy)]
struct SimClock {
	epoch: Instant,
	mcr: f64,
	sample_rate: f64,
}

impl SimClock {

	fn now_ticks(&self) -> i64 { (self.epoch.elapsed().as_secs_f64() * self.mcr) as i64 }

	fn ticks_to_samples(&self, ticks:i64) -> i64 { (ticks as f64 * self.sample_rate / self.mcr).floor() as i64 }
	fn samples_to_ticks(&self, samples:i64) -> i64 { (samples as f64 * self.mcr / self.sample_rate).ceil() as i64 }

	fn now_samples(&self) -> i64 { self.ticks_to_samples(self.now_ticks()) }

	// Wall-clock instant at which the given sample index has been fully digitized
	fn instant_of_sample(&self, sample_idx:i64) -> Instant {
		let secs = (sample_idx.max(0) as f64) / self.sample_rate;
		self.epoch + Duration::from_secs_f64(secs)
	}

}

#[derive(Debug)]
struct StoredBurst {
	start_sample: i64,
	samples: Vec<Sc16>,
}

type EchoPath = Arc<Mutex<VecDeque<StoredBurst>>>;

#[derive(Debug, Default)]
pub struct SimFir {
	taps: Vec<i16>,
}

impl FirFilter for SimFir {

	fn set_taps(&mut self, taps:&[i16]) -> PingResult<()> {
		if taps.is_empty() || taps.len() > 128 {
			return Err(PingErr::Device(format!("FIR accepts 1 to 128 taps, got {}", taps.len())));
		}
		self.taps = taps.to_vec();
		Ok(())
	}

	fn taps(&self) -> &[i16] { &self.taps }

}

// Software stand-in for a transceiver with its TX looped back to RX through a delay line.  Each burst
// reappears on the receive side delay_samples later, scaled by scale, on top of optional Gaussian noise.
pub struct EchoSimulator {
	echo: EchoConfig,
	clock: Option<SimClock>,
	path: EchoPath,
	tx_fir: SimFir,
	rx_fir: SimFir,
}

impl EchoSimulator {

	pub fn new(echo:EchoConfig) -> Self {
		Self{ echo, clock: None, path: Arc::new(Mutex::new(VecDeque::new())), tx_fir: SimFir::default(), rx_fir: SimFir::default() }
	}

	pub fn echo(&self) -> &EchoConfig { &self.echo }

	fn clock(&self) -> PingResult<SimClock> {
		self.clock.ok_or_else(|| PingErr::Device("simulator used before configure".to_string()))
	}

}

impl Radio for EchoSimulator {
	type Tx = SimTxStream;
	type Rx = SimRxStream;

	fn configure(&mut self, tune:&TuneConfig) -> PingResult<()> {
		if !(tune.sample_rate_sps > 0.0) {
			return Err(PingErr::Config("sample rate must be positive"));
		}
		let mcr = match tune.master_clock_rate_hz {
			Some(mcr) if mcr > 0.0 => mcr,
			_ => tune.sample_rate_sps * AUTO_MCR_FACTOR,
		};

		debug!(tx_freq = tune.tx_freq_hz, rx_freq = tune.rx_freq_hz, tx_gain = tune.tx_gain_db, rx_gain = tune.rx_gain_db,
			"simulator ignores RF tuning");

		self.clock = Some(SimClock{ epoch: Instant::now(), mcr, sample_rate: tune.sample_rate_sps });
		Ok(())
	}

	fn master_clock_rate(&self) -> f64 { self.clock.map(|c| c.mcr).unwrap_or(0.0) }
	fn sample_rate(&self) -> f64 { self.clock.map(|c| c.sample_rate).unwrap_or(0.0) }

	fn current_time(&self) -> PingResult<i64> { Ok(self.clock()?.now_ticks()) }

	fn fir_filter(&mut self, path:FilterPath) -> Option<&mut dyn FirFilter> {
		match path {
			FilterPath::Tx => Some(&mut self.tx_fir),
			FilterPath::Rx => Some(&mut self.rx_fir),
		}
	}

	fn tx_stream(&mut self) -> PingResult<SimTxStream> {
		Ok(SimTxStream{ clock: self.clock()?, path: self.path.clone(), events: Vec::new() })
	}

	fn rx_stream(&mut self) -> PingResult<SimRxStream> {
		let noise = if self.echo.noise_std > 0.0 {
			Some(Normal::new(0.0, self.echo.noise_std).map_err(|_| PingErr::Config("invalid noise level"))?)
		} else {
			None
		};

		Ok(SimRxStream{ clock: self.clock()?, path: self.path.clone(), delay: self.echo.delay_samples as i64,
			scale: self.echo.scale, noise, rng: StdRng::seed_from_u64(self.echo.seed), request: None })
	}
}

pub struct SimTxStream {
	clock: SimClock,
	path: EchoPath,
	// (tick at which the event fires, event)
	events: Vec<(i64, AsyncEvent)>,
}

impl SimTxStream {

	fn take_ready(&mut self, now:i64) -> Option<AsyncEvent> {
		let pos = self.events.iter().enumerate()
			.filter(|(_, (at, _))| *at <= now)
			.min_by_key(|(_, (at, _))| *at)
			.map(|(pos, _)| pos)?;
		Some(self.events.remove(pos).1)
	}

}

impl TxStream for SimTxStream {

	fn transmit(&mut self, burst:&[Sc16], timestamp_ticks:i64, _timeout:Duration) -> PingResult<usize> {
		let now = self.clock.now_ticks();
		if timestamp_ticks < now {
			trace!(timestamp_ticks, now, "burst scheduled in the past");
			self.events.push((now, AsyncEvent::TimeError));
			return Ok(burst.len());
		}

		let start_sample = self.clock.ticks_to_samples(timestamp_ticks);
		let end_ticks = self.clock.samples_to_ticks(start_sample + burst.len() as i64);

		{
			let mut path = self.path.lock().map_err(|_| PingErr::Device("echo path poisoned".to_string()))?;
			if path.len() >= MAX_STORED_BURSTS {
				path.pop_front();
			}
			path.push_back(StoredBurst{ start_sample, samples: burst.to_vec() });
		}

		self.events.push((end_ticks, AsyncEvent::BurstAck));
		Ok(burst.len())
	}

	fn poll_ack(&mut self, timeout:Duration) -> PingResult<Option<AsyncEvent>> {
		let deadline = Instant::now() + timeout;
		loop {
			let now = self.clock.now_ticks();
			if let Some(event) = self.take_ready(now) {
				return Ok(Some(event));
			}

			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() {
				return Ok(None);
			}

			// Sleep until the next event is due, or the deadline, whichever comes first
			let next_due = self.events.iter().map(|(at, _)| *at).min()
				.map(|at| Duration::from_secs_f64(((at - now).max(1) as f64) / self.clock.mcr))
				.unwrap_or(remaining);
			thread::sleep(next_due.min(remaining));
		}
	}

}

#[derive(Debug, Clone, Copy)]
struct CaptureRequest {
	next_sample: i64,
	remaining: usize,
}

pub struct SimRxStream {
	clock: SimClock,
	path: EchoPath,
	delay: i64,
	scale: f64,
	noise: Option<Normal<f64>>,
	rng: StdRng,
	request: Option<CaptureRequest>,
}

impl SimRxStream {

	fn render(&mut self, first_sample:i64, out:&mut [Sc16]) -> PingResult<()> {
		let mut acc:Vec<Complex<f64>> = vec![Complex{ re: 0.0, im: 0.0 }; out.len()];
		let last_sample = first_sample + out.len() as i64;

		{
			let mut path = self.path.lock().map_err(|_| PingErr::Device("echo path poisoned".to_string()))?;

			// Anything that ended before this chunk can never be heard again
			while let Some(front) = path.front() {
				if front.start_sample + self.delay + (front.samples.len() as i64) < first_sample {
					path.pop_front();
				} else {
					break;
				}
			}

			for burst in path.iter() {
				let echo_start = burst.start_sample + self.delay;
				let lo = echo_start.max(first_sample);
				let hi = (echo_start + burst.samples.len() as i64).min(last_sample);
				for m in lo..hi {
					let s = burst.samples[(m - echo_start) as usize];
					let a = &mut acc[(m - first_sample) as usize];
					a.re += s.re as f64 * self.scale;
					a.im += s.im as f64 * self.scale;
				}
			}
		}

		if let Some(noise) = self.noise {
			for a in acc.iter_mut() {
				a.re += noise.sample(&mut self.rng);
				a.im += noise.sample(&mut self.rng);
			}
		}

		for (dst, a) in out.iter_mut().zip(acc.iter()) {
			*dst = Complex{ re: a.re as i16, im: a.im as i16 };
		}
		Ok(())
	}

}

impl RxStream for SimRxStream {

	fn start_receive(&mut self, timestamp_ticks:i64, num_samples:usize) -> PingResult<()> {
		if self.request.map(|r| r.remaining > 0).unwrap_or(false) {
			debug!("new capture replaces an unfinished one");
		}
		self.request = Some(CaptureRequest{ next_sample: self.clock.ticks_to_samples(timestamp_ticks), remaining: num_samples });
		Ok(())
	}

	fn receive(&mut self, buffer:&mut [Sc16], timeout:Duration) -> PingResult<usize> {
		let deadline = Instant::now() + timeout;

		let request = match self.request {
			Some(r) if r.remaining > 0 => r,
			_ => {
				// Idle streamer: nothing will ever arrive
				thread::sleep(timeout);
				return Ok(0);
			}
		};

		let want = buffer.len().min(request.remaining).min(MAX_SAMPS_PER_PACKET);
		if want == 0 {
			return Ok(0);
		}

		// Block until the whole packet has been digitized or the timeout runs out
		let ready_at = self.clock.instant_of_sample(request.next_sample + want as i64);
		let wait = ready_at.min(deadline).saturating_duration_since(Instant::now());
		if !wait.is_zero() {
			thread::sleep(wait);
		}

		let available = (self.clock.now_samples() - request.next_sample).clamp(0, want as i64) as usize;
		if available == 0 {
			return Ok(0);
		}

		self.render(request.next_sample, &mut buffer[..available])?;
		self.request = Some(CaptureRequest{ next_sample: request.next_sample + available as i64, remaining: request.remaining - available });
		Ok(available)
	}

}
