use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::burst::ReferenceBurst;
use crate::detect::{DetectorParams, EchoReport};
use crate::radio::{Radio, RxStream, TxStream};
use crate::{PingErr, PingResult};

pub mod rx;
pub mod tx;

#[cfg(test)]
mod tests;

pub use self::rx::{RxLoop, RxStats};
pub use self::tx::{TxLoop, TxStats, MAX_PENDING};

// Above this the converters can no longer run 1:1 with the master clock
const MAX_SINGLE_SPS_RATE:f64 = 10e6;

// Software pulse shaping is only skipped when the sample rate is the requested master clock rate,
// in which case the hardware FIR does the shaping instead
pub fn samples_per_symbol(sample_rate_sps:f64, requested_mcr:Option<f64>) -> usize {
	match requested_mcr {
		Some(mcr) if mcr == sample_rate_sps && sample_rate_sps <= MAX_SINGLE_SPS_RATE => 1,
		_ => 2,
	}
}

// Tick arithmetic shared by both loops, computed once before either starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeBase {
	pub mcr: f64,
	pub sample_rate: f64,
	pub start_ticks: i64,
	pub step_ticks: i64,
	pub listen_ticks: i64,
	pub window_len: usize,
}

impl TimeBase {

	pub fn derive(now_ticks:i64, mcr:f64, sample_rate:f64, burst_period_s:f64, max_delay_s:f64) -> PingResult<Self> {
		if !(mcr > 0.0) { return Err(PingErr::Config("master clock rate must be positive")); }
		if !(sample_rate > 0.0) { return Err(PingErr::Config("sample rate must be positive")); }
		if !(burst_period_s > 0.0) { return Err(PingErr::Config("burst period must be positive")); }
		if !(max_delay_s > 0.0) { return Err(PingErr::Config("maximum delay must be positive")); }

		let step_ticks = (mcr * burst_period_s) as i64;
		let listen_ticks = (mcr * max_delay_s) as i64;
		let window_len = (listen_ticks as f64 * sample_rate / mcr) as usize;

		if step_ticks <= 0 { return Err(PingErr::Config("burst period is shorter than one clock tick")); }
		if window_len == 0 { return Err(PingErr::Config("maximum delay is shorter than one sample")); }
		if listen_ticks > step_ticks {
			warn!(listen_ticks, step_ticks, "receive window is longer than the burst period; windows will overlap");
		}

		// First burst one full period out so both loops have time to start
		Ok(Self{ mcr, sample_rate, start_ticks: now_ticks + step_ticks, step_ticks, listen_ticks, window_len })
	}

	pub fn from_radio<R: Radio>(radio:&R, burst_period_s:f64, max_delay_s:f64) -> PingResult<Self> {
		let now = radio.current_time()?;
		Self::derive(now, radio.master_clock_rate(), radio.sample_rate(), burst_period_s, max_delay_s)
	}

	pub fn period(&self) -> Duration { Duration::from_secs_f64(self.step_ticks as f64 / self.mcr) }

	// Scheduled start of the nth burst and of its receive window
	pub fn ticks_of_period(&self, n:u64) -> i64 { self.start_ticks + self.step_ticks * n as i64 }

}

// Level-triggered stop flag, readable from blocking loops without awaiting
#[derive(Debug, Clone)]
pub struct Stop(watch::Receiver<bool>);

impl Stop {

	pub fn is_set(&self) -> bool { *self.0.borrow() }

	// A flag nobody can raise
	pub fn never() -> Self { stop_channel().1 }

}

pub fn stop_channel() -> (watch::Sender<bool>, Stop) {
	let (tx, rx) = watch::channel(false);
	(tx, Stop(rx))
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunSummary {
	pub tx: TxStats,
	pub rx: RxStats,
}

// Everything both loops read but never modify
pub struct Schedule {
	pub time_base: TimeBase,
	pub burst: Arc<ReferenceBurst>,
	pub params: DetectorParams,
	pub max_bursts: Option<u64>,
}

impl Schedule {

	// Runs both loops to completion.  The transmit loop ends on `stop` or after max_bursts; the receive
	// loop is then given two periods to close its last window before it is cancelled.
	pub async fn run<T, R, F>(self, mut tx:T, mut rx:R, stop:Stop, on_report:F) -> PingResult<RunSummary>
	where
		T: TxStream + 'static,
		R: RxStream + 'static,
		F: FnMut(EchoReport) + Send + 'static,
	{
		let Schedule{ time_base, burst, params, max_bursts } = self;

		let mut tx_loop = TxLoop::new(burst.clone(), &time_base);
		let mut rx_loop = RxLoop::new(&burst, &time_base, params)?;

		info!(start_ticks = time_base.start_ticks, step_ticks = time_base.step_ticks, window_len = time_base.window_len,
			burst_samples = burst.len(), "starting transmit and receive loops");

		let (cancel_tx, cancel) = stop_channel();
		let mut rx_handle = tokio::task::spawn_blocking(move || rx_loop.run(&mut rx, &cancel, max_bursts, on_report));
		let tx_handle = tokio::task::spawn_blocking(move || {
			tx_loop.run(&mut tx, &stop, max_bursts);
			tx_loop.stats()
		});

		let tx_stats = tx_handle.await.map_err(|e| PingErr::Task(e.to_string()))?;

		if max_bursts.is_some() {
			let grace = time_base.period() * 2;
			if let Ok(joined) = tokio::time::timeout(grace, &mut rx_handle).await {
				let rx_stats = joined.map_err(|e| PingErr::Task(e.to_string()))?;
				return Ok(RunSummary{ tx: tx_stats, rx: rx_stats });
			}
		}

		// Receiver may already be gone, in which case there is nobody left to cancel
		cancel_tx.send(true).ok();
		let rx_stats = rx_handle.await.map_err(|e| PingErr::Task(e.to_string()))?;

		info!(sent = tx_stats.sent, windows = rx_stats.windows, "loops finished");
		Ok(RunSummary{ tx: tx_stats, rx: rx_stats })
	}

}
