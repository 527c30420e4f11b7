use std::sync::{Arc, Mutex};
use std::time::Duration;

use num_complex::Complex;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tokio::sync::watch;

use crate::burst::ReferenceBurst;
use crate::burst::lfsr::DEFAULT_SEED;
use crate::detect::{DetectorParams, EchoReport};
use crate::radio::{AsyncEvent, RxStream, TxStream};
use crate::{PingResult, Sc16};
use super::*;

// Acks only come back once the test releases them
#[derive(Default)]
struct AckGate {
	timestamps: Vec<i64>,
	released: usize,
	delivered: usize,
	short_by: usize,
	queued_events: Vec<AsyncEvent>,
	max_in_flight: usize,
}

impl TxStream for AckGate {

	fn transmit(&mut self, burst:&[Sc16], timestamp_ticks:i64, _timeout:Duration) -> PingResult<usize> {
		self.timestamps.push(timestamp_ticks);
		self.max_in_flight = self.max_in_flight.max(self.timestamps.len() - self.delivered);
		Ok(burst.len() - self.short_by)
	}

	fn poll_ack(&mut self, _timeout:Duration) -> PingResult<Option<AsyncEvent>> {
		if let Some(event) = self.queued_events.pop() {
			return Ok(Some(event));
		}
		if self.delivered < self.released && self.delivered < self.timestamps.len() {
			self.delivered += 1;
			return Ok(Some(AsyncEvent::BurstAck));
		}
		Ok(None)
	}

}

// Plays back a fixed window in chunks, stalling on every stall_every-th call
struct ScriptedRx {
	signal: Vec<Sc16>,
	pos: usize,
	chunk: usize,
	stall_every: usize,
	calls: usize,
	starts: Vec<(i64, usize)>,
}

impl ScriptedRx {

	fn new(signal:Vec<Sc16>, chunk:usize, stall_every:usize) -> Self {
		Self{ signal, pos: 0, chunk, stall_every, calls: 0, starts: vec![] }
	}

}

impl RxStream for ScriptedRx {

	fn start_receive(&mut self, timestamp_ticks:i64, num_samples:usize) -> PingResult<()> {
		self.starts.push((timestamp_ticks, num_samples));
		self.pos = 0;
		Ok(())
	}

	fn receive(&mut self, buffer:&mut [Sc16], _timeout:Duration) -> PingResult<usize> {
		self.calls += 1;
		if self.stall_every > 0 && self.calls % self.stall_every == 0 { return Ok(0); }

		let n = self.chunk.min(buffer.len()).min(self.signal.len() - self.pos);
		buffer[..n].copy_from_slice(&self.signal[self.pos..self.pos + n]);
		self.pos += n;
		Ok(n)
	}

}

// Never produces a sample; raises the cancel flag after a few calls
struct DeadRx {
	calls: usize,
	cancel: watch::Sender<bool>,
}

impl RxStream for DeadRx {

	fn start_receive(&mut self, _timestamp_ticks:i64, _num_samples:usize) -> PingResult<()> { Ok(()) }

	fn receive(&mut self, _buffer:&mut [Sc16], _timeout:Duration) -> PingResult<usize> {
		self.calls += 1;
		if self.calls == 3 { self.cancel.send(true).ok(); }
		Ok(0)
	}

}

fn time_base(window_s:f64) -> TimeBase {
	TimeBase::derive(0, 1e6, 1e6, 0.25, window_s).unwrap()
}

fn burst() -> Arc<ReferenceBurst> {
	Arc::new(ReferenceBurst::synthesize(256, 2, DEFAULT_SEED).unwrap())
}

fn window_with_echo(len:usize, burst:&ReferenceBurst, offset:usize) -> Vec<Sc16> {
	let mut window:Vec<Sc16> = vec![Complex{ re: 0, im: 0 }; len];
	for (dst, src) in window[offset..].iter_mut().zip(burst.fixed_point().iter()) {
		dst.re = src.re / 4;
		dst.im = src.im / 4;
	}
	window
}

#[test]
fn time_base_derivation() {
	let tb = TimeBase::derive(1_000, 32e6, 2e6, 0.25, 5e-3).unwrap();
	assert_eq!(tb.step_ticks, 8_000_000);
	assert_eq!(tb.listen_ticks, 160_000);
	assert_eq!(tb.window_len, 10_000);
	assert_eq!(tb.start_ticks, 8_001_000);
	assert_eq!(tb.ticks_of_period(2), 24_001_000);
	assert_eq!(tb.period(), Duration::from_millis(250));
}

#[test]
fn time_base_rejects_degenerate_settings() {
	assert!(TimeBase::derive(0, 0.0, 2e6, 0.25, 5e-3).is_err());
	assert!(TimeBase::derive(0, 32e6, 2e6, -1.0, 5e-3).is_err());
	assert!(TimeBase::derive(0, 32e6, 2e6, 0.25, 0.0).is_err());
	// Shorter than one sample
	assert!(TimeBase::derive(0, 32e6, 2e6, 0.25, 1e-7).is_err());
}

#[test]
fn pulse_shaping_depends_on_clock_match() {
	assert_eq!(samples_per_symbol(2e6, None), 2);
	assert_eq!(samples_per_symbol(2e6, Some(2e6)), 1);
	assert_eq!(samples_per_symbol(2e6, Some(32e6)), 2);
	assert_eq!(samples_per_symbol(20e6, Some(20e6)), 2);
}

#[test]
fn sends_stall_once_two_bursts_are_in_flight() {
	let tb = time_base(2e-3);
	let mut tx_loop = TxLoop::new(burst(), &tb);
	let mut gate = AckGate::default();

	for _ in 0..10 {
		tx_loop.step(&mut gate);
		assert!(tx_loop.pending() <= MAX_PENDING);
	}
	assert_eq!(gate.timestamps, vec![tb.start_ticks, tb.start_ticks + tb.step_ticks]);
	assert_eq!(tx_loop.pending(), 2);

	// One ack frees exactly one slot, taken on the following iteration
	gate.released = 1;
	assert!(!tx_loop.step(&mut gate));
	assert_eq!(tx_loop.pending(), 1);
	assert!(tx_loop.step(&mut gate));
	assert_eq!(gate.timestamps.len(), 3);
	assert_eq!(tx_loop.pending(), 2);
	assert!(!tx_loop.step(&mut gate));
}

#[test]
fn pending_bounded_under_random_ack_timing() {
	let tb = time_base(2e-3);
	let mut tx_loop = TxLoop::new(burst(), &tb);
	let mut gate = AckGate::default();
	let mut rng = StdRng::seed_from_u64(7);

	for _ in 0..500 {
		if rng.gen_bool(0.3) { gate.released += 1; }
		tx_loop.step(&mut gate);
		assert!(tx_loop.pending() <= MAX_PENDING);
	}

	assert!(gate.max_in_flight <= MAX_PENDING);
	assert!(gate.timestamps.len() > 10);
	for pair in gate.timestamps.windows(2) {
		assert_eq!(pair[1] - pair[0], tb.step_ticks);
	}
	assert_eq!(tx_loop.stats().max_pending, MAX_PENDING);
}

#[test]
fn async_errors_do_not_free_slots() {
	let tb = time_base(2e-3);
	let mut tx_loop = TxLoop::new(burst(), &tb);
	let mut gate = AckGate::default();
	gate.queued_events.push(AsyncEvent::Underflow);

	tx_loop.step(&mut gate);
	assert_eq!(tx_loop.pending(), 1);
	assert_eq!(tx_loop.stats().async_errors, 1);
	assert_eq!(tx_loop.stats().acked, 0);
}

#[test]
fn short_send_is_counted() {
	let tb = time_base(2e-3);
	let mut tx_loop = TxLoop::new(burst(), &tb);
	let mut gate = AckGate{ short_by: 1, ..Default::default() };

	tx_loop.step(&mut gate);
	assert_eq!(tx_loop.stats().short_sends, 1);
	assert_eq!(tx_loop.pending(), 1);
}

#[test]
fn counted_run_drains_acks() {
	let tb = time_base(2e-3);
	let mut tx_loop = TxLoop::new(burst(), &tb);
	let mut gate = AckGate{ released: usize::MAX, ..Default::default() };

	tx_loop.run(&mut gate, &Stop::never(), Some(5));
	let stats = tx_loop.stats();
	assert_eq!(stats.sent, 5);
	assert_eq!(stats.acked, 5);
	assert_eq!(tx_loop.pending(), 0);
	assert_eq!(tx_loop.next_ticks(), tb.ticks_of_period(5));
}

#[test]
fn raised_stop_ends_transmit_loop() {
	let tb = time_base(2e-3);
	let mut tx_loop = TxLoop::new(burst(), &tb);
	let mut gate = AckGate::default();
	let (stop_tx, stop) = stop_channel();
	stop_tx.send(true).unwrap();

	tx_loop.run(&mut gate, &stop, None);
	assert!(gate.timestamps.is_empty());
}

#[test]
fn window_filled_across_stalls_then_scanned() {
	let tb = time_base(2e-3);
	let burst = burst();
	let mut rx_loop = RxLoop::new(&burst, &tb, DetectorParams::default()).unwrap();
	let mut rx = ScriptedRx::new(window_with_echo(tb.window_len, &burst, 300), 150, 4);

	let report = rx_loop.step(&mut rx, &Stop::never()).unwrap().unwrap();
	assert_eq!(rx.starts, vec![(tb.start_ticks, 2000)]);
	assert!(rx_loop.stats().stalls > 0);
	assert_eq!(rx_loop.window(), &rx.signal[..]);

	assert_eq!(report.seq, 0);
	assert_eq!(report.timestamp_ticks, tb.start_ticks);
	assert_eq!(report.strongest().map(|d| d.idx), Some(300));
}

#[test]
fn windows_follow_the_transmit_schedule() {
	let tb = time_base(2e-3);
	let burst = burst();
	let mut rx_loop = RxLoop::new(&burst, &tb, DetectorParams::default()).unwrap();
	let mut rx = ScriptedRx::new(window_with_echo(tb.window_len, &burst, 40), 2040, 0);

	let mut reports:Vec<EchoReport> = vec![];
	let stats = rx_loop.run(&mut rx, &Stop::never(), Some(3), |r| reports.push(r));

	assert_eq!(stats.windows, 3);
	assert_eq!(stats.windows_with_echo, 3);
	let seqs:Vec<u64> = reports.iter().map(|r| r.seq).collect();
	assert_eq!(seqs, vec![0, 1, 2]);
	let starts:Vec<i64> = rx.starts.iter().map(|s| s.0).collect();
	assert_eq!(starts, vec![tb.ticks_of_period(0), tb.ticks_of_period(1), tb.ticks_of_period(2)]);
}

#[test]
fn cancel_interrupts_a_window() {
	let tb = time_base(2e-3);
	let mut rx_loop = RxLoop::new(&burst(), &tb, DetectorParams::default()).unwrap();
	let (cancel_tx, cancel) = stop_channel();
	let mut rx = DeadRx{ calls: 0, cancel: cancel_tx };

	assert!(rx_loop.step(&mut rx, &cancel).unwrap().is_none());
	assert_eq!(rx.calls, 3);
	assert_eq!(rx_loop.stats().stalls, 3);
	assert_eq!(rx_loop.stats().windows, 0);
}

#[tokio::test]
async fn schedule_runs_both_loops() {
	let tb = time_base(2e-3);
	let burst = burst();
	let schedule = Schedule{ time_base: tb, burst: burst.clone(), params: DetectorParams::default(), max_bursts: Some(4) };

	let gate = AckGate{ released: usize::MAX, ..Default::default() };
	let rx = ScriptedRx::new(window_with_echo(tb.window_len, &burst, 120), 500, 0);

	let reports:Arc<Mutex<Vec<EchoReport>>> = Arc::new(Mutex::new(vec![]));
	let sink = reports.clone();
	let summary = schedule.run(gate, rx, Stop::never(), move |r| sink.lock().unwrap().push(r)).await.unwrap();

	assert_eq!(summary.tx.sent, 4);
	assert_eq!(summary.rx.windows, 4);
	let reports = reports.lock().unwrap();
	assert_eq!(reports.len(), 4);
	assert!(reports.iter().all(|r| r.strongest().map(|d| d.idx) == Some(120)));
}
