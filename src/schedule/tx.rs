use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::burst::ReferenceBurst;
use crate::radio::{AsyncEvent, TxStream};
use super::{Stop, TimeBase};

// Bursts handed to the device but not yet acknowledged
pub const MAX_PENDING:usize = 2;

pub const SEND_TIMEOUT:Duration = Duration::from_millis(100);
pub const ACK_TIMEOUT:Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TxStats {
	pub attempted: u64,
	pub sent: u64,
	pub acked: u64,
	pub short_sends: u64,
	pub async_errors: u64,
	pub radio_errors: u64,
	pub max_pending: usize,
}

pub struct TxLoop {
	burst: Arc<ReferenceBurst>,
	next_ticks: i64,
	step_ticks: i64,
	period: Duration,
	pending: usize,
	stats: TxStats,
}

impl TxLoop {

	pub fn new(burst:Arc<ReferenceBurst>, time_base:&TimeBase) -> Self {
		Self{ burst, next_ticks: time_base.start_ticks, step_ticks: time_base.step_ticks,
			period: time_base.period(), pending: 0, stats: TxStats::default() }
	}

	pub fn pending(&self) -> usize { self.pending }
	pub fn next_ticks(&self) -> i64 { self.next_ticks }
	pub fn stats(&self) -> TxStats { self.stats }

	// One iteration: send the next burst if the pipeline has room, then wait briefly for one device event.
	// Returns true if a send was attempted.
	pub fn step<T: TxStream>(&mut self, tx:&mut T) -> bool {
		let mut attempted = false;

		if self.pending < MAX_PENDING {
			let samples = self.burst.fixed_point();
			match tx.transmit(samples, self.next_ticks, SEND_TIMEOUT) {
				Ok(0) => {
					warn!(timestamp_ticks = self.next_ticks, "[!] TX burst not accepted");
					self.stats.short_sends += 1;
				},
				Ok(n) => {
					if n != samples.len() {
						warn!(sent = n, expected = samples.len(), "[!] TX short send");
						self.stats.short_sends += 1;
					}
					self.pending += 1;
					self.stats.sent += 1;
					self.stats.max_pending = self.stats.max_pending.max(self.pending);
					debug!(timestamp_ticks = self.next_ticks, pending = self.pending, "burst queued");
				},
				Err(e) => {
					error!(timestamp_ticks = self.next_ticks, "[!] TX failed: {}", e);
					self.stats.radio_errors += 1;
				},
			}

			// The slot is used up whether or not the device took the burst, so the receive side stays aligned
			self.next_ticks += self.step_ticks;
			self.stats.attempted += 1;
			attempted = true;
		}

		self.poll_event(tx);

		attempted
	}

	// Stops on `stop`, or once max_bursts slots have gone by and their bursts are acknowledged.  Acks still outstanding after
	// the drain deadline are given up on.
	pub fn run<T: TxStream>(&mut self, tx:&mut T, stop:&Stop, max_bursts:Option<u64>) {
		info!(start_ticks = self.next_ticks, "TX loop running");
		let mut drain_deadline:Option<Instant> = None;
		while !stop.is_set() {
			match max_bursts {
				Some(max) if self.stats.attempted >= max => {
					let deadline = *drain_deadline.get_or_insert_with(|| Instant::now() + self.period * (MAX_PENDING as u32 + 1));
					if self.pending == 0 { break; }
					if Instant::now() >= deadline {
						warn!(pending = self.pending, "[!] TX gave up waiting for acks");
						break;
					}
					self.poll_event(tx);
				},
				_ => { self.step(tx); },
			}
		}
		info!(sent = self.stats.sent, acked = self.stats.acked, "TX loop done");
	}

	fn poll_event<T: TxStream>(&mut self, tx:&mut T) {
		match tx.poll_ack(ACK_TIMEOUT) {
			Ok(Some(AsyncEvent::BurstAck)) => {
				self.pending = self.pending.saturating_sub(1);
				self.stats.acked += 1;
			},
			Ok(Some(event)) => {
				warn!(?event, "[!] TX async error");
				self.stats.async_errors += 1;
			},
			Ok(None) => {},
			Err(e) => {
				warn!("[!] TX async poll failed: {}", e);
				self.stats.radio_errors += 1;
			},
		}
	}

}
