use std::time::Duration;

use num_complex::Complex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::burst::ReferenceBurst;
use crate::detect::{Detector, DetectorParams, EchoReport};
use crate::radio::RxStream;
use crate::{PingErr, PingResult, Sc16};
use super::{Stop, TimeBase};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RxStats {
	pub windows: u64,
	pub stalls: u64,
	pub radio_errors: u64,
	pub windows_with_echo: u64,
}

pub struct RxLoop {
	detector: Detector,
	buffer: Vec<Sc16>,
	next_ticks: i64,
	step_ticks: i64,
	sample_rate: f64,
	timeout: Duration,
	seq: u64,
	stats: RxStats,
}

impl RxLoop {

	pub fn new(burst:&ReferenceBurst, time_base:&TimeBase, params:DetectorParams) -> PingResult<Self> {
		let mut buffer:Vec<Sc16> = Vec::new();
		buffer.try_reserve_exact(time_base.window_len).map_err(|_| PingErr::Allocation(time_base.window_len))?;
		buffer.resize(time_base.window_len, Complex{ re: 0, im: 0 });

		Ok(Self{
			detector: Detector::new(burst, time_base.window_len, params)?,
			buffer,
			next_ticks: time_base.start_ticks,
			step_ticks: time_base.step_ticks,
			sample_rate: time_base.sample_rate,
			timeout: time_base.period() * 2,
			seq: 0,
			stats: RxStats::default(),
		})
	}

	pub fn next_ticks(&self) -> i64 { self.next_ticks }
	pub fn stats(&self) -> RxStats { self.stats }
	pub fn window(&self) -> &[Sc16] { &self.buffer }

	// Captures and scans one window.  Ok(None) means the loop was cancelled partway through.
	pub fn step<R: RxStream>(&mut self, rx:&mut R, cancel:&Stop) -> PingResult<Option<EchoReport>> {
		let timestamp_ticks = self.next_ticks;
		self.next_ticks += self.step_ticks;

		if let Err(e) = rx.start_receive(timestamp_ticks, self.buffer.len()) {
			error!(timestamp_ticks, "[!] RX stream command failed: {}", e);
			self.stats.radio_errors += 1;
			return Ok(Some(self.empty_report(timestamp_ticks)));
		}

		let mut filled:usize = 0;
		while filled < self.buffer.len() {
			if cancel.is_set() { return Ok(None); }
			match rx.receive(&mut self.buffer[filled..], self.timeout) {
				Ok(0) => {
					warn!(timestamp_ticks, filled, "[!] RX stall");
					self.stats.stalls += 1;
				},
				Ok(n) => filled += n,
				Err(e) => {
					warn!(timestamp_ticks, filled, "[!] RX receive failed: {}", e);
					self.stats.radio_errors += 1;
				},
			}
		}

		let scan = self.detector.detect(&self.buffer)?;
		let report = EchoReport::from_scan(self.seq, timestamp_ticks, &scan, self.detector.params(), self.sample_rate);
		self.seq += 1;
		self.stats.windows += 1;
		if !report.detections.is_empty() { self.stats.windows_with_echo += 1; }

		debug!(seq = report.seq, timestamp_ticks, average_power = report.average_power, "window scanned");
		Ok(Some(report))
	}

	// A window whose capture never got going still takes a sequence number
	fn empty_report(&mut self, timestamp_ticks:i64) -> EchoReport {
		let report = EchoReport{ seq: self.seq, timestamp_ticks, average_power: 0.0, detections: Vec::new() };
		self.seq += 1;
		report
	}

	// Hands every report to on_report until cancelled or max_windows have been scanned
	pub fn run<R, F>(&mut self, rx:&mut R, cancel:&Stop, max_windows:Option<u64>, mut on_report:F) -> RxStats
	where
		R: RxStream,
		F: FnMut(EchoReport),
	{
		info!(start_ticks = self.next_ticks, window_len = self.buffer.len(), "RX loop running");
		while !cancel.is_set() {
			if let Some(max) = max_windows {
				if self.seq >= max { break; }
			}

			match self.step(rx, cancel) {
				Ok(Some(report)) => on_report(report),
				Ok(None) => break,
				Err(e) => {
					error!("[!] RX detection failed: {}", e);
					break;
				},
			}
		}
		info!(windows = self.stats.windows, stalls = self.stats.stalls, "RX loop done");
		self.stats
	}

}
