use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::burst::ReferenceBurst;
use crate::filters::MatchedFilter;
use crate::{PingErr, PingResult, Sc16};

pub mod peaks;

pub use self::peaks::{Peak, PeakList, DEFAULT_MERGE_WINDOW, PEAK_CAPACITY};

// Receive samples are full-scale sc16
pub const RX_FULL_SCALE:f64 = 32768.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
	pub merge_window: usize,
	pub noise_factor: f64,
	pub dominant_divisor: f64,
}

impl Default for DetectorParams {
	fn default() -> Self {
		Self{ merge_window: DEFAULT_MERGE_WINDOW, noise_factor: 25.0, dominant_divisor: 10.0 }
	}
}

#[derive(Debug, Clone)]
pub struct Scan {
	pub peaks: PeakList,
	pub average_power: f64,
}

impl Scan {

	pub fn detections(&self, params:&DetectorParams) -> Vec<Peak> {
		self.peaks.detections(self.average_power, params.noise_factor, params.dominant_divisor)
	}

}

// Correlates receive windows of a fixed length against the reference burst.  Owns all of its scratch
// space, so one instance belongs to exactly one receive loop.
pub struct Detector {
	mf: MatchedFilter,
	params: DetectorParams,
	window: Vec<Complex<f64>>,
	correlation: Vec<Complex<f64>>,
}

impl Detector {

	pub fn new(reference:&ReferenceBurst, window_len:usize, params:DetectorParams) -> PingResult<Self> {
		let mf = MatchedFilter::new(reference.samples(), window_len).map_err(PingErr::Config)?;
		Ok(Self{ mf, params, window: Vec::with_capacity(window_len), correlation: Vec::with_capacity(window_len) })
	}

	pub fn window_len(&self) -> usize { self.mf.window_len() }
	pub fn params(&self) -> &DetectorParams { &self.params }

	pub fn detect(&mut self, rx:&[Sc16]) -> PingResult<Scan> {
		to_float(rx, &mut self.window);
		self.mf.apply_into(&self.window, &mut self.correlation).map_err(PingErr::Config)?;

		let mut peaks:PeakList = PeakList::new(self.params.merge_window);
		let average_power = scan_peaks(&self.correlation, &mut peaks);
		Ok(Scan{ peaks, average_power })
	}

	pub fn correlation(&self) -> &[Complex<f64>] { &self.correlation }

}

// One-shot form for offline use; the receive loop keeps a Detector around instead
pub fn detect(reference:&ReferenceBurst, rx:&[Sc16]) -> PingResult<Scan> {
	Detector::new(reference, rx.len(), DetectorParams::default())?.detect(rx)
}

pub fn to_float(rx:&[Sc16], out:&mut Vec<Complex<f64>>) {
	out.clear();
	out.extend(rx.iter().map(|s| Complex{ re: s.re as f64 / RX_FULL_SCALE, im: s.im as f64 / RX_FULL_SCALE }));
}

// Single pass over the correlation: feeds every |c|^2 to the peak list and returns its mean
pub fn scan_peaks(correlation:&[Complex<f64>], peaks:&mut PeakList) -> f64 {
	peaks.clear();
	if correlation.is_empty() { return 0.0; }

	let mut pwr_sum:f64 = 0.0;
	for (idx, c) in correlation.iter().enumerate() {
		let mag = c.norm_sqr();
		pwr_sum += mag;
		peaks.offer(idx, mag);
	}

	pwr_sum / correlation.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
	pub idx: usize,
	pub mag: f64,
	pub delay_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoReport {
	pub seq: u64,
	pub timestamp_ticks: i64,
	pub average_power: f64,
	pub detections: Vec<Detection>,
}

impl EchoReport {

	pub fn from_scan(seq:u64, timestamp_ticks:i64, scan:&Scan, params:&DetectorParams, sample_rate_sps:f64) -> Self {
		let detections = scan.detections(params).into_iter()
			.filter_map(|p| p.idx.map(|idx| Detection{ idx, mag: p.mag, delay_s: idx as f64 / sample_rate_sps }))
			.collect();
		Self{ seq, timestamp_ticks, average_power: scan.average_power, detections }
	}

	pub fn strongest(&self) -> Option<&Detection> { self.detections.first() }

	pub fn summary(&self) -> String {
		if self.detections.is_empty() {
			return "no echo".to_string();
		}
		self.detections.iter()
			.map(|d| format!("{} ({:.6}, {:.3} us)", d.idx, d.mag, d.delay_s * 1e6))
			.collect::<Vec<String>>()
			.join(", ")
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::burst::lfsr::DEFAULT_SEED;
	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use rand_distr::{Distribution, Normal};

	fn embed(window:&mut [Sc16], burst:&ReferenceBurst, offset:usize, scale:f64) {
		for (dst, src) in window[offset..].iter_mut().zip(burst.fixed_point().iter()) {
			dst.re = dst.re.saturating_add((src.re as f64 * scale) as i16);
			dst.im = dst.im.saturating_add((src.im as f64 * scale) as i16);
		}
	}

	#[test]
	fn autocorrelation_peaks_at_offset() {
		let burst = ReferenceBurst::synthesize(256, 2, DEFAULT_SEED).unwrap();
		for offset in [0, 1, 37, 500] {
			let mut window:Vec<Sc16> = vec![Complex{ re: 0, im: 0 }; 1536];
			embed(&mut window, &burst, offset, 1.0);

			let scan = detect(&burst, &window).unwrap();
			assert_eq!(scan.peaks.strongest().idx, Some(offset));
		}
	}

	#[test]
	fn self_correlation_at_zero_is_not_reported() {
		let burst = ReferenceBurst::synthesize(256, 2, DEFAULT_SEED).unwrap();
		let scan = detect(&burst, burst.fixed_point()).unwrap();
		assert_eq!(scan.peaks.strongest().idx, Some(0));
		assert!(scan.detections(&DetectorParams::default()).is_empty());
	}

	#[test]
	fn round_trip_echo_found() {
		let burst = ReferenceBurst::synthesize(256, 2, DEFAULT_SEED).unwrap();
		let mut window:Vec<Sc16> = vec![Complex{ re: 0, im: 0 }; 2048];
		embed(&mut window, &burst, 120, 0.25);

		let scan = detect(&burst, &window).unwrap();
		let hits = scan.detections(&DetectorParams::default());
		assert!(!hits.is_empty());

		let idx = hits[0].idx.unwrap();
		assert!((119..=121).contains(&idx), "echo reported at {}", idx);
	}

	#[test]
	fn round_trip_echo_found_in_noise() {
		let burst = ReferenceBurst::synthesize(256, 2, DEFAULT_SEED).unwrap();
		let mut rng = StdRng::seed_from_u64(3);
		let noise = Normal::new(0.0, 200.0).unwrap();
		let mut window:Vec<Sc16> = (0..4000).map(|_| Complex{ re: noise.sample(&mut rng) as i16, im: noise.sample(&mut rng) as i16 }).collect();
		embed(&mut window, &burst, 1700, 0.25);

		let scan = detect(&burst, &window).unwrap();
		let hits = scan.detections(&DetectorParams::default());
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].idx, Some(1700));
	}

	#[test]
	fn noise_only_gives_no_detections() {
		let burst = ReferenceBurst::synthesize(256, 2, DEFAULT_SEED).unwrap();
		let mut rng = StdRng::seed_from_u64(11);
		let noise = Normal::new(0.0, 1000.0).unwrap();

		for _ in 0..5 {
			let window:Vec<Sc16> = (0..2048).map(|_| Complex{ re: noise.sample(&mut rng) as i16, im: noise.sample(&mut rng) as i16 }).collect();
			let scan = detect(&burst, &window).unwrap();
			assert!(scan.average_power > 0.0);
			assert!(scan.detections(&DetectorParams::default()).is_empty());
		}
	}

	#[test]
	fn two_echoes_ranked_by_strength() {
		let burst = ReferenceBurst::synthesize(256, 2, DEFAULT_SEED).unwrap();
		let mut window:Vec<Sc16> = vec![Complex{ re: 0, im: 0 }; 3000];
		embed(&mut window, &burst, 200, 0.1);
		embed(&mut window, &burst, 1200, 0.25);

		let scan = detect(&burst, &window).unwrap();
		let hits = scan.detections(&DetectorParams::default());
		let idxs:Vec<Option<usize>> = hits.iter().map(|p| p.idx).collect();
		assert_eq!(idxs, vec![Some(1200), Some(200)]);
	}

	#[test]
	fn average_power_of_zero_window() {
		let burst = ReferenceBurst::synthesize(64, 2, DEFAULT_SEED).unwrap();
		let window:Vec<Sc16> = vec![Complex{ re: 0, im: 0 }; 512];
		let scan = detect(&burst, &window).unwrap();
		assert_eq!(scan.average_power, 0.0);
		assert!(scan.detections(&DetectorParams::default()).is_empty());
	}

	#[test]
	fn report_converts_to_seconds() {
		let burst = ReferenceBurst::synthesize(256, 2, DEFAULT_SEED).unwrap();
		let mut window:Vec<Sc16> = vec![Complex{ re: 0, im: 0 }; 2048];
		embed(&mut window, &burst, 100, 0.25);

		let params = DetectorParams::default();
		let scan = detect(&burst, &window).unwrap();
		let report = EchoReport::from_scan(3, 1_000, &scan, &params, 2e6);

		let d = report.strongest().unwrap();
		assert_eq!(d.idx, 100);
		assert!((d.delay_s - 50e-6).abs() < 1e-12);
		assert_eq!(report.seq, 3);
	}

	#[test]
	fn float_conversion_scale() {
		let mut out = Vec::new();
		to_float(&[Complex{ re: 16384, im: -32768 }], &mut out);
		assert_eq!(out, vec![Complex{ re: 0.5, im: -1.0 }]);
	}
}
