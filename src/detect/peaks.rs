use serde::{Deserialize, Serialize};

pub const PEAK_CAPACITY:usize = 10;
pub const DEFAULT_MERGE_WINDOW:usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
	pub idx: Option<usize>,
	pub mag: f64,
}

impl Peak {

	pub const EMPTY:Peak = Peak{ idx: None, mag: 0.0 };

	pub fn is_valid(&self) -> bool { self.idx.is_some() }

}

// Top-N correlation peaks, strongest first.  Slots that were never filled keep Peak::EMPTY.
#[derive(Debug, Clone)]
pub struct PeakList<const N:usize = PEAK_CAPACITY> {
	peaks: [Peak; N],
	last_slot: Option<usize>,
	merge_window: usize,
}

impl<const N:usize> PeakList<N> {

	pub fn new(merge_window:usize) -> Self {
		Self{ peaks: [Peak::EMPTY; N], last_slot: None, merge_window }
	}

	pub fn clear(&mut self) {
		self.peaks = [Peak::EMPTY; N];
		self.last_slot = None;
	}

	pub fn capacity(&self) -> usize { N }
	pub fn merge_window(&self) -> usize { self.merge_window }

	pub fn peaks(&self) -> &[Peak] { &self.peaks }
	pub fn iter(&self) -> impl Iterator<Item = &Peak> { self.peaks.iter() }

	pub fn strongest(&self) -> Peak { self.peaks.first().copied().unwrap_or(Peak::EMPTY) }

	// Magnitude a new sample has to reach to be considered at all
	pub fn floor(&self) -> f64 { self.peaks.last().map(|p| p.mag).unwrap_or(f64::INFINITY) }

	// Offer one correlation sample.  Samples must arrive in increasing index order.
	pub fn offer(&mut self, idx:usize, mag:f64) {
		if N == 0 || mag < self.floor() { return; }

		let start_slot:usize = match self.merging_slot(idx) {
			// Same echo as the last insertion: keep whichever sample is stronger
			Some(slot) => {
				if mag < self.peaks[slot].mag { return; }
				slot
			},
			None => N - 1,
		};

		self.last_slot = Some(self.insert_from(start_slot, Peak{ idx: Some(idx), mag }));
	}

	// Slot of the most recent insertion if idx is close enough to count as the same feature
	fn merging_slot(&self, idx:usize) -> Option<usize> {
		let slot = self.last_slot?;
		match self.peaks[slot].idx {
			Some(last_idx) if idx.saturating_sub(last_idx) < self.merge_window => Some(slot),
			_ => None,
		}
	}

	// Shifts weaker entries right starting from start_slot, overwriting whatever occupied start_slot,
	// and returns where the new peak landed
	fn insert_from(&mut self, start_slot:usize, peak:Peak) -> usize {
		let mut slot = start_slot;
		while slot > 0 && peak.mag >= self.peaks[slot - 1].mag {
			self.peaks[slot] = self.peaks[slot - 1];
			slot -= 1;
		}
		self.peaks[slot] = peak;
		slot
	}

	// Peaks standing clear of both the noise floor and the dominant echo.  Index 0 is the window edge and
	// never a genuine arrival.  The list is sorted, so the first failure ends the walk.
	pub fn detections(&self, average_power:f64, noise_factor:f64, dominant_divisor:f64) -> Vec<Peak> {
		let strongest:f64 = self.strongest().mag;
		self.peaks.iter()
			.take_while(|p| {
				p.mag > average_power * noise_factor &&
				p.mag > strongest / dominant_divisor &&
				matches!(p.idx, Some(idx) if idx > 0)
			})
			.copied()
			.collect()
	}

}

impl<const N:usize> Default for PeakList<N> {
	fn default() -> Self { Self::new(DEFAULT_MERGE_WINDOW) }
}
