use std::sync::Arc;

use num_complex::Complex;
use num_traits::Zero;
use rustfft::{Fft, FftPlanner};

// Cross-correlates fixed-length windows against a known waveform at every lag.  The response at lag k
// is sum_j x[k+j] * conj(w[j]) / sum_j |w[j]|^2, with the window taken as zero beyond its end, so an
// unattenuated copy of the waveform starting at k gives exactly 1.0 there.
pub struct MatchedFilter {
	window_len: usize,
	n_fft: usize,
	fwd: Arc<dyn Fft<f64>>,
	inv: Arc<dyn Fft<f64>>,
	waveform_freq_domain_conj: Vec<Complex<f64>>,
	filter_power: f64,
	buffer: Vec<Complex<f64>>,
	scratch: Vec<Complex<f64>>,
}

impl MatchedFilter {

	pub fn new(waveform_time_domain:&[Complex<f64>], window_len:usize) -> Result<Self, &'static str> {
		if waveform_time_domain.is_empty() || window_len == 0 {
			return Err("Matched filter needs a non-empty waveform and window");
		}

		let filter_power:f64 = waveform_time_domain.iter().map(|x| x.norm_sqr()).sum();
		if filter_power <= 0.0 {
			return Err("Matched filter waveform has no energy");
		}

		// Long enough that the circular correlation never wraps onto a valid lag
		let n_fft:usize = (window_len + waveform_time_domain.len() - 1).next_power_of_two();

		let mut planner = FftPlanner::new();
		let fwd = planner.plan_fft_forward(n_fft);
		let inv = planner.plan_fft_inverse(n_fft);

		let mut waveform_freq_domain:Vec<Complex<f64>> = waveform_time_domain.to_vec();
		waveform_freq_domain.resize(n_fft, Complex::zero());
		fwd.process(&mut waveform_freq_domain);
		let waveform_freq_domain_conj = waveform_freq_domain.into_iter().map(|x| x.conj()).collect();

		let scratch_len = fwd.get_inplace_scratch_len().max(inv.get_inplace_scratch_len());

		Ok(MatchedFilter { window_len, n_fft, fwd, inv, waveform_freq_domain_conj, filter_power,
			buffer: Vec::with_capacity(n_fft), scratch: vec![Complex::zero(); scratch_len] })
	}

	pub fn window_len(&self) -> usize { self.window_len }

	pub fn filter_power(&self) -> f64 { self.filter_power }

	pub fn apply(&mut self, signal_time_domain:&[Complex<f64>]) -> Result<Vec<Complex<f64>>, &'static str> {
		let mut out:Vec<Complex<f64>> = Vec::with_capacity(self.window_len);
		self.apply_into(signal_time_domain, &mut out)?;
		Ok(out)
	}

	// Same as apply, but reuses the caller's output allocation
	pub fn apply_into(&mut self, signal_time_domain:&[Complex<f64>], out:&mut Vec<Complex<f64>>) -> Result<(), &'static str> {
		if signal_time_domain.len() != self.window_len {
			return Err("Wrong-sized input for matched filter");
		}

		self.buffer.clear();
		self.buffer.extend_from_slice(signal_time_domain);
		self.buffer.resize(self.n_fft, Complex::zero());

		self.fwd.process_with_scratch(&mut self.buffer, &mut self.scratch);
		for (x, w) in self.buffer.iter_mut().zip(self.waveform_freq_domain_conj.iter()) {
			*x *= *w;
		}
		self.inv.process_with_scratch(&mut self.buffer, &mut self.scratch);

		// rustfft leaves the inverse unnormalized
		let scale:f64 = 1.0 / (self.n_fft as f64 * self.filter_power);

		out.clear();
		out.extend(self.buffer[..self.window_len].iter().map(|c| *c * scale));
		Ok(())
	}

}

#[cfg(test)]
fn correlate_direct(waveform:&[Complex<f64>], signal:&[Complex<f64>]) -> Vec<Complex<f64>> {
	let power:f64 = waveform.iter().map(|x| x.norm_sqr()).sum();
	(0..signal.len()).map(|k| {
		let mut acc:Complex<f64> = Complex::zero();
		for (j, w) in waveform.iter().enumerate() {
			if k + j < signal.len() {
				acc += signal[k + j] * w.conj();
			}
		}
		acc / power
	}).collect()
}

#[test]
fn matches_direct_correlation() {
	use rand::{Rng, SeedableRng};
	use rand::rngs::StdRng;

	let mut rng = StdRng::seed_from_u64(7);
	let waveform:Vec<Complex<f64>> = (0..37).map(|_| Complex{ re: rng.gen_range(-1.0..1.0), im: rng.gen_range(-1.0..1.0) }).collect();
	let signal:Vec<Complex<f64>> = (0..300).map(|_| Complex{ re: rng.gen_range(-1.0..1.0), im: rng.gen_range(-1.0..1.0) }).collect();

	let mut mf = MatchedFilter::new(&waveform, signal.len()).unwrap();
	let fast = mf.apply(&signal).unwrap();
	let slow = correlate_direct(&waveform, &signal);

	assert_eq!(fast.len(), signal.len());
	for (a, b) in fast.iter().zip(slow.iter()) {
		assert!((a - b).norm() < 1e-9);
	}
}

#[test]
fn unit_response_on_exact_copy() {
	let waveform:Vec<Complex<f64>> = (0..16).map(|i| Complex{ re: (i as f64 * 0.7).cos(), im: (i as f64 * 1.3).sin() }).collect();
	let mut signal:Vec<Complex<f64>> = vec![Complex::zero(); 128];
	signal[40..56].copy_from_slice(&waveform);

	let mut mf = MatchedFilter::new(&waveform, signal.len()).unwrap();
	let response = mf.apply(&signal).unwrap();

	assert!((response[40] - Complex{ re: 1.0, im: 0.0 }).norm() < 1e-9);
}

#[test]
fn rejects_wrong_window() {
	let waveform:Vec<Complex<f64>> = vec![Complex{ re: 1.0, im: 0.0 }; 8];
	let mut mf = MatchedFilter::new(&waveform, 64).unwrap();
	assert!(mf.apply(&vec![Complex::zero(); 63]).is_err());
	assert!(MatchedFilter::new(&[Complex::zero(); 4], 64).is_err());
}
