use num_complex::Complex;
use num_traits::Zero;
use tracing::debug;

use crate::filters::rrc::{self, RRC_TAPS};
use crate::{PingErr, PingResult, Sc16};

pub mod lfsr;

use self::lfsr::ShiftRegister;

// Full scale for the transmitted burst; leaves headroom below i16::MAX for the RRC overshoot
pub const FIXED_POINT_SCALE:f64 = 4096.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceBurst {
	burst_len: usize,
	sps: usize,
	seed: u32,
	samples: Vec<Complex<f64>>,
	fixed_point: Vec<Sc16>,
}

impl ReferenceBurst {

	pub fn synthesize(burst_len:usize, sps:usize, seed:u32) -> PingResult<Self> {
		if burst_len == 0 { return Err(PingErr::Config("burst length must be positive")); }
		if sps == 0 { return Err(PingErr::Config("samples per symbol must be positive")); }

		let n:usize = burst_len.checked_mul(sps).ok_or(PingErr::Allocation(usize::MAX))?;

		// Zero-stuffed QPSK symbols, one every sps samples
		let mut samples:Vec<Complex<f64>> = Vec::new();
		samples.try_reserve_exact(n).map_err(|_| PingErr::Allocation(n))?;
		samples.resize(n, Complex::zero());

		let mut shift_reg = ShiftRegister::new(seed);
		for idx in 0..burst_len {
			let re = bit_to_level(shift_reg.shift());
			let im = bit_to_level(shift_reg.shift());
			samples[idx * sps] = Complex{ re, im };
		}

		if sps > 1 {
			samples = rrc::convolve_same(&RRC_TAPS, &samples).map_err(PingErr::Config)?;
		}

		let mut fixed_point:Vec<Sc16> = Vec::new();
		fixed_point.try_reserve_exact(n).map_err(|_| PingErr::Allocation(n))?;
		fixed_point.extend(samples.iter().map(quantize));

		debug!(burst_len, sps, seed, samples = n, "reference burst synthesized");

		Ok(Self{ burst_len, sps, seed, samples, fixed_point })
	}

	pub fn samples(&self) -> &[Complex<f64>] { &self.samples }
	pub fn fixed_point(&self) -> &[Sc16] { &self.fixed_point }

	pub fn len(&self) -> usize { self.samples.len() }
	pub fn is_empty(&self) -> bool { self.samples.is_empty() }

	pub fn burst_len(&self) -> usize { self.burst_len }
	pub fn sps(&self) -> usize { self.sps }
	pub fn seed(&self) -> u32 { self.seed }

	pub fn energy(&self) -> f64 { self.samples.iter().map(|c| c.norm_sqr()).sum() }

}

// 0 -> +1, 1 -> -1
fn bit_to_level(bit:bool) -> f64 { if bit { -1.0 } else { 1.0 } }

// Truncates toward zero; `as` saturates anything outside the i16 range
pub fn quantize(x:&Complex<f64>) -> Sc16 {
	Complex{ re: (FIXED_POINT_SCALE * x.re) as i16, im: (FIXED_POINT_SCALE * x.im) as i16 }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn synthesis_is_deterministic() {
		let a = ReferenceBurst::synthesize(256, 2, lfsr::DEFAULT_SEED).unwrap();
		let b = ReferenceBurst::synthesize(256, 2, lfsr::DEFAULT_SEED).unwrap();
		assert_eq!(a, b);

		let c = ReferenceBurst::synthesize(256, 2, 0x1234).unwrap();
		assert_ne!(a.fixed_point(), c.fixed_point());
	}

	#[test]
	fn leading_symbols_follow_the_register() {
		// Register bits start 1,0, 1,1, 0,1
		let burst = ReferenceBurst::synthesize(3, 1, lfsr::DEFAULT_SEED).unwrap();
		assert_eq!(burst.samples(), &[
			Complex{ re: -1.0, im:  1.0 },
			Complex{ re: -1.0, im: -1.0 },
			Complex{ re:  1.0, im: -1.0 },
		]);
		assert_eq!(burst.fixed_point()[0], Complex{ re: -4096, im: 4096 });
	}

	#[test]
	fn length_scales_with_sps() {
		let burst = ReferenceBurst::synthesize(256, 2, lfsr::DEFAULT_SEED).unwrap();
		assert_eq!(burst.len(), 512);
		assert_eq!(burst.fixed_point().len(), 512);
		assert_eq!(burst.burst_len(), 256);
	}

	#[test]
	fn fixed_point_mirrors_float() {
		let burst = ReferenceBurst::synthesize(128, 2, lfsr::DEFAULT_SEED).unwrap();
		for (f, q) in burst.samples().iter().zip(burst.fixed_point().iter()) {
			assert_eq!(quantize(f), *q);
			assert!((f.re * FIXED_POINT_SCALE - q.re as f64).abs() < 1.0);
			assert!((f.im * FIXED_POINT_SCALE - q.im as f64).abs() < 1.0);
		}
	}

	#[test]
	fn quantization_truncates_toward_zero() {
		assert_eq!(quantize(&Complex{ re: 0.5, im: -0.5 }), Complex{ re: 2048, im: -2048 });
		assert_eq!(quantize(&Complex{ re: 0.00026, im: -0.00026 }), Complex{ re: 1, im: -1 });
		assert_eq!(quantize(&Complex{ re: 100.0, im: -100.0 }), Complex{ re: i16::MAX, im: i16::MIN });
	}

	#[test]
	fn shaped_burst_is_band_limited() {
		// Zero-stuffing without the RRC would leave every odd sample at zero
		let burst = ReferenceBurst::synthesize(64, 2, lfsr::DEFAULT_SEED).unwrap();
		let odd_energy:f64 = burst.samples().iter().skip(1).step_by(2).map(|c| c.norm_sqr()).sum();
		assert!(odd_energy > 0.0);
	}

	#[test]
	fn zero_sizes_rejected() {
		assert!(ReferenceBurst::synthesize(0, 2, 1).is_err());
		assert!(ReferenceBurst::synthesize(16, 0, 1).is_err());
	}
}
