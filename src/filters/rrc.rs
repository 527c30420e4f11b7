use num_complex::Complex;
use num_traits::Zero;

// Root-raised-cosine pulse for 2 samples per symbol
pub const RRC_TAPS:[f64; 23] = [
	 1.3706e-03,  3.7391e-03, -5.7944e-03,  1.0182e-03,  4.7706e-03,
	-1.2686e-02,  1.2766e-02,  2.8467e-02, -6.7363e-02, -4.2208e-02,
	 3.0290e-01,  5.4604e-01,  3.0290e-01, -4.2208e-02, -6.7363e-02,
	 2.8467e-02,  1.2766e-02, -1.2686e-02,  4.7706e-03,  1.0182e-03,
	-5.7944e-03,  3.7391e-03,  1.3706e-03
];

// Convolution with the group delay of an odd-length real kernel removed, so out[i] lines up with x[i]
// and the output has the same length as the input.  Samples outside x are taken as zero.
pub fn convolve_same(kernel:&[f64], x:&[Complex<f64>]) -> Result<Vec<Complex<f64>>, &'static str> {
	if kernel.len() % 2 == 0 {
		return Err("Kernel for a no-delay convolution must have odd length");
	}

	let half:usize = kernel.len() / 2;
	let n:usize = x.len();

	Ok((0..n).map(|i| {
		let mut acc:Complex<f64> = Complex::zero();
		for (j, h) in kernel.iter().enumerate() {
			// x index is i + half - j; skip anything that falls off either end
			let k = i + half;
			if k >= j && k - j < n {
				acc += x[k - j] * *h;
			}
		}
		acc
	}).collect())
}

#[test]
fn rrc_is_symmetric() {
	for i in 0..RRC_TAPS.len() {
		assert_eq!(RRC_TAPS[i], RRC_TAPS[RRC_TAPS.len() - 1 - i]);
	}
}

#[test]
fn impulse_reproduces_kernel_centered() {
	let mut x:Vec<Complex<f64>> = vec![Complex::zero(); 64];
	x[30] = Complex{ re: 1.0, im: 0.0 };

	let y = convolve_same(&RRC_TAPS, &x).unwrap();
	assert_eq!(y.len(), x.len());

	// Peak of the pulse stays on the impulse
	assert_eq!(y[30].re, RRC_TAPS[11]);
	for (j, h) in RRC_TAPS.iter().enumerate() {
		assert!((y[30 + j - 11].re - h).abs() < 1e-12);
	}
	assert_eq!(y[18].re, 0.0);
	assert_eq!(y[42].re, 0.0);
}

#[test]
fn even_kernel_rejected() {
	let x:Vec<Complex<f64>> = vec![Complex::zero(); 4];
	assert!(convolve_same(&[0.5, 0.5], &x).is_err());
}
