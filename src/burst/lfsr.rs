
// Taps at bits 15, 1 and 0
pub const POLY:u32 = (1 << 15) | (1 << 1) | (1 << 0);

pub const DEFAULT_SEED:u32 = 1;

// Bits above the highest tap never feed back, so the register is kept at 16 bits
const STATE_MASK:u32 = 0xFFFF;

#[derive(Debug, Clone)]
pub struct ShiftRegister {
	state: u32,
	poly: u32,
}

impl ShiftRegister {

	pub fn new(seed:u32) -> Self { Self::with_poly(seed, POLY) }

	pub fn with_poly(seed:u32, poly:u32) -> Self { Self{ state: seed & STATE_MASK, poly } }

	pub fn state(&self) -> u32 { self.state }

	// The output bit is the parity of the tapped bits; it is also shifted back in
	pub fn shift(&mut self) -> bool {
		let bit:u32 = (self.state & self.poly).count_ones() & 1;
		self.state = ((self.state << 1) | bit) & STATE_MASK;
		bit == 1
	}

}

impl Iterator for ShiftRegister {
	type Item = bool;

	fn next(&mut self) -> Option<bool> { Some(self.shift()) }
}

#[test]
fn known_leading_bits() {
	let bits:Vec<bool> = ShiftRegister::new(DEFAULT_SEED).take(8).collect();
	assert_eq!(bits, vec![true, false, true, true, false, true, true, false]);
}

#[test]
fn state_stays_within_sixteen_bits() {
	let mut lfsr = ShiftRegister::new(DEFAULT_SEED);
	for _ in 0..10_000 {
		lfsr.shift();
		assert!(lfsr.state() <= STATE_MASK);
	}
	assert_ne!(lfsr.state(), 0);
}

#[test]
fn sequence_is_balanced() {
	let ones = ShiftRegister::new(DEFAULT_SEED).take(10_000).filter(|b| *b).count();
	assert!((4900..=5100).contains(&ones), "{} ones", ones);
}
