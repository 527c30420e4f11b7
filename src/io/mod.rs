use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use num_complex::Complex;
use tracing::warn;

use crate::{PingResult, Sc16};

pub const BUFFER_SIZE:usize = 2048;

const SC16_BYTES:usize = 4;

// Interleaved little-endian f32 I/Q, readable by the usual SDR tooling as a .cfile
pub fn write_cfile<W: Write>(dst:&mut W, samples:&[Complex<f64>]) -> PingResult<usize> {
	for s in samples {
		dst.write_f32::<LittleEndian>(s.re as f32)?;
		dst.write_f32::<LittleEndian>(s.im as f32)?;
	}
	dst.flush()?;
	Ok(samples.len())
}

pub fn read_cfile<R: Read>(src:&mut R) -> PingResult<Vec<Complex<f32>>> {
	let mut bytes:Vec<u8> = Vec::new();
	src.read_to_end(&mut bytes)?;
	if bytes.len() % 8 != 0 {
		warn!(trailing = bytes.len() % 8, "cfile ends in a partial sample");
	}

	let mut rdr = &bytes[..bytes.len() - bytes.len() % 8];
	let mut ans:Vec<Complex<f32>> = Vec::with_capacity(rdr.len() / 8);
	while !rdr.is_empty() {
		let re = rdr.read_f32::<LittleEndian>()?;
		let im = rdr.read_f32::<LittleEndian>()?;
		ans.push(Complex{ re, im });
	}
	Ok(ans)
}

pub fn write_sc16<W: Write>(dst:&mut W, samples:&[Sc16]) -> PingResult<usize> {
	for s in samples {
		dst.write_i16::<LittleEndian>(s.re)?;
		dst.write_i16::<LittleEndian>(s.im)?;
	}
	dst.flush()?;
	Ok(samples.len())
}

// Streams sc16 samples out of a capture along with their sample index
pub struct Sc16Source<R: Read> {
	src: R,
	idx: usize,
	bytes: Vec<u8>,
	buffer: Vec<Sc16>,
	buffer_idx: usize,
}

impl<R: Read> Sc16Source<R> {

	pub fn new(src:R) -> Self {
		Self{ src, idx: 0, bytes: vec![0; BUFFER_SIZE * SC16_BYTES], buffer: Vec::with_capacity(BUFFER_SIZE), buffer_idx: 0 }
	}

	fn buffer_samples(&mut self) -> PingResult<()> {
		// Keep reading until the block is full or the source runs dry so short reads never split a sample
		let mut filled:usize = 0;
		while filled < self.bytes.len() {
			let n = self.src.read(&mut self.bytes[filled..])?;
			if n == 0 { break; }
			filled += n;
		}

		if filled % SC16_BYTES != 0 {
			warn!(trailing = filled % SC16_BYTES, "capture ends in a partial sample");
		}

		let mut iq:Vec<i16> = vec![0; filled / 2 - (filled / 2) % 2];
		LittleEndian::read_i16_into(&self.bytes[..iq.len() * 2], &mut iq);

		self.buffer.clear();
		self.buffer.extend(iq.chunks_exact(2).map(|pair| Complex{ re: pair[0], im: pair[1] }));
		self.buffer_idx = 0;
		Ok(())
	}

	// Next len samples, or None once fewer than len remain
	pub fn next_window(&mut self, len:usize) -> Option<Vec<Sc16>> {
		let window:Vec<Sc16> = self.by_ref().take(len).map(|(s, _)| s).collect();
		if window.len() == len && len > 0 { Some(window) } else { None }
	}

}

impl<R: Read> Iterator for Sc16Source<R> {
	type Item = (Sc16, usize);

	fn next(&mut self) -> Option<(Sc16, usize)> {
		if self.buffer_idx >= self.buffer.len() {
			if let Err(e) = self.buffer_samples() {
				warn!("unable to read capture: {}", e);
				return None;
			}
			if self.buffer.is_empty() { return None; }
		}

		let ans = (self.buffer[self.buffer_idx], self.idx);
		self.idx += 1;
		self.buffer_idx += 1;
		Some(ans)
	}
}
