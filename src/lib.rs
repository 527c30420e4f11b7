
use num_complex::Complex;

pub mod burst;
pub mod config;
pub mod detect;
pub mod filters;
pub mod io;
pub mod radio;
pub mod schedule;

pub mod utils;

// Interleaved 16-bit I/Q, the wire format of both streams
pub type Sc16 = Complex<i16>;

#[derive(Debug, thiserror::Error)]
pub enum PingErr {
	#[error("unable to allocate {0} samples")]
	Allocation(usize),

	#[error("device error: {0}")]
	Device(String),

	#[error("invalid configuration: {0}")]
	Config(&'static str),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("task failed: {0}")]
	Task(String),
}

pub type PingResult<T> = Result<T, PingErr>;
