use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use tracing::{error, info};

use rust_pinger::burst::ReferenceBurst;
use rust_pinger::burst::lfsr::DEFAULT_SEED;
use rust_pinger::detect::{Detector, DetectorParams, EchoReport};
use rust_pinger::io::Sc16Source;
use rust_pinger::{utils, PingResult};

/// Runs echo detection over an sc16 capture, one fixed-length window at a time
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
	#[arg(short, long)]
	filename: PathBuf,
	#[arg(short, long, default_value_t = 2e6)]
	samplerate: f64,
	#[arg(long, default_value_t = 256)]
	burst_len: usize,
	#[arg(long, default_value_t = 2)]
	sps: usize,
	/// Samples per window
	#[arg(short, long, default_value_t = 10_000)]
	window: usize,
	#[arg(long, default_value_t = DEFAULT_SEED)]
	seed: u32,
}

fn run(cli:&Cli) -> PingResult<Vec<EchoReport>> {
	let burst = ReferenceBurst::synthesize(cli.burst_len, cli.sps, cli.seed)?;
	let params = DetectorParams::default();
	let mut detector = Detector::new(&burst, cli.window, params)?;

	let mut src = Sc16Source::new(BufReader::new(File::open(&cli.filename)?));
	let mut reports:Vec<EchoReport> = vec![];
	let mut seq:u64 = 0;
	while let Some(window) = src.next_window(cli.window) {
		let scan = detector.detect(&window)?;
		// Offline there is no device clock, so the window's first sample index stands in for it
		let first_sample = (seq as usize * cli.window) as i64;
		let report = EchoReport::from_scan(seq, first_sample, &scan, &params, cli.samplerate);

		if report.detections.is_empty() {
			eprintln!("{}", format!("[{:>5}] no echo", report.seq).yellow());
		} else {
			eprintln!("{}", format!("[{:>5}] echo at {}", report.seq, report.summary()).green());
		}
		reports.push(report);
		seq += 1;
	}

	info!(windows = reports.len(), "capture processed");
	Ok(reports)
}

fn main() {
	utils::init_logging();
	let cli = Cli::parse();

	let reports = match run(&cli) {
		Ok(r) => r,
		Err(e) => {
			error!("{}", e);
			std::process::exit(1);
		},
	};

	match serde_json::to_string_pretty(&reports) {
		Ok(s) => println!("{}", s),
		Err(e) => {
			error!("unable to serialize reports: {}", e);
			std::process::exit(1);
		},
	}
}
