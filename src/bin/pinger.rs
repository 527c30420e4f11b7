use std::fs::File;
use std::io::BufWriter;
use std::sync::{Arc, Mutex};

use clap::Parser;
use colored::*;
use serde::Serialize;
use tracing::{error, info, warn};

use rust_pinger::burst::ReferenceBurst;
use rust_pinger::burst::lfsr::DEFAULT_SEED;
use rust_pinger::config::Options;
use rust_pinger::detect::EchoReport;
use rust_pinger::radio::{self, EchoSimulator, Radio, ADI_FIR_TAPS};
use rust_pinger::schedule::{self, RunSummary, Schedule, TimeBase};
use rust_pinger::{io, utils, PingResult};

#[derive(Serialize)]
struct RunOutput {
	time_base: TimeBase,
	summary: RunSummary,
	reports: Vec<EchoReport>,
}

fn print_report(report:&EchoReport) {
	if report.detections.is_empty() {
		eprintln!("{}", format!("[{:>5}] no echo (avg power {:.3e})", report.seq, report.average_power).yellow());
	} else {
		eprintln!("{}", format!("[{:>5}] echo at {}", report.seq, report.summary()).green());
	}
}

async fn run(opt:&Options) -> PingResult<RunOutput> {
	let sps = opt.sps();
	let burst = ReferenceBurst::synthesize(opt.burst_len, sps, DEFAULT_SEED)?;

	if let Some(path) = &opt.dump_burst {
		let mut dst = BufWriter::new(File::create(path)?);
		let n = io::write_cfile(&mut dst, burst.samples())?;
		info!(path = %path.display(), samples = n, "wrote reference burst");
	}

	let mut radio = EchoSimulator::new(opt.echo());
	radio.configure(&opt.tune())?;
	info!(mcr = radio.master_clock_rate(), sample_rate = radio.sample_rate(), sps, "radio configured");

	// Without software pulse shaping the front end has to band-limit the burst
	if sps == 1 {
		radio::load_fir_taps(&mut radio, &ADI_FIR_TAPS)?;
	}

	let tx = radio.tx_stream()?;
	let rx = radio.rx_stream()?;
	let time_base = TimeBase::from_radio(&radio, opt.burst_period, opt.max_delay)?;

	let (stop_tx, stop) = schedule::stop_channel();
	if let Err(e) = ctrlc::set_handler(move || { stop_tx.send(true).ok(); }) {
		warn!("unable to install Ctrl-C handler: {}", e);
	}

	let reports:Arc<Mutex<Vec<EchoReport>>> = Arc::new(Mutex::new(vec![]));
	let sink = reports.clone();
	let keep_reports = opt.json;

	let schedule = Schedule{ time_base, burst: Arc::new(burst), params: opt.detector_params(), max_bursts: opt.count };
	let summary = schedule.run(tx, rx, stop, move |report| {
		print_report(&report);
		if keep_reports {
			if let Ok(mut v) = sink.lock() { v.push(report); }
		}
	}).await?;

	info!(sent = summary.tx.sent, acked = summary.tx.acked, windows = summary.rx.windows,
		with_echo = summary.rx.windows_with_echo, stalls = summary.rx.stalls, "finished");

	let reports = reports.lock().map(|mut v| std::mem::take(&mut *v)).unwrap_or_default();
	Ok(RunOutput{ time_base, summary, reports })
}

#[tokio::main]
async fn main() {
	utils::init_logging();

	let opt = Options::parse();
	opt.print();

	match run(&opt).await {
		Ok(output) => {
			if opt.json {
				match serde_json::to_string_pretty(&output) {
					Ok(s) => println!("{}", s),
					Err(e) => {
						error!("unable to serialize reports: {}", e);
						std::process::exit(1);
					},
				}
			}
		},
		Err(e) => {
			error!("{}", e);
			eprintln!("{}", format!("[!] {}", e).red());
			std::process::exit(1);
		},
	}
}
