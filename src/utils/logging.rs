use tracing_subscriber::{EnvFilter, fmt};

pub const DEFAULT_LOG_LEVEL:&str = "info";

// Reports go to stdout as JSON, so diagnostics stay on stderr
pub fn init_logging() {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

	fmt()
		.with_env_filter(env_filter)
		.with_target(false)
		.with_level(true)
		.compact()
		.with_writer(std::io::stderr)
		.init();
}
