pub mod logging;

pub use self::logging::init_logging;
