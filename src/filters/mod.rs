
pub mod matched_filter;
pub mod rrc;

pub use matched_filter::MatchedFilter;
pub use rrc::{convolve_same, RRC_TAPS};
