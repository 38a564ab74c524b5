//! Pattern Detectors
//!
//! The three mule-pattern searches (cycles, smurfing fans, shell chains)
//! plus the shared ring merger and the merchant/payroll legitimacy
//! filter. All detectors are read-only over the transaction graph.

mod cycles;
mod legitimacy;
mod merge;
mod shells;
mod smurfing;

pub use cycles::{CycleDetector, CycleFindings};
pub use legitimacy::LegitimacyFilter;
pub use merge::merge_overlapping;
pub use shells::{ShellChainDetector, ShellFindings};
pub use smurfing::{FanDirection, FanPattern, SmurfingDetector};
