//! MuleWatch - Money Mule Detection Engine
//!
//! Graph analysis over transaction CSVs: cycle rings, fan-in/fan-out
//! smurfing, layered shell chains, a merchant/payroll legitimacy filter,
//! and the scoring pass that turns findings into a dashboard report.
//! The `server` module exposes the whole thing over HTTP with a fast
//! capped first pass and a background full run.

pub mod config;
pub mod detect;
pub mod ingest;
pub mod jobs;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod server;
