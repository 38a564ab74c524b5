//! Ingest Layer
//!
//! CSV normalization and transaction-graph construction. Everything
//! downstream consumes the `TxnGraph` built here.

mod csv;
mod graph;

pub use csv::{parse_transactions, IngestError, ParsedBatch, Transaction};
pub use graph::{EdgeData, EdgeTxn, TxnGraph};
