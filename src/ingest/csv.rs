//! CSV Ingest
//!
//! Normalizes arbitrary bank-export CSVs into Transaction records.
//! Headers are matched case-insensitively against synonym tables, missing
//! transaction ids are synthesized, and rows with unusable cells are
//! skipped instead of aborting the whole batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TimestampPolicy;

/// One normalized ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: f64,
    /// None only when the input has no timestamp column (degraded mode)
    pub timestamp: Option<DateTime<Utc>>,
}

/// Parse output plus the batch-level flags the pipeline needs
#[derive(Debug, Clone)]
pub struct ParsedBatch {
    pub transactions: Vec<Transaction>,
    /// Rows consumed from the reader, skipped rows included
    pub rows_processed: usize,
    /// True when a row cap was supplied and consumption reached it
    pub capped: bool,
    /// False when the input carries no timestamp column
    pub has_timestamps: bool,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing required columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("row {row}: unparseable timestamp {value:?}")]
    BadTimestamp { row: usize, value: String },

    #[error("csv read error: {0}")]
    Csv(#[from] csv::Error),
}

lazy_static! {
    static ref SENDER_SYNONYMS: HashSet<&'static str> = [
        "sender_id", "sender", "sender_account", "source", "source_account", "nameorig",
    ]
    .into_iter()
    .collect();
    static ref RECEIVER_SYNONYMS: HashSet<&'static str> = [
        "receiver_id", "receiver", "receiver_account", "destination", "destination_account",
        "namedest",
    ]
    .into_iter()
    .collect();
    static ref AMOUNT_SYNONYMS: HashSet<&'static str> =
        ["amount", "txn_amount", "transaction_amount"].into_iter().collect();
    static ref TIMESTAMP_SYNONYMS: HashSet<&'static str> =
        ["timestamp", "date", "txn_date", "datetime"].into_iter().collect();
    static ref TXN_ID_SYNONYMS: HashSet<&'static str> =
        ["transaction_id", "txn_id", "id"].into_iter().collect();
}

/// Resolved header positions for one input file
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    sender: usize,
    receiver: usize,
    amount: usize,
    timestamp: Option<usize>,
    txn_id: Option<usize>,
}

fn resolve_columns(
    headers: &csv::StringRecord,
    policy: TimestampPolicy,
) -> Result<ColumnMap, IngestError> {
    let mut sender = None;
    let mut receiver = None;
    let mut amount = None;
    let mut timestamp = None;
    let mut txn_id = None;

    for (i, raw) in headers.iter().enumerate() {
        // Strip a UTF-8 BOM if the file starts with one
        let name = raw.trim_start_matches('\u{feff}').trim().to_lowercase();
        let name = name.as_str();

        if sender.is_none() && SENDER_SYNONYMS.contains(name) {
            sender = Some(i);
        } else if receiver.is_none() && RECEIVER_SYNONYMS.contains(name) {
            receiver = Some(i);
        } else if amount.is_none() && AMOUNT_SYNONYMS.contains(name) {
            amount = Some(i);
        } else if timestamp.is_none() && TIMESTAMP_SYNONYMS.contains(name) {
            timestamp = Some(i);
        } else if txn_id.is_none() && TXN_ID_SYNONYMS.contains(name) {
            txn_id = Some(i);
        }
    }

    let mut missing = Vec::new();
    if sender.is_none() {
        missing.push("sender_id".to_string());
    }
    if receiver.is_none() {
        missing.push("receiver_id".to_string());
    }
    if amount.is_none() {
        missing.push("amount".to_string());
    }
    if timestamp.is_none() && policy == TimestampPolicy::Required {
        missing.push("timestamp".to_string());
    }
    if !missing.is_empty() {
        return Err(IngestError::MissingColumns { columns: missing });
    }

    // The fallbacks are unreachable past the missing-column check
    Ok(ColumnMap {
        sender: sender.unwrap_or(0),
        receiver: receiver.unwrap_or(0),
        amount: amount.unwrap_or(0),
        timestamp,
        txn_id,
    })
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize) -> &'r str {
    record.get(idx).map(str::trim).unwrap_or("")
}

/// Parse a timestamp cell. RFC 3339 first, then the common export formats.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    // Bare dates land at midnight
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }

    None
}

/// Read up to `limit` data rows and normalize them into transactions.
///
/// Rows with a blank account id or an uncoercible amount are skipped with a
/// debug log; an unparseable timestamp is fatal because a half-timestamped
/// batch would silently distort every windowed detector downstream.
pub fn parse_transactions<R: Read>(
    reader: R,
    limit: Option<usize>,
    policy: TimestampPolicy,
) -> Result<ParsedBatch, IngestError> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();
    let columns = resolve_columns(&headers, policy)?;

    let mut transactions = Vec::new();
    let mut rows_processed = 0usize;
    let mut skipped = 0usize;

    for record in rdr.records() {
        if let Some(cap) = limit {
            if rows_processed >= cap {
                break;
            }
        }
        let record = record?;
        rows_processed += 1;

        let sender = field(&record, columns.sender);
        let receiver = field(&record, columns.receiver);
        if sender.is_empty() || receiver.is_empty() {
            skipped += 1;
            debug!("row {}: blank sender/receiver, skipping", rows_processed);
            continue;
        }

        let raw_amount = field(&record, columns.amount);
        let amount = match raw_amount.parse::<f64>() {
            Ok(a) if a.is_finite() => a,
            _ => {
                skipped += 1;
                debug!(
                    "row {}: unparseable amount {:?}, skipping",
                    rows_processed, raw_amount
                );
                continue;
            }
        };

        let timestamp = match columns.timestamp {
            Some(idx) => {
                let raw = field(&record, idx);
                let parsed = parse_timestamp(raw).ok_or_else(|| IngestError::BadTimestamp {
                    row: rows_processed,
                    value: raw.to_string(),
                })?;
                Some(parsed)
            }
            None => None,
        };

        let id = match columns.txn_id.map(|idx| field(&record, idx)) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => format!("TXN_{:05}", rows_processed),
        };

        transactions.push(Transaction {
            id,
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            amount,
            timestamp,
        });
    }

    let capped = limit.is_some_and(|cap| rows_processed >= cap);
    if skipped > 0 {
        debug!("skipped {} unusable rows out of {}", skipped, rows_processed);
    }
    info!(
        "Parsed {} transactions from {} rows{}",
        transactions.len(),
        rows_processed,
        if capped { " (row cap hit)" } else { "" }
    );

    Ok(ParsedBatch {
        transactions,
        rows_processed,
        capped,
        has_timestamps: columns.timestamp.is_some(),
    })
}
