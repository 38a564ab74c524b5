//! Analysis Pipeline
//!
//! Wires ingest, the three detectors, the legitimacy filter, and scoring
//! into one pass that ends in an `AnalysisReport`. Both the CLI and the
//! HTTP service call through here so a capped partial run and a full
//! background run produce reports of identical shape.

use std::collections::HashSet;
use std::io::Read;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::Config;
use crate::detect::{
    CycleDetector, LegitimacyFilter, ShellChainDetector, ShellFindings, SmurfingDetector,
};
use crate::ingest::{parse_transactions, IngestError, ParsedBatch, Transaction, TxnGraph};
use crate::report::{round2, AnalysisReport, AnalysisSummary};
use crate::scoring::{graph_view, score_findings, suspicious_rows};

/// Parse a CSV stream and run the full detection pass over it.
///
/// `limit` caps the rows consumed; reaching the cap marks the report
/// partial. Timing starts before the parse so `processing_time_seconds`
/// covers ingest as well as detection.
pub fn analyze_csv<R: Read>(
    reader: R,
    limit: Option<usize>,
    config: &Config,
) -> Result<AnalysisReport, IngestError> {
    let started = Instant::now();
    let batch = parse_transactions(reader, limit, config.timestamp_policy)?;
    Ok(run_pipeline(&batch, config, started))
}

/// Run the detection pass over an already-parsed transaction sequence.
///
/// `limit` truncates the sequence the same way the CSV cap truncates
/// rows, so a capped run over parsed data marks its report partial too.
pub fn analyze_transactions(
    transactions: &[Transaction],
    limit: Option<usize>,
    config: &Config,
) -> AnalysisReport {
    let started = Instant::now();
    let considered = match limit {
        Some(cap) => &transactions[..transactions.len().min(cap)],
        None => transactions,
    };
    let batch = ParsedBatch {
        transactions: considered.to_vec(),
        rows_processed: considered.len(),
        capped: limit.map_or(false, |cap| transactions.len() >= cap),
        has_timestamps: considered.iter().all(|t| t.timestamp.is_some()),
    };
    run_pipeline(&batch, config, started)
}

fn run_pipeline(batch: &ParsedBatch, config: &Config, started: Instant) -> AnalysisReport {
    info!(
        "🔍 Analyzing {} transactions ({} rows read)",
        batch.transactions.len(),
        batch.rows_processed
    );

    let graph = TxnGraph::from_transactions(&batch.transactions);

    let cycles = CycleDetector::from_config(config).detect(&graph);

    // The windowed detectors are meaningless without timestamps, so a
    // timestamp-less batch degrades to cycle-only coverage.
    let (fans, shells) = if batch.has_timestamps {
        let fans = SmurfingDetector::from_config(config).detect(&graph);
        let cycle_members: HashSet<String> = cycles
            .rings
            .iter()
            .flat_map(|ring| ring.iter().cloned())
            .collect();
        let shells = ShellChainDetector::from_config(config).detect(&graph, &cycle_members);
        (fans, shells)
    } else {
        warn!("⚠️  No timestamp column - smurfing and shell chain detection skipped");
        (Vec::new(), ShellFindings::empty())
    };

    let legitimate = LegitimacyFilter::from_config(config).identify(&graph);

    let board = score_findings(&graph, &cycles.rings, &fans, &shells.rings, &legitimate);
    let suspicious_accounts = suspicious_rows(&board);
    let view = graph_view(&graph, &board);

    let flagged: HashSet<&str> = suspicious_accounts
        .iter()
        .map(|row| row.account_id.as_str())
        .collect();
    let is_partial = batch.capped || !cycles.complete || !shells.complete;
    let elapsed = round2(started.elapsed().as_secs_f64());

    info!(
        "✓ Analysis finished in {:.2}s: {} rings, {} flagged accounts{}",
        elapsed,
        board.rings.len(),
        flagged.len(),
        if is_partial { " (partial)" } else { "" }
    );

    AnalysisReport {
        summary: AnalysisSummary {
            total_accounts_analyzed: graph.node_count(),
            suspicious_accounts_flagged: flagged.len(),
            fraud_rings_detected: board.rings.len(),
            processing_time_seconds: elapsed,
            rows_processed: batch.rows_processed,
            is_partial,
        },
        suspicious_accounts,
        fraud_rings: board.rings,
        graph: view,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn csv_of(rows: &[(&str, &str, f64, &str)]) -> String {
        let mut out = String::from("sender_id,receiver_id,amount,timestamp\n");
        for (s, r, a, t) in rows {
            out.push_str(&format!("{},{},{},{}\n", s, r, a, t));
        }
        out
    }

    #[test]
    fn test_cycle_end_to_end() {
        let csv = csv_of(&[
            ("A", "B", 500.0, "2024-01-01 10:00:00"),
            ("B", "C", 480.0, "2024-01-01 11:00:00"),
            ("C", "A", 460.0, "2024-01-01 12:00:00"),
        ]);
        let config = Config::default();
        let report = analyze_csv(Cursor::new(csv), None, &config).unwrap();

        assert_eq!(report.summary.total_accounts_analyzed, 3);
        assert_eq!(report.summary.fraud_rings_detected, 1);
        assert_eq!(report.summary.suspicious_accounts_flagged, 3);
        assert_eq!(report.summary.rows_processed, 3);
        assert!(!report.summary.is_partial);

        let ring = &report.fraud_rings[0];
        assert_eq!(ring.ring_id, "RING_001");
        assert_eq!(ring.member_accounts, vec!["A", "B", "C"]);
        // 40 base + 15 fast bonus for a same-day loop
        assert_eq!(ring.risk_score, 55.0);

        for row in &report.suspicious_accounts {
            assert!(row.suspicion_score >= 40.0);
            assert!(row.detected_patterns.contains(&"cycle_length_3".to_string()));
        }
    }

    #[test]
    fn test_fan_out_end_to_end() {
        let receivers: Vec<String> = (0..10).map(|i| format!("R{:02}", i)).collect();
        let rows: Vec<(&str, &str, f64, &str)> = receivers
            .iter()
            .map(|r| ("HUB", r.as_str(), 900.0, "2024-03-05 09:00:00"))
            .collect();
        let csv = csv_of(&rows);
        let config = Config::default();
        let report = analyze_csv(Cursor::new(csv), None, &config).unwrap();

        assert_eq!(report.summary.fraud_rings_detected, 1);
        let ring = &report.fraud_rings[0];
        assert_eq!(ring.pattern_type.to_string(), "fan_out");
        assert_eq!(ring.member_accounts.len(), 11);
        assert_eq!(ring.transaction_count, 10);

        let hub_row = report
            .suspicious_accounts
            .iter()
            .find(|r| r.account_id == "HUB")
            .unwrap();
        assert_eq!(hub_row.suspicion_score, 30.0);
    }

    #[test]
    fn test_row_cap_marks_partial() {
        let csv = csv_of(&[
            ("A", "B", 500.0, "2024-01-01 10:00:00"),
            ("B", "C", 480.0, "2024-01-01 11:00:00"),
            ("C", "A", 460.0, "2024-01-01 12:00:00"),
            ("X", "Y", 10.0, "2024-01-02 10:00:00"),
        ]);
        let config = Config::default();
        let report = analyze_csv(Cursor::new(csv), Some(3), &config).unwrap();

        assert!(report.summary.is_partial);
        assert_eq!(report.summary.rows_processed, 3);
        // The cycle fits inside the cap, so it still surfaces
        assert_eq!(report.summary.fraud_rings_detected, 1);
    }

    #[test]
    fn test_degraded_mode_without_timestamps() {
        let csv = "sender_id,receiver_id,amount\nA,B,500\nB,C,480\nC,A,460\n";
        let mut config = Config::default();
        config.timestamp_policy = crate::config::TimestampPolicy::Optional;

        let report = analyze_csv(Cursor::new(csv), None, &config).unwrap();

        // Cycles still fire, but with no velocity bonus
        assert_eq!(report.summary.fraud_rings_detected, 1);
        assert_eq!(report.fraud_rings[0].risk_score, 40.0);
        assert!(report
            .suspicious_accounts
            .iter()
            .all(|r| !r.detected_patterns.contains(&"high_velocity".to_string())));
    }

    #[test]
    fn test_parsed_sequence_entry_applies_the_cap() {
        use chrono::TimeZone;
        let base = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let txn = |i: usize, s: &str, r: &str| Transaction {
            id: format!("TXN_{:05}", i),
            sender_id: s.to_string(),
            receiver_id: r.to_string(),
            amount: 500.0,
            timestamp: Some(base + chrono::Duration::hours(i as i64)),
        };
        let all = vec![
            txn(1, "A", "B"),
            txn(2, "B", "C"),
            txn(3, "C", "A"),
            txn(4, "X", "Y"),
        ];
        let config = Config::default();

        let capped = analyze_transactions(&all, Some(3), &config);
        assert!(capped.summary.is_partial);
        assert_eq!(capped.summary.rows_processed, 3);
        assert_eq!(capped.summary.fraud_rings_detected, 1);

        let full = analyze_transactions(&all, None, &config);
        assert!(!full.summary.is_partial);
        assert_eq!(full.summary.rows_processed, 4);
    }

    #[test]
    fn test_reports_are_deterministic() {
        let csv = csv_of(&[
            ("A", "B", 500.0, "2024-01-01 10:00:00"),
            ("B", "C", 480.0, "2024-01-01 11:00:00"),
            ("C", "A", 460.0, "2024-01-01 12:00:00"),
            ("C", "D", 450.0, "2024-01-01 13:00:00"),
            ("D", "E", 440.0, "2024-01-01 14:00:00"),
            ("E", "C", 430.0, "2024-01-01 15:00:00"),
        ]);
        let config = Config::default();
        let a = analyze_csv(Cursor::new(csv.clone()), None, &config).unwrap();
        let b = analyze_csv(Cursor::new(csv), None, &config).unwrap();

        assert_eq!(
            serde_json::to_value(&a.suspicious_accounts).unwrap(),
            serde_json::to_value(&b.suspicious_accounts).unwrap()
        );
        assert_eq!(
            serde_json::to_value(&a.fraud_rings).unwrap(),
            serde_json::to_value(&b.fraud_rings).unwrap()
        );
    }
}
