//! Report Types
//!
//! The JSON surface returned by both the CLI and the HTTP service.
//! Field names are part of the wire contract consumed by the dashboard,
//! so they stay snake_case and stable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pattern family a fraud ring was detected under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Cycle,
    FanIn,
    FanOut,
    LayeredShell,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternType::Cycle => "cycle",
            PatternType::FanIn => "fan_in",
            PatternType::FanOut => "fan_out",
            PatternType::LayeredShell => "layered_shell",
        };
        write!(f, "{}", s)
    }
}

/// One (account, ring) membership row. An account that belongs to three
/// rings produces three rows, all carrying the same final score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousAccount {
    pub account_id: String,
    /// Final score after bonuses, penalties and the 100-point clamp
    pub suspicion_score: f64,
    /// Sorted pattern tags, exception tag excluded
    pub detected_patterns: Vec<String>,
    pub ring_id: String,
}

/// A merged group of accounts flagged under one pattern family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudRing {
    /// Sequential id: RING_001, RING_002, ...
    pub ring_id: String,
    /// Sorted unique member account ids
    pub member_accounts: Vec<String>,
    pub pattern_type: PatternType,
    /// Mean of member final scores, one decimal
    pub risk_score: f64,
    pub transaction_count: usize,
}

/// Run-level counters and the partial/full marker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_accounts_analyzed: usize,
    pub suspicious_accounts_flagged: usize,
    pub fraud_rings_detected: usize,
    pub processing_time_seconds: f64,
    pub rows_processed: usize,
    /// True when the row cap was hit or a detector gave up early
    pub is_partial: bool,
}

/// Node payload for the dashboard graph view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub suspicious: bool,
    pub score: f64,
    pub ring_ids: Vec<String>,
    pub in_degree: usize,
    pub out_degree: usize,
}

/// Aggregated edge payload: one entry per ordered (source, target) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub total_amount: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Full analysis result for one input batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub suspicious_accounts: Vec<SuspiciousAccount>,
    pub fraud_rings: Vec<FraudRing>,
    pub summary: AnalysisSummary,
    pub graph: GraphView,
}

/// Sequential ring id in the RING_%03d format the dashboard expects
pub fn ring_id(n: usize) -> String {
    format!("RING_{:03}", n)
}

/// Round to one decimal place (scores, risk)
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Round to two decimal places (amounts, elapsed seconds)
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_id_format() {
        assert_eq!(ring_id(1), "RING_001");
        assert_eq!(ring_id(42), "RING_042");
        assert_eq!(ring_id(120), "RING_120");
    }

    #[test]
    fn test_pattern_type_serializes_snake_case() {
        let json = serde_json::to_string(&PatternType::LayeredShell).unwrap();
        assert_eq!(json, "\"layered_shell\"");
        let json = serde_json::to_string(&PatternType::FanOut).unwrap();
        assert_eq!(json, "\"fan_out\"");
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round1(55.55), 55.6);
        assert_eq!(round1(40.0), 40.0);
        assert_eq!(round2(1234.5678), 1234.57);
    }
}
