//! Scoring
//!
//! Turns detector findings into rings, per-account scores and the final
//! report rows. Scores accumulate additively across every ring an account
//! belongs to and the merchant/payroll penalty lands once per account.
//! Ring risk is the mean of member *final* scores, so it is settled in a
//! second pass after every account is done moving.

use chrono::{DateTime, Utc};
use petgraph::visit::EdgeRef;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

use crate::detect::{FanDirection, FanPattern};
use crate::ingest::TxnGraph;
use crate::report::{
    ring_id, round1, round2, FraudRing, GraphEdge, GraphNode, GraphView, PatternType,
    SuspiciousAccount,
};

// Base points per pattern family
const CYCLE_BASE: f64 = 40.0;
const SMURF_BASE: f64 = 30.0;
const SHELL_BASE: f64 = 25.0;

// Velocity bonuses for tightly timed rings
const CYCLE_FAST_BONUS: f64 = 15.0;
const CYCLE_SLOW_BONUS: f64 = 5.0;
const SHELL_FAST_BONUS: f64 = 10.0;

const FAST_HOURS: f64 = 24.0;
const SLOW_HOURS: f64 = 72.0;

/// Merchant/payroll penalty, applied once per account, floored at zero
const LEGITIMACY_PENALTY: f64 = 50.0;
const SCORE_CAP: f64 = 100.0;

/// Exception marker kept on the account record but excluded from the
/// pattern list of output rows
pub const EXCEPTION_TAG: &str = "merchant_or_payroll_exception";

/// Mutable per-account accumulator
#[derive(Debug, Default, Clone)]
pub struct AccountScore {
    pub score: f64,
    pub patterns: BTreeSet<String>,
    pub ring_ids: BTreeSet<String>,
}

/// Everything scoring produced, consumed by the report builders
#[derive(Debug, Default, Clone)]
pub struct ScoreBoard {
    pub rings: Vec<FraudRing>,
    pub accounts: BTreeMap<String, AccountScore>,
}

/// Score all findings in a fixed phase order (cycles, then fan patterns,
/// then shells) so ring ids come out stable for identical input.
pub fn score_findings(
    graph: &TxnGraph,
    cycle_rings: &[Vec<String>],
    fan_patterns: &[FanPattern],
    shell_rings: &[Vec<String>],
    legitimate: &HashSet<String>,
) -> ScoreBoard {
    let mut board = ScoreBoard::default();
    let mut ring_seq = 0usize;

    for members in cycle_rings {
        ring_seq += 1;
        let rid = ring_id(ring_seq);
        let timestamps = graph.timestamps_among(members);
        let span = span_hours(&timestamps);
        let bonus = if span < FAST_HOURS {
            CYCLE_FAST_BONUS
        } else if span < SLOW_HOURS {
            CYCLE_SLOW_BONUS
        } else {
            0.0
        };

        for account in members {
            let entry = board.accounts.entry(account.clone()).or_default();
            entry.score += CYCLE_BASE + bonus;
            entry.patterns.insert(format!("cycle_length_{}", members.len()));
            if bonus > 0.0 {
                entry.patterns.insert("high_velocity".to_string());
            }
            entry.ring_ids.insert(rid.clone());
        }

        board.rings.push(FraudRing {
            ring_id: rid,
            member_accounts: members.clone(),
            pattern_type: PatternType::Cycle,
            risk_score: (CYCLE_BASE + bonus).min(SCORE_CAP),
            transaction_count: timestamps.len(),
        });
    }

    for pattern in fan_patterns {
        ring_seq += 1;
        let rid = ring_id(ring_seq);

        // Activity of a fan ring is the hub-side traffic only
        let transaction_count = pattern
            .members
            .iter()
            .filter(|m| *m != &pattern.hub)
            .map(|m| match pattern.direction {
                FanDirection::Out => graph.txn_count_between(&pattern.hub, m),
                FanDirection::In => graph.txn_count_between(m, &pattern.hub),
            })
            .sum();

        for account in &pattern.members {
            let entry = board.accounts.entry(account.clone()).or_default();
            entry.score += SMURF_BASE;
            entry.patterns.insert(pattern.direction.tag().to_string());
            entry.ring_ids.insert(rid.clone());
        }

        board.rings.push(FraudRing {
            ring_id: rid,
            member_accounts: pattern.members.clone(),
            pattern_type: match pattern.direction {
                FanDirection::Out => PatternType::FanOut,
                FanDirection::In => PatternType::FanIn,
            },
            risk_score: SMURF_BASE,
            transaction_count,
        });
    }

    for members in shell_rings {
        ring_seq += 1;
        let rid = ring_id(ring_seq);
        let timestamps = graph.timestamps_among(members);
        let bonus = if span_hours(&timestamps) < FAST_HOURS { SHELL_FAST_BONUS } else { 0.0 };

        for account in members {
            let entry = board.accounts.entry(account.clone()).or_default();
            entry.score += SHELL_BASE + bonus;
            entry.patterns.insert("layered_shell".to_string());
            if bonus > 0.0 {
                entry.patterns.insert("rapid_layering".to_string());
            }
            entry.ring_ids.insert(rid.clone());
        }

        board.rings.push(FraudRing {
            ring_id: rid,
            member_accounts: members.clone(),
            pattern_type: PatternType::LayeredShell,
            risk_score: round1(SHELL_BASE + bonus),
            transaction_count: timestamps.len(),
        });
    }

    // Merchant/payroll shield
    let mut shielded = 0usize;
    for account in legitimate {
        if let Some(entry) = board.accounts.get_mut(account) {
            entry.score = (entry.score - LEGITIMACY_PENALTY).max(0.0);
            entry.patterns.insert(EXCEPTION_TAG.to_string());
            shielded += 1;
        }
    }
    if shielded > 0 {
        debug!("{} flagged accounts took the merchant/payroll penalty", shielded);
    }

    // Clamp, then settle ring risk on final member scores
    for entry in board.accounts.values_mut() {
        entry.score = entry.score.min(SCORE_CAP);
    }
    for ring in &mut board.rings {
        let member_sum: f64 = ring
            .member_accounts
            .iter()
            .filter_map(|m| board.accounts.get(m))
            .map(|a| a.score)
            .sum();
        let n = ring.member_accounts.len();
        ring.risk_score = if n > 0 { round1(member_sum / n as f64) } else { 0.0 };
    }

    info!(
        "Scoring complete: {} rings, {} suspicious accounts",
        board.rings.len(),
        board.accounts.values().filter(|a| a.score > 0.0).count()
    );
    board
}

/// One output row per (account, ring) membership for every account whose
/// final score stayed positive, ordered worst-first.
pub fn suspicious_rows(board: &ScoreBoard) -> Vec<SuspiciousAccount> {
    let mut rows = Vec::new();
    for (account, record) in &board.accounts {
        if record.score <= 0.0 {
            continue;
        }
        let detected: Vec<String> = record
            .patterns
            .iter()
            .filter(|p| p.as_str() != EXCEPTION_TAG)
            .cloned()
            .collect();
        for rid in &record.ring_ids {
            rows.push(SuspiciousAccount {
                account_id: account.clone(),
                suspicion_score: round1(record.score),
                detected_patterns: detected.clone(),
                ring_id: rid.clone(),
            });
        }
    }

    rows.sort_by(|a, b| {
        b.suspicion_score
            .partial_cmp(&a.suspicion_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.account_id.cmp(&b.account_id))
            .then_with(|| a.ring_id.cmp(&b.ring_id))
    });
    rows
}

/// Dashboard graph projection with per-node scoring overlays
pub fn graph_view(graph: &TxnGraph, board: &ScoreBoard) -> GraphView {
    let nodes = graph
        .graph
        .node_indices()
        .map(|n| {
            let account = graph.account(n);
            let (score, ring_ids) = board
                .accounts
                .get(account)
                .map(|a| (a.score, a.ring_ids.iter().cloned().collect()))
                .unwrap_or((0.0, Vec::new()));
            GraphNode {
                id: account.to_string(),
                suspicious: score > 0.0,
                score: round1(score),
                ring_ids,
                in_degree: graph.in_degree(n),
                out_degree: graph.out_degree(n),
            }
        })
        .collect();

    let edges = graph
        .graph
        .edge_references()
        .map(|e| GraphEdge {
            source: graph.account(e.source()).to_string(),
            target: graph.account(e.target()).to_string(),
            total_amount: round2(e.weight().total_amount),
            count: e.weight().count,
        })
        .collect();

    GraphView { nodes, edges }
}

/// Hours between the earliest and latest timestamp; infinite under two
/// samples so velocity bonuses never fire on silent rings
fn span_hours(timestamps: &[DateTime<Utc>]) -> f64 {
    if timestamps.len() < 2 {
        return f64::INFINITY;
    }
    match (timestamps.iter().min(), timestamps.iter().max()) {
        (Some(min), Some(max)) => (*max - *min).num_milliseconds() as f64 / 3_600_000.0,
        _ => f64::INFINITY,
    }
}
