//! Smurfing Detector
//!
//! Fan-out/fan-in structuring: one hub moving money to or from many
//! distinct counterparties inside a short window. Both directions are
//! scanned separately, and hub patterns are reported as-is rather than
//! merged — two hubs sharing peers are still two operations.

use chrono::{DateTime, Duration as TimeDelta, Utc};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};

use crate::config::Config;
use crate::ingest::TxnGraph;

/// Which way money flows through the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanDirection {
    Out,
    In,
}

impl FanDirection {
    pub fn tag(&self) -> &'static str {
        match self {
            FanDirection::Out => "fan_out",
            FanDirection::In => "fan_in",
        }
    }
}

impl fmt::Display for FanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One hub-centered structuring pattern
#[derive(Debug, Clone)]
pub struct FanPattern {
    pub direction: FanDirection,
    pub hub: String,
    /// Sorted member list: hub plus every peer in the qualifying window
    pub members: Vec<String>,
}

pub struct SmurfingDetector {
    /// Minimum distinct counterparties inside one window
    pub fan_threshold: usize,
    /// Window width in hours, inclusive at the boundary
    pub window_hours: i64,
}

impl SmurfingDetector {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fan_threshold: config.fan_threshold,
            window_hours: config.fan_window_hours,
        }
    }

    /// Scan every node as a potential hub, fan-out pass first, then fan-in
    pub fn detect(&self, graph: &TxnGraph) -> Vec<FanPattern> {
        let window = TimeDelta::hours(self.window_hours);
        let mut patterns = Vec::new();

        for direction in [FanDirection::Out, FanDirection::In] {
            let petdir = match direction {
                FanDirection::Out => Direction::Outgoing,
                FanDirection::In => Direction::Incoming,
            };

            for hub in graph.graph.node_indices() {
                // Fewer distinct counterparties than the threshold can
                // never fill a window, skip before touching timestamps
                if graph.graph.edges_directed(hub, petdir).count() < self.fan_threshold {
                    continue;
                }

                let mut txns: Vec<(NodeIndex, DateTime<Utc>)> = Vec::new();
                for edge in graph.graph.edges_directed(hub, petdir) {
                    let peer = match direction {
                        FanDirection::Out => edge.target(),
                        FanDirection::In => edge.source(),
                    };
                    txns.extend(
                        edge.weight()
                            .transactions
                            .iter()
                            .filter_map(|t| t.timestamp.map(|ts| (peer, ts))),
                    );
                }
                if txns.len() < self.fan_threshold {
                    continue;
                }
                txns.sort_by_key(|&(_, ts)| ts);

                if let Some(peers) = self.first_qualifying_window(&txns, window) {
                    let mut members: BTreeSet<&str> =
                        peers.iter().map(|&p| graph.account(p)).collect();
                    members.insert(graph.account(hub));
                    debug!(
                        "{} hub {} with {} peers in window",
                        direction,
                        graph.account(hub),
                        peers.len()
                    );
                    patterns.push(FanPattern {
                        direction,
                        hub: graph.account(hub).to_string(),
                        members: members.into_iter().map(String::from).collect(),
                    });
                }
            }
        }

        if !patterns.is_empty() {
            let fan_out = patterns.iter().filter(|p| p.direction == FanDirection::Out).count();
            info!(
                "Smurfing sweep: {} hub patterns ({} fan-out, {} fan-in)",
                patterns.len(),
                fan_out,
                patterns.len() - fan_out
            );
        }
        patterns
    }

    /// Slide a window over time-sorted hub transactions and return the
    /// distinct peers of the earliest window that meets the threshold.
    fn first_qualifying_window(
        &self,
        txns: &[(NodeIndex, DateTime<Utc>)],
        window: TimeDelta,
    ) -> Option<Vec<NodeIndex>> {
        let mut left = 0;
        let mut in_window: HashMap<NodeIndex, usize> = HashMap::new();

        for right in 0..txns.len() {
            *in_window.entry(txns[right].0).or_insert(0) += 1;

            while txns[right].1 - txns[left].1 > window {
                let peer = txns[left].0;
                if let Some(n) = in_window.get_mut(&peer) {
                    *n -= 1;
                    if *n == 0 {
                        in_window.remove(&peer);
                    }
                }
                left += 1;
            }

            if in_window.len() >= self.fan_threshold {
                return Some(in_window.keys().copied().collect());
            }
        }
        None
    }
}

impl Default for SmurfingDetector {
    fn default() -> Self {
        Self { fan_threshold: 10, window_hours: 72 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Transaction;
    use chrono::TimeZone;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::hours(hour)
    }

    fn txn(from: &str, to: &str, hour: i64) -> Transaction {
        Transaction {
            id: format!("{from}-{to}-{hour}"),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            amount: 900.0,
            timestamp: Some(at(hour)),
        }
    }

    #[test]
    fn test_fan_out_hub_with_ten_peers_in_one_hour() {
        let txns: Vec<Transaction> = (0..10).map(|i| txn("hub", &format!("p{i}"), 0)).collect();
        let g = TxnGraph::from_transactions(&txns);

        let patterns = SmurfingDetector::default().detect(&g);
        assert_eq!(patterns.len(), 1);

        let p = &patterns[0];
        assert_eq!(p.direction, FanDirection::Out);
        assert_eq!(p.hub, "hub");
        assert_eq!(p.members.len(), 11);
        assert!(p.members.contains(&"hub".to_string()));
    }

    #[test]
    fn test_fan_in_direction() {
        let txns: Vec<Transaction> = (0..10).map(|i| txn(&format!("p{i}"), "sink", i)).collect();
        let g = TxnGraph::from_transactions(&txns);

        let patterns = SmurfingDetector::default().detect(&g);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].direction, FanDirection::In);
        assert_eq!(patterns[0].hub, "sink");
        assert_eq!(patterns[0].members.len(), 11);
    }

    #[test]
    fn test_below_threshold_is_quiet() {
        let txns: Vec<Transaction> = (0..9).map(|i| txn("hub", &format!("p{i}"), 0)).collect();
        let g = TxnGraph::from_transactions(&txns);
        assert!(SmurfingDetector::default().detect(&g).is_empty());
    }

    #[test]
    fn test_spread_beyond_window_is_quiet() {
        // Ten peers, one every ten hours: no 72h stretch holds ten of them
        let txns: Vec<Transaction> =
            (0..10).map(|i| txn("hub", &format!("p{i}"), i * 10)).collect();
        let g = TxnGraph::from_transactions(&txns);
        assert!(SmurfingDetector::default().detect(&g).is_empty());
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        // Ten peers spanning exactly 72 hours end to end
        let txns: Vec<Transaction> =
            (0..10).map(|i| txn("hub", &format!("p{i}"), i * 8)).collect();
        let g = TxnGraph::from_transactions(&txns);
        assert_eq!(SmurfingDetector::default().detect(&g).len(), 1);
    }

    #[test]
    fn test_earliest_window_wins() {
        // A qualifying burst at hour 0, a second burst much later; only
        // the first burst's peers are reported
        let mut txns: Vec<Transaction> =
            (0..10).map(|i| txn("hub", &format!("early{i}"), 0)).collect();
        txns.extend((0..10).map(|i| txn("hub", &format!("late{i}"), 500)));
        let g = TxnGraph::from_transactions(&txns);

        let patterns = SmurfingDetector::default().detect(&g);
        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.members.len(), 11);
        assert!(p.members.iter().all(|m| m == "hub" || m.starts_with("early")));
    }

    #[test]
    fn test_no_timestamps_no_findings() {
        let txns: Vec<Transaction> = (0..10)
            .map(|i| Transaction {
                id: format!("t{i}"),
                sender_id: "hub".to_string(),
                receiver_id: format!("p{i}"),
                amount: 900.0,
                timestamp: None,
            })
            .collect();
        let g = TxnGraph::from_transactions(&txns);
        assert!(SmurfingDetector::default().detect(&g).is_empty());
    }
}
