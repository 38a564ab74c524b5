//! Legitimacy Filter
//!
//! Separates merchants and payroll processors from mule hubs. Both look
//! like fan patterns on degree alone; legitimate volume shows up as scale
//! plus regularity, so accounts matching either rule get a score penalty
//! later instead of a flag.

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashSet;
use tracing::info;

use crate::config::Config;
use crate::ingest::TxnGraph;

pub struct LegitimacyFilter {
    /// One-directional degree that marks a pure sink/source as legitimate
    pub sink_degree: usize,
    /// Edge count on one side before the regularity rule applies
    pub side_edges: usize,
    /// Distinct counterparties required on that side
    pub min_counterparties: usize,
    /// Coefficient of variation under which amounts count as regular
    pub max_amount_cv: f64,
}

impl LegitimacyFilter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sink_degree: config.legit_sink_degree,
            side_edges: config.legit_side_edges,
            min_counterparties: config.legit_min_counterparties,
            max_amount_cv: config.legit_max_amount_cv,
        }
    }

    /// Collect accounts whose shape says merchant or payroll, not mule
    pub fn identify(&self, graph: &TxnGraph) -> HashSet<String> {
        let mut legitimate = HashSet::new();

        for node in graph.graph.node_indices() {
            let in_deg = graph.in_degree(node);
            let out_deg = graph.out_degree(node);

            // Pure high-volume sink (merchant) or source (payroll)
            if (in_deg >= self.sink_degree && out_deg == 0)
                || (out_deg >= self.sink_degree && in_deg == 0)
            {
                legitimate.insert(graph.account(node).to_string());
                continue;
            }

            // Busy side with regular amounts. Edges aggregate per ordered
            // pair, so the edge count doubles as the counterparty count.
            let regular_in = in_deg >= self.side_edges
                && in_deg >= self.min_counterparties
                && self.amounts_regular(graph, node, Direction::Incoming);
            let regular_out = out_deg >= self.side_edges
                && out_deg >= self.min_counterparties
                && self.amounts_regular(graph, node, Direction::Outgoing);

            if regular_in || regular_out {
                legitimate.insert(graph.account(node).to_string());
            }
        }

        if !legitimate.is_empty() {
            info!(
                "Legitimacy filter: {} merchant/payroll accounts shielded",
                legitimate.len()
            );
        }
        legitimate
    }

    /// Population coefficient of variation over all transaction amounts
    /// on one side of the account
    fn amounts_regular(&self, graph: &TxnGraph, node: NodeIndex, dir: Direction) -> bool {
        let amounts: Vec<f64> = graph
            .graph
            .edges_directed(node, dir)
            .flat_map(|e| e.weight().transactions.iter().map(|t| t.amount))
            .collect();
        if amounts.is_empty() {
            return false;
        }

        let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
        let variance =
            amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / amounts.len() as f64;
        let cv = if mean > 0.0 { variance.sqrt() / mean } else { 0.0 };
        cv < self.max_amount_cv
    }
}

impl Default for LegitimacyFilter {
    fn default() -> Self {
        Self {
            sink_degree: 100,
            side_edges: 20,
            min_counterparties: 15,
            max_amount_cv: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Transaction;

    fn txn(from: &str, to: &str, amount: f64) -> Transaction {
        Transaction {
            id: format!("{from}->{to}"),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            amount,
            timestamp: None,
        }
    }

    #[test]
    fn test_pure_sink_is_legitimate() {
        // Wildly varying amounts, so only the sink rule can fire
        let txns: Vec<Transaction> =
            (0..100).map(|i| txn(&format!("c{i}"), "shop", 10.0 + (i as f64) * 97.0)).collect();
        let g = TxnGraph::from_transactions(&txns);

        let legit = LegitimacyFilter::default().identify(&g);
        assert!(legit.contains("shop"));
    }

    #[test]
    fn test_sink_below_degree_bound_is_not() {
        let txns: Vec<Transaction> =
            (0..99).map(|i| txn(&format!("c{i}"), "shop", 10.0 + (i as f64) * 97.0)).collect();
        let g = TxnGraph::from_transactions(&txns);
        assert!(!LegitimacyFilter::default().identify(&g).contains("shop"));
    }

    #[test]
    fn test_leaky_sink_is_not_shielded() {
        let mut txns: Vec<Transaction> =
            (0..100).map(|i| txn(&format!("c{i}"), "shop", 10.0 + (i as f64) * 97.0)).collect();
        // A single outgoing transfer disqualifies the pure-sink rule
        txns.push(txn("shop", "owner", 5000.0));
        let g = TxnGraph::from_transactions(&txns);
        assert!(!LegitimacyFilter::default().identify(&g).contains("shop"));
    }

    #[test]
    fn test_pure_source_is_legitimate() {
        let txns: Vec<Transaction> =
            (0..100).map(|i| txn("employer", &format!("e{i}"), 10.0 + (i as f64) * 97.0)).collect();
        let g = TxnGraph::from_transactions(&txns);
        assert!(LegitimacyFilter::default().identify(&g).contains("employer"));
    }

    #[test]
    fn test_regular_payroll_amounts_qualify() {
        // Well under the sink degree, but twenty identical salary payments
        let mut txns: Vec<Transaction> =
            (0..20).map(|i| txn("payroll", &format!("e{i}"), 3200.0)).collect();
        txns.push(txn("funding", "payroll", 64000.0));
        let g = TxnGraph::from_transactions(&txns);
        assert!(LegitimacyFilter::default().identify(&g).contains("payroll"));
    }

    #[test]
    fn test_irregular_amounts_do_not_qualify() {
        let mut txns: Vec<Transaction> =
            (0..20).map(|i| txn("hub", &format!("m{i}"), 100.0 + (i as f64) * 400.0)).collect();
        txns.push(txn("funding", "hub", 64000.0));
        let g = TxnGraph::from_transactions(&txns);
        assert!(!LegitimacyFilter::default().identify(&g).contains("hub"));
    }

    #[test]
    fn test_below_edge_count_does_not_qualify() {
        let mut txns: Vec<Transaction> =
            (0..19).map(|i| txn("payroll", &format!("e{i}"), 3200.0)).collect();
        txns.push(txn("funding", "payroll", 64000.0));
        let g = TxnGraph::from_transactions(&txns);
        assert!(!LegitimacyFilter::default().identify(&g).contains("payroll"));
    }
}
