//! Transaction Graph
//!
//! Directed account graph collapsed to one edge per ordered
//! (sender, receiver) pair; each edge owns the transaction list between
//! that pair plus running totals. Detectors read this structure, none
//! mutate it.

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use tracing::info;

use super::Transaction;

/// One transaction as stored on an edge (endpoints implied by the edge)
#[derive(Debug, Clone)]
pub struct EdgeTxn {
    pub id: String,
    pub amount: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Aggregated payload for an ordered (sender, receiver) pair
#[derive(Debug, Clone, Default)]
pub struct EdgeData {
    pub transactions: Vec<EdgeTxn>,
    pub total_amount: f64,
    pub count: usize,
}

/// The account graph every detector runs against
pub struct TxnGraph {
    /// Node weight is the account id
    pub graph: DiGraph<String, EdgeData>,
    pub account_to_node: HashMap<String, NodeIndex>,
    /// Ordered-pair lookup so ingestion stays O(1) per row
    edge_lookup: HashMap<(NodeIndex, NodeIndex), EdgeIndex>,
}

impl TxnGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            account_to_node: HashMap::new(),
            edge_lookup: HashMap::new(),
        }
    }

    /// Build the full graph from a parsed batch
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut g = Self::new();
        for txn in transactions {
            g.add_transaction(txn);
        }
        info!(
            "Graph built: {} accounts, {} edges, {} transactions",
            g.node_count(),
            g.edge_count(),
            transactions.len()
        );
        g
    }

    fn get_or_create_node(&mut self, account: &str) -> NodeIndex {
        if let Some(&node) = self.account_to_node.get(account) {
            return node;
        }
        let node = self.graph.add_node(account.to_string());
        self.account_to_node.insert(account.to_string(), node);
        node
    }

    pub fn add_transaction(&mut self, txn: &Transaction) {
        let from = self.get_or_create_node(&txn.sender_id);
        let to = self.get_or_create_node(&txn.receiver_id);

        let edge = match self.edge_lookup.get(&(from, to)) {
            Some(&e) => e,
            None => {
                let e = self.graph.add_edge(from, to, EdgeData::default());
                self.edge_lookup.insert((from, to), e);
                e
            }
        };

        let data = &mut self.graph[edge];
        data.transactions.push(EdgeTxn {
            id: txn.id.clone(),
            amount: txn.amount,
            timestamp: txn.timestamp,
        });
        data.total_amount += txn.amount;
        data.count += 1;
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, account: &str) -> Option<NodeIndex> {
        self.account_to_node.get(account).copied()
    }

    pub fn account(&self, node: NodeIndex) -> &str {
        &self.graph[node]
    }

    /// In-degree counted in aggregated edges = distinct senders
    pub fn in_degree(&self, node: NodeIndex) -> usize {
        self.graph.edges_directed(node, Direction::Incoming).count()
    }

    /// Out-degree counted in aggregated edges = distinct receivers
    pub fn out_degree(&self, node: NodeIndex) -> usize {
        self.graph.edges_directed(node, Direction::Outgoing).count()
    }

    pub fn degree(&self, node: NodeIndex) -> usize {
        self.in_degree(node) + self.out_degree(node)
    }

    /// Number of raw transactions from one account to another (0 if no edge)
    pub fn txn_count_between(&self, from: &str, to: &str) -> usize {
        let (Some(&f), Some(&t)) = (self.account_to_node.get(from), self.account_to_node.get(to))
        else {
            return 0;
        };
        self.edge_lookup.get(&(f, t)).map_or(0, |&e| self.graph[e].count)
    }

    /// All transaction timestamps on edges whose endpoints are both members.
    /// This is the induced-subgraph activity of a ring, independent of the
    /// order its members happen to be listed in.
    pub fn timestamps_among(&self, members: &[String]) -> Vec<DateTime<Utc>> {
        let nodes: HashSet<NodeIndex> = members
            .iter()
            .filter_map(|m| self.account_to_node.get(m).copied())
            .collect();

        let mut out = Vec::new();
        for member in members {
            let Some(&node) = self.account_to_node.get(member) else {
                continue;
            };
            for edge in self.graph.edges(node) {
                if nodes.contains(&edge.target()) {
                    out.extend(edge.weight().transactions.iter().filter_map(|t| t.timestamp));
                }
            }
        }
        out
    }
}

impl Default for TxnGraph {
    fn default() -> Self {
        Self::new()
    }
}
