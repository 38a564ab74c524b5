//! Cycle Detector
//!
//! Bounded simple-cycle enumeration over the account graph. Money pushed
//! around a loop of 3-5 accounts and back to its origin is the classic
//! mule layering shape; longer loops dilute too much to be worth flagging.
//!
//! The search is anytime: it honors a wall-clock budget and reports
//! whether it ran to completion, so a hostile dense graph degrades the
//! result instead of hanging the service.

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::merge_overlapping;
use crate::config::Config;
use crate::ingest::TxnGraph;

/// Stop collecting raw cycles at this multiple of the ring cap; merging
/// only ever shrinks the count, so searching further is wasted work.
const RAW_CYCLE_FACTOR: usize = 8;

/// Bounded anytime search for simple cycles
pub struct CycleDetector {
    pub min_len: usize,
    pub max_len: usize,
    /// Wall-clock budget for the whole enumeration
    pub deadline: Duration,
    /// Cap on merged rings kept in the result
    pub max_rings: usize,
}

/// What the search produced and whether it ran to completion
#[derive(Debug, Clone)]
pub struct CycleFindings {
    /// Merged rings, each a sorted member list
    pub rings: Vec<Vec<String>>,
    /// False when the deadline or a cap cut the enumeration short
    pub complete: bool,
}

struct SearchState {
    raw: Vec<Vec<String>>,
    seen: HashSet<Vec<String>>,
    raw_cap: usize,
    timed_out: bool,
    capped: bool,
}

impl CycleDetector {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_len: config.cycle_min_len,
            max_len: config.cycle_max_len,
            deadline: Duration::from_secs(config.cycle_deadline_secs),
            max_rings: config.max_cycle_rings,
        }
    }

    /// Enumerate simple cycles, merge overlapping ones, cap the output
    pub fn detect(&self, graph: &TxnGraph) -> CycleFindings {
        let started = Instant::now();
        let deadline = started + self.deadline;

        let mut search = SearchState {
            raw: Vec::new(),
            seen: HashSet::new(),
            raw_cap: self.max_rings.saturating_mul(RAW_CYCLE_FACTOR).max(1),
            timed_out: false,
            capped: false,
        };

        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        for start in graph.graph.node_indices() {
            if search.timed_out || search.capped {
                break;
            }
            path.clear();
            on_path.clear();
            path.push(start);
            on_path.insert(start);
            self.dfs(graph, start, start, &mut path, &mut on_path, deadline, &mut search);
        }

        if search.timed_out {
            warn!(
                "Cycle search hit its {:?} budget after {} raw cycles; returning partial findings",
                self.deadline,
                search.raw.len()
            );
        }

        let raw_count = search.raw.len();
        let mut rings = merge_overlapping(search.raw);
        let mut truncated = false;
        if rings.len() > self.max_rings {
            rings.truncate(self.max_rings);
            truncated = true;
        }

        let complete = !search.timed_out && !search.capped && !truncated;
        info!("Cycle sweep done in {:.2?}:", started.elapsed());
        info!("  • {} raw cycles (len {}..={})", raw_count, self.min_len, self.max_len);
        info!(
            "  • {} rings after merging{}",
            rings.len(),
            if complete { "" } else { " (partial)" }
        );

        CycleFindings { rings, complete }
    }

    /// DFS rooted at `start`, extended only through higher-index nodes so
    /// each cycle is discovered exactly once, anchored at its lowest node.
    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        graph: &TxnGraph,
        start: NodeIndex,
        current: NodeIndex,
        path: &mut Vec<NodeIndex>,
        on_path: &mut HashSet<NodeIndex>,
        deadline: Instant,
        search: &mut SearchState,
    ) {
        if search.timed_out || search.capped {
            return;
        }
        if Instant::now() >= deadline {
            search.timed_out = true;
            return;
        }

        for edge in graph.graph.edges(current) {
            let target = edge.target();

            if target == start {
                // Closing the loop; self-loops and two-hop bounces fall
                // under min_len and are ignored
                if path.len() >= self.min_len {
                    let mut members: Vec<String> =
                        path.iter().map(|&n| graph.account(n).to_string()).collect();
                    members.sort();
                    if search.seen.insert(members.clone()) {
                        debug!("cycle: {}", members.join(" → "));
                        search.raw.push(members);
                        if search.raw.len() >= search.raw_cap {
                            search.capped = true;
                            return;
                        }
                    }
                }
            } else if target > start && !on_path.contains(&target) && path.len() < self.max_len {
                path.push(target);
                on_path.insert(target);
                self.dfs(graph, start, target, path, on_path, deadline, search);
                path.pop();
                on_path.remove(&target);
                if search.timed_out || search.capped {
                    return;
                }
            }
        }
    }
}

impl Default for CycleDetector {
    fn default() -> Self {
        Self {
            min_len: 3,
            max_len: 5,
            deadline: Duration::from_secs(5),
            max_rings: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Transaction;

    fn graph(edges: &[(&str, &str)]) -> TxnGraph {
        let transactions: Vec<Transaction> = edges
            .iter()
            .enumerate()
            .map(|(i, (from, to))| Transaction {
                id: format!("t{}", i + 1),
                sender_id: from.to_string(),
                receiver_id: to.to_string(),
                amount: 100.0,
                timestamp: None,
            })
            .collect();
        TxnGraph::from_transactions(&transactions)
    }

    #[test]
    fn test_triangle_found_once() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let found = CycleDetector::default().detect(&g);

        assert!(found.complete);
        assert_eq!(found.rings, vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]);
    }

    #[test]
    fn test_short_loops_ignored() {
        // Self-loop and a two-hop bounce are both under min_len
        let g = graph(&[("a", "a"), ("a", "b"), ("b", "a")]);
        let found = CycleDetector::default().detect(&g);
        assert!(found.complete);
        assert!(found.rings.is_empty());
    }

    #[test]
    fn test_max_len_bounds_the_search() {
        // 6-node loop, over the default cap of 5
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e"), ("e", "f"), ("f", "a")]);
        let found = CycleDetector::default().detect(&g);
        assert!(found.complete);
        assert!(found.rings.is_empty());

        let wider = CycleDetector { max_len: 6, ..CycleDetector::default() };
        let found = wider.detect(&g);
        assert_eq!(found.rings.len(), 1);
        assert_eq!(found.rings[0].len(), 6);
    }

    #[test]
    fn test_both_directions_dedup_to_one_ring() {
        // All six edges among three accounts: two directed triangles, one
        // vertex set
        let g = graph(&[
            ("a", "b"),
            ("b", "c"),
            ("c", "a"),
            ("a", "c"),
            ("c", "b"),
            ("b", "a"),
        ]);
        let found = CycleDetector::default().detect(&g);
        assert!(found.complete);
        assert_eq!(found.rings.len(), 1);
    }

    #[test]
    fn test_disjoint_cycles_stay_separate() {
        let g = graph(&[
            ("a", "b"),
            ("b", "c"),
            ("c", "a"),
            ("x", "y"),
            ("y", "z"),
            ("z", "x"),
        ]);
        let found = CycleDetector::default().detect(&g);
        assert!(found.complete);
        assert_eq!(found.rings.len(), 2);
    }

    #[test]
    fn test_overlapping_cycles_merge_into_one_ring() {
        // Triangles abc and bcd share two members
        let g = graph(&[
            ("a", "b"),
            ("b", "c"),
            ("c", "a"),
            ("b", "c"),
            ("c", "d"),
            ("d", "b"),
        ]);
        let found = CycleDetector::default().detect(&g);
        assert!(found.complete);
        assert_eq!(
            found.rings,
            vec![vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()]]
        );
    }

    #[test]
    fn test_ring_cap_truncates_and_marks_partial() {
        let g = graph(&[
            ("a", "b"),
            ("b", "c"),
            ("c", "a"),
            ("x", "y"),
            ("y", "z"),
            ("z", "x"),
            ("p", "q"),
            ("q", "r"),
            ("r", "p"),
        ]);
        let capped = CycleDetector { max_rings: 2, ..CycleDetector::default() };
        let found = capped.detect(&g);
        assert_eq!(found.rings.len(), 2);
        assert!(!found.complete);
    }

    #[test]
    fn test_zero_deadline_degrades_not_hangs() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let starved = CycleDetector { deadline: Duration::ZERO, ..CycleDetector::default() };
        let found = starved.detect(&g);
        assert!(!found.complete);
    }

    #[test]
    fn test_empty_graph_is_complete() {
        let g = graph(&[]);
        let found = CycleDetector::default().detect(&g);
        assert!(found.complete);
        assert!(found.rings.is_empty());
    }
}
