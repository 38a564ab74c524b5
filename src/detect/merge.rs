//! Ring Merger
//!
//! Collapses raw pattern findings that share members into single rings.
//! Two groups merge when they share at least two accounts; sharing a
//! single account is normal traffic overlap and keeps them apart. Runs
//! to a fixpoint so chains of overlap collapse transitively.

use std::collections::BTreeSet;

/// Minimum shared accounts for two groups to be considered the same ring
const MIN_SHARED_MEMBERS: usize = 2;

/// Merge overlapping member groups to a fixpoint.
///
/// Greedy left-to-right: each unconsumed group absorbs every later group
/// that shares `MIN_SHARED_MEMBERS` accounts with its current (grown)
/// membership, and passes repeat until nothing merges. Output groups are
/// sorted member lists; already-disjoint input passes through unchanged,
/// so the operation is idempotent.
pub fn merge_overlapping(groups: Vec<Vec<String>>) -> Vec<Vec<String>> {
    if groups.is_empty() {
        return Vec::new();
    }

    let mut sets: Vec<BTreeSet<String>> = groups
        .into_iter()
        .map(|g| g.into_iter().collect())
        .collect();

    let mut merged = true;
    while merged {
        merged = false;
        let mut next: Vec<BTreeSet<String>> = Vec::with_capacity(sets.len());
        let mut used = vec![false; sets.len()];

        for i in 0..sets.len() {
            if used[i] {
                continue;
            }
            let mut current = std::mem::take(&mut sets[i]);
            for j in (i + 1)..sets.len() {
                if used[j] {
                    continue;
                }
                if shared_members(&current, &sets[j]) >= MIN_SHARED_MEMBERS {
                    current.extend(std::mem::take(&mut sets[j]));
                    used[j] = true;
                    merged = true;
                }
            }
            next.push(current);
        }
        sets = next;
    }

    sets.into_iter().map(|s| s.into_iter().collect()).collect()
}

/// Count common members, stopping as soon as the merge threshold is met
fn shared_members(a: &BTreeSet<String>, b: &BTreeSet<String>) -> usize {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut shared = 0;
    for member in small {
        if large.contains(member) {
            shared += 1;
            if shared >= MIN_SHARED_MEMBERS {
                break;
            }
        }
    }
    shared
}
