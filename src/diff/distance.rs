//! Pure subtree distance estimation.
//!
//! The [`Estimator`] mirrors the annotation-writing matcher but only
//! accumulates an integer cost; it never touches match state. Costs:
//! zero for an exact hash match, one per changed text leaf or attribute
//! value, two per attribute added or removed, subtree size plus one for
//! a deleted or inserted subtree, and unmatchable for a tag or node-kind
//! mismatch. Every call takes a pruning threshold: once the running cost
//! reaches it the estimate is abandoned and reported as unmatchable.

use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;

use super::assignment::{solve, CostMatrix, INFINITE_COST};
use super::config::{DiffConfig, MatchMode};
use super::memo::MatchMemo;
use crate::forest::{ForestStore, NodeId};

/// One same-tag sibling group awaiting cost-based pairing.
pub(crate) struct TagGroup {
    pub left: Vec<NodeId>,
    pub right: Vec<NodeId>,
}

/// Greedy first-fit pass pairing equal rollup hashes across two element
/// lists. Returns per-side matched flags and the number of pairs.
pub(crate) fn hash_filter(
    left: &ForestStore,
    right: &ForestStore,
    elems1: &[NodeId],
    elems2: &[NodeId],
) -> (Vec<bool>, Vec<bool>, usize) {
    let mut matched1 = vec![false; elems1.len()];
    let mut matched2 = vec![false; elems2.len()];
    let mut count = 0;
    for (i, &n2) in elems2.iter().enumerate() {
        let hash2 = right.hash(n2);
        for (j, &n1) in elems1.iter().enumerate() {
            if !matched1[j] && !matched2[i] && left.hash(n1) == hash2 {
                matched1[j] = true;
                matched2[i] = true;
                count += 1;
                break;
            }
        }
    }
    (matched1, matched2, count)
}

/// Group hash-unmatched elements by tag name, in order of first
/// appearance on the left. Right elements whose tag never occurs on the
/// left are returned separately; they can only be inserts.
pub(crate) fn tag_groups(
    left: &ForestStore,
    right: &ForestStore,
    unmatched1: &[NodeId],
    unmatched2: &[NodeId],
) -> (Vec<TagGroup>, Vec<NodeId>) {
    let mut groups: Vec<TagGroup> = Vec::new();
    let mut by_tag: HashMap<&str, usize> = HashMap::new();
    for &n1 in unmatched1 {
        let slot = *by_tag.entry(left.tag_name(n1)).or_insert_with(|| {
            groups.push(TagGroup {
                left: Vec::new(),
                right: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].left.push(n1);
    }
    let mut leftover = Vec::new();
    for &n2 in unmatched2 {
        match by_tag.get(right.tag_name(n2)) {
            Some(&slot) => groups[slot].right.push(n2),
            None => leftover.push(n2),
        }
    }
    (groups, leftover)
}

/// Cost pass over a pair of forests.
///
/// Borrows the memo and the RNG from the owning matcher so estimates
/// made while filling a cost matrix are visible to later reuse passes.
pub(crate) struct Estimator<'a> {
    left: &'a ForestStore,
    right: &'a ForestStore,
    config: &'a DiffConfig,
    memo: &'a mut MatchMemo,
    rng: &'a mut StdRng,
}

impl<'a> Estimator<'a> {
    pub(crate) fn new(
        left: &'a ForestStore,
        right: &'a ForestStore,
        config: &'a DiffConfig,
        memo: &'a mut MatchMemo,
        rng: &'a mut StdRng,
    ) -> Self {
        Self {
            left,
            right,
            config,
            memo,
            rng,
        }
    }

    /// Distance between a left-forest and a right-forest subtree, or
    /// [`INFINITE_COST`] once the running cost reaches `threshold`.
    pub(crate) fn subtree_distance(&mut self, n1: NodeId, n2: NodeId, threshold: u32) -> u32 {
        match (self.left.is_element(n1), self.right.is_element(n2)) {
            (true, true) => {
                if self.left.tag_name(n1) != self.right.tag_name(n2) {
                    INFINITE_COST
                } else {
                    self.element_distance(n1, n2, threshold)
                }
            }
            (false, false) => 1,
            _ => INFINITE_COST,
        }
    }

    /// Recursive cost of transforming one element's content into the
    /// other's. Both nodes carry the same tag.
    fn element_distance(&mut self, p1: NodeId, p2: NodeId, threshold: u32) -> u32 {
        let attrs1 = self.left.attributes(p1);
        let attrs2 = self.right.attributes(p2);
        let mut dist = if attrs1.is_empty() {
            2 * attrs2.len() as u32
        } else if attrs2.is_empty() {
            2 * attrs1.len() as u32
        } else {
            self.attribute_distance(&attrs1, &attrs2)
        };
        if dist >= threshold {
            return INFINITE_COST;
        }

        let children1 = self.left.children(p1);
        let children2 = self.right.children(p2);
        if children1.is_empty() {
            for &n2 in &children2 {
                dist += self.right.descendant_count(n2) + 1;
                if dist >= threshold {
                    return INFINITE_COST;
                }
            }
        } else if children2.is_empty() {
            for &n1 in &children1 {
                dist += self.left.descendant_count(n1) + 1;
                if dist >= threshold {
                    return INFINITE_COST;
                }
            }
        } else if children1.len() == 1 && children2.len() == 1 {
            let (n1, n2) = (children1[0], children2[0]);
            if self.left.hash(n1) == self.right.hash(n2) {
                return dist;
            }
            match (self.left.is_element(n1), self.right.is_element(n2)) {
                (true, true) if self.left.tag_name(n1) == self.right.tag_name(n2) => {
                    dist = dist.saturating_add(self.element_distance(
                        n1,
                        n2,
                        threshold.saturating_sub(dist),
                    ));
                }
                (false, false) => dist += 1,
                // Replace both subtrees wholesale.
                _ => {
                    dist += self.left.descendant_count(n1) + self.right.descendant_count(n2) + 2;
                }
            }
        } else {
            dist = dist.saturating_add(self.children_distance(
                &children1,
                &children2,
                threshold.saturating_sub(dist),
            ));
        }

        if dist >= threshold {
            INFINITE_COST
        } else {
            dist
        }
    }

    /// Multi-child case: text identity matching, hash filter, then
    /// cost-based pairing per same-tag group.
    fn children_distance(
        &mut self,
        children1: &[NodeId],
        children2: &[NodeId],
        threshold: u32,
    ) -> u32 {
        let (texts1, elems1): (Vec<NodeId>, Vec<NodeId>) = children1
            .iter()
            .copied()
            .partition(|&n| self.left.is_text(n));
        let (texts2, elems2): (Vec<NodeId>, Vec<NodeId>) = children2
            .iter()
            .copied()
            .partition(|&n| self.right.is_text(n));

        let mut dist = if texts1.is_empty() {
            texts2.len() as u32
        } else if texts2.is_empty() {
            texts1.len() as u32
        } else {
            self.text_distance(&texts1, &texts2)
        };
        if dist >= threshold {
            return INFINITE_COST;
        }

        let (matched1, matched2, mcount) = hash_filter(self.left, self.right, &elems1, &elems2);
        if mcount == elems1.len() && mcount == elems2.len() {
            return dist;
        }
        if mcount == elems1.len() {
            for (i, &n2) in elems2.iter().enumerate() {
                if !matched2[i] {
                    dist += self.right.descendant_count(n2) + 1;
                    if dist >= threshold {
                        return INFINITE_COST;
                    }
                }
            }
            return dist;
        }
        if mcount == elems2.len() {
            for (i, &n1) in elems1.iter().enumerate() {
                if !matched1[i] {
                    dist += self.left.descendant_count(n1) + 1;
                    if dist >= threshold {
                        return INFINITE_COST;
                    }
                }
            }
            return dist;
        }

        let unmatched1: Vec<NodeId> = elems1
            .iter()
            .zip(&matched1)
            .filter(|(_, &m)| !m)
            .map(|(&n, _)| n)
            .collect();
        let unmatched2: Vec<NodeId> = elems2
            .iter()
            .zip(&matched2)
            .filter(|(_, &m)| !m)
            .map(|(&n, _)| n)
            .collect();
        let (groups, leftover) = tag_groups(self.left, self.right, &unmatched1, &unmatched2);

        for group in groups {
            if group.right.is_empty() {
                for &n1 in &group.left {
                    dist += self.left.descendant_count(n1) + 1;
                }
            } else {
                let sampled = self.config.mode == MatchMode::Sampling
                    && group.left.len().min(group.right.len()) > self.config.sample_count;
                let group_dist = if sampled {
                    self.group_distance_sampled(
                        group.left,
                        group.right,
                        threshold.saturating_sub(dist),
                    )
                } else {
                    self.group_distance_exact(&group.left, &group.right)
                };
                dist = dist.saturating_add(group_dist);
            }
            if dist >= threshold {
                return INFINITE_COST;
            }
        }
        for &n2 in &leftover {
            dist += self.right.descendant_count(n2) + 1;
            if dist >= threshold {
                return INFINITE_COST;
            }
        }
        dist
    }

    /// Greedy attribute diff cost: one per changed value, two per
    /// attribute present on only one side.
    fn attribute_distance(&mut self, attrs1: &[NodeId], attrs2: &[NodeId]) -> u32 {
        if attrs1.len() == 1 && attrs2.len() == 1 {
            let (a1, a2) = (attrs1[0], attrs2[0]);
            return if self.left.hash(a1) == self.right.hash(a2) {
                0
            } else if self.left.tag_name(a1) == self.right.tag_name(a2) {
                1
            } else {
                2
            };
        }

        let mut matched2 = vec![false; attrs2.len()];
        let mut match_count = 0;
        let mut dist = 0;
        for &a1 in attrs1 {
            let hash1 = self.left.hash(a1);
            let name1 = self.left.tag_name(a1);
            let mut found = false;
            for (j, &a2) in attrs2.iter().enumerate() {
                if matched2[j] {
                    continue;
                }
                if hash1 == self.right.hash(a2) {
                    matched2[j] = true;
                    match_count += 1;
                    found = true;
                    break;
                }
                if name1 == self.right.tag_name(a2) {
                    matched2[j] = true;
                    match_count += 1;
                    dist += 1;
                    found = true;
                    break;
                }
            }
            if !found {
                dist += 2;
            }
        }
        dist + (attrs2.len() - match_count) as u32 * 2
    }

    /// Identity-only text cost: one per text run without an exact-hash
    /// counterpart, counted on the larger side.
    fn text_distance(&mut self, texts1: &[NodeId], texts2: &[NodeId]) -> u32 {
        let mut matched2 = vec![false; texts2.len()];
        let mut mcount = 0;
        for &t1 in texts1 {
            let hash1 = self.left.hash(t1);
            for (j, &t2) in texts2.iter().enumerate() {
                if !matched2[j] && hash1 == self.right.hash(t2) {
                    matched2[j] = true;
                    mcount += 1;
                    break;
                }
            }
            if mcount == texts2.len() {
                break;
            }
        }
        (texts1.len().max(texts2.len()) - mcount) as u32
    }

    /// Pairwise cost matrix for one same-tag group, with delete/insert
    /// sentinels. With `reuse_memo` the cells come from earlier estimates
    /// only; otherwise they are computed, subjected to the rejection
    /// ratio, and the survivors memoized for later reuse passes.
    pub(crate) fn cost_matrix(
        &mut self,
        group1: &[NodeId],
        group2: &[NodeId],
        reuse_memo: bool,
    ) -> CostMatrix {
        let mut matrix = CostMatrix::new(group1.len(), group2.len());
        for (j, &n2) in group2.iter().enumerate() {
            matrix.set_insert_cost(j, self.right.descendant_count(n2) + 1);
        }
        for (i, &n1) in group1.iter().enumerate() {
            let delete_cost = self.left.descendant_count(n1) + 1;
            matrix.set_delete_cost(i, delete_cost);
            for (j, &n2) in group2.iter().enumerate() {
                let dist = if reuse_memo {
                    self.memo.get(n1, n2).unwrap_or(INFINITE_COST)
                } else {
                    let mut d = self.subtree_distance(n1, n2, INFINITE_COST);
                    if self.config.reject_ratio < 1.0
                        && d > 1
                        && d as f64
                            >= self.config.reject_ratio
                                * (delete_cost + matrix.insert_cost(j)) as f64
                    {
                        d = INFINITE_COST;
                    }
                    if d < INFINITE_COST {
                        self.memo.insert(n1, n2, d);
                    }
                    d
                };
                matrix.set(i, j, dist);
            }
        }
        matrix
    }

    /// Exact group cost: solve the full assignment for the group.
    fn group_distance_exact(&mut self, group1: &[NodeId], group2: &[NodeId]) -> u32 {
        let matrix = self.cost_matrix(group1, group2, false);
        solve(&matrix).total_cost
    }

    /// Sampled group cost: probe a bounded number of random candidates
    /// from the smaller side, then sweep the rest against the best
    /// distance seen. Mirrors the sampling matcher, cost-only.
    fn group_distance_sampled(
        &mut self,
        group1: Vec<NodeId>,
        group2: Vec<NodeId>,
        threshold: u32,
    ) -> u32 {
        let long_is_left = group1.len() >= group2.len();
        let (mut long, mut short) = if long_is_left {
            (group1, group2)
        } else {
            (group2, group1)
        };
        let short_forest = if long_is_left { self.right } else { self.left };
        let long_forest = if long_is_left { self.left } else { self.right };

        let mut dist = 0u32;
        let mut matching_threshold = 0u32;
        let mut probes = 0;
        while probes < self.config.sample_count && !short.is_empty() {
            let pick = self.rng.gen_range(0..short.len());
            let candidate = short.swap_remove(pick);
            let best = self.best_partner(&long, candidate, long_is_left, None);
            let delete_cost = short_forest.descendant_count(candidate) + 1;
            match best {
                Some((slot, d))
                    if d <= 1 || (d as f64) <= self.config.reject_ratio * delete_cost as f64 =>
                {
                    let partner = long.swap_remove(slot);
                    self.record(partner, candidate, long_is_left, d);
                    probes += 1;
                    matching_threshold = matching_threshold.max(d);
                    dist += d;
                }
                _ => dist += delete_cost,
            }
            if dist >= threshold {
                return INFINITE_COST;
            }
        }

        for candidate in short {
            let delete_cost = short_forest.descendant_count(candidate) + 1;
            match self.best_partner(&long, candidate, long_is_left, Some(matching_threshold)) {
                Some((slot, d)) => {
                    let partner = long.swap_remove(slot);
                    self.record(partner, candidate, long_is_left, d);
                    dist += d;
                }
                None => dist += delete_cost,
            }
            if dist >= threshold {
                return INFINITE_COST;
            }
        }

        for &n in &long {
            dist += long_forest.descendant_count(n) + 1;
            if dist >= threshold {
                return INFINITE_COST;
            }
        }
        dist
    }

    /// Cheapest partner for `candidate` among `long`, early-exiting on a
    /// distance of one or, when given, on `accept_below` (the sweep
    /// phase's acceptance bound).
    pub(crate) fn best_partner(
        &mut self,
        long: &[NodeId],
        candidate: NodeId,
        long_is_left: bool,
        accept_below: Option<u32>,
    ) -> Option<(usize, u32)> {
        let mut best = None;
        let mut best_dist = INFINITE_COST;
        for (i, &n) in long.iter().enumerate() {
            let d = if long_is_left {
                self.subtree_distance(n, candidate, best_dist)
            } else {
                self.subtree_distance(candidate, n, best_dist)
            };
            if d < best_dist {
                best_dist = d;
                best = Some((i, d));
                if d == 1 || accept_below.is_some_and(|bound| d <= bound) {
                    break;
                }
            }
        }
        best
    }

    /// Memoize an accepted sampled pairing, in left/right orientation.
    pub(crate) fn record(&mut self, partner: NodeId, candidate: NodeId, long_is_left: bool, d: u32) {
        if long_is_left {
            self.memo.insert(partner, candidate, d);
        } else {
            self.memo.insert(candidate, partner, d);
        }
    }
}
