//! Annotation-writing matching pass.
//!
//! [`DiffEngine::diff`] drives the recursive matcher over two parsed
//! forests and writes one [`MatchState`] per node. The traversal is
//! top-down: a parent's pairing is decided before its children are
//! visited, and no annotation is ever rewritten.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use super::assignment::solve;
use super::config::{DiffConfig, MatchMode};
use super::distance::{hash_filter, tag_groups, Estimator};
use super::memo::MatchMemo;
use crate::error::{Result, XmlDiffError};
use crate::forest::{ForestStore, MatchState, NodeId};

/// Structural diff engine for a pair of forests.
pub struct DiffEngine {
    config: DiffConfig,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffEngine {
    pub fn new() -> Self {
        Self {
            config: DiffConfig::default(),
        }
    }

    /// Engine with an explicit configuration. Fails on out-of-range
    /// settings.
    pub fn with_config(config: DiffConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Annotate every node of both forests with its match outcome.
    /// Returns `false` when the trees are identical (nothing is
    /// annotated then).
    pub fn diff(&self, left: &mut ForestStore, right: &mut ForestStore) -> Result<bool> {
        if left.is_empty() || right.is_empty() {
            return Err(XmlDiffError::Diff(
                "cannot diff an empty forest".to_string(),
            ));
        }
        let (root1, root2) = (left.root(), right.root());
        if left.hash(root1) == right.hash(root2) {
            debug!("root hashes agree, documents are identical");
            return Ok(false);
        }
        if left.tag_name(root1) != right.tag_name(root2) {
            debug!(
                old = left.tag_name(root1),
                new = right.tag_name(root2),
                "root tag changed, whole-tree replace"
            );
            left.set_matching(root1, MatchState::NoMatch);
            right.set_matching(root2, MatchState::NoMatch);
            return Ok(true);
        }

        left.set_matching(root1, MatchState::Changed(root2));
        right.set_matching(root2, MatchState::Changed(root1));
        let mut matcher = TreeMatcher {
            left,
            right,
            config: &self.config,
            memo: MatchMemo::new(),
            rng: StdRng::seed_from_u64(self.config.seed),
        };
        matcher.match_children(root1, root2, false);
        debug!(memo_entries = matcher.memo.len(), "matching complete");
        Ok(true)
    }
}

/// One matching run: exclusive owner of both forests, the distance
/// memo, and the sampling RNG for the duration of the pass.
struct TreeMatcher<'a> {
    left: &'a mut ForestStore,
    right: &'a mut ForestStore,
    config: &'a DiffConfig,
    memo: MatchMemo,
    rng: StdRng,
}

impl TreeMatcher<'_> {
    fn estimator(&mut self) -> Estimator<'_> {
        Estimator::new(
            self.left,
            self.right,
            self.config,
            &mut self.memo,
            &mut self.rng,
        )
    }

    /// Per-parent matcher: attributes first, then content children.
    /// `reuse_memo` is set below pairs accepted by a group assignment,
    /// whose pairwise distances are already memoized.
    fn match_children(&mut self, parent1: NodeId, parent2: NodeId, reuse_memo: bool) {
        let attrs1 = self.left.attributes(parent1);
        let attrs2 = self.right.attributes(parent2);
        match (attrs1.is_empty(), attrs2.is_empty()) {
            (true, true) => {}
            (false, false) => self.match_attributes(&attrs1, &attrs2),
            (false, true) => {
                for &a in &attrs1 {
                    self.left.set_matching(a, MatchState::NoMatch);
                }
            }
            (true, false) => {
                for &a in &attrs2 {
                    self.right.set_matching(a, MatchState::NoMatch);
                }
            }
        }

        let children1 = self.left.children(parent1);
        let children2 = self.right.children(parent2);
        if children1.is_empty() && children2.is_empty() {
            return;
        }
        if children1.is_empty() {
            for &n in &children2 {
                self.right.set_matching(n, MatchState::NoMatch);
            }
            return;
        }
        if children2.is_empty() {
            for &n in &children1 {
                self.left.set_matching(n, MatchState::NoMatch);
            }
            return;
        }
        if children1.len() == 1 && children2.len() == 1 {
            self.match_singletons(children1[0], children2[0], reuse_memo);
            return;
        }

        let (texts1, elems1): (Vec<NodeId>, Vec<NodeId>) = children1
            .iter()
            .copied()
            .partition(|&n| self.left.is_text(n));
        let (texts2, elems2): (Vec<NodeId>, Vec<NodeId>) = children2
            .iter()
            .copied()
            .partition(|&n| self.right.is_text(n));

        match (texts1.is_empty(), texts2.is_empty()) {
            (true, true) => {}
            (false, false) => self.match_text(&texts1, &texts2),
            (false, true) => {
                for &t in &texts1 {
                    self.left.set_matching(t, MatchState::NoMatch);
                }
            }
            (true, false) => {
                for &t in &texts2 {
                    self.right.set_matching(t, MatchState::NoMatch);
                }
            }
        }

        let (matched1, matched2, mcount) = hash_filter(self.left, self.right, &elems1, &elems2);
        if mcount == elems1.len() && mcount == elems2.len() {
            return;
        }
        if mcount == elems1.len() {
            for (i, &n2) in elems2.iter().enumerate() {
                if !matched2[i] {
                    self.right.set_matching(n2, MatchState::NoMatch);
                }
            }
            return;
        }
        if mcount == elems2.len() {
            for (i, &n1) in elems1.iter().enumerate() {
                if !matched1[i] {
                    self.left.set_matching(n1, MatchState::NoMatch);
                }
            }
            return;
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
                    self.left.set_matching(n1, MatchState::NoMatch);
                }
                continue;
            }
            if group.left.len() == 1 && group.right.len() == 1 {
                let (n1, n2) = (group.left[0], group.right[0]);
                self.left.set_matching(n1, MatchState::Changed(n2));
                self.right.set_matching(n2, MatchState::Changed(n1));
                self.match_children(n1, n2, reuse_memo);
                continue;
            }
            let sampled = self.config.mode == MatchMode::Sampling
                && group.left.len().min(group.right.len()) > self.config.sample_count;
            if sampled {
                self.match_group_sampled(group.left, group.right, reuse_memo);
            } else {
                self.match_group_exact(&group.left, &group.right, reuse_memo);
            }
        }
        for &n2 in &leftover {
            self.right.set_matching(n2, MatchState::NoMatch);
        }
    }

    /// Exactly one content child on each side: match directly or write
    /// both off, never partial credit across kinds or tags.
    fn match_singletons(&mut self, n1: NodeId, n2: NodeId, reuse_memo: bool) {
        if self.left.hash(n1) == self.right.hash(n2) {
            return;
        }
        match (self.left.is_element(n1), self.right.is_element(n2)) {
            (true, true) if self.left.tag_name(n1) == self.right.tag_name(n2) => {
                self.left.set_matching(n1, MatchState::Changed(n2));
                self.right.set_matching(n2, MatchState::Changed(n1));
                self.match_children(n1, n2, reuse_memo);
            }
            (false, false) => {
                // A lone text run on each side is an update.
                self.left.set_matching(n1, MatchState::Changed(n2));
                self.right.set_matching(n2, MatchState::Changed(n1));
            }
            _ => {
                self.left.set_matching(n1, MatchState::NoMatch);
                self.right.set_matching(n2, MatchState::NoMatch);
            }
        }
    }

    /// Greedy attribute pairing: exact hash first, then same-name with a
    /// value update, else unmatched.
    fn match_attributes(&mut self, attrs1: &[NodeId], attrs2: &[NodeId]) {
        if attrs1.len() == 1 && attrs2.len() == 1 {
            let (a1, a2) = (attrs1[0], attrs2[0]);
            if self.left.hash(a1) == self.right.hash(a2) {
                return;
            }
            if self.left.tag_name(a1) == self.right.tag_name(a2) {
                self.pair_attribute(a1, a2);
            } else {
                self.left.set_matching(a1, MatchState::NoMatch);
                self.right.set_matching(a2, MatchState::NoMatch);
            }
            return;
        }

        let mut matched2 = vec![false; attrs2.len()];
        let mut match_count = 0;
        for &a1 in attrs1 {
            let hash1 = self.left.hash(a1);
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
                if self.left.tag_name(a1) == self.right.tag_name(a2) {
                    matched2[j] = true;
                    match_count += 1;
                    self.pair_attribute(a1, a2);
                    found = true;
                    break;
                }
            }
            if !found {
                self.left.set_matching(a1, MatchState::NoMatch);
            }
        }
        if match_count != attrs2.len() {
            for (j, &a2) in attrs2.iter().enumerate() {
                if !matched2[j] {
                    self.right.set_matching(a2, MatchState::NoMatch);
                }
            }
        }
    }

    /// Same-name attributes with differing values: pair the attribute
    /// nodes and their value texts.
    fn pair_attribute(&mut self, a1: NodeId, a2: NodeId) {
        self.left.set_matching(a1, MatchState::Changed(a2));
        self.right.set_matching(a2, MatchState::Changed(a1));
        let v1 = self.left.attribute_value_node(a1);
        let v2 = self.right.attribute_value_node(a2);
        self.left.set_matching(v1, MatchState::Changed(v2));
        self.right.set_matching(v2, MatchState::Changed(v1));
    }

    /// Identity-only text pairing: equal hashes match silently, anything
    /// else is unmatched.
    fn match_text(&mut self, texts1: &[NodeId], texts2: &[NodeId]) {
        let mut matched2 = vec![false; texts2.len()];
        for &t1 in texts1 {
            let hash1 = self.left.hash(t1);
            let mut found = false;
            for (j, &t2) in texts2.iter().enumerate() {
                if !matched2[j] && hash1 == self.right.hash(t2) {
                    matched2[j] = true;
                    found = true;
                    break;
                }
            }
            if !found {
                self.left.set_matching(t1, MatchState::NoMatch);
            }
        }
        for (j, &t2) in texts2.iter().enumerate() {
            if !matched2[j] {
                self.right.set_matching(t2, MatchState::NoMatch);
            }
        }
    }

    /// Exact assignment for one same-tag group.
    fn match_group_exact(&mut self, group1: &[NodeId], group2: &[NodeId], reuse_memo: bool) {
        let matrix = self.estimator().cost_matrix(group1, group2, reuse_memo);
        let assignment = solve(&matrix);
        trace!(
            rows = group1.len(),
            cols = group2.len(),
            cost = assignment.total_cost,
            "group assignment solved"
        );

        for (i, &n1) in group1.iter().enumerate() {
            match assignment.row_to_col[i] {
                Some(j) => {
                    let n2 = group2[j];
                    self.left.set_matching(n1, MatchState::Changed(n2));
                    self.right.set_matching(n2, MatchState::Changed(n1));
                }
                None => self.left.set_matching(n1, MatchState::NoMatch),
            }
        }
        for (j, &n2) in group2.iter().enumerate() {
            if assignment.col_to_row[j].is_none() {
                self.right.set_matching(n2, MatchState::NoMatch);
            }
        }
        for (i, &n1) in group1.iter().enumerate() {
            if let Some(j) = assignment.row_to_col[i] {
                self.match_children(n1, group2[j], true);
            }
        }
    }

    /// Sampling assignment for one same-tag group: probe random
    /// candidates from the smaller side, accept pairings under the
    /// rejection bound, then sweep the remainder against the best
    /// accepted distance. Bounded work, not guaranteed optimal.
    fn match_group_sampled(&mut self, group1: Vec<NodeId>, group2: Vec<NodeId>, reuse_memo: bool) {
        if reuse_memo {
            self.match_group_from_memo(group1, group2);
            return;
        }

        let long_is_left = group1.len() >= group2.len();
        let (mut long, mut short) = if long_is_left {
            (group1, group2)
        } else {
            (group2, group1)
        };

        // Pairs in (long, short) orientation.
        let mut pairs: Vec<(NodeId, NodeId)> = Vec::new();
        let mut rejected: Vec<NodeId> = Vec::new();
        let mut matching_threshold = 0u32;
        let mut probes = 0;
        while probes < self.config.sample_count && !short.is_empty() {
            let pick = self.rng.gen_range(0..short.len());
            let candidate = short.swap_remove(pick);
            let best = self
                .estimator()
                .best_partner(&long, candidate, long_is_left, None);
            let delete_cost = if long_is_left {
                self.right.descendant_count(candidate) + 1
            } else {
                self.left.descendant_count(candidate) + 1
            };
            match best {
                Some((slot, d))
                    if d <= 1 || (d as f64) <= self.config.reject_ratio * delete_cost as f64 =>
                {
                    let partner = long.swap_remove(slot);
                    self.estimator().record(partner, candidate, long_is_left, d);
                    pairs.push((partner, candidate));
                    probes += 1;
                    matching_threshold = matching_threshold.max(d);
                }
                _ => rejected.push(candidate),
            }
        }
        for candidate in std::mem::take(&mut short) {
            let best = self.estimator().best_partner(
                &long,
                candidate,
                long_is_left,
                Some(matching_threshold),
            );
            match best {
                Some((slot, d)) => {
                    let partner = long.swap_remove(slot);
                    self.estimator().record(partner, candidate, long_is_left, d);
                    pairs.push((partner, candidate));
                }
                None => rejected.push(candidate),
            }
        }
        trace!(
            paired = pairs.len(),
            rejected = rejected.len(),
            unmatched = long.len(),
            "group sampled"
        );

        for &(partner, candidate) in &pairs {
            let (n1, n2) = orient(partner, candidate, long_is_left);
            self.left.set_matching(n1, MatchState::Changed(n2));
            self.right.set_matching(n2, MatchState::Changed(n1));
        }
        for &n in &long {
            if long_is_left {
                self.left.set_matching(n, MatchState::NoMatch);
            } else {
                self.right.set_matching(n, MatchState::NoMatch);
            }
        }
        for &n in &rejected {
            if long_is_left {
                self.right.set_matching(n, MatchState::NoMatch);
            } else {
                self.left.set_matching(n, MatchState::NoMatch);
            }
        }
        for (partner, candidate) in pairs {
            let (n1, n2) = orient(partner, candidate, long_is_left);
            self.match_children(n1, n2, true);
        }
    }

    /// Reuse pass for sampled groups: pair greedily on memoized
    /// distances only; whatever has no recorded estimate is unmatched.
    fn match_group_from_memo(&mut self, group1: Vec<NodeId>, group2: Vec<NodeId>) {
        let mut used2 = vec![false; group2.len()];
        let mut pairs: Vec<(NodeId, NodeId)> = Vec::new();
        for &n1 in &group1 {
            let mut found = false;
            for (j, &n2) in group2.iter().enumerate() {
                if !used2[j] && self.memo.get(n1, n2).is_some() {
                    used2[j] = true;
                    pairs.push((n1, n2));
                    found = true;
                    break;
                }
            }
            if !found {
                self.left.set_matching(n1, MatchState::NoMatch);
            }
        }
        for (j, &n2) in group2.iter().enumerate() {
            if !used2[j] {
                self.right.set_matching(n2, MatchState::NoMatch);
            }
        }
        for &(n1, n2) in &pairs {
            self.left.set_matching(n1, MatchState::Changed(n2));
            self.right.set_matching(n2, MatchState::Changed(n1));
        }
        for (n1, n2) in pairs {
            self.match_children(n1, n2, true);
        }
    }
}

/// Restore (left, right) orientation of a (long, short) pair.
fn orient(partner: NodeId, candidate: NodeId, long_is_left: bool) -> (NodeId, NodeId) {
    if long_is_left {
        (partner, candidate)
    } else {
        (candidate, partner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    fn run(doc1: &str, doc2: &str) -> (ForestStore, ForestStore, bool) {
        let mut left = parse_str(doc1).unwrap();
        let mut right = parse_str(doc2).unwrap();
        let changed = DiffEngine::new().diff(&mut left, &mut right).unwrap();
        (left, right, changed)
    }

    #[test]
    fn test_identical_documents_annotate_nothing() {
        let (left, right, changed) = run("<a><b x=\"1\"/>t</a>", "<a><b x=\"1\"/>t</a>");
        assert!(!changed);
        for i in 0..left.node_count() {
            assert_eq!(left.matching(crate::forest::NodeId(i as u32)), MatchState::Unset);
        }
        for i in 0..right.node_count() {
            assert_eq!(right.matching(crate::forest::NodeId(i as u32)), MatchState::Unset);
        }
    }

    #[test]
    fn test_root_rename_is_whole_tree_replace() {
        let (left, right, changed) = run("<a><b/></a>", "<c><b/></c>");
        assert!(changed);
        assert_eq!(left.matching(left.root()), MatchState::NoMatch);
        assert_eq!(right.matching(right.root()), MatchState::NoMatch);
    }

    #[test]
    fn test_single_attribute_change() {
        let (left, right, changed) = run(r#"<a><b x="1"/></a>"#, r#"<a><b x="2"/></a>"#);
        assert!(changed);

        let b1 = left.first_child(left.root()).unwrap();
        let b2 = right.first_child(right.root()).unwrap();
        assert_eq!(left.matching(b1), MatchState::Changed(b2));

        let x1 = left.first_attribute(b1).unwrap();
        let x2 = right.first_attribute(b2).unwrap();
        assert_eq!(left.matching(x1), MatchState::Changed(x2));
        assert_eq!(right.matching(x2), MatchState::Changed(x1));

        // No structural inserts or deletes anywhere.
        for i in 0..left.node_count() {
            assert_ne!(
                left.matching(crate::forest::NodeId(i as u32)),
                MatchState::NoMatch
            );
        }
        for i in 0..right.node_count() {
            assert_ne!(
                right.matching(crate::forest::NodeId(i as u32)),
                MatchState::NoMatch
            );
        }
    }

    #[test]
    fn test_leaf_update() {
        let (left, right, _) = run("<a><b>1</b></a>", "<a><b>2</b></a>");
        let b1 = left.first_child(left.root()).unwrap();
        let b2 = right.first_child(right.root()).unwrap();
        let t1 = left.first_child(b1).unwrap();
        let t2 = right.first_child(b2).unwrap();
        assert_eq!(left.matching(t1), MatchState::Changed(t2));
        assert_eq!(right.matching(t2), MatchState::Changed(t1));
    }

    #[test]
    fn test_deletion_scenario() {
        let (left, right, _) = run("<a><b/><c/></a>", "<a><c/></a>");
        let children = left.children(left.root());
        let b = children[0];
        let c = children[1];
        assert_eq!(left.matching(b), MatchState::NoMatch);
        // <c/> survives the hash filter untouched.
        assert_eq!(left.matching(c), MatchState::Unset);
        let c2 = right.first_child(right.root()).unwrap();
        assert_eq!(right.matching(c2), MatchState::Unset);
    }

    #[test]
    fn test_sibling_insertion_scenario() {
        let (left, right, _) = run(
            r#"<a><x id="1"/></a>"#,
            r#"<a><x id="1"/><x id="2"/></a>"#,
        );
        let x1 = left.first_child(left.root()).unwrap();
        assert_eq!(left.matching(x1), MatchState::Unset);
        let twins = right.children(right.root());
        assert_eq!(right.matching(twins[0]), MatchState::Unset);
        assert_eq!(right.matching(twins[1]), MatchState::NoMatch);
    }

    #[test]
    fn test_mixed_singletons_never_pair() {
        let (left, right, _) = run("<a><b/></a>", "<a>text</a>");
        let n1 = left.first_child(left.root()).unwrap();
        let n2 = right.first_child(right.root()).unwrap();
        assert_eq!(left.matching(n1), MatchState::NoMatch);
        assert_eq!(right.matching(n2), MatchState::NoMatch);
    }

    #[test]
    fn test_group_pairing_recurses_into_best_match() {
        // Two <item> candidates; the engine must pair by content, not
        // position: the reordered twin is hash-matched, the edited one
        // paired for recursion.
        let (left, right, changed) = run(
            "<r><item><k>1</k></item><item><k>2</k></item></r>",
            "<r><item><k>2</k></item><item><k>3</k></item></r>",
        );
        assert!(changed);
        let items1 = left.children(left.root());
        let items2 = right.children(right.root());
        // <item><k>2</k></item> matches by hash on both sides.
        assert_eq!(left.matching(items1[1]), MatchState::Unset);
        assert_eq!(right.matching(items2[0]), MatchState::Unset);
        // The remaining pair is matched and its leaf updated.
        assert_eq!(left.matching(items1[0]), MatchState::Changed(items2[1]));
        let k1 = left.first_child(items1[0]).unwrap();
        let k2 = right.first_child(items2[1]).unwrap();
        assert_eq!(left.matching(k1), MatchState::Changed(k2));
        let v1 = left.first_child(k1).unwrap();
        let v2 = right.first_child(k2).unwrap();
        assert_eq!(left.matching(v1), MatchState::Changed(v2));
    }

    #[test]
    fn test_sampling_mode_pairs_cheap_candidates() {
        // Five unmatched <p> per side exceed the sample count, so the
        // sampling matcher runs; every pair is one leaf edit apart and
        // must be accepted.
        let doc = "<r><p>a</p><p>b</p><p>c</p><p>d</p><p>e</p></r>";
        let doc2 = "<r><p>v</p><p>w</p><p>x</p><p>y</p><p>z</p></r>";
        let mut left = parse_str(doc).unwrap();
        let mut right = parse_str(doc2).unwrap();
        let engine =
            DiffEngine::with_config(DiffConfig::for_mode(MatchMode::Sampling)).unwrap();
        let changed = engine.diff(&mut left, &mut right).unwrap();
        assert!(changed);
        for n in left.children(left.root()) {
            assert!(matches!(left.matching(n), MatchState::Changed(_)));
        }
        for n in right.children(right.root()) {
            assert!(matches!(right.matching(n), MatchState::Changed(_)));
        }
    }
}
