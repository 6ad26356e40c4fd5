//! Regression tree: flat node storage, greedy exact split search.

use crate::{
    dataset::FeatureFrame,
    error::{PromoError, PromoResult},
};
use serde::{Deserialize, Serialize};

/// Gains at or below this are treated as no improvement.
const MIN_SPLIT_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Build a tree from an explicit node list. Node 0 is the root.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Check the structure of a tree that did not come from the builder.
    /// Children must sit after their parent, which rules out cycles, and
    /// every split must read a column below `n_features`.
    pub fn validate(&self, n_features: usize) -> PromoResult<()> {
        if self.nodes.is_empty() {
            return Err(PromoError::invalid_input("tree has no nodes"));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            let Node::Split { feature, threshold, left, right } = node else {
                continue;
            };
            if *feature >= n_features {
                return Err(PromoError::invalid_input(format!(
                    "node {idx} splits on feature {feature} but only {n_features} exist"
                )));
            }
            if threshold.is_nan() {
                return Err(PromoError::invalid_input(format!("node {idx} has a NaN threshold")));
            }
            for child in [*left, *right] {
                if child <= idx || child >= self.nodes.len() {
                    return Err(PromoError::invalid_input(format!(
                        "node {idx} points to child {child} outside {}..{}",
                        idx + 1,
                        self.nodes.len()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    /// Longest root-to-leaf path, counted in splits.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Index of the leaf that `row` of `frame` falls into.
    pub fn leaf_index(&self, frame: &FeatureFrame, row: usize) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split { feature, threshold, left, right } => {
                    idx = if frame.value(row, *feature) <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn predict_row(&self, frame: &FeatureFrame, row: usize) -> f64 {
        match &self.nodes[self.leaf_index(frame, row)] {
            Node::Leaf { value } => *value,
            Node::Split { .. } => unreachable!("leaf_index always stops on a leaf"),
        }
    }

    pub(crate) fn set_leaf_value(&mut self, idx: usize, new_value: f64) {
        if let Node::Leaf { value } = &mut self.nodes[idx] {
            *value = new_value;
        }
    }
}

/// A freshly grown tree plus the rows that landed in each leaf.
pub(crate) struct GrownTree {
    pub tree: RegressionTree,
    pub leaves: Vec<(usize, Vec<usize>)>,
}

struct Split {
    feature: usize,
    threshold: f64,
    n_left: usize,
    gain: f64,
}

/// Grows one tree on `targets` (indexed by frame row) with squared
/// error and the Friedman improvement score nl·nr/n·(ȳl − ȳr)².
pub(crate) struct TreeBuilder<'a> {
    frame: &'a FeatureFrame,
    targets: &'a [f64],
    max_depth: usize,
    nodes: Vec<Node>,
    leaves: Vec<(usize, Vec<usize>)>,
    goes_left: Vec<bool>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(frame: &'a FeatureFrame, targets: &'a [f64], max_depth: usize) -> Self {
        Self {
            frame,
            targets,
            max_depth,
            nodes: Vec::new(),
            leaves: Vec::new(),
            goes_left: vec![false; frame.n_rows()],
        }
    }

    /// `orders[f]` holds the participating rows sorted ascending by
    /// feature `f`. Every order must contain the same row set.
    pub fn build(mut self, orders: Vec<Vec<usize>>) -> GrownTree {
        debug_assert_eq!(orders.len(), self.frame.n_cols());
        self.grow(orders, 0);
        GrownTree {
            tree: RegressionTree { nodes: self.nodes },
            leaves: self.leaves,
        }
    }

    fn grow(&mut self, mut orders: Vec<Vec<usize>>, depth: usize) -> usize {
        let idx = self.nodes.len();
        let members = &orders[0];
        let n = members.len();
        let total: f64 = members.iter().map(|&r| self.targets[r]).sum();
        let mean = if n > 0 { total / n as f64 } else { 0.0 };
        self.nodes.push(Node::Leaf { value: mean });

        let split = if depth >= self.max_depth || n < 2 || self.is_pure(members) {
            None
        } else {
            self.best_split(&orders, total)
        };

        let Some(split) = split else {
            self.leaves.push((idx, orders.swap_remove(0)));
            return idx;
        };

        let chosen = &orders[split.feature];
        for &r in &chosen[..split.n_left] {
            self.goes_left[r] = true;
        }
        for &r in &chosen[split.n_left..] {
            self.goes_left[r] = false;
        }

        let mut left_orders = Vec::with_capacity(orders.len());
        let mut right_orders = Vec::with_capacity(orders.len());
        for order in orders {
            let (l, r): (Vec<usize>, Vec<usize>) =
                order.into_iter().partition(|&row| self.goes_left[row]);
            left_orders.push(l);
            right_orders.push(r);
        }

        let left = self.grow(left_orders, depth + 1);
        let right = self.grow(right_orders, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn is_pure(&self, members: &[usize]) -> bool {
        let first = self.targets[members[0]];
        members.iter().all(|&r| self.targets[r] == first)
    }

    fn best_split(&self, orders: &[Vec<usize>], total: f64) -> Option<Split> {
        let n = orders[0].len();
        let nf = n as f64;
        let mut best: Option<Split> = None;

        for (feature, order) in orders.iter().enumerate() {
            let col = self.frame.column_at(feature);
            let mut left_sum = 0.0;
            for i in 0..n - 1 {
                left_sum += self.targets[order[i]];
                let x = col[order[i]];
                let x_next = col[order[i + 1]];
                if x_next <= x {
                    continue;
                }
                let nl = (i + 1) as f64;
                let nr = nf - nl;
                let diff = left_sum / nl - (total - left_sum) / nr;
                let gain = nl * nr * diff * diff / nf;
                let bar = best.as_ref().map_or(MIN_SPLIT_GAIN, |b| b.gain);
                if gain > bar {
                    best = Some(Split {
                        feature,
                        threshold: midpoint(x, x_next),
                        n_left: i + 1,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Split point strictly below `hi` so the left side is exactly {x <= lo}.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid < hi {
        mid
    } else {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(xs: &[f64]) -> FeatureFrame {
        FeatureFrame::from_columns(vec!["x".into()], vec![xs.to_vec()]).unwrap()
    }

    fn sorted_rows(xs: &[f64]) -> Vec<Vec<usize>> {
        let mut idx: Vec<usize> = (0..xs.len()).collect();
        idx.sort_by(|&a, &b| xs[a].total_cmp(&xs[b]));
        vec![idx]
    }

    #[test]
    fn finds_the_step() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ys = [0.0, 0.0, 0.0, 10.0, 10.0, 10.0];
        let f = frame(&xs);
        let grown = TreeBuilder::new(&f, &ys, 3).build(sorted_rows(&xs));
        match &grown.tree.nodes()[0] {
            Node::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 3.5);
            }
            other => panic!("expected split at root, got {other:?}"),
        }
        // both children are pure, so growth stops at depth 1
        assert_eq!(grown.tree.depth(), 1);
        assert_eq!(grown.leaves.len(), 2);
        assert_eq!(grown.tree.predict_row(&f, 0), 0.0);
        assert_eq!(grown.tree.predict_row(&f, 5), 10.0);
    }

    #[test]
    fn respects_max_depth() {
        let xs: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let ys: Vec<f64> = (0..64).map(|i| ((i * 7) % 11) as f64).collect();
        let f = frame(&xs);
        let grown = TreeBuilder::new(&f, &ys, 2).build(sorted_rows(&xs));
        assert!(grown.tree.depth() <= 2);
        assert!(grown.tree.n_leaves() <= 4);
        let covered: usize = grown.leaves.iter().map(|(_, rows)| rows.len()).sum();
        assert_eq!(covered, 64);
    }

    #[test]
    fn constant_feature_yields_single_leaf() {
        let xs = [2.0; 5];
        let ys = [1.0, 2.0, 3.0, 4.0, 5.0];
        let f = frame(&xs);
        let grown = TreeBuilder::new(&f, &ys, 4).build(sorted_rows(&xs));
        assert_eq!(grown.tree.nodes().len(), 1);
        assert_eq!(grown.tree.predict_row(&f, 0), 3.0);
    }

    #[test]
    fn midpoint_never_reaches_upper_value() {
        let lo: f64 = 1.0;
        let hi = f64::from_bits(lo.to_bits() + 1);
        assert_eq!(midpoint(lo, hi), lo);
        assert_eq!(midpoint(2.0, 4.0), 3.0);
    }

    #[test]
    fn grown_trees_pass_validation() {
        let xs: Vec<f64> = (0..32).map(|i| i as f64).collect();
        let ys: Vec<f64> = (0..32).map(|i| ((i * 5) % 9) as f64).collect();
        let f = frame(&xs);
        let grown = TreeBuilder::new(&f, &ys, 3).build(sorted_rows(&xs));
        assert!(grown.tree.validate(1).is_ok());
    }

    #[test]
    fn malformed_trees_rejected() {
        let leaf = || Node::Leaf { value: 1.0 };
        let split = |feature, left, right| Node::Split { feature, threshold: 0.5, left, right };

        let cases = [
            RegressionTree::from_nodes(vec![]),
            // feature out of range
            RegressionTree::from_nodes(vec![split(3, 1, 2), leaf(), leaf()]),
            // child past the end
            RegressionTree::from_nodes(vec![split(0, 1, 7), leaf(), leaf()]),
            // self loop
            RegressionTree::from_nodes(vec![split(0, 0, 1), leaf()]),
            // back edge to an ancestor
            RegressionTree::from_nodes(vec![split(0, 1, 2), split(0, 0, 2), leaf()]),
        ];
        for tree in cases {
            assert!(
                matches!(tree.validate(2), Err(PromoError::InvalidInput(_))),
                "accepted {:?}",
                tree.nodes()
            );
        }
    }
}
