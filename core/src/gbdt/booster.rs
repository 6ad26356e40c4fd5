//! Stochastic gradient boosting with the quantile loss.
//!
//! Stage m:
//!   1. draw ⌊subsample·n⌋ in-bag rows without replacement
//!   2. negative gradient g = α if y > ŷ, else α − 1
//!   3. fit a regression tree to g on the in-bag rows
//!   4. reset each leaf to the α-quantile of in-bag residuals y − ŷ
//!   5. ŷ += learning_rate · tree(x) for every row

use super::{
    quantile_in_place,
    tree::{GrownTree, RegressionTree, TreeBuilder},
    QuantileRegressor,
};
use crate::{
    dataset::FeatureFrame,
    error::{PromoError, PromoResult},
    evaluation::pinball_loss,
    rng::{StreamRng, StreamSlot},
    types::QuantileLevel,
};
use serde::{Deserialize, Serialize};

const LOG_EVERY_STAGES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedQuantile {
    alpha: QuantileLevel,
    params: BoostingParams,
    init: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedQuantile {
    pub fn new(alpha: QuantileLevel, params: BoostingParams) -> Self {
        Self {
            alpha,
            params,
            init: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn init_value(&self) -> f64 {
        self.init
    }

    /// Reject a deserialized model whose trees cannot be evaluated on
    /// frames with `n_features` columns.
    pub fn validate(&self, n_features: usize) -> PromoResult<()> {
        if self.trees.is_empty() {
            return Err(PromoError::invalid_input(format!(
                "quantile {} model has no trees",
                self.alpha
            )));
        }
        if !self.init.is_finite() {
            return Err(PromoError::invalid_input(format!(
                "quantile {} model has a non-finite initial value",
                self.alpha
            )));
        }
        for (stage, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features).map_err(|e| match e {
                PromoError::InvalidInput(msg) => {
                    PromoError::invalid_input(format!("quantile {} tree {stage}: {msg}", self.alpha))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    fn validate_training_input(&self, features: &FeatureFrame, targets: &[f64]) -> PromoResult<()> {
        if features.n_rows() == 0 {
            return Err(PromoError::invalid_input("cannot fit on an empty frame"));
        }
        if features.n_rows() != targets.len() {
            return Err(PromoError::invalid_input(format!(
                "features have {} rows but target has {}",
                features.n_rows(),
                targets.len()
            )));
        }
        if features.n_cols() == 0 {
            return Err(PromoError::invalid_input("at least one feature column is required"));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(PromoError::invalid_input("target contains a non-finite value"));
        }
        Ok(())
    }
}

impl QuantileRegressor for GradientBoostedQuantile {
    fn alpha(&self) -> QuantileLevel {
        self.alpha
    }

    fn fit(&mut self, features: &FeatureFrame, targets: &[f64]) -> PromoResult<()> {
        self.validate_training_input(features, targets)?;
        let n = features.n_rows();
        let alpha = self.alpha;
        let lr = self.params.learning_rate;

        // Sort once; each stage filters these orders to its in-bag rows.
        let sorted: Vec<Vec<usize>> = (0..features.n_cols())
            .map(|f| {
                let col = features.column_at(f);
                let mut idx: Vec<usize> = (0..n).collect();
                idx.sort_by(|&a, &b| col[a].total_cmp(&col[b]).then(a.cmp(&b)));
                idx
            })
            .collect();

        let init = quantile_in_place(&mut targets.to_vec(), alpha);
        let mut raw = vec![init; n];
        let mut gradient = vec![0.0; n];
        let mut in_bag = vec![false; n];
        let n_in_bag = ((self.params.subsample * n as f64) as usize).clamp(1, n);

        let mut rng = StreamRng::for_slot(self.params.seed, StreamSlot::Boosting);
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for stage in 0..self.params.n_estimators {
            if n_in_bag == n {
                in_bag.fill(true);
            } else {
                in_bag.fill(false);
                for r in rng.sample_without_replacement(n, n_in_bag) {
                    in_bag[r] = true;
                }
            }

            for r in 0..n {
                gradient[r] = if targets[r] > raw[r] { alpha } else { alpha - 1.0 };
            }

            let orders: Vec<Vec<usize>> = sorted
                .iter()
                .map(|o| o.iter().copied().filter(|&r| in_bag[r]).collect())
                .collect();

            let GrownTree { mut tree, leaves } =
                TreeBuilder::new(features, &gradient, self.params.max_depth).build(orders);

            for (node, rows) in leaves {
                let mut residuals: Vec<f64> = rows.iter().map(|&r| targets[r] - raw[r]).collect();
                tree.set_leaf_value(node, quantile_in_place(&mut residuals, alpha));
            }

            for (r, value) in raw.iter_mut().enumerate() {
                *value += lr * tree.predict_row(features, r);
            }
            trees.push(tree);

            if (stage + 1) % LOG_EVERY_STAGES == 0 {
                log::debug!(
                    "gbdt alpha={alpha}: stage {}/{} train_pinball={:.2}",
                    stage + 1,
                    self.params.n_estimators,
                    pinball_loss(targets, &raw, alpha).unwrap_or(f64::NAN)
                );
            }
        }

        self.init = init;
        self.trees = trees;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn predict(&self, features: &FeatureFrame) -> Vec<f64> {
        let lr = self.params.learning_rate;
        (0..features.n_rows())
            .map(|r| {
                let mut value = self.init;
                for tree in &self.trees {
                    value += lr * tree.predict_row(features, r);
                }
                value
            })
            .collect()
    }
}
