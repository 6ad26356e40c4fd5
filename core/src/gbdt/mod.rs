//! Gradient-boosted regression trees with the quantile (pinball) loss.
//!
//! One `GradientBoostedQuantile` estimates a single conditional
//! quantile. The ensemble holds one per requested level; nothing here
//! knows about other levels, so predictions from different levels may
//! cross.
//!
//! # Model format
//!
//! Trees are flat node arrays. Node 0 is the root; split nodes send a
//! row left when `x[feature] <= threshold`.
//!
//! ```json
//! {
//!   "alpha": 0.5,
//!   "params": { "n_estimators": 2, "max_depth": 1, "learning_rate": 0.1, "subsample": 1.0, "seed": 42 },
//!   "init": 1250.0,
//!   "trees": [
//!     { "nodes": [
//!         { "kind": "split", "feature": 0, "threshold": 30.5, "left": 1, "right": 2 },
//!         { "kind": "leaf", "value": -400.0 },
//!         { "kind": "leaf", "value": 900.0 }
//!     ] }
//!   ]
//! }
//! ```

pub mod booster;
pub mod tree;

pub use booster::{BoostingParams, GradientBoostedQuantile};
pub use tree::{Node, RegressionTree};

use crate::{dataset::FeatureFrame, error::PromoResult, types::QuantileLevel};

/// A trainable scalar regressor for one quantile level.
pub trait QuantileRegressor {
    /// The quantile level this regressor estimates.
    fn alpha(&self) -> QuantileLevel;

    fn fit(&mut self, features: &FeatureFrame, targets: &[f64]) -> PromoResult<()>;

    fn is_fitted(&self) -> bool;

    /// One prediction per row of `features`, in row order.
    fn predict(&self, features: &FeatureFrame) -> Vec<f64>;
}

/// α-quantile of `values` with linear interpolation between order
/// statistics. Sorts `values` in place. Returns 0.0 for empty input.
pub fn quantile_in_place(values: &mut [f64], alpha: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let pos = alpha.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    values[lo] + (values[hi] - values[lo]) * frac
}
