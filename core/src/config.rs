//! Configuration for the scenario generator and the quantile ensemble.
//!
//! Values load from JSON files under the data directory. `Default`
//! carries the same values so tests never touch the filesystem.

use crate::{
    dataset::CustomerSegment,
    error::{PromoError, PromoResult},
};
use serde::{Deserialize, Serialize};

/// Clipped normal driver: N(mean, std_dev) clamped to [min, max].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalDriver {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Clipped normal driver whose mean shifts linearly with another draw:
/// N(base_mean + slope * x, std_dev) clamped to [min, max].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentDriver {
    pub base_mean: f64,
    pub slope: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentWeight {
    pub segment: CustomerSegment,
    pub probability: f64,
}

/// Coefficients of the profit formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicsParams {
    // Demand
    pub elasticity_ceiling: f64,
    pub elasticity_scale: f64,
    pub elasticity_noise_std: f64,
    pub inventory_overflow: f64,
    // Costs
    pub return_cost_factor: f64,
    pub holding_cost_rate: f64,
    pub support_cost_per_ticket: f64,
    pub hidden_cost_share: f64,
    // Nonlinear adjustments
    pub habituation_exponent: f64,
    pub habituation_rate: f64,
    pub reference_window_days: f64,
    pub competition_rate: f64,
    pub competitor_reference: f64,
    pub premium_bonus_rate: f64,
    pub premium_discount_threshold: f64,
    // Noise
    pub market_noise_base: f64,
    pub market_noise_per_discount: f64,
    pub market_noise_per_competitor: f64,
    pub execution_noise_base: f64,
    pub execution_noise_per_discount: f64,
}

impl Default for EconomicsParams {
    fn default() -> Self {
        Self {
            elasticity_ceiling: 1.1,
            elasticity_scale: 35.0,
            elasticity_noise_std: 0.15,
            inventory_overflow: 1.2,
            return_cost_factor: 1.1,
            holding_cost_rate: 0.03,
            support_cost_per_ticket: 300.0,
            hidden_cost_share: 0.02,
            habituation_exponent: 1.4,
            habituation_rate: 0.05,
            reference_window_days: 30.0,
            competition_rate: 0.06,
            competitor_reference: 10.0,
            premium_bonus_rate: 0.04,
            premium_discount_threshold: 20.0,
            market_noise_base: 9000.0,
            market_noise_per_discount: 120.0,
            market_noise_per_competitor: 800.0,
            execution_noise_base: 12000.0,
            execution_noise_per_discount: 80.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub simulator_version: String,
    pub discount: NormalDriver,
    pub velocity: DependentDriver,
    pub return_rate: DependentDriver,
    pub inventory: NormalDriver,
    pub price: NormalDriver,
    pub support: DependentDriver,
    pub duration_days: Vec<u32>,
    /// Competitor activity is drawn uniformly from 0..=competitor_max.
    pub competitor_max: u32,
    pub segments: Vec<SegmentWeight>,
    pub margin_min: f64,
    pub margin_max: f64,
    pub hidden_cost_log_mean: f64,
    pub hidden_cost_log_sigma: f64,
    pub economics: EconomicsParams,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            simulator_version: "v1".into(),
            discount: NormalDriver { mean: 30.0, std_dev: 12.0, min: 5.0, max: 70.0 },
            velocity: DependentDriver {
                base_mean: 40.0,
                slope: 0.8,
                std_dev: 25.0,
                min: 1.0,
                max: 200.0,
            },
            return_rate: DependentDriver {
                base_mean: 0.12,
                slope: 0.002,
                std_dev: 0.05,
                min: 0.01,
                max: 0.5,
            },
            inventory: NormalDriver { mean: 600.0, std_dev: 400.0, min: 10.0, max: 10_000.0 },
            price: NormalDriver { mean: 25_000.0, std_dev: 18_000.0, min: 500.0, max: 100_000.0 },
            support: DependentDriver {
                base_mean: 0.07,
                slope: 0.3,
                std_dev: 0.03,
                min: 0.01,
                max: 0.3,
            },
            duration_days: vec![1, 3, 7, 14, 21, 30],
            competitor_max: 10,
            segments: vec![
                SegmentWeight { segment: CustomerSegment::Premium, probability: 0.3 },
                SegmentWeight { segment: CustomerSegment::Value, probability: 0.5 },
                SegmentWeight { segment: CustomerSegment::Bargain, probability: 0.2 },
            ],
            margin_min: 20.0,
            margin_max: 60.0,
            hidden_cost_log_mean: 7.0,
            hidden_cost_log_sigma: 0.5,
            economics: EconomicsParams::default(),
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> PromoResult<()> {
        check_range("discount", self.discount.min, self.discount.max, self.discount.std_dev)?;
        check_range("inventory", self.inventory.min, self.inventory.max, self.inventory.std_dev)?;
        check_range("price", self.price.min, self.price.max, self.price.std_dev)?;
        check_range("velocity", self.velocity.min, self.velocity.max, self.velocity.std_dev)?;
        check_range(
            "return_rate",
            self.return_rate.min,
            self.return_rate.max,
            self.return_rate.std_dev,
        )?;
        check_range("support", self.support.min, self.support.max, self.support.std_dev)?;
        check_range("margin", self.margin_min, self.margin_max, 0.0)?;
        if self.hidden_cost_log_sigma < 0.0 {
            return Err(PromoError::invalid_input("hidden_cost_log_sigma must be >= 0"));
        }
        if self.duration_days.is_empty() {
            return Err(PromoError::invalid_input("duration_days must not be empty"));
        }
        if self.segments.is_empty() {
            return Err(PromoError::invalid_input("segments must not be empty"));
        }
        if self.segments.iter().any(|s| s.probability < 0.0) {
            return Err(PromoError::invalid_input("segment probabilities must be >= 0"));
        }
        let total: f64 = self.segments.iter().map(|s| s.probability).sum();
        if (total - 1.0).abs() > 1e-9 {
            return Err(PromoError::invalid_input(format!(
                "segment probabilities sum to {total}, expected 1"
            )));
        }
        if self.economics.elasticity_scale <= 0.0 || self.economics.reference_window_days <= 0.0 {
            return Err(PromoError::invalid_input(
                "elasticity_scale and reference_window_days must be > 0",
            ));
        }
        if self.economics.competitor_reference <= 0.0 {
            return Err(PromoError::invalid_input("competitor_reference must be > 0"));
        }
        Ok(())
    }
}

fn check_range(name: &str, min: f64, max: f64, std_dev: f64) -> PromoResult<()> {
    if !(min.is_finite() && max.is_finite()) || min > max {
        return Err(PromoError::invalid_input(format!(
            "{name}: range [{min}, {max}] is invalid"
        )));
    }
    if !(std_dev >= 0.0) {
        return Err(PromoError::invalid_input(format!(
            "{name}: std_dev {std_dev} must be >= 0"
        )));
    }
    Ok(())
}

/// Hyperparameters shared by every quantile sub-model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub quantiles: Vec<f64>,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    /// One seed for every quantile sub-model. See ensemble.rs.
    pub random_state: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            quantiles: vec![0.10, 0.50, 0.90],
            n_estimators: 200,
            max_depth: 5,
            learning_rate: 0.05,
            subsample: 0.8,
            random_state: 42,
        }
    }
}

impl EnsembleConfig {
    /// Small ensemble for fast tests.
    pub fn default_test() -> Self {
        Self {
            n_estimators: 30,
            max_depth: 3,
            learning_rate: 0.1,
            ..Self::default()
        }
    }

    /// Validate hyperparameters and return the quantile levels
    /// deduplicated and sorted ascending.
    pub fn normalized_quantiles(&self) -> PromoResult<Vec<f64>> {
        if self.n_estimators == 0 {
            return Err(PromoError::invalid_input("n_estimators must be >= 1"));
        }
        if self.max_depth == 0 {
            return Err(PromoError::invalid_input("max_depth must be >= 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PromoError::invalid_input("learning_rate must be > 0"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(PromoError::invalid_input("subsample must be in (0, 1]"));
        }
        if self.quantiles.is_empty() {
            return Err(PromoError::invalid_input("at least one quantile level is required"));
        }
        if let Some(bad) = self.quantiles.iter().find(|q| !(**q > 0.0 && **q < 1.0)) {
            return Err(PromoError::invalid_input(format!(
                "quantile level {bad} must be strictly inside (0, 1)"
            )));
        }
        let mut levels = self.quantiles.clone();
        levels.sort_by(f64::total_cmp);
        levels.dedup();
        Ok(levels)
    }
}

/// Everything the training runner reads from the data directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromoConfig {
    pub simulator: SimulatorConfig,
    pub ensemble: EnsembleConfig,
}

impl PromoConfig {
    /// Load from the data/ directory.
    /// In tests, use PromoConfig::default().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let sim_path = format!("{data_dir}/simulator/v1_formula.json");
        let sim_content = std::fs::read_to_string(&sim_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {sim_path}: {e}"))?;
        let simulator: SimulatorConfig = serde_json::from_str(&sim_content)?;
        simulator.validate()?;

        let ens_path = format!("{data_dir}/models/quantile_ensemble.json");
        let ens_content = std::fs::read_to_string(&ens_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {ens_path}: {e}"))?;
        let ensemble: EnsembleConfig = serde_json::from_str(&ens_content)?;
        ensemble.normalized_quantiles()?;

        Ok(Self { simulator, ensemble })
    }
}
