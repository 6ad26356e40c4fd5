//! promo-core: synthetic promotion economics and quantile P&L forecasting.
//!
//! Pipeline: ScenarioGenerator → ScenarioDataset → FeatureFrame →
//! QuantileEnsemble (fit → deploy → save) → QuantilePredictions →
//! RiskInterpreter.

pub mod artifact;
pub mod config;
pub mod dataset;
pub mod ensemble;
pub mod error;
pub mod evaluation;
pub mod gbdt;
pub mod lifecycle;
pub mod risk;
pub mod rng;
pub mod scenario;
pub mod store;
pub mod types;

pub use config::{EnsembleConfig, PromoConfig, SimulatorConfig};
pub use dataset::{FeatureFrame, ScenarioDataset, ScenarioRecord};
pub use ensemble::{QuantileEnsemble, QuantilePredictions};
pub use error::{PromoError, PromoResult};
pub use lifecycle::ModelStatus;
pub use scenario::ScenarioGenerator;
