//! Shared primitive types used across the crate.

/// Opaque tenant identifier. One client owns many models.
pub type ClientId = String;

/// Identifier of a generated or imported dataset, e.g. `sim_v1_4000`.
pub type DatasetVersion = String;

/// Generated identifier of a single fitted model instance.
pub type ModelId = String;

/// A quantile level α, strictly inside (0, 1).
pub type QuantileLevel = f64;

/// Name of the realized outcome column in every scenario table.
pub const TARGET_COLUMN: &str = "actual_profit_loss";
