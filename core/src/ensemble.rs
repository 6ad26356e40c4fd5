//! Quantile ensemble: one gradient-boosted regressor per quantile level,
//! scoped to a client and a simulator version.
//!
//! RULES:
//!   - The feature list captured by fit() is the schema. predict()
//!     accepts only frames with exactly those columns in that order.
//!   - Quantile levels are fixed at construction.
//!   - Every sub-model is trained with the SAME seed
//!     (EnsembleConfig::random_state). Levels therefore see identical
//!     subsample draws stage by stage. Do not derive per-level seeds
//!     without bumping the artifact format: it changes every model.
//!   - Levels are fit independently, so predictions may cross
//!     (p90 < p50 on some rows). Nothing here reorders them.

use crate::{
    artifact::{ModelArtifact, ARTIFACT_FORMAT_VERSION},
    config::EnsembleConfig,
    dataset::FeatureFrame,
    error::{PromoError, PromoResult},
    gbdt::{BoostingParams, GradientBoostedQuantile, QuantileRegressor},
    lifecycle::{LifecycleAction, ModelStatus},
    risk::{PredictionBand, RiskAssessment, RiskInterpreter},
    types::{ClientId, DatasetVersion, ModelId, QuantileLevel},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub client_id: ClientId,
    pub trained_at: DateTime<Utc>,
    pub data_version: Option<DatasetVersion>,
    pub data_source: String,
    pub n_samples: usize,
    pub n_features: usize,
    pub feature_names: Vec<String>,
    pub target_mean: f64,
    /// Sample standard deviation (n − 1); 0.0 below two samples.
    pub target_std: f64,
    pub simulator_version: String,
}

/// Dataset the model was trained against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub data_version: Option<DatasetVersion>,
    pub data_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileModel {
    pub level: QuantileLevel,
    pub regressor: GradientBoostedQuantile,
}

/// Human-readable key for a level: 0.10 → "p10", 0.025 → "p2.5".
pub fn quantile_label(level: QuantileLevel) -> String {
    let pct = format!("{:.4}", level * 100.0);
    let pct = pct.trim_end_matches('0').trim_end_matches('.');
    format!("p{pct}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantileSeries {
    pub level: QuantileLevel,
    pub label: String,
    pub values: Vec<f64>,
}

/// Per-level predictions, ascending by level, each aligned with the
/// input rows.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantilePredictions {
    series: Vec<QuantileSeries>,
    n_rows: usize,
}

impl QuantilePredictions {
    pub fn get(&self, label: &str) -> Option<&[f64]> {
        self.series
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuantileSeries> {
        self.series.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.label.as_str()).collect()
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Lowest level, level nearest 0.5 and highest level for `row`.
    pub fn band(&self, row: usize) -> Option<PredictionBand> {
        if row >= self.n_rows {
            return None;
        }
        let low = self.series.first()?;
        let high = self.series.last()?;
        let median = self
            .series
            .iter()
            .min_by(|a, b| (a.level - 0.5).abs().total_cmp(&(b.level - 0.5).abs()))?;
        Some(PredictionBand::new(low.values[row], median.values[row], high.values[row]))
    }

    /// Share of rows where some higher level predicts below a lower one.
    pub fn crossing_share(&self) -> f64 {
        if self.n_rows == 0 {
            return 0.0;
        }
        let crossed = (0..self.n_rows)
            .filter(|&r| self.series.windows(2).any(|w| w[1].values[r] < w[0].values[r]))
            .count();
        crossed as f64 / self.n_rows as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantileEnsemble {
    model_id: ModelId,
    client_id: ClientId,
    simulator_version: String,
    config: EnsembleConfig,
    quantiles: Vec<QuantileLevel>,
    models: Vec<QuantileModel>,
    feature_names: Option<Vec<String>>,
    status: ModelStatus,
    deployed_at: Option<DateTime<Utc>>,
    retired_at: Option<DateTime<Utc>>,
    provenance: Provenance,
    training_metadata: Option<TrainingMetadata>,
}

impl QuantileEnsemble {
    pub fn new(
        client_id: impl Into<ClientId>,
        simulator_version: impl Into<String>,
        config: EnsembleConfig,
    ) -> PromoResult<Self> {
        let quantiles = config.normalized_quantiles()?;
        let labels: Vec<String> = quantiles.iter().map(|q| quantile_label(*q)).collect();
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(PromoError::invalid_input(format!(
                    "quantile levels collide on label '{label}'"
                )));
            }
        }
        Ok(Self {
            model_id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            simulator_version: simulator_version.into(),
            config,
            quantiles,
            models: Vec::new(),
            feature_names: None,
            status: ModelStatus::Training,
            deployed_at: None,
            retired_at: None,
            provenance: Provenance::default(),
            training_metadata: None,
        })
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn simulator_version(&self) -> &str {
        &self.simulator_version
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn quantiles(&self) -> &[QuantileLevel] {
        &self.quantiles
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    pub fn deployed_at(&self) -> Option<DateTime<Utc>> {
        self.deployed_at
    }

    pub fn retired_at(&self) -> Option<DateTime<Utc>> {
        self.retired_at
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn training_metadata(&self) -> Option<&TrainingMetadata> {
        self.training_metadata.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.feature_names.is_some() && !self.models.is_empty()
    }

    /// Feature schema captured at fit time.
    pub fn feature_names(&self) -> PromoResult<&[String]> {
        self.feature_names.as_deref().ok_or(PromoError::NotFitted)
    }

    // ── Training ───────────────────────────────────────────────

    pub fn fit(
        &mut self,
        features: &FeatureFrame,
        target: &[f64],
        data_version: Option<&str>,
        data_source: &str,
    ) -> PromoResult<()> {
        if features.n_rows() == 0 || target.is_empty() {
            return Err(PromoError::invalid_input("cannot fit on empty input"));
        }
        if features.n_rows() != target.len() {
            return Err(PromoError::invalid_input(format!(
                "features have {} rows but target has {}",
                features.n_rows(),
                target.len()
            )));
        }
        if features.n_cols() == 0 {
            return Err(PromoError::invalid_input("at least one feature column is required"));
        }
        let next_status = self.status.transition(LifecycleAction::CompleteFit)?;

        log::info!(
            "ensemble {}: training client={} quantiles={:?} samples={} features={}",
            self.model_id,
            self.client_id,
            self.quantiles,
            features.n_rows(),
            features.n_cols()
        );

        let params = BoostingParams {
            n_estimators: self.config.n_estimators,
            max_depth: self.config.max_depth,
            learning_rate: self.config.learning_rate,
            subsample: self.config.subsample,
            seed: self.config.random_state,
        };

        let mut models = Vec::with_capacity(self.quantiles.len());
        for &level in &self.quantiles {
            let mut regressor = GradientBoostedQuantile::new(level, params.clone());
            regressor.fit(features, target)?;
            log::info!("ensemble {}: trained quantile {level}", self.model_id);
            models.push(QuantileModel { level, regressor });
        }

        let feature_names = features.column_names().to_vec();
        let (target_mean, target_std) = mean_and_sample_std(target);

        self.training_metadata = Some(TrainingMetadata {
            client_id: self.client_id.clone(),
            trained_at: Utc::now(),
            data_version: data_version.map(String::from),
            data_source: data_source.to_string(),
            n_samples: features.n_rows(),
            n_features: features.n_cols(),
            feature_names: feature_names.clone(),
            target_mean,
            target_std,
            simulator_version: self.simulator_version.clone(),
        });
        self.provenance = Provenance {
            data_version: data_version.map(String::from),
            data_source: Some(data_source.to_string()),
        };
        self.models = models;
        self.feature_names = Some(feature_names);
        self.status = next_status;
        Ok(())
    }

    // ── Inference ──────────────────────────────────────────────

    pub fn predict(&self, features: &FeatureFrame) -> PromoResult<QuantilePredictions> {
        let expected = self.feature_names.as_ref().ok_or(PromoError::NotFitted)?;
        if self.models.is_empty() {
            return Err(PromoError::NotFitted);
        }
        if features.column_names() != expected.as_slice() {
            return Err(PromoError::SchemaMismatch {
                expected: expected.clone(),
                actual: features.column_names().to_vec(),
            });
        }

        let series = self
            .models
            .iter()
            .map(|m| QuantileSeries {
                level: m.level,
                label: quantile_label(m.level),
                values: m.regressor.predict(features),
            })
            .collect();
        Ok(QuantilePredictions {
            series,
            n_rows: features.n_rows(),
        })
    }

    /// Predict and interpret every row's band.
    pub fn assess_risk(
        &self,
        features: &FeatureFrame,
        interpreter: &dyn RiskInterpreter,
    ) -> PromoResult<Vec<RiskAssessment>> {
        let predictions = self.predict(features)?;
        Ok((0..predictions.n_rows())
            .filter_map(|row| predictions.band(row))
            .map(|band| interpreter.classify_band(&band))
            .collect())
    }

    // ── Lifecycle ──────────────────────────────────────────────

    pub fn deploy(&mut self) -> PromoResult<()> {
        self.status = self.status.transition(LifecycleAction::Deploy)?;
        self.deployed_at = Some(Utc::now());
        log::info!("ensemble {}: deployed for client={}", self.model_id, self.client_id);
        Ok(())
    }

    pub fn retire(&mut self) {
        self.status = match self.status.transition(LifecycleAction::Retire) {
            Ok(next) => next,
            // retire is legal from every status
            Err(_) => ModelStatus::Retired,
        };
        self.retired_at = Some(Utc::now());
        log::info!("ensemble {}: retired", self.model_id);
    }

    // ── Persistence ────────────────────────────────────────────

    pub fn save(&self, path: impl AsRef<Path>) -> PromoResult<()> {
        let path = path.as_ref();
        let artifact = self.to_artifact()?;
        artifact.write(path)?;
        log::info!("ensemble {}: saved to {}", self.model_id, path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> PromoResult<Self> {
        let path = path.as_ref();
        let artifact = ModelArtifact::read(path)?;
        let ensemble = Self::from_artifact(artifact)?;
        log::info!(
            "ensemble {}: loaded from {} status={}",
            ensemble.model_id,
            path.display(),
            ensemble.status
        );
        Ok(ensemble)
    }

    pub fn to_artifact(&self) -> PromoResult<ModelArtifact> {
        let feature_names = self.feature_names.clone().ok_or(PromoError::NotFitted)?;
        let training_metadata = self.training_metadata.clone().ok_or(PromoError::NotFitted)?;
        if self.models.is_empty() {
            return Err(PromoError::NotFitted);
        }
        Ok(ModelArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            model_id: self.model_id.clone(),
            client_id: self.client_id.clone(),
            simulator_version: self.simulator_version.clone(),
            config: self.config.clone(),
            quantiles: self.quantiles.clone(),
            status: self.status,
            deployed_at: self.deployed_at,
            retired_at: self.retired_at,
            provenance: self.provenance.clone(),
            feature_names,
            training_metadata,
            models: self.models.clone(),
            saved_at: Utc::now(),
        })
    }

    /// Rebuild an ensemble from an artifact. The result is always fitted.
    pub fn from_artifact(artifact: ModelArtifact) -> PromoResult<Self> {
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(PromoError::UnsupportedArtifact { found: artifact.format_version });
        }
        if artifact.feature_names.is_empty() || artifact.models.is_empty() {
            return Err(PromoError::invalid_input("artifact holds no fitted models"));
        }
        let levels: Vec<f64> = artifact.models.iter().map(|m| m.level).collect();
        if levels != artifact.quantiles {
            return Err(PromoError::invalid_input(format!(
                "artifact models {levels:?} do not match quantiles {:?}",
                artifact.quantiles
            )));
        }
        for model in &artifact.models {
            model.regressor.validate(artifact.feature_names.len())?;
        }
        Ok(Self {
            model_id: artifact.model_id,
            client_id: artifact.client_id,
            simulator_version: artifact.simulator_version,
            config: artifact.config,
            quantiles: artifact.quantiles,
            models: artifact.models,
            feature_names: Some(artifact.feature_names),
            status: artifact.status,
            deployed_at: artifact.deployed_at,
            retired_at: artifact.retired_at,
            provenance: artifact.provenance,
            training_metadata: Some(artifact.training_metadata),
        })
    }
}

fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_percentiles() {
        assert_eq!(quantile_label(0.10), "p10");
        assert_eq!(quantile_label(0.5), "p50");
        assert_eq!(quantile_label(0.90), "p90");
        assert_eq!(quantile_label(0.29), "p29");
        assert_eq!(quantile_label(0.025), "p2.5");
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        let (mean, std) = mean_and_sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert!((std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(mean_and_sample_std(&[3.0]), (3.0, 0.0));
    }

    #[test]
    fn new_ensemble_starts_in_training() {
        let e = QuantileEnsemble::new("acme", "v1", EnsembleConfig::default()).unwrap();
        assert_eq!(e.status(), ModelStatus::Training);
        assert!(!e.is_fitted());
        assert!(matches!(e.feature_names(), Err(PromoError::NotFitted)));
        assert_eq!(e.quantiles(), &[0.1, 0.5, 0.9]);
    }

    #[test]
    fn band_picks_extremes_and_nearest_median() {
        let preds = QuantilePredictions {
            series: vec![
                QuantileSeries { level: 0.1, label: "p10".into(), values: vec![-1.0] },
                QuantileSeries { level: 0.45, label: "p45".into(), values: vec![2.0] },
                QuantileSeries { level: 0.7, label: "p70".into(), values: vec![3.0] },
                QuantileSeries { level: 0.9, label: "p90".into(), values: vec![5.0] },
            ],
            n_rows: 1,
        };
        assert_eq!(preds.band(0), Some(PredictionBand::new(-1.0, 2.0, 5.0)));
        assert_eq!(preds.band(1), None);
    }

    #[test]
    fn crossing_share_counts_rows() {
        let preds = QuantilePredictions {
            series: vec![
                QuantileSeries { level: 0.1, label: "p10".into(), values: vec![0.0, 5.0] },
                QuantileSeries { level: 0.9, label: "p90".into(), values: vec![1.0, 4.0] },
            ],
            n_rows: 2,
        };
        assert_eq!(preds.crossing_share(), 0.5);
    }
}
