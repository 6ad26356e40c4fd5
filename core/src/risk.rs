//! Risk interpretation of a predicted P&L band.
//!
//! Input is three scalars for one scenario: pessimistic (lowest
//! quantile), median, optimistic (highest quantile). Crossed bands
//! are accepted as-is; spread is measured as an absolute width.

use serde::{Deserialize, Serialize};

/// Pessimistic / median / optimistic predictions for one row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionBand {
    pub pessimistic: f64,
    pub median: f64,
    pub optimistic: f64,
}

impl PredictionBand {
    pub fn new(pessimistic: f64, median: f64, optimistic: f64) -> Self {
        Self { pessimistic, median, optimistic }
    }

    /// True when the band violates pessimistic <= median <= optimistic.
    pub fn is_crossed(&self) -> bool {
        self.pessimistic > self.median || self.median > self.optimistic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    /// Width of the band, |optimistic − pessimistic|.
    pub spread: f64,
    /// Loss in the pessimistic case, max(0, −pessimistic).
    pub potential_loss: f64,
}

pub trait RiskInterpreter {
    fn classify(&self, pessimistic: f64, median: f64, optimistic: f64) -> RiskAssessment;

    fn classify_band(&self, band: &PredictionBand) -> RiskAssessment {
        self.classify(band.pessimistic, band.median, band.optimistic)
    }
}

/// Sign-based interpretation of the band:
///
/// | condition                         | level    |
/// |-----------------------------------|----------|
/// | median < 0 and optimistic < 0     | critical |
/// | median < 0                        | high     |
/// | pessimistic < 0                   | moderate |
/// | otherwise                         | low      |
#[derive(Debug, Clone, Copy, Default)]
pub struct BandRiskInterpreter;

impl RiskInterpreter for BandRiskInterpreter {
    fn classify(&self, pessimistic: f64, median: f64, optimistic: f64) -> RiskAssessment {
        let risk_level = if median < 0.0 && optimistic < 0.0 {
            RiskLevel::Critical
        } else if median < 0.0 {
            RiskLevel::High
        } else if pessimistic < 0.0 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        };
        RiskAssessment {
            risk_level,
            spread: (optimistic - pessimistic).abs(),
            potential_loss: (-pessimistic).max(0.0),
        }
    }
}
