//! Model lifecycle: TRAINING → TRAINED → DEPLOYED, RETIRED from anywhere.
//!
//! Status is advisory metadata for the deployment layer. It never
//! gates prediction.

use crate::error::{PromoError, PromoResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Training,
    Trained,
    Deployed,
    Retired,
}

/// Actions that move a model between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    CompleteFit,
    Deploy,
    Retire,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompleteFit => "fit",
            Self::Deploy => "deploy",
            Self::Retire => "retire",
        }
    }
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Trained => "trained",
            Self::Deployed => "deployed",
            Self::Retired => "retired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "training" => Some(Self::Training),
            "trained" => Some(Self::Trained),
            "deployed" => Some(Self::Deployed),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }

    /// The status reached by applying `action`, or InvalidTransition.
    ///
    /// A completed fit is legal from TRAINING and, as a re-fit, from
    /// TRAINED. Deploy is legal only from TRAINED. Retire is legal from
    /// every status, including RETIRED itself.
    pub fn transition(self, action: LifecycleAction) -> PromoResult<ModelStatus> {
        use LifecycleAction::*;
        use ModelStatus::*;
        match (self, action) {
            (Training | Trained, CompleteFit) => Ok(Trained),
            (Trained, Deploy) => Ok(Deployed),
            (_, Retire) => Ok(Retired),
            (from, action) => Err(PromoError::InvalidTransition {
                from: from.as_str().into(),
                action: action.as_str().into(),
            }),
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
