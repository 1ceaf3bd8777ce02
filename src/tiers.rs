use crate::config::TierParams;
use crate::error::{PipelineError, Result};
use crate::feature_store::f64_values;
use polars::prelude::*;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DemandTier {
    Top,
    Medio,
    Bajo,
}

impl DemandTier {
    pub const ALL: [DemandTier; 3] = [DemandTier::Top, DemandTier::Medio, DemandTier::Bajo];

    pub fn as_str(&self) -> &'static str {
        match self {
            DemandTier::Top => "TOP",
            DemandTier::Medio => "MEDIO",
            DemandTier::Bajo => "BAJO",
        }
    }
}

impl fmt::Display for DemandTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quantile cut points frozen from the training targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierThresholds {
    pub low: f64,
    pub high: f64,
}

impl TierThresholds {
    /// Derives the cuts from training-partition targets with linearly
    /// interpolated quantiles. Passing anything other than training targets
    /// leaks the held-out distribution.
    pub fn from_training_targets(targets: &[f64], params: &TierParams) -> Result<Self> {
        let (low_q, high_q) = (params.low_quantile, params.high_quantile);
        if !(0.0..=1.0).contains(&low_q) || !(0.0..=1.0).contains(&high_q) || low_q > high_q {
            return Err(PipelineError::InvalidInput(format!(
                "tier quantiles {} and {} must satisfy 0 <= low <= high <= 1",
                low_q, high_q
            )));
        }
        if targets.is_empty() {
            return Err(PipelineError::InvalidInput(
                "no training targets to derive tier cuts from".to_string(),
            ));
        }
        if targets.iter().any(|v| v.is_nan()) {
            return Err(PipelineError::InvalidInput(
                "training targets contain NaN".to_string(),
            ));
        }

        let cuts = df!("target" => targets)?
            .lazy()
            .select([
                col("target")
                    .quantile(lit(low_q), QuantileMethod::Linear)
                    .alias("low"),
                col("target")
                    .quantile(lit(high_q), QuantileMethod::Linear)
                    .alias("high"),
            ])
            .collect()?;

        let thresholds = Self {
            low: single_value(&cuts, "low")?,
            high: single_value(&cuts, "high")?,
        };
        debug!(?thresholds, samples = targets.len(), "Tier thresholds frozen");
        Ok(thresholds)
    }

    /// TOP at or above the high cut, else BAJO at or below the low cut, else
    /// MEDIO. The high check runs first, so a value on both cuts is TOP.
    pub fn classify(&self, quantity: f64) -> DemandTier {
        if quantity >= self.high {
            DemandTier::Top
        } else if quantity <= self.low {
            DemandTier::Bajo
        } else {
            DemandTier::Medio
        }
    }

    pub fn classify_all(&self, quantities: &[f64]) -> Vec<DemandTier> {
        quantities.iter().map(|&q| self.classify(q)).collect()
    }
}

fn single_value(frame: &DataFrame, name: &str) -> Result<f64> {
    f64_values(frame, name)?
        .first()
        .copied()
        .ok_or_else(|| PipelineError::Metric(format!("quantile `{}` produced no value", name)))
}
