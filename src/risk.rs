//! Rule-based stock adequacy labels. No trained state is involved.

use crate::config::RiskParams;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StockRisk {
    AltoRiesgo,
    MedioRiesgo,
    SinRiesgo,
}

impl StockRisk {
    pub const ALL: [StockRisk; 3] = [
        StockRisk::AltoRiesgo,
        StockRisk::MedioRiesgo,
        StockRisk::SinRiesgo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StockRisk::AltoRiesgo => "ALTO_RIESGO",
            StockRisk::MedioRiesgo => "MEDIO_RIESGO",
            StockRisk::SinRiesgo => "SIN_RIESGO",
        }
    }
}

impl fmt::Display for StockRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels a stock position by comparison only; no division takes place, so
/// the label is defined for any minimum, including zero.
pub fn classify_stock(current: f64, minimum: f64, params: &RiskParams) -> StockRisk {
    if current < minimum {
        StockRisk::AltoRiesgo
    } else if current < minimum * params.buffer_factor {
        StockRisk::MedioRiesgo
    } else {
        StockRisk::SinRiesgo
    }
}

/// `current / minimum`, or `None` when the minimum is not positive.
pub fn stock_ratio(current: f64, minimum: f64) -> Option<f64> {
    (minimum > 0.0).then(|| current / minimum)
}
