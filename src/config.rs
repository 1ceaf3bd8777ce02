use serde::{de, Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use crate::BoxError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataPaths,
    pub split: SplitParams,
    pub demand_model: ModelParams,
    #[serde(deserialize_with = "trend_model_params")]
    pub trend_model: ModelParams,
    pub tiers: TierParams,
    pub risk: RiskParams,
    pub report: ReportParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub products: String,
    pub monthly: String,
    pub detail_sales: String,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            products: "data/products.csv".to_string(),
            monthly: "data/monthly.csv".to_string(),
            detail_sales: "data/detail_sales.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
        }
    }
}

/// Gradient boosting hyperparameters. Defaults are the demand model's;
/// the trend model overrides stages and depth (see [`ModelParams::trend`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.05,
            max_depth: 5,
            subsample: 0.9,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

impl ModelParams {
    pub fn trend() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 4,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TierParams {
    pub low_quantile: f64,
    pub high_quantile: f64,
}

impl Default for TierParams {
    fn default() -> Self {
        Self {
            low_quantile: 0.30,
            high_quantile: 0.80,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    /// Multiple of minimum stock under which a product is MEDIO_RIESGO.
    pub buffer_factor: f64,
    /// Multiple of minimum stock under which a TOP product counts as critical.
    pub critical_factor: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            buffer_factor: 1.5,
            critical_factor: 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ReportParams {
    pub top_demand: usize,
    pub stock_shortage: usize,
    pub critical_top: usize,
}

impl Default for ReportParams {
    fn default() -> Self {
        Self {
            top_demand: 20,
            stock_shortage: 20,
            critical_top: 15,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataPaths::default(),
            split: SplitParams::default(),
            demand_model: ModelParams::default(),
            trend_model: ModelParams::trend(),
            tiers: TierParams::default(),
            risk: RiskParams::default(),
            report: ReportParams::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BoxError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, BoxError> {
        Ok(toml::from_str(contents)?)
    }

    /// Defaults for every section, with the trend model's own stage count
    /// and depth.
    pub fn standard() -> Self {
        Self::default()
    }
}

/// Layers `[trend_model]` over the trend defaults, so omitted keys keep the
/// trend stage count and depth instead of the demand ones.
fn trend_model_params<'de, D>(deserializer: D) -> Result<ModelParams, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = toml::Table::deserialize(deserializer)?;
    let mut table = toml::Table::try_from(ModelParams::trend()).map_err(de::Error::custom)?;
    table.extend(overrides);
    table.try_into().map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [split]
            seed = 7

            [demand_model]
            n_estimators = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.split.seed, 7);
        assert!((config.split.test_ratio - 0.2).abs() < 1e-12);
        assert_eq!(config.demand_model.n_estimators, 50);
        assert_eq!(config.demand_model.max_depth, 5);
        assert_eq!(config.trend_model.n_estimators, 300);
        assert_eq!(config.trend_model.max_depth, 4);
        assert_eq!(config.report.top_demand, 20);
    }

    #[test]
    fn test_explicit_trend_section_overrides() {
        let config = Config::from_toml("[trend_model]\nmax_depth = 2\n").unwrap();
        assert_eq!(config.trend_model.max_depth, 2);
        // Unlisted keys inside an explicit table keep the trend defaults.
        assert_eq!(config.trend_model.n_estimators, 300);
    }

    #[test]
    fn test_partial_trend_section_keeps_trend_defaults() {
        let config = Config::from_toml("[trend_model]\nseed = 7\n").unwrap();
        assert_eq!(config.trend_model.seed, 7);
        assert_eq!(config.trend_model.n_estimators, 300);
        assert_eq!(config.trend_model.max_depth, 4);
        assert!((config.trend_model.learning_rate - 0.05).abs() < 1e-12);
        assert_eq!(config.demand_model.n_estimators, 200);
        assert_eq!(config.demand_model.max_depth, 5);

        assert!(Config::from_toml("[trend_model]\nmax_depth = \"deep\"\n").is_err());
    }

    #[test]
    fn test_standard_config() {
        let config = Config::standard();
        assert_eq!(config.demand_model.n_estimators, 200);
        assert_eq!(config.trend_model.n_estimators, 300);
        assert!((config.tiers.high_quantile - 0.8).abs() < 1e-12);
        assert!((config.risk.buffer_factor - 1.5).abs() < 1e-12);
    }
}
