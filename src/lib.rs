pub mod config;
pub mod data_loader;
pub mod demand;
pub mod error;
pub mod feature_store;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod ranking;
pub mod risk;
pub mod session;
pub mod split;
pub mod stats;
pub mod tiers;
pub mod trend;

#[cfg(test)]
mod fixtures;

pub use config::Config;
pub use data_loader::{DataLoader, SourceTables};
pub use error::{PipelineError, Result};
pub use models::{GradientBoostedRegressor, Regressor};
pub use risk::StockRisk;
pub use session::{AnalysisSession, ModelingContext};
pub use tiers::DemandTier;

pub type BoxError = Box<dyn std::error::Error>;
