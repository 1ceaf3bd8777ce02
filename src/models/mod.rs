pub mod boosting;
pub mod linear;
pub mod traits;

pub use boosting::{GradientBoostedRegressor, RegressionTree};
pub use linear::LinearRegression;
pub use traits::{fit_on_split, HoldoutEvaluation, ModelFactory, Regressor};
