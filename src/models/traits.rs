use crate::config::ModelParams;
use crate::error::Result;
use crate::metrics::{evaluate, RegressionMetrics};
use crate::split::{take, TrainTestSplit};
use ndarray::{ArrayView2, Axis};

pub trait Regressor {
    fn fit(&mut self, features: ArrayView2<f64>, targets: &[f64]) -> Result<()>;
    fn predict(&self, features: ArrayView2<f64>) -> Result<Vec<f64>>;
    fn is_fitted(&self) -> bool;
}

pub trait ModelFactory {
    type ModelType: Regressor;

    fn create(params: &ModelParams) -> Result<Self::ModelType>;
}

/// Held-out targets, their predictions and the resulting scores.
#[derive(Debug, Clone)]
pub struct HoldoutEvaluation {
    pub actuals: Vec<f64>,
    pub predictions: Vec<f64>,
    pub metrics: RegressionMetrics,
}

/// Fits `model` on the training rows of `split` and scores it on the test rows.
pub fn fit_on_split<R: Regressor>(
    model: &mut R,
    features: ArrayView2<f64>,
    targets: &[f64],
    split: &TrainTestSplit,
) -> Result<HoldoutEvaluation> {
    let x_train = features.select(Axis(0), &split.train);
    let y_train = take(targets, &split.train);
    model.fit(x_train.view(), &y_train)?;

    let x_test = features.select(Axis(0), &split.test);
    let actuals = take(targets, &split.test);
    let predictions = model.predict(x_test.view())?;
    let metrics = evaluate(&actuals, &predictions)?;

    Ok(HoldoutEvaluation {
        actuals,
        predictions,
        metrics,
    })
}
