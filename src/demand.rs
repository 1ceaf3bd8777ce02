use crate::config::{ModelParams, SplitParams};
use crate::error::Result;
use crate::feature_store::JoinedTrainingRow;
use crate::models::{fit_on_split, GradientBoostedRegressor, HoldoutEvaluation, ModelFactory, Regressor};
use crate::preprocessing::{FittedPreprocessor, Preprocessor};
use crate::split::{take, TrainTestSplit};
use tracing::{debug, info, instrument};

/// The frozen preprocessing transform and the boosted regressor trained on
/// its output.
#[derive(Debug, Clone)]
pub struct DemandModel {
    preprocessor: FittedPreprocessor,
    regressor: GradientBoostedRegressor,
}

impl DemandModel {
    pub fn preprocessor(&self) -> &FittedPreprocessor {
        &self.preprocessor
    }

    pub fn regressor(&self) -> &GradientBoostedRegressor {
        &self.regressor
    }

    /// Predicted quantity for each row, through the transform fitted at
    /// training time.
    pub fn predict(&self, rows: &[JoinedTrainingRow]) -> Result<Vec<f64>> {
        let features = self.preprocessor.transform(rows);
        self.regressor.predict(features.view())
    }
}

#[derive(Debug, Clone)]
pub struct DemandTraining {
    pub model: DemandModel,
    pub split: TrainTestSplit,
    pub evaluation: HoldoutEvaluation,
    /// Targets of the training partition, in split order.
    pub train_targets: Vec<f64>,
}

/// Splits the joined rows, fits the transform on the training partition
/// only, trains the regressor, and scores it on the held-out rows.
#[instrument(skip_all, fields(rows = rows.len()))]
pub fn train_demand_model(
    rows: &[JoinedTrainingRow],
    model_params: &ModelParams,
    split_params: &SplitParams,
) -> Result<DemandTraining> {
    let split = TrainTestSplit::new(rows.len(), split_params)?;
    debug!(train = split.train.len(), test = split.test.len(), "Demand split");

    let train_rows = take(rows, &split.train);
    let preprocessor = Preprocessor::fit(&train_rows)?;
    let features = preprocessor.transform(rows);
    debug!(shape = ?features.dim(), names = ?preprocessor.feature_names(), "Feature matrix built");

    let targets: Vec<f64> = rows.iter().map(|row| row.quantity).collect();
    let mut regressor = GradientBoostedRegressor::create(model_params)?;
    let evaluation = fit_on_split(&mut regressor, features.view(), &targets, &split)?;
    info!(
        mae = evaluation.metrics.mae,
        rmse = evaluation.metrics.rmse,
        r_squared = evaluation.metrics.r_squared,
        "Demand model trained"
    );

    Ok(DemandTraining {
        model: DemandModel {
            preprocessor,
            regressor,
        },
        train_targets: take(&targets, &split.train),
        split,
        evaluation,
    })
}
