//! Monthly demand series, its boosted trend model, a calendar-linear trend
//! line, and the one-step December forecast.

use crate::config::{ModelParams, SplitParams};
use crate::error::{PipelineError, Result};
use crate::feature_store::{calendar_month, calendar_year, f64_values, i64_values};
use crate::models::{
    fit_on_split, GradientBoostedRegressor, HoldoutEvaluation, LinearRegression, ModelFactory,
    Regressor,
};
use crate::split::TrainTestSplit;
use crate::stats::{mean, tail_mean};
use chrono::{Datelike, NaiveDate};
use ndarray::Array2;
use polars::prelude::*;
use tracing::{debug, info, instrument};

pub const ROLLING_WINDOW: usize = 3;
pub const FORECAST_MONTH: u32 = 12;
pub const TREND_FEATURES: [&str; 4] = ["index", "rolling_mean", "avg_price", "avg_cost"];

/// Totals for one calendar month before indexing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyTotal {
    pub year: i32,
    pub month: u32,
    pub quantity_total: f64,
    pub avg_price: f64,
    pub avg_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeriesPoint {
    pub year: i32,
    pub month: u32,
    pub quantity_total: f64,
    pub avg_price: f64,
    pub avg_cost: f64,
    /// 1-based position in chronological order.
    pub index: usize,
    pub rolling_mean: f64,
}

impl MonthlySeriesPoint {
    pub fn features(&self) -> TrendFeatures {
        TrendFeatures {
            index: self.index as f64,
            rolling_mean: self.rolling_mean,
            avg_price: self.avg_price,
            avg_cost: self.avg_cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendFeatures {
    pub index: f64,
    pub rolling_mean: f64,
    pub avg_price: f64,
    pub avg_cost: f64,
}

impl TrendFeatures {
    pub fn to_array(&self) -> [f64; 4] {
        [self.index, self.rolling_mean, self.avg_price, self.avg_cost]
    }
}

/// Proleptic Gregorian ordinal of the first day of the month (0001-01-01 is 1).
pub fn month_ordinal(year: i32, month: u32) -> Result<i32> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|date| date.num_days_from_ce())
        .ok_or_else(|| PipelineError::DataQuality(format!("invalid calendar month {}-{}", year, month)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    points: Vec<MonthlySeriesPoint>,
}

impl MonthlySeries {
    /// Sorts the totals chronologically, numbers them from 1 and attaches the
    /// trailing rolling mean of the quantity totals.
    pub fn new(mut totals: Vec<MonthlyTotal>) -> Result<Self> {
        totals.sort_by_key(|t| (t.year, t.month));
        if let Some(pair) = totals
            .windows(2)
            .find(|pair| (pair[0].year, pair[0].month) == (pair[1].year, pair[1].month))
        {
            return Err(PipelineError::DataQuality(format!(
                "month {}-{:02} appears twice in the series",
                pair[0].year, pair[0].month
            )));
        }

        let frame = df!(
            "year" => totals.iter().map(|t| i64::from(t.year)).collect::<Vec<_>>(),
            "month" => totals.iter().map(|t| i64::from(t.month)).collect::<Vec<_>>(),
            "quantity_total" => totals.iter().map(|t| t.quantity_total).collect::<Vec<_>>(),
            "avg_price" => totals.iter().map(|t| t.avg_price).collect::<Vec<_>>(),
            "avg_cost" => totals.iter().map(|t| t.avg_cost).collect::<Vec<_>>(),
        )?;
        Self::from_sorted(frame.lazy())
    }

    /// Groups the monthly aggregate table by (year, month): summed quantity,
    /// mean price and mean cost.
    #[instrument(skip_all)]
    pub fn from_monthly(monthly: &DataFrame) -> Result<Self> {
        let grouped = monthly
            .clone()
            .lazy()
            .select([
                col("year").cast(DataType::Int64),
                col("month").cast(DataType::Int64),
                col("quantity").cast(DataType::Float64),
                col("price").cast(DataType::Float64),
                col("cost").cast(DataType::Float64),
            ])
            .filter(col("year").is_not_null().and(col("month").is_not_null()))
            .group_by([col("year"), col("month")])
            .agg([
                col("quantity").sum().alias("quantity_total"),
                col("price").mean().alias("avg_price"),
                col("cost").mean().alias("avg_cost"),
            ])
            .sort_by_exprs([col("year"), col("month")], SortMultipleOptions::default());

        Self::from_sorted(grouped)
    }

    /// Indexes a chronologically sorted frame of monthly totals and adds the
    /// rolling mean over the last [`ROLLING_WINDOW`] months. The first months
    /// average whatever is available.
    fn from_sorted(frame: LazyFrame) -> Result<Self> {
        let frame = frame
            .with_column(
                col("quantity_total")
                    .rolling_mean(RollingOptionsFixedWindow {
                        window_size: ROLLING_WINDOW,
                        min_periods: 1,
                        ..Default::default()
                    })
                    .alias("rolling_mean"),
            )
            .collect()?;
        if frame.height() == 0 {
            return Err(PipelineError::DataQuality(
                "monthly series has no observations".to_string(),
            ));
        }

        let years = i64_values(&frame, "year")?;
        let months = i64_values(&frame, "month")?;
        let quantities = f64_values(&frame, "quantity_total")?;
        let prices = f64_values(&frame, "avg_price")?;
        let costs = f64_values(&frame, "avg_cost")?;
        let rolling = f64_values(&frame, "rolling_mean")?;

        let points = (0..frame.height())
            .map(|i| {
                Ok(MonthlySeriesPoint {
                    year: calendar_year(years[i])?,
                    month: calendar_month(months[i])?,
                    quantity_total: quantities[i],
                    avg_price: prices[i],
                    avg_cost: costs[i],
                    index: i + 1,
                    rolling_mean: rolling[i],
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(months = points.len(), "Monthly series indexed");
        Ok(Self { points })
    }

    pub fn points(&self) -> &[MonthlySeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn totals(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.quantity_total).collect()
    }

    pub fn feature_matrix(&self) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.points.len(), TREND_FEATURES.len()));
        for (i, point) in self.points.iter().enumerate() {
            for (j, value) in point.features().to_array().into_iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }
        matrix
    }

    fn last(&self) -> &MonthlySeriesPoint {
        // never empty: `from_sorted` rejects an empty series
        &self.points[self.points.len() - 1]
    }
}

/// Straight-line fit of monthly totals against the calendar ordinal.
#[derive(Debug, Clone)]
pub struct LinearTrend {
    model: LinearRegression,
    fitted: Vec<f64>,
}

impl LinearTrend {
    pub fn fit(series: &MonthlySeries) -> Result<Self> {
        let ordinals = series
            .points()
            .iter()
            .map(|p| month_ordinal(p.year, p.month).map(f64::from))
            .collect::<Result<Vec<_>>>()?;
        let x = Array2::from_shape_vec((ordinals.len(), 1), ordinals)
            .map_err(|e| PipelineError::Model(e.to_string()))?;

        let mut model = LinearRegression::new();
        model.fit(x.view(), &series.totals())?;
        let fitted = model.predict(x.view())?;
        Ok(Self { model, fitted })
    }

    /// Trend value for every observed month, in series order.
    pub fn fitted(&self) -> &[f64] {
        &self.fitted
    }

    pub fn slope_per_day(&self) -> f64 {
        self.model.slope
    }

    pub fn estimate(&self, year: i32, month: u32) -> Result<f64> {
        Ok(self.model.predict_one(f64::from(month_ordinal(year, month)?)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub year: i32,
    pub month: u32,
    pub features: TrendFeatures,
    pub predicted_quantity: f64,
    /// The calendar-linear trend evaluated at the same month.
    pub linear_estimate: f64,
}

#[derive(Debug, Clone)]
pub struct TrendForecast {
    pub series: MonthlySeries,
    pub model: GradientBoostedRegressor,
    pub evaluation: HoldoutEvaluation,
    pub linear_trend: LinearTrend,
    pub forecast: ForecastResult,
}

impl TrendForecast {
    /// Fits the boosted trend model on a seeded split of the series, fits the
    /// linear trend on the whole series, and predicts the next December.
    #[instrument(skip_all, fields(months = series.len()))]
    pub fn fit(
        series: MonthlySeries,
        model_params: &ModelParams,
        split_params: &SplitParams,
    ) -> Result<Self> {
        let features = series.feature_matrix();
        let targets = series.totals();
        let split = TrainTestSplit::new(series.len(), split_params)?;

        let mut model = GradientBoostedRegressor::create(model_params)?;
        let evaluation = fit_on_split(&mut model, features.view(), &targets, &split)?;
        info!(metrics = ?evaluation.metrics, "Trend model fitted");

        let linear_trend = LinearTrend::fit(&series)?;
        debug!(slope_per_day = linear_trend.slope_per_day(), "Linear trend fitted");
        let forecast = forecast_december(&series, &model, &linear_trend)?;
        info!(
            year = forecast.year,
            month = forecast.month,
            predicted = forecast.predicted_quantity,
            "December forecast ready"
        );

        Ok(Self {
            series,
            model,
            evaluation,
            linear_trend,
            forecast,
        })
    }
}

/// Builds the synthetic row for December of the latest observed year and
/// predicts it. The series itself is only read.
pub fn forecast_december(
    series: &MonthlySeries,
    model: &GradientBoostedRegressor,
    linear_trend: &LinearTrend,
) -> Result<ForecastResult> {
    let last = series.last();
    let year = last.year;

    let totals = series.totals();
    let prices: Vec<f64> = series.points().iter().map(|p| p.avg_price).collect();
    let costs: Vec<f64> = series.points().iter().map(|p| p.avg_cost).collect();
    let missing = || PipelineError::DataQuality("monthly series has no observations".to_string());

    let features = TrendFeatures {
        index: (last.index + 1) as f64,
        rolling_mean: tail_mean(&totals, ROLLING_WINDOW).ok_or_else(missing)?,
        avg_price: mean(&prices).ok_or_else(missing)?,
        avg_cost: mean(&costs).ok_or_else(missing)?,
    };

    let row = Array2::from_shape_vec((1, TREND_FEATURES.len()), features.to_array().to_vec())
        .map_err(|e| PipelineError::Model(e.to_string()))?;
    let predicted_quantity = model.predict(row.view())?[0];

    Ok(ForecastResult {
        year,
        month: FORECAST_MONTH,
        features,
        predicted_quantity,
        linear_estimate: linear_trend.estimate(year, FORECAST_MONTH)?,
    })
}
