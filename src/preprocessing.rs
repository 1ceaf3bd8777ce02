//! Standardization of the numeric product-month features and one-hot
//! encoding of the category label.
//!
//! [`Preprocessor::fit`] is the only way to obtain a [`FittedPreprocessor`],
//! and only the fitted value can transform rows, so the input space of a
//! trained model cannot drift between calls.

use crate::error::{PipelineError, Result};
use crate::feature_store::JoinedTrainingRow;
use ndarray::Array2;
use tracing::debug;

pub const NUMERIC_FEATURES: [&str; 8] = [
    "year",
    "month",
    "unit_price",
    "unit_cost",
    "margin_amount",
    "margin_pct",
    "stock_current",
    "stock_min",
];

fn numeric_values(row: &JoinedTrainingRow) -> [f64; 8] {
    [
        row.year as f64,
        row.month as f64,
        row.unit_price,
        row.unit_cost,
        row.margin_amount,
        row.margin_pct,
        row.stock_current,
        row.stock_min,
    ]
}

pub struct Preprocessor;

impl Preprocessor {
    /// Captures per-column mean and population standard deviation, and the
    /// sorted category vocabulary, from `rows`.
    pub fn fit(rows: &[JoinedTrainingRow]) -> Result<FittedPreprocessor> {
        if rows.is_empty() {
            return Err(PipelineError::InvalidInput(
                "cannot fit preprocessing on zero rows".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut means = [0.0; 8];
        for row in rows {
            for (mean, value) in means.iter_mut().zip(numeric_values(row)) {
                *mean += value;
            }
        }
        means.iter_mut().for_each(|mean| *mean /= n);

        let mut scales = [0.0; 8];
        for row in rows {
            for ((scale, mean), value) in scales.iter_mut().zip(&means).zip(numeric_values(row)) {
                *scale += (value - mean).powi(2);
            }
        }
        for scale in scales.iter_mut() {
            let std = (*scale / n).sqrt();
            // constant column
            *scale = if std > 0.0 { std } else { 1.0 };
        }

        let mut categories: Vec<String> = rows.iter().map(|row| row.category.clone()).collect();
        categories.sort();
        categories.dedup();

        debug!(rows = rows.len(), categories = categories.len(), "Preprocessor fitted");
        Ok(FittedPreprocessor {
            means,
            scales,
            categories,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedPreprocessor {
    means: [f64; 8],
    scales: [f64; 8],
    categories: Vec<String>,
}

impl FittedPreprocessor {
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn n_features_out(&self) -> usize {
        NUMERIC_FEATURES.len() + self.categories.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        NUMERIC_FEATURES
            .iter()
            .map(|name| name.to_string())
            .chain(self.categories.iter().map(|c| format!("category={}", c)))
            .collect()
    }

    /// Numeric block first, then one indicator per known category. A
    /// category absent from the fit leaves the indicator block all zero.
    pub fn transform(&self, rows: &[JoinedTrainingRow]) -> Array2<f64> {
        let width = self.n_features_out();
        let mut matrix = Array2::zeros((rows.len(), width));

        for (i, row) in rows.iter().enumerate() {
            for (j, value) in numeric_values(row).into_iter().enumerate() {
                matrix[[i, j]] = (value - self.means[j]) / self.scales[j];
            }
            if let Ok(k) = self.categories.binary_search(&row.category) {
                matrix[[i, NUMERIC_FEATURES.len() + k]] = 1.0;
            }
        }

        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(category: &str, price: f64) -> JoinedTrainingRow {
        JoinedTrainingRow {
            product_id: 1,
            name: "p".to_string(),
            category: category.to_string(),
            year: 2024,
            month: 1,
            quantity: 10.0,
            avg_price: price,
            avg_cost: price / 2.0,
            unit_price: price,
            unit_cost: price / 2.0,
            margin_amount: price / 2.0,
            margin_pct: 50.0,
            stock_current: 10.0,
            stock_min: 5.0,
        }
    }

    #[test]
    fn test_standardizes_training_columns() {
        let rows = vec![row("A", 10.0), row("B", 20.0), row("A", 30.0)];
        let fitted = Preprocessor::fit(&rows).unwrap();
        let x = fitted.transform(&rows);

        assert_eq!(x.dim(), (3, 10));
        let price = x.column(2);
        assert!(price.sum().abs() < 1e-12);
        let variance = price.iter().map(|v| v * v).sum::<f64>() / 3.0;
        assert!((variance - 1.0).abs() < 1e-12);
        // constant year column centres to zero without dividing by zero
        assert!(x.column(0).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_one_hot_and_unseen_category() {
        let fitted = Preprocessor::fit(&[row("B", 1.0), row("A", 2.0)]).unwrap();
        assert_eq!(fitted.categories(), ["A".to_string(), "B".to_string()]);
        assert_eq!(fitted.feature_names()[8], "category=A");

        let x = fitted.transform(&[row("B", 1.0), row("C", 1.0)]);
        assert_eq!(x[[0, 8]], 0.0);
        assert_eq!(x[[0, 9]], 1.0);
        assert_eq!(x[[1, 8]], 0.0);
        assert_eq!(x[[1, 9]], 0.0);
    }

    #[test]
    fn test_statistics_come_from_fit_rows_only() {
        let fitted = Preprocessor::fit(&[row("A", 10.0), row("A", 20.0)]).unwrap();
        let before = fitted.transform(&[row("A", 15.0)]);
        let after = fitted.transform(&[row("A", 15.0)]);
        assert_eq!(before, after);
        assert_eq!(before[[0, 2]], 0.0);
    }

    #[test]
    fn test_fit_on_empty_rows_fails() {
        assert!(Preprocessor::fit(&[]).is_err());
    }
}
