use super::traits::Regressor;
use crate::error::{PipelineError, Result};
use ndarray::ArrayView2;

/// Ordinary least squares on a single explanatory variable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinearRegression {
    pub slope: f64,
    pub intercept: f64,
    fitted: bool,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fits `y = intercept + slope * x`. A constant `x` yields a flat line
    /// through the mean of `y`.
    pub fn fit_xy(&mut self, xs: &[f64], ys: &[f64]) -> Result<()> {
        if xs.is_empty() {
            return Err(PipelineError::Model("cannot fit a line through zero points".to_string()));
        }
        if xs.len() != ys.len() {
            return Err(PipelineError::Model(format!(
                "{} x values but {} y values",
                xs.len(),
                ys.len()
            )));
        }

        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let (sxy, sxx) = xs.iter().zip(ys).fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
            let dx = x - mean_x;
            (sxy + dx * (y - mean_y), sxx + dx * dx)
        });

        self.slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        self.intercept = mean_y - self.slope * mean_x;
        self.fitted = true;
        Ok(())
    }

    pub fn predict_one(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, features: ArrayView2<f64>, targets: &[f64]) -> Result<()> {
        if features.ncols() != 1 {
            return Err(PipelineError::Model(format!(
                "linear regression takes one feature, got {}",
                features.ncols()
            )));
        }
        let xs = features.column(0).to_vec();
        self.fit_xy(&xs, targets)
    }

    fn predict(&self, features: ArrayView2<f64>) -> Result<Vec<f64>> {
        if !self.fitted {
            return Err(PipelineError::Model("Model not trained".to_string()));
        }
        if features.ncols() != 1 {
            return Err(PipelineError::Model(format!(
                "linear regression takes one feature, got {}",
                features.ncols()
            )));
        }
        Ok(features.column(0).iter().map(|&x| self.predict_one(x)).collect())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_exact_line() {
        let mut model = LinearRegression::new();
        model.fit_xy(&[1.0, 2.0, 3.0, 4.0], &[3.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((model.slope - 2.0).abs() < 1e-12);
        assert!((model.intercept - 1.0).abs() < 1e-12);
        assert!((model.predict_one(10.0) - 21.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_x_is_flat() {
        let mut model = LinearRegression::new();
        model.fit_xy(&[5.0, 5.0], &[2.0, 4.0]).unwrap();
        assert_eq!(model.slope, 0.0);
        assert_eq!(model.intercept, 3.0);
    }

    #[test]
    fn test_regressor_interface() {
        let mut model = LinearRegression::new();
        assert!(model.predict(array![[1.0]].view()).is_err());
        model.fit(array![[0.0], [2.0]].view(), &[1.0, 5.0]).unwrap();
        assert_eq!(model.predict(array![[1.0]].view()).unwrap(), vec![3.0]);
        assert!(model.fit(array![[0.0, 1.0]].view(), &[1.0]).is_err());
    }
}
