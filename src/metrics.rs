use crate::error::{PipelineError, Result};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r_squared: f64,
}

/// Scores predictions against held-out targets.
///
/// R² is `1 - SS_res / SS_tot`; on a constant target it is 1.0 for an exact
/// fit and 0.0 otherwise.
pub fn evaluate(actuals: &[f64], predictions: &[f64]) -> Result<RegressionMetrics> {
    if actuals.is_empty() || predictions.is_empty() {
        return Err(PipelineError::Metric("empty target vector".to_string()));
    }
    if actuals.len() != predictions.len() {
        return Err(PipelineError::Metric(format!(
            "length mismatch: {} actuals vs {} predictions",
            actuals.len(),
            predictions.len()
        )));
    }

    let n = actuals.len() as f64;
    let mean_actual = actuals.iter().sum::<f64>() / n;

    let mut abs_sum = 0.0;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (actual, predicted) in actuals.iter().zip(predictions) {
        let residual = actual - predicted;
        abs_sum += residual.abs();
        ss_res += residual * residual;
        ss_tot += (actual - mean_actual).powi(2);
    }

    let r_squared = if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };

    let metrics = RegressionMetrics {
        mae: abs_sum / n,
        rmse: (ss_res / n).sqrt(),
        r_squared,
    };
    debug!(?metrics, samples = actuals.len(), "Metrics computed");
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values() {
        let metrics = evaluate(&[10.0, 20.0, 30.0], &[12.0, 18.0, 33.0]).unwrap();
        assert!((metrics.mae - 7.0 / 3.0).abs() < 1e-12);
        assert!((metrics.rmse - (17.0f64 / 3.0).sqrt()).abs() < 1e-12);
        // SS_res = 17, SS_tot = 200
        assert!((metrics.r_squared - (1.0 - 17.0 / 200.0)).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_fit() {
        let metrics = evaluate(&[1.0, 2.0], &[1.0, 2.0]).unwrap();
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.r_squared, 1.0);
    }

    #[test]
    fn test_constant_target() {
        assert_eq!(evaluate(&[5.0, 5.0], &[5.0, 5.0]).unwrap().r_squared, 1.0);
        assert_eq!(evaluate(&[5.0, 5.0], &[4.0, 6.0]).unwrap().r_squared, 0.0);
    }

    #[test]
    fn test_rejects_bad_vectors() {
        assert!(matches!(evaluate(&[], &[]), Err(PipelineError::Metric(_))));
        assert!(matches!(
            evaluate(&[1.0, 2.0], &[1.0]),
            Err(PipelineError::Metric(_))
        ));
    }
}
