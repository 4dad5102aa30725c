use super::features::{FeatureSet, N_FEATURES};
use super::Predictor;
use crate::error::StrategyError;

const DEFAULT_RIDGE_PENALTY: f64 = 1.0;
const PIVOT_EPSILON: f64 = 1e-12;

/// Ridge regression of next-bar return on standardized features.
///
/// Refit from scratch on every call; the model keeps no state between
/// decision cycles.
#[derive(Debug, Clone)]
pub struct LinearRegressionPredictor {
    penalty: f64,
}

impl Default for LinearRegressionPredictor {
    fn default() -> Self {
        Self::new(DEFAULT_RIDGE_PENALTY)
    }
}

impl LinearRegressionPredictor {
    pub fn new(penalty: f64) -> Self {
        Self {
            penalty: penalty.max(0.0),
        }
    }
}

/// Column means and standard deviations (population). Constant columns get std 0.
fn column_stats(rows: &[[f64; N_FEATURES]]) -> ([f64; N_FEATURES], [f64; N_FEATURES]) {
    let n = rows.len() as f64;
    let mut mean = [0.0; N_FEATURES];
    let mut std = [0.0; N_FEATURES];

    for row in rows {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x / n;
        }
    }
    for row in rows {
        for j in 0..N_FEATURES {
            std[j] += (row[j] - mean[j]).powi(2) / n;
        }
    }
    for s in std.iter_mut() {
        *s = s.sqrt();
    }
    (mean, std)
}

fn standardize(row: &[f64; N_FEATURES], mean: &[f64; N_FEATURES], std: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
    let mut z = [0.0; N_FEATURES];
    for j in 0..N_FEATURES {
        z[j] = if std[j] > 0.0 { (row[j] - mean[j]) / std[j] } else { 0.0 };
    }
    z
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting
fn solve(
    mut a: [[f64; N_FEATURES]; N_FEATURES],
    mut b: [f64; N_FEATURES],
) -> Result<[f64; N_FEATURES], StrategyError> {
    for col in 0..N_FEATURES {
        let pivot = (col..N_FEATURES)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return Err(StrategyError::Numerical(format!(
                "singular normal equations at column {}",
                col
            )));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..N_FEATURES {
            let factor = a[row][col] / a[col][col];
            for k in col..N_FEATURES {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; N_FEATURES];
    for row in (0..N_FEATURES).rev() {
        let tail: f64 = (row + 1..N_FEATURES).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

impl Predictor for LinearRegressionPredictor {
    fn predict(&self, features: &FeatureSet) -> Result<f64, StrategyError> {
        let latest = features.latest.ok_or(StrategyError::InsufficientData {
            required: 1,
            available: 0,
        })?;
        if features.rows.len() < 2 {
            return Err(StrategyError::InsufficientData {
                required: 2,
                available: features.rows.len(),
            });
        }

        let (mean, std) = column_stats(&features.rows);
        let y_mean = features.targets.iter().sum::<f64>() / features.targets.len() as f64;

        // Normal equations (ZᵀZ + λI) w = Zᵀ(y - ȳ)
        let mut gram = [[0.0; N_FEATURES]; N_FEATURES];
        let mut rhs = [0.0; N_FEATURES];
        for (row, y) in features.rows.iter().zip(&features.targets) {
            let z = standardize(row, &mean, &std);
            for i in 0..N_FEATURES {
                rhs[i] += z[i] * (y - y_mean);
                for j in 0..N_FEATURES {
                    gram[i][j] += z[i] * z[j];
                }
            }
        }
        for (i, row) in gram.iter_mut().enumerate() {
            // Dead columns get a unit diagonal so they solve to zero weight
            row[i] += if std[i] > 0.0 { self.penalty } else { 1.0 };
        }

        let weights = solve(gram, rhs)?;
        let z = standardize(&latest, &mean, &std);
        let prediction = y_mean + weights.iter().zip(&z).map(|(w, x)| w * x).sum::<f64>();

        if !prediction.is_finite() {
            return Err(StrategyError::Numerical(format!(
                "non-finite prediction {}",
                prediction
            )));
        }
        Ok(prediction)
    }
}
