//! Ridge-регрессия на стандартизированных признаках

#![allow(non_snake_case)]

use ndarray::{s, Array1, Array2, Axis, Zip};

use super::Estimator;
use crate::error::{FusionError, Result};
use crate::preprocessing::DataNormalizer;

#[derive(Debug, Clone)]
pub struct RidgeRegression {
    alpha: f64,
    normalizer: DataNormalizer,
    weights: Option<Array1<f64>>,
    bias: f64,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            normalizer: DataNormalizer::new(),
            weights: None,
            bias: 0.0,
        }
    }

    pub fn fit(&mut self, X: &Array2<f64>, y: &[f64]) -> Result<()> {
        let n_samples = X.nrows();
        let n_features = X.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err(FusionError::Model("Empty dataset".to_string()));
        }
        if n_samples != y.len() {
            return Err(FusionError::Model(format!(
                "X has {} rows but y has {} values",
                n_samples,
                y.len()
            )));
        }

        let Xs = self.normalizer.fit_transform(X)?;
        let y_mean = y.iter().sum::<f64>() / n_samples as f64;
        let y_centered: Array1<f64> = y.iter().map(|v| v - y_mean).collect();

        // (XᵀX + αI) w = Xᵀ(y - ȳ)
        let mut xtx = Xs.t().dot(&Xs);
        for i in 0..n_features {
            xtx[[i, i]] += self.alpha;
        }
        let xty = Xs.t().dot(&y_centered);

        self.weights = Some(solve_linear_system(&xtx, &xty)?);
        // Признаки центрированы, поэтому свободный член равен среднему
        self.bias = y_mean;
        Ok(())
    }

    pub fn predict(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| FusionError::Model("Model not trained".to_string()))?;

        let Xs = self.normalizer.transform(X)?;
        Ok(Xs.dot(weights) + self.bias)
    }
}

impl Estimator for RidgeRegression {
    fn name(&self) -> &'static str {
        "ridge"
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RidgeRegression::predict(self, x)
    }
}

/// Метод Гаусса с выбором ведущего элемента по столбцу
fn solve_linear_system(A: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = A.nrows();
    if n == 0 {
        return Ok(Array1::zeros(0));
    }
    if A.ncols() != n || b.len() != n {
        return Err(FusionError::Model(format!(
            "expected a square system, got {}x{} with {} values",
            n,
            A.ncols(),
            b.len()
        )));
    }

    let mut m = ndarray::concatenate(Axis(1), &[A.view(), b.view().insert_axis(Axis(1))])
        .map_err(|e| FusionError::Model(e.to_string()))?;

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| m[[i, col]].abs().total_cmp(&m[[j, col]].abs()))
            .unwrap_or(col);
        if pivot_row != col {
            let (mut upper, mut lower) = m.multi_slice_mut((s![col, ..], s![pivot_row, ..]));
            Zip::from(&mut upper).and(&mut lower).for_each(std::mem::swap);
        }

        let pivot = m[[col, col]];
        if pivot.abs() < 1e-10 {
            return Err(FusionError::Model("Singular matrix".to_string()));
        }

        let pivot_values = m.row(col).to_owned();
        for row in (col + 1)..n {
            let factor = m[[row, col]] / pivot;
            if factor != 0.0 {
                m.row_mut(row).scaled_add(-factor, &pivot_values);
            }
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let tail = m.slice(s![i, i + 1..n]).dot(&x.slice(s![i + 1..]));
        x[i] = (m[[i, n]] - tail) / m[[i, i]];
    }
    Ok(x)
}
