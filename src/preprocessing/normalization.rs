//! Стандартизация признаков

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};

use crate::error::{FusionError, Result};

#[derive(Debug, Clone)]
pub struct DataNormalizer {
    mean: Option<Array1<f64>>,
    std: Option<Array1<f64>>,
}

impl DataNormalizer {
    pub fn new() -> Self {
        Self {
            mean: None,
            std: None,
        }
    }

    pub fn fit(&mut self, X: &Array2<f64>) -> Result<()> {
        if X.nrows() == 0 {
            return Err(FusionError::Model("Empty dataset".to_string()));
        }

        let mean = X
            .mean_axis(Axis(0))
            .ok_or_else(|| FusionError::Model("Failed to compute mean".to_string()))?;
        let mut std = X.std_axis(Axis(0), 0.0);

        // Постоянные признаки (например, редкие индикаторы) не масштабируем
        std.mapv_inplace(|v| if v < 1e-10 { 1.0 } else { v });

        self.mean = Some(mean);
        self.std = Some(std);
        Ok(())
    }

    pub fn transform(&self, X: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, std) = match (&self.mean, &self.std) {
            (Some(mean), Some(std)) => (mean, std),
            _ => return Err(FusionError::Model("Normalizer not fitted".to_string())),
        };

        if X.ncols() != mean.len() {
            return Err(FusionError::Model(format!(
                "Normalizer fitted on {} features, got {}",
                mean.len(),
                X.ncols()
            )));
        }

        Ok((X - mean) / std)
    }

    pub fn fit_transform(&mut self, X: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(X)?;
        self.transform(X)
    }
}

impl Default for DataNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
