//! ML модели: оценщики, бэкенды обучения и обученные модели направлений

pub mod forest;
pub mod ridge;
#[cfg(feature = "automl")]
pub mod search;
pub mod task;
pub mod trainer;
pub mod tree;
pub mod validation;

use std::fmt::Debug;

use ndarray::{Array1, Array2};
use tracing::error;

use crate::config::FusionConfig;
use crate::error::{FusionError, Result};
use crate::preprocessing::EncodedMatrix;
use crate::types::{ColumnData, TaskType};

pub use forest::RandomForest;
pub use ridge::RidgeRegression;
#[cfg(feature = "automl")]
pub use search::{CandidateScore, SearchBackend, SearchReport};
pub use task::{detect_task, resolve_task, ClassLabels, TargetValues};
pub use trainer::{ModelTrainer, TrainOutcome};
pub use tree::{ClassificationTree, RegressionTree};
pub use validation::MetricMap;

/// Обученный оценщик. Для классификации возвращает индексы классов.
pub trait Estimator: Send + Sync + Debug {
    fn name(&self) -> &'static str;
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Способ обучить оценщик для задачи
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports(&self, task: TaskType) -> bool;
    fn fit(&self, x: &Array2<f64>, target: &TargetValues, seed: u64) -> Result<Box<dyn Estimator>>;
}

/// Случайный лес, доступен всегда
#[derive(Debug, Clone)]
pub struct ForestBackend {
    n_estimators: usize,
    max_depth: Option<usize>,
}

impl ForestBackend {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            max_depth: None,
        }
    }

    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
        }
    }
}

impl ModelBackend for ForestBackend {
    fn name(&self) -> &'static str {
        "forest"
    }

    fn supports(&self, _task: TaskType) -> bool {
        true
    }

    fn fit(&self, x: &Array2<f64>, target: &TargetValues, seed: u64) -> Result<Box<dyn Estimator>> {
        let mut forest = RandomForest::new(self.n_estimators, seed).with_max_depth(self.max_depth);
        forest.fit(x, target)?;
        Ok(Box::new(forest))
    }
}

/// Бэкенд по настройкам: поиск моделей, если он собран и разрешён
pub fn select_backend(config: &FusionConfig) -> Box<dyn ModelBackend> {
    if config.prefer_automl {
        if let Some(backend) = automl_backend(config) {
            return backend;
        }
    }
    Box::new(ForestBackend::from_config(config))
}

#[cfg(feature = "automl")]
fn automl_backend(config: &FusionConfig) -> Option<Box<dyn ModelBackend>> {
    Some(Box::new(SearchBackend::from_config(config)))
}

#[cfg(not(feature = "automl"))]
fn automl_backend(_config: &FusionConfig) -> Option<Box<dyn ModelBackend>> {
    None
}

/// Модель одной цели в одном направлении
#[derive(Debug)]
pub struct TrainedModel {
    pub target: String,
    pub task: TaskType,
    pub backend: &'static str,
    pub features: Vec<String>,
    pub classes: Option<ClassLabels>,
    pub n_train_rows: usize,
    estimator: Box<dyn Estimator>,
}

impl TrainedModel {
    pub fn new(
        target: impl Into<String>,
        backend: &'static str,
        features: Vec<String>,
        target_values: &TargetValues,
        estimator: Box<dyn Estimator>,
    ) -> Self {
        let classes = match target_values {
            TargetValues::Classes { labels, .. } => Some(labels.clone()),
            TargetValues::Continuous(_) => None,
        };
        Self {
            target: target.into(),
            task: target_values.task(),
            backend,
            features,
            classes,
            n_train_rows: target_values.len(),
            estimator,
        }
    }

    pub fn estimator_name(&self) -> &'static str {
        self.estimator.name()
    }

    /// Предсказание для каждой строки; метки классов в исходном типе цели
    pub fn predict(&self, x: &EncodedMatrix) -> Result<ColumnData> {
        let actual = x.schema.names();
        if actual != self.features.as_slice() {
            error!(
                target_column = %self.target,
                expected = self.features.len(),
                actual = actual.len(),
                "Feature schema differs from training schema"
            );
            return Err(FusionError::SchemaMismatch {
                target: self.target.clone(),
                expected: self.features.len(),
                actual: actual.len(),
            });
        }

        let raw = self.estimator.predict(&x.matrix.to_dense())?;

        Ok(match &self.classes {
            Some(labels) => {
                let classes: Vec<usize> = raw.iter().map(|&c| c.round().max(0.0) as usize).collect();
                labels.decode(&classes)
            }
            None => ColumnData::Numeric(raw.iter().map(|&v| v.is_finite().then_some(v)).collect()),
        })
    }
}
