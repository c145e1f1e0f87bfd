//! Обучение модели одной цели: кросс-валидация и финальная подгонка

use tracing::{debug, info};

use super::task::prepare_target;
use super::validation::{cross_validate, cv_feasible, MetricMap};
use super::{select_backend, ForestBackend, ModelBackend, TrainedModel};
use crate::config::FusionConfig;
use crate::error::Result;
use crate::preprocessing::EncodedMatrix;
use crate::types::{ColumnData, TaskType};

/// Модель и усреднённые метрики кросс-валидации (пусто, если CV пропущена)
#[derive(Debug)]
pub struct TrainOutcome {
    pub model: TrainedModel,
    pub metrics: MetricMap,
}

pub struct ModelTrainer {
    backend: Box<dyn ModelBackend>,
    fallback: ForestBackend,
    cv_splits: usize,
    seed: u64,
}

impl ModelTrainer {
    pub fn new(backend: Box<dyn ModelBackend>, config: &FusionConfig) -> Self {
        Self {
            backend,
            fallback: ForestBackend::from_config(config),
            cv_splits: config.cv_splits,
            seed: config.random_state,
        }
    }

    pub fn from_config(config: &FusionConfig) -> Self {
        Self::new(select_backend(config), config)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Обучает модель `target` на закодированных признаках источника.
    /// Строки с пропуском в цели не участвуют.
    pub fn train(
        &self,
        target: &str,
        features: &EncodedMatrix,
        data: &ColumnData,
        task: TaskType,
    ) -> Result<TrainOutcome> {
        let prepared = prepare_target(target, data, task)?;
        let x = features.matrix.select_rows(&prepared.rows);
        let values = &prepared.values;

        let backend: &dyn ModelBackend = if self.backend.supports(task) {
            self.backend.as_ref()
        } else {
            info!(
                target_column = target,
                backend = self.backend.name(),
                task = %task,
                "Backend does not support task, using forest"
            );
            &self.fallback
        };

        let metrics = if cv_feasible(values, self.cv_splits) {
            cross_validate(&x, values, self.cv_splits, self.seed, |x, y| {
                backend.fit(x, y, self.seed)
            })?
        } else {
            info!(
                target_column = target,
                rows = values.len(),
                cv_splits = self.cv_splits,
                "Too few rows per fold, skipping cross-validation"
            );
            MetricMap::new()
        };

        let estimator = backend.fit(&x, values, self.seed)?;
        debug!(
            target_column = target,
            estimator = estimator.name(),
            rows = values.len(),
            "Model trained"
        );

        Ok(TrainOutcome {
            model: TrainedModel::new(
                target,
                backend.name(),
                features.schema.names().to_vec(),
                values,
                estimator,
            ),
            metrics,
        })
    }
}
