//! Слияние двух таблиц через взаимно предсказанные колонки

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::config::FusionConfig;
use crate::error::{FusionError, Result};
use crate::models::{resolve_task, MetricMap, ModelTrainer, TrainedModel};
use crate::preprocessing::{EncodedMatrix, FeatureEncoder};
use crate::schema::resolve;
use crate::types::{Column, ColumnData, Dataset};

/// Результат слияния
#[derive(Debug)]
pub struct FusionResult {
    /// Строки A, затем строки B; колонки отсортированы по имени
    pub fused: Dataset,
    pub a_enriched: Dataset,
    pub b_enriched: Dataset,
    pub models_a_to_b: BTreeMap<String, TrainedModel>,
    pub models_b_to_a: BTreeMap<String, TrainedModel>,
    pub metrics_a_to_b: BTreeMap<String, MetricMap>,
    pub metrics_b_to_a: BTreeMap<String, MetricMap>,
    pub overlap_features: Vec<String>,
}

/// Сливает A и B: для каждой цели одной таблицы обучает модель на общих
/// признаках и заполняет эту колонку в другой таблице
pub fn fuse(a: &Dataset, b: &Dataset, config: &FusionConfig) -> Result<FusionResult> {
    config.validate()?;

    let schema = resolve(a, b, config)?;
    let trainer = ModelTrainer::from_config(config);
    info!(
        backend = trainer.backend_name(),
        rows_a = a.n_rows(),
        rows_b = b.n_rows(),
        overlap = schema.overlap.len(),
        targets_from_a = schema.targets_from_a.len(),
        targets_from_b = schema.targets_from_b.len(),
        "Starting fusion"
    );

    let (encoded_a, encoded_b) =
        FeatureEncoder::from_config(config).encode_pair(a, b, &schema.overlap)?;

    let a_to_b = Direction {
        label: "A->B",
        source: a,
        targets: &schema.targets_from_a,
        source_features: &encoded_a,
        dest_features: &encoded_b,
    };
    let b_to_a = Direction {
        label: "B->A",
        source: b,
        targets: &schema.targets_from_b,
        source_features: &encoded_b,
        dest_features: &encoded_a,
    };

    let (forward, backward) = if config.parallel {
        rayon::join(|| a_to_b.run(&trainer, config), || b_to_a.run(&trainer, config))
    } else {
        (a_to_b.run(&trainer, config), b_to_a.run(&trainer, config))
    };
    let (forward, backward) = (forward?, backward?);

    let a_enriched = enrich(a, backward.predictions)?;
    let b_enriched = enrich(b, forward.predictions)?;
    let fused = union(&a_enriched, &b_enriched)?;

    info!(
        fused_rows = fused.n_rows(),
        fused_cols = fused.n_cols(),
        models_a_to_b = forward.models.len(),
        models_b_to_a = backward.models.len(),
        "Fusion finished"
    );

    Ok(FusionResult {
        fused,
        a_enriched,
        b_enriched,
        models_a_to_b: forward.models,
        models_b_to_a: backward.models,
        metrics_a_to_b: forward.metrics,
        metrics_b_to_a: backward.metrics,
        overlap_features: schema.overlap,
    })
}

/// Одно направление: обучение на `source`, предсказание для строк назначения
struct Direction<'a> {
    label: &'static str,
    source: &'a Dataset,
    targets: &'a [String],
    source_features: &'a EncodedMatrix,
    dest_features: &'a EncodedMatrix,
}

struct DirectionOutcome {
    models: BTreeMap<String, TrainedModel>,
    metrics: BTreeMap<String, MetricMap>,
    /// В порядке целей; пропущенные цели заполнены пропусками
    predictions: Vec<Column>,
}

impl Direction<'_> {
    fn run(&self, trainer: &ModelTrainer, config: &FusionConfig) -> Result<DirectionOutcome> {
        let mut outcome = DirectionOutcome {
            models: BTreeMap::new(),
            metrics: BTreeMap::new(),
            predictions: Vec::with_capacity(self.targets.len()),
        };

        for target in self.targets {
            let column = self.source.column(target).ok_or_else(|| FusionError::InvalidTarget {
                column: target.clone(),
                reason: "column not found in source dataset".to_string(),
            })?;
            let task = resolve_task(target, &column.data, config);

            match trainer.train(target, self.source_features, &column.data, task) {
                Ok(trained) => {
                    let predicted = trained.model.predict(self.dest_features)?;
                    info!(
                        direction = self.label,
                        target_column = %target,
                        task = %task,
                        estimator = trained.model.estimator_name(),
                        "Target predicted"
                    );
                    outcome.predictions.push(Column::new(target.clone(), predicted));
                    outcome.metrics.insert(target.clone(), trained.metrics);
                    outcome.models.insert(target.clone(), trained.model);
                }
                Err(e @ FusionError::InsufficientData { .. }) => {
                    warn!(direction = self.label, error = %e, "Skipping target");
                    outcome.predictions.push(Column::new(
                        target.clone(),
                        ColumnData::missing(column.column_type(), self.dest_features.nrows()),
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }
}

/// Исходные колонки и предсказанные; при совпадении имени суффикс `_pred`,
/// затем `_pred_2`, `_pred_3` и т.д.
fn enrich(dest: &Dataset, predictions: Vec<Column>) -> Result<Dataset> {
    let mut enriched = dest.clone();
    for mut column in predictions {
        if enriched.has_column(&column.name) {
            let base = format!("{}_pred", column.name);
            let mut name = base.clone();
            let mut n = 1;
            while enriched.has_column(&name) {
                n += 1;
                name = format!("{}_{}", base, n);
            }
            column.name = name;
        }
        enriched.push_column(column)?;
    }
    Ok(enriched)
}

/// Строки `first`, затем `second`; колонки по объединению имён в алфавитном порядке
fn union(first: &Dataset, second: &Dataset) -> Result<Dataset> {
    let names: BTreeSet<&str> = first
        .column_names()
        .into_iter()
        .chain(second.column_names())
        .collect();

    let columns = names
        .into_iter()
        .filter_map(|name| {
            let data = match (first.column(name), second.column(name)) {
                (Some(x), Some(y)) => x.data.concat(&y.data),
                (Some(x), None) => x
                    .data
                    .concat(&ColumnData::missing(x.column_type(), second.n_rows())),
                (None, Some(y)) => {
                    ColumnData::missing(y.column_type(), first.n_rows()).concat(&y.data)
                }
                (None, None) => return None,
            };
            Some(Column::new(name, data))
        })
        .collect();

    Dataset::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn test_enrich_renames_colliding_prediction() {
        let dest = Dataset::new(vec![Column::numeric("age", vec![1.0, 2.0])]).unwrap();
        let enriched = enrich(&dest, vec![Column::numeric("age", vec![3.0, 4.0])]).unwrap();
        assert_eq!(enriched.column_names(), vec!["age", "age_pred"]);
    }

    #[test]
    fn test_enrich_skips_taken_pred_names() {
        let dest = Dataset::new(vec![
            Column::numeric("x", vec![1.0]),
            Column::numeric("x_pred", vec![2.0]),
            Column::numeric("x_pred_2", vec![3.0]),
        ])
        .unwrap();
        let enriched = enrich(&dest, vec![Column::numeric("x", vec![4.0])]).unwrap();

        assert_eq!(enriched.column_names(), vec!["x", "x_pred", "x_pred_2", "x_pred_3"]);
        assert_eq!(enriched.column("x_pred_3").unwrap().data.get(0), Value::Number(4.0));
    }

    #[test]
    fn test_union_pads_absent_columns() {
        let first = Dataset::new(vec![
            Column::numeric("b", vec![1.0]),
            Column::categorical("a", &["x"]),
        ])
        .unwrap();
        let second = Dataset::new(vec![Column::numeric("b", vec![2.0, 3.0])]).unwrap();

        let fused = union(&first, &second).unwrap();
        assert_eq!(fused.column_names(), vec!["a", "b"]);
        assert_eq!(fused.n_rows(), 3);

        let a = &fused.column("a").unwrap().data;
        assert_eq!(a.get(0), Value::Text("x".into()));
        assert!(a.is_null(1) && a.is_null(2));
    }

    #[test]
    fn test_union_mixed_types_become_text() {
        let first = Dataset::new(vec![Column::numeric("v", vec![1.0])]).unwrap();
        let second = Dataset::new(vec![Column::boolean("v", vec![true])]).unwrap();

        let fused = union(&first, &second).unwrap();
        assert_eq!(
            fused.column("v").unwrap().data,
            ColumnData::Categorical(vec![Some("1".into()), Some("true".into())])
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let a = Dataset::new(vec![Column::numeric("x", vec![1.0])]).unwrap();
        let config = FusionConfig {
            cv_splits: 1,
            ..FusionConfig::default()
        };
        assert!(matches!(fuse(&a, &a, &config), Err(FusionError::InvalidConfig(_))));
    }
}
