//! Определение типа задачи и подготовка целевой колонки

use std::collections::BTreeSet;

use crate::config::FusionConfig;
use crate::error::{FusionError, Result};
use crate::preprocessing::encoding::parse_number;
use crate::types::{ColumnData, TaskType};

/// Классификация или регрессия по значениям колонки
pub fn detect_task(data: &ColumnData, max_cardinality: usize) -> TaskType {
    match data {
        ColumnData::Categorical(_) | ColumnData::Boolean(_) => TaskType::Classification,
        ColumnData::Numeric(values) => {
            let present: Vec<f64> = values.iter().flatten().copied().collect();
            if present.iter().any(|v| v.fract() != 0.0) {
                return TaskType::Regression;
            }
            let mut distinct = present;
            distinct.sort_by(|a, b| a.total_cmp(b));
            distinct.dedup();
            if !distinct.is_empty() && distinct.len() <= max_cardinality {
                TaskType::Classification
            } else {
                TaskType::Regression
            }
        }
    }
}

/// Тип задачи с учётом явного указания в настройках
pub fn resolve_task(target: &str, data: &ColumnData, config: &FusionConfig) -> TaskType {
    config
        .problem_type_map
        .get(target)
        .copied()
        .unwrap_or_else(|| detect_task(data, config.classification_max_cardinality))
}

/// Классы целевой колонки в исходном типе, отсортированы
#[derive(Debug, Clone, PartialEq)]
pub enum ClassLabels {
    Numeric(Vec<f64>),
    Text(Vec<String>),
    Boolean(Vec<bool>),
}

impl ClassLabels {
    pub fn len(&self) -> usize {
        match self {
            ClassLabels::Numeric(v) => v.len(),
            ClassLabels::Text(v) => v.len(),
            ClassLabels::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Колонка меток по индексам классов
    pub fn decode(&self, classes: &[usize]) -> ColumnData {
        match self {
            ClassLabels::Numeric(labels) => {
                ColumnData::Numeric(classes.iter().map(|&c| labels.get(c).copied()).collect())
            }
            ClassLabels::Text(labels) => {
                ColumnData::Categorical(classes.iter().map(|&c| labels.get(c).cloned()).collect())
            }
            ClassLabels::Boolean(labels) => {
                ColumnData::Boolean(classes.iter().map(|&c| labels.get(c).copied()).collect())
            }
        }
    }
}

/// Целевые значения для обучения
#[derive(Debug, Clone, PartialEq)]
pub enum TargetValues {
    Classes { labels: ClassLabels, y: Vec<usize> },
    Continuous(Vec<f64>),
}

impl TargetValues {
    pub fn len(&self) -> usize {
        match self {
            TargetValues::Classes { y, .. } => y.len(),
            TargetValues::Continuous(y) => y.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn task(&self) -> TaskType {
        match self {
            TargetValues::Classes { .. } => TaskType::Classification,
            TargetValues::Continuous(_) => TaskType::Regression,
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            TargetValues::Classes { labels, .. } => labels.len(),
            TargetValues::Continuous(_) => 0,
        }
    }

    /// Подвыборка по позициям (для фолдов кросс-валидации)
    pub fn subset(&self, idx: &[usize]) -> TargetValues {
        match self {
            TargetValues::Classes { labels, y } => TargetValues::Classes {
                labels: labels.clone(),
                y: idx.iter().map(|&i| y[i]).collect(),
            },
            TargetValues::Continuous(y) => {
                TargetValues::Continuous(idx.iter().map(|&i| y[i]).collect())
            }
        }
    }
}

/// Цель без пропусков и номера строк, в которых она задана
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTarget {
    pub rows: Vec<usize>,
    pub values: TargetValues,
}

pub fn prepare_target(name: &str, data: &ColumnData, task: TaskType) -> Result<PreparedTarget> {
    let prepared = match task {
        TaskType::Classification => prepare_classes(data),
        TaskType::Regression => prepare_continuous(name, data)?,
    };

    if prepared.rows.is_empty() {
        return Err(FusionError::InsufficientData {
            target: name.to_string(),
        });
    }
    Ok(prepared)
}

fn prepare_classes(data: &ColumnData) -> PreparedTarget {
    let rows = data.present_rows();

    let (labels, y) = match data {
        ColumnData::Numeric(values) => {
            let present: Vec<f64> = values.iter().flatten().copied().collect();
            let mut labels = present.clone();
            labels.sort_by(|a, b| a.total_cmp(b));
            labels.dedup();
            let y = present
                .iter()
                .map(|v| labels.partition_point(|l| l.total_cmp(v).is_lt()))
                .collect();
            (ClassLabels::Numeric(labels), y)
        }
        ColumnData::Categorical(values) => {
            let labels: Vec<String> = values
                .iter()
                .flatten()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let y = values
                .iter()
                .flatten()
                .map(|v| labels.partition_point(|l| l < v))
                .collect();
            (ClassLabels::Text(labels), y)
        }
        ColumnData::Boolean(values) => {
            let labels: Vec<bool> = values
                .iter()
                .flatten()
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let y = values
                .iter()
                .flatten()
                .map(|v| labels.partition_point(|l| l < v))
                .collect();
            (ClassLabels::Boolean(labels), y)
        }
    };

    PreparedTarget {
        rows,
        values: TargetValues::Classes { labels, y },
    }
}

fn prepare_continuous(name: &str, data: &ColumnData) -> Result<PreparedTarget> {
    let rows = data.present_rows();

    let y = match data {
        ColumnData::Numeric(values) => values.iter().flatten().copied().collect(),
        ColumnData::Boolean(values) => values
            .iter()
            .flatten()
            .map(|&b| if b { 1.0 } else { 0.0 })
            .collect(),
        ColumnData::Categorical(values) => values
            .iter()
            .flatten()
            .map(|v| {
                parse_number(v).ok_or_else(|| FusionError::Encoding {
                    column: name.to_string(),
                    reason: format!("regression target value '{}' is not numeric", v),
                })
            })
            .collect::<Result<Vec<f64>>>()?,
    };

    Ok(PreparedTarget {
        rows,
        values: TargetValues::Continuous(y),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(values: &[f64]) -> ColumnData {
        ColumnData::Numeric(values.iter().copied().map(Some).collect())
    }

    #[test]
    fn test_text_and_bool_are_classification() {
        let text = ColumnData::Categorical(vec![Some("a".into())]);
        let flags = ColumnData::Boolean(vec![Some(true)]);
        assert_eq!(detect_task(&text, 10), TaskType::Classification);
        assert_eq!(detect_task(&flags, 10), TaskType::Classification);
    }

    #[test]
    fn test_integral_low_cardinality_is_classification() {
        assert_eq!(detect_task(&numeric(&[1.0, 0.0, 1.0, 0.0]), 10), TaskType::Classification);
    }

    #[test]
    fn test_fractional_values_are_regression() {
        assert_eq!(detect_task(&numeric(&[3.2, 1.5, 2.7]), 10), TaskType::Regression);
    }

    #[test]
    fn test_cardinality_threshold_is_configurable() {
        let values: Vec<f64> = (0..11).map(|v| v as f64).collect();
        assert_eq!(detect_task(&numeric(&values), 10), TaskType::Regression);
        assert_eq!(detect_task(&numeric(&values[..10]), 10), TaskType::Classification);
        assert_eq!(detect_task(&numeric(&values), 11), TaskType::Classification);
    }

    #[test]
    fn test_override_wins() {
        let config = FusionConfig::default().with_problem_type("x", TaskType::Regression);
        let data = numeric(&[0.0, 1.0]);
        assert_eq!(resolve_task("x", &data, &config), TaskType::Regression);
        assert_eq!(resolve_task("y", &data, &config), TaskType::Classification);
    }

    #[test]
    fn test_prepare_classes_drops_missing_rows() {
        let data = ColumnData::Categorical(vec![
            Some("b".into()),
            None,
            Some("a".into()),
            Some("b".into()),
        ]);
        let target = prepare_target("t", &data, TaskType::Classification).unwrap();
        assert_eq!(target.rows, vec![0, 2, 3]);
        assert_eq!(
            target.values,
            TargetValues::Classes {
                labels: ClassLabels::Text(vec!["a".into(), "b".into()]),
                y: vec![1, 0, 1],
            }
        );
    }

    #[test]
    fn test_decode_restores_original_type() {
        let data = numeric(&[5.0, 2.0, 5.0]);
        let target = prepare_target("t", &data, TaskType::Classification).unwrap();
        let TargetValues::Classes { labels, y } = target.values else {
            panic!("expected classes");
        };
        assert_eq!(y, vec![1, 0, 1]);
        assert_eq!(labels.decode(&[0, 1]), numeric(&[2.0, 5.0]));
    }

    #[test]
    fn test_all_missing_target_is_insufficient() {
        let data = ColumnData::Numeric(vec![None, None]);
        assert_eq!(
            prepare_target("t", &data, TaskType::Regression),
            Err(FusionError::InsufficientData { target: "t".into() })
        );
    }

    #[test]
    fn test_text_regression_target_must_be_numeric() {
        let data = ColumnData::Categorical(vec![Some("1.5".into()), Some("x".into())]);
        assert!(matches!(
            prepare_target("t", &data, TaskType::Regression),
            Err(FusionError::Encoding { .. })
        ));
    }
}
