//! Настройки слияния

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{FusionError, Result};
use crate::types::TaskType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Явный список общих признаков; иначе вычисляется по схемам
    #[serde(default)]
    pub overlap_features: Option<BTreeSet<String>>,
    #[serde(default)]
    pub targets_from_a: Option<BTreeSet<String>>,
    #[serde(default)]
    pub targets_from_b: Option<BTreeSet<String>>,
    #[serde(default = "default_true")]
    pub prefer_automl: bool,
    #[serde(default = "default_true")]
    pub use_sparse_onehot: bool,
    #[serde(default = "default_cv_splits")]
    pub cv_splits: usize,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Предел глубины деревьев; без предела деревья растут до чистых листьев
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    /// Явный тип задачи для отдельных целей
    #[serde(default)]
    pub problem_type_map: BTreeMap<String, TaskType>,
    /// Целочисленная цель с не более чем таким числом значений считается классификацией
    #[serde(default = "default_classification_max_cardinality")]
    pub classification_max_cardinality: usize,
    #[serde(default = "default_max_category_cardinality")]
    pub max_category_cardinality: usize,
    #[serde(default = "default_true")]
    pub warn_on_high_cardinality: bool,
    /// Бюджет времени поиска моделей. Число оценённых кандидатов зависит от
    /// времени выполнения, поэтому с бюджетом повторный запуск может выбрать
    /// другую модель.
    #[serde(default)]
    pub automl_time_budget_secs: Option<u64>,
    /// Обучать направления A→B и B→A параллельно
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_true() -> bool { true }
fn default_cv_splits() -> usize { 5 }
fn default_n_estimators() -> usize { 100 }
fn default_random_state() -> u64 { 42 }
fn default_classification_max_cardinality() -> usize { 10 }
fn default_max_category_cardinality() -> usize { 100 }

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            overlap_features: None,
            targets_from_a: None,
            targets_from_b: None,
            prefer_automl: true,
            use_sparse_onehot: true,
            cv_splits: default_cv_splits(),
            n_estimators: default_n_estimators(),
            max_depth: None,
            random_state: default_random_state(),
            problem_type_map: BTreeMap::new(),
            classification_max_cardinality: default_classification_max_cardinality(),
            max_category_cardinality: default_max_category_cardinality(),
            warn_on_high_cardinality: true,
            automl_time_budget_secs: None,
            parallel: true,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cv_splits < 2 {
            return Err(FusionError::InvalidConfig(format!(
                "cv_splits must be at least 2, got {}",
                self.cv_splits
            )));
        }
        if self.n_estimators == 0 {
            return Err(FusionError::InvalidConfig(
                "n_estimators must be positive".to_string(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(FusionError::InvalidConfig(
                "max_depth must be positive when set".to_string(),
            ));
        }
        if self.max_category_cardinality == 0 {
            return Err(FusionError::InvalidConfig(
                "max_category_cardinality must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_overlap<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overlap_features = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_targets_from_a<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets_from_a = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_targets_from_b<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets_from_b = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_problem_type(mut self, column: impl Into<String>, task: TaskType) -> Self {
        self.problem_type_map.insert(column.into(), task);
        self
    }
}
