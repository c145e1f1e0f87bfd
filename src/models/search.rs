//! Поиск модели: перебор кандидатов с внутренней кросс-валидацией

use std::time::{Duration, Instant};

use ndarray::Array2;
use tracing::{debug, info, warn};

use super::task::TargetValues;
use super::tree::{ClassificationTree, RegressionTree};
use super::validation::{cross_validate, cv_feasible};
use super::{Estimator, ForestBackend, ModelBackend, RandomForest, RidgeRegression};
use crate::config::FusionConfig;
use crate::error::{FusionError, Result};
use crate::types::TaskType;

/// Фолды внутренней кросс-валидации при сравнении кандидатов
pub const SEARCH_FOLDS: usize = 3;

const RIDGE_ALPHA: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    RandomForest,
    DecisionTree,
    RegressionTree,
    Ridge,
}

impl Candidate {
    pub fn for_task(task: TaskType) -> &'static [Candidate] {
        match task {
            TaskType::Classification => &[Candidate::RandomForest, Candidate::DecisionTree],
            TaskType::Regression => &[
                Candidate::RandomForest,
                Candidate::RegressionTree,
                Candidate::Ridge,
            ],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Candidate::RandomForest => "random_forest",
            Candidate::DecisionTree => "decision_tree",
            Candidate::RegressionTree => "regression_tree",
            Candidate::Ridge => "ridge",
        }
    }

    fn fit(
        self,
        x: &Array2<f64>,
        target: &TargetValues,
        seed: u64,
        trees: &TreeSettings,
    ) -> Result<Box<dyn Estimator>> {
        match (self, target) {
            (Candidate::RandomForest, _) => {
                let mut forest =
                    RandomForest::new(trees.n_estimators, seed).with_max_depth(trees.max_depth);
                forest.fit(x, target)?;
                Ok(Box::new(forest))
            }
            (Candidate::DecisionTree, TargetValues::Classes { y, .. }) => {
                let features = (0..x.ncols()).collect();
                Ok(Box::new(ClassificationTree::fit(x, y, features, trees.max_depth)?))
            }
            (Candidate::RegressionTree, TargetValues::Continuous(y)) => {
                let mut tree = RegressionTree::new(trees.max_depth, 2);
                tree.fit(x, y)?;
                Ok(Box::new(tree))
            }
            (Candidate::Ridge, TargetValues::Continuous(y)) => {
                let mut ridge = RidgeRegression::new(RIDGE_ALPHA);
                ridge.fit(x, y)?;
                Ok(Box::new(ridge))
            }
            (candidate, target) => Err(FusionError::Model(format!(
                "{} does not support {}",
                candidate.name(),
                target.task()
            ))),
        }
    }
}

/// Размер ансамбля и глубина деревьев для кандидатов
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TreeSettings {
    n_estimators: usize,
    max_depth: Option<usize>,
}

/// Результат кандидата на внутренней кросс-валидации
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub candidate: Candidate,
    pub metric: &'static str,
    pub score: f64,
}

/// Кандидаты, упорядоченные по убыванию метрики
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchReport {
    pub leaderboard: Vec<CandidateScore>,
}

impl SearchReport {
    pub fn best(&self) -> Result<&CandidateScore> {
        self.leaderboard.first().ok_or_else(|| {
            FusionError::Model("model search produced no scored candidates".to_string())
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchBackend {
    trees: TreeSettings,
    time_budget: Option<Duration>,
    fallback: ForestBackend,
}

impl SearchBackend {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: TreeSettings {
                n_estimators,
                max_depth: None,
            },
            time_budget: None,
            fallback: ForestBackend::new(n_estimators),
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.trees.max_depth = max_depth;
        self
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            fallback: ForestBackend::from_config(config),
            ..Self::new(config.n_estimators)
        }
        .with_max_depth(config.max_depth)
        .with_time_budget(config.automl_time_budget_secs.map(Duration::from_secs))
    }

    /// Оценивает кандидатов задачи; бюджет времени проверяется перед каждым следующим
    pub fn search(&self, x: &Array2<f64>, target: &TargetValues, seed: u64) -> SearchReport {
        let metric = match target.task() {
            TaskType::Classification => "f1_macro",
            TaskType::Regression => "r2",
        };
        let started = Instant::now();

        let mut leaderboard = Vec::new();
        for &candidate in Candidate::for_task(target.task()) {
            if let Some(budget) = self.time_budget {
                if !leaderboard.is_empty() && started.elapsed() > budget {
                    info!(
                        evaluated = leaderboard.len(),
                        "Model search time budget exhausted"
                    );
                    break;
                }
            }

            let fit = |x: &Array2<f64>, y: &TargetValues| candidate.fit(x, y, seed, &self.trees);
            match cross_validate(x, target, SEARCH_FOLDS, seed, fit) {
                Ok(metrics) => {
                    let score = metrics.get(metric).copied().unwrap_or(f64::NEG_INFINITY);
                    debug!(candidate = candidate.name(), score, "Candidate evaluated");
                    leaderboard.push(CandidateScore {
                        candidate,
                        metric,
                        score,
                    });
                }
                Err(e) => debug!(candidate = candidate.name(), error = %e, "Candidate failed"),
            }
        }

        // Стабильная сортировка: при равенстве остаётся порядок кандидатов
        leaderboard.sort_by(|a, b| b.score.total_cmp(&a.score));
        SearchReport { leaderboard }
    }
}

impl ModelBackend for SearchBackend {
    fn name(&self) -> &'static str {
        "automl"
    }

    fn supports(&self, _task: TaskType) -> bool {
        true
    }

    fn fit(&self, x: &Array2<f64>, target: &TargetValues, seed: u64) -> Result<Box<dyn Estimator>> {
        if !cv_feasible(target, SEARCH_FOLDS) {
            debug!(rows = target.len(), "Too few rows for model search, using forest");
            return self.fallback.fit(x, target, seed);
        }

        let report = self.search(x, target, seed);
        match report.best() {
            Ok(best) => {
                info!(
                    candidate = best.candidate.name(),
                    metric = best.metric,
                    score = best.score,
                    "Model search selected candidate"
                );
                best.candidate.fit(x, target, seed, &self.trees)
            }
            Err(e) => {
                warn!(error = %e, "Model search failed, using forest");
                self.fallback.fit(x, target, seed)
            }
        }
    }
}
