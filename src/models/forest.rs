//! Случайный лес: бутстрэп, случайное подпространство признаков, параллельное обучение

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::task::TargetValues;
use super::tree::{argmax, ClassificationTree, RegressionTree};
use super::Estimator;
use crate::error::{FusionError, Result};

#[derive(Debug)]
enum Ensemble {
    Untrained,
    Classifier {
        trees: Vec<ClassificationTree>,
        n_classes: usize,
    },
    Regressor(Vec<RegressionTree>),
}

#[derive(Debug)]
pub struct RandomForest {
    n_estimators: usize,
    max_depth: Option<usize>,
    seed: u64,
    ensemble: Ensemble,
}

impl RandomForest {
    pub fn new(n_estimators: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            max_depth: None,
            seed,
            ensemble: Ensemble::Untrained,
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn n_trees(&self) -> usize {
        match &self.ensemble {
            Ensemble::Untrained => 0,
            Ensemble::Classifier { trees, .. } => trees.len(),
            Ensemble::Regressor(trees) => trees.len(),
        }
    }

    pub fn fit(&mut self, X: &Array2<f64>, target: &TargetValues) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(FusionError::Model("n_estimators must be positive".to_string()));
        }
        if X.nrows() == 0 || X.nrows() != target.len() {
            return Err(FusionError::Model(format!(
                "X has {} rows but target has {} values",
                X.nrows(),
                target.len()
            )));
        }

        let (seed, max_depth) = (self.seed, self.max_depth);
        self.ensemble = match target {
            TargetValues::Classes { y, .. } => {
                let trees = (0..self.n_estimators)
                    .into_par_iter()
                    .map(|i| {
                        let mut rng = tree_rng(seed, i);
                        let sample = bootstrap(&mut rng, X.nrows());
                        let features = feature_subset(&mut rng, X.ncols());
                        let X_boot = X.select(Axis(0), &sample);
                        let y_boot: Vec<usize> = sample.iter().map(|&s| y[s]).collect();
                        ClassificationTree::fit(&X_boot, &y_boot, features, max_depth)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ensemble::Classifier {
                    trees,
                    n_classes: target.n_classes(),
                }
            }
            TargetValues::Continuous(y) => {
                let trees = (0..self.n_estimators)
                    .into_par_iter()
                    .map(|i| {
                        let mut rng = tree_rng(seed, i);
                        let sample = bootstrap(&mut rng, X.nrows());
                        let X_boot = X.select(Axis(0), &sample);
                        let y_boot: Vec<f64> = sample.iter().map(|&s| y[s]).collect();
                        let mut tree = RegressionTree::new(max_depth, 2);
                        tree.fit(&X_boot, &y_boot)?;
                        Ok(tree)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ensemble::Regressor(trees)
            }
        };
        Ok(())
    }

    /// Голосование деревьев; при равенстве голосов меньший класс
    pub fn predict_classes(&self, X: &Array2<f64>) -> Result<Vec<usize>> {
        let Ensemble::Classifier { trees, n_classes } = &self.ensemble else {
            return Err(FusionError::Model("Forest is not a trained classifier".to_string()));
        };

        let votes: Vec<Vec<usize>> = trees.par_iter().map(|t| t.predict_classes(X)).collect();

        let mut counts = vec![0usize; *n_classes];
        Ok((0..X.nrows())
            .map(|row| {
                counts.iter_mut().for_each(|c| *c = 0);
                for tree_votes in &votes {
                    if let Some(c) = counts.get_mut(tree_votes[row]) {
                        *c += 1;
                    }
                }
                argmax(&counts)
            })
            .collect())
    }

    pub fn predict(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        match &self.ensemble {
            Ensemble::Untrained => Err(FusionError::Model("Model not trained".to_string())),
            Ensemble::Classifier { .. } => Ok(self
                .predict_classes(X)?
                .into_iter()
                .map(|c| c as f64)
                .collect()),
            Ensemble::Regressor(trees) => {
                let predictions = trees
                    .par_iter()
                    .map(|t| t.predict(X))
                    .collect::<Result<Vec<_>>>()?;
                let mut sum: Array1<f64> = Array1::zeros(X.nrows());
                for p in &predictions {
                    sum += p;
                }
                Ok(sum / trees.len() as f64)
            }
        }
    }
}

impl Estimator for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }
}

/// Генератор дерева `i`: зерно зависит только от `seed` и номера
fn tree_rng(seed: u64, i: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64))
}

fn bootstrap(rng: &mut ChaCha8Rng, n_samples: usize) -> Vec<usize> {
    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
}

/// Случайное подпространство из √n признаков (классификация)
fn feature_subset(rng: &mut ChaCha8Rng, n_features: usize) -> Vec<usize> {
    let k = sqrt_features(n_features);
    if k == n_features {
        return (0..n_features).collect();
    }
    let mut features = index::sample(rng, n_features, k).into_vec();
    features.sort_unstable();
    features
}

fn sqrt_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt() as usize).max(1).min(n_features)
}
