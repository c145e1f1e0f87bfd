//! Деревья решений: регрессионное (CART по дисперсии) и классификационное (linfa-tree)

#![allow(non_snake_case)]

use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_tree::DecisionTree;
use ndarray::{Array1, Array2, ArrayView1, Axis};

use super::Estimator;
use crate::error::{FusionError, Result};

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Регрессионное дерево
#[derive(Debug, Clone)]
pub struct RegressionTree {
    max_depth: Option<usize>,
    min_samples_split: usize,
    root: Option<TreeNode>,
}

impl RegressionTree {
    pub fn new(max_depth: Option<usize>, min_samples_split: usize) -> Self {
        Self {
            max_depth,
            min_samples_split: min_samples_split.max(2),
            root: None,
        }
    }

    pub fn fit(&mut self, X: &Array2<f64>, y: &[f64]) -> Result<()> {
        if X.nrows() == 0 {
            return Err(FusionError::Model("Empty dataset".to_string()));
        }
        if X.nrows() != y.len() {
            return Err(FusionError::Model(format!(
                "X has {} rows but y has {} values",
                X.nrows(),
                y.len()
            )));
        }

        self.root = Some(self.build_tree(X, y, 0, (0..X.nrows()).collect()));
        Ok(())
    }

    fn build_tree(&self, X: &Array2<f64>, y: &[f64], depth: usize, indices: Vec<usize>) -> TreeNode {
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64;

        let depth_reached = self.max_depth.map_or(false, |d| depth >= d);
        if depth_reached || indices.len() < self.min_samples_split {
            return TreeNode::Leaf { value: mean };
        }

        let Some((feature, threshold)) = self.best_split(X, y, &indices) else {
            return TreeNode::Leaf { value: mean };
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| X[[i, feature]] < threshold);

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.build_tree(X, y, depth + 1, left_indices)),
            right: Box::new(self.build_tree(X, y, depth + 1, right_indices)),
        }
    }

    /// Лучшее разделение по сумме квадратов отклонений
    fn best_split(&self, X: &Array2<f64>, y: &[f64], indices: &[usize]) -> Option<(usize, f64)> {
        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;

        let mut best: Option<(usize, f64)> = None;
        let mut best_sse = parent_sse - 1e-12;

        let mut sorted = indices.to_vec();
        for feature in 0..X.ncols() {
            sorted.sort_by(|&a, &b| X[[a, feature]].total_cmp(&X[[b, feature]]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 1..n {
                let prev = sorted[pos - 1];
                left_sum += y[prev];
                left_sq += y[prev] * y[prev];

                let (lo, hi) = (X[[prev, feature]], X[[sorted[pos], feature]]);
                if lo == hi {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / pos as f64)
                    + (right_sq - right_sum * right_sum / (n - pos) as f64);

                if sse < best_sse {
                    best_sse = sse;
                    best = Some((feature, (lo + hi) / 2.0));
                }
            }
        }

        best
    }

    pub fn predict(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| FusionError::Model("Model not trained".to_string()))?;

        Ok(X.rows()
            .into_iter()
            .map(|row| Self::predict_single(root, row))
            .collect())
    }

    fn predict_single(node: &TreeNode, sample: ArrayView1<f64>) -> f64 {
        match node {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] < *threshold {
                    Self::predict_single(left, sample)
                } else {
                    Self::predict_single(right, sample)
                }
            }
        }
    }
}

impl Estimator for RegressionTree {
    fn name(&self) -> &'static str {
        "regression_tree"
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RegressionTree::predict(self, x)
    }
}

#[derive(Debug)]
enum ClassifierModel {
    Tree(DecisionTree<f64, usize>),
    /// Один класс в выборке или нет признаков
    Constant(usize),
}

/// Классификационное дерево CART на подмножестве признаков
#[derive(Debug)]
pub struct ClassificationTree {
    features: Vec<usize>,
    model: ClassifierModel,
}

impl ClassificationTree {
    pub fn fit(
        X: &Array2<f64>,
        y: &[usize],
        features: Vec<usize>,
        max_depth: Option<usize>,
    ) -> Result<Self> {
        if y.is_empty() {
            return Err(FusionError::Model("Empty dataset".to_string()));
        }

        let first = y[0];
        if features.is_empty() || y.iter().all(|&c| c == first) {
            return Ok(Self {
                features,
                model: ClassifierModel::Constant(majority(y)),
            });
        }

        let records = X.select(Axis(1), &features);
        let dataset = Dataset::new(records, Array1::from(y.to_vec()));
        let tree = DecisionTree::params()
            .max_depth(max_depth)
            .fit(&dataset)
            .map_err(|e| FusionError::Model(e.to_string()))?;

        Ok(Self {
            features,
            model: ClassifierModel::Tree(tree),
        })
    }

    pub fn predict_classes(&self, X: &Array2<f64>) -> Vec<usize> {
        match &self.model {
            ClassifierModel::Constant(class) => vec![*class; X.nrows()],
            ClassifierModel::Tree(tree) => {
                let records = X.select(Axis(1), &self.features);
                let predicted: Array1<usize> = tree.predict(&records);
                predicted.to_vec()
            }
        }
    }
}

impl Estimator for ClassificationTree {
    fn name(&self) -> &'static str {
        "decision_tree"
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_classes(x).into_iter().map(|c| c as f64).collect())
    }
}

/// Самый частый класс; при равенстве меньший индекс
pub(crate) fn majority(y: &[usize]) -> usize {
    let n_classes = y.iter().max().map(|m| m + 1).unwrap_or(0);
    let mut counts = vec![0usize; n_classes];
    for &c in y {
        counts[c] += 1;
    }
    argmax(&counts)
}

pub(crate) fn argmax(counts: &[usize]) -> usize {
    let mut best = 0;
    for (class, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = class;
        }
    }
    best
}
