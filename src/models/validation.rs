//! Кросс-валидация и метрики качества

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::task::TargetValues;
use super::Estimator;
use crate::error::Result;

/// Метрика → значение
pub type MetricMap = BTreeMap<String, f64>;

/// Разбиение на обучающую и проверочную части
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Можно ли провести кросс-валидацию с `n_splits` фолдами
pub fn cv_feasible(target: &TargetValues, n_splits: usize) -> bool {
    if n_splits < 2 || target.len() < n_splits {
        return false;
    }
    match target {
        TargetValues::Classes { labels, y } => {
            let mut counts = vec![0usize; labels.len()];
            for &class in y {
                counts[class] += 1;
            }
            counts.iter().all(|&c| c == 0 || c >= n_splits)
        }
        TargetValues::Continuous(_) => true,
    }
}

/// Разбиения для цели: стратифицированные для классификации
pub fn splits_for(target: &TargetValues, n_splits: usize, seed: u64) -> Vec<FoldSplit> {
    match target {
        TargetValues::Classes { y, .. } => stratified_k_fold(y, n_splits, seed),
        TargetValues::Continuous(y) => k_fold(y.len(), n_splits, seed),
    }
}

pub fn k_fold(n_samples: usize, n_splits: usize, seed: u64) -> Vec<FoldSplit> {
    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let base = n_samples / n_splits;
    let remainder = n_samples % n_splits;

    let mut folds = Vec::with_capacity(n_splits);
    let mut current = 0;
    for fold_idx in 0..n_splits {
        let fold_size = if fold_idx < remainder { base + 1 } else { base };
        let test = indices[current..current + fold_size].to_vec();
        let train = indices[..current]
            .iter()
            .chain(indices[current + fold_size..].iter())
            .copied()
            .collect();
        folds.push(FoldSplit { train, test });
        current += fold_size;
    }
    folds
}

pub fn stratified_k_fold(y: &[usize], n_splits: usize, seed: u64) -> Vec<FoldSplit> {
    // BTreeMap: порядок классов не зависит от хеширования
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, &class) in y.iter().enumerate() {
        by_class.entry(class).or_default().push(idx);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut test_folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
    let mut offset = 0;
    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
        for &idx in indices.iter() {
            test_folds[offset % n_splits].push(idx);
            offset += 1;
        }
    }

    (0..n_splits)
        .map(|fold_idx| {
            let mut test = test_folds[fold_idx].clone();
            test.sort_unstable();
            let mut train: Vec<usize> = test_folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            train.sort_unstable();
            FoldSplit { train, test }
        })
        .collect()
}

pub fn classification_metrics(y_true: &[usize], y_pred: &[usize]) -> MetricMap {
    let n = y_true.len();
    let mut metrics = MetricMap::new();
    if n == 0 {
        return metrics;
    }

    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    metrics.insert("accuracy".to_string(), correct as f64 / n as f64);

    // Macro-F1 по классам, встречающимся в истинных или предсказанных метках
    let n_classes = y_true.iter().chain(y_pred).max().map(|m| m + 1).unwrap_or(0);
    let mut tp = vec![0usize; n_classes];
    let mut fp = vec![0usize; n_classes];
    let mut fn_ = vec![0usize; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t == p {
            tp[t] += 1;
        } else {
            fp[p] += 1;
            fn_[t] += 1;
        }
    }

    let f1_scores: Vec<f64> = (0..n_classes)
        .filter(|&c| tp[c] + fp[c] + fn_[c] > 0)
        .map(|c| {
            let precision = ratio(tp[c], tp[c] + fp[c]);
            let recall = ratio(tp[c], tp[c] + fn_[c]);
            if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            }
        })
        .collect();

    if !f1_scores.is_empty() {
        metrics.insert(
            "f1_macro".to_string(),
            f1_scores.iter().sum::<f64>() / f1_scores.len() as f64,
        );
    }
    metrics
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn regression_metrics(y_true: &[f64], y_pred: &[f64]) -> MetricMap {
    let n = y_true.len();
    let mut metrics = MetricMap::new();
    if n == 0 {
        return metrics;
    }

    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let mean = y_true.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    metrics.insert("rmse".to_string(), (ss_res / n as f64).sqrt());
    // R² не определён при постоянной истинной цели
    if ss_tot > 0.0 {
        metrics.insert("r2".to_string(), 1.0 - ss_res / ss_tot);
    }
    metrics
}

/// Метрики предсказаний для цели данного типа
pub fn score(target: &TargetValues, predicted: &Array1<f64>) -> MetricMap {
    match target {
        TargetValues::Classes { y, .. } => {
            let y_pred: Vec<usize> = predicted.iter().map(|&c| c.round().max(0.0) as usize).collect();
            classification_metrics(y, &y_pred)
        }
        TargetValues::Continuous(y) => regression_metrics(y, &predicted.to_vec()),
    }
}

/// K-fold оценка: фолды обучаются параллельно, метрики усредняются в порядке фолдов
pub fn cross_validate<F>(
    x: &Array2<f64>,
    target: &TargetValues,
    n_splits: usize,
    seed: u64,
    fit: F,
) -> Result<MetricMap>
where
    F: Fn(&Array2<f64>, &TargetValues) -> Result<Box<dyn Estimator>> + Sync,
{
    let folds = splits_for(target, n_splits, seed);
    let fold_metrics = folds
        .par_iter()
        .map(|fold| {
            let x_train = x.select(Axis(0), &fold.train);
            let x_test = x.select(Axis(0), &fold.test);
            let estimator = fit(&x_train, &target.subset(&fold.train))?;
            let predicted = estimator.predict(&x_test)?;
            Ok(score(&target.subset(&fold.test), &predicted))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(average_metrics(&fold_metrics))
}

/// Среднее по фолдам; нечисловые значения не участвуют
pub fn average_metrics(folds: &[MetricMap]) -> MetricMap {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for fold in folds {
        for (name, &value) in fold {
            if value.is_finite() {
                let entry = sums.entry(name.clone()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::task::ClassLabels;

    fn classes(y: Vec<usize>, n: usize) -> TargetValues {
        TargetValues::Classes {
            labels: ClassLabels::Numeric((0..n).map(|c| c as f64).collect()),
            y,
        }
    }

    #[test]
    fn test_k_fold_covers_every_row_once() {
        let folds = k_fold(10, 3, 42);
        assert_eq!(folds.len(), 3);
        assert_eq!(
            folds.iter().map(|f| f.test.len()).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );

        let mut all_test: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..10).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 10);
            assert!(fold.test.iter().all(|t| !fold.train.contains(t)));
        }
    }

    #[test]
    fn test_splits_are_deterministic() {
        assert_eq!(k_fold(20, 5, 7), k_fold(20, 5, 7));
        let y: Vec<usize> = (0..20).map(|i| i % 2).collect();
        assert_eq!(stratified_k_fold(&y, 5, 7), stratified_k_fold(&y, 5, 7));
    }

    #[test]
    fn test_stratified_keeps_class_balance() {
        let y = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        let folds = stratified_k_fold(&y, 5, 42);
        for fold in &folds {
            assert_eq!(fold.test.len(), 2);
            let ones = fold.test.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(ones, 1);
        }
    }

    #[test]
    fn test_feasibility() {
        // 4 строки, по 2 на класс: три фолда невозможны
        assert!(!cv_feasible(&classes(vec![1, 0, 1, 0], 2), 3));
        assert!(cv_feasible(&classes(vec![1, 0, 1, 0], 2), 2));
        assert!(!cv_feasible(&TargetValues::Continuous(vec![1.0, 2.0]), 3));
        assert!(cv_feasible(&TargetValues::Continuous(vec![1.0, 2.0, 3.0]), 3));
    }

    #[test]
    fn test_classification_metrics() {
        let metrics = classification_metrics(&[0, 0, 1, 1], &[0, 1, 1, 1]);
        assert_eq!(metrics["accuracy"], 0.75);
        // класс 0: p=1, r=0.5, f1=2/3; класс 1: p=2/3, r=1, f1=0.8
        assert!((metrics["f1_macro"] - (2.0 / 3.0 + 0.8) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_regression_metrics() {
        let metrics = regression_metrics(&[1.0, 2.0, 3.0], &[1.0, 2.0, 4.0]);
        assert!((metrics["rmse"] - (1.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((metrics["r2"] - 0.5).abs() < 1e-12);

        let constant = regression_metrics(&[2.0, 2.0], &[2.0, 3.0]);
        assert!(constant.contains_key("rmse"));
        assert!(!constant.contains_key("r2"));
    }

    #[test]
    fn test_cross_validate_scores_every_fold() {
        use crate::models::{ForestBackend, ModelBackend};

        let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f64);
        let target = TargetValues::Continuous((0..12).map(|i| 2.0 * i as f64).collect());
        let backend = ForestBackend::new(10);

        let metrics = cross_validate(&x, &target, 3, 42, |x, y| backend.fit(x, y, 42)).unwrap();
        assert!(metrics.contains_key("rmse"));
        assert!(metrics["r2"] > 0.5);
    }

    #[test]
    fn test_average_skips_missing_and_non_finite() {
        let folds = vec![
            MetricMap::from([("rmse".to_string(), 1.0), ("r2".to_string(), 0.5)]),
            MetricMap::from([("rmse".to_string(), 3.0), ("r2".to_string(), f64::NAN)]),
            MetricMap::from([("rmse".to_string(), 2.0)]),
        ];
        let avg = average_metrics(&folds);
        assert_eq!(avg["rmse"], 2.0);
        assert_eq!(avg["r2"], 0.5);
    }
}
