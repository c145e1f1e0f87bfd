//! Определение общих признаков и целевых колонок по схемам двух таблиц

use std::collections::{BTreeSet, HashSet};

use crate::config::FusionConfig;
use crate::error::{FusionError, Result};
use crate::preprocessing::encoding::is_numeric_like;
use crate::types::{Column, ColumnData, Dataset};

/// Результат разбора схем
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    /// Общие признаки, отсортированы по имени
    pub overlap: Vec<String>,
    /// Цели, обучаемые на A и предсказываемые в B
    pub targets_from_a: Vec<String>,
    /// Цели, обучаемые на B и предсказываемые в A
    pub targets_from_b: Vec<String>,
}

pub fn resolve(a: &Dataset, b: &Dataset, config: &FusionConfig) -> Result<ResolvedSchema> {
    let overlap = match &config.overlap_features {
        Some(requested) => explicit_overlap(a, b, requested),
        None => {
            let mut excluded: HashSet<&str> = HashSet::new();
            for set in [&config.targets_from_a, &config.targets_from_b].into_iter().flatten() {
                excluded.extend(set.iter().map(String::as_str));
            }
            inferred_overlap(a, b, &excluded)
        }
    };

    if overlap.is_empty() {
        return Err(FusionError::NoOverlap);
    }

    let targets_from_a = resolve_targets(a, b, &overlap, config.targets_from_a.as_ref(), "A")?;
    let targets_from_b = resolve_targets(b, a, &overlap, config.targets_from_b.as_ref(), "B")?;

    if let Some(shared) = targets_from_a.iter().find(|t| targets_from_b.contains(t)) {
        return Err(FusionError::InvalidTarget {
            column: shared.clone(),
            reason: "requested as a target from both datasets".to_string(),
        });
    }

    tracing::debug!(
        "Resolved schema: {} overlap features, {} targets from A, {} targets from B",
        overlap.len(),
        targets_from_a.len(),
        targets_from_b.len()
    );

    Ok(ResolvedSchema {
        overlap,
        targets_from_a,
        targets_from_b,
    })
}

fn explicit_overlap(a: &Dataset, b: &Dataset, requested: &BTreeSet<String>) -> Vec<String> {
    requested
        .iter()
        .filter(|name| {
            let present = a.has_column(name) && b.has_column(name);
            if !present {
                tracing::warn!("Overlap feature '{}' is not present in both datasets, ignored", name);
            }
            present
        })
        .cloned()
        .collect()
}

fn inferred_overlap(a: &Dataset, b: &Dataset, excluded: &HashSet<&str>) -> Vec<String> {
    let mut overlap: Vec<String> = a
        .columns()
        .iter()
        .filter(|col| !excluded.contains(col.name.as_str()))
        .filter_map(|left| {
            let right = b.column(&left.name)?;
            if compatible(left, right) {
                Some(left.name.clone())
            } else {
                tracing::debug!(
                    "Column '{}' is shared but has incompatible types ({} vs {})",
                    left.name,
                    left.column_type(),
                    right.column_type()
                );
                None
            }
        })
        .collect();
    overlap.sort();
    overlap
}

/// Совместимость типов одноимённых колонок
pub(crate) fn compatible(left: &Column, right: &Column) -> bool {
    match (&left.data, &right.data) {
        (ColumnData::Numeric(_), ColumnData::Numeric(_)) => true,
        (
            ColumnData::Categorical(_) | ColumnData::Boolean(_),
            ColumnData::Categorical(_) | ColumnData::Boolean(_),
        ) => true,
        (ColumnData::Numeric(_), ColumnData::Categorical(text))
        | (ColumnData::Categorical(text), ColumnData::Numeric(_)) => is_numeric_like(text),
        _ => false,
    }
}

fn resolve_targets(
    source: &Dataset,
    other: &Dataset,
    overlap: &[String],
    requested: Option<&BTreeSet<String>>,
    source_label: &str,
) -> Result<Vec<String>> {
    let Some(requested) = requested else {
        // Колонки, принадлежащие только источнику
        return Ok(source
            .column_names()
            .into_iter()
            .filter(|name| !overlap.iter().any(|o| o.as_str() == *name) && !other.has_column(name))
            .map(str::to_string)
            .collect());
    };

    for name in requested {
        if !source.has_column(name) {
            return Err(FusionError::InvalidTarget {
                column: name.clone(),
                reason: format!("not a column of dataset {}", source_label),
            });
        }
        if overlap.contains(name) {
            return Err(FusionError::InvalidTarget {
                column: name.clone(),
                reason: "is an overlap feature".to_string(),
            });
        }
    }

    // Порядок колонок источника
    Ok(source
        .column_names()
        .into_iter()
        .filter(|name| requested.contains(*name))
        .map(str::to_string)
        .collect())
}
