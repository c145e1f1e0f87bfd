//! Кодирование общих признаков в числовую матрицу с общим словарём категорий

use std::collections::{BTreeSet, HashSet};

use ndarray::Array2;

use crate::config::FusionConfig;
use crate::error::{FusionError, Result};
use crate::types::{Column, ColumnData, Dataset};

/// Разбор числа из текста; нечисловые и бесконечные значения отбрасываются
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Все непустые значения выглядят как числа
pub fn is_numeric_like(values: &[Option<String>]) -> bool {
    values.iter().flatten().all(|v| parse_number(v).is_some())
}

/// Откуда взялась закодированная колонка
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSource {
    pub column: String,
    /// Категория для one-hot индикатора; `None` для числового признака
    pub category: Option<String>,
}

/// Упорядоченная схема закодированных признаков
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureSchema {
    /// Общие колонки, включая колонки без признаков (категорий нет ни в одной таблице)
    columns: Vec<String>,
    names: Vec<String>,
    sources: Vec<FeatureSource>,
}

impl FeatureSchema {
    fn push_column(&mut self, column: &str) {
        self.columns.push(column.to_string());
    }

    fn push(&mut self, name: String, source: FeatureSource) {
        self.names.push(name);
        self.sources.push(source);
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn sources(&self) -> &[FeatureSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Исходные общие колонки в порядке кодирования
    pub fn source_columns(&self) -> &[String] {
        &self.columns
    }
}

/// Разреженная матрица в формате CSR
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrMatrix {
    fn new(n_cols: usize) -> Self {
        Self {
            n_rows: 0,
            n_cols,
            indptr: vec![0],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    fn push_row(&mut self, entries: &[(usize, f64)]) {
        for &(col, value) in entries {
            if value != 0.0 {
                self.indices.push(col);
                self.data.push(value);
            }
        }
        self.indptr.push(self.indices.len());
        self.n_rows += 1;
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Плотная копия выбранных строк
    pub fn select_rows(&self, rows: &[usize]) -> Array2<f64> {
        let mut dense = Array2::zeros((rows.len(), self.n_cols));
        for (out_row, &row) in rows.iter().enumerate() {
            for k in self.indptr[row]..self.indptr[row + 1] {
                dense[[out_row, self.indices[k]]] = self.data[k];
            }
        }
        dense
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let rows: Vec<usize> = (0..self.n_rows).collect();
        self.select_rows(&rows)
    }
}

/// Закодированные значения признаков: плотно или разреженно
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureMatrix {
    Dense(Array2<f64>),
    Sparse(CsrMatrix),
}

impl FeatureMatrix {
    pub fn nrows(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.nrows(),
            FeatureMatrix::Sparse(m) => m.n_rows,
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.ncols(),
            FeatureMatrix::Sparse(m) => m.n_cols,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, FeatureMatrix::Sparse(_))
    }

    pub fn select_rows(&self, rows: &[usize]) -> Array2<f64> {
        match self {
            FeatureMatrix::Dense(m) => m.select(ndarray::Axis(0), rows),
            FeatureMatrix::Sparse(m) => m.select_rows(rows),
        }
    }

    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            FeatureMatrix::Dense(m) => m.clone(),
            FeatureMatrix::Sparse(m) => m.to_dense(),
        }
    }
}

/// Матрица признаков одной таблицы вместе со схемой
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMatrix {
    pub schema: FeatureSchema,
    pub matrix: FeatureMatrix,
}

impl EncodedMatrix {
    pub fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Как кодируется одна общая колонка
enum ColumnBlock {
    Numeric {
        a: Vec<f64>,
        b: Vec<f64>,
    },
    OneHot {
        categories: Vec<String>,
        a: Vec<Option<String>>,
        b: Vec<Option<String>>,
    },
}

#[derive(Clone, Copy)]
enum Side {
    A,
    B,
}

impl ColumnBlock {
    fn width(&self) -> usize {
        match self {
            ColumnBlock::Numeric { .. } => 1,
            ColumnBlock::OneHot { categories, .. } => categories.len(),
        }
    }

    fn row_entries(&self, side: Side, row: usize, offset: usize, out: &mut Vec<(usize, f64)>) {
        match self {
            ColumnBlock::Numeric { a, b } => {
                let values = match side {
                    Side::A => a,
                    Side::B => b,
                };
                out.push((offset, values[row]));
            }
            ColumnBlock::OneHot { categories, a, b } => {
                let values = match side {
                    Side::A => a,
                    Side::B => b,
                };
                // Пропуск кодируется нулевыми индикаторами
                if let Some(value) = &values[row] {
                    if let Ok(pos) = categories.binary_search(value) {
                        out.push((offset + pos, 1.0));
                    }
                }
            }
        }
    }
}

pub struct FeatureEncoder {
    use_sparse: bool,
    max_category_cardinality: usize,
    warn_on_high_cardinality: bool,
}

impl FeatureEncoder {
    pub fn new(use_sparse: bool) -> Self {
        Self {
            use_sparse,
            max_category_cardinality: 100,
            warn_on_high_cardinality: true,
        }
    }

    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            use_sparse: config.use_sparse_onehot,
            max_category_cardinality: config.max_category_cardinality,
            warn_on_high_cardinality: config.warn_on_high_cardinality,
        }
    }

    /// Кодирование общих колонок обеих таблиц с одинаковой схемой
    pub fn encode_pair(
        &self,
        a: &Dataset,
        b: &Dataset,
        overlap: &[String],
    ) -> Result<(EncodedMatrix, EncodedMatrix)> {
        let mut schema = FeatureSchema::default();
        let mut blocks = Vec::with_capacity(overlap.len());

        for name in overlap {
            let left = a.column(name).ok_or_else(|| FusionError::Encoding {
                column: name.clone(),
                reason: "missing from dataset A".to_string(),
            })?;
            let right = b.column(name).ok_or_else(|| FusionError::Encoding {
                column: name.clone(),
                reason: "missing from dataset B".to_string(),
            })?;

            let block = self.build_block(left, right)?;
            if block.width() == 0 {
                tracing::warn!("Overlap column '{}' has no values in either dataset, it adds no features", name);
            }
            schema.push_column(name);
            match &block {
                ColumnBlock::Numeric { .. } => schema.push(
                    name.clone(),
                    FeatureSource {
                        column: name.clone(),
                        category: None,
                    },
                ),
                ColumnBlock::OneHot { categories, .. } => {
                    for category in categories {
                        schema.push(
                            format!("{}__{}", name, category),
                            FeatureSource {
                                column: name.clone(),
                                category: Some(category.clone()),
                            },
                        );
                    }
                }
            }
            blocks.push(block);
        }

        let mut seen = HashSet::new();
        for (feature, source) in schema.names().iter().zip(schema.sources()) {
            if !seen.insert(feature.as_str()) {
                return Err(FusionError::Encoding {
                    column: source.column.clone(),
                    reason: format!("encoded feature name '{}' collides with another feature", feature),
                });
            }
        }

        let a_matrix = self.assemble(&blocks, Side::A, a.n_rows(), schema.len());
        let b_matrix = self.assemble(&blocks, Side::B, b.n_rows(), schema.len());

        tracing::debug!(
            "Encoded {} overlap columns into {} features (sparse: {})",
            overlap.len(),
            schema.len(),
            self.use_sparse
        );

        Ok((
            EncodedMatrix {
                schema: schema.clone(),
                matrix: a_matrix,
            },
            EncodedMatrix {
                schema,
                matrix: b_matrix,
            },
        ))
    }

    fn build_block(&self, left: &Column, right: &Column) -> Result<ColumnBlock> {
        use ColumnData::*;

        match (&left.data, &right.data) {
            (Numeric(_), Numeric(_)) | (Numeric(_), Categorical(_)) | (Categorical(_), Numeric(_)) => {
                let a = numeric_values(left, right)?;
                let b = numeric_values(right, left)?;
                let (a, b) = impute_median(a, b);
                Ok(ColumnBlock::Numeric { a, b })
            }
            (Categorical(_) | Boolean(_), Categorical(_) | Boolean(_)) => {
                let a = left.data.to_text();
                let b = right.data.to_text();
                let categories: Vec<String> = a
                    .iter()
                    .chain(b.iter())
                    .flatten()
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();

                if self.warn_on_high_cardinality && categories.len() > self.max_category_cardinality {
                    tracing::warn!(
                        "Overlap column '{}' has {} categories (limit {})",
                        left.name,
                        categories.len(),
                        self.max_category_cardinality
                    );
                }

                Ok(ColumnBlock::OneHot { categories, a, b })
            }
            _ => Err(type_mismatch(left, right)),
        }
    }

    fn assemble(&self, blocks: &[ColumnBlock], side: Side, n_rows: usize, n_cols: usize) -> FeatureMatrix {
        let mut entries = Vec::with_capacity(n_cols);

        if self.use_sparse {
            let mut csr = CsrMatrix::new(n_cols);
            for row in 0..n_rows {
                entries.clear();
                let mut offset = 0;
                for block in blocks {
                    block.row_entries(side, row, offset, &mut entries);
                    offset += block.width();
                }
                csr.push_row(&entries);
            }
            FeatureMatrix::Sparse(csr)
        } else {
            let mut dense = Array2::zeros((n_rows, n_cols));
            for row in 0..n_rows {
                entries.clear();
                let mut offset = 0;
                for block in blocks {
                    block.row_entries(side, row, offset, &mut entries);
                    offset += block.width();
                }
                for &(col, value) in &entries {
                    dense[[row, col]] = value;
                }
            }
            FeatureMatrix::Dense(dense)
        }
    }
}

fn type_mismatch(left: &Column, right: &Column) -> FusionError {
    FusionError::TypeMismatch {
        column: left.name.clone(),
        left: left.column_type().to_string(),
        right: right.column_type().to_string(),
    }
}

/// Числовые значения колонки; текст приводится к числам
fn numeric_values(column: &Column, other: &Column) -> Result<Vec<Option<f64>>> {
    match &column.data {
        ColumnData::Numeric(values) => {
            if values.iter().flatten().any(|v| !v.is_finite()) {
                return Err(FusionError::Encoding {
                    column: column.name.clone(),
                    reason: "non-finite numeric value".to_string(),
                });
            }
            Ok(values.clone())
        }
        ColumnData::Categorical(text) => {
            let present = text.iter().flatten().count();
            let parsed = text.iter().flatten().filter(|v| parse_number(v).is_some()).count();
            if present > 0 && parsed == 0 {
                // Ни одного числа: это не приведение, а несовпадение типов
                return Err(type_mismatch(other, column));
            }
            text.iter()
                .map(|cell| match cell {
                    None => Ok(None),
                    Some(v) => parse_number(v).map(Some).ok_or_else(|| FusionError::Encoding {
                        column: column.name.clone(),
                        reason: format!("value '{}' is not numeric", v),
                    }),
                })
                .collect()
        }
        ColumnData::Boolean(_) => Err(type_mismatch(other, column)),
    }
}

/// Заполнение пропусков медианой по обеим таблицам
fn impute_median(a: Vec<Option<f64>>, b: Vec<Option<f64>>) -> (Vec<f64>, Vec<f64>) {
    let mut observed: Vec<f64> = a.iter().chain(b.iter()).flatten().copied().collect();
    observed.sort_by(|x, y| x.total_cmp(y));

    let median = match observed.len() {
        0 => 0.0,
        n if n % 2 == 1 => observed[n / 2],
        n => (observed[n / 2 - 1] + observed[n / 2]) / 2.0,
    };

    let fill = |values: Vec<Option<f64>>| -> Vec<f64> {
        values.into_iter().map(|v| v.unwrap_or(median)).collect()
    };
    (fill(a), fill(b))
}
