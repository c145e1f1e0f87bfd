//! Типы данных: таблицы, колонки, значения ячеек

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{FusionError, Result};

/// Значение одной ячейки
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            // Вложенные структуры храним как текст
            other => Value::Text(other.to_string()),
        }
    }

    /// `integral`: колонка целочисленная, числа выводятся без дробной части
    fn to_json(&self, integral: bool) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if integral => serde_json::Value::from(*n as i64),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Семейство типа колонки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Boolean,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// Тип задачи для целевой колонки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Regression,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Classification => f.write_str("classification"),
            TaskType::Regression => f.write_str("regression"),
        }
    }
}

/// Значения колонки; `None` означает пропуск
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
    Boolean(Vec<Option<bool>>),
}

impl ColumnData {
    /// Колонка из одних пропусков
    pub fn missing(column_type: ColumnType, len: usize) -> Self {
        match column_type {
            ColumnType::Numeric => ColumnData::Numeric(vec![None; len]),
            ColumnType::Categorical => ColumnData::Categorical(vec![None; len]),
            ColumnType::Boolean => ColumnData::Boolean(vec![None; len]),
        }
    }

    /// Вывод типа по непустым значениям
    pub fn from_values(values: &[Value]) -> Self {
        let non_null = || values.iter().filter(|v| !v.is_null());

        if non_null().all(|v| matches!(v, Value::Number(_))) {
            return ColumnData::Numeric(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Number(n) => Some(*n),
                        _ => None,
                    })
                    .collect(),
            );
        }

        if non_null().all(|v| matches!(v, Value::Bool(_))) {
            return ColumnData::Boolean(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect(),
            );
        }

        ColumnData::Categorical(values.iter().map(render_text).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Numeric(_) => ColumnType::Numeric,
            ColumnData::Categorical(_) => ColumnType::Categorical,
            ColumnData::Boolean(_) => ColumnType::Boolean,
        }
    }

    pub fn get(&self, idx: usize) -> Value {
        match self {
            ColumnData::Numeric(v) => v[idx].map(Value::Number).unwrap_or(Value::Null),
            ColumnData::Categorical(v) => v[idx].clone().map(Value::Text).unwrap_or(Value::Null),
            ColumnData::Boolean(v) => v[idx].map(Value::Bool).unwrap_or(Value::Null),
        }
    }

    /// Числовая колонка, где все значения целые и точно представимы в f64
    pub fn is_integral(&self) -> bool {
        const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
        match self {
            ColumnData::Numeric(v) => v
                .iter()
                .flatten()
                .all(|n| n.fract() == 0.0 && n.abs() <= MAX_EXACT),
            _ => false,
        }
    }

    pub fn is_null(&self, idx: usize) -> bool {
        match self {
            ColumnData::Numeric(v) => v[idx].is_none(),
            ColumnData::Categorical(v) => v[idx].is_none(),
            ColumnData::Boolean(v) => v[idx].is_none(),
        }
    }

    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// Значения в текстовом виде (для категориальных признаков и объединения)
    pub fn to_text(&self) -> Vec<Option<String>> {
        self.values().iter().map(render_text).collect()
    }

    /// Строки, в которых значение не пропущено
    pub fn present_rows(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| !self.is_null(i)).collect()
    }

    /// Конкатенация двух колонок; при разных типах результат категориальный
    pub fn concat(&self, other: &ColumnData) -> ColumnData {
        match (self, other) {
            (ColumnData::Numeric(a), ColumnData::Numeric(b)) => {
                ColumnData::Numeric(a.iter().chain(b.iter()).copied().collect())
            }
            (ColumnData::Boolean(a), ColumnData::Boolean(b)) => {
                ColumnData::Boolean(a.iter().chain(b.iter()).copied().collect())
            }
            (ColumnData::Categorical(a), ColumnData::Categorical(b)) => {
                ColumnData::Categorical(a.iter().chain(b.iter()).cloned().collect())
            }
            (a, b) => {
                let mut text = a.to_text();
                text.extend(b.to_text());
                ColumnData::Categorical(text)
            }
        }
    }
}

/// Текстовое представление значения; целые числа без дробной части
pub fn render_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                Some(format!("{}", *n as i64))
            } else {
                Some(n.to_string())
            }
        }
        Value::Text(s) => Some(s.clone()),
    }
}

/// Именованная колонка
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, ColumnData::Numeric(values.into_iter().map(Some).collect()))
    }

    pub fn categorical(name: impl Into<String>, values: &[&str]) -> Self {
        Self::new(
            name,
            ColumnData::Categorical(values.iter().map(|s| Some(s.to_string())).collect()),
        )
    }

    pub fn boolean(name: impl Into<String>, values: Vec<bool>) -> Self {
        Self::new(name, ColumnData::Boolean(values.into_iter().map(Some).collect()))
    }

    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Таблица: упорядоченный набор колонок одинаковой длины
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        Self::with_rows(columns, n_rows)
    }

    fn with_rows(columns: Vec<Column>, n_rows: usize) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(FusionError::InvalidDataset(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
            if column.len() != n_rows {
                return Err(FusionError::InvalidDataset(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    n_rows
                )));
            }
        }
        Ok(Self { columns, n_rows })
    }

    /// Таблица из списка JSON-объектов; порядок колонок по первому появлению
    pub fn from_records(records: &[serde_json::Map<String, serde_json::Value>]) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for record in records {
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let values: Vec<Value> = records
                    .iter()
                    .map(|r| r.get(&name).map(Value::from_json).unwrap_or(Value::Null))
                    .collect();
                Column::new(name, ColumnData::from_values(&values))
            })
            .collect();

        Self::with_rows(columns, records.len())
    }

    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        let integral: Vec<bool> = self.columns.iter().map(|c| c.data.is_integral()).collect();
        (0..self.n_rows)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(&integral)
                    .map(|(c, &integral)| (c.name.clone(), c.data.get(row).to_json(integral)))
                    .collect()
            })
            .collect()
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Добавление колонки справа
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(FusionError::InvalidDataset(format!(
                "duplicate column '{}'",
                column.name
            )));
        }
        if self.columns.is_empty() && self.n_rows == 0 {
            self.n_rows = column.len();
        }
        if column.len() != self.n_rows {
            return Err(FusionError::InvalidDataset(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                column.len(),
                self.n_rows
            )));
        }
        self.columns.push(column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: serde_json::Value) -> Vec<serde_json::Map<String, serde_json::Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_from_records_infers_types() {
        let ds = Dataset::from_records(&records(json!([
            {"age": 31, "city": "Berlin", "member": true},
            {"age": null, "city": "Paris", "member": false},
            {"age": 45.5, "member": null},
        ])))
        .unwrap();

        assert_eq!(ds.n_rows(), 3);
        assert_eq!(ds.column_names(), vec!["age", "city", "member"]);
        assert_eq!(ds.column("age").unwrap().column_type(), ColumnType::Numeric);
        assert_eq!(ds.column("city").unwrap().column_type(), ColumnType::Categorical);
        assert_eq!(ds.column("member").unwrap().column_type(), ColumnType::Boolean);
        assert!(ds.column("city").unwrap().data.is_null(2));
    }

    #[test]
    fn test_mixed_values_become_text() {
        let data = ColumnData::from_values(&[
            Value::Number(3.0),
            Value::Text("x".into()),
            Value::Bool(true),
        ]);
        assert_eq!(
            data,
            ColumnData::Categorical(vec![
                Some("3".into()),
                Some("x".into()),
                Some("true".into())
            ])
        );
    }

    #[test]
    fn test_records_roundtrip_keeps_nulls() {
        let input = records(json!([
            {"a": 1.5, "b": "u"},
            {"a": null, "b": "v"},
        ]));
        let ds = Dataset::from_records(&input).unwrap();
        assert_eq!(ds.to_records(), input);
    }

    #[test]
    fn test_integer_columns_stay_integers() {
        let input = records(json!([
            {"age": 21, "score": 2.0, "weight": 70.5},
            {"age": null, "score": 3.5, "weight": 80.0},
        ]));
        let ds = Dataset::from_records(&input).unwrap();
        let output = ds.to_records();

        assert_eq!(output[0]["age"], json!(21));
        assert!(output[0]["age"].is_i64());
        assert!(output[1]["age"].is_null());
        assert!(output[0]["score"].is_f64());
        assert!(output[1]["weight"].is_f64());
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let err = Dataset::new(vec![
            Column::numeric("a", vec![1.0, 2.0]),
            Column::numeric("b", vec![1.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, FusionError::InvalidDataset(_)));
    }

    #[test]
    fn test_rejects_duplicate_columns() {
        let mut ds = Dataset::new(vec![Column::numeric("a", vec![1.0])]).unwrap();
        assert!(ds.push_column(Column::numeric("a", vec![2.0])).is_err());
        ds.push_column(Column::numeric("b", vec![2.0])).unwrap();
        assert_eq!(ds.n_cols(), 2);
    }

    #[test]
    fn test_concat_mixed_types_falls_back_to_text() {
        let a = ColumnData::Numeric(vec![Some(1.0), None]);
        let b = ColumnData::Categorical(vec![Some("x".into())]);
        assert_eq!(
            a.concat(&b),
            ColumnData::Categorical(vec![Some("1".into()), None, Some("x".into())])
        );
    }
}
